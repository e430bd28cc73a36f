//! Business metrics for the registration engine.
//!
//! Counters are recorded through the `metrics` facade; install any recorder
//! (Prometheus exporter, statsd, ...) in the host process.
//!
//! # Exported Metrics
//!
//! - `fest_registrations_total{kind}` - tickets issued by path (individual, team, merchandise)
//! - `fest_capacity_rejections_total` - reservations refused because the event is full
//! - `fest_merch_orders_total{outcome}` - merchandise orders by outcome (placed, approved, rejected)
//! - `fest_tickets_issued_total` - ticket ids allocated
//! - `fest_side_effect_failures_total{effect}` - failed emails, announcements and QR renders
//! - `fest_cas_conflicts_total` - optimistic-concurrency retries
//! - `fest_effects_executed_total{type}` - effects run by the effect runner

use metrics::{describe_counter, Unit};

/// Register every metric description.
///
/// Call once at startup, before any metric is recorded.
pub fn register_engine_metrics() {
    describe_counter!(
        "fest_registrations_total",
        Unit::Count,
        "Confirmed registrations by kind (individual, team, merchandise)"
    );
    describe_counter!(
        "fest_capacity_rejections_total",
        Unit::Count,
        "Reservations refused because the registration limit was reached"
    );
    describe_counter!(
        "fest_merch_orders_total",
        Unit::Count,
        "Merchandise orders by outcome (placed, approved, rejected)"
    );
    describe_counter!("fest_tickets_issued_total", Unit::Count, "Ticket ids allocated");
    describe_counter!(
        "fest_side_effect_failures_total",
        Unit::Count,
        "Best-effort side effects that failed, by effect"
    );
    describe_counter!(
        "fest_cas_conflicts_total",
        Unit::Count,
        "Optimistic-concurrency conflicts that triggered a retry"
    );
    describe_counter!(
        "fest_effects_executed_total",
        Unit::Count,
        "Effects executed by the effect runner"
    );

    tracing::info!("Engine metrics registered");
}

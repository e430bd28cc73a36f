//! Capacity ledger: the only writer of event counters and item stock.
//!
//! Each operation is a pure mutation on an [`Event`] (`reserve`, `release`,
//! `debit_stock`, ...) executed inside [`update_event`], so the check and the
//! update happen against the same document version. Two reservations racing
//! for the last seat cannot both commit: the loser's write conflicts, it
//! reloads, and the capacity check fails on the fresh count.

use crate::environment::EngineEnvironment;
use crate::error::{EngineError, Result};
use crate::store::{DocumentStore, update_event};
use crate::types::{Event, EventId, ItemId, Money};
use campus_fest_core::environment::Clock;
use campus_fest_runtime::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::sync::Arc;

/// One merchandise line to debit or credit: (item, units)
pub type StockLine = (ItemId, u32);

/// Order lines; most orders have one or two
pub type StockLines = SmallVec<[StockLine; 4]>;

/// Counter values after a ledger operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Confirmed registrations
    pub registration_count: u32,
    /// Registrations in the trending window
    pub registrations_last_24h: u32,
    /// Collected revenue
    pub total_revenue: Money,
    /// Scanned tickets
    pub attendance_count: u32,
    /// Limit in force (0 = unlimited)
    pub registration_limit: u32,
}

impl From<&Event> for LedgerSnapshot {
    fn from(event: &Event) -> Self {
        Self {
            registration_count: event.registration_count,
            registrations_last_24h: event.registrations_last_24h,
            total_revenue: event.total_revenue,
            attendance_count: event.attendance_count,
            registration_limit: event.registration_limit,
        }
    }
}

/// Take `seats` under the limit and book `revenue`, or change nothing.
///
/// # Errors
///
/// [`EngineError::CapacityExceeded`] when the seats do not fit, and
/// [`EngineError::Validation`] if revenue would overflow.
pub fn reserve(event: &mut Event, seats: u32, revenue: Money) -> Result<()> {
    if !event.has_capacity_for(seats) {
        return Err(EngineError::CapacityExceeded {
            event_id: event.id,
            limit: event.registration_limit,
        });
    }
    let total_revenue = event
        .total_revenue
        .checked_add(revenue)
        .ok_or_else(|| EngineError::Validation("revenue overflow".to_string()))?;
    let registration_count = event
        .registration_count
        .checked_add(seats)
        .ok_or_else(|| EngineError::Validation("registration count overflow".to_string()))?;

    event.registration_count = registration_count;
    event.registrations_last_24h = event.registrations_last_24h.saturating_add(seats);
    event.total_revenue = total_revenue;
    Ok(())
}

/// Exact inverse of [`reserve`]
pub fn release(event: &mut Event, seats: u32, revenue: Money) {
    event.registration_count = event.registration_count.saturating_sub(seats);
    event.registrations_last_24h = event.registrations_last_24h.saturating_sub(seats);
    event.total_revenue = event.total_revenue.saturating_sub(revenue);
}

/// Remove `quantity` units of `item` from stock, or change nothing.
///
/// Returns the units left.
///
/// # Errors
///
/// [`EngineError::NotFound`] for an unknown item and
/// [`EngineError::InsufficientStock`] when fewer units are left.
pub fn debit_stock(event: &mut Event, item: ItemId, quantity: u32) -> Result<u32> {
    let entry = event
        .item_mut(item)
        .ok_or_else(|| EngineError::not_found("merchandise item", item))?;
    if entry.stock_quantity < quantity {
        return Err(EngineError::InsufficientStock {
            item: entry.name.clone(),
            requested: quantity,
            available: entry.stock_quantity,
        });
    }
    entry.stock_quantity -= quantity;
    Ok(entry.stock_quantity)
}

/// Return `quantity` units of `item` to stock.
///
/// # Errors
///
/// [`EngineError::NotFound`] for an unknown item.
pub fn credit_stock(event: &mut Event, item: ItemId, quantity: u32) -> Result<u32> {
    let entry = event
        .item_mut(item)
        .ok_or_else(|| EngineError::not_found("merchandise item", item))?;
    entry.stock_quantity = entry.stock_quantity.saturating_add(quantity);
    Ok(entry.stock_quantity)
}

/// Atomic counter and stock operations on event documents
#[derive(Clone)]
pub struct CapacityLedger {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl CapacityLedger {
    /// Ledger over the environment's store
    #[must_use]
    pub fn new(env: &EngineEnvironment) -> Self {
        Self {
            store: Arc::clone(&env.store),
            clock: Arc::clone(&env.clock),
            retry: env.retry.clone(),
        }
    }

    async fn apply<R, F>(&self, event_id: EventId, mutate: F) -> Result<(Event, R)>
    where
        F: Fn(&mut Event) -> Result<R> + Send + Sync,
        R: Send,
    {
        let now = self.clock.now();
        update_event(self.store.as_ref(), &self.retry, event_id, |event| {
            let outcome = mutate(event)?;
            event.updated_at = now;
            Ok(outcome)
        })
        .await
    }

    /// Reserve `seats` and book `revenue` in one indivisible update.
    ///
    /// # Errors
    ///
    /// [`EngineError::CapacityExceeded`] when the limit would be passed;
    /// [`EngineError::EventNotFound`]; storage errors.
    pub async fn try_reserve(&self, event_id: EventId, seats: u32, revenue: Money) -> Result<LedgerSnapshot> {
        match self.apply(event_id, |event| reserve(event, seats, revenue)).await {
            Ok((event, ())) => {
                tracing::debug!(
                    %event_id,
                    seats,
                    count = event.registration_count,
                    limit = event.registration_limit,
                    "Capacity reserved"
                );
                Ok(LedgerSnapshot::from(&event))
            },
            Err(error) => {
                if matches!(error, EngineError::CapacityExceeded { .. }) {
                    metrics::counter!("fest_capacity_rejections_total").increment(1);
                    tracing::warn!(%event_id, seats, "Reservation refused, event is full");
                }
                Err(error)
            },
        }
    }

    /// Undo a reservation whose follow-up write failed.
    ///
    /// # Errors
    ///
    /// [`EngineError::EventNotFound`]; storage errors.
    pub async fn release(&self, event_id: EventId, seats: u32, revenue: Money) -> Result<LedgerSnapshot> {
        let (event, ()) = self
            .apply(event_id, |event| {
                release(event, seats, revenue);
                Ok(())
            })
            .await?;
        tracing::debug!(%event_id, seats, count = event.registration_count, "Capacity released");
        Ok(LedgerSnapshot::from(&event))
    }

    /// Debit one item's stock.
    ///
    /// # Errors
    ///
    /// [`EngineError::InsufficientStock`], [`EngineError::NotFound`] for an
    /// unknown item, [`EngineError::EventNotFound`]; storage errors.
    pub async fn try_debit_stock(&self, event_id: EventId, item: ItemId, quantity: u32) -> Result<u32> {
        let (_, left) = self.apply(event_id, |event| debit_stock(event, item, quantity)).await?;
        tracing::debug!(%event_id, %item, quantity, left, "Stock debited");
        Ok(left)
    }

    /// Credit one item's stock.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] for an unknown item,
    /// [`EngineError::EventNotFound`]; storage errors.
    pub async fn credit_stock(&self, event_id: EventId, item: ItemId, quantity: u32) -> Result<u32> {
        let (_, left) = self.apply(event_id, |event| credit_stock(event, item, quantity)).await?;
        tracing::debug!(%event_id, %item, quantity, left, "Stock credited");
        Ok(left)
    }

    /// Debit every line, or none.
    ///
    /// Lines are debited one at a time; if one fails, the lines already
    /// debited by this call are credited back before the error is returned.
    ///
    /// # Errors
    ///
    /// The first failing line's error.
    pub async fn debit_lines(&self, event_id: EventId, lines: &[StockLine]) -> Result<()> {
        let mut debited = StockLines::new();
        for &(item, quantity) in lines {
            if let Err(error) = self.try_debit_stock(event_id, item, quantity).await {
                self.credit_lines(event_id, &debited).await;
                return Err(error);
            }
            debited.push((item, quantity));
        }
        Ok(())
    }

    /// Credit lines back, logging (not returning) individual failures
    pub async fn credit_lines(&self, event_id: EventId, lines: &[StockLine]) {
        for &(item, quantity) in lines {
            if let Err(error) = self.credit_stock(event_id, item, quantity).await {
                tracing::error!(%event_id, %item, quantity, %error, "Stock compensation failed");
            }
        }
    }

    /// Count one scanned ticket.
    ///
    /// # Errors
    ///
    /// [`EngineError::EventNotFound`]; storage errors.
    pub async fn record_attendance(&self, event_id: EventId) -> Result<LedgerSnapshot> {
        let (event, ()) = self
            .apply(event_id, |event| {
                event.attendance_count = event.attendance_count.saturating_add(1);
                Ok(())
            })
            .await?;
        Ok(LedgerSnapshot::from(&event))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::form::FormSchema;
    use crate::types::{Eligibility, EventKind, EventStatus, MerchandiseItem, OrganizerId, TeamSize};
    use chrono::Utc;
    use proptest::prelude::*;

    fn event(limit: u32, stock: u32) -> (Event, ItemId) {
        let now = Utc::now();
        let item = ItemId::new();
        let event = Event {
            id: EventId::new(),
            organizer: OrganizerId::new(),
            name: "Fest Merch".into(),
            description: String::new(),
            kind: EventKind::Merchandise,
            status: EventStatus::Published,
            eligibility: Eligibility::All,
            registration_deadline: now,
            start_date: now,
            end_date: now,
            registration_limit: limit,
            registration_fee: Money::ZERO,
            tags: Vec::new(),
            is_team_event: false,
            team_size: TeamSize::default(),
            custom_form: FormSchema::default(),
            form_locked: false,
            merchandise_items: vec![MerchandiseItem {
                id: item,
                name: "Hoodie".into(),
                sizes: vec!["M".into()],
                colors: Vec::new(),
                stock_quantity: stock,
                purchase_limit_per_participant: 2,
                price: Money::from_cents(80_000),
            }],
            registration_count: 0,
            registrations_last_24h: 0,
            total_revenue: Money::ZERO,
            attendance_count: 0,
            created_at: now,
            updated_at: now,
        };
        (event, item)
    }

    #[test]
    fn reserve_is_all_or_nothing() {
        let (mut event, _) = event(2, 0);
        reserve(&mut event, 1, Money::from_cents(100)).unwrap();
        let before = event.clone();

        let refused = reserve(&mut event, 2, Money::from_cents(200));
        assert!(matches!(refused, Err(EngineError::CapacityExceeded { limit: 2, .. })));
        assert_eq!(event, before);

        reserve(&mut event, 1, Money::from_cents(100)).unwrap();
        assert_eq!(event.registration_count, 2);
        assert_eq!(event.registrations_last_24h, 2);
        assert_eq!(event.total_revenue, Money::from_cents(200));
    }

    #[test]
    fn unlimited_events_always_reserve() {
        let (mut event, _) = event(0, 0);
        for _ in 0..500 {
            reserve(&mut event, 1, Money::ZERO).unwrap();
        }
        assert_eq!(event.registration_count, 500);
    }

    #[test]
    fn release_inverts_reserve() {
        let (mut event, _) = event(5, 0);
        let before = event.clone();
        reserve(&mut event, 3, Money::from_cents(900)).unwrap();
        release(&mut event, 3, Money::from_cents(900));
        assert_eq!(LedgerSnapshot::from(&event), LedgerSnapshot::from(&before));
    }

    #[test]
    fn stock_never_goes_negative() {
        let (mut event, item) = event(0, 3);
        assert_eq!(debit_stock(&mut event, item, 2).unwrap(), 1);
        let refused = debit_stock(&mut event, item, 2);
        assert!(matches!(
            refused,
            Err(EngineError::InsufficientStock { requested: 2, available: 1, .. })
        ));
        assert_eq!(event.item(item).unwrap().stock_quantity, 1);
        assert_eq!(credit_stock(&mut event, item, 2).unwrap(), 3);

        assert!(matches!(
            debit_stock(&mut event, ItemId::new(), 1),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(u32),
        Release(u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![(1u32..4).prop_map(Op::Reserve), (1u32..4).prop_map(Op::Release)]
    }

    proptest! {
        #[test]
        fn count_never_exceeds_limit(limit in 1u32..20, ops in prop::collection::vec(op(), 0..64)) {
            let (mut event, _) = event(limit, 0);
            let mut expected: u32 = 0;
            for op in ops {
                match op {
                    Op::Reserve(seats) => {
                        let fits = expected + seats <= limit;
                        prop_assert_eq!(reserve(&mut event, seats, Money::ZERO).is_ok(), fits);
                        if fits {
                            expected += seats;
                        }
                    },
                    Op::Release(seats) => {
                        release(&mut event, seats, Money::ZERO);
                        expected = expected.saturating_sub(seats);
                    },
                }
                prop_assert!(event.registration_count <= limit);
                prop_assert_eq!(event.registration_count, expected);
            }
        }

        #[test]
        fn stock_debits_never_oversell(stock in 0u32..20, requests in prop::collection::vec(1u32..5, 0..32)) {
            let (mut event, item) = event(0, stock);
            let mut sold = 0;
            for quantity in requests {
                if debit_stock(&mut event, item, quantity).is_ok() {
                    sold += quantity;
                }
            }
            prop_assert!(sold <= stock);
            prop_assert_eq!(event.item(item).unwrap().stock_quantity, stock - sold);
        }
    }
}

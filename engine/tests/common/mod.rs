//! Shared fixtures for the engine scenario tests.

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use campus_fest_engine::prelude::*;
use campus_fest_engine::store::DocumentStore;
use campus_fest_runtime::DispatchMode;
use campus_fest_runtime::retry::RetryPolicy;
use campus_fest_testing::ManualClock;
use campus_fest_testing::mocks::{RecordingAnnouncer, RecordingMailer, SequentialTicketIssuer};
use campus_fest_testing::test_epoch;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;

/// Engine over in-memory collaborators, with effects run inline
pub struct Harness {
    pub engine: FestEngine,
    pub store: Arc<InMemoryStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub mailer: Arc<RecordingMailer>,
    pub announcer: Arc<RecordingAnnouncer>,
    pub tickets: Arc<SequentialTicketIssuer>,
    pub clock: Arc<ManualClock>,
    pub organizer: Principal,
}

/// Retry budget wide enough for heavily contended stress tests
pub fn contended_retry() -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(500)
        .initial_delay(StdDuration::from_micros(200))
        .max_delay(StdDuration::from_millis(4))
        .jitter(true)
        .build()
}

impl Harness {
    pub fn new() -> Self {
        Self::with(RecordingMailer::new(), EnginePolicy::default())
    }

    pub fn with_policy(policy: EnginePolicy) -> Self {
        Self::with(RecordingMailer::new(), policy)
    }

    pub fn with_mailer(mailer: RecordingMailer) -> Self {
        Self::with(mailer, EnginePolicy::default())
    }

    fn with(mailer: RecordingMailer, policy: EnginePolicy) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let mailer = Arc::new(mailer);
        let announcer = Arc::new(RecordingAnnouncer::new());
        let tickets = Arc::new(SequentialTicketIssuer::new());
        let clock = Arc::new(ManualClock::new(test_epoch()));

        let env = EngineEnvironment::new(
            Arc::clone(&store) as Arc<dyn DocumentStore>,
            Arc::clone(&directory) as Arc<dyn ParticipantDirectory>,
            Arc::clone(&mailer) as Arc<dyn campus_fest_core::collaborators::Mailer>,
            Arc::clone(&announcer) as Arc<dyn campus_fest_core::collaborators::Announcer>,
        )
        .with_clock(Arc::clone(&clock) as Arc<dyn campus_fest_core::environment::Clock>)
        .with_ticket_issuer(Arc::clone(&tickets) as Arc<dyn campus_fest_core::collaborators::TicketIssuer>)
        .with_dispatch(DispatchMode::Inline)
        .with_retry(contended_retry())
        .with_policy(policy);

        Self {
            engine: FestEngine::new(env),
            store,
            directory,
            mailer,
            announcer,
            tickets,
            clock,
            organizer: Principal::organizer(OrganizerId::new()),
        }
    }

    /// Register a profile in the directory and return its principal
    pub async fn participant(&self, first_name: &str, class: ParticipantClass) -> Principal {
        let profile = ParticipantProfile {
            id: ParticipantId::new(),
            email: format!("{}@campus.test", first_name.to_lowercase()),
            first_name: first_name.to_string(),
            last_name: "Tester".to_string(),
            class,
        };
        let principal = Principal::participant(profile.id);
        self.directory.insert(profile).await;
        principal
    }

    /// `count` group-A participants named `p0`, `p1`, ...
    pub async fn participants(&self, count: usize) -> Vec<Principal> {
        let mut principals = Vec::with_capacity(count);
        for n in 0..count {
            principals.push(self.participant(&format!("p{n}"), ParticipantClass::GroupA).await);
        }
        principals
    }

    /// Create and publish an event as the harness organizer
    pub async fn published(&self, input: NewEvent) -> Event {
        let event = self.engine.lifecycle().create_event(&self.organizer, input).await.unwrap();
        self.engine.lifecycle().publish(&self.organizer, event.id).await.unwrap()
    }

    /// Every registration stored for an event
    pub async fn store_registrations(&self, event_id: EventId) -> Vec<Registration> {
        self.store.list_registrations_for_event(event_id).await.unwrap()
    }

    /// Current stored copy of an event
    pub async fn event(&self, event_id: EventId) -> Event {
        self.engine.environment().load_event(event_id).await.unwrap()
    }

    pub fn now(&self) -> DateTime<Utc> {
        test_epoch()
    }
}

pub fn deadline() -> DateTime<Utc> {
    test_epoch() + Duration::days(7)
}

pub fn start() -> DateTime<Utc> {
    test_epoch() + Duration::days(10)
}

pub fn end() -> DateTime<Utc> {
    start() + Duration::hours(8)
}

/// Individual event with `limit` seats (0 = unlimited)
pub fn individual(name: &str, limit: u32) -> NewEvent {
    let mut input = NewEvent::new(name, EventKind::Individual, deadline(), start(), end());
    input.registration_limit = limit;
    input
}

/// Team event with the given size bounds
pub fn team_event(name: &str, min: u32, max: u32) -> NewEvent {
    let mut input = individual(name, 0);
    input.is_team_event = true;
    input.team_size = Some(TeamSize { min, max });
    input
}

/// Merchandise event selling one item
pub fn shop(name: &str, stock: u32, limit_per_participant: u32, price_cents: u64) -> NewEvent {
    let mut input = NewEvent::new(name, EventKind::Merchandise, deadline(), start(), end());
    input.merchandise_items = vec![NewMerchandiseItem {
        name: "Hoodie".to_string(),
        sizes: vec!["M".to_string(), "L".to_string()],
        colors: Vec::new(),
        stock_quantity: stock,
        purchase_limit_per_participant: limit_per_participant,
        price: Money::from_cents(price_cents),
    }];
    input
}

pub fn no_answers() -> FormResponses {
    FormResponses::new()
}

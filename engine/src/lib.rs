//! # Campus Fest Engine
//!
//! Registration and capacity-control engine for campus fest events.
//!
//! The engine decides who gets a seat, a ticket or a merchandise item while
//! many participants compete for limited capacity and stock at the same time.
//!
//! ## Components
//!
//! - **Capacity Ledger** ([`ledger`]): the only writer of registration
//!   counters, revenue, attendance and item stock; every update is an atomic
//!   compare-and-swap on the event document
//! - **Event Lifecycle** ([`lifecycle`]): creation, status-aware edits and
//!   the `draft → published → ongoing → completed` state machine
//! - **Registration** ([`registration`]): individual registration with
//!   immediate ticketing, ticket lookup and attendance marking
//! - **Merchandise** ([`merchandise`]): orders held for manual payment
//!   approval; stock is debited only on approval
//! - **Teams** ([`team`]): team formation by invite code and bulk ticketing
//!   once a team is complete or closed
//!
//! Side effects (emails, announcements) are returned as
//! [`campus_fest_core::effect::Effect`] values and run after the write they
//! belong to is final. Their failures are logged and never undo anything.
//!
//! ## Example
//!
//! ```
//! use campus_fest_engine::prelude::*;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let directory = Arc::new(InMemoryDirectory::new());
//! let engine = FestEngine::in_memory(&EngineConfig::default(), directory);
//! let organizer = Principal::organizer(OrganizerId::new());
//! assert!(engine.lifecycle().my_events(&organizer).await.unwrap().is_empty());
//! # });
//! ```

pub mod app;
pub mod config;
pub mod directory;
pub mod environment;
pub mod error;
pub mod form;
pub mod ledger;
pub mod lifecycle;
pub mod merchandise;
pub mod metrics;
pub mod notify;
pub mod registration;
pub mod store;
pub mod team;
pub mod ticketing;
pub mod types;

pub use app::FestEngine;
pub use config::EngineConfig;
pub use environment::{EngineEnvironment, EnginePolicy};
pub use error::{EngineError, Result};

/// Commonly used items
pub mod prelude {
    pub use crate::app::FestEngine;
    pub use crate::config::EngineConfig;
    pub use crate::directory::{InMemoryDirectory, ParticipantDirectory};
    pub use crate::environment::{EngineEnvironment, EnginePolicy};
    pub use crate::error::{EngineError, Result};
    pub use crate::form::{FieldType, FieldValue, FormField, FormResponses, FormSchema};
    pub use crate::lifecycle::{EditPolicy, EditReport, EventField, EventPatch, NewEvent, NewMerchandiseItem};
    pub use crate::merchandise::{OrderDecision, OrderLine};
    pub use crate::registration::{RosterEntry, RosterQuery};
    pub use crate::store::memory::InMemoryStore;
    pub use crate::team::{BulkTicketReport, LeaveOutcome, TeamUpdate};
    pub use crate::types::{
        Eligibility, Event, EventId, EventKind, EventStatus, ItemId, Money, OrganizerId,
        ParticipantClass, ParticipantId, ParticipantProfile, PaymentStatus, Principal,
        Registration, RegistrationId, RegistrationStatus, Team, TeamId, TeamSize, TeamStatus,
    };
}

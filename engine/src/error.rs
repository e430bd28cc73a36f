//! Error taxonomy of the engine.
//!
//! Every variant except [`EngineError::Storage`] is a terminal domain failure
//! that is returned to the caller as-is. Storage conflicts are retried inside
//! the compare-and-swap loops and only surface once retries are exhausted.

use crate::form::FormError;
use crate::store::StoreError;
use crate::types::{EventId, EventStatus, ParticipantId, TeamId, TeamStatus};
use thiserror::Error;

/// Result alias used throughout the engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Domain and infrastructure failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The event does not exist
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// A registration, team, item or participant does not exist, or is not
    /// visible to the caller
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record
        entity: &'static str,
        /// Identifier as given
        id: String,
    },

    /// The operation does not apply to this kind of event
    #[error("Event {event_id} does not support this operation: {reason}")]
    WrongEventType {
        /// Event
        event_id: EventId,
        /// What was expected
        reason: String,
    },

    /// Status or deadline does not allow registrations
    #[error("Registration closed for event {event_id}: {reason}")]
    RegistrationClosed {
        /// Event
        event_id: EventId,
        /// Why
        reason: String,
    },

    /// The record is not in a state that allows the operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The lifecycle does not allow this transition
    #[error("Cannot move event from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: EventStatus,
        /// Requested status
        to: EventStatus,
    },

    /// The registration limit has been reached
    #[error("Event {event_id} is full ({limit} registrations)")]
    CapacityExceeded {
        /// Event
        event_id: EventId,
        /// Configured limit
        limit: u32,
    },

    /// Not enough units left for a merchandise line
    #[error("Insufficient stock for {item}: requested {requested}, available {available}")]
    InsufficientStock {
        /// Item name
        item: String,
        /// Units requested
        requested: u32,
        /// Units left
        available: u32,
    },

    /// The participant already holds a registration for the event
    #[error("Participant {participant_id} is already registered for event {event_id}")]
    DuplicateRegistration {
        /// Event
        event_id: EventId,
        /// Participant
        participant_id: ParticipantId,
    },

    /// The participant already belongs to a live team for the event
    #[error("Participant {participant_id} is already in a team for event {event_id}")]
    AlreadyInTeam {
        /// Event
        event_id: EventId,
        /// Participant
        participant_id: ParticipantId,
    },

    /// Every seat on the team is taken
    #[error("Team {0} is full")]
    TeamFull(TeamId),

    /// The team no longer changes membership
    #[error("Team {team_id} is {status}")]
    TeamLocked {
        /// Team
        team_id: TeamId,
        /// Current status
        status: TeamStatus,
    },

    /// The participant's class is not admitted
    #[error("Participant {participant_id} is not eligible for event {event_id}")]
    NotEligible {
        /// Event
        event_id: EventId,
        /// Participant
        participant_id: ParticipantId,
    },

    /// The caller's role or relationship does not allow the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Input failed validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Storage layer failure
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl EngineError {
    /// Shorthand for [`EngineError::NotFound`]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether this is an optimistic-concurrency conflict worth retrying
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Storage(StoreError::ConcurrencyConflict { .. }))
    }

    /// Stable label for metrics and logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::EventNotFound(_) | Self::NotFound { .. } => "not_found",
            Self::WrongEventType { .. } => "wrong_event_type",
            Self::RegistrationClosed { .. } => "registration_closed",
            Self::InvalidState(_) => "invalid_state",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::DuplicateRegistration { .. } => "duplicate_registration",
            Self::AlreadyInTeam { .. } => "already_in_team",
            Self::TeamFull(_) => "team_full",
            Self::TeamLocked { .. } => "team_locked",
            Self::NotEligible { .. } => "not_eligible",
            Self::Forbidden(_) => "forbidden",
            Self::Validation(_) => "validation",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<FormError> for EngineError {
    fn from(error: FormError) -> Self {
        Self::Validation(error.to_string())
    }
}

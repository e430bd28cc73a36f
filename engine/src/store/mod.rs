//! Document store abstraction with optimistic concurrency.
//!
//! The engine persists three document kinds (events, registrations, teams).
//! Every document carries a [`Version`]; replacing a document requires the
//! version that was read, and a mismatch yields
//! [`StoreError::ConcurrencyConflict`]. The `update_*` helpers in this module
//! wrap that read-check-write cycle in a bounded retry loop, which is how every
//! counter and state mutation in the engine stays linearizable per document
//! without a global lock.
//!
//! The store also owns the uniqueness guarantees the domain relies on:
//!
//! - one registration per (event, participant)
//! - globally unique ticket ids
//! - globally unique team invite codes
//! - one non-disbanded team per (event, participant)
//!
//! # Implementations
//!
//! - [`memory::InMemoryStore`]: in-process store used by tests and the demo

use crate::error::{EngineError, Result};
use crate::types::{
    Event, EventId, InviteCode, OrganizerId, ParticipantId, Registration, RegistrationId, Team,
    TeamId,
};
use campus_fest_core::BoxFuture;
use campus_fest_core::collaborators::TicketId;
use campus_fest_runtime::retry::{RetryPolicy, retry_with_predicate};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod memory;

/// Document version used for compare-and-swap
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Version of a freshly inserted document
    pub const INITIAL: Self = Self(1);

    /// Wrap a raw version
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The version after one more write
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A document together with the version it was read at
#[derive(Clone, Debug, PartialEq)]
pub struct Versioned<T> {
    /// Version at read time
    pub version: Version,
    /// The document
    pub doc: T,
}

/// Unique indexes maintained by the store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniqueIndex {
    /// Primary key of any collection
    DocumentId,
    /// (event, participant) on registrations
    RegistrationParticipant,
    /// Ticket id on registrations
    TicketId,
    /// Invite code on teams
    InviteCode,
    /// (event, member) across non-disbanded teams
    TeamMembership,
}

impl fmt::Display for UniqueIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DocumentId => "document_id",
            Self::RegistrationParticipant => "registration_event_participant",
            Self::TicketId => "registration_ticket_id",
            Self::InviteCode => "team_invite_code",
            Self::TeamMembership => "team_event_member",
        };
        f.write_str(name)
    }
}

/// Errors raised by a [`DocumentStore`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Replace targeted a document that does not exist
    #[error("{collection} document not found: {id}")]
    NotFound {
        /// Collection name
        collection: &'static str,
        /// Document id
        id: String,
    },

    /// The document changed since it was read
    #[error(
        "Concurrency conflict on {collection}/{id}: expected {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        /// Collection name
        collection: &'static str,
        /// Document id
        id: String,
        /// Version the writer read
        expected: Version,
        /// Version currently stored
        actual: Version,
    },

    /// A write would break a unique index
    #[error("Unique index {index} violated by {key}")]
    UniqueViolation {
        /// Violated index
        index: UniqueIndex,
        /// Offending key
        key: String,
    },

    /// The backing store could not serve the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether this is a violation of `index`
    #[must_use]
    pub fn violates(&self, index: UniqueIndex) -> bool {
        matches!(self, Self::UniqueViolation { index: violated, .. } if *violated == index)
    }
}

/// Versioned document storage with unique-index enforcement.
///
/// Insert methods fail with [`StoreError::UniqueViolation`] when any unique
/// index would be broken. Replace methods fail with
/// [`StoreError::ConcurrencyConflict`] when `expected` is stale, and with
/// [`StoreError::UniqueViolation`] when the new contents clash with another
/// document. Returned versions are the version after the write.
pub trait DocumentStore: Send + Sync {
    /// Insert a new event
    ///
    /// # Errors
    ///
    /// [`StoreError::UniqueViolation`] if the id is taken.
    fn insert_event(&self, event: Event) -> BoxFuture<'_, std::result::Result<Version, StoreError>>;

    /// Load an event
    ///
    /// # Errors
    ///
    /// Infrastructure failures only.
    fn load_event(
        &self,
        id: EventId,
    ) -> BoxFuture<'_, std::result::Result<Option<Versioned<Event>>, StoreError>>;

    /// Replace an event if it is still at `expected`
    ///
    /// # Errors
    ///
    /// [`StoreError::ConcurrencyConflict`] or [`StoreError::NotFound`].
    fn replace_event(
        &self,
        event: Event,
        expected: Version,
    ) -> BoxFuture<'_, std::result::Result<Version, StoreError>>;

    /// Events owned by an organizer
    ///
    /// # Errors
    ///
    /// Infrastructure failures only.
    fn list_events_by_organizer(
        &self,
        organizer: OrganizerId,
    ) -> BoxFuture<'_, std::result::Result<Vec<Event>, StoreError>>;

    /// Insert a new registration
    ///
    /// # Errors
    ///
    /// [`StoreError::UniqueViolation`] on (event, participant) or ticket id.
    fn insert_registration(
        &self,
        registration: Registration,
    ) -> BoxFuture<'_, std::result::Result<Version, StoreError>>;

    /// Load a registration
    ///
    /// # Errors
    ///
    /// Infrastructure failures only.
    fn load_registration(
        &self,
        id: RegistrationId,
    ) -> BoxFuture<'_, std::result::Result<Option<Versioned<Registration>>, StoreError>>;

    /// Replace a registration if it is still at `expected`.
    ///
    /// Event and participant are immutable; changing either is a unique
    /// violation.
    ///
    /// # Errors
    ///
    /// [`StoreError::ConcurrencyConflict`], [`StoreError::NotFound`] or
    /// [`StoreError::UniqueViolation`] on ticket id.
    fn replace_registration(
        &self,
        registration: Registration,
        expected: Version,
    ) -> BoxFuture<'_, std::result::Result<Version, StoreError>>;

    /// The registration of `participant` for `event`, if any
    ///
    /// # Errors
    ///
    /// Infrastructure failures only.
    fn find_registration(
        &self,
        event: EventId,
        participant: ParticipantId,
    ) -> BoxFuture<'_, std::result::Result<Option<Versioned<Registration>>, StoreError>>;

    /// The registration holding `ticket`
    ///
    /// # Errors
    ///
    /// Infrastructure failures only.
    fn find_registration_by_ticket<'a>(
        &'a self,
        ticket: &'a TicketId,
    ) -> BoxFuture<'a, std::result::Result<Option<Versioned<Registration>>, StoreError>>;

    /// Every registration for an event, oldest first
    ///
    /// # Errors
    ///
    /// Infrastructure failures only.
    fn list_registrations_for_event(
        &self,
        event: EventId,
    ) -> BoxFuture<'_, std::result::Result<Vec<Registration>, StoreError>>;

    /// Every registration of a participant, oldest first
    ///
    /// # Errors
    ///
    /// Infrastructure failures only.
    fn list_registrations_for_participant(
        &self,
        participant: ParticipantId,
    ) -> BoxFuture<'_, std::result::Result<Vec<Registration>, StoreError>>;

    /// Insert a new team
    ///
    /// # Errors
    ///
    /// [`StoreError::UniqueViolation`] on invite code or membership.
    fn insert_team(&self, team: Team) -> BoxFuture<'_, std::result::Result<Version, StoreError>>;

    /// Load a team
    ///
    /// # Errors
    ///
    /// Infrastructure failures only.
    fn load_team(
        &self,
        id: TeamId,
    ) -> BoxFuture<'_, std::result::Result<Option<Versioned<Team>>, StoreError>>;

    /// Replace a team if it is still at `expected`
    ///
    /// # Errors
    ///
    /// [`StoreError::ConcurrencyConflict`], [`StoreError::NotFound`] or
    /// [`StoreError::UniqueViolation`] on membership.
    fn replace_team(
        &self,
        team: Team,
        expected: Version,
    ) -> BoxFuture<'_, std::result::Result<Version, StoreError>>;

    /// The team with `code` (already normalized)
    ///
    /// # Errors
    ///
    /// Infrastructure failures only.
    fn find_team_by_invite_code<'a>(
        &'a self,
        code: &'a InviteCode,
    ) -> BoxFuture<'a, std::result::Result<Option<Versioned<Team>>, StoreError>>;

    /// The non-disbanded team `participant` belongs to for `event`
    ///
    /// # Errors
    ///
    /// Infrastructure failures only.
    fn find_active_team(
        &self,
        event: EventId,
        participant: ParticipantId,
    ) -> BoxFuture<'_, std::result::Result<Option<Versioned<Team>>, StoreError>>;

    /// Every team `participant` is or was a member of
    ///
    /// # Errors
    ///
    /// Infrastructure failures only.
    fn list_teams_for_participant(
        &self,
        participant: ParticipantId,
    ) -> BoxFuture<'_, std::result::Result<Vec<Team>, StoreError>>;
}

/// Read-modify-write an event under optimistic concurrency.
///
/// `mutate` runs against a fresh copy on every attempt; returning an error
/// aborts without writing. Conflicts are retried per `retry`.
///
/// # Errors
///
/// [`EngineError::EventNotFound`], whatever `mutate` returns, or a storage
/// error once retries are exhausted.
pub async fn update_event<R, F>(
    store: &dyn DocumentStore,
    retry: &RetryPolicy,
    id: EventId,
    mutate: F,
) -> Result<(Event, R)>
where
    F: Fn(&mut Event) -> Result<R> + Send + Sync,
    R: Send,
{
    let mutate = &mutate;
    retry_with_predicate(
        retry,
        || async move {
            let current = store
                .load_event(id)
                .await?
                .ok_or(EngineError::EventNotFound(id))?;
            let mut event = current.doc;
            let outcome = mutate(&mut event)?;
            store.replace_event(event.clone(), current.version).await?;
            Ok::<_, EngineError>((event, outcome))
        },
        EngineError::is_conflict,
    )
    .await
}

/// Read-modify-write a registration under optimistic concurrency.
///
/// # Errors
///
/// [`EngineError::NotFound`], whatever `mutate` returns, or a storage error
/// once retries are exhausted.
pub async fn update_registration<R, F>(
    store: &dyn DocumentStore,
    retry: &RetryPolicy,
    id: RegistrationId,
    mutate: F,
) -> Result<(Registration, R)>
where
    F: Fn(&mut Registration) -> Result<R> + Send + Sync,
    R: Send,
{
    let mutate = &mutate;
    retry_with_predicate(
        retry,
        || async move {
            let current = store
                .load_registration(id)
                .await?
                .ok_or_else(|| EngineError::not_found("registration", id))?;
            let mut registration = current.doc;
            let outcome = mutate(&mut registration)?;
            store
                .replace_registration(registration.clone(), current.version)
                .await?;
            Ok::<_, EngineError>((registration, outcome))
        },
        EngineError::is_conflict,
    )
    .await
}

/// Read-modify-write a team under optimistic concurrency.
///
/// # Errors
///
/// [`EngineError::NotFound`], whatever `mutate` returns, or a storage error
/// once retries are exhausted.
pub async fn update_team<R, F>(
    store: &dyn DocumentStore,
    retry: &RetryPolicy,
    id: TeamId,
    mutate: F,
) -> Result<(Team, R)>
where
    F: Fn(&mut Team) -> Result<R> + Send + Sync,
    R: Send,
{
    let mutate = &mutate;
    retry_with_predicate(
        retry,
        || async move {
            let current = store
                .load_team(id)
                .await?
                .ok_or_else(|| EngineError::not_found("team", id))?;
            let mut team = current.doc;
            let outcome = mutate(&mut team)?;
            store.replace_team(team.clone(), current.version).await?;
            Ok::<_, EngineError>((team, outcome))
        },
        EngineError::is_conflict,
    )
    .await
}

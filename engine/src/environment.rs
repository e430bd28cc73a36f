//! Injected dependencies shared by every workflow.

use crate::config::EngineConfig;
use crate::directory::ParticipantDirectory;
use crate::error::{EngineError, Result};
use crate::lifecycle::EditPolicy;
use crate::notify::Notifier;
use crate::store::DocumentStore;
use crate::types::{Event, EventId, ParticipantId, ParticipantProfile};
use crate::ticketing::RandomTicketIssuer;
use campus_fest_core::collaborators::{Announcer, Mailer, TicketIssuer};
use campus_fest_core::effect::Effect;
use campus_fest_core::environment::{Clock, SystemClock};
use campus_fest_runtime::retry::RetryPolicy;
use campus_fest_runtime::{DispatchMode, EffectRunner};
use std::sync::Arc;

/// Workflow policy switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnginePolicy {
    /// Treatment of illegal published-state edits
    pub edit_policy: EditPolicy,
    /// Whether `close_team` requires `team_size.min` members
    pub enforce_team_min_on_close: bool,
    /// Invite code collisions tolerated per team creation
    pub invite_code_attempts: u32,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            edit_policy: EditPolicy::default(),
            enforce_team_min_on_close: true,
            invite_code_attempts: 5,
        }
    }
}

/// Everything a workflow needs from the outside world.
///
/// Cloning is cheap: every collaborator sits behind an `Arc`.
#[derive(Clone)]
pub struct EngineEnvironment {
    /// Time source for deadlines and timestamps
    pub clock: Arc<dyn Clock>,
    /// Document storage
    pub store: Arc<dyn DocumentStore>,
    /// Participant profiles
    pub directory: Arc<dyn ParticipantDirectory>,
    /// Ticket ids and QR payloads
    pub tickets: Arc<dyn TicketIssuer>,
    /// Email and announcement effects
    pub notifier: Notifier,
    /// Runs effects after commit
    pub effects: EffectRunner,
    /// Backoff for compare-and-swap loops
    pub retry: RetryPolicy,
    /// Policy switches
    pub policy: EnginePolicy,
}

impl EngineEnvironment {
    /// Environment with the system clock, random ticket ids, detached effects
    /// and default policies.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        directory: Arc<dyn ParticipantDirectory>,
        mailer: Arc<dyn Mailer>,
        announcer: Arc<dyn Announcer>,
    ) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            store,
            directory,
            tickets: Arc::new(RandomTicketIssuer::default()),
            notifier: Notifier::new(mailer, announcer),
            effects: EffectRunner::default(),
            retry: RetryPolicy::default(),
            policy: EnginePolicy::default(),
        }
    }

    /// Apply ticket prefix, retry, dispatch and policy settings
    #[must_use]
    pub fn configured(mut self, config: &EngineConfig) -> Self {
        self.tickets = Arc::new(RandomTicketIssuer::new(config.ticket_prefix.clone()));
        self.effects = EffectRunner::new(config.side_effects);
        self.retry = config.retry_policy();
        self.policy = config.policy();
        self
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the ticket issuer
    #[must_use]
    pub fn with_ticket_issuer(mut self, tickets: Arc<dyn TicketIssuer>) -> Self {
        self.tickets = tickets;
        self
    }

    /// Replace the effect dispatch mode
    #[must_use]
    pub fn with_dispatch(mut self, mode: DispatchMode) -> Self {
        self.effects = EffectRunner::new(mode);
        self
    }

    /// Replace the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the policy switches
    #[must_use]
    pub fn with_policy(mut self, policy: EnginePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Hand a post-commit effect to the runner
    pub async fn dispatch(&self, effect: Effect) {
        self.effects.dispatch(effect).await;
    }

    /// Current copy of an event.
    ///
    /// # Errors
    ///
    /// [`EngineError::EventNotFound`]; storage errors.
    pub async fn load_event(&self, event_id: EventId) -> Result<Event> {
        self.store
            .load_event(event_id)
            .await?
            .map(|versioned| versioned.doc)
            .ok_or(EngineError::EventNotFound(event_id))
    }

    /// Profile of a participant.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] if the directory does not know them;
    /// directory errors.
    pub async fn profile(&self, participant: ParticipantId) -> Result<ParticipantProfile> {
        self.directory
            .participant(participant)
            .await?
            .ok_or_else(|| EngineError::not_found("participant", participant))
    }
}

//! Engine facade wiring every workflow to one environment.

use crate::config::EngineConfig;
use crate::directory::ParticipantDirectory;
use crate::environment::EngineEnvironment;
use crate::lifecycle::EventLifecycle;
use crate::merchandise::MerchandiseWorkflow;
use crate::notify::LogMailer;
use crate::registration::RegistrationWorkflow;
use crate::store::memory::InMemoryStore;
use crate::team::TeamWorkflow;
use campus_fest_core::collaborators::NoopAnnouncer;
use std::sync::Arc;
use std::time::Duration;

/// All workflows over a shared environment
#[derive(Clone)]
pub struct FestEngine {
    env: EngineEnvironment,
    lifecycle: EventLifecycle,
    registrations: RegistrationWorkflow,
    merchandise: MerchandiseWorkflow,
    teams: TeamWorkflow,
}

impl FestEngine {
    /// Build every workflow over `env`
    #[must_use]
    pub fn new(env: EngineEnvironment) -> Self {
        Self {
            lifecycle: EventLifecycle::new(env.clone()),
            registrations: RegistrationWorkflow::new(env.clone()),
            merchandise: MerchandiseWorkflow::new(env.clone()),
            teams: TeamWorkflow::new(env.clone()),
            env,
        }
    }

    /// Engine over an in-memory store, logging mailer and silent announcer
    #[must_use]
    pub fn in_memory(config: &EngineConfig, directory: Arc<dyn ParticipantDirectory>) -> Self {
        let env = EngineEnvironment::new(
            Arc::new(InMemoryStore::new()),
            directory,
            Arc::new(LogMailer),
            Arc::new(NoopAnnouncer),
        )
        .configured(config);
        Self::new(env)
    }

    /// Shared environment
    #[must_use]
    pub const fn environment(&self) -> &EngineEnvironment {
        &self.env
    }

    /// Event creation, edits and transitions
    #[must_use]
    pub const fn lifecycle(&self) -> &EventLifecycle {
        &self.lifecycle
    }

    /// Individual registrations, tickets and attendance
    #[must_use]
    pub const fn registrations(&self) -> &RegistrationWorkflow {
        &self.registrations
    }

    /// Merchandise orders
    #[must_use]
    pub const fn merchandise(&self) -> &MerchandiseWorkflow {
        &self.merchandise
    }

    /// Team formation
    #[must_use]
    pub const fn teams(&self) -> &TeamWorkflow {
        &self.teams
    }

    /// Wait for detached side effects to drain.
    ///
    /// Returns `false` if some were still running at `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let pending = self.env.effects.pending();
        let drained = self.env.effects.wait_idle(timeout).await;
        if drained {
            tracing::info!(pending, "Engine shut down");
        } else {
            tracing::warn!(
                pending = self.env.effects.pending(),
                "Shutdown timed out with side effects still running"
            );
        }
        drained
    }
}

//! Post-commit notifications.
//!
//! Each method returns an [`Effect`] describing one delivery. Effects are
//! built after the write they follow is final and are handed to the
//! [`EffectRunner`](campus_fest_runtime::EffectRunner); a failed delivery is
//! logged and counted and never reaches the caller.

use campus_fest_core::BoxFuture;
use campus_fest_core::collaborators::{
    Announcer, ApprovalEmail, CollaboratorError, EventAnnouncement, InviteEmail, Mailer,
    RejectionEmail, TicketEmail,
};
use campus_fest_core::effect::Effect;
use std::sync::Arc;

/// Mailer that writes every message to the log instead of sending it.
///
/// Used by the demo and by deployments without a mail relay.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send_ticket_email<'a>(
        &'a self,
        recipient: &'a str,
        payload: &'a TicketEmail,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            tracing::info!(
                recipient,
                event = %payload.event_name,
                ticket_id = %payload.ticket_id,
                "ticket email"
            );
            Ok(())
        })
    }

    fn send_approval_email<'a>(
        &'a self,
        recipient: &'a str,
        payload: &'a ApprovalEmail,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            tracing::info!(
                recipient,
                event = %payload.event_name,
                ticket_id = %payload.ticket_id,
                total_cents = payload.total_cents,
                "approval email"
            );
            Ok(())
        })
    }

    fn send_rejection_email<'a>(
        &'a self,
        recipient: &'a str,
        payload: &'a RejectionEmail,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            tracing::info!(recipient, event = %payload.event_name, "rejection email");
            Ok(())
        })
    }

    fn send_invite_email<'a>(
        &'a self,
        recipient: &'a str,
        payload: &'a InviteEmail,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            tracing::info!(
                recipient,
                team = %payload.team_name,
                invite_code = %payload.invite_code,
                "invite email"
            );
            Ok(())
        })
    }
}

/// Builds delivery effects over the mailer and announcer
#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    announcer: Arc<dyn Announcer>,
}

fn record_failure(effect: &'static str, recipient: &str, error: &CollaboratorError) {
    tracing::warn!(effect, recipient, %error, "Side effect failed");
    metrics::counter!("fest_side_effect_failures_total", "effect" => effect).increment(1);
}

impl Notifier {
    /// Wrap the collaborators
    #[must_use]
    pub fn new(mailer: Arc<dyn Mailer>, announcer: Arc<dyn Announcer>) -> Self {
        Self { mailer, announcer }
    }

    /// Ticket confirmation
    #[must_use]
    pub fn ticket_email(&self, recipient: String, payload: TicketEmail) -> Effect {
        let mailer = Arc::clone(&self.mailer);
        Effect::future(async move {
            match mailer.send_ticket_email(&recipient, &payload).await {
                Ok(()) => tracing::debug!(recipient = %recipient, ticket_id = %payload.ticket_id, "Ticket email sent"),
                Err(error) => record_failure("ticket_email", &recipient, &error),
            }
        })
    }

    /// Merchandise approval notice
    #[must_use]
    pub fn approval_email(&self, recipient: String, payload: ApprovalEmail) -> Effect {
        let mailer = Arc::clone(&self.mailer);
        Effect::future(async move {
            if let Err(error) = mailer.send_approval_email(&recipient, &payload).await {
                record_failure("approval_email", &recipient, &error);
            }
        })
    }

    /// Merchandise rejection notice
    #[must_use]
    pub fn rejection_email(&self, recipient: String, payload: RejectionEmail) -> Effect {
        let mailer = Arc::clone(&self.mailer);
        Effect::future(async move {
            if let Err(error) = mailer.send_rejection_email(&recipient, &payload).await {
                record_failure("rejection_email", &recipient, &error);
            }
        })
    }

    /// Team invitation
    #[must_use]
    pub fn invite_email(&self, recipient: String, payload: InviteEmail) -> Effect {
        let mailer = Arc::clone(&self.mailer);
        Effect::future(async move {
            if let Err(error) = mailer.send_invite_email(&recipient, &payload).await {
                record_failure("invite_email", &recipient, &error);
            }
        })
    }

    /// Public announcement of a newly published event
    #[must_use]
    pub fn announcement(&self, announcement: EventAnnouncement) -> Effect {
        let announcer = Arc::clone(&self.announcer);
        Effect::future(async move {
            match announcer.announce_event_published(&announcement).await {
                Ok(()) => tracing::debug!(event = %announcement.name, "Event announced"),
                Err(error) => record_failure("announcement", &announcement.name, &error),
            }
        })
    }
}

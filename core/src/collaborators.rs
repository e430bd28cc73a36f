//! Contracts for the external collaborators the engine invokes.
//!
//! Ticket issuance, mail delivery and event announcements are implemented
//! outside the engine. The engine only needs these narrow, dyn-compatible
//! traits. Mail and announcement failures are best-effort: callers log them
//! and move on.

use crate::BoxFuture;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors reported by collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The message could not be delivered.
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// The collaborator could not be reached at all.
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    /// The payload could not be rendered (QR image, email body, ...).
    #[error("Rendering failed: {0}")]
    Rendering(String),
}

/// Opaque, globally unique ticket identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TicketId(String);

impl TicketId {
    /// Wrap an issued identifier
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scannable payload for a ticket (an encoded QR image in production)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrPayload(String);

impl QrPayload {
    /// Wrap a rendered payload
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The payload as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether rendering produced nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Issues ticket identifiers and their scannable payloads.
pub trait TicketIssuer: Send + Sync {
    /// Allocate a new, globally unique ticket identifier.
    fn generate_ticket_id(&self) -> TicketId;

    /// Render the scannable payload for a ticket.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError::Rendering`] if the payload cannot be produced.
    fn generate_qr<'a>(
        &'a self,
        ticket_id: &'a TicketId,
    ) -> BoxFuture<'a, Result<QrPayload, CollaboratorError>>;
}

/// Ticket confirmation sent after a registration is confirmed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketEmail {
    /// Participant display name
    pub participant_name: String,
    /// Event name
    pub event_name: String,
    /// When the event starts
    pub event_start: DateTime<Utc>,
    /// Issued ticket
    pub ticket_id: TicketId,
    /// Scannable payload
    pub qr_code: QrPayload,
}

/// Merchandise order approval notice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalEmail {
    /// Participant display name
    pub participant_name: String,
    /// Event name
    pub event_name: String,
    /// Issued ticket
    pub ticket_id: TicketId,
    /// Scannable payload
    pub qr_code: QrPayload,
    /// Order total in cents
    pub total_cents: u64,
}

/// Merchandise order rejection notice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionEmail {
    /// Participant display name
    pub participant_name: String,
    /// Event name
    pub event_name: String,
}

/// Team invitation carrying the invite code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteEmail {
    /// Team name
    pub team_name: String,
    /// Event name
    pub event_name: String,
    /// Leader display name
    pub leader_name: String,
    /// Code to enter on the event page
    pub invite_code: String,
}

/// Mail delivery. Every method is best-effort.
pub trait Mailer: Send + Sync {
    /// Send a ticket confirmation.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails.
    fn send_ticket_email<'a>(
        &'a self,
        recipient: &'a str,
        payload: &'a TicketEmail,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>>;

    /// Send a merchandise approval notice.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails.
    fn send_approval_email<'a>(
        &'a self,
        recipient: &'a str,
        payload: &'a ApprovalEmail,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>>;

    /// Send a merchandise rejection notice.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails.
    fn send_rejection_email<'a>(
        &'a self,
        recipient: &'a str,
        payload: &'a RejectionEmail,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>>;

    /// Send a team invitation.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails.
    fn send_invite_email<'a>(
        &'a self,
        recipient: &'a str,
        payload: &'a InviteEmail,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>>;
}

/// Public summary of a freshly published event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAnnouncement {
    /// Event name
    pub name: String,
    /// Event description
    pub description: String,
    /// `individual` or `merchandise`
    pub kind: String,
    /// Registration fee in cents (0 = free)
    pub fee_cents: u64,
    /// Start of the event
    pub start: DateTime<Utc>,
    /// End of the event
    pub end: DateTime<Utc>,
    /// Free-form tags
    pub tags: Vec<String>,
}

/// Announces published events to a third-party channel.
pub trait Announcer: Send + Sync {
    /// Announce an event that just transitioned to `published`.
    ///
    /// # Errors
    ///
    /// Returns an error if the announcement could not be posted.
    fn announce_event_published<'a>(
        &'a self,
        announcement: &'a EventAnnouncement,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>>;
}

/// Announcer that posts nowhere, for deployments without a channel configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnnouncer;

impl Announcer for NoopAnnouncer {
    fn announce_event_published<'a>(
        &'a self,
        _announcement: &'a EventAnnouncement,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_id_displays_raw_value() {
        let id = TicketId::new("TKT-0A1B2C3D4E5F");
        assert_eq!(id.to_string(), "TKT-0A1B2C3D4E5F");
        assert_eq!(id.as_str(), "TKT-0A1B2C3D4E5F");
    }

    #[test]
    fn noop_announcer_succeeds() {
        let announcement = EventAnnouncement {
            name: "Hackathon".to_string(),
            description: String::new(),
            kind: "individual".to_string(),
            fee_cents: 0,
            start: Utc::now(),
            end: Utc::now(),
            tags: vec![],
        };
        let result = tokio_test::block_on(NoopAnnouncer.announce_event_published(&announcement));
        assert!(result.is_ok());
    }
}

//! Recording implementations of the collaborator contracts.
//!
//! Each mock keeps everything it was asked to do so tests can assert on
//! delivered notifications, and each can be switched into a failing mode to
//! exercise the best-effort paths.

#![allow(clippy::missing_panics_doc)] // Poisoned mutexes are recovered, not propagated

use campus_fest_core::BoxFuture;
use campus_fest_core::collaborators::{
    Announcer, ApprovalEmail, CollaboratorError, EventAnnouncement, InviteEmail, Mailer, QrPayload,
    RejectionEmail, TicketEmail, TicketId, TicketIssuer,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Issues `TKT-TEST-000001`, `TKT-TEST-000002`, ...
#[derive(Debug, Default)]
pub struct SequentialTicketIssuer {
    next: AtomicU64,
    fail_qr: AtomicBool,
}

impl SequentialTicketIssuer {
    /// Create an issuer starting at 1
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
            fail_qr: AtomicBool::new(false),
        }
    }

    /// Make every QR rendering fail from now on
    pub fn fail_qr(&self) {
        self.fail_qr.store(true, Ordering::SeqCst);
    }

    /// Number of ticket ids handed out so far
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl TicketIssuer for SequentialTicketIssuer {
    fn generate_ticket_id(&self) -> TicketId {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        TicketId::new(format!("TKT-TEST-{n:06}"))
    }

    fn generate_qr<'a>(
        &'a self,
        ticket_id: &'a TicketId,
    ) -> BoxFuture<'a, Result<QrPayload, CollaboratorError>> {
        Box::pin(async move {
            if self.fail_qr.load(Ordering::SeqCst) {
                return Err(CollaboratorError::Rendering("qr renderer offline".to_string()));
            }
            Ok(QrPayload::new(format!("qr:{ticket_id}")))
        })
    }
}

/// One message handed to the [`RecordingMailer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMail {
    /// Ticket confirmation
    Ticket {
        /// Recipient address
        to: String,
        /// Payload
        payload: TicketEmail,
    },
    /// Merchandise approval
    Approval {
        /// Recipient address
        to: String,
        /// Payload
        payload: ApprovalEmail,
    },
    /// Merchandise rejection
    Rejection {
        /// Recipient address
        to: String,
        /// Payload
        payload: RejectionEmail,
    },
    /// Team invitation
    Invite {
        /// Recipient address
        to: String,
        /// Payload
        payload: InviteEmail,
    },
}

impl SentMail {
    /// Recipient address of the message
    #[must_use]
    pub fn recipient(&self) -> &str {
        match self {
            Self::Ticket { to, .. }
            | Self::Approval { to, .. }
            | Self::Rejection { to, .. }
            | Self::Invite { to, .. } => to,
        }
    }
}

/// Mailer that records every message.
///
/// In failing mode, messages are still recorded as *attempted* but every call
/// returns [`CollaboratorError::Delivery`]. Individual recipients can also be
/// made to bounce.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    attempts: AtomicU64,
    failing: AtomicBool,
    bouncing: Mutex<Vec<String>>,
}

impl RecordingMailer {
    /// Create a mailer that delivers everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mailer whose every delivery fails
    #[must_use]
    pub fn failing() -> Self {
        let mailer = Self::default();
        mailer.failing.store(true, Ordering::SeqCst);
        mailer
    }

    /// Make deliveries to one address fail
    pub fn bounce(&self, address: impl Into<String>) {
        lock(&self.bouncing).push(address.into());
    }

    /// Successfully delivered messages, in order
    #[must_use]
    pub fn sent(&self) -> Vec<SentMail> {
        lock(&self.sent).clone()
    }

    /// Number of delivery attempts, successful or not
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Delivered ticket confirmations
    #[must_use]
    pub fn tickets(&self) -> Vec<TicketEmail> {
        self.sent()
            .into_iter()
            .filter_map(|mail| match mail {
                SentMail::Ticket { payload, .. } => Some(payload),
                _ => None,
            })
            .collect()
    }

    fn deliver(&self, mail: SentMail) -> Result<(), CollaboratorError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Delivery("smtp relay refused".to_string()));
        }
        if lock(&self.bouncing).iter().any(|address| address == mail.recipient()) {
            return Err(CollaboratorError::Delivery(format!(
                "mailbox {} unavailable",
                mail.recipient()
            )));
        }
        lock(&self.sent).push(mail);
        Ok(())
    }
}

impl Mailer for RecordingMailer {
    fn send_ticket_email<'a>(
        &'a self,
        recipient: &'a str,
        payload: &'a TicketEmail,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            self.deliver(SentMail::Ticket {
                to: recipient.to_string(),
                payload: payload.clone(),
            })
        })
    }

    fn send_approval_email<'a>(
        &'a self,
        recipient: &'a str,
        payload: &'a ApprovalEmail,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            self.deliver(SentMail::Approval {
                to: recipient.to_string(),
                payload: payload.clone(),
            })
        })
    }

    fn send_rejection_email<'a>(
        &'a self,
        recipient: &'a str,
        payload: &'a RejectionEmail,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            self.deliver(SentMail::Rejection {
                to: recipient.to_string(),
                payload: payload.clone(),
            })
        })
    }

    fn send_invite_email<'a>(
        &'a self,
        recipient: &'a str,
        payload: &'a InviteEmail,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            self.deliver(SentMail::Invite {
                to: recipient.to_string(),
                payload: payload.clone(),
            })
        })
    }
}

/// Announcer that records every announcement
#[derive(Debug, Default)]
pub struct RecordingAnnouncer {
    announced: Mutex<Vec<EventAnnouncement>>,
    failing: AtomicBool,
}

impl RecordingAnnouncer {
    /// Create an announcer that accepts everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an announcer whose channel is down
    #[must_use]
    pub fn failing() -> Self {
        let announcer = Self::default();
        announcer.failing.store(true, Ordering::SeqCst);
        announcer
    }

    /// Accepted announcements, in order
    #[must_use]
    pub fn announced(&self) -> Vec<EventAnnouncement> {
        lock(&self.announced).clone()
    }
}

impl Announcer for RecordingAnnouncer {
    fn announce_event_published<'a>(
        &'a self,
        announcement: &'a EventAnnouncement,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(CollaboratorError::Unavailable("webhook returned 502".to_string()));
            }
            lock(&self.announced).push(announcement.clone());
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn invite() -> InviteEmail {
        InviteEmail {
            team_name: "Null Pointers".to_string(),
            event_name: "Hackathon".to_string(),
            leader_name: "Asha".to_string(),
            invite_code: "0A1B2C3D".to_string(),
        }
    }

    #[test]
    fn issuer_is_sequential() {
        let issuer = SequentialTicketIssuer::new();
        assert_eq!(issuer.generate_ticket_id().as_str(), "TKT-TEST-000001");
        assert_eq!(issuer.generate_ticket_id().as_str(), "TKT-TEST-000002");
        assert_eq!(issuer.issued(), 2);
    }

    #[tokio::test]
    async fn issuer_can_fail_qr() {
        let issuer = SequentialTicketIssuer::new();
        let id = issuer.generate_ticket_id();
        assert!(issuer.generate_qr(&id).await.is_ok());
        issuer.fail_qr();
        assert!(issuer.generate_qr(&id).await.is_err());
    }

    #[tokio::test]
    async fn mailer_records_and_bounces() {
        let mailer = RecordingMailer::new();
        mailer.bounce("gone@example.edu");

        mailer.send_invite_email("a@example.edu", &invite()).await.unwrap();
        assert!(mailer.send_invite_email("gone@example.edu", &invite()).await.is_err());

        assert_eq!(mailer.attempts(), 2);
        assert_eq!(mailer.sent().len(), 1);
        assert_eq!(mailer.sent()[0].recipient(), "a@example.edu");
    }

    #[tokio::test]
    async fn failing_mailer_delivers_nothing() {
        let mailer = RecordingMailer::failing();
        assert!(mailer.send_invite_email("a@example.edu", &invite()).await.is_err());
        assert!(mailer.sent().is_empty());
        assert_eq!(mailer.attempts(), 1);
    }
}

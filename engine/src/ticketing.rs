//! Ticket and invite-code generation.

use crate::types::{InviteCode, Ticket};
use campus_fest_core::BoxFuture;
use campus_fest_core::collaborators::{CollaboratorError, QrPayload, TicketId, TicketIssuer};
use rand::RngCore;
use std::fmt::Write as _;

const TICKET_RANDOM_BYTES: usize = 6;
const INVITE_CODE_BYTES: usize = 4;

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0_u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    buf.iter().fold(String::with_capacity(bytes * 2), |mut out, byte| {
        let _ = write!(out, "{byte:02X}");
        out
    })
}

/// Issues `PREFIX-XXXXXXXXXXXX` ticket ids (12 uppercase hex characters).
///
/// The QR payload is the string a scanner reads; rendering it to an image
/// happens outside the engine.
#[derive(Debug, Clone)]
pub struct RandomTicketIssuer {
    prefix: String,
}

impl RandomTicketIssuer {
    /// Issuer with the given id prefix (`TKT` by default)
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for RandomTicketIssuer {
    fn default() -> Self {
        Self::new("TKT")
    }
}

impl TicketIssuer for RandomTicketIssuer {
    fn generate_ticket_id(&self) -> TicketId {
        TicketId::new(format!("{}-{}", self.prefix, random_hex(TICKET_RANDOM_BYTES)))
    }

    fn generate_qr<'a>(
        &'a self,
        ticket_id: &'a TicketId,
    ) -> BoxFuture<'a, Result<QrPayload, CollaboratorError>> {
        Box::pin(async move {
            let payload = serde_json::json!({ "ticketId": ticket_id.as_str() });
            Ok(QrPayload::new(payload.to_string()))
        })
    }
}

/// Fresh 8-character invite code
#[must_use]
pub fn generate_invite_code() -> InviteCode {
    InviteCode::new(&random_hex(INVITE_CODE_BYTES))
}

/// Allocate a ticket id and render its payload.
///
/// A rendering failure leaves the payload empty; the ticket stays valid.
pub async fn issue_ticket(issuer: &dyn TicketIssuer) -> Ticket {
    let id = issuer.generate_ticket_id();
    let qr_code = match issuer.generate_qr(&id).await {
        Ok(payload) => payload,
        Err(error) => {
            tracing::warn!(ticket_id = %id, %error, "QR rendering failed, issuing ticket without payload");
            metrics::counter!("fest_side_effect_failures_total", "effect" => "qr").increment(1);
            QrPayload::default()
        },
    };
    metrics::counter!("fest_tickets_issued_total").increment(1);
    Ticket { id, qr_code }
}

//! Domain types for the registration engine.
//!
//! Value objects (identifiers, [`Money`]), the three stored documents
//! ([`Event`], [`Registration`], [`Team`]) and the caller identity
//! ([`Principal`]). Counter fields on [`Event`] are only ever mutated through
//! the capacity ledger.

use crate::error::EngineError;
use crate::form::{FormResponses, FormSchema};
use campus_fest_core::collaborators::{QrPayload, TicketId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an event
    EventId
);
uuid_id!(
    /// Unique identifier for an organizer account
    OrganizerId
);
uuid_id!(
    /// Unique identifier for a participant account
    ParticipantId
);
uuid_id!(
    /// Unique identifier for a registration (or merchandise order)
    RegistrationId
);
uuid_id!(
    /// Unique identifier for a team
    TeamId
);
uuid_id!(
    /// Unique identifier for a merchandise item within an event
    ItemId
);

/// Team invite code: 8 uppercase hex characters, matched case-insensitively.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InviteCode(String);

impl InviteCode {
    /// Normalize a code as typed by a participant
    #[must_use]
    pub fn new(code: &str) -> Self {
        Self(code.trim().to_ascii_uppercase())
    }

    /// The normalized code
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InviteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Value Objects
// ============================================================================

/// Money amount in the smallest currency unit (paise / cents)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Zero
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Subtracts, stopping at zero
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Multiplies a unit price by a quantity with overflow checking
    #[must_use]
    pub fn checked_times(self, quantity: u32) -> Option<Self> {
        self.0.checked_mul(u64::from(quantity)).map(Self)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Role attached to an authenticated caller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Registers for events, forms teams, orders merchandise
    Participant,
    /// Owns and runs events
    Organizer,
    /// Provisions organizers; has no engine operations
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Participant => "participant",
            Self::Organizer => "organizer",
            Self::Admin => "admin",
        };
        f.write_str(name)
    }
}

/// Authenticated caller, supplied and trusted by the boundary
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Account id
    pub id: Uuid,
    /// Account role
    pub role: Role,
}

impl Principal {
    /// A participant caller
    #[must_use]
    pub const fn participant(id: ParticipantId) -> Self {
        Self {
            id: id.0,
            role: Role::Participant,
        }
    }

    /// An organizer caller
    #[must_use]
    pub const fn organizer(id: OrganizerId) -> Self {
        Self {
            id: id.0,
            role: Role::Organizer,
        }
    }

    /// The caller as a participant.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Forbidden`] for any other role.
    pub fn as_participant(&self) -> Result<ParticipantId, EngineError> {
        match self.role {
            Role::Participant => Ok(ParticipantId(self.id)),
            other => Err(EngineError::Forbidden(format!(
                "{other} accounts cannot act as participants"
            ))),
        }
    }

    /// The caller as an organizer.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Forbidden`] for any other role.
    pub fn as_organizer(&self) -> Result<OrganizerId, EngineError> {
        match self.role {
            Role::Organizer => Ok(OrganizerId(self.id)),
            other => Err(EngineError::Forbidden(format!(
                "{other} accounts cannot manage events"
            ))),
        }
    }
}

/// Eligibility class of a participant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParticipantClass {
    /// On-campus students
    GroupA,
    /// Everyone else
    GroupB,
}

/// The identity layer's view of a participant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantProfile {
    /// Account id
    pub id: ParticipantId,
    /// Delivery address for tickets and invites
    pub email: String,
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: String,
    /// Eligibility class
    pub class: ParticipantClass,
}

impl ParticipantProfile {
    /// "First Last"
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

// ============================================================================
// Event
// ============================================================================

/// What a registration for the event produces
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Individual or team registration yielding a ticket
    Individual,
    /// Merchandise sale approved by the organizer
    Merchandise,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Individual => f.write_str("individual"),
            Self::Merchandise => f.write_str("merchandise"),
        }
    }
}

/// Event lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Being prepared; invisible to participants
    Draft,
    /// Open for registration
    Published,
    /// Running; registration still open until the deadline
    Ongoing,
    /// Finished (terminal)
    Completed,
    /// Cancelled or closed early (terminal)
    Closed,
}

impl EventStatus {
    /// Whether the lifecycle allows moving from `self` to `target`
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Draft, Self::Published)
                | (Self::Published, Self::Ongoing | Self::Closed)
                | (Self::Ongoing, Self::Completed | Self::Closed)
        )
    }

    /// Whether registrations, orders and team joins are accepted
    #[must_use]
    pub const fn accepts_registrations(self) -> bool {
        matches!(self, Self::Published | Self::Ongoing)
    }

    /// Completed and closed events never change again
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Closed)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Who may register
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Eligibility {
    /// Everyone
    #[default]
    All,
    /// Only [`ParticipantClass::GroupA`]
    GroupA,
    /// Only [`ParticipantClass::GroupB`]
    GroupB,
}

impl Eligibility {
    /// Whether a participant of `class` may register
    #[must_use]
    pub const fn admits(self, class: ParticipantClass) -> bool {
        matches!(
            (self, class),
            (Self::All, _)
                | (Self::GroupA, ParticipantClass::GroupA)
                | (Self::GroupB, ParticipantClass::GroupB)
        )
    }
}

/// Team size bounds, leader included
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSize {
    /// Smallest team that may be closed
    pub min: u32,
    /// Seats per team; reaching it completes the team
    pub max: u32,
}

impl Default for TeamSize {
    fn default() -> Self {
        Self { min: 2, max: 4 }
    }
}

/// A merchandise item sold through an event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchandiseItem {
    /// Item id
    pub id: ItemId,
    /// Display name
    pub name: String,
    /// Offered sizes; empty means one-size
    pub sizes: Vec<String>,
    /// Offered colors; empty means a single variant
    pub colors: Vec<String>,
    /// Units left; debited only on approval
    pub stock_quantity: u32,
    /// Units a participant may hold across non-rejected orders
    pub purchase_limit_per_participant: u32,
    /// Unit price
    pub price: Money,
}

/// An event document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event id
    pub id: EventId,
    /// Owning organizer
    pub organizer: OrganizerId,
    /// Name
    pub name: String,
    /// Description
    pub description: String,
    /// Individual or merchandise
    pub kind: EventKind,
    /// Lifecycle state
    pub status: EventStatus,
    /// Who may register
    pub eligibility: Eligibility,
    /// Last instant a registration is accepted
    pub registration_deadline: DateTime<Utc>,
    /// Start
    pub start_date: DateTime<Utc>,
    /// End
    pub end_date: DateTime<Utc>,
    /// Maximum confirmed registrations; 0 means unlimited
    pub registration_limit: u32,
    /// Per-ticket fee
    pub registration_fee: Money,
    /// Free-form tags
    pub tags: Vec<String>,
    /// Whether participants register as teams
    pub is_team_event: bool,
    /// Team size bounds (team events only)
    pub team_size: TeamSize,
    /// Custom registration form
    pub custom_form: FormSchema,
    /// Set after the first registration; the form is frozen from then on
    pub form_locked: bool,
    /// Items for sale (merchandise events only)
    pub merchandise_items: Vec<MerchandiseItem>,
    /// Confirmed registrations
    pub registration_count: u32,
    /// Registrations counted for the trending view
    pub registrations_last_24h: u32,
    /// Fees and approved order totals
    pub total_revenue: Money,
    /// Scanned tickets
    pub attendance_count: u32,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Whether registrations are accepted at `now`
    #[must_use]
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status.accepts_registrations() && now <= self.registration_deadline
    }

    /// Whether `seats` more registrations fit under the limit
    #[must_use]
    pub const fn has_capacity_for(&self, seats: u32) -> bool {
        if self.registration_limit == 0 {
            return true;
        }
        match self.registration_count.checked_add(seats) {
            Some(total) => total <= self.registration_limit,
            None => false,
        }
    }

    /// Seats left, or `None` when unlimited
    #[must_use]
    pub const fn remaining_capacity(&self) -> Option<u32> {
        if self.registration_limit == 0 {
            None
        } else {
            Some(self.registration_limit.saturating_sub(self.registration_count))
        }
    }

    /// Look up a merchandise item
    #[must_use]
    pub fn item(&self, id: ItemId) -> Option<&MerchandiseItem> {
        self.merchandise_items.iter().find(|item| item.id == id)
    }

    /// Look up a merchandise item for mutation
    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut MerchandiseItem> {
        self.merchandise_items.iter_mut().find(|item| item.id == id)
    }

    /// Whether participants register through teams
    #[must_use]
    pub const fn uses_teams(&self) -> bool {
        self.is_team_event && matches!(self.kind, EventKind::Individual)
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Registration state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Merchandise order awaiting a decision
    Pending,
    /// Ticket issued
    Confirmed,
    /// Withdrawn
    Cancelled,
    /// Order rejected by the organizer
    Rejected,
}

/// Payment state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Nothing to pay
    Na,
    /// Fee settled at registration
    Paid,
    /// Proof uploaded, organizer has not decided
    PendingApproval,
    /// Organizer approved
    Approved,
    /// Organizer rejected
    Rejected,
    /// Awaiting payment
    Pending,
    /// Refunded
    Refunded,
}

/// Issued ticket
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Globally unique ticket id
    pub id: TicketId,
    /// Scannable payload; empty when rendering failed
    pub qr_code: QrPayload,
}

/// One line of a merchandise order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchandiseSelection {
    /// Ordered item
    pub item_id: ItemId,
    /// Item name at order time
    pub item_name: String,
    /// Chosen size
    pub size: Option<String>,
    /// Chosen color
    pub color: Option<String>,
    /// Units
    pub quantity: u32,
    /// Unit price at order time
    pub unit_price: Money,
}

/// A registration document; merchandise orders are registrations too
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    /// Registration id
    pub id: RegistrationId,
    /// Event
    pub event_id: EventId,
    /// Participant
    pub participant_id: ParticipantId,
    /// State
    pub status: RegistrationStatus,
    /// Payment state
    pub payment_status: PaymentStatus,
    /// Issued ticket, if any
    pub ticket: Option<Ticket>,
    /// Merchandise order lines
    pub merchandise_selections: Vec<MerchandiseSelection>,
    /// Order total (merchandise) or fee paid
    pub amount: Money,
    /// Answers to the custom form
    pub form_responses: FormResponses,
    /// Team the ticket was issued through
    pub team_id: Option<TeamId>,
    /// Whether the ticket has been scanned
    pub attendance_marked: bool,
    /// Creation time
    pub registered_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    /// The issued ticket id
    #[must_use]
    pub fn ticket_id(&self) -> Option<&TicketId> {
        self.ticket.as_ref().map(|ticket| &ticket.id)
    }

    /// Units of `item` in this order
    #[must_use]
    pub fn quantity_of(&self, item: ItemId) -> u32 {
        self.merchandise_selections
            .iter()
            .filter(|line| line.item_id == item)
            .map(|line| line.quantity)
            .sum()
    }
}

// ============================================================================
// Team
// ============================================================================

/// Team state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatus {
    /// Accepting members
    Forming,
    /// Closed early by the leader; tickets issued
    Closed,
    /// Full; tickets issued
    Complete,
    /// Leader left (terminal)
    Disbanded,
}

impl fmt::Display for TeamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Forming => "forming",
            Self::Closed => "closed",
            Self::Complete => "complete",
            Self::Disbanded => "disbanded",
        };
        f.write_str(name)
    }
}

/// A team document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Team {
    /// Team id
    pub id: TeamId,
    /// Event
    pub event_id: EventId,
    /// Name
    pub name: String,
    /// Creator; always `members[0]`
    pub leader: ParticipantId,
    /// Members in join order, leader first
    pub members: Vec<ParticipantId>,
    /// Seats, copied from the event's team size at creation
    pub max_size: u32,
    /// Immutable join code
    pub invite_code: InviteCode,
    /// State
    pub status: TeamStatus,
    /// Each member's answers to the custom form
    pub member_form_responses: HashMap<ParticipantId, FormResponses>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Team {
    /// Whether `participant` is on the team
    #[must_use]
    pub fn is_member(&self, participant: ParticipantId) -> bool {
        self.members.contains(&participant)
    }

    /// Whether every seat is taken
    #[must_use]
    pub fn is_full(&self) -> bool {
        u32::try_from(self.members.len()).map_or(true, |len| len >= self.max_size)
    }

    /// Members that count towards the membership index
    #[must_use]
    pub fn active_members(&self) -> &[ParticipantId] {
        if self.status == TeamStatus::Disbanded {
            &[]
        } else {
            &self.members
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        use EventStatus::*;
        assert!(Draft.can_transition_to(Published));
        assert!(Published.can_transition_to(Ongoing));
        assert!(Published.can_transition_to(Closed));
        assert!(Ongoing.can_transition_to(Completed));
        assert!(Ongoing.can_transition_to(Closed));

        assert!(!Draft.can_transition_to(Ongoing));
        assert!(!Published.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Published));
        assert!(!Published.can_transition_to(Published));
    }

    #[test]
    fn eligibility_admits() {
        assert!(Eligibility::All.admits(ParticipantClass::GroupB));
        assert!(Eligibility::GroupA.admits(ParticipantClass::GroupA));
        assert!(!Eligibility::GroupA.admits(ParticipantClass::GroupB));
        assert!(!Eligibility::GroupB.admits(ParticipantClass::GroupA));
    }

    #[test]
    fn invite_codes_are_case_insensitive() {
        assert_eq!(InviteCode::new(" 0a1b2c3d "), InviteCode::new("0A1B2C3D"));
    }

    #[test]
    fn money_arithmetic() {
        let price = Money::from_cents(25_000);
        assert_eq!(price.checked_times(3), Some(Money::from_cents(75_000)));
        assert_eq!(price.to_string(), "250.00");
        assert_eq!(Money::from_cents(5).saturating_sub(price), Money::ZERO);
        assert_eq!(Money::from_cents(u64::MAX).checked_times(2), None);
    }

    #[test]
    fn role_gating() {
        let participant = ParticipantId::new();
        let principal = Principal::participant(participant);
        assert_eq!(principal.as_participant().ok(), Some(participant));
        assert!(matches!(principal.as_organizer(), Err(EngineError::Forbidden(_))));
    }
}

//! Event lifecycle: creation, edits, publication and status transitions.
//!
//! ```text
//! draft ──publish──▶ published ──▶ ongoing ──▶ completed
//!                        │            │
//!                        └──▶ closed ◀┘
//! ```
//!
//! What may be edited depends on the status. In `draft` everything is
//! editable (the custom form only while unlocked). In `published` only the
//! description, a later deadline and a limit that does not shrink are
//! accepted; other fields are handled per [`EditPolicy`]. Later states refuse
//! edits entirely.

use crate::environment::EngineEnvironment;
use crate::error::{EngineError, Result};
use crate::form::FormSchema;
use crate::store::update_event;
use crate::types::{
    Eligibility, Event, EventId, EventKind, EventStatus, ItemId, MerchandiseItem, Money,
    OrganizerId, Principal, RegistrationStatus, TeamSize,
};
use campus_fest_core::collaborators::EventAnnouncement;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Treatment of edits a published event does not allow
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditPolicy {
    /// Skip the illegal fields, apply the rest, report what was skipped
    #[default]
    Lenient,
    /// Refuse the whole edit on the first illegal field
    Strict,
}

impl FromStr for EditPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown edit policy: {other}")),
        }
    }
}

/// Editable event fields
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventField {
    /// `name`
    Name,
    /// `description`
    Description,
    /// `kind`
    Kind,
    /// `eligibility`
    Eligibility,
    /// `registration_deadline`
    RegistrationDeadline,
    /// `start_date`
    StartDate,
    /// `end_date`
    EndDate,
    /// `registration_limit`
    RegistrationLimit,
    /// `registration_fee`
    RegistrationFee,
    /// `tags`
    Tags,
    /// `is_team_event`
    IsTeamEvent,
    /// `team_size`
    TeamSize,
    /// `custom_form`
    CustomForm,
    /// `merchandise_items`
    MerchandiseItems,
}

impl fmt::Display for EventField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Name => "name",
            Self::Description => "description",
            Self::Kind => "kind",
            Self::Eligibility => "eligibility",
            Self::RegistrationDeadline => "registration_deadline",
            Self::StartDate => "start_date",
            Self::EndDate => "end_date",
            Self::RegistrationLimit => "registration_limit",
            Self::RegistrationFee => "registration_fee",
            Self::Tags => "tags",
            Self::IsTeamEvent => "is_team_event",
            Self::TeamSize => "team_size",
            Self::CustomForm => "custom_form",
            Self::MerchandiseItems => "merchandise_items",
        };
        f.write_str(name)
    }
}

/// A field left unchanged by an edit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoredEdit {
    /// Field
    pub field: EventField,
    /// Why it was not applied
    pub reason: String,
}

/// Outcome of an edit
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditReport {
    /// Fields written
    pub applied: Vec<EventField>,
    /// Fields skipped under the lenient policy
    pub ignored: Vec<IgnoredEdit>,
}

impl EditReport {
    fn ignore(&mut self, field: EventField, reason: impl Into<String>) {
        self.ignored.push(IgnoredEdit {
            field,
            reason: reason.into(),
        });
    }

    /// Whether `field` was skipped
    #[must_use]
    pub fn was_ignored(&self, field: EventField) -> bool {
        self.ignored.iter().any(|ignored| ignored.field == field)
    }
}

/// Merchandise item as entered by the organizer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMerchandiseItem {
    /// Display name
    pub name: String,
    /// Offered sizes
    pub sizes: Vec<String>,
    /// Offered colors
    pub colors: Vec<String>,
    /// Units available
    pub stock_quantity: u32,
    /// Units per participant
    pub purchase_limit_per_participant: u32,
    /// Unit price
    pub price: Money,
}

impl NewMerchandiseItem {
    fn into_item(self) -> MerchandiseItem {
        MerchandiseItem {
            id: ItemId::new(),
            name: self.name.trim().to_string(),
            sizes: self.sizes,
            colors: self.colors,
            stock_quantity: self.stock_quantity,
            purchase_limit_per_participant: self.purchase_limit_per_participant,
            price: self.price,
        }
    }
}

/// Input to [`EventLifecycle::create_event`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Name
    pub name: String,
    /// Description
    pub description: String,
    /// Individual or merchandise
    pub kind: EventKind,
    /// Who may register
    pub eligibility: Eligibility,
    /// Registration deadline
    pub registration_deadline: DateTime<Utc>,
    /// Start
    pub start_date: DateTime<Utc>,
    /// End
    pub end_date: DateTime<Utc>,
    /// 0 = unlimited
    pub registration_limit: u32,
    /// Per-ticket fee
    pub registration_fee: Money,
    /// Tags
    pub tags: Vec<String>,
    /// Register as teams
    pub is_team_event: bool,
    /// Team bounds; defaults to 2..=4
    pub team_size: Option<TeamSize>,
    /// Custom form (individual events only)
    pub custom_form: FormSchema,
    /// Items (merchandise events only)
    pub merchandise_items: Vec<NewMerchandiseItem>,
}

impl NewEvent {
    /// Minimal event; everything else defaulted
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: EventKind,
        registration_deadline: DateTime<Utc>,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind,
            eligibility: Eligibility::All,
            registration_deadline,
            start_date,
            end_date,
            registration_limit: 0,
            registration_fee: Money::ZERO,
            tags: Vec::new(),
            is_team_event: false,
            team_size: None,
            custom_form: FormSchema::default(),
            merchandise_items: Vec::new(),
        }
    }
}

/// Partial update; `None` leaves a field alone
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPatch {
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New kind
    pub kind: Option<EventKind>,
    /// New eligibility
    pub eligibility: Option<Eligibility>,
    /// New deadline
    pub registration_deadline: Option<DateTime<Utc>>,
    /// New start
    pub start_date: Option<DateTime<Utc>>,
    /// New end
    pub end_date: Option<DateTime<Utc>>,
    /// New limit
    pub registration_limit: Option<u32>,
    /// New fee
    pub registration_fee: Option<Money>,
    /// New tags
    pub tags: Option<Vec<String>>,
    /// New team flag
    pub is_team_event: Option<bool>,
    /// New team bounds
    pub team_size: Option<TeamSize>,
    /// New form
    pub custom_form: Option<FormSchema>,
    /// New item list (replaces the old one)
    pub merchandise_items: Option<Vec<MerchandiseItem>>,
}

impl EventPatch {
    /// Fields the patch touches, in a stable order
    #[must_use]
    pub fn fields(&self) -> Vec<EventField> {
        let candidates = [
            (self.name.is_some(), EventField::Name),
            (self.description.is_some(), EventField::Description),
            (self.kind.is_some(), EventField::Kind),
            (self.eligibility.is_some(), EventField::Eligibility),
            (self.registration_deadline.is_some(), EventField::RegistrationDeadline),
            (self.start_date.is_some(), EventField::StartDate),
            (self.end_date.is_some(), EventField::EndDate),
            (self.registration_limit.is_some(), EventField::RegistrationLimit),
            (self.registration_fee.is_some(), EventField::RegistrationFee),
            (self.tags.is_some(), EventField::Tags),
            (self.is_team_event.is_some(), EventField::IsTeamEvent),
            (self.team_size.is_some(), EventField::TeamSize),
            (self.custom_form.is_some(), EventField::CustomForm),
            (self.merchandise_items.is_some(), EventField::MerchandiseItems),
        ];
        candidates
            .into_iter()
            .filter_map(|(present, field)| present.then_some(field))
            .collect()
    }
}

fn validation(message: impl Into<String>) -> EngineError {
    EngineError::Validation(message.into())
}

/// Structural checks shared by creation and draft edits.
///
/// # Errors
///
/// [`EngineError::Validation`] naming the first problem.
pub fn validate_event(event: &Event) -> Result<()> {
    if event.name.trim().is_empty() {
        return Err(validation("event name is required"));
    }
    if event.start_date > event.end_date {
        return Err(validation("start date must not be after end date"));
    }
    if event.registration_deadline > event.end_date {
        return Err(validation("registration deadline must not be after end date"));
    }
    if event.is_team_event {
        let TeamSize { min, max } = event.team_size;
        if min < 2 || min > max {
            return Err(validation(format!("invalid team size {min}..{max}")));
        }
    }
    match event.kind {
        EventKind::Individual if !event.merchandise_items.is_empty() => {
            return Err(validation("merchandise items require a merchandise event"));
        },
        EventKind::Merchandise if !event.custom_form.is_empty() => {
            return Err(validation("custom forms require an individual event"));
        },
        EventKind::Merchandise if event.is_team_event => {
            return Err(validation("merchandise events cannot be team events"));
        },
        _ => {},
    }
    for item in &event.merchandise_items {
        if item.name.trim().is_empty() {
            return Err(validation("merchandise item name is required"));
        }
        if item.purchase_limit_per_participant == 0 {
            return Err(validation(format!(
                "purchase limit for {} must be at least 1",
                item.name
            )));
        }
    }
    event.custom_form.check_definition()?;
    Ok(())
}

/// Turn organizer input into a draft event.
///
/// Fields that do not apply to the event kind are dropped: custom forms and
/// team settings for merchandise events, items for individual events.
///
/// # Errors
///
/// [`EngineError::Validation`] from [`validate_event`].
pub fn build_event(organizer: OrganizerId, input: NewEvent, now: DateTime<Utc>) -> Result<Event> {
    let is_merchandise = input.kind == EventKind::Merchandise;
    if is_merchandise && !input.custom_form.is_empty() {
        tracing::debug!("Dropping custom form from merchandise event");
    }
    if !is_merchandise && !input.merchandise_items.is_empty() {
        tracing::debug!("Dropping merchandise items from individual event");
    }

    let event = Event {
        id: EventId::new(),
        organizer,
        name: input.name.trim().to_string(),
        description: input.description,
        kind: input.kind,
        status: EventStatus::Draft,
        eligibility: input.eligibility,
        registration_deadline: input.registration_deadline,
        start_date: input.start_date,
        end_date: input.end_date,
        registration_limit: input.registration_limit,
        registration_fee: input.registration_fee,
        tags: input.tags,
        is_team_event: input.is_team_event && !is_merchandise,
        team_size: input.team_size.unwrap_or_default(),
        custom_form: if is_merchandise {
            FormSchema::default()
        } else {
            input.custom_form
        },
        form_locked: false,
        merchandise_items: if is_merchandise {
            input
                .merchandise_items
                .into_iter()
                .map(NewMerchandiseItem::into_item)
                .collect()
        } else {
            Vec::new()
        },
        registration_count: 0,
        registrations_last_24h: 0,
        total_revenue: Money::ZERO,
        attendance_count: 0,
        created_at: now,
        updated_at: now,
    };
    validate_event(&event)?;
    Ok(event)
}

/// Apply `patch` to `event` per its status and `policy`.
///
/// On error `event` may be partially modified; callers discard it.
///
/// # Errors
///
/// [`EngineError::InvalidState`] once the event is ongoing or finished,
/// [`EngineError::Validation`] for a strict-policy violation or an invalid
/// draft.
pub fn apply_patch(event: &mut Event, patch: &EventPatch, policy: EditPolicy) -> Result<EditReport> {
    match event.status {
        EventStatus::Draft => apply_draft_patch(event, patch),
        EventStatus::Published => apply_published_patch(event, patch, policy),
        status @ (EventStatus::Ongoing | EventStatus::Completed | EventStatus::Closed) => Err(
            EngineError::InvalidState(format!("{status} events cannot be edited")),
        ),
    }
}

fn apply_draft_patch(event: &mut Event, patch: &EventPatch) -> Result<EditReport> {
    let mut report = EditReport::default();
    let mut set = |field: EventField| report.applied.push(field);

    if let Some(name) = &patch.name {
        event.name = name.trim().to_string();
        set(EventField::Name);
    }
    if let Some(description) = &patch.description {
        event.description.clone_from(description);
        set(EventField::Description);
    }
    if let Some(kind) = patch.kind {
        event.kind = kind;
        set(EventField::Kind);
    }
    if let Some(eligibility) = patch.eligibility {
        event.eligibility = eligibility;
        set(EventField::Eligibility);
    }
    if let Some(deadline) = patch.registration_deadline {
        event.registration_deadline = deadline;
        set(EventField::RegistrationDeadline);
    }
    if let Some(start) = patch.start_date {
        event.start_date = start;
        set(EventField::StartDate);
    }
    if let Some(end) = patch.end_date {
        event.end_date = end;
        set(EventField::EndDate);
    }
    if let Some(limit) = patch.registration_limit {
        event.registration_limit = limit;
        set(EventField::RegistrationLimit);
    }
    if let Some(fee) = patch.registration_fee {
        event.registration_fee = fee;
        set(EventField::RegistrationFee);
    }
    if let Some(tags) = &patch.tags {
        event.tags.clone_from(tags);
        set(EventField::Tags);
    }
    if let Some(is_team_event) = patch.is_team_event {
        event.is_team_event = is_team_event;
        set(EventField::IsTeamEvent);
    }
    if let Some(team_size) = patch.team_size {
        event.team_size = team_size;
        set(EventField::TeamSize);
    }
    if let Some(items) = &patch.merchandise_items {
        event.merchandise_items.clone_from(items);
        set(EventField::MerchandiseItems);
    }
    if let Some(form) = &patch.custom_form {
        if event.form_locked {
            report.ignore(EventField::CustomForm, "form is locked after the first registration");
        } else {
            event.custom_form = form.clone();
            report.applied.push(EventField::CustomForm);
        }
    }

    validate_event(event)?;
    Ok(report)
}

fn apply_published_patch(event: &mut Event, patch: &EventPatch, policy: EditPolicy) -> Result<EditReport> {
    let mut report = EditReport::default();

    for field in patch.fields() {
        match field {
            EventField::Description => {
                if let Some(description) = &patch.description {
                    event.description.clone_from(description);
                    report.applied.push(field);
                }
            },
            EventField::RegistrationDeadline => {
                if let Some(deadline) = patch.registration_deadline {
                    if deadline <= event.registration_deadline {
                        report.ignore(field, "deadline can only be extended");
                    } else if deadline > event.end_date {
                        report.ignore(field, "deadline cannot pass the end date");
                    } else {
                        event.registration_deadline = deadline;
                        report.applied.push(field);
                    }
                }
            },
            EventField::RegistrationLimit => {
                if let Some(limit) = patch.registration_limit {
                    if limit < event.registration_limit {
                        report.ignore(field, "limit can only be raised");
                    } else if limit != 0 && limit < event.registration_count {
                        report.ignore(field, "limit is below the current registration count");
                    } else {
                        event.registration_limit = limit;
                        report.applied.push(field);
                    }
                }
            },
            other => report.ignore(other, "not editable once published"),
        }
    }

    if policy == EditPolicy::Strict {
        if let Some(first) = report.ignored.first() {
            return Err(validation(format!("{}: {}", first.field, first.reason)));
        }
    }
    Ok(report)
}

/// Per-event numbers for the organizer dashboard
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAnalytics {
    /// Event
    pub event_id: EventId,
    /// Status
    pub status: EventStatus,
    /// Confirmed registrations (ledger)
    pub registration_count: u32,
    /// Limit (0 = unlimited)
    pub registration_limit: u32,
    /// Seats left, `None` when unlimited
    pub remaining: Option<u32>,
    /// Trending counter
    pub registrations_last_24h: u32,
    /// Collected revenue
    pub total_revenue: Money,
    /// Scanned tickets
    pub attendance_count: u32,
    /// Registrations by status
    pub confirmed: usize,
    /// Orders awaiting a decision
    pub pending: usize,
    /// Cancelled registrations
    pub cancelled: usize,
    /// Rejected orders
    pub rejected: usize,
}

/// Event lifecycle operations
#[derive(Clone)]
pub struct EventLifecycle {
    env: EngineEnvironment,
}

impl EventLifecycle {
    /// Lifecycle over `env`
    #[must_use]
    pub const fn new(env: EngineEnvironment) -> Self {
        Self { env }
    }

    /// Create a draft event owned by the caller.
    ///
    /// # Errors
    ///
    /// [`EngineError::Forbidden`] for non-organizers,
    /// [`EngineError::Validation`] for invalid input; storage errors.
    pub async fn create_event(&self, principal: &Principal, input: NewEvent) -> Result<Event> {
        let organizer = principal.as_organizer()?;
        let event = build_event(organizer, input, self.env.clock.now())?;
        self.env.store.insert_event(event.clone()).await?;
        tracing::info!(event_id = %event.id, %organizer, kind = %event.kind, "Event created");
        Ok(event)
    }

    /// Load an event the caller may see.
    ///
    /// Organizers see their own events in any status; everyone else sees
    /// events that have left draft.
    ///
    /// # Errors
    ///
    /// [`EngineError::EventNotFound`]; storage errors.
    pub async fn event(&self, principal: &Principal, event_id: EventId) -> Result<Event> {
        let event = self
            .env
            .store
            .load_event(event_id)
            .await?
            .ok_or(EngineError::EventNotFound(event_id))?
            .doc;
        let owns = principal
            .as_organizer()
            .is_ok_and(|organizer| organizer == event.organizer);
        if event.status == EventStatus::Draft && !owns {
            return Err(EngineError::EventNotFound(event_id));
        }
        Ok(event)
    }

    /// The caller's events, oldest first.
    ///
    /// # Errors
    ///
    /// [`EngineError::Forbidden`] for non-organizers; storage errors.
    pub async fn my_events(&self, principal: &Principal) -> Result<Vec<Event>> {
        let organizer = principal.as_organizer()?;
        Ok(self.env.store.list_events_by_organizer(organizer).await?)
    }

    /// Edit an event per its status and the configured [`EditPolicy`].
    ///
    /// # Errors
    ///
    /// [`EngineError::EventNotFound`] unless the caller owns the event,
    /// [`EngineError::InvalidState`] for ongoing or finished events,
    /// [`EngineError::Validation`]; storage errors.
    pub async fn edit_event(
        &self,
        principal: &Principal,
        event_id: EventId,
        patch: EventPatch,
    ) -> Result<(Event, EditReport)> {
        let organizer = principal.as_organizer()?;
        let now = self.env.clock.now();
        let policy = self.env.policy.edit_policy;

        let result = update_event(self.env.store.as_ref(), &self.env.retry, event_id, |event| {
            if event.organizer != organizer {
                return Err(EngineError::EventNotFound(event_id));
            }
            let report = apply_patch(event, &patch, policy)?;
            event.updated_at = now;
            Ok(report)
        })
        .await;

        match result {
            Ok((event, report)) => {
                tracing::info!(
                    %event_id,
                    applied = ?report.applied,
                    ignored = report.ignored.len(),
                    "Event edited"
                );
                Ok((event, report))
            },
            Err(error) => {
                tracing::warn!(%event_id, %error, "Event edit refused");
                Err(error)
            },
        }
    }

    /// Publish a draft and announce it.
    ///
    /// # Errors
    ///
    /// As [`EventLifecycle::transition`].
    pub async fn publish(&self, principal: &Principal, event_id: EventId) -> Result<Event> {
        self.transition(principal, event_id, EventStatus::Published).await
    }

    /// Move an event to `target`.
    ///
    /// Publication dispatches the announcement effect after the write.
    ///
    /// # Errors
    ///
    /// [`EngineError::EventNotFound`] unless the caller owns the event,
    /// [`EngineError::InvalidTransition`] for moves the lifecycle does not
    /// allow; storage errors.
    pub async fn transition(
        &self,
        principal: &Principal,
        event_id: EventId,
        target: EventStatus,
    ) -> Result<Event> {
        let organizer = principal.as_organizer()?;
        let now = self.env.clock.now();

        let (event, from) = update_event(self.env.store.as_ref(), &self.env.retry, event_id, |event| {
            if event.organizer != organizer {
                return Err(EngineError::EventNotFound(event_id));
            }
            let from = event.status;
            if !from.can_transition_to(target) {
                return Err(EngineError::InvalidTransition { from, to: target });
            }
            event.status = target;
            event.updated_at = now;
            Ok(from)
        })
        .await
        .inspect_err(|error| tracing::warn!(%event_id, %target, %error, "Transition refused"))?;

        tracing::info!(%event_id, %from, to = %target, "Event status changed");

        if target == EventStatus::Published {
            self.env
                .dispatch(self.env.notifier.announcement(announcement(&event)))
                .await;
        }
        Ok(event)
    }

    /// Counters and registration breakdown for an owned event.
    ///
    /// # Errors
    ///
    /// [`EngineError::EventNotFound`] unless the caller owns the event;
    /// storage errors.
    pub async fn analytics(&self, principal: &Principal, event_id: EventId) -> Result<EventAnalytics> {
        let organizer = principal.as_organizer()?;
        let event = self
            .env
            .store
            .load_event(event_id)
            .await?
            .map(|versioned| versioned.doc)
            .filter(|event| event.organizer == organizer)
            .ok_or(EngineError::EventNotFound(event_id))?;
        let registrations = self.env.store.list_registrations_for_event(event_id).await?;
        let count = |status: RegistrationStatus| {
            registrations
                .iter()
                .filter(|registration| registration.status == status)
                .count()
        };

        Ok(EventAnalytics {
            event_id,
            status: event.status,
            registration_count: event.registration_count,
            registration_limit: event.registration_limit,
            remaining: event.remaining_capacity(),
            registrations_last_24h: event.registrations_last_24h,
            total_revenue: event.total_revenue,
            attendance_count: event.attendance_count,
            confirmed: count(RegistrationStatus::Confirmed),
            pending: count(RegistrationStatus::Pending),
            cancelled: count(RegistrationStatus::Cancelled),
            rejected: count(RegistrationStatus::Rejected),
        })
    }
}

/// Freeze the custom form once the first registration is in.
///
/// Failures are logged; the registration that triggered the lock stands.
pub(crate) async fn lock_form(env: &EngineEnvironment, event_id: EventId) {
    let now = env.clock.now();
    let result = update_event(env.store.as_ref(), &env.retry, event_id, |event| {
        event.form_locked = true;
        event.updated_at = now;
        Ok(())
    })
    .await;
    match result {
        Ok(_) => tracing::debug!(%event_id, "Custom form locked"),
        Err(error) => tracing::error!(%event_id, %error, "Failed to lock custom form"),
    }
}

fn announcement(event: &Event) -> EventAnnouncement {
    EventAnnouncement {
        name: event.name.clone(),
        description: event.description.clone(),
        kind: event.kind.to_string(),
        fee_cents: event.registration_fee.cents(),
        start: event.start_date,
        end: event.end_date,
        tags: event.tags.clone(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::form::{FieldType, FormField};
    use chrono::Duration;

    fn draft(kind: EventKind) -> Event {
        let now = Utc::now();
        let mut input = NewEvent::new(
            "Hackathon",
            kind,
            now + Duration::days(5),
            now + Duration::days(6),
            now + Duration::days(7),
        );
        input.registration_limit = 10;
        build_event(OrganizerId::new(), input, now).unwrap()
    }

    fn published() -> Event {
        let mut event = draft(EventKind::Individual);
        event.status = EventStatus::Published;
        event.registration_count = 4;
        event
    }

    #[test]
    fn build_rejects_bad_dates_and_team_sizes() {
        let now = Utc::now();
        let backwards = NewEvent::new("X", EventKind::Individual, now, now + Duration::days(2), now);
        assert!(matches!(
            build_event(OrganizerId::new(), backwards, now),
            Err(EngineError::Validation(_))
        ));

        let mut team = NewEvent::new("X", EventKind::Individual, now, now, now + Duration::days(1));
        team.is_team_event = true;
        team.team_size = Some(TeamSize { min: 1, max: 3 });
        assert!(build_event(OrganizerId::new(), team, now).is_err());

        let unnamed = NewEvent::new("  ", EventKind::Individual, now, now, now);
        assert!(build_event(OrganizerId::new(), unnamed, now).is_err());
    }

    #[test]
    fn build_drops_fields_foreign_to_the_kind() {
        let now = Utc::now();
        let mut input = NewEvent::new("Merch", EventKind::Merchandise, now, now, now);
        input.is_team_event = true;
        input.custom_form = FormSchema::new(vec![FormField::new("Size", FieldType::Text, true)]);
        input.merchandise_items = vec![NewMerchandiseItem {
            name: "Tee".into(),
            sizes: vec!["M".into()],
            colors: Vec::new(),
            stock_quantity: 10,
            purchase_limit_per_participant: 2,
            price: Money::from_cents(500),
        }];
        let event = build_event(OrganizerId::new(), input, now).unwrap();
        assert!(event.custom_form.is_empty());
        assert!(!event.is_team_event);
        assert_eq!(event.merchandise_items.len(), 1);
        assert_eq!(event.status, EventStatus::Draft);
        assert_eq!(event.team_size, TeamSize { min: 2, max: 4 });
    }

    #[test]
    fn draft_accepts_any_field() {
        let mut event = draft(EventKind::Individual);
        let patch = EventPatch {
            name: Some("Hackathon 2.0".into()),
            registration_limit: Some(3),
            eligibility: Some(Eligibility::GroupA),
            ..EventPatch::default()
        };
        let report = apply_patch(&mut event, &patch, EditPolicy::Lenient).unwrap();
        assert_eq!(report.applied.len(), 3);
        assert!(report.ignored.is_empty());
        assert_eq!(event.registration_limit, 3);
    }

    #[test]
    fn draft_edit_is_validated() {
        let mut event = draft(EventKind::Individual);
        let patch = EventPatch {
            end_date: Some(event.start_date - Duration::days(1)),
            ..EventPatch::default()
        };
        assert!(matches!(
            apply_patch(&mut event, &patch, EditPolicy::Lenient),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn locked_form_is_not_replaced() {
        let mut event = draft(EventKind::Individual);
        event.form_locked = true;
        let patch = EventPatch {
            custom_form: Some(FormSchema::new(vec![FormField::new("Q", FieldType::Text, true)])),
            ..EventPatch::default()
        };
        let report = apply_patch(&mut event, &patch, EditPolicy::Lenient).unwrap();
        assert!(report.was_ignored(EventField::CustomForm));
        assert!(event.custom_form.is_empty());
    }

    #[test]
    fn published_deadline_only_moves_later() {
        let mut event = published();
        let original = event.registration_deadline;

        let earlier = EventPatch {
            registration_deadline: Some(original - Duration::hours(1)),
            ..EventPatch::default()
        };
        let report = apply_patch(&mut event, &earlier, EditPolicy::Lenient).unwrap();
        assert!(report.was_ignored(EventField::RegistrationDeadline));
        assert_eq!(event.registration_deadline, original);

        let later = EventPatch {
            registration_deadline: Some(original + Duration::hours(1)),
            ..EventPatch::default()
        };
        let report = apply_patch(&mut event, &later, EditPolicy::Lenient).unwrap();
        assert_eq!(report.applied, vec![EventField::RegistrationDeadline]);
        assert_eq!(event.registration_deadline, original + Duration::hours(1));
    }

    #[test]
    fn published_limit_only_grows() {
        let mut event = published();
        let lower = EventPatch {
            registration_limit: Some(5),
            ..EventPatch::default()
        };
        assert!(apply_patch(&mut event, &lower, EditPolicy::Lenient)
            .unwrap()
            .was_ignored(EventField::RegistrationLimit));
        assert_eq!(event.registration_limit, 10);

        let higher = EventPatch {
            registration_limit: Some(20),
            ..EventPatch::default()
        };
        apply_patch(&mut event, &higher, EditPolicy::Lenient).unwrap();
        assert_eq!(event.registration_limit, 20);
    }

    #[test]
    fn published_lenient_applies_legal_subset() {
        let mut event = published();
        let patch = EventPatch {
            name: Some("Renamed".into()),
            description: Some("Bring a laptop".into()),
            registration_fee: Some(Money::from_cents(100)),
            ..EventPatch::default()
        };
        let report = apply_patch(&mut event, &patch, EditPolicy::Lenient).unwrap();
        assert_eq!(report.applied, vec![EventField::Description]);
        assert!(report.was_ignored(EventField::Name));
        assert!(report.was_ignored(EventField::RegistrationFee));
        assert_eq!(event.name, "Hackathon");
        assert_eq!(event.description, "Bring a laptop");
    }

    #[test]
    fn published_strict_refuses_illegal_edit() {
        let mut event = published();
        let patch = EventPatch {
            name: Some("Renamed".into()),
            ..EventPatch::default()
        };
        let error = apply_patch(&mut event, &patch, EditPolicy::Strict).unwrap_err();
        assert!(matches!(error, EngineError::Validation(message) if message.contains("name")));
    }

    #[test]
    fn running_events_refuse_edits() {
        for status in [EventStatus::Ongoing, EventStatus::Completed, EventStatus::Closed] {
            let mut event = draft(EventKind::Individual);
            event.status = status;
            let patch = EventPatch {
                description: Some("late".into()),
                ..EventPatch::default()
            };
            assert!(matches!(
                apply_patch(&mut event, &patch, EditPolicy::Lenient),
                Err(EngineError::InvalidState(_))
            ));
        }
    }

    #[test]
    fn edit_policy_parses() {
        assert_eq!("STRICT".parse::<EditPolicy>(), Ok(EditPolicy::Strict));
        assert_eq!("lenient".parse::<EditPolicy>(), Ok(EditPolicy::Lenient));
        assert!("loose".parse::<EditPolicy>().is_err());
    }
}

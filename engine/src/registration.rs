//! Individual registrations, ticket lookups and attendance.
//!
//! A registration request walks a fixed sequence of checks and stops at the
//! first failure:
//!
//! 1. the event exists
//! 2. it is an individual, non-team event
//! 3. it is published or ongoing and the deadline has not passed
//! 4. a seat is still free
//! 5. the participant is eligible
//! 6. the participant has no registration for it yet
//! 7. the form answers validate
//!
//! Only then is the seat taken through the ledger, which re-checks capacity
//! against the current count. If the insert afterwards loses the uniqueness
//! race to a concurrent request by the same participant, the seat is released.

use crate::environment::EngineEnvironment;
use crate::error::{EngineError, Result};
use crate::form::FormResponses;
use crate::ledger::CapacityLedger;
use crate::lifecycle::lock_form;
use crate::store::{UniqueIndex, update_registration};
use crate::ticketing::issue_ticket;
use crate::types::{
    Event, EventId, EventKind, ParticipantId, ParticipantProfile, PaymentStatus, Principal,
    Registration, RegistrationId, RegistrationStatus, TeamId,
};
use campus_fest_core::collaborators::{TicketEmail, TicketId};
use campus_fest_core::effect::Effect;

/// Reserve a seat, issue a ticket and store a confirmed registration.
///
/// Shared by individual registration and team ticketing. The reservation is
/// released if the insert fails.
///
/// # Errors
///
/// [`EngineError::CapacityExceeded`], [`EngineError::DuplicateRegistration`]
/// when the (event, participant) slot is already taken; storage errors.
pub(crate) async fn confirm_with_ticket(
    env: &EngineEnvironment,
    ledger: &CapacityLedger,
    event: &Event,
    participant: ParticipantId,
    form_responses: FormResponses,
    team_id: Option<TeamId>,
) -> Result<Registration> {
    let fee = event.registration_fee;
    ledger.try_reserve(event.id, 1, fee).await?;

    let ticket = issue_ticket(env.tickets.as_ref()).await;
    let now = env.clock.now();
    let registration = Registration {
        id: RegistrationId::new(),
        event_id: event.id,
        participant_id: participant,
        status: RegistrationStatus::Confirmed,
        payment_status: if fee.is_zero() {
            PaymentStatus::Na
        } else {
            PaymentStatus::Paid
        },
        ticket: Some(ticket),
        merchandise_selections: Vec::new(),
        amount: fee,
        form_responses,
        team_id,
        attendance_marked: false,
        registered_at: now,
        updated_at: now,
    };

    if let Err(error) = env.store.insert_registration(registration.clone()).await {
        if let Err(release_error) = ledger.release(event.id, 1, fee).await {
            tracing::error!(
                event_id = %event.id,
                %participant,
                error = %release_error,
                "Failed to release seat after rejected insert"
            );
        }
        if error.violates(UniqueIndex::RegistrationParticipant) {
            return Err(EngineError::DuplicateRegistration {
                event_id: event.id,
                participant_id: participant,
            });
        }
        return Err(error.into());
    }

    Ok(registration)
}

/// Ticket confirmation effect for a freshly confirmed registration
pub(crate) fn ticket_email(
    env: &EngineEnvironment,
    profile: &ParticipantProfile,
    event: &Event,
    registration: &Registration,
) -> Effect {
    let Some(ticket) = &registration.ticket else {
        return Effect::None;
    };
    env.notifier.ticket_email(
        profile.email.clone(),
        TicketEmail {
            participant_name: profile.display_name(),
            event_name: event.name.clone(),
            event_start: event.start_date,
            ticket_id: ticket.id.clone(),
            qr_code: ticket.qr_code.clone(),
        },
    )
}

/// Filter for an organizer's participant roster
#[derive(Clone, Debug, Default)]
pub struct RosterQuery {
    /// Only registrations in this state
    pub status: Option<RegistrationStatus>,
    /// Case-insensitive match on first name, last name or email
    pub search: Option<String>,
}

impl RosterQuery {
    /// Roster of every registration
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to one registration state
    #[must_use]
    pub const fn status(mut self, status: RegistrationStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restrict to participants whose name or email contains `needle`
    #[must_use]
    pub fn search(mut self, needle: impl Into<String>) -> Self {
        self.search = Some(needle.into());
        self
    }

    fn matches_profile(&self, profile: Option<&ParticipantProfile>) -> bool {
        let Some(needle) = self.search.as_deref().map(str::trim).filter(|needle| !needle.is_empty()) else {
            return true;
        };
        let needle = needle.to_lowercase();
        profile.is_some_and(|profile| {
            [&profile.first_name, &profile.last_name, &profile.email]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
        })
    }
}

/// One row of a participant roster
#[derive(Clone, Debug)]
pub struct RosterEntry {
    /// The registration or order
    pub registration: Registration,
    /// Directory profile, if the participant is still known
    pub profile: Option<ParticipantProfile>,
}

/// Individual registration workflow
#[derive(Clone)]
pub struct RegistrationWorkflow {
    env: EngineEnvironment,
    ledger: CapacityLedger,
}

impl RegistrationWorkflow {
    /// Workflow over `env`
    #[must_use]
    pub fn new(env: EngineEnvironment) -> Self {
        let ledger = CapacityLedger::new(&env);
        Self { env, ledger }
    }

    /// Register the caller for an individual event.
    ///
    /// On success the registration is `confirmed` with a ticket and the
    /// ticket email has been handed to the effect runner.
    ///
    /// # Errors
    ///
    /// The first failing check in module order, then
    /// [`EngineError::CapacityExceeded`] or
    /// [`EngineError::DuplicateRegistration`] if a concurrent request won;
    /// storage errors.
    pub async fn register(
        &self,
        principal: &Principal,
        event_id: EventId,
        form_responses: FormResponses,
    ) -> Result<Registration> {
        let participant = principal.as_participant()?;
        match self.try_register(participant, event_id, form_responses).await {
            Ok(registration) => Ok(registration),
            Err(error) => {
                tracing::warn!(%event_id, %participant, reason = error.kind(), %error, "Registration refused");
                Err(error)
            },
        }
    }

    async fn try_register(
        &self,
        participant: ParticipantId,
        event_id: EventId,
        form_responses: FormResponses,
    ) -> Result<Registration> {
        let now = self.env.clock.now();
        let event = self.env.load_event(event_id).await?;

        if event.kind != EventKind::Individual || event.is_team_event {
            return Err(EngineError::WrongEventType {
                event_id,
                reason: "individual registration requires a non-team individual event".to_string(),
            });
        }
        if !event.status.accepts_registrations() {
            return Err(EngineError::RegistrationClosed {
                event_id,
                reason: format!("event is {}", event.status),
            });
        }
        if now > event.registration_deadline {
            return Err(EngineError::RegistrationClosed {
                event_id,
                reason: "deadline has passed".to_string(),
            });
        }
        if !event.has_capacity_for(1) {
            metrics::counter!("fest_capacity_rejections_total").increment(1);
            return Err(EngineError::CapacityExceeded {
                event_id,
                limit: event.registration_limit,
            });
        }

        let profile = self.env.profile(participant).await?;
        if !event.eligibility.admits(profile.class) {
            return Err(EngineError::NotEligible {
                event_id,
                participant_id: participant,
            });
        }
        if self.env.store.find_registration(event_id, participant).await?.is_some() {
            return Err(EngineError::DuplicateRegistration {
                event_id,
                participant_id: participant,
            });
        }
        event.custom_form.validate(&form_responses)?;

        let registration =
            confirm_with_ticket(&self.env, &self.ledger, &event, participant, form_responses, None).await?;

        if !event.form_locked && !event.custom_form.is_empty() {
            lock_form(&self.env, event_id).await;
        }

        metrics::counter!("fest_registrations_total", "kind" => "individual").increment(1);
        tracing::info!(
            %event_id,
            %participant,
            registration_id = %registration.id,
            ticket_id = ?registration.ticket_id().map(TicketId::as_str),
            "Registration confirmed"
        );

        self.env
            .dispatch(ticket_email(&self.env, &profile, &event, &registration))
            .await;
        Ok(registration)
    }

    /// The caller's registration (or order) for an event.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] if there is none; storage errors.
    pub async fn my_registration(&self, principal: &Principal, event_id: EventId) -> Result<Registration> {
        let participant = principal.as_participant()?;
        self.env
            .store
            .find_registration(event_id, participant)
            .await?
            .map(|versioned| versioned.doc)
            .ok_or_else(|| EngineError::not_found("registration", event_id))
    }

    /// Every registration of the caller, oldest first.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn my_registrations(&self, principal: &Principal) -> Result<Vec<Registration>> {
        let participant = principal.as_participant()?;
        Ok(self
            .env
            .store
            .list_registrations_for_participant(participant)
            .await?)
    }

    /// Look up a ticket the caller holds.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] unless the ticket exists and belongs to the
    /// caller; storage errors.
    pub async fn ticket(&self, principal: &Principal, ticket_id: &TicketId) -> Result<Registration> {
        let participant = principal.as_participant()?;
        self.env
            .store
            .find_registration_by_ticket(ticket_id)
            .await?
            .map(|versioned| versioned.doc)
            .filter(|registration| registration.participant_id == participant)
            .ok_or_else(|| EngineError::not_found("ticket", ticket_id))
    }

    /// Registrations for one of the caller's events, newest first.
    ///
    /// Covers every event kind: individual and team registrations as well as
    /// merchandise orders.
    ///
    /// # Errors
    ///
    /// [`EngineError::EventNotFound`] for a missing event or one owned by
    /// another organizer; storage errors.
    pub async fn participants(
        &self,
        principal: &Principal,
        event_id: EventId,
        query: RosterQuery,
    ) -> Result<Vec<RosterEntry>> {
        let organizer = principal.as_organizer()?;
        let event = self.env.load_event(event_id).await?;
        if event.organizer != organizer {
            return Err(EngineError::EventNotFound(event_id));
        }

        let mut registrations = self.env.store.list_registrations_for_event(event_id).await?;
        registrations.retain(|registration| query.status.is_none_or(|status| registration.status == status));
        registrations.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));

        let mut roster = Vec::with_capacity(registrations.len());
        for registration in registrations {
            let profile = self.env.directory.participant(registration.participant_id).await?;
            if query.matches_profile(profile.as_ref()) {
                roster.push(RosterEntry { registration, profile });
            }
        }
        tracing::debug!(%event_id, rows = roster.len(), "Roster listed");
        Ok(roster)
    }

    /// Mark a scanned ticket as attended and count it on the event.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] unless the ticket belongs to one of the
    /// caller's events, [`EngineError::InvalidState`] for unconfirmed
    /// registrations and second scans; storage errors.
    pub async fn mark_attendance(&self, principal: &Principal, ticket_id: &TicketId) -> Result<Registration> {
        let organizer = principal.as_organizer()?;
        let found = self
            .env
            .store
            .find_registration_by_ticket(ticket_id)
            .await?
            .ok_or_else(|| EngineError::not_found("ticket", ticket_id))?;
        let event_id = found.doc.event_id;
        let event = self.env.load_event(event_id).await?;
        if event.organizer != organizer {
            return Err(EngineError::not_found("ticket", ticket_id));
        }

        let now = self.env.clock.now();
        let (registration, ()) =
            update_registration(self.env.store.as_ref(), &self.env.retry, found.doc.id, |registration| {
                if registration.status != RegistrationStatus::Confirmed {
                    return Err(EngineError::InvalidState(format!(
                        "ticket {ticket_id} is not confirmed"
                    )));
                }
                if registration.attendance_marked {
                    return Err(EngineError::InvalidState(format!(
                        "ticket {ticket_id} was already scanned"
                    )));
                }
                registration.attendance_marked = true;
                registration.updated_at = now;
                Ok(())
            })
            .await
            .inspect_err(|error| tracing::warn!(%ticket_id, %error, "Attendance refused"))?;

        match self.ledger.record_attendance(event_id).await {
            Ok(snapshot) => tracing::info!(
                %event_id,
                %ticket_id,
                attendance = snapshot.attendance_count,
                "Attendance marked"
            ),
            Err(error) => tracing::error!(%event_id, %ticket_id, %error, "Attendance counter not updated"),
        }
        Ok(registration)
    }
}

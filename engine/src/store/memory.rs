//! In-process [`DocumentStore`].
//!
//! Events live in per-document slots so compare-and-swap on one event never
//! waits on another. Registrations and teams share one latch per collection,
//! held only while the unique indexes are checked and updated; no latch is
//! ever held across an `.await` on anything but the latch itself.

use super::{DocumentStore, StoreError, UniqueIndex, Version, Versioned};
use crate::types::{
    Event, EventId, InviteCode, OrganizerId, ParticipantId, Registration, RegistrationId, Team,
    TeamId,
};
use campus_fest_core::BoxFuture;
use campus_fest_core::collaborators::TicketId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

type StoreResult<T> = Result<T, StoreError>;

#[derive(Default)]
struct RegistrationTable {
    docs: HashMap<RegistrationId, Versioned<Registration>>,
    order: Vec<RegistrationId>,
    by_participant: HashMap<(EventId, ParticipantId), RegistrationId>,
    by_ticket: HashMap<TicketId, RegistrationId>,
}

#[derive(Default)]
struct TeamTable {
    docs: HashMap<TeamId, Versioned<Team>>,
    order: Vec<TeamId>,
    by_code: HashMap<InviteCode, TeamId>,
    membership: HashMap<(EventId, ParticipantId), TeamId>,
}

impl TeamTable {
    fn check_members(&self, team: &Team) -> StoreResult<()> {
        for member in team.active_members() {
            if let Some(owner) = self.membership.get(&(team.event_id, *member)) {
                if *owner != team.id {
                    return Err(StoreError::UniqueViolation {
                        index: UniqueIndex::TeamMembership,
                        key: format!("{}/{member}", team.event_id),
                    });
                }
            }
        }
        Ok(())
    }

    fn index_members(&mut self, team: &Team) {
        self.membership.retain(|_, owner| *owner != team.id);
        for member in team.active_members() {
            self.membership.insert((team.event_id, *member), team.id);
        }
    }
}

/// Store backed by hash maps, for tests and the demo
#[derive(Default)]
pub struct InMemoryStore {
    events: RwLock<HashMap<EventId, Arc<Mutex<Versioned<Event>>>>>,
    registrations: Mutex<RegistrationTable>,
    teams: Mutex<TeamTable>,
}

impl InMemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn event_slot(&self, id: EventId) -> Option<Arc<Mutex<Versioned<Event>>>> {
        self.events.read().await.get(&id).cloned()
    }
}

fn conflict(collection: &'static str, id: impl ToString, expected: Version, actual: Version) -> StoreError {
    StoreError::ConcurrencyConflict {
        collection,
        id: id.to_string(),
        expected,
        actual,
    }
}

impl DocumentStore for InMemoryStore {
    fn insert_event(&self, event: Event) -> BoxFuture<'_, StoreResult<Version>> {
        Box::pin(async move {
            let mut events = self.events.write().await;
            if events.contains_key(&event.id) {
                return Err(StoreError::UniqueViolation {
                    index: UniqueIndex::DocumentId,
                    key: event.id.to_string(),
                });
            }
            events.insert(
                event.id,
                Arc::new(Mutex::new(Versioned {
                    version: Version::INITIAL,
                    doc: event,
                })),
            );
            Ok(Version::INITIAL)
        })
    }

    fn load_event(&self, id: EventId) -> BoxFuture<'_, StoreResult<Option<Versioned<Event>>>> {
        Box::pin(async move {
            match self.event_slot(id).await {
                Some(slot) => Ok(Some(slot.lock().await.clone())),
                None => Ok(None),
            }
        })
    }

    fn replace_event(&self, event: Event, expected: Version) -> BoxFuture<'_, StoreResult<Version>> {
        Box::pin(async move {
            let slot = self.event_slot(event.id).await.ok_or_else(|| StoreError::NotFound {
                collection: "events",
                id: event.id.to_string(),
            })?;
            let mut current = slot.lock().await;
            if current.version != expected {
                return Err(conflict("events", event.id, expected, current.version));
            }
            current.version = current.version.next();
            current.doc = event;
            Ok(current.version)
        })
    }

    fn list_events_by_organizer(&self, organizer: OrganizerId) -> BoxFuture<'_, StoreResult<Vec<Event>>> {
        Box::pin(async move {
            let slots: Vec<_> = self.events.read().await.values().cloned().collect();
            let mut events = Vec::new();
            for slot in slots {
                let current = slot.lock().await;
                if current.doc.organizer == organizer {
                    events.push(current.doc.clone());
                }
            }
            events.sort_by_key(|event| event.created_at);
            Ok(events)
        })
    }

    fn insert_registration(&self, registration: Registration) -> BoxFuture<'_, StoreResult<Version>> {
        Box::pin(async move {
            let mut table = self.registrations.lock().await;
            let key = (registration.event_id, registration.participant_id);
            if table.docs.contains_key(&registration.id) {
                return Err(StoreError::UniqueViolation {
                    index: UniqueIndex::DocumentId,
                    key: registration.id.to_string(),
                });
            }
            if table.by_participant.contains_key(&key) {
                return Err(StoreError::UniqueViolation {
                    index: UniqueIndex::RegistrationParticipant,
                    key: format!("{}/{}", key.0, key.1),
                });
            }
            if let Some(ticket) = registration.ticket_id() {
                if table.by_ticket.contains_key(ticket) {
                    return Err(StoreError::UniqueViolation {
                        index: UniqueIndex::TicketId,
                        key: ticket.to_string(),
                    });
                }
                table.by_ticket.insert(ticket.clone(), registration.id);
            }
            table.by_participant.insert(key, registration.id);
            table.order.push(registration.id);
            table.docs.insert(
                registration.id,
                Versioned {
                    version: Version::INITIAL,
                    doc: registration,
                },
            );
            Ok(Version::INITIAL)
        })
    }

    fn load_registration(&self, id: RegistrationId) -> BoxFuture<'_, StoreResult<Option<Versioned<Registration>>>> {
        Box::pin(async move { Ok(self.registrations.lock().await.docs.get(&id).cloned()) })
    }

    fn replace_registration(
        &self,
        registration: Registration,
        expected: Version,
    ) -> BoxFuture<'_, StoreResult<Version>> {
        Box::pin(async move {
            let mut table = self.registrations.lock().await;
            let current = table.docs.get(&registration.id).ok_or_else(|| StoreError::NotFound {
                collection: "registrations",
                id: registration.id.to_string(),
            })?;
            if current.version != expected {
                return Err(conflict("registrations", registration.id, expected, current.version));
            }
            if current.doc.event_id != registration.event_id
                || current.doc.participant_id != registration.participant_id
            {
                return Err(StoreError::UniqueViolation {
                    index: UniqueIndex::RegistrationParticipant,
                    key: format!("{}/{}", registration.event_id, registration.participant_id),
                });
            }
            let old_ticket = current.doc.ticket_id().cloned();
            let next = current.version.next();

            if let Some(ticket) = registration.ticket_id() {
                if let Some(holder) = table.by_ticket.get(ticket) {
                    if *holder != registration.id {
                        return Err(StoreError::UniqueViolation {
                            index: UniqueIndex::TicketId,
                            key: ticket.to_string(),
                        });
                    }
                }
            }
            if let Some(old) = old_ticket {
                table.by_ticket.remove(&old);
            }
            if let Some(ticket) = registration.ticket_id() {
                table.by_ticket.insert(ticket.clone(), registration.id);
            }
            table.docs.insert(
                registration.id,
                Versioned {
                    version: next,
                    doc: registration,
                },
            );
            Ok(next)
        })
    }

    fn find_registration(
        &self,
        event: EventId,
        participant: ParticipantId,
    ) -> BoxFuture<'_, StoreResult<Option<Versioned<Registration>>>> {
        Box::pin(async move {
            let table = self.registrations.lock().await;
            Ok(table
                .by_participant
                .get(&(event, participant))
                .and_then(|id| table.docs.get(id))
                .cloned())
        })
    }

    fn find_registration_by_ticket<'a>(
        &'a self,
        ticket: &'a TicketId,
    ) -> BoxFuture<'a, StoreResult<Option<Versioned<Registration>>>> {
        Box::pin(async move {
            let table = self.registrations.lock().await;
            Ok(table
                .by_ticket
                .get(ticket)
                .and_then(|id| table.docs.get(id))
                .cloned())
        })
    }

    fn list_registrations_for_event(&self, event: EventId) -> BoxFuture<'_, StoreResult<Vec<Registration>>> {
        Box::pin(async move {
            let table = self.registrations.lock().await;
            Ok(table
                .order
                .iter()
                .filter_map(|id| table.docs.get(id))
                .filter(|entry| entry.doc.event_id == event)
                .map(|entry| entry.doc.clone())
                .collect())
        })
    }

    fn list_registrations_for_participant(
        &self,
        participant: ParticipantId,
    ) -> BoxFuture<'_, StoreResult<Vec<Registration>>> {
        Box::pin(async move {
            let table = self.registrations.lock().await;
            Ok(table
                .order
                .iter()
                .filter_map(|id| table.docs.get(id))
                .filter(|entry| entry.doc.participant_id == participant)
                .map(|entry| entry.doc.clone())
                .collect())
        })
    }

    fn insert_team(&self, team: Team) -> BoxFuture<'_, StoreResult<Version>> {
        Box::pin(async move {
            let mut table = self.teams.lock().await;
            if table.docs.contains_key(&team.id) {
                return Err(StoreError::UniqueViolation {
                    index: UniqueIndex::DocumentId,
                    key: team.id.to_string(),
                });
            }
            if table.by_code.contains_key(&team.invite_code) {
                return Err(StoreError::UniqueViolation {
                    index: UniqueIndex::InviteCode,
                    key: team.invite_code.to_string(),
                });
            }
            table.check_members(&team)?;
            table.index_members(&team);
            table.by_code.insert(team.invite_code.clone(), team.id);
            table.order.push(team.id);
            table.docs.insert(
                team.id,
                Versioned {
                    version: Version::INITIAL,
                    doc: team,
                },
            );
            Ok(Version::INITIAL)
        })
    }

    fn load_team(&self, id: TeamId) -> BoxFuture<'_, StoreResult<Option<Versioned<Team>>>> {
        Box::pin(async move { Ok(self.teams.lock().await.docs.get(&id).cloned()) })
    }

    fn replace_team(&self, team: Team, expected: Version) -> BoxFuture<'_, StoreResult<Version>> {
        Box::pin(async move {
            let mut table = self.teams.lock().await;
            let current = table.docs.get(&team.id).ok_or_else(|| StoreError::NotFound {
                collection: "teams",
                id: team.id.to_string(),
            })?;
            if current.version != expected {
                return Err(conflict("teams", team.id, expected, current.version));
            }
            if current.doc.invite_code != team.invite_code || current.doc.event_id != team.event_id {
                return Err(StoreError::UniqueViolation {
                    index: UniqueIndex::InviteCode,
                    key: team.invite_code.to_string(),
                });
            }
            let next = current.version.next();
            table.check_members(&team)?;
            table.index_members(&team);
            table.docs.insert(team.id, Versioned { version: next, doc: team });
            Ok(next)
        })
    }

    fn find_team_by_invite_code<'a>(
        &'a self,
        code: &'a InviteCode,
    ) -> BoxFuture<'a, StoreResult<Option<Versioned<Team>>>> {
        Box::pin(async move {
            let table = self.teams.lock().await;
            Ok(table.by_code.get(code).and_then(|id| table.docs.get(id)).cloned())
        })
    }

    fn find_active_team(
        &self,
        event: EventId,
        participant: ParticipantId,
    ) -> BoxFuture<'_, StoreResult<Option<Versioned<Team>>>> {
        Box::pin(async move {
            let table = self.teams.lock().await;
            Ok(table
                .membership
                .get(&(event, participant))
                .and_then(|id| table.docs.get(id))
                .cloned())
        })
    }

    fn list_teams_for_participant(&self, participant: ParticipantId) -> BoxFuture<'_, StoreResult<Vec<Team>>> {
        Box::pin(async move {
            let table = self.teams.lock().await;
            Ok(table
                .order
                .iter()
                .filter_map(|id| table.docs.get(id))
                .filter(|entry| entry.doc.is_member(participant))
                .map(|entry| entry.doc.clone())
                .collect())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::form::{FormResponses, FormSchema};
    use crate::types::{
        Eligibility, EventKind, EventStatus, Money, PaymentStatus, RegistrationStatus, TeamSize,
        TeamStatus, Ticket,
    };
    use campus_fest_core::collaborators::QrPayload;
    use chrono::Utc;

    fn event() -> Event {
        let now = Utc::now();
        Event {
            id: EventId::new(),
            organizer: OrganizerId::new(),
            name: "Hackathon".into(),
            description: String::new(),
            kind: EventKind::Individual,
            status: EventStatus::Published,
            eligibility: Eligibility::All,
            registration_deadline: now,
            start_date: now,
            end_date: now,
            registration_limit: 0,
            registration_fee: Money::ZERO,
            tags: Vec::new(),
            is_team_event: false,
            team_size: TeamSize::default(),
            custom_form: FormSchema::default(),
            form_locked: false,
            merchandise_items: Vec::new(),
            registration_count: 0,
            registrations_last_24h: 0,
            total_revenue: Money::ZERO,
            attendance_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn registration(event: EventId, participant: ParticipantId, ticket: &str) -> Registration {
        let now = Utc::now();
        Registration {
            id: RegistrationId::new(),
            event_id: event,
            participant_id: participant,
            status: RegistrationStatus::Confirmed,
            payment_status: PaymentStatus::Na,
            ticket: Some(Ticket {
                id: TicketId::new(ticket),
                qr_code: QrPayload::default(),
            }),
            merchandise_selections: Vec::new(),
            amount: Money::ZERO,
            form_responses: FormResponses::new(),
            team_id: None,
            attendance_marked: false,
            registered_at: now,
            updated_at: now,
        }
    }

    fn team(event: EventId, leader: ParticipantId, code: &str) -> Team {
        let now = Utc::now();
        Team {
            id: TeamId::new(),
            event_id: event,
            name: "Null Pointers".into(),
            leader,
            members: vec![leader],
            max_size: 3,
            invite_code: InviteCode::new(code),
            status: TeamStatus::Forming,
            member_form_responses: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn stale_event_write_conflicts() {
        let store = InMemoryStore::new();
        let event = event();
        store.insert_event(event.clone()).await.unwrap();

        let v2 = store.replace_event(event.clone(), Version::INITIAL).await.unwrap();
        assert_eq!(v2, Version::new(2));

        let stale = store.replace_event(event, Version::INITIAL).await;
        assert!(matches!(stale, Err(StoreError::ConcurrencyConflict { .. })));
    }

    #[tokio::test]
    async fn one_registration_per_event_and_participant() {
        let store = InMemoryStore::new();
        let (event, participant) = (EventId::new(), ParticipantId::new());

        store.insert_registration(registration(event, participant, "T1")).await.unwrap();
        let second = store.insert_registration(registration(event, participant, "T2")).await;
        assert!(second.unwrap_err().violates(UniqueIndex::RegistrationParticipant));

        let other_event = store
            .insert_registration(registration(EventId::new(), participant, "T3"))
            .await;
        assert!(other_event.is_ok());
    }

    #[tokio::test]
    async fn ticket_ids_are_unique() {
        let store = InMemoryStore::new();
        let event = EventId::new();
        store.insert_registration(registration(event, ParticipantId::new(), "T1")).await.unwrap();
        let clash = store.insert_registration(registration(event, ParticipantId::new(), "T1")).await;
        assert!(clash.unwrap_err().violates(UniqueIndex::TicketId));

        let found = store.find_registration_by_ticket(&TicketId::new("T1")).await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn membership_index_follows_team_status() {
        let store = InMemoryStore::new();
        let (event, leader, member) = (EventId::new(), ParticipantId::new(), ParticipantId::new());

        let mut first = team(event, leader, "AAAA0001");
        store.insert_team(first.clone()).await.unwrap();

        let rival = team(event, leader, "AAAA0002");
        assert!(store.insert_team(rival).await.unwrap_err().violates(UniqueIndex::TeamMembership));

        first.members.push(member);
        let v2 = store.replace_team(first.clone(), Version::INITIAL).await.unwrap();
        assert_eq!(store.find_active_team(event, member).await.unwrap().unwrap().doc.id, first.id);

        first.status = TeamStatus::Disbanded;
        store.replace_team(first, v2).await.unwrap();
        assert!(store.find_active_team(event, member).await.unwrap().is_none());

        let fresh = team(event, leader, "AAAA0003");
        assert!(store.insert_team(fresh).await.is_ok());
    }

    #[tokio::test]
    async fn invite_codes_are_unique_and_case_insensitive() {
        let store = InMemoryStore::new();
        store.insert_team(team(EventId::new(), ParticipantId::new(), "abcd1234")).await.unwrap();
        let clash = store.insert_team(team(EventId::new(), ParticipantId::new(), "ABCD1234")).await;
        assert!(clash.unwrap_err().violates(UniqueIndex::InviteCode));

        let found = store.find_team_by_invite_code(&InviteCode::new("AbCd1234")).await.unwrap();
        assert!(found.is_some());
    }
}

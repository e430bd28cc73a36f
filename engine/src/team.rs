//! Team formation and bulk ticketing.
//!
//! A team moves through
//!
//! ```text
//! forming ──join to max──▶ complete
//!    │ ▲
//!  close reopen
//!    ▼ │
//!  closed
//!
//! forming ──leader leaves──▶ disbanded
//! ```
//!
//! Reaching `complete` or `closed` tickets every member. Ticketing skips
//! members that already hold a registration for the event, so running it again
//! after a reopen never duplicates anything. The event's custom form locks
//! with the first issued team registration, not when a team is created.

use crate::environment::EngineEnvironment;
use crate::error::{EngineError, Result};
use crate::form::FormResponses;
use crate::ledger::CapacityLedger;
use crate::lifecycle::lock_form;
use crate::registration::{confirm_with_ticket, ticket_email};
use crate::store::{UniqueIndex, update_team};
use crate::ticketing::generate_invite_code;
use crate::types::{
    Event, EventId, InviteCode, ParticipantId, Principal, Registration, Team, TeamId, TeamStatus,
};
use campus_fest_core::collaborators::InviteEmail;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A member whose ticket could not be issued
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberFailure {
    /// Member
    pub participant: ParticipantId,
    /// Why
    pub error: EngineError,
}

/// Per-member outcome of bulk ticketing
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BulkTicketReport {
    /// Registrations created by this run
    pub issued: Vec<Registration>,
    /// Members that already held a registration
    pub already_ticketed: Vec<ParticipantId>,
    /// Members left without a ticket
    pub failed: Vec<MemberFailure>,
}

impl BulkTicketReport {
    /// Whether every member holds a ticket after this run
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A team after a membership change, with the ticketing it triggered
#[derive(Clone, Debug, PartialEq)]
pub struct TeamUpdate {
    /// Team as stored
    pub team: Team,
    /// Present when the change closed or completed the team
    pub tickets: Option<BulkTicketReport>,
}

/// What leaving did to the team
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveOutcome {
    /// The member was removed
    Left,
    /// The leader left and the team is gone
    Disbanded,
}

fn team_error(error: EngineError, event_id: EventId, participant: ParticipantId) -> EngineError {
    match error {
        EngineError::Storage(store_error) if store_error.violates(UniqueIndex::TeamMembership) => {
            EngineError::AlreadyInTeam {
                event_id,
                participant_id: participant,
            }
        },
        other => other,
    }
}

fn require_forming(team: &Team) -> Result<()> {
    match team.status {
        TeamStatus::Forming => Ok(()),
        TeamStatus::Disbanded => Err(EngineError::InvalidState(format!("team {} is disbanded", team.id))),
        status @ (TeamStatus::Complete | TeamStatus::Closed) => Err(EngineError::TeamLocked {
            team_id: team.id,
            status,
        }),
    }
}

fn require_leader(team: &Team, participant: ParticipantId) -> Result<()> {
    if team.leader == participant {
        Ok(())
    } else {
        Err(EngineError::Forbidden(format!("only the leader may manage team {}", team.id)))
    }
}

/// Team formation workflow
#[derive(Clone)]
pub struct TeamWorkflow {
    env: EngineEnvironment,
    ledger: CapacityLedger,
}

impl TeamWorkflow {
    /// Workflow over `env`
    #[must_use]
    pub fn new(env: EngineEnvironment) -> Self {
        let ledger = CapacityLedger::new(&env);
        Self { env, ledger }
    }

    async fn load_team(&self, team_id: TeamId) -> Result<Team> {
        self.env
            .store
            .load_team(team_id)
            .await?
            .map(|versioned| versioned.doc)
            .ok_or_else(|| EngineError::not_found("team", team_id))
    }

    /// Checks shared by create and join: the event takes teams and is open,
    /// the participant is free, eligible and answered the form.
    async fn admit(
        &self,
        event_id: EventId,
        participant: ParticipantId,
        form_responses: &FormResponses,
    ) -> Result<Event> {
        let event = self.env.load_event(event_id).await?;
        if !event.uses_teams() {
            return Err(EngineError::WrongEventType {
                event_id,
                reason: "not a team event".to_string(),
            });
        }
        if !event.is_open_at(self.env.clock.now()) {
            return Err(EngineError::RegistrationClosed {
                event_id,
                reason: if event.status.accepts_registrations() {
                    "deadline has passed".to_string()
                } else {
                    format!("event is {}", event.status)
                },
            });
        }
        if self.env.store.find_active_team(event_id, participant).await?.is_some() {
            return Err(EngineError::AlreadyInTeam {
                event_id,
                participant_id: participant,
            });
        }
        let profile = self.env.profile(participant).await?;
        if !event.eligibility.admits(profile.class) {
            return Err(EngineError::NotEligible {
                event_id,
                participant_id: participant,
            });
        }
        event.custom_form.validate(form_responses)?;
        Ok(event)
    }

    /// Create a team led by the caller.
    ///
    /// # Errors
    ///
    /// [`EngineError::WrongEventType`], [`EngineError::RegistrationClosed`],
    /// [`EngineError::NotEligible`], [`EngineError::AlreadyInTeam`],
    /// [`EngineError::Validation`]; storage errors, including an invite code
    /// collision that persisted across every attempt.
    pub async fn create_team(
        &self,
        principal: &Principal,
        event_id: EventId,
        name: &str,
        form_responses: FormResponses,
    ) -> Result<Team> {
        let leader = principal.as_participant()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation("team name is required".to_string()));
        }
        let event = self
            .admit(event_id, leader, &form_responses)
            .await
            .inspect_err(|error| tracing::warn!(%event_id, %leader, %error, "Team creation refused"))?;

        let now = self.env.clock.now();
        let mut member_form_responses = HashMap::new();
        member_form_responses.insert(leader, form_responses);
        let mut team = Team {
            id: TeamId::new(),
            event_id,
            name: name.to_string(),
            leader,
            members: vec![leader],
            max_size: event.team_size.max,
            invite_code: generate_invite_code(),
            status: TeamStatus::Forming,
            member_form_responses,
            created_at: now,
            updated_at: now,
        };

        let attempts = self.env.policy.invite_code_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.env.store.insert_team(team.clone()).await {
                Ok(_) => break,
                Err(error) if error.violates(UniqueIndex::InviteCode) && attempt < attempts => {
                    tracing::debug!(%event_id, attempt, code = %team.invite_code, "Invite code collision, regenerating");
                    team.invite_code = generate_invite_code();
                    attempt += 1;
                },
                Err(error) => {
                    let error = team_error(error.into(), event_id, leader);
                    tracing::warn!(%event_id, %leader, %error, "Team creation refused");
                    return Err(error);
                },
            }
        }

        tracing::info!(
            %event_id,
            team_id = %team.id,
            %leader,
            code = %team.invite_code,
            max_size = team.max_size,
            "Team created"
        );
        Ok(team)
    }

    /// Join the team behind an invite code (case-insensitive).
    ///
    /// Taking the last seat completes the team and tickets every member
    /// before returning.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] for unknown codes,
    /// [`EngineError::InvalidState`] for disbanded teams,
    /// [`EngineError::TeamLocked`], [`EngineError::RegistrationClosed`],
    /// [`EngineError::AlreadyInTeam`], [`EngineError::NotEligible`],
    /// [`EngineError::Validation`], [`EngineError::TeamFull`]; storage errors.
    pub async fn join_team(
        &self,
        principal: &Principal,
        invite_code: &str,
        form_responses: FormResponses,
    ) -> Result<TeamUpdate> {
        let participant = principal.as_participant()?;
        let code = InviteCode::new(invite_code);
        let joined = self.try_join(participant, &code, form_responses).await;
        if let Err(error) = &joined {
            tracing::warn!(%participant, %code, reason = error.kind(), %error, "Join refused");
        }
        joined
    }

    async fn try_join(
        &self,
        participant: ParticipantId,
        code: &InviteCode,
        form_responses: FormResponses,
    ) -> Result<TeamUpdate> {
        let found = self
            .env
            .store
            .find_team_by_invite_code(code)
            .await?
            .ok_or_else(|| EngineError::not_found("team", code))?
            .doc;
        require_forming(&found)?;
        let event = self.admit(found.event_id, participant, &form_responses).await?;

        let now = self.env.clock.now();
        let (team, completed) = update_team(self.env.store.as_ref(), &self.env.retry, found.id, |team| {
            require_forming(team)?;
            if team.is_member(participant) {
                return Err(EngineError::AlreadyInTeam {
                    event_id: team.event_id,
                    participant_id: participant,
                });
            }
            if team.is_full() {
                return Err(EngineError::TeamFull(team.id));
            }
            team.members.push(participant);
            team.member_form_responses.insert(participant, form_responses.clone());
            let completed = team.is_full();
            if completed {
                team.status = TeamStatus::Complete;
            }
            team.updated_at = now;
            Ok(completed)
        })
        .await
        .map_err(|error| team_error(error, event.id, participant))?;

        tracing::info!(
            event_id = %team.event_id,
            team_id = %team.id,
            %participant,
            members = team.members.len(),
            max_size = team.max_size,
            "Joined team"
        );

        let tickets = if completed {
            tracing::info!(team_id = %team.id, "Team complete, issuing tickets");
            Some(self.issue_team_tickets(&team).await)
        } else {
            None
        };
        Ok(TeamUpdate { team, tickets })
    }

    /// Leave a forming team; a leaving leader disbands it.
    ///
    /// # Errors
    ///
    /// [`EngineError::TeamLocked`] once closed or complete,
    /// [`EngineError::InvalidState`] when disbanded,
    /// [`EngineError::Forbidden`] for non-members; storage errors.
    pub async fn leave_team(&self, principal: &Principal, team_id: TeamId) -> Result<(Team, LeaveOutcome)> {
        let participant = principal.as_participant()?;
        let now = self.env.clock.now();
        let (team, outcome) = update_team(self.env.store.as_ref(), &self.env.retry, team_id, |team| {
            require_forming(team)?;
            if !team.is_member(participant) {
                return Err(EngineError::Forbidden(format!("not a member of team {team_id}")));
            }
            team.updated_at = now;
            if team.leader == participant {
                team.status = TeamStatus::Disbanded;
                return Ok(LeaveOutcome::Disbanded);
            }
            team.members.retain(|member| *member != participant);
            team.member_form_responses.remove(&participant);
            Ok(LeaveOutcome::Left)
        })
        .await
        .inspect_err(|error| tracing::warn!(%team_id, %participant, %error, "Leave refused"))?;

        match outcome {
            LeaveOutcome::Left => tracing::info!(%team_id, %participant, "Left team"),
            LeaveOutcome::Disbanded => tracing::info!(%team_id, leader = %participant, "Team disbanded"),
        }
        Ok((team, outcome))
    }

    /// Close a forming team early and ticket its members.
    ///
    /// # Errors
    ///
    /// [`EngineError::Forbidden`] for anyone but the leader,
    /// [`EngineError::TeamLocked`], [`EngineError::InvalidState`],
    /// [`EngineError::Validation`] below the event's minimum team size when
    /// that is enforced; storage errors.
    pub async fn close_team(&self, principal: &Principal, team_id: TeamId) -> Result<TeamUpdate> {
        let leader = principal.as_participant()?;
        let current = self.load_team(team_id).await?;
        require_leader(&current, leader)?;
        let event = self.env.load_event(current.event_id).await?;
        let min = event.team_size.min;
        let enforce_min = self.env.policy.enforce_team_min_on_close;

        let now = self.env.clock.now();
        let (team, ()) = update_team(self.env.store.as_ref(), &self.env.retry, team_id, |team| {
            require_forming(team)?;
            let size = u32::try_from(team.members.len()).unwrap_or(u32::MAX);
            if enforce_min && size < min {
                return Err(EngineError::Validation(format!(
                    "team has {size} members, at least {min} required"
                )));
            }
            team.status = TeamStatus::Closed;
            team.updated_at = now;
            Ok(())
        })
        .await
        .inspect_err(|error| tracing::warn!(%team_id, %error, "Close refused"))?;

        tracing::info!(%team_id, members = team.members.len(), "Team closed, issuing tickets");
        let tickets = self.issue_team_tickets(&team).await;
        Ok(TeamUpdate {
            team,
            tickets: Some(tickets),
        })
    }

    /// Reopen a closed team. Tickets already issued stay valid.
    ///
    /// # Errors
    ///
    /// [`EngineError::Forbidden`] for anyone but the leader,
    /// [`EngineError::InvalidState`] unless the team is closed; storage errors.
    pub async fn reopen_team(&self, principal: &Principal, team_id: TeamId) -> Result<Team> {
        let leader = principal.as_participant()?;
        let current = self.load_team(team_id).await?;
        require_leader(&current, leader)?;

        let now = self.env.clock.now();
        let (team, ()) = update_team(self.env.store.as_ref(), &self.env.retry, team_id, |team| {
            if team.status != TeamStatus::Closed {
                return Err(EngineError::InvalidState(format!(
                    "team {team_id} is {}, only closed teams reopen",
                    team.status
                )));
            }
            team.status = TeamStatus::Forming;
            team.updated_at = now;
            Ok(())
        })
        .await?;
        tracing::info!(%team_id, "Team reopened");
        Ok(team)
    }

    /// Mail the invite code of a forming team.
    ///
    /// # Errors
    ///
    /// [`EngineError::Forbidden`] for anyone but the leader,
    /// [`EngineError::TeamLocked`], [`EngineError::InvalidState`],
    /// [`EngineError::Validation`] for a malformed address; storage errors.
    pub async fn invite(&self, principal: &Principal, team_id: TeamId, email: &str) -> Result<()> {
        let leader = principal.as_participant()?;
        let team = self.load_team(team_id).await?;
        require_leader(&team, leader)?;
        require_forming(&team)?;
        let email = email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => {},
            _ => return Err(EngineError::Validation(format!("'{email}' is not an email address"))),
        }
        let event = self.env.load_event(team.event_id).await?;
        let profile = self.env.profile(leader).await?;

        let effect = self.env.notifier.invite_email(
            email.to_string(),
            InviteEmail {
                team_name: team.name.clone(),
                event_name: event.name,
                leader_name: profile.display_name(),
                invite_code: team.invite_code.to_string(),
            },
        );
        self.env.dispatch(effect).await;
        tracing::info!(%team_id, "Team invite sent");
        Ok(())
    }

    /// A team the caller belongs to.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] for missing teams and for non-members;
    /// storage errors.
    pub async fn team_detail(&self, principal: &Principal, team_id: TeamId) -> Result<Team> {
        let participant = principal.as_participant()?;
        let team = self.load_team(team_id).await?;
        if !team.is_member(participant) {
            return Err(EngineError::not_found("team", team_id));
        }
        Ok(team)
    }

    /// The caller's teams that are not disbanded.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn my_teams(&self, principal: &Principal) -> Result<Vec<Team>> {
        let participant = principal.as_participant()?;
        let mut teams = self.env.store.list_teams_for_participant(participant).await?;
        teams.retain(|team| team.status != TeamStatus::Disbanded);
        Ok(teams)
    }

    /// Ticket any members of a closed or complete team still without one.
    ///
    /// # Errors
    ///
    /// [`EngineError::Forbidden`] for anyone but the leader,
    /// [`EngineError::InvalidState`] for forming or disbanded teams; storage
    /// errors.
    pub async fn issue_tickets(&self, principal: &Principal, team_id: TeamId) -> Result<BulkTicketReport> {
        let leader = principal.as_participant()?;
        let team = self.load_team(team_id).await?;
        require_leader(&team, leader)?;
        if !matches!(team.status, TeamStatus::Closed | TeamStatus::Complete) {
            return Err(EngineError::InvalidState(format!(
                "team {team_id} is {}, tickets are issued once it is closed or complete",
                team.status
            )));
        }
        Ok(self.issue_team_tickets(&team).await)
    }

    async fn issue_team_tickets(&self, team: &Team) -> BulkTicketReport {
        let mut report = BulkTicketReport::default();
        let event = match self.env.load_event(team.event_id).await {
            Ok(event) => event,
            Err(error) => {
                tracing::error!(team_id = %team.id, %error, "Bulk ticketing aborted, event unavailable");
                report.failed = team
                    .members
                    .iter()
                    .map(|&participant| MemberFailure {
                        participant,
                        error: error.clone(),
                    })
                    .collect();
                return report;
            },
        };

        for &member in &team.members {
            match self.ticket_member(&event, team, member).await {
                Ok(Some(registration)) => report.issued.push(registration),
                Ok(None) => report.already_ticketed.push(member),
                Err(error) => {
                    tracing::warn!(team_id = %team.id, %member, %error, "Member ticketing failed");
                    report.failed.push(MemberFailure {
                        participant: member,
                        error,
                    });
                },
            }
        }
        if !report.issued.is_empty() && !event.form_locked && !event.custom_form.is_empty() {
            lock_form(&self.env, event.id).await;
        }

        tracing::info!(
            team_id = %team.id,
            event_id = %event.id,
            issued = report.issued.len(),
            already_ticketed = report.already_ticketed.len(),
            failed = report.failed.len(),
            "Bulk ticketing finished"
        );
        report
    }

    async fn ticket_member(&self, event: &Event, team: &Team, member: ParticipantId) -> Result<Option<Registration>> {
        if self.env.store.find_registration(event.id, member).await?.is_some() {
            return Ok(None);
        }
        let responses = team
            .member_form_responses
            .get(&member)
            .cloned()
            .unwrap_or_default();
        let registration =
            match confirm_with_ticket(&self.env, &self.ledger, event, member, responses, Some(team.id)).await {
                Ok(registration) => registration,
                Err(EngineError::DuplicateRegistration { .. }) => return Ok(None),
                Err(error) => return Err(error),
            };

        metrics::counter!("fest_registrations_total", "kind" => "team").increment(1);
        tracing::info!(
            team_id = %team.id,
            %member,
            registration_id = %registration.id,
            "Team member ticketed"
        );
        match self.env.profile(member).await {
            Ok(profile) => {
                self.env
                    .dispatch(ticket_email(&self.env, &profile, event, &registration))
                    .await;
            },
            Err(error) => tracing::warn!(%member, %error, "No profile, ticket email skipped"),
        }
        Ok(Some(registration))
    }
}

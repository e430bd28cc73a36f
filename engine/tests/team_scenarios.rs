//! Team formation and bulk ticketing scenarios.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use campus_fest_engine::prelude::*;
use campus_fest_testing::mocks::SentMail;
use common::{Harness, individual, no_answers, team_event};
use std::collections::HashSet;

#[tokio::test]
async fn third_member_completes_the_team_and_tickets_everyone() {
    let harness = Harness::new();
    let event = harness.published(team_event("Hackathon", 2, 3)).await;
    let members = harness.participants(3).await;
    let teams = harness.engine.teams();

    let team = teams
        .create_team(&members[0], event.id, "Null Pointers", no_answers())
        .await
        .unwrap();
    assert_eq!(team.status, TeamStatus::Forming);
    assert_eq!(team.max_size, 3);
    assert_eq!(team.members, vec![members[0].as_participant().unwrap()]);

    let update = teams
        .join_team(&members[1], team.invite_code.as_str(), no_answers())
        .await
        .unwrap();
    assert_eq!(update.team.status, TeamStatus::Forming);
    assert!(update.tickets.is_none());

    let update = teams
        .join_team(&members[2], &team.invite_code.as_str().to_lowercase(), no_answers())
        .await
        .unwrap();
    assert_eq!(update.team.status, TeamStatus::Complete);
    let report = update.tickets.unwrap();
    assert_eq!(report.issued.len(), 3);
    assert!(report.is_complete());

    let registrations = harness.store_registrations(event.id).await;
    assert_eq!(registrations.len(), 3);
    let ticket_ids: HashSet<_> = registrations
        .iter()
        .map(|registration| registration.ticket_id().unwrap().clone())
        .collect();
    assert_eq!(ticket_ids.len(), 3);
    assert!(registrations.iter().all(|registration| registration.team_id == Some(team.id)));
    assert_eq!(harness.event(event.id).await.registration_count, 3);
    assert_eq!(harness.mailer.tickets().len(), 3);
}

#[tokio::test]
async fn close_reopen_close_never_duplicates() {
    let harness = Harness::new();
    let event = harness.published(team_event("Hackathon", 2, 4)).await;
    let members = harness.participants(3).await;
    let teams = harness.engine.teams();

    let team = teams.create_team(&members[0], event.id, "Bit Flippers", no_answers()).await.unwrap();
    teams.join_team(&members[1], team.invite_code.as_str(), no_answers()).await.unwrap();

    let closed = teams.close_team(&members[0], team.id).await.unwrap();
    assert_eq!(closed.team.status, TeamStatus::Closed);
    assert_eq!(closed.tickets.as_ref().unwrap().issued.len(), 2);

    let reopened = teams.reopen_team(&members[0], team.id).await.unwrap();
    assert_eq!(reopened.status, TeamStatus::Forming);
    teams.join_team(&members[2], team.invite_code.as_str(), no_answers()).await.unwrap();

    let closed = teams.close_team(&members[0], team.id).await.unwrap();
    let report = closed.tickets.unwrap();
    assert_eq!(report.issued.len(), 1);
    assert_eq!(report.already_ticketed.len(), 2);

    assert_eq!(harness.store_registrations(event.id).await.len(), 3);
    assert_eq!(harness.event(event.id).await.registration_count, 3);

    let rerun = teams.issue_tickets(&members[0], team.id).await.unwrap();
    assert!(rerun.issued.is_empty());
    assert_eq!(rerun.already_ticketed.len(), 3);
}

#[tokio::test]
async fn close_below_minimum_is_refused_by_default() {
    let harness = Harness::new();
    let event = harness.published(team_event("Relay", 3, 4)).await;
    let members = harness.participants(2).await;
    let teams = harness.engine.teams();

    let team = teams.create_team(&members[0], event.id, "Runners", no_answers()).await.unwrap();
    teams.join_team(&members[1], team.invite_code.as_str(), no_answers()).await.unwrap();

    let refused = teams.close_team(&members[0], team.id).await;
    assert!(matches!(refused, Err(EngineError::Validation(_))));
    assert!(harness.store_registrations(event.id).await.is_empty());
}

#[tokio::test]
async fn close_below_minimum_when_not_enforced() {
    let harness = Harness::with_policy(EnginePolicy {
        enforce_team_min_on_close: false,
        ..EnginePolicy::default()
    });
    let event = harness.published(team_event("Relay", 3, 4)).await;
    let members = harness.participants(1).await;
    let teams = harness.engine.teams();

    let team = teams.create_team(&members[0], event.id, "Solo", no_answers()).await.unwrap();
    let closed = teams.close_team(&members[0], team.id).await.unwrap();
    assert_eq!(closed.team.status, TeamStatus::Closed);
    assert_eq!(closed.tickets.unwrap().issued.len(), 1);
}

#[tokio::test]
async fn leaving_follows_team_state() {
    let harness = Harness::new();
    let event = harness.published(team_event("Hackathon", 2, 3)).await;
    let members = harness.participants(4).await;
    let teams = harness.engine.teams();

    let team = teams.create_team(&members[0], event.id, "Leavers", no_answers()).await.unwrap();
    teams.join_team(&members[1], team.invite_code.as_str(), no_answers()).await.unwrap();

    let (after, outcome) = teams.leave_team(&members[1], team.id).await.unwrap();
    assert_eq!(outcome, LeaveOutcome::Left);
    assert_eq!(after.members.len(), 1);

    // The leaver is free to start another team
    let other = teams.create_team(&members[1], event.id, "Second", no_answers()).await.unwrap();

    let (after, outcome) = teams.leave_team(&members[0], team.id).await.unwrap();
    assert_eq!(outcome, LeaveOutcome::Disbanded);
    assert_eq!(after.status, TeamStatus::Disbanded);
    assert!(matches!(
        teams.leave_team(&members[0], team.id).await,
        Err(EngineError::InvalidState(_))
    ));
    assert!(matches!(
        teams.join_team(&members[2], team.invite_code.as_str(), no_answers()).await,
        Err(EngineError::InvalidState(_))
    ));

    teams.join_team(&members[2], other.invite_code.as_str(), no_answers()).await.unwrap();
    teams.join_team(&members[3], other.invite_code.as_str(), no_answers()).await.unwrap();
    assert!(matches!(
        teams.leave_team(&members[3], other.id).await,
        Err(EngineError::TeamLocked { status: TeamStatus::Complete, .. })
    ));
}

#[tokio::test]
async fn one_live_team_per_event() {
    let harness = Harness::new();
    let event = harness.published(team_event("Hackathon", 2, 4)).await;
    let members = harness.participants(2).await;
    let teams = harness.engine.teams();

    let first = teams.create_team(&members[0], event.id, "First", no_answers()).await.unwrap();
    let second = teams.create_team(&members[1], event.id, "Second", no_answers()).await.unwrap();

    assert!(matches!(
        teams.create_team(&members[0], event.id, "Again", no_answers()).await,
        Err(EngineError::AlreadyInTeam { .. })
    ));
    assert!(matches!(
        teams.join_team(&members[0], second.invite_code.as_str(), no_answers()).await,
        Err(EngineError::AlreadyInTeam { .. })
    ));
    assert!(matches!(
        teams.join_team(&members[0], first.invite_code.as_str(), no_answers()).await,
        Err(EngineError::AlreadyInTeam { .. })
    ));
}

#[tokio::test]
async fn locked_teams_refuse_joins() {
    let harness = Harness::new();
    let event = harness.published(team_event("Hackathon", 2, 4)).await;
    let members = harness.participants(3).await;
    let teams = harness.engine.teams();

    let team = teams.create_team(&members[0], event.id, "Closed Shop", no_answers()).await.unwrap();
    teams.join_team(&members[1], team.invite_code.as_str(), no_answers()).await.unwrap();
    teams.close_team(&members[0], team.id).await.unwrap();

    assert!(matches!(
        teams.join_team(&members[2], team.invite_code.as_str(), no_answers()).await,
        Err(EngineError::TeamLocked { status: TeamStatus::Closed, .. })
    ));
    assert!(matches!(
        teams.join_team(&members[2], "NOPE0000", no_answers()).await,
        Err(EngineError::NotFound { .. })
    ));
}

#[tokio::test]
async fn team_rules_check_event_and_participant() {
    let harness = Harness::new();
    let solo = harness.published(individual("Solo Talk", 0)).await;
    let mut input = team_event("Campus Cup", 2, 4);
    input.eligibility = Eligibility::GroupA;
    let cup = harness.published(input).await;
    let insider = harness.participant("Insider", ParticipantClass::GroupA).await;
    let visitor = harness.participant("Visitor", ParticipantClass::GroupB).await;
    let teams = harness.engine.teams();

    assert!(matches!(
        teams.create_team(&insider, solo.id, "Wrong", no_answers()).await,
        Err(EngineError::WrongEventType { .. })
    ));
    assert!(matches!(
        teams.create_team(&visitor, cup.id, "Visitors", no_answers()).await,
        Err(EngineError::NotEligible { .. })
    ));
    assert!(matches!(
        teams.create_team(&insider, cup.id, "   ", no_answers()).await,
        Err(EngineError::Validation(_))
    ));

    let team = teams.create_team(&insider, cup.id, "Insiders", no_answers()).await.unwrap();
    assert!(matches!(
        teams.join_team(&visitor, team.invite_code.as_str(), no_answers()).await,
        Err(EngineError::NotEligible { .. })
    ));

    harness.clock.set(cup.registration_deadline + chrono::Duration::minutes(1));
    let late = harness.participant("Late", ParticipantClass::GroupA).await;
    assert!(matches!(
        teams.join_team(&late, team.invite_code.as_str(), no_answers()).await,
        Err(EngineError::RegistrationClosed { .. })
    ));
}

#[tokio::test]
async fn member_answers_travel_to_their_registration() {
    let harness = Harness::new();
    let mut input = team_event("Design Jam", 2, 2);
    input.custom_form = FormSchema::new(vec![FormField::new("Role", FieldType::Text, true)]);
    let event = harness.published(input).await;
    let members = harness.participants(2).await;
    let teams = harness.engine.teams();

    assert!(matches!(
        teams.create_team(&members[0], event.id, "Jammers", no_answers()).await,
        Err(EngineError::Validation(_))
    ));

    let lead = FormResponses::new().with("Role", FieldValue::Text("designer".into()));
    let dev = FormResponses::new().with("Role", FieldValue::Text("developer".into()));
    let team = teams.create_team(&members[0], event.id, "Jammers", lead.clone()).await.unwrap();
    assert!(!harness.event(event.id).await.form_locked);
    let update = teams.join_team(&members[1], team.invite_code.as_str(), dev.clone()).await.unwrap();
    assert!(harness.event(event.id).await.form_locked);

    let report = update.tickets.unwrap();
    let answers: Vec<_> = report
        .issued
        .iter()
        .map(|registration| registration.form_responses.clone())
        .collect();
    assert_eq!(answers, vec![lead, dev]);
}

#[tokio::test]
async fn capacity_shortfall_is_reported_per_member() {
    let harness = Harness::new();
    let mut input = team_event("Small Hall", 2, 3);
    input.registration_limit = 2;
    let event = harness.published(input).await;
    let members = harness.participants(3).await;
    let teams = harness.engine.teams();

    let team = teams.create_team(&members[0], event.id, "Crowd", no_answers()).await.unwrap();
    teams.join_team(&members[1], team.invite_code.as_str(), no_answers()).await.unwrap();
    let update = teams.join_team(&members[2], team.invite_code.as_str(), no_answers()).await.unwrap();

    let report = update.tickets.unwrap();
    assert_eq!(report.issued.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].participant, members[2].as_participant().unwrap());
    assert!(matches!(report.failed[0].error, EngineError::CapacityExceeded { .. }));
    assert_eq!(harness.event(event.id).await.registration_count, 2);
}

#[tokio::test]
async fn leader_manages_and_members_see_the_team() {
    let harness = Harness::new();
    let event = harness.published(team_event("Hackathon", 2, 4)).await;
    let members = harness.participants(3).await;
    let teams = harness.engine.teams();

    let team = teams.create_team(&members[0], event.id, "Owners", no_answers()).await.unwrap();
    teams.join_team(&members[1], team.invite_code.as_str(), no_answers()).await.unwrap();

    assert!(matches!(
        teams.close_team(&members[1], team.id).await,
        Err(EngineError::Forbidden(_))
    ));
    assert!(matches!(
        teams.invite(&members[1], team.id, "friend@campus.test").await,
        Err(EngineError::Forbidden(_))
    ));
    assert!(matches!(
        teams.invite(&members[0], team.id, "not-an-address").await,
        Err(EngineError::Validation(_))
    ));

    teams.invite(&members[0], team.id, "friend@campus.test").await.unwrap();
    match &harness.mailer.sent()[0] {
        SentMail::Invite { to, payload } => {
            assert_eq!(to, "friend@campus.test");
            assert_eq!(payload.invite_code, team.invite_code.as_str());
            assert_eq!(payload.team_name, "Owners");
        },
        other => panic!("expected an invite, got {other:?}"),
    }

    assert_eq!(teams.team_detail(&members[1], team.id).await.unwrap().id, team.id);
    assert!(matches!(
        teams.team_detail(&members[2], team.id).await,
        Err(EngineError::NotFound { .. })
    ));
    assert!(matches!(
        teams.team_detail(&members[2], TeamId::new()).await,
        Err(EngineError::NotFound { .. })
    ));
    assert_eq!(teams.my_teams(&members[1]).await.unwrap().len(), 1);

    teams.leave_team(&members[0], team.id).await.unwrap();
    assert!(teams.my_teams(&members[1]).await.unwrap().is_empty());
}

#[tokio::test]
async fn reopen_only_from_closed() {
    let harness = Harness::new();
    let event = harness.published(team_event("Hackathon", 2, 4)).await;
    let members = harness.participants(1).await;
    let teams = harness.engine.teams();

    let team = teams.create_team(&members[0], event.id, "Forming", no_answers()).await.unwrap();
    assert!(matches!(
        teams.reopen_team(&members[0], team.id).await,
        Err(EngineError::InvalidState(_))
    ));
    assert!(matches!(
        teams.issue_tickets(&members[0], team.id).await,
        Err(EngineError::InvalidState(_))
    ));
}

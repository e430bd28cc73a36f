//! Event creation, edits, transitions and analytics.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use campus_fest_engine::prelude::*;
use chrono::Duration;
use common::{Harness, deadline, end, individual, no_answers, shop};

#[tokio::test]
async fn publishing_announces_the_event() {
    let harness = Harness::new();
    let mut input = individual("Robotics Workshop", 40);
    input.registration_fee = Money::from_cents(25_000);
    input.tags = vec!["tech".to_string()];
    let event = harness.published(input).await;

    assert_eq!(event.status, EventStatus::Published);
    let announced = harness.announcer.announced();
    assert_eq!(announced.len(), 1);
    assert_eq!(announced[0].name, "Robotics Workshop");
    assert_eq!(announced[0].kind, "individual");
    assert_eq!(announced[0].fee_cents, 25_000);
    assert_eq!(announced[0].tags, vec!["tech".to_string()]);
}

#[tokio::test]
async fn creation_defaults_and_filters_by_kind() {
    let harness = Harness::new();
    let mut input = shop("Fest Merch", 5, 1, 100);
    input.custom_form = FormSchema::new(vec![FormField::new("Size", FieldType::Text, true)]);
    input.is_team_event = true;
    let event = harness
        .engine
        .lifecycle()
        .create_event(&harness.organizer, input)
        .await
        .unwrap();

    assert_eq!(event.status, EventStatus::Draft);
    assert!(event.custom_form.is_empty());
    assert!(!event.is_team_event);
    assert_eq!(event.merchandise_items.len(), 1);
    assert_eq!(event.eligibility, Eligibility::All);
    assert_eq!(event.team_size, TeamSize { min: 2, max: 4 });
    assert_eq!(event.registration_count, 0);
}

#[tokio::test]
async fn invalid_events_are_rejected() {
    let harness = Harness::new();
    let lifecycle = harness.engine.lifecycle();

    let unnamed = individual("  ", 0);
    assert!(matches!(
        lifecycle.create_event(&harness.organizer, unnamed).await,
        Err(EngineError::Validation(_))
    ));

    let mut backwards = individual("Backwards", 0);
    backwards.end_date = backwards.start_date - Duration::hours(1);
    assert!(matches!(
        lifecycle.create_event(&harness.organizer, backwards).await,
        Err(EngineError::Validation(_))
    ));

    let alice = harness.participant("Alice", ParticipantClass::GroupA).await;
    assert!(matches!(
        lifecycle.create_event(&alice, individual("Mine", 0)).await,
        Err(EngineError::Forbidden(_))
    ));
}

#[tokio::test]
async fn published_deadline_only_moves_later() {
    let harness = Harness::new();
    let event = harness.published(individual("Talk", 0)).await;
    let lifecycle = harness.engine.lifecycle();

    let earlier = EventPatch {
        registration_deadline: Some(deadline() - Duration::days(1)),
        ..EventPatch::default()
    };
    let (unchanged, report) = lifecycle
        .edit_event(&harness.organizer, event.id, earlier)
        .await
        .unwrap();
    assert!(report.was_ignored(EventField::RegistrationDeadline));
    assert_eq!(unchanged.registration_deadline, deadline());

    let later = EventPatch {
        registration_deadline: Some(deadline() + Duration::days(1)),
        ..EventPatch::default()
    };
    let (changed, report) = lifecycle
        .edit_event(&harness.organizer, event.id, later)
        .await
        .unwrap();
    assert_eq!(report.applied, vec![EventField::RegistrationDeadline]);
    assert_eq!(changed.registration_deadline, deadline() + Duration::days(1));

    let past_end = EventPatch {
        registration_deadline: Some(end() + Duration::days(1)),
        ..EventPatch::default()
    };
    let (_, report) = lifecycle
        .edit_event(&harness.organizer, event.id, past_end)
        .await
        .unwrap();
    assert!(report.was_ignored(EventField::RegistrationDeadline));
}

#[tokio::test]
async fn strict_policy_refuses_illegal_published_edits() {
    let harness = Harness::with_policy(EnginePolicy {
        edit_policy: EditPolicy::Strict,
        ..EnginePolicy::default()
    });
    let event = harness.published(individual("Talk", 10)).await;
    let lifecycle = harness.engine.lifecycle();

    let patch = EventPatch {
        description: Some("Updated".to_string()),
        name: Some("Renamed".to_string()),
        ..EventPatch::default()
    };
    assert!(matches!(
        lifecycle.edit_event(&harness.organizer, event.id, patch).await,
        Err(EngineError::Validation(_))
    ));
    let stored = harness.event(event.id).await;
    assert_eq!(stored.name, "Talk");
    assert_eq!(stored.description, "");
}

#[tokio::test]
async fn published_limit_only_grows() {
    let harness = Harness::new();
    let event = harness.published(individual("Talk", 1)).await;
    let lifecycle = harness.engine.lifecycle();
    let alice = harness.participant("Alice", ParticipantClass::GroupA).await;
    let bob = harness.participant("Bob", ParticipantClass::GroupA).await;
    harness.engine.registrations().register(&alice, event.id, no_answers()).await.unwrap();

    let raise = EventPatch {
        registration_limit: Some(2),
        ..EventPatch::default()
    };
    let (raised, _) = lifecycle.edit_event(&harness.organizer, event.id, raise).await.unwrap();
    assert_eq!(raised.registration_limit, 2);
    harness.engine.registrations().register(&bob, event.id, no_answers()).await.unwrap();

    let shrink = EventPatch {
        registration_limit: Some(1),
        ..EventPatch::default()
    };
    let (kept, report) = lifecycle.edit_event(&harness.organizer, event.id, shrink).await.unwrap();
    assert!(report.was_ignored(EventField::RegistrationLimit));
    assert_eq!(kept.registration_limit, 2);
}

#[tokio::test]
async fn drafts_accept_any_edit_and_stay_private() {
    let harness = Harness::new();
    let lifecycle = harness.engine.lifecycle();
    let draft = lifecycle
        .create_event(&harness.organizer, individual("Draft", 0))
        .await
        .unwrap();
    let alice = harness.participant("Alice", ParticipantClass::GroupA).await;

    assert!(matches!(
        lifecycle.event(&alice, draft.id).await,
        Err(EngineError::EventNotFound(_))
    ));
    let stranger = Principal::organizer(OrganizerId::new());
    assert!(matches!(
        lifecycle
            .edit_event(&stranger, draft.id, EventPatch::default())
            .await,
        Err(EngineError::EventNotFound(_))
    ));

    let patch = EventPatch {
        name: Some("Final Name".to_string()),
        registration_limit: Some(5),
        ..EventPatch::default()
    };
    let (edited, report) = lifecycle.edit_event(&harness.organizer, draft.id, patch).await.unwrap();
    assert!(report.ignored.is_empty());
    assert_eq!(edited.name, "Final Name");
    assert_eq!(edited.registration_limit, 5);

    lifecycle.publish(&harness.organizer, draft.id).await.unwrap();
    assert_eq!(lifecycle.event(&alice, draft.id).await.unwrap().name, "Final Name");
}

#[tokio::test]
async fn lifecycle_moves_forward_only() {
    let harness = Harness::new();
    let event = harness.published(individual("Concert", 0)).await;
    let lifecycle = harness.engine.lifecycle();

    assert!(matches!(
        lifecycle.publish(&harness.organizer, event.id).await,
        Err(EngineError::InvalidTransition { .. })
    ));
    lifecycle
        .transition(&harness.organizer, event.id, EventStatus::Ongoing)
        .await
        .unwrap();
    assert!(matches!(
        lifecycle
            .edit_event(&harness.organizer, event.id, EventPatch::default())
            .await,
        Err(EngineError::InvalidState(_))
    ));
    lifecycle
        .transition(&harness.organizer, event.id, EventStatus::Completed)
        .await
        .unwrap();
    assert!(matches!(
        lifecycle
            .transition(&harness.organizer, event.id, EventStatus::Ongoing)
            .await,
        Err(EngineError::InvalidTransition {
            from: EventStatus::Completed,
            to: EventStatus::Ongoing
        })
    ));
    assert_eq!(harness.announcer.announced().len(), 1);
}

#[tokio::test]
async fn analytics_summarise_counters_and_orders() {
    let harness = Harness::new();
    let event = harness.published(shop("Fest Merch", 10, 2, 5_000)).await;
    let hoodie = event.merchandise_items[0].id;
    let buyers = harness.participants(3).await;
    let merchandise = harness.engine.merchandise();

    let mut orders = Vec::new();
    for buyer in &buyers {
        orders.push(
            merchandise
                .place_order(buyer, event.id, vec![OrderLine::new(hoodie, 1).size("M")])
                .await
                .unwrap(),
        );
    }
    let approved = merchandise.approve_order(&harness.organizer, orders[0].id).await.unwrap();
    merchandise.reject_order(&harness.organizer, orders[1].id).await.unwrap();
    harness
        .engine
        .registrations()
        .mark_attendance(&harness.organizer, approved.ticket_id().unwrap())
        .await
        .unwrap();

    let analytics = harness.engine.lifecycle().analytics(&harness.organizer, event.id).await.unwrap();
    assert_eq!(analytics.registration_count, 1);
    assert_eq!(analytics.total_revenue, Money::from_cents(5_000));
    assert_eq!(analytics.attendance_count, 1);
    assert_eq!(analytics.confirmed, 1);
    assert_eq!(analytics.rejected, 1);
    assert_eq!(analytics.pending, 1);
    assert_eq!(analytics.remaining, None);

    let mine = harness.engine.lifecycle().my_events(&harness.organizer).await.unwrap();
    assert_eq!(mine.len(), 1);
}

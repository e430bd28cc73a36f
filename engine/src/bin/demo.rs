//! Campus fest engine walkthrough.
//!
//! Runs one fest end to end against the in-memory store: an individual event
//! filling up, a merchandise order going through approval and a team forming.
//!
//! ```bash
//! RUST_LOG=campus_fest_engine=debug cargo run --bin demo
//! ```

use campus_fest_engine::metrics::register_engine_metrics;
use campus_fest_engine::prelude::*;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(config: &EngineConfig) {
    let default_filter = format!("demo={0},campus_fest_engine={0}", config.log_level);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn profile(first_name: &str, class: ParticipantClass) -> ParticipantProfile {
    ParticipantProfile {
        id: ParticipantId::new(),
        email: format!("{}@campus.test", first_name.to_lowercase()),
        first_name: first_name.to_string(),
        last_name: "Demo".to_string(),
        class,
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = EngineConfig::from_env();
    init_tracing(&config);
    register_engine_metrics();

    info!("Starting campus fest demo");

    let directory = Arc::new(InMemoryDirectory::new());
    let people = [
        profile("Asha", ParticipantClass::GroupA),
        profile("Bilal", ParticipantClass::GroupA),
        profile("Chen", ParticipantClass::GroupB),
        profile("Dara", ParticipantClass::GroupA),
    ];
    for person in &people {
        directory.insert(person.clone()).await;
    }
    let engine = FestEngine::in_memory(&config, directory);
    let organizer = Principal::organizer(OrganizerId::new());
    let participants: Vec<Principal> = people.iter().map(|person| Principal::participant(person.id)).collect();

    let now = Utc::now();
    let deadline = now + ChronoDuration::days(7);
    let start = now + ChronoDuration::days(10);
    let end = start + ChronoDuration::hours(6);

    // Individual event with two seats
    let mut workshop = NewEvent::new("Robotics Workshop", EventKind::Individual, deadline, start, end);
    workshop.registration_limit = 2;
    workshop.registration_fee = Money::from_cents(15_000);
    workshop.custom_form = FormSchema::new(vec![FormField::new("Department", FieldType::Text, true)]);
    let workshop = engine.lifecycle().create_event(&organizer, workshop).await?;
    engine.lifecycle().publish(&organizer, workshop.id).await?;

    for (participant, person) in participants.iter().zip(&people) {
        let answers = FormResponses::new().with("Department", FieldValue::Text("Mechanical".into()));
        match engine.registrations().register(participant, workshop.id, answers).await {
            Ok(registration) => info!(
                name = %person.display_name(),
                ticket = ?registration.ticket_id().map(ToString::to_string),
                "Workshop seat confirmed"
            ),
            Err(error) => warn!(name = %person.display_name(), %error, "Workshop registration refused"),
        }
    }

    // Merchandise event with a small stock
    let mut shop = NewEvent::new("Fest Merch", EventKind::Merchandise, deadline, start, end);
    shop.merchandise_items = vec![NewMerchandiseItem {
        name: "Hoodie".to_string(),
        sizes: vec!["M".to_string(), "L".to_string()],
        colors: Vec::new(),
        stock_quantity: 3,
        purchase_limit_per_participant: 2,
        price: Money::from_cents(60_000),
    }];
    let shop = engine.lifecycle().create_event(&organizer, shop).await?;
    engine.lifecycle().publish(&organizer, shop.id).await?;
    let hoodie = shop.merchandise_items[0].id;

    let order = engine
        .merchandise()
        .place_order(&participants[0], shop.id, vec![OrderLine::new(hoodie, 2).size("L")])
        .await?;
    let approved = engine.merchandise().approve_order(&organizer, order.id).await?;
    info!(status = ?approved.status, total = %approved.amount, "Merchandise order decided");

    // Team event, teams of two or three
    let mut hackathon = NewEvent::new("Hackathon", EventKind::Individual, deadline, start, end);
    hackathon.is_team_event = true;
    hackathon.team_size = Some(TeamSize { min: 2, max: 3 });
    let hackathon = engine.lifecycle().create_event(&organizer, hackathon).await?;
    engine.lifecycle().publish(&organizer, hackathon.id).await?;

    let team = engine
        .teams()
        .create_team(&participants[1], hackathon.id, "Null Pointers", FormResponses::new())
        .await?;
    engine
        .teams()
        .join_team(&participants[2], team.invite_code.as_str(), FormResponses::new())
        .await?;
    let update = engine
        .teams()
        .join_team(&participants[3], &team.invite_code.as_str().to_lowercase(), FormResponses::new())
        .await?;
    if let Some(report) = &update.tickets {
        info!(
            status = %update.team.status,
            issued = report.issued.len(),
            failed = report.failed.len(),
            "Team tickets issued"
        );
    }

    for event_id in [workshop.id, shop.id, hackathon.id] {
        let analytics = engine.lifecycle().analytics(&organizer, event_id).await?;
        info!(
            %event_id,
            registrations = analytics.registration_count,
            revenue = %analytics.total_revenue,
            "Event summary"
        );
    }

    if !engine.shutdown(Duration::from_secs(5)).await {
        warn!("Some emails were still in flight at exit");
    }
    Ok(())
}

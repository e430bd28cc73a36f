//! Merchandise orders: placement, organizer decision, order list.
//!
//! Placing an order only soft-checks stock; nothing is debited until the
//! organizer approves, because payment is verified by hand. Approval is the
//! one multi-step write in the engine:
//!
//! 1. debit every line (all or nothing)
//! 2. reserve one seat and book the order total
//! 3. issue a ticket and confirm the registration
//!
//! A failure at step 2 credits the stock back; a failure at step 3 releases
//! the seat and credits the stock.

use crate::environment::EngineEnvironment;
use crate::error::{EngineError, Result};
use crate::form::FormResponses;
use crate::ledger::{CapacityLedger, StockLine, StockLines};
use crate::store::{UniqueIndex, update_registration};
use crate::ticketing::issue_ticket;
use crate::types::{
    Event, EventId, EventKind, ItemId, MerchandiseSelection, Money, OrganizerId, ParticipantId,
    PaymentStatus, Principal, Registration, RegistrationId, RegistrationStatus,
};
use campus_fest_core::collaborators::{ApprovalEmail, RejectionEmail};
use serde::{Deserialize, Serialize};

/// One requested line of an order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Item to buy
    pub item_id: ItemId,
    /// Size, required when the item offers sizes
    pub size: Option<String>,
    /// Color, required when the item offers colors
    pub color: Option<String>,
    /// Units
    pub quantity: u32,
}

impl OrderLine {
    /// A line without size or color
    #[must_use]
    pub const fn new(item_id: ItemId, quantity: u32) -> Self {
        Self {
            item_id,
            size: None,
            color: None,
            quantity,
        }
    }

    /// Choose a size
    #[must_use]
    pub fn size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    /// Choose a color
    #[must_use]
    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Organizer decision on a pending order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderDecision {
    /// Debit stock, confirm and ticket
    Approve,
    /// Reject without touching stock or counters
    Reject,
}

fn pick_option(
    offered: &[String],
    chosen: Option<&String>,
    item: &str,
    what: &str,
) -> Result<Option<String>> {
    if offered.is_empty() {
        return Ok(None);
    }
    match chosen {
        Some(value) if offered.iter().any(|option| option == value) => Ok(Some(value.clone())),
        Some(value) => Err(EngineError::Validation(format!(
            "{item}: {what} '{value}' is not offered"
        ))),
        None => Err(EngineError::Validation(format!("{item}: {what} is required"))),
    }
}

/// Price and validate order lines against the event's catalogue.
///
/// `held` returns the units of an item the participant already holds in
/// non-rejected orders.
///
/// # Errors
///
/// [`EngineError::Validation`] for empty orders, zero quantities, bad
/// variants and purchase-limit breaches; [`EngineError::NotFound`] for unknown
/// items; [`EngineError::InsufficientStock`] when stock is already short.
pub fn price_order(
    event: &Event,
    lines: &[OrderLine],
    held: impl Fn(ItemId) -> u32,
) -> Result<(Vec<MerchandiseSelection>, Money)> {
    if lines.is_empty() {
        return Err(EngineError::Validation("an order needs at least one item".to_string()));
    }

    let mut selections = Vec::with_capacity(lines.len());
    let mut total = Money::ZERO;
    for line in lines {
        let item = event
            .item(line.item_id)
            .ok_or_else(|| EngineError::not_found("merchandise item", line.item_id))?;
        if line.quantity == 0 {
            return Err(EngineError::Validation(format!(
                "{}: quantity must be at least 1",
                item.name
            )));
        }
        let size = pick_option(&item.sizes, line.size.as_ref(), &item.name, "size")?;
        let color = pick_option(&item.colors, line.color.as_ref(), &item.name, "color")?;

        let requested: u32 = selections
            .iter()
            .filter(|selection: &&MerchandiseSelection| selection.item_id == item.id)
            .map(|selection| selection.quantity)
            .sum::<u32>()
            .saturating_add(line.quantity);
        if item.stock_quantity < requested {
            return Err(EngineError::InsufficientStock {
                item: item.name.clone(),
                requested,
                available: item.stock_quantity,
            });
        }
        let holding = held(item.id).saturating_add(requested);
        if holding > item.purchase_limit_per_participant {
            return Err(EngineError::Validation(format!(
                "{}: purchase limit is {} per participant",
                item.name, item.purchase_limit_per_participant
            )));
        }

        let line_total = item
            .price
            .checked_times(line.quantity)
            .and_then(|amount| total.checked_add(amount))
            .ok_or_else(|| EngineError::Validation("order total overflow".to_string()))?;
        total = line_total;
        selections.push(MerchandiseSelection {
            item_id: item.id,
            item_name: item.name.clone(),
            size,
            color,
            quantity: line.quantity,
            unit_price: item.price,
        });
    }
    Ok((selections, total))
}

fn stock_lines(registration: &Registration) -> StockLines {
    registration
        .merchandise_selections
        .iter()
        .map(|selection| -> StockLine { (selection.item_id, selection.quantity) })
        .collect()
}

/// Merchandise order workflow
#[derive(Clone)]
pub struct MerchandiseWorkflow {
    env: EngineEnvironment,
    ledger: CapacityLedger,
}

impl MerchandiseWorkflow {
    /// Workflow over `env`
    #[must_use]
    pub fn new(env: EngineEnvironment) -> Self {
        let ledger = CapacityLedger::new(&env);
        Self { env, ledger }
    }

    /// Place an order; it waits for the organizer's decision.
    ///
    /// The order is `pending`/`pending_approval`, or `pending`/`na` when the
    /// total is zero. No stock is debited.
    ///
    /// # Errors
    ///
    /// [`EngineError::EventNotFound`], [`EngineError::WrongEventType`],
    /// [`EngineError::RegistrationClosed`], [`EngineError::NotEligible`],
    /// pricing errors (see [`price_order`]) and
    /// [`EngineError::DuplicateRegistration`] for a second order.
    pub async fn place_order(
        &self,
        principal: &Principal,
        event_id: EventId,
        lines: Vec<OrderLine>,
    ) -> Result<Registration> {
        let participant = principal.as_participant()?;
        let placed = self.try_place(participant, event_id, &lines).await;
        match &placed {
            Ok(order) => {
                metrics::counter!("fest_merch_orders_total", "outcome" => "placed").increment(1);
                tracing::info!(
                    %event_id,
                    %participant,
                    registration_id = %order.id,
                    total = %order.amount,
                    lines = order.merchandise_selections.len(),
                    "Merchandise order placed"
                );
            },
            Err(error) => {
                tracing::warn!(%event_id, %participant, reason = error.kind(), %error, "Merchandise order refused");
            },
        }
        placed
    }

    async fn try_place(
        &self,
        participant: ParticipantId,
        event_id: EventId,
        lines: &[OrderLine],
    ) -> Result<Registration> {
        let now = self.env.clock.now();
        let event = self.env.load_event(event_id).await?;
        if event.kind != EventKind::Merchandise {
            return Err(EngineError::WrongEventType {
                event_id,
                reason: "orders are only taken for merchandise events".to_string(),
            });
        }
        if !event.is_open_at(now) {
            return Err(EngineError::RegistrationClosed {
                event_id,
                reason: if event.status.accepts_registrations() {
                    "deadline has passed".to_string()
                } else {
                    format!("event is {}", event.status)
                },
            });
        }
        let profile = self.env.profile(participant).await?;
        if !event.eligibility.admits(profile.class) {
            return Err(EngineError::NotEligible {
                event_id,
                participant_id: participant,
            });
        }

        let prior: Vec<Registration> = self
            .env
            .store
            .list_registrations_for_participant(participant)
            .await?
            .into_iter()
            .filter(|order| order.event_id == event_id && order.status != RegistrationStatus::Rejected)
            .collect();
        let (selections, total) = price_order(&event, lines, |item| {
            prior.iter().map(|order| order.quantity_of(item)).sum()
        })?;

        let order = Registration {
            id: RegistrationId::new(),
            event_id,
            participant_id: participant,
            status: RegistrationStatus::Pending,
            payment_status: if total.is_zero() {
                PaymentStatus::Na
            } else {
                PaymentStatus::PendingApproval
            },
            ticket: None,
            merchandise_selections: selections,
            amount: total,
            form_responses: FormResponses::new(),
            team_id: None,
            attendance_marked: false,
            registered_at: now,
            updated_at: now,
        };
        self.env
            .store
            .insert_registration(order.clone())
            .await
            .map_err(|error| {
                if error.violates(UniqueIndex::RegistrationParticipant) {
                    EngineError::DuplicateRegistration {
                        event_id,
                        participant_id: participant,
                    }
                } else {
                    error.into()
                }
            })?;
        Ok(order)
    }

    /// Approve or reject a pending order.
    ///
    /// # Errors
    ///
    /// See [`Self::approve_order`] and [`Self::reject_order`].
    pub async fn decide(
        &self,
        principal: &Principal,
        registration_id: RegistrationId,
        decision: OrderDecision,
    ) -> Result<Registration> {
        match decision {
            OrderDecision::Approve => self.approve_order(principal, registration_id).await,
            OrderDecision::Reject => self.reject_order(principal, registration_id).await,
        }
    }

    async fn pending_order(
        &self,
        organizer: OrganizerId,
        registration_id: RegistrationId,
    ) -> Result<(Event, Registration)> {
        let order = self
            .env
            .store
            .load_registration(registration_id)
            .await?
            .ok_or_else(|| EngineError::not_found("registration", registration_id))?
            .doc;
        let event = self.env.load_event(order.event_id).await?;
        if event.organizer != organizer {
            return Err(EngineError::not_found("registration", registration_id));
        }
        if event.kind != EventKind::Merchandise {
            return Err(EngineError::WrongEventType {
                event_id: event.id,
                reason: "only merchandise orders await a decision".to_string(),
            });
        }
        if order.payment_status != PaymentStatus::PendingApproval {
            return Err(EngineError::InvalidState(format!(
                "order {registration_id} is not awaiting approval"
            )));
        }
        Ok((event, order))
    }

    /// Approve an order: debit stock, book the seat and revenue, ticket it.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] for a missing order or another organizer's
    /// event, [`EngineError::InvalidState`] unless the order awaits approval,
    /// [`EngineError::InsufficientStock`], [`EngineError::CapacityExceeded`];
    /// storage errors. On any error stock and counters are as before.
    pub async fn approve_order(&self, principal: &Principal, registration_id: RegistrationId) -> Result<Registration> {
        let organizer = principal.as_organizer()?;
        let (event, order) = self.pending_order(organizer, registration_id).await?;
        let event_id = event.id;
        let lines = stock_lines(&order);

        if let Err(error) = self.ledger.debit_lines(event_id, &lines).await {
            tracing::warn!(%event_id, %registration_id, %error, "Approval refused, stock short");
            return Err(error);
        }
        if let Err(error) = self.ledger.try_reserve(event_id, 1, order.amount).await {
            self.ledger.credit_lines(event_id, &lines).await;
            tracing::warn!(%event_id, %registration_id, %error, "Approval refused, stock credited back");
            return Err(error);
        }

        let ticket = issue_ticket(self.env.tickets.as_ref()).await;
        let now = self.env.clock.now();
        let confirmed = update_registration(self.env.store.as_ref(), &self.env.retry, registration_id, |order| {
            if order.payment_status != PaymentStatus::PendingApproval {
                return Err(EngineError::InvalidState(format!(
                    "order {registration_id} was decided concurrently"
                )));
            }
            order.status = RegistrationStatus::Confirmed;
            order.payment_status = PaymentStatus::Approved;
            order.ticket = Some(ticket.clone());
            order.updated_at = now;
            Ok(())
        })
        .await;

        let order = match confirmed {
            Ok((order, ())) => order,
            Err(error) => {
                if let Err(release_error) = self.ledger.release(event_id, 1, order.amount).await {
                    tracing::error!(%event_id, %registration_id, error = %release_error, "Seat release failed");
                }
                self.ledger.credit_lines(event_id, &lines).await;
                tracing::warn!(%event_id, %registration_id, %error, "Approval rolled back");
                return Err(error);
            },
        };

        metrics::counter!("fest_merch_orders_total", "outcome" => "approved").increment(1);
        metrics::counter!("fest_registrations_total", "kind" => "merchandise").increment(1);
        tracing::info!(
            %event_id,
            %registration_id,
            ticket_id = %ticket.id,
            total = %order.amount,
            "Merchandise order approved"
        );

        match self.env.profile(order.participant_id).await {
            Ok(profile) => {
                let effect = self.env.notifier.approval_email(
                    profile.email.clone(),
                    ApprovalEmail {
                        participant_name: profile.display_name(),
                        event_name: event.name.clone(),
                        ticket_id: ticket.id.clone(),
                        qr_code: ticket.qr_code.clone(),
                        total_cents: order.amount.cents(),
                    },
                );
                self.env.dispatch(effect).await;
            },
            Err(error) => tracing::warn!(%registration_id, %error, "No profile, approval email skipped"),
        }
        Ok(order)
    }

    /// Reject an order; stock and counters are untouched.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] for a missing order or another organizer's
    /// event, [`EngineError::InvalidState`] unless the order awaits approval;
    /// storage errors.
    pub async fn reject_order(&self, principal: &Principal, registration_id: RegistrationId) -> Result<Registration> {
        let organizer = principal.as_organizer()?;
        let (event, _) = self.pending_order(organizer, registration_id).await?;
        let now = self.env.clock.now();
        let (order, ()) = update_registration(self.env.store.as_ref(), &self.env.retry, registration_id, |order| {
            if order.payment_status != PaymentStatus::PendingApproval {
                return Err(EngineError::InvalidState(format!(
                    "order {registration_id} was decided concurrently"
                )));
            }
            order.status = RegistrationStatus::Rejected;
            order.payment_status = PaymentStatus::Rejected;
            order.updated_at = now;
            Ok(())
        })
        .await?;

        metrics::counter!("fest_merch_orders_total", "outcome" => "rejected").increment(1);
        tracing::info!(event_id = %event.id, %registration_id, "Merchandise order rejected");

        match self.env.profile(order.participant_id).await {
            Ok(profile) => {
                let effect = self.env.notifier.rejection_email(
                    profile.email.clone(),
                    RejectionEmail {
                        participant_name: profile.display_name(),
                        event_name: event.name.clone(),
                    },
                );
                self.env.dispatch(effect).await;
            },
            Err(error) => tracing::warn!(%registration_id, %error, "No profile, rejection email skipped"),
        }
        Ok(order)
    }

    /// Every order for one of the caller's merchandise events, oldest first.
    ///
    /// # Errors
    ///
    /// [`EngineError::EventNotFound`] for a missing or foreign event,
    /// [`EngineError::WrongEventType`]; storage errors.
    pub async fn list_orders(&self, principal: &Principal, event_id: EventId) -> Result<Vec<Registration>> {
        let organizer = principal.as_organizer()?;
        let event = self.env.load_event(event_id).await?;
        if event.organizer != organizer {
            return Err(EngineError::EventNotFound(event_id));
        }
        if event.kind != EventKind::Merchandise {
            return Err(EngineError::WrongEventType {
                event_id,
                reason: "not a merchandise event".to_string(),
            });
        }
        Ok(self.env.store.list_registrations_for_event(event_id).await?)
    }
}

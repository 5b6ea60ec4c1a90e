use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use tessera_catalog::{Hold, InventoryLedger, LedgerError};
use tessera_core::events::{publish_event, EventPublisher};
use tessera_core::payment::{GatewayError, PaymentConfirmation, PaymentGateway};
use tessera_core::repository::{IntentRepository, OfferingRepository, StoreError, TicketRepository};
use tessera_core::reservation::{
    BuyerContact, FailureReason, IntentStatus, PaymentRejection, ReservationIntent,
};
use tessera_core::ticket::{AttendeeIdentity, CheckInOutcome, Ticket};
use tessera_shared::models::events::{
    PaymentConfirmedEvent, PaymentRejectedEvent, ReservationCreatedEvent, TicketCheckedInEvent,
    TicketIssuedEvent, TOPIC_PAYMENT_CONFIRMED, TOPIC_PAYMENT_REJECTED, TOPIC_RESERVATION_CREATED,
    TOPIC_TICKET_CHECKED_IN, TOPIC_TICKET_ISSUED,
};

use crate::checkin::{CheckInError, CheckInService};
use crate::fulfillment::{IssueError, IssuedTicket, TicketIssuer};
use crate::intents::{GatewayRefs, IntentError, IntentTracker};
use crate::verification::{PaymentVerifier, VerificationError};

pub struct BookingDeps {
    pub offerings: Arc<dyn OfferingRepository>,
    pub intents: Arc<dyn IntentRepository>,
    pub tickets: Arc<dyn TicketRepository>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub events: Arc<dyn EventPublisher>,
    pub webhook_secret: Vec<u8>,
    pub hold_ttl: Duration,
    pub max_seats_per_reservation: i32,
}

#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub offering_id: Uuid,
    pub buyer: BuyerContact,
    pub attendees: Vec<String>,
    pub quantity: i32,
}

/// What the buyer's payment client needs to pay.
#[derive(Debug, Clone, Serialize)]
pub struct ReservationReceipt {
    pub intent_id: Uuid,
    pub offering_id: Uuid,
    pub gateway_order_ref: String,
    pub quantity: i32,
    pub amount: i64,
    pub currency: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum ConfirmationOutcome {
    Confirmed {
        intent: ReservationIntent,
        tickets: Vec<Ticket>,
    },
    /// Replayed callback for a payment that was already applied.
    AlreadyConfirmed {
        intent: ReservationIntent,
        tickets: Vec<Ticket>,
    },
    Rejected {
        intent_id: Option<Uuid>,
        reason: &'static str,
    },
}

impl ConfirmationOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            ConfirmationOutcome::Confirmed { .. } => "confirmed",
            ConfirmationOutcome::AlreadyConfirmed { .. } => "already_confirmed",
            ConfirmationOutcome::Rejected { .. } => "rejected",
        }
    }
}

/// Drives a booking across the ledger, the intent tracker, the verifier and
/// the issuer. Capacity held by an intent is given back only by whoever wins
/// that intent's transition to `failed`.
pub struct BookingOrchestrator {
    ledger: InventoryLedger,
    tracker: IntentTracker,
    verifier: PaymentVerifier,
    issuer: TicketIssuer,
    checkin: CheckInService,
    gateway: Arc<dyn PaymentGateway>,
    events: Arc<dyn EventPublisher>,
    max_seats: i32,
}

impl BookingOrchestrator {
    pub fn new(deps: BookingDeps) -> Self {
        Self {
            ledger: InventoryLedger::new(deps.offerings, deps.hold_ttl),
            tracker: IntentTracker::new(deps.intents),
            verifier: PaymentVerifier::new(deps.webhook_secret, deps.gateway.clone()),
            issuer: TicketIssuer::new(deps.tickets.clone()),
            checkin: CheckInService::new(deps.tickets),
            gateway: deps.gateway,
            events: deps.events,
            max_seats: deps.max_seats_per_reservation,
        }
    }

    pub fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }

    pub fn issuer(&self) -> &TicketIssuer {
        &self.issuer
    }

    pub async fn reserve(
        &self,
        request: ReservationRequest,
    ) -> Result<ReservationReceipt, BookingError> {
        if request.quantity < 1 || request.quantity > self.max_seats {
            return Err(BookingError::Invalid(format!(
                "quantity must be between 1 and {}",
                self.max_seats
            )));
        }
        if request.buyer.name.trim().is_empty() {
            return Err(BookingError::Invalid("buyer name is required".to_string()));
        }
        if request.attendees.len() > request.quantity as usize {
            return Err(BookingError::Invalid("more attendee names than seats".to_string()));
        }

        let offering = self.ledger.get(request.offering_id).await?;
        let amount = offering
            .price_for(request.quantity)
            .ok_or_else(|| BookingError::Invalid("order total overflows".to_string()))?;

        let hold = self.ledger.try_reserve(offering.id, request.quantity).await?;

        // The hold must be released on every failure path from here on.
        let receipt = format!("{}-{}", offering.code, Uuid::new_v4().simple());
        let order = match self.gateway.create_order(&receipt, amount, &offering.currency).await {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(offering_id = %offering.id, "Gateway order creation failed: {}", e);
                self.release_hold(hold).await;
                return Err(e.into());
            }
        };

        let intent = match self
            .tracker
            .create_intent(
                &hold,
                request.buyer,
                request.attendees,
                amount,
                &offering.currency,
                &order.order_ref,
            )
            .await
        {
            Ok(intent) => intent,
            Err(e) => {
                self.release_hold(hold).await;
                return Err(e.into());
            }
        };

        publish_event(
            self.events.as_ref(),
            TOPIC_RESERVATION_CREATED,
            &intent.id.to_string(),
            &ReservationCreatedEvent {
                intent_id: intent.id,
                offering_id: intent.offering_id,
                quantity: intent.quantity,
                amount: intent.amount,
                currency: intent.currency.clone(),
                gateway_order_ref: intent.gateway_order_ref.clone(),
                timestamp: Utc::now().timestamp(),
            },
        )
        .await;

        Ok(ReservationReceipt {
            intent_id: intent.id,
            offering_id: intent.offering_id,
            gateway_order_ref: intent.gateway_order_ref,
            quantity: intent.quantity,
            amount: intent.amount,
            currency: intent.currency,
            expires_at: intent.expires_at,
        })
    }

    /// Applies a gateway confirmation. Safe to call any number of times for
    /// the same payment. `Err` is returned only for transient failures the
    /// caller should retry; every verification failure becomes `Rejected`.
    pub async fn confirm_payment(
        &self,
        confirmation: &PaymentConfirmation,
    ) -> Result<ConfirmationOutcome, BookingError> {
        let Some(intent) = self
            .tracker
            .find_by_order_ref(&confirmation.gateway_order_ref)
            .await?
        else {
            return self.reject(None, confirmation, "unknown_order", None).await;
        };

        if let Err(e) = self.verifier.check_signature(confirmation) {
            return self.reject(Some(intent.id), confirmation, e.code(), None).await;
        }

        match intent.status {
            IntentStatus::Pending => self.settle(intent, confirmation).await,
            IntentStatus::Paid | IntentStatus::Refunded if settled_by(&intent, confirmation) => {
                self.replay(intent).await
            }
            IntentStatus::Paid | IntentStatus::Refunded => {
                let detail = intent
                    .gateway_payment_ref
                    .as_ref()
                    .map(|r| format!("settled by {}", r));
                self.reject(Some(intent.id), confirmation, "order_already_paid", detail).await
            }
            IntentStatus::Failed => {
                let detail = intent
                    .failure_reason
                    .map(|r| format!("intent failed: {}", r.as_str()));
                self.reject(Some(intent.id), confirmation, "intent_closed", detail).await
            }
        }
    }

    async fn settle(
        &self,
        intent: ReservationIntent,
        confirmation: &PaymentConfirmation,
    ) -> Result<ConfirmationOutcome, BookingError> {
        let verified = match self.verifier.verify(confirmation, &intent).await {
            Ok(verified) => verified,
            Err(VerificationError::Gateway(e)) if e.is_transient() => {
                tracing::warn!(intent_id = %intent.id, "Gateway unavailable, leaving intent pending: {}", e);
                return Err(e.into());
            }
            Err(e) => return self.fail_verification(intent, confirmation, e).await,
        };

        let refs = GatewayRefs {
            order_ref: verified.payment.order_ref.clone(),
            payment_ref: verified.payment.payment_ref.clone(),
        };

        match self.tracker.mark_paid(intent.id, &refs).await {
            Ok(paid) => {
                self.ledger.commit(Hold::for_intent(&paid));
                let tickets = self.issue_tickets(&paid).await?;

                publish_event(
                    self.events.as_ref(),
                    TOPIC_PAYMENT_CONFIRMED,
                    &paid.id.to_string(),
                    &PaymentConfirmedEvent {
                        intent_id: paid.id,
                        offering_id: paid.offering_id,
                        gateway_payment_ref: refs.payment_ref,
                        amount: paid.amount,
                        ticket_codes: tickets.iter().map(|t| t.code.clone()).collect(),
                        timestamp: Utc::now().timestamp(),
                    },
                )
                .await;

                Ok(ConfirmationOutcome::Confirmed { intent: paid, tickets })
            }
            // Another delivery of the same callback won the race.
            Err(IntentError::AlreadyFinalized(current)) if settled_by(&current, confirmation) => {
                self.replay(*current).await
            }
            Err(IntentError::AlreadyFinalized(current)) => {
                // Real money arrived for an intent that expired or was paid
                // another way. Logged for a refund.
                let reason = match current.status {
                    IntentStatus::Failed => "paid_after_close",
                    _ => "order_already_paid",
                };
                let detail = format!("amount {}", verified.payment.amount);
                self.reject(Some(current.id), confirmation, reason, Some(detail))
                    .await
            }
            Err(IntentError::PaymentReferenceInUse(detail)) => {
                self.reject(Some(intent.id), confirmation, "payment_reference_reused", Some(detail))
                    .await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fail_verification(
        &self,
        intent: ReservationIntent,
        confirmation: &PaymentConfirmation,
        error: VerificationError,
    ) -> Result<ConfirmationOutcome, BookingError> {
        if let Some(reason) = error.failure_reason() {
            match self.tracker.mark_failed(intent.id, reason).await {
                Ok(failed) => self.release_hold(Hold::for_intent(&failed)).await,
                Err(IntentError::AlreadyFinalized(current)) => {
                    tracing::info!(intent_id = %current.id, status = current.status.as_str(), "Intent settled concurrently, not failing it");
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.reject(Some(intent.id), confirmation, error.code(), Some(error.to_string()))
            .await
    }

    async fn replay(&self, intent: ReservationIntent) -> Result<ConfirmationOutcome, BookingError> {
        tracing::info!(intent_id = %intent.id, "Duplicate payment confirmation");
        // Re-running issuance is idempotent and completes a run that failed midway.
        let tickets = match intent.status {
            IntentStatus::Paid => self.issue_tickets(&intent).await?,
            _ => self.issuer.tickets_for_intent(intent.id).await?,
        };
        Ok(ConfirmationOutcome::AlreadyConfirmed { intent, tickets })
    }

    async fn reject(
        &self,
        intent_id: Option<Uuid>,
        confirmation: &PaymentConfirmation,
        reason: &'static str,
        detail: Option<String>,
    ) -> Result<ConfirmationOutcome, BookingError> {
        let rejection = PaymentRejection::new(
            intent_id,
            &confirmation.gateway_order_ref,
            Some(&confirmation.gateway_payment_ref),
            reason,
            detail,
        );
        self.tracker.record_rejection(&rejection).await?;

        publish_event(
            self.events.as_ref(),
            TOPIC_PAYMENT_REJECTED,
            &confirmation.gateway_order_ref,
            &PaymentRejectedEvent {
                intent_id,
                gateway_order_ref: rejection.gateway_order_ref,
                gateway_payment_ref: rejection.gateway_payment_ref,
                reason: reason.to_string(),
                timestamp: Utc::now().timestamp(),
            },
        )
        .await;

        Ok(ConfirmationOutcome::Rejected { intent_id, reason })
    }

    async fn issue_tickets(&self, intent: &ReservationIntent) -> Result<Vec<Ticket>, BookingError> {
        let offering = self.ledger.get(intent.offering_id).await?;
        let issued = self.issuer.issue_for_intent(&offering, intent).await?;
        for t in issued.iter().filter(|t| t.newly_issued) {
            self.publish_issued(&t.ticket).await;
        }
        Ok(issued.into_iter().map(|t| t.ticket).collect())
    }

    async fn publish_issued(&self, ticket: &Ticket) {
        publish_event(
            self.events.as_ref(),
            TOPIC_TICKET_ISSUED,
            &ticket.code,
            &TicketIssuedEvent {
                ticket_id: ticket.id,
                code: ticket.code.clone(),
                offering_id: ticket.offering_id,
                intent_id: ticket.intent_id,
                timestamp: Utc::now().timestamp(),
            },
        )
        .await;
    }

    async fn release_hold(&self, hold: Hold) {
        let offering_id = hold.offering_id;
        let quantity = hold.quantity;
        if let Err(e) = self.ledger.release(hold).await {
            tracing::error!(%offering_id, quantity, "Failed to release held capacity: {}", e);
        }
    }

    /// Fails pending intents whose hold has lapsed and returns their seats.
    /// Returns how many holds were reclaimed.
    pub async fn expire_stale(
        &self,
        now: DateTime<Utc>,
        batch: i64,
    ) -> Result<usize, BookingError> {
        let stale = self.tracker.expired_pending(now, batch).await?;
        let mut reclaimed = 0;

        for intent in stale {
            match self.tracker.mark_failed(intent.id, FailureReason::Expired).await {
                Ok(failed) => {
                    self.release_hold(Hold::for_intent(&failed)).await;
                    reclaimed += 1;
                }
                // payment landed first
                Err(IntentError::AlreadyFinalized(_)) => {}
                Err(e) => tracing::warn!(intent_id = %intent.id, "Could not expire intent: {}", e),
            }
        }

        if reclaimed > 0 {
            tracing::info!(reclaimed, "Expired stale reservation holds");
        }
        Ok(reclaimed)
    }

    /// Refunds a paid intent at the gateway, then records it. Issued tickets
    /// and capacity are left untouched. The intent id is the gateway's
    /// idempotency key, so retrying after the bookkeeping step failed does
    /// not refund twice.
    pub async fn refund(&self, intent_id: Uuid) -> Result<ReservationIntent, BookingError> {
        let intent = self.tracker.get(intent_id).await?;
        if intent.status != IntentStatus::Paid {
            return Err(IntentError::InvalidTransition {
                from: intent.status,
                to: IntentStatus::Refunded,
            }
            .into());
        }
        let payment_ref = intent
            .gateway_payment_ref
            .as_deref()
            .ok_or_else(|| {
                BookingError::Invalid(format!("intent {} has no payment reference", intent_id))
            })?;

        let idempotency_key = intent.id.to_string();
        self.gateway
            .refund(payment_ref, intent.amount, &idempotency_key)
            .await?;
        Ok(self.tracker.mark_refunded(intent_id).await?)
    }

    /// Walk-in or back-office registration: one seat, one ticket, no payment.
    /// Registering the same attendee again returns their existing ticket
    /// without touching capacity, even once the offering is full or closed.
    pub async fn register_attendee(
        &self,
        offering_id: Uuid,
        attendee: AttendeeIdentity,
    ) -> Result<IssuedTicket, BookingError> {
        let offering = self.ledger.get(offering_id).await?;
        if let Some(existing) = self.issuer.existing(offering_id, &attendee).await? {
            tracing::debug!(code = %existing.ticket.code, "Attendee already registered");
            return Ok(existing);
        }

        let hold = self.ledger.try_reserve(offering_id, 1).await?;

        match self.issuer.issue(&offering, &attendee, None).await {
            Ok(issued) if issued.newly_issued => {
                self.ledger.commit(hold);
                self.publish_issued(&issued.ticket).await;
                Ok(issued)
            }
            // lost a race with a concurrent registration of the same attendee
            Ok(existing) => {
                self.release_hold(hold).await;
                Ok(existing)
            }
            Err(e) => {
                self.release_hold(hold).await;
                Err(e.into())
            }
        }
    }

    /// Buyer-side polling after payment.
    pub async fn reservation_status(
        &self,
        gateway_order_ref: &str,
    ) -> Result<(ReservationIntent, Vec<Ticket>), BookingError> {
        let intent = self
            .tracker
            .find_by_order_ref(gateway_order_ref)
            .await?
            .ok_or_else(|| IntentError::NotFound(gateway_order_ref.to_string()))?;
        let tickets = self.issuer.tickets_for_intent(intent.id).await?;
        Ok((intent, tickets))
    }

    pub async fn check_in(
        &self,
        code: &str,
        event_id: Uuid,
        actor: Option<&str>,
    ) -> Result<CheckInOutcome, BookingError> {
        let outcome = self.checkin.check_in(code, event_id, actor).await?;
        if let CheckInOutcome::Success(ticket) = &outcome {
            publish_event(
                self.events.as_ref(),
                TOPIC_TICKET_CHECKED_IN,
                &ticket.code,
                &TicketCheckedInEvent {
                    ticket_id: ticket.id,
                    code: ticket.code.clone(),
                    offering_id: ticket.offering_id,
                    checked_in_by: ticket.checked_in_by.clone(),
                    timestamp: Utc::now().timestamp(),
                },
            )
            .await;
        }
        Ok(outcome)
    }
}

fn settled_by(intent: &ReservationIntent, confirmation: &PaymentConfirmation) -> bool {
    intent.gateway_payment_ref.as_deref() == Some(confirmation.gateway_payment_ref.as_str())
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Intent(#[from] IntentError),

    #[error(transparent)]
    Issue(#[from] IssueError),

    #[error(transparent)]
    CheckIn(#[from] CheckInError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

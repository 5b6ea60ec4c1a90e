use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use tessera_catalog::Hold;
use tessera_core::repository::{IntentRepository, StoreError};
use tessera_core::reservation::{
    BuyerContact, FailureReason, IntentStatus, IntentTransition, NewIntent, PaymentRejection,
    ReservationIntent,
};

/// References the gateway assigned to a settled payment.
#[derive(Debug, Clone)]
pub struct GatewayRefs {
    pub order_ref: String,
    pub payment_ref: String,
}

/// Sole owner of `ReservationIntent.status`. Every transition goes through
/// `finalize`, which relies on the repository's guarded write.
pub struct IntentTracker {
    intents: Arc<dyn IntentRepository>,
}

impl IntentTracker {
    pub fn new(intents: Arc<dyn IntentRepository>) -> Self {
        Self { intents }
    }

    /// Records a pending charge. Takes the ledger `Hold` so an intent can only
    /// be created after capacity was secured.
    pub async fn create_intent(
        &self,
        hold: &Hold,
        buyer: BuyerContact,
        attendees: Vec<String>,
        amount: i64,
        currency: &str,
        gateway_order_ref: &str,
    ) -> Result<ReservationIntent, IntentError> {
        let intent = ReservationIntent::new(NewIntent {
            offering_id: hold.offering_id,
            buyer,
            attendees,
            quantity: hold.quantity,
            amount,
            currency: currency.to_string(),
            gateway_order_ref: gateway_order_ref.to_string(),
            expires_at: hold.expires_at,
        });
        self.intents.insert_intent(&intent).await?;

        tracing::info!(
            intent_id = %intent.id,
            offering_id = %intent.offering_id,
            gateway_order_ref,
            amount,
            buyer_email = ?intent.buyer.email,
            "Reservation intent created"
        );
        Ok(intent)
    }

    pub async fn get(&self, intent_id: Uuid) -> Result<ReservationIntent, IntentError> {
        self.intents
            .get_intent(intent_id)
            .await?
            .ok_or_else(|| IntentError::NotFound(intent_id.to_string()))
    }

    pub async fn find_by_order_ref(
        &self,
        gateway_order_ref: &str,
    ) -> Result<Option<ReservationIntent>, IntentError> {
        Ok(self.intents.find_by_order_ref(gateway_order_ref).await?)
    }

    /// pending -> paid
    pub async fn mark_paid(
        &self,
        intent_id: Uuid,
        refs: &GatewayRefs,
    ) -> Result<ReservationIntent, IntentError> {
        let transition = IntentTransition::Paid {
            gateway_payment_ref: refs.payment_ref.clone(),
        };
        let intent = self.finalize(intent_id, transition).await?;
        tracing::info!(%intent_id, order_ref = %refs.order_ref, payment_ref = %refs.payment_ref, "Intent marked paid");
        Ok(intent)
    }

    /// pending -> failed
    pub async fn mark_failed(
        &self,
        intent_id: Uuid,
        reason: FailureReason,
    ) -> Result<ReservationIntent, IntentError> {
        let intent = self.finalize(intent_id, IntentTransition::Failed { reason }).await?;
        tracing::info!(%intent_id, reason = reason.as_str(), "Intent marked failed");
        Ok(intent)
    }

    /// paid -> refunded
    pub async fn mark_refunded(&self, intent_id: Uuid) -> Result<ReservationIntent, IntentError> {
        let intent = self.finalize(intent_id, IntentTransition::Refunded).await?;
        tracing::info!(%intent_id, "Intent marked refunded");
        Ok(intent)
    }

    pub async fn expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ReservationIntent>, IntentError> {
        Ok(self.intents.list_expired_pending(now, limit).await?)
    }

    pub async fn record_rejection(&self, rejection: &PaymentRejection) -> Result<(), IntentError> {
        tracing::warn!(
            intent_id = ?rejection.intent_id,
            order_ref = %rejection.gateway_order_ref,
            payment_ref = ?rejection.gateway_payment_ref,
            reason = %rejection.reason,
            "Payment confirmation rejected"
        );
        Ok(self.intents.record_rejection(rejection).await?)
    }

    async fn finalize(
        &self,
        intent_id: Uuid,
        transition: IntentTransition,
    ) -> Result<ReservationIntent, IntentError> {
        match self.intents.transition(intent_id, &transition).await {
            Ok(Some(intent)) => Ok(intent),
            Ok(None) => {
                // Guard failed: report what the row holds instead.
                let current = self.get(intent_id).await?;
                if current.status.is_terminal() && transition.required_source() == IntentStatus::Pending {
                    tracing::info!(%intent_id, status = current.status.as_str(), "Intent already finalized");
                    Err(IntentError::AlreadyFinalized(Box::new(current)))
                } else {
                    Err(IntentError::InvalidTransition {
                        from: current.status,
                        to: transition.target(),
                    })
                }
            }
            Err(StoreError::Conflict(detail)) => Err(IntentError::PaymentReferenceInUse(detail)),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("Intent not found: {0}")]
    NotFound(String),

    #[error("Intent already finalized as {}", .0.status.as_str())]
    AlreadyFinalized(Box<ReservationIntent>),

    #[error("Invalid intent transition from {} to {}", .from.as_str(), .to.as_str())]
    InvalidTransition {
        from: IntentStatus,
        to: IntentStatus,
    },

    #[error("Payment reference already settled another intent: {0}")]
    PaymentReferenceInUse(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

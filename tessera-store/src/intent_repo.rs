use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use tessera_core::repository::{IntentRepository, StoreError, StoreResult};
use tessera_core::reservation::{
    BuyerContact, FailureReason, IntentStatus, IntentTransition, PaymentRejection, ReservationIntent,
};
use tessera_shared::pii::Masked;

use crate::database::store_error;

pub struct PgIntentRepository {
    pool: PgPool,
}

impl PgIntentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const INTENT_COLUMNS: &str = "id, offering_id, buyer_name, buyer_email, buyer_phone, attendees, quantity, amount, currency, gateway_order_ref, gateway_payment_ref, status, failure_reason, expires_at, paid_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct IntentRow {
    id: Uuid,
    offering_id: Uuid,
    buyer_name: String,
    buyer_email: Option<String>,
    buyer_phone: Option<String>,
    attendees: Vec<String>,
    quantity: i32,
    amount: i64,
    currency: String,
    gateway_order_ref: String,
    gateway_payment_ref: Option<String>,
    status: String,
    failure_reason: Option<String>,
    expires_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<IntentRow> for ReservationIntent {
    type Error = StoreError;

    fn try_from(row: IntentRow) -> Result<Self, Self::Error> {
        let status = IntentStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("intent status '{}'", row.status)))?;
        let failure_reason = match row.failure_reason {
            Some(reason) => Some(
                FailureReason::parse(&reason)
                    .ok_or_else(|| StoreError::Corrupt(format!("failure reason '{}'", reason)))?,
            ),
            None => None,
        };

        Ok(ReservationIntent {
            id: row.id,
            offering_id: row.offering_id,
            buyer: BuyerContact {
                name: row.buyer_name,
                email: row.buyer_email.map(Masked),
                phone: row.buyer_phone.map(Masked),
            },
            attendees: row.attendees,
            quantity: row.quantity,
            amount: row.amount,
            currency: row.currency,
            gateway_order_ref: row.gateway_order_ref,
            gateway_payment_ref: row.gateway_payment_ref,
            status,
            failure_reason,
            expires_at: row.expires_at,
            paid_at: row.paid_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl IntentRepository for PgIntentRepository {
    async fn insert_intent(&self, intent: &ReservationIntent) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reservation_intents (id, offering_id, buyer_name, buyer_email, buyer_phone, attendees, quantity, amount, currency, gateway_order_ref, status, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(intent.id)
        .bind(intent.offering_id)
        .bind(&intent.buyer.name)
        .bind(intent.buyer.email.as_ref().map(|e| e.expose().clone()))
        .bind(intent.buyer.phone.as_ref().map(|p| p.expose().clone()))
        .bind(&intent.attendees)
        .bind(intent.quantity)
        .bind(intent.amount)
        .bind(&intent.currency)
        .bind(&intent.gateway_order_ref)
        .bind(intent.status.as_str())
        .bind(intent.expires_at)
        .bind(intent.created_at)
        .bind(intent.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn get_intent(&self, id: Uuid) -> StoreResult<Option<ReservationIntent>> {
        let row = sqlx::query_as::<_, IntentRow>(&format!(
            "SELECT {} FROM reservation_intents WHERE id = $1",
            INTENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(ReservationIntent::try_from).transpose()
    }

    async fn find_by_order_ref(
        &self,
        gateway_order_ref: &str,
    ) -> StoreResult<Option<ReservationIntent>> {
        let row = sqlx::query_as::<_, IntentRow>(&format!(
            "SELECT {} FROM reservation_intents WHERE gateway_order_ref = $1",
            INTENT_COLUMNS
        ))
        .bind(gateway_order_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(ReservationIntent::try_from).transpose()
    }

    async fn transition(
        &self,
        id: Uuid,
        transition: &IntentTransition,
    ) -> StoreResult<Option<ReservationIntent>> {
        let from = transition.required_source().as_str();
        let to = transition.target().as_str();

        // One statement per transition; the status guard in WHERE makes it a compare-and-set.
        let query = match transition {
            IntentTransition::Paid { gateway_payment_ref } => sqlx::query_as::<_, IntentRow>(&format!(
                "UPDATE reservation_intents SET status = $2, gateway_payment_ref = $4, paid_at = NOW(), updated_at = NOW() \
                 WHERE id = $1 AND status = $3 RETURNING {}",
                INTENT_COLUMNS
            ))
            .bind(id)
            .bind(to)
            .bind(from)
            .bind(gateway_payment_ref.as_str())
            .fetch_optional(&self.pool)
            .await,
            IntentTransition::Failed { reason } => sqlx::query_as::<_, IntentRow>(&format!(
                "UPDATE reservation_intents SET status = $2, failure_reason = $4, updated_at = NOW() \
                 WHERE id = $1 AND status = $3 RETURNING {}",
                INTENT_COLUMNS
            ))
            .bind(id)
            .bind(to)
            .bind(from)
            .bind(reason.as_str())
            .fetch_optional(&self.pool)
            .await,
            IntentTransition::Refunded => sqlx::query_as::<_, IntentRow>(&format!(
                "UPDATE reservation_intents SET status = $2, updated_at = NOW() \
                 WHERE id = $1 AND status = $3 RETURNING {}",
                INTENT_COLUMNS
            ))
            .bind(id)
            .bind(to)
            .bind(from)
            .fetch_optional(&self.pool)
            .await,
        };

        query
            .map_err(store_error)?
            .map(ReservationIntent::try_from)
            .transpose()
    }

    async fn list_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<ReservationIntent>> {
        let rows = sqlx::query_as::<_, IntentRow>(&format!(
            "SELECT {} FROM reservation_intents WHERE status = 'pending' AND expires_at <= $1 ORDER BY expires_at LIMIT $2",
            INTENT_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter().map(ReservationIntent::try_from).collect()
    }

    async fn record_rejection(&self, rejection: &PaymentRejection) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_rejections (id, intent_id, gateway_order_ref, gateway_payment_ref, reason, detail, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(rejection.id)
        .bind(rejection.intent_id)
        .bind(&rejection.gateway_order_ref)
        .bind(rejection.gateway_payment_ref.as_deref())
        .bind(&rejection.reason)
        .bind(rejection.detail.as_deref())
        .bind(rejection.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }
}

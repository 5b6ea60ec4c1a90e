use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use tessera_core::offering::{Offering, OfferingKind};
use tessera_core::repository::{OfferingRepository, StoreError, StoreResult};

use crate::database::store_error;

pub struct PgOfferingRepository {
    pool: PgPool,
}

impl PgOfferingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const OFFERING_COLUMNS: &str = "id, kind, code, title, total_capacity, remaining, unit_price, currency, starts_on, active, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OfferingRow {
    id: Uuid,
    kind: String,
    code: String,
    title: String,
    total_capacity: i32,
    remaining: i32,
    unit_price: i64,
    currency: String,
    starts_on: Option<NaiveDate>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OfferingRow> for Offering {
    type Error = StoreError;

    fn try_from(row: OfferingRow) -> Result<Self, Self::Error> {
        let kind = OfferingKind::parse(&row.kind)
            .ok_or_else(|| StoreError::Corrupt(format!("offering kind '{}'", row.kind)))?;
        Ok(Offering {
            id: row.id,
            kind,
            code: row.code,
            title: row.title,
            total_capacity: row.total_capacity,
            remaining: row.remaining,
            unit_price: row.unit_price,
            currency: row.currency,
            starts_on: row.starts_on,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl OfferingRepository for PgOfferingRepository {
    async fn create_offering(&self, offering: &Offering) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO offerings (id, kind, code, title, total_capacity, remaining, unit_price, currency, starts_on, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(offering.id)
        .bind(offering.kind.as_str())
        .bind(&offering.code)
        .bind(&offering.title)
        .bind(offering.total_capacity)
        .bind(offering.remaining)
        .bind(offering.unit_price)
        .bind(&offering.currency)
        .bind(offering.starts_on)
        .bind(offering.active)
        .bind(offering.created_at)
        .bind(offering.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn get_offering(&self, id: Uuid) -> StoreResult<Option<Offering>> {
        let row = sqlx::query_as::<_, OfferingRow>(&format!(
            "SELECT {} FROM offerings WHERE id = $1",
            OFFERING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(Offering::try_from).transpose()
    }

    async fn set_active(&self, id: Uuid, active: bool) -> StoreResult<Option<Offering>> {
        let row = sqlx::query_as::<_, OfferingRow>(&format!(
            "UPDATE offerings SET active = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            OFFERING_COLUMNS
        ))
        .bind(id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(Offering::try_from).transpose()
    }

    async fn decrement_remaining(&self, id: Uuid, count: i32) -> StoreResult<Option<i32>> {
        sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE offerings
               SET remaining = remaining - $2, updated_at = NOW()
             WHERE id = $1 AND active AND remaining >= $2
         RETURNING remaining
            "#,
        )
        .bind(id)
        .bind(count)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)
    }

    async fn increment_remaining(&self, id: Uuid, count: i32) -> StoreResult<Option<i32>> {
        sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE offerings
               SET remaining = LEAST(total_capacity, remaining + $2), updated_at = NOW()
             WHERE id = $1
         RETURNING remaining
            "#,
        )
        .bind(id)
        .bind(count)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)
    }
}

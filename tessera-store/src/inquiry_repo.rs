use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use tessera_core::inquiry::{InquiryRecord, IntakeOutcome, REPEAT_TAG};
use tessera_core::repository::{InquiryRepository, StoreResult};

use crate::database::store_error;

pub struct PgInquiryRepository {
    pool: PgPool,
}

impl PgInquiryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct InquiryRow {
    id: Uuid,
    normalized_phone: String,
    phone: String,
    name: Option<String>,
    email: Option<String>,
    source: Option<String>,
    notes: Vec<String>,
    tags: Vec<String>,
    assigned_to: Option<String>,
    stage: String,
    inquiry_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    inserted: bool,
}

impl From<InquiryRow> for InquiryRecord {
    fn from(row: InquiryRow) -> Self {
        InquiryRecord {
            id: row.id,
            normalized_phone: row.normalized_phone,
            phone: row.phone,
            name: row.name,
            email: row.email,
            source: row.source,
            notes: row.notes,
            tags: row.tags,
            assigned_to: row.assigned_to,
            stage: row.stage,
            inquiry_count: row.inquiry_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl InquiryRepository for PgInquiryRepository {
    async fn upsert_inquiry(&self, candidate: &InquiryRecord) -> StoreResult<IntakeOutcome> {
        // Merge only fills blanks and appends; assigned_to and stage are never touched.
        // xmax = 0 only for rows created by this statement.
        let row = sqlx::query_as::<_, InquiryRow>(
            r#"
            INSERT INTO inquiries (id, normalized_phone, phone, name, email, source, notes, tags, stage, inquiry_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 1, $10, $10)
            ON CONFLICT (normalized_phone) DO UPDATE SET
                name = COALESCE(inquiries.name, EXCLUDED.name),
                email = COALESCE(inquiries.email, EXCLUDED.email),
                source = COALESCE(inquiries.source, EXCLUDED.source),
                notes = inquiries.notes || EXCLUDED.notes,
                tags = ARRAY(
                    SELECT t
                      FROM unnest(inquiries.tags || EXCLUDED.tags || ARRAY[$11::TEXT]) WITH ORDINALITY AS x(t, n)
                  GROUP BY t
                  ORDER BY MIN(n)
                ),
                inquiry_count = inquiries.inquiry_count + 1,
                updated_at = NOW()
            RETURNING id, normalized_phone, phone, name, email, source, notes, tags, assigned_to, stage,
                      inquiry_count, created_at, updated_at, (xmax = 0) AS inserted
            "#,
        )
        .bind(candidate.id)
        .bind(&candidate.normalized_phone)
        .bind(&candidate.phone)
        .bind(candidate.name.as_deref())
        .bind(candidate.email.as_deref())
        .bind(candidate.source.as_deref())
        .bind(&candidate.notes)
        .bind(&candidate.tags)
        .bind(&candidate.stage)
        .bind(candidate.created_at)
        .bind(REPEAT_TAG)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        let inserted = row.inserted;
        let record = InquiryRecord::from(row);
        Ok(if inserted {
            IntakeOutcome::Created(record)
        } else {
            IntakeOutcome::Merged(record)
        })
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use tessera_core::repository::{StoreError, StoreResult, TicketRepository};
use tessera_core::ticket::{Ticket, TicketStatus};

use crate::database::store_error;

pub struct PgTicketRepository {
    pool: PgPool,
}

impl PgTicketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const TICKET_COLUMNS: &str = "id, code, offering_id, intent_id, attendee_key, attendee_name, status, issued_at, checked_in_at, checked_in_by";

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    code: String,
    offering_id: Uuid,
    intent_id: Option<Uuid>,
    attendee_key: String,
    attendee_name: String,
    status: String,
    issued_at: DateTime<Utc>,
    checked_in_at: Option<DateTime<Utc>>,
    checked_in_by: Option<String>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = StoreError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        let status = TicketStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("ticket status '{}'", row.status)))?;
        Ok(Ticket {
            id: row.id,
            code: row.code,
            offering_id: row.offering_id,
            intent_id: row.intent_id,
            attendee_key: row.attendee_key,
            attendee_name: row.attendee_name,
            status,
            issued_at: row.issued_at,
            checked_in_at: row.checked_in_at,
            checked_in_by: row.checked_in_by,
        })
    }
}

#[async_trait]
impl TicketRepository for PgTicketRepository {
    async fn insert_if_absent(&self, ticket: &Ticket) -> StoreResult<(Ticket, bool)> {
        let inserted = sqlx::query_as::<_, TicketRow>(&format!(
            r#"
            INSERT INTO tickets (id, code, offering_id, intent_id, attendee_key, attendee_name, status, issued_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (offering_id, attendee_key) DO NOTHING
            RETURNING {}
            "#,
            TICKET_COLUMNS
        ))
        .bind(ticket.id)
        .bind(&ticket.code)
        .bind(ticket.offering_id)
        .bind(ticket.intent_id)
        .bind(&ticket.attendee_key)
        .bind(&ticket.attendee_name)
        .bind(ticket.status.as_str())
        .bind(ticket.issued_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        if let Some(row) = inserted {
            return Ok((Ticket::try_from(row)?, true));
        }

        let existing = self
            .find_by_attendee(ticket.offering_id, &ticket.attendee_key)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("ticket for {}", ticket.attendee_key)))?;

        Ok((existing, false))
    }

    async fn find_by_attendee(
        &self,
        offering_id: Uuid,
        attendee_key: &str,
    ) -> StoreResult<Option<Ticket>> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE offering_id = $1 AND attendee_key = $2",
            TICKET_COLUMNS
        ))
        .bind(offering_id)
        .bind(attendee_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(Ticket::try_from).transpose()
    }

    async fn get_by_code(&self, code: &str) -> StoreResult<Option<Ticket>> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE code = $1",
            TICKET_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(Ticket::try_from).transpose()
    }

    async fn list_by_intent(&self, intent_id: Uuid) -> StoreResult<Vec<Ticket>> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE intent_id = $1 ORDER BY attendee_key",
            TICKET_COLUMNS
        ))
        .bind(intent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter().map(Ticket::try_from).collect()
    }

    async fn mark_checked_in(
        &self,
        code: &str,
        offering_id: Uuid,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Ticket>> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            r#"
            UPDATE tickets
               SET status = 'checked_in', checked_in_at = $3, checked_in_by = $4
             WHERE code = $1 AND offering_id = $2 AND status = 'issued'
         RETURNING {}
            "#,
            TICKET_COLUMNS
        ))
        .bind(code)
        .bind(offering_id)
        .bind(at)
        .bind(actor)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(Ticket::try_from).transpose()
    }
}

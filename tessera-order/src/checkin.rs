use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use tessera_core::repository::{StoreError, TicketRepository};
use tessera_core::ticket::{CheckInOutcome, TicketStatus};

/// issued -> checked_in, once. The transition is a single guarded write, so two
/// scanners racing on one ticket see exactly one `Success`.
pub struct CheckInService {
    tickets: Arc<dyn TicketRepository>,
}

impl CheckInService {
    pub fn new(tickets: Arc<dyn TicketRepository>) -> Self {
        Self { tickets }
    }

    pub async fn check_in(
        &self,
        code: &str,
        event_id: Uuid,
        actor: Option<&str>,
    ) -> Result<CheckInOutcome, CheckInError> {
        if let Some(ticket) = self
            .tickets
            .mark_checked_in(code, event_id, actor, Utc::now())
            .await?
        {
            tracing::info!(code, %event_id, actor = ?actor, "Ticket checked in");
            return Ok(CheckInOutcome::Success(ticket));
        }

        // Guard failed. Find out which part.
        let ticket = self
            .tickets
            .get_by_code(code)
            .await?
            .ok_or_else(|| CheckInError::NotFound(code.to_string()))?;

        if ticket.offering_id != event_id {
            tracing::warn!(code, %event_id, ticket_event = %ticket.offering_id, "Ticket scanned at the wrong event");
            return Err(CheckInError::EventMismatch {
                code: code.to_string(),
                expected: event_id,
                actual: ticket.offering_id,
            });
        }

        match ticket.status {
            TicketStatus::CheckedIn => {
                tracing::info!(code, checked_in_at = ?ticket.checked_in_at, "Ticket already checked in");
                Ok(CheckInOutcome::AlreadyCheckedIn(ticket))
            }
            // Only reachable if the row changed between the two reads.
            TicketStatus::Issued => Err(CheckInError::Store(StoreError::Backend(format!(
                "ticket {} changed during check-in",
                code
            )))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CheckInError {
    #[error("Ticket not found: {0}")]
    NotFound(String),

    #[error("Ticket {code} belongs to {actual}, not {expected}")]
    EventMismatch {
        code: String,
        expected: Uuid,
        actual: Uuid,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

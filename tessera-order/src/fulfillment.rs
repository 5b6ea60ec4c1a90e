use chrono::{NaiveDate, Utc};
use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

use tessera_core::offering::Offering;
use tessera_core::repository::{StoreError, TicketRepository};
use tessera_core::reservation::ReservationIntent;
use tessera_core::ticket::{AttendeeIdentity, QrPayload, Ticket};

// Uppercase letters and digits minus the ones that get misread off a screen.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_SUFFIX_LEN: usize = 6;
const MAX_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct IssuedTicket {
    pub ticket: Ticket,
    /// False when the attendee already held a ticket and it was returned as is.
    pub newly_issued: bool,
}

/// `{OFFERING_CODE}-{yymmdd}`, dated by the offering's start day when it has one.
pub fn code_prefix(offering: &Offering, today: NaiveDate) -> String {
    let day = offering.starts_on.unwrap_or(today);
    format!("{}-{}", offering.code, day.format("%y%m%d"))
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_SUFFIX_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

pub struct TicketIssuer {
    tickets: Arc<dyn TicketRepository>,
}

impl TicketIssuer {
    pub fn new(tickets: Arc<dyn TicketRepository>) -> Self {
        Self { tickets }
    }

    /// Issues exactly one ticket per (offering, attendee). Calling again for the
    /// same attendee returns the existing ticket.
    pub async fn issue(
        &self,
        offering: &Offering,
        attendee: &AttendeeIdentity,
        intent_id: Option<Uuid>,
    ) -> Result<IssuedTicket, IssueError> {
        let prefix = code_prefix(offering, Utc::now().date_naive());

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = format!("{}-{}", prefix, random_suffix());
            let candidate = Ticket::new(code, offering.id, intent_id, attendee);

            match self.tickets.insert_if_absent(&candidate).await {
                Ok((ticket, newly_issued)) => {
                    if newly_issued {
                        tracing::info!(
                            ticket_id = %ticket.id,
                            code = %ticket.code,
                            offering_id = %offering.id,
                            "Ticket issued"
                        );
                    } else {
                        tracing::debug!(code = %ticket.code, attendee_key = %attendee.key, "Ticket already issued");
                    }
                    return Ok(IssuedTicket { ticket, newly_issued });
                }
                Err(StoreError::Conflict(detail)) => {
                    tracing::warn!(attempt, %detail, "Ticket code collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(IssueError::CodeSpaceExhausted(prefix))
    }

    /// One ticket per seat of a paid intent.
    pub async fn issue_for_intent(
        &self,
        offering: &Offering,
        intent: &ReservationIntent,
    ) -> Result<Vec<IssuedTicket>, IssueError> {
        let mut issued = Vec::with_capacity(intent.quantity.max(0) as usize);
        for attendee in intent.attendee_identities() {
            issued.push(self.issue(offering, &attendee, Some(intent.id)).await?);
        }
        Ok(issued)
    }

    pub async fn get(&self, code: &str) -> Result<Ticket, IssueError> {
        self.tickets
            .get_by_code(code)
            .await?
            .ok_or_else(|| IssueError::NotFound(code.to_string()))
    }

    /// The ticket `attendee` already holds for `offering_id`, if any.
    pub async fn existing(
        &self,
        offering_id: Uuid,
        attendee: &AttendeeIdentity,
    ) -> Result<Option<IssuedTicket>, IssueError> {
        let ticket = self.tickets.find_by_attendee(offering_id, &attendee.key).await?;
        Ok(ticket.map(|ticket| IssuedTicket { ticket, newly_issued: false }))
    }

    pub async fn tickets_for_intent(&self, intent_id: Uuid) -> Result<Vec<Ticket>, IssueError> {
        Ok(self.tickets.list_by_intent(intent_id).await?)
    }

    pub fn qr_payload(&self, ticket: &Ticket) -> QrPayload {
        ticket.qr_payload()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error("Ticket not found: {0}")]
    NotFound(String),

    #[error("Could not find a free ticket code under {0}")]
    CodeSpaceExhausted(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

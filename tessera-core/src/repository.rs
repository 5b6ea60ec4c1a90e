use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::inquiry::{InquiryRecord, IntakeOutcome};
use crate::offering::Offering;
use crate::reservation::{IntentTransition, PaymentRejection, ReservationIntent};
use crate::ticket::Ticket;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Unique constraint violated: {0}")]
    Conflict(String),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
    #[error("Datastore error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Offering rows and their remaining-capacity counter.
#[async_trait]
pub trait OfferingRepository: Send + Sync {
    async fn create_offering(&self, offering: &Offering) -> StoreResult<()>;

    async fn get_offering(&self, id: Uuid) -> StoreResult<Option<Offering>>;

    async fn set_active(&self, id: Uuid, active: bool) -> StoreResult<Option<Offering>>;

    /// Single conditional decrement: succeeds only if the offering is active and
    /// `remaining >= count`. Returns the new `remaining`, or `None` when the
    /// guard did not hold.
    async fn decrement_remaining(&self, id: Uuid, count: i32) -> StoreResult<Option<i32>>;

    /// Single conditional increment capped at `total_capacity`. Returns the new
    /// `remaining`, or `None` for an unknown offering.
    async fn increment_remaining(&self, id: Uuid, count: i32) -> StoreResult<Option<i32>>;
}

#[async_trait]
pub trait IntentRepository: Send + Sync {
    async fn insert_intent(&self, intent: &ReservationIntent) -> StoreResult<()>;

    async fn get_intent(&self, id: Uuid) -> StoreResult<Option<ReservationIntent>>;

    async fn find_by_order_ref(
        &self,
        gateway_order_ref: &str,
    ) -> StoreResult<Option<ReservationIntent>>;

    /// Applies `transition` as one conditional write guarded on
    /// `transition.required_source()`. `None` means the guard failed and
    /// nothing changed. A payment reference already bound to another intent
    /// yields `StoreError::Conflict`.
    async fn transition(
        &self,
        id: Uuid,
        transition: &IntentTransition,
    ) -> StoreResult<Option<ReservationIntent>>;

    async fn list_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<ReservationIntent>>;

    async fn record_rejection(&self, rejection: &PaymentRejection) -> StoreResult<()>;
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Inserts unless a ticket already exists for `(offering_id, attendee_key)`.
    /// Returns the stored ticket and whether it was created by this call.
    /// A clash on `code` yields `StoreError::Conflict`.
    async fn insert_if_absent(&self, ticket: &Ticket) -> StoreResult<(Ticket, bool)>;

    async fn get_by_code(&self, code: &str) -> StoreResult<Option<Ticket>>;

    async fn find_by_attendee(
        &self,
        offering_id: Uuid,
        attendee_key: &str,
    ) -> StoreResult<Option<Ticket>>;

    async fn list_by_intent(&self, intent_id: Uuid) -> StoreResult<Vec<Ticket>>;

    /// Single conditional `issued -> checked_in` scoped to `offering_id`.
    /// `None` when the ticket was not in `issued` state for that offering.
    async fn mark_checked_in(
        &self,
        code: &str,
        offering_id: Uuid,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Ticket>>;
}

#[async_trait]
pub trait InquiryRepository: Send + Sync {
    /// Inserts `candidate`, or merges it into the record already holding the
    /// same normalized phone, in one atomic step.
    async fn upsert_inquiry(&self, candidate: &InquiryRecord) -> StoreResult<IntakeOutcome>;
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use tessera_core::inquiry::{InquiryRecord, IntakeOutcome};
use tessera_core::offering::Offering;
use tessera_core::repository::{
    InquiryRepository, IntentRepository, OfferingRepository, StoreError, StoreResult,
    TicketRepository,
};
use tessera_core::reservation::{
    IntentStatus, IntentTransition, PaymentRejection, ReservationIntent,
};
use tessera_core::ticket::Ticket;

/// Process-local datastore with the same guarded-update semantics as the
/// Postgres repositories. Each guarded mutation runs under its table's lock,
/// so check and write happen as one step. Used by tests and `store.backend = "memory"`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Tables>,
}

#[derive(Default)]
struct Tables {
    offerings: Mutex<HashMap<Uuid, Offering>>,
    intents: Mutex<HashMap<Uuid, ReservationIntent>>,
    rejections: Mutex<Vec<PaymentRejection>>,
    // keyed by ticket code
    tickets: Mutex<HashMap<String, Ticket>>,
    // keyed by normalized phone
    inquiries: Mutex<HashMap<String, InquiryRecord>>,
}

fn lock<T>(table: &Mutex<T>) -> StoreResult<MutexGuard<'_, T>> {
    table
        .lock()
        .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejections(&self) -> Vec<PaymentRejection> {
        self.inner
            .rejections
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn ticket_count(&self) -> usize {
        self.inner.tickets.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn inquiry_count(&self) -> usize {
        self.inner.inquiries.lock().map(|t| t.len()).unwrap_or(0)
    }
}

#[async_trait]
impl OfferingRepository for MemoryStore {
    async fn create_offering(&self, offering: &Offering) -> StoreResult<()> {
        let mut offerings = lock(&self.inner.offerings)?;
        if offerings.contains_key(&offering.id) {
            return Err(StoreError::Conflict(format!("offering {}", offering.id)));
        }
        offerings.insert(offering.id, offering.clone());
        Ok(())
    }

    async fn get_offering(&self, id: Uuid) -> StoreResult<Option<Offering>> {
        Ok(lock(&self.inner.offerings)?.get(&id).cloned())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> StoreResult<Option<Offering>> {
        let mut offerings = lock(&self.inner.offerings)?;
        Ok(offerings.get_mut(&id).map(|o| {
            o.active = active;
            o.updated_at = Utc::now();
            o.clone()
        }))
    }

    async fn decrement_remaining(&self, id: Uuid, count: i32) -> StoreResult<Option<i32>> {
        let mut offerings = lock(&self.inner.offerings)?;
        match offerings.get_mut(&id) {
            Some(o) if o.active && o.remaining >= count => {
                o.remaining -= count;
                o.updated_at = Utc::now();
                Ok(Some(o.remaining))
            }
            _ => Ok(None),
        }
    }

    async fn increment_remaining(&self, id: Uuid, count: i32) -> StoreResult<Option<i32>> {
        let mut offerings = lock(&self.inner.offerings)?;
        Ok(offerings.get_mut(&id).map(|o| {
            o.remaining = (o.remaining + count).min(o.total_capacity);
            o.updated_at = Utc::now();
            o.remaining
        }))
    }
}

#[async_trait]
impl IntentRepository for MemoryStore {
    async fn insert_intent(&self, intent: &ReservationIntent) -> StoreResult<()> {
        let mut intents = lock(&self.inner.intents)?;
        if intents
            .values()
            .any(|i| i.gateway_order_ref == intent.gateway_order_ref)
        {
            return Err(StoreError::Conflict(format!(
                "gateway order {}",
                intent.gateway_order_ref
            )));
        }
        intents.insert(intent.id, intent.clone());
        Ok(())
    }

    async fn get_intent(&self, id: Uuid) -> StoreResult<Option<ReservationIntent>> {
        Ok(lock(&self.inner.intents)?.get(&id).cloned())
    }

    async fn find_by_order_ref(
        &self,
        gateway_order_ref: &str,
    ) -> StoreResult<Option<ReservationIntent>> {
        Ok(lock(&self.inner.intents)?
            .values()
            .find(|i| i.gateway_order_ref == gateway_order_ref)
            .cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        transition: &IntentTransition,
    ) -> StoreResult<Option<ReservationIntent>> {
        let mut intents = lock(&self.inner.intents)?;

        if let IntentTransition::Paid { gateway_payment_ref } = transition {
            let taken = intents.values().any(|i| {
                i.id != id && i.gateway_payment_ref.as_deref() == Some(gateway_payment_ref.as_str())
            });
            if taken {
                return Err(StoreError::Conflict(format!(
                    "gateway payment {}",
                    gateway_payment_ref
                )));
            }
        }

        let Some(intent) = intents.get_mut(&id) else {
            return Ok(None);
        };
        if transition.apply(intent, Utc::now()) {
            Ok(Some(intent.clone()))
        } else {
            Ok(None)
        }
    }

    async fn list_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<ReservationIntent>> {
        let intents = lock(&self.inner.intents)?;
        let mut expired: Vec<ReservationIntent> = intents
            .values()
            .filter(|i| i.status == IntentStatus::Pending && i.expires_at <= now)
            .cloned()
            .collect();
        expired.sort_by_key(|i| i.expires_at);
        expired.truncate(limit.max(0) as usize);
        Ok(expired)
    }

    async fn record_rejection(&self, rejection: &PaymentRejection) -> StoreResult<()> {
        lock(&self.inner.rejections)?.push(rejection.clone());
        Ok(())
    }
}

#[async_trait]
impl TicketRepository for MemoryStore {
    async fn insert_if_absent(&self, ticket: &Ticket) -> StoreResult<(Ticket, bool)> {
        let mut tickets = lock(&self.inner.tickets)?;
        if let Some(existing) = tickets
            .values()
            .find(|t| t.offering_id == ticket.offering_id && t.attendee_key == ticket.attendee_key)
        {
            return Ok((existing.clone(), false));
        }
        if tickets.contains_key(&ticket.code) {
            return Err(StoreError::Conflict(format!("ticket code {}", ticket.code)));
        }
        tickets.insert(ticket.code.clone(), ticket.clone());
        Ok((ticket.clone(), true))
    }

    async fn get_by_code(&self, code: &str) -> StoreResult<Option<Ticket>> {
        Ok(lock(&self.inner.tickets)?.get(code).cloned())
    }

    async fn find_by_attendee(
        &self,
        offering_id: Uuid,
        attendee_key: &str,
    ) -> StoreResult<Option<Ticket>> {
        Ok(lock(&self.inner.tickets)?
            .values()
            .find(|t| t.offering_id == offering_id && t.attendee_key == attendee_key)
            .cloned())
    }

    async fn list_by_intent(&self, intent_id: Uuid) -> StoreResult<Vec<Ticket>> {
        let tickets = lock(&self.inner.tickets)?;
        let mut found: Vec<Ticket> = tickets
            .values()
            .filter(|t| t.intent_id == Some(intent_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.attendee_key.cmp(&b.attendee_key));
        Ok(found)
    }

    async fn mark_checked_in(
        &self,
        code: &str,
        offering_id: Uuid,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Ticket>> {
        let mut tickets = lock(&self.inner.tickets)?;
        match tickets.get_mut(code) {
            Some(t) if t.offering_id == offering_id => {
                if t.check_in(actor, at) {
                    Ok(Some(t.clone()))
                } else {
                    Ok(None)
                }
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl InquiryRepository for MemoryStore {
    async fn upsert_inquiry(&self, candidate: &InquiryRecord) -> StoreResult<IntakeOutcome> {
        let mut inquiries = lock(&self.inner.inquiries)?;
        match inquiries.get_mut(&candidate.normalized_phone) {
            Some(existing) => {
                existing.absorb(candidate);
                Ok(IntakeOutcome::Merged(existing.clone()))
            }
            None => {
                inquiries.insert(candidate.normalized_phone.clone(), candidate.clone());
                Ok(IntakeOutcome::Created(candidate.clone()))
            }
        }
    }
}

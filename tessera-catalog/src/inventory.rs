use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use tessera_core::offering::{NewOffering, Offering};
use tessera_core::repository::{OfferingRepository, StoreError};
use tessera_core::reservation::ReservationIntent;

/// Capacity taken for one payment round trip. Not persisted: the counter was
/// already decremented, and the token only says how much to give back.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a hold must be committed or released"]
pub struct Hold {
    pub offering_id: Uuid,
    pub quantity: i32,
    pub expires_at: DateTime<Utc>,
}

impl Hold {
    /// Rebuilds the hold behind a pending intent, e.g. when its callback fails
    /// or the expiry sweep reclaims it.
    pub fn for_intent(intent: &ReservationIntent) -> Self {
        Self {
            offering_id: intent.offering_id,
            quantity: intent.quantity,
            expires_at: intent.expires_at,
        }
    }
}

/// Remaining-capacity counters per offering.
///
/// Every counter change is one conditional update in the repository, so
/// concurrent buyers racing for the last seat cannot drive `remaining` below
/// zero, and releases can never push it above `total_capacity`.
pub struct InventoryLedger {
    offerings: Arc<dyn OfferingRepository>,
    hold_ttl: Duration,
}

impl InventoryLedger {
    pub fn new(offerings: Arc<dyn OfferingRepository>, hold_ttl: Duration) -> Self {
        Self { offerings, hold_ttl }
    }

    pub async fn register(&self, fields: NewOffering) -> Result<Offering, LedgerError> {
        fields.validate().map_err(|e| LedgerError::Invalid(e.to_string()))?;
        let offering = Offering::new(fields);
        self.offerings.create_offering(&offering).await?;
        tracing::info!(offering_id = %offering.id, code = %offering.code, capacity = offering.total_capacity, "Offering registered");
        Ok(offering)
    }

    pub async fn get(&self, offering_id: Uuid) -> Result<Offering, LedgerError> {
        self.offerings
            .get_offering(offering_id)
            .await?
            .ok_or(LedgerError::NotFound(offering_id))
    }

    pub async fn set_active(
        &self,
        offering_id: Uuid,
        active: bool,
    ) -> Result<Offering, LedgerError> {
        self.offerings
            .set_active(offering_id, active)
            .await?
            .ok_or(LedgerError::NotFound(offering_id))
    }

    /// Takes `count` seats in a single conditional decrement.
    pub async fn try_reserve(&self, offering_id: Uuid, count: i32) -> Result<Hold, LedgerError> {
        if count <= 0 {
            return Err(LedgerError::InvalidQuantity(count));
        }

        match self.offerings.decrement_remaining(offering_id, count).await? {
            Some(remaining) => {
                tracing::debug!(%offering_id, count, remaining, "Capacity held");
                Ok(Hold {
                    offering_id,
                    quantity: count,
                    expires_at: Utc::now() + self.hold_ttl,
                })
            }
            None => {
                // Guard failed; read only to pick the right error.
                let offering = self.get(offering_id).await?;
                if !offering.active {
                    return Err(LedgerError::Inactive(offering_id));
                }
                tracing::info!(%offering_id, requested = count, available = offering.remaining, "Reservation refused: fully booked");
                Err(LedgerError::CapacityExceeded {
                    offering_id,
                    requested: count,
                    available: offering.remaining,
                })
            }
        }
    }

    /// Payment went through. The seats were taken at reservation time, so the
    /// counter is left as is.
    pub fn commit(&self, hold: Hold) {
        tracing::debug!(offering_id = %hold.offering_id, quantity = hold.quantity, "Hold committed");
    }

    /// Gives the held seats back, capped at total capacity. Returns the new `remaining`.
    pub async fn release(&self, hold: Hold) -> Result<i32, LedgerError> {
        let remaining = self
            .offerings
            .increment_remaining(hold.offering_id, hold.quantity)
            .await?
            .ok_or(LedgerError::NotFound(hold.offering_id))?;
        tracing::info!(offering_id = %hold.offering_id, quantity = hold.quantity, remaining, "Hold released");
        Ok(remaining)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Offering not found: {0}")]
    NotFound(Uuid),

    #[error("Offering is not open for booking: {0}")]
    Inactive(Uuid),

    #[error("Fully booked: requested {requested}, available {available}")]
    CapacityExceeded {
        offering_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Invalid seat count: {0}")]
    InvalidQuantity(i32),

    #[error("Invalid offering: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

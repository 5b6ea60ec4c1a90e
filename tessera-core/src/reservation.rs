use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use tessera_shared::pii::Masked;

use crate::ticket::AttendeeIdentity;

/// Lifecycle of a reservation intent.
///
/// `Pending` moves to `Paid` or `Failed` exactly once; `Refunded` is only
/// reachable from `Paid`. Every status write goes through `IntentTransition`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Paid => "paid",
            IntentStatus::Failed => "failed",
            IntentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(IntentStatus::Pending),
            "paid" => Some(IntentStatus::Paid),
            "failed" => Some(IntentStatus::Failed),
            "refunded" => Some(IntentStatus::Refunded),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, IntentStatus::Pending)
    }

    pub fn can_transition_to(&self, next: IntentStatus) -> bool {
        matches!(
            (self, next),
            (IntentStatus::Pending, IntentStatus::Paid)
                | (IntentStatus::Pending, IntentStatus::Failed)
                | (IntentStatus::Paid, IntentStatus::Refunded)
        )
    }
}

/// Why an intent ended up `failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    AmountMismatch,
    StatusNotCaptured,
    OrderMismatch,
    Expired,
    GatewayDeclined,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::AmountMismatch => "amount_mismatch",
            FailureReason::StatusNotCaptured => "status_not_captured",
            FailureReason::OrderMismatch => "order_mismatch",
            FailureReason::Expired => "expired",
            FailureReason::GatewayDeclined => "gateway_declined",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "amount_mismatch" => Some(FailureReason::AmountMismatch),
            "status_not_captured" => Some(FailureReason::StatusNotCaptured),
            "order_mismatch" => Some(FailureReason::OrderMismatch),
            "expired" => Some(FailureReason::Expired),
            "gateway_declined" => Some(FailureReason::GatewayDeclined),
            _ => None,
        }
    }
}

/// A guarded status change. The repository applies it as one conditional
/// write that only succeeds while the row is still in `required_source()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentTransition {
    Paid { gateway_payment_ref: String },
    Failed { reason: FailureReason },
    Refunded,
}

impl IntentTransition {
    pub fn required_source(&self) -> IntentStatus {
        match self {
            IntentTransition::Paid { .. } | IntentTransition::Failed { .. } => IntentStatus::Pending,
            IntentTransition::Refunded => IntentStatus::Paid,
        }
    }

    pub fn target(&self) -> IntentStatus {
        match self {
            IntentTransition::Paid { .. } => IntentStatus::Paid,
            IntentTransition::Failed { .. } => IntentStatus::Failed,
            IntentTransition::Refunded => IntentStatus::Refunded,
        }
    }

    /// Applies the transition to an in-memory copy. Returns false, leaving the
    /// intent untouched, when the current status does not allow it.
    pub fn apply(&self, intent: &mut ReservationIntent, at: DateTime<Utc>) -> bool {
        if intent.status != self.required_source() || !intent.status.can_transition_to(self.target()) {
            return false;
        }
        match self {
            IntentTransition::Paid { gateway_payment_ref } => {
                intent.gateway_payment_ref = Some(gateway_payment_ref.clone());
                intent.paid_at = Some(at);
            }
            IntentTransition::Failed { reason } => {
                intent.failure_reason = Some(*reason);
            }
            IntentTransition::Refunded => {}
        }
        intent.status = self.target();
        intent.updated_at = at;
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyerContact {
    pub name: String,
    pub email: Option<Masked<String>>,
    pub phone: Option<Masked<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationIntent {
    pub id: Uuid,
    pub offering_id: Uuid,
    pub buyer: BuyerContact,
    /// Display names, one per seat.
    pub attendees: Vec<String>,
    pub quantity: i32,
    pub amount: i64,
    pub currency: String,
    pub gateway_order_ref: String,
    pub gateway_payment_ref: Option<String>,
    pub status: IntentStatus,
    pub failure_reason: Option<FailureReason>,
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewIntent {
    pub offering_id: Uuid,
    pub buyer: BuyerContact,
    pub attendees: Vec<String>,
    pub quantity: i32,
    pub amount: i64,
    pub currency: String,
    pub gateway_order_ref: String,
    pub expires_at: DateTime<Utc>,
}

impl ReservationIntent {
    pub fn new(fields: NewIntent) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            offering_id: fields.offering_id,
            buyer: fields.buyer,
            attendees: fields.attendees,
            quantity: fields.quantity,
            amount: fields.amount,
            currency: fields.currency,
            gateway_order_ref: fields.gateway_order_ref,
            gateway_payment_ref: None,
            status: IntentStatus::Pending,
            failure_reason: None,
            expires_at: fields.expires_at,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == IntentStatus::Pending && self.expires_at <= now
    }

    /// One identity per seat. Keys are derived from the intent id and seat
    /// index so replays of the same confirmation map onto the same tickets.
    pub fn attendee_identities(&self) -> Vec<AttendeeIdentity> {
        (0..self.quantity.max(0) as usize)
            .map(|seat| {
                let name = self
                    .attendees
                    .get(seat)
                    .filter(|n| !n.trim().is_empty())
                    .cloned()
                    .unwrap_or_else(|| {
                        if seat == 0 {
                            self.buyer.name.clone()
                        } else {
                            format!("{} (guest {})", self.buyer.name, seat)
                        }
                    });
                AttendeeIdentity::for_seat(self.id, seat, name)
            })
            .collect()
    }
}

/// A confirmation that failed verification, kept for reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRejection {
    pub id: Uuid,
    pub intent_id: Option<Uuid>,
    pub gateway_order_ref: String,
    pub gateway_payment_ref: Option<String>,
    pub reason: String,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentRejection {
    pub fn new(
        intent_id: Option<Uuid>,
        gateway_order_ref: &str,
        gateway_payment_ref: Option<&str>,
        reason: &str,
        detail: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            intent_id,
            gateway_order_ref: gateway_order_ref.to_string(),
            gateway_payment_ref: gateway_payment_ref.map(str::to_string),
            reason: reason.to_string(),
            detail,
            created_at: Utc::now(),
        }
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Payment state as reported by the gateway itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GatewayPaymentStatus {
    Created,
    Authorized,
    Captured,
    Failed,
    Refunded,
}

impl GatewayPaymentStatus {
    /// Money is secured: authorized or captured.
    pub fn is_settled(&self) -> bool {
        matches!(self, GatewayPaymentStatus::Authorized | GatewayPaymentStatus::Captured)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayPaymentStatus::Created => "created",
            GatewayPaymentStatus::Authorized => "authorized",
            GatewayPaymentStatus::Captured => "captured",
            GatewayPaymentStatus::Failed => "failed",
            GatewayPaymentStatus::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub order_ref: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub payment_ref: String,
    pub order_ref: String,
    pub amount: i64,
    pub currency: String,
    pub status: GatewayPaymentStatus,
}

/// Inbound payment callback. Every field is attacker-controlled; the claimed
/// amount and status are informational only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub gateway_order_ref: String,
    pub gateway_payment_ref: String,
    pub signature: String,
    #[serde(default)]
    pub claimed_amount: Option<i64>,
    #[serde(default)]
    pub claimed_status: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway unreachable: {0}")]
    Transport(String),
    #[error("Gateway rejected request: {0}")]
    Rejected(String),
    #[error("Gateway has no record of {0}")]
    NotFound(String),
}

impl GatewayError {
    /// Worth retrying later; the other variants are the gateway's final answer.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transport(_))
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open an order the buyer's payment client will pay against.
    async fn create_order(
        &self,
        receipt: &str,
        amount: i64,
        currency: &str,
    ) -> Result<GatewayOrder, GatewayError>;

    /// Authoritative payment state, fetched from the gateway.
    async fn fetch_payment(&self, payment_ref: &str) -> Result<GatewayPayment, GatewayError>;

    /// Refund a captured payment. A repeat call with the same
    /// `idempotency_key` succeeds without refunding a second time.
    async fn refund(
        &self,
        payment_ref: &str,
        amount: i64,
        idempotency_key: &str,
    ) -> Result<(), GatewayError>;
}

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

use tessera_core::payment::{
    GatewayError, GatewayPayment, GatewayPaymentStatus, PaymentConfirmation, PaymentGateway,
};
use tessera_core::reservation::{FailureReason, ReservationIntent};

type HmacSha256 = Hmac<Sha256>;

/// Message the gateway signs: `"{order_ref}|{payment_ref}"`.
fn signed_message(order_ref: &str, payment_ref: &str) -> String {
    format!("{}|{}", order_ref, payment_ref)
}

/// Hex HMAC-SHA256 the gateway would attach to a confirmation.
pub fn sign(secret: &[u8], order_ref: &str, payment_ref: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(signed_message(order_ref, payment_ref).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// A confirmation whose signature, amount and status all checked out against
/// the gateway's own record.
#[derive(Debug, Clone)]
pub struct Verified {
    pub payment: GatewayPayment,
}

/// Decides whether a client-relayed confirmation proves a real payment.
/// Never trusts `claimed_amount` or `claimed_status`.
pub struct PaymentVerifier {
    secret: Vec<u8>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentVerifier {
    pub fn new(secret: impl Into<Vec<u8>>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            secret: secret.into(),
            gateway,
        }
    }

    pub fn check_signature(
        &self,
        confirmation: &PaymentConfirmation,
    ) -> Result<(), VerificationError> {
        let provided = hex::decode(confirmation.signature.trim())
            .map_err(|_| VerificationError::SignatureMismatch)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| VerificationError::SignatureMismatch)?;
        mac.update(
            signed_message(&confirmation.gateway_order_ref, &confirmation.gateway_payment_ref).as_bytes(),
        );
        // constant-time
        mac.verify_slice(&provided)
            .map_err(|_| VerificationError::SignatureMismatch)
    }

    pub async fn verify(
        &self,
        confirmation: &PaymentConfirmation,
        intent: &ReservationIntent,
    ) -> Result<Verified, VerificationError> {
        self.check_signature(confirmation)?;

        if confirmation.gateway_order_ref != intent.gateway_order_ref {
            return Err(VerificationError::OrderMismatch {
                expected: intent.gateway_order_ref.clone(),
                actual: confirmation.gateway_order_ref.clone(),
            });
        }

        let payment = self.gateway.fetch_payment(&confirmation.gateway_payment_ref).await?;

        if payment.order_ref != intent.gateway_order_ref {
            return Err(VerificationError::OrderMismatch {
                expected: intent.gateway_order_ref.clone(),
                actual: payment.order_ref,
            });
        }
        if payment.amount != intent.amount || !payment.currency.eq_ignore_ascii_case(&intent.currency) {
            return Err(VerificationError::AmountMismatch {
                expected: intent.amount,
                actual: payment.amount,
            });
        }
        if !payment.status.is_settled() {
            return Err(VerificationError::StatusNotCaptured(payment.status));
        }

        if confirmation.claimed_amount.is_some_and(|claimed| claimed != payment.amount) {
            tracing::warn!(
                order_ref = %intent.gateway_order_ref,
                claimed = ?confirmation.claimed_amount,
                actual = payment.amount,
                "Client-claimed amount differs from gateway record"
            );
        }

        Ok(Verified { payment })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Signature does not match")]
    SignatureMismatch,

    #[error("Gateway order {actual} does not belong to intent order {expected}")]
    OrderMismatch { expected: String, actual: String },

    #[error("Amount mismatch: expected {expected}, gateway reports {actual}")]
    AmountMismatch { expected: i64, actual: i64 },

    #[error("Payment not captured: {}", .0.as_str())]
    StatusNotCaptured(GatewayPaymentStatus),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl VerificationError {
    /// Short code stored in the rejection log.
    pub fn code(&self) -> &'static str {
        match self {
            VerificationError::SignatureMismatch => "signature_mismatch",
            VerificationError::OrderMismatch { .. } => "order_mismatch",
            VerificationError::AmountMismatch { .. } => "amount_mismatch",
            VerificationError::StatusNotCaptured(_) => "status_not_captured",
            VerificationError::Gateway(GatewayError::Transport(_)) => "gateway_unavailable",
            VerificationError::Gateway(GatewayError::NotFound(_)) => "gateway_no_record",
            VerificationError::Gateway(GatewayError::Rejected(_)) => "gateway_rejected",
        }
    }

    /// The reason to fail the intent with, if this failure should fail it at all.
    /// A bad signature or a payment reference the gateway cannot resolve proves
    /// nothing about the buyer's own payment, and an outage is retried, so none
    /// of them touch the intent.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            VerificationError::SignatureMismatch | VerificationError::Gateway(_) => None,
            VerificationError::OrderMismatch { .. } => Some(FailureReason::OrderMismatch),
            VerificationError::AmountMismatch { .. } => Some(FailureReason::AmountMismatch),
            VerificationError::StatusNotCaptured(GatewayPaymentStatus::Failed) => {
                Some(FailureReason::GatewayDeclined)
            }
            VerificationError::StatusNotCaptured(_) => Some(FailureReason::StatusNotCaptured),
        }
    }
}

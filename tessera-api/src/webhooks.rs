use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use tessera_core::payment::PaymentConfirmation;
use tessera_order::ConfirmationOutcome;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
pub struct ConfirmationResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ticket_codes: Vec<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_confirmation))
}

/// POST /v1/webhooks/payments
/// Gateway (or client-relayed) payment confirmation. Replays are answered
/// with the original result. Rejections get a coarse 400; the reason is only
/// in the rejection log.
pub async fn handle_payment_confirmation(
    State(state): State<AppState>,
    Json(confirmation): Json<PaymentConfirmation>,
) -> Result<(StatusCode, Json<ConfirmationResponse>), AppError> {
    tracing::info!(
        order_ref = %confirmation.gateway_order_ref,
        payment_ref = %confirmation.gateway_payment_ref,
        "Received payment confirmation"
    );

    let outcome = match state.booking.confirm_payment(&confirmation).await {
        Ok(outcome) => outcome,
        Err(e) => {
            state.metrics.confirmations.with_label_values(&["error"]).inc();
            return Err(e.into());
        }
    };
    state.metrics.confirmations.with_label_values(&[outcome.status()]).inc();

    let response = match outcome {
        ConfirmationOutcome::Confirmed { intent, tickets }
        | ConfirmationOutcome::AlreadyConfirmed { intent, tickets } => (
            StatusCode::OK,
            ConfirmationResponse {
                status: "confirmed",
                intent_id: Some(intent.id),
                ticket_codes: tickets.into_iter().map(|t| t.code).collect(),
            },
        ),
        ConfirmationOutcome::Rejected { .. } => (
            StatusCode::BAD_REQUEST,
            ConfirmationResponse {
                status: "rejected",
                intent_id: None,
                ticket_codes: Vec::new(),
            },
        ),
    };

    Ok((response.0, Json(response.1)))
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tessera_catalog::LedgerError;
use tessera_core::identity::Actor;
use tessera_core::reservation::{BuyerContact, FailureReason, IntentStatus, ReservationIntent};
use tessera_order::{BookingError, ReservationReceipt, ReservationRequest};
use tessera_shared::pii::Masked;

use crate::{error::AppError, middleware::admin_auth_middleware, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub offering_id: Uuid,
    pub quantity: i32,
    pub buyer_name: String,
    pub buyer_email: Option<String>,
    pub buyer_phone: Option<String>,
    #[serde(default)]
    pub attendees: Vec<String>,
}

/// Buyer-facing view of an intent; contact details are left out.
#[derive(Debug, Serialize)]
pub struct ReservationStatusResponse {
    pub intent_id: Uuid,
    pub offering_id: Uuid,
    pub status: IntentStatus,
    pub failure_reason: Option<FailureReason>,
    pub quantity: i32,
    pub amount: i64,
    pub currency: String,
    pub expires_at: DateTime<Utc>,
    pub ticket_codes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub intent_id: Uuid,
    pub status: IntentStatus,
}

pub fn routes(state: &AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/v1/intents/{id}/refund", post(refund_intent))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .route("/v1/reservations", post(create_reservation))
        .route("/v1/reservations/{gateway_order_ref}", get(get_reservation))
        .merge(admin)
}

/// POST /v1/reservations
/// Holds capacity and opens a gateway order for the buyer to pay.
async fn create_reservation(
    State(state): State<AppState>,
    Json(req): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<ReservationReceipt>), AppError> {
    let request = ReservationRequest {
        offering_id: req.offering_id,
        buyer: BuyerContact {
            name: req.buyer_name.trim().to_string(),
            email: non_blank(req.buyer_email).map(Masked::new),
            phone: non_blank(req.buyer_phone).map(Masked::new),
        },
        attendees: req.attendees,
        quantity: req.quantity,
    };

    match state.booking.reserve(request).await {
        Ok(receipt) => {
            state.metrics.reservations.with_label_values(&["created"]).inc();
            Ok((StatusCode::CREATED, Json(receipt)))
        }
        Err(e) => {
            let outcome = match &e {
                BookingError::Ledger(LedgerError::CapacityExceeded { .. }) => "sold_out",
                BookingError::Invalid(_) | BookingError::Ledger(_) => "rejected",
                _ => "error",
            };
            state.metrics.reservations.with_label_values(&[outcome]).inc();
            Err(e.into())
        }
    }
}

/// GET /v1/reservations/{gateway_order_ref}
/// Polled by the buyer's client after checkout.
async fn get_reservation(
    State(state): State<AppState>,
    Path(gateway_order_ref): Path<String>,
) -> Result<Json<ReservationStatusResponse>, AppError> {
    let (intent, tickets) = state.booking.reservation_status(&gateway_order_ref).await?;
    Ok(Json(status_response(intent, tickets.into_iter().map(|t| t.code).collect())))
}

/// POST /v1/intents/{id}/refund
async fn refund_intent(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<RefundResponse>, AppError> {
    let intent = state.booking.refund(id).await?;
    tracing::info!(intent_id = %id, admin = %actor.subject, "Reservation refunded");
    Ok(Json(RefundResponse {
        intent_id: intent.id,
        status: intent.status,
    }))
}

fn status_response(
    intent: ReservationIntent,
    ticket_codes: Vec<String>,
) -> ReservationStatusResponse {
    ReservationStatusResponse {
        intent_id: intent.id,
        offering_id: intent.offering_id,
        status: intent.status,
        failure_reason: intent.failure_reason,
        quantity: intent.quantity,
        amount: intent.amount,
        currency: intent.currency,
        expires_at: intent.expires_at,
        ticket_codes,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use tessera_core::identity::Actor;
use tessera_core::inquiry::normalize_phone;
use tessera_core::ticket::{AttendeeIdentity, CheckInOutcome, QrPayload, Ticket};
use tessera_order::{BookingError, CheckInError};

use crate::{error::AppError, middleware::operator_auth_middleware, state::AppState};

#[derive(Debug, Deserialize)]
pub struct RegisterAttendeeRequest {
    pub offering_id: Uuid,
    pub name: String,
    /// Identifies the attendee across repeat registrations.
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TicketResponse {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub qr_payload: QrPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    /// The ticket code, as carried in the QR payload.
    pub ticket_id: String,
    pub event_id: Uuid,
}

pub fn routes(state: &AppState) -> Router<AppState> {
    let operator = Router::new()
        .route("/v1/tickets", post(register_attendee))
        .route("/v1/checkins", post(check_in))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), operator_auth_middleware));

    Router::new()
        .route("/v1/tickets/{code}", get(get_ticket))
        .merge(operator)
}

fn ticket_response(ticket: Ticket) -> TicketResponse {
    let qr_payload = ticket.qr_payload();
    TicketResponse { ticket, qr_payload }
}

/// POST /v1/tickets
/// Issues a ticket without payment (walk-ins, free events).
async fn register_attendee(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<RegisterAttendeeRequest>,
) -> Result<(StatusCode, Json<TicketResponse>), AppError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::ValidationError("name is required".to_string()));
    }

    // Same person registering twice must map to the same key.
    let contact_key = match (&req.phone, &req.email) {
        (Some(phone), _) => normalize_phone(phone, state.business_rules.phone_significant_digits)
            .ok_or_else(|| AppError::ValidationError("phone number is not usable".to_string()))?,
        (None, Some(email)) if !email.trim().is_empty() => email.trim().to_lowercase(),
        _ => return Err(AppError::ValidationError("phone or email is required".to_string())),
    };

    let issued = state
        .booking
        .register_attendee(req.offering_id, AttendeeIdentity::manual(&contact_key, name))
        .await?;

    tracing::info!(code = %issued.ticket.code, operator = %actor.subject, newly_issued = issued.newly_issued, "Manual registration");
    let status = if issued.newly_issued { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(ticket_response(issued.ticket))))
}

/// GET /v1/tickets/{code}
async fn get_ticket(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<TicketResponse>, AppError> {
    let ticket = state.booking.issuer().get(&code).await?;
    Ok(Json(ticket_response(ticket)))
}

/// POST /v1/checkins
/// Always answers with one of: success, already_checked_in, not_found,
/// event_mismatch.
async fn check_in(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CheckInRequest>,
) -> Result<Response, AppError> {
    let result = state
        .booking
        .check_in(&req.ticket_id, req.event_id, Some(&actor.subject))
        .await;

    let (status, body) = match result {
        Ok(outcome) => {
            if let CheckInOutcome::AlreadyCheckedIn(t) = &outcome {
                tracing::info!(code = %t.code, checked_in_at = ?t.checked_in_at, operator = %actor.subject, "Repeat scan");
            }
            let ticket = ticket_response(outcome.ticket().clone());
            (StatusCode::OK, json!({ "status": outcome.status(), "ticket": ticket }))
        }
        Err(BookingError::CheckIn(CheckInError::NotFound(_))) => {
            (StatusCode::NOT_FOUND, json!({ "status": "not_found" }))
        }
        Err(BookingError::CheckIn(CheckInError::EventMismatch { .. })) => {
            (StatusCode::CONFLICT, json!({ "status": "event_mismatch" }))
        }
        Err(e) => return Err(e.into()),
    };

    state.metrics.checkins.with_label_values(&[body["status"].as_str().unwrap_or("unknown")]).inc();
    Ok((status, Json(body)).into_response())
}

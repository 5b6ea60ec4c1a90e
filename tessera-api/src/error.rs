use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use tessera_catalog::LedgerError;
use tessera_core::repository::StoreError;
use tessera_intake::IntakeError;
use tessera_order::{BookingError, CheckInError, IntentError, IssueError};

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    UpstreamError(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::UpstreamError(msg) => {
                tracing::warn!("Payment gateway error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Payment gateway unavailable".to_string())
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        classify(err.into())
    }
}

/// Maps a domain failure to the response the client sees. Anything
/// unrecognised is a 500 with the detail kept in the log.
fn classify(err: anyhow::Error) -> AppError {
    if let Some(e) = err.downcast_ref::<BookingError>() {
        return match e {
            BookingError::Invalid(msg) => AppError::ValidationError(msg.clone()),
            BookingError::Ledger(e) => ledger(e),
            BookingError::Intent(e) => intent(e),
            BookingError::Issue(IssueError::NotFound(code)) => {
                AppError::NotFoundError(format!("Ticket not found: {}", code))
            }
            BookingError::CheckIn(CheckInError::NotFound(code)) => {
                AppError::NotFoundError(format!("Ticket not found: {}", code))
            }
            BookingError::CheckIn(CheckInError::EventMismatch { .. }) => {
                AppError::ConflictError("Ticket is for a different event".to_string())
            }
            BookingError::Gateway(e) if e.is_transient() => AppError::UpstreamError(e.to_string()),
            BookingError::Gateway(e) => AppError::ConflictError(e.to_string()),
            BookingError::Store(e) => store(e),
            other => AppError::InternalServerError(other.to_string()),
        };
    }
    if let Some(e) = err.downcast_ref::<LedgerError>() {
        return ledger(e);
    }
    if let Some(e) = err.downcast_ref::<IssueError>() {
        return match e {
            IssueError::NotFound(code) => {
                AppError::NotFoundError(format!("Ticket not found: {}", code))
            }
            other => AppError::InternalServerError(other.to_string()),
        };
    }
    if let Some(e) = err.downcast_ref::<IntakeError>() {
        return match e {
            IntakeError::InvalidPhone(_) => AppError::ValidationError(e.to_string()),
            IntakeError::Store(e) => store(e),
        };
    }
    if let Some(e) = err.downcast_ref::<StoreError>() {
        return store(e);
    }
    AppError::Anyhow(err)
}

fn ledger(e: &LedgerError) -> AppError {
    match e {
        LedgerError::NotFound(id) => AppError::NotFoundError(format!("Offering not found: {}", id)),
        LedgerError::Inactive(_) => {
            AppError::ConflictError("Offering is not open for booking".to_string())
        }
        LedgerError::CapacityExceeded { .. } => AppError::ConflictError("Fully booked".to_string()),
        LedgerError::InvalidQuantity(_) | LedgerError::Invalid(_) => {
            AppError::ValidationError(e.to_string())
        }
        LedgerError::Store(e) => store(e),
    }
}

fn intent(e: &IntentError) -> AppError {
    match e {
        IntentError::NotFound(_) => AppError::NotFoundError(e.to_string()),
        IntentError::AlreadyFinalized(_)
        | IntentError::InvalidTransition { .. }
        | IntentError::PaymentReferenceInUse(_) => AppError::ConflictError(e.to_string()),
        IntentError::Store(e) => store(e),
    }
}

fn store(e: &StoreError) -> AppError {
    match e {
        StoreError::NotFound(msg) => AppError::NotFoundError(msg.clone()),
        StoreError::Conflict(msg) => AppError::ConflictError(msg.clone()),
        other => AppError::InternalServerError(other.to_string()),
    }
}

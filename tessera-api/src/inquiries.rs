use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Serialize;
use uuid::Uuid;

use tessera_core::inquiry::ContactSubmission;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
pub struct InquiryResponse {
    pub inquiry_id: Uuid,
    pub merged: bool,
    pub inquiry_count: i32,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/inquiries", post(submit_inquiry))
}

/// POST /v1/inquiries
/// Public contact form. A repeat phone number merges into the existing lead.
async fn submit_inquiry(
    State(state): State<AppState>,
    Json(submission): Json<ContactSubmission>,
) -> Result<(StatusCode, Json<InquiryResponse>), AppError> {
    let outcome = state.intake.ingest(submission).await?;

    let merged = outcome.is_merged();
    state
        .metrics
        .inquiries
        .with_label_values(&[if merged { "merged" } else { "created" }])
        .inc();

    let record = outcome.record();
    let status = if merged { StatusCode::OK } else { StatusCode::CREATED };
    Ok((
        status,
        Json(InquiryResponse {
            inquiry_id: record.id,
            merged,
            inquiry_count: record.inquiry_count,
        }),
    ))
}

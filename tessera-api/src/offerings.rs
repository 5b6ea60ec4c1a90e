use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use tessera_core::identity::Actor;
use tessera_core::offering::{NewOffering, Offering, OfferingKind};

use crate::{error::AppError, middleware::admin_auth_middleware, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CreateOfferingRequest {
    pub kind: OfferingKind,
    pub code: String,
    pub title: String,
    pub total_capacity: i32,
    pub unit_price: i64,
    pub currency: Option<String>,
    pub starts_on: Option<NaiveDate>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

pub fn routes(state: &AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/v1/offerings", post(create_offering))
        .route("/v1/offerings/{id}/active", post(set_active))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .route("/v1/offerings/{id}", get(get_offering))
        .merge(admin)
}

/// POST /v1/offerings
async fn create_offering(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateOfferingRequest>,
) -> Result<(StatusCode, Json<Offering>), AppError> {
    let fields = NewOffering {
        kind: req.kind,
        code: req.code,
        title: req.title,
        total_capacity: req.total_capacity,
        unit_price: req.unit_price,
        currency: req
            .currency
            .unwrap_or_else(|| state.business_rules.default_currency.clone()),
        starts_on: req.starts_on,
        active: req.active.unwrap_or(true),
    };

    let offering = state.booking.ledger().register(fields).await?;
    tracing::info!(offering_id = %offering.id, admin = %actor.subject, "Offering created");
    Ok((StatusCode::CREATED, Json(offering)))
}

/// GET /v1/offerings/{id}
async fn get_offering(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Offering>, AppError> {
    Ok(Json(state.booking.ledger().get(id).await?))
}

/// POST /v1/offerings/{id}/active
async fn set_active(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetActiveRequest>,
) -> Result<Json<Offering>, AppError> {
    let offering = state.booking.ledger().set_active(id, req.active).await?;
    tracing::info!(offering_id = %id, active = req.active, admin = %actor.subject, "Offering availability toggled");
    Ok(Json(offering))
}

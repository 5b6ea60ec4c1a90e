use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use tessera_core::identity::{Actor, ActorRole};

use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: ActorRole,
    pub exp: usize,
}

fn resolve_actor(state: &AppState, headers: &HeaderMap) -> Result<Actor, StatusCode> {
    let bearer = headers
        .typed_get::<Authorization<Bearer>>()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    Ok(Actor {
        subject: token_data.claims.sub,
        role: token_data.claims.role,
    })
}

// ============================================================================
// Operator (STAFF or ADMIN) Middleware
// ============================================================================

pub async fn operator_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let actor = resolve_actor(&state, req.headers())?;
    if !actor.is_operator() {
        return Err(StatusCode::FORBIDDEN);
    }

    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}

// ============================================================================
// Admin Middleware
// ============================================================================

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let actor = resolve_actor(&state, req.headers())?;
    if !actor.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }

    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}

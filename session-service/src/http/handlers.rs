//! Session endpoint handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;
use crate::http::{AppState, AuthContext};
use crate::models::SessionSummary;
use crate::services::{IdentityAssertion, TokenPair};

/// Token pair response, shared by the exchange and refresh endpoints.
#[derive(Debug, Serialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub session_id: Uuid,
}

impl TokenPairResponse {
    fn from_pair(pair: &TokenPair) -> Self {
        Self {
            access_token: pair.access_token.clone(),
            refresh_token: pair.refresh_token.clone(),
            token_type: "Bearer".to_string(),
            expires_in: pair.expires_in,
            session_id: pair.session_id(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RevokeAllResponse {
    pub revoked_sessions: u64,
}

/// POST /api/v1/sessions
///
/// Exchange a verified identity assertion for a session-bound token pair.
pub async fn create_session(
    State(state): State<AppState>,
    Json(assertion): Json<IdentityAssertion>,
) -> Result<(StatusCode, Json<TokenPairResponse>), AuthError> {
    let authed = state.manager.authenticate(&assertion).await?;
    Ok((
        StatusCode::CREATED,
        Json(TokenPairResponse::from_pair(&authed.tokens)),
    ))
}

/// POST /api/v1/sessions/refresh
pub async fn refresh_session(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPairResponse>, AuthError> {
    let pair = state.manager.refresh(&request.refresh_token).await?;
    Ok(Json(TokenPairResponse::from_pair(&pair)))
}

/// DELETE /api/v1/sessions/current
///
/// Log out the session behind the presented bearer token. Idempotent.
pub async fn logout_current(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<StatusCode, AuthError> {
    state.manager.logout(&ctx.claims).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/sessions
///
/// Sign out of all devices.
pub async fn revoke_all_sessions(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<RevokeAllResponse>, AuthError> {
    let revoked_sessions = state.manager.revoke_all(&ctx.claims).await?;
    Ok(Json(RevokeAllResponse { revoked_sessions }))
}

/// GET /api/v1/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<Vec<SessionSummary>>, AuthError> {
    let sessions = state
        .manager
        .list_sessions(ctx.user_id(), Some(ctx.session_id()))
        .await?;
    Ok(Json(sessions))
}

/// GET /health
pub async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

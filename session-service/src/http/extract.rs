//! Bearer-token extractor.
//!
//! The gate every authenticated route passes through: pulls the token from
//! the `Authorization` header and runs it through `TokenService::validate`,
//! which includes the revocation check. Handlers receive the validated
//! claims and attach `user_id`/`session_id` to their own context.

use axum::{async_trait, extract::FromRequestParts, http::header, http::request::Parts};
use uuid::Uuid;

use crate::error::AuthError;
use crate::http::AppState;
use crate::security::{Claims, TokenKind};

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
}

impl AuthContext {
    pub fn user_id(&self) -> Uuid {
        self.claims.sub
    }

    pub fn session_id(&self) -> Uuid {
        self.claims.sid
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthContext {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AuthError::MalformedToken)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::MalformedToken)?;

        let claims = state.tokens.validate(token, TokenKind::Access).await?;

        Ok(AuthContext { claims })
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::security::claims::TokenKind;

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Malformed token")]
    MalformedToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Expected {expected} token, got {actual}")]
    WrongTokenKind {
        expected: TokenKind,
        actual: TokenKind,
    },

    #[error("Invalid token issuer")]
    InvalidIssuer,

    #[error("Invalid token audience")]
    InvalidAudience,

    #[error("Token signing failed: {0}")]
    SigningFailure(String),

    #[error("Session limit exceeded")]
    SessionLimitExceeded,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Refresh token rotation failed: {0}")]
    RotationFailed(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable kind, surfaced in HTTP error bodies so clients
    /// can tell "refresh silently" apart from "re-authenticate interactively".
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MalformedToken => "malformed_token",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenRevoked => "token_revoked",
            AuthError::WrongTokenKind { .. } => "wrong_token_kind",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::InvalidAudience => "invalid_audience",
            AuthError::SigningFailure(_) => "signing_failure",
            AuthError::SessionLimitExceeded => "session_limit_exceeded",
            AuthError::SessionNotFound => "session_not_found",
            AuthError::RotationFailed(_) => "rotation_failed",
            AuthError::StorageUnavailable(_) => "storage_unavailable",
            AuthError::Database(_) => "database_error",
            AuthError::Redis(_) => "redis_error",
            AuthError::Internal(_) => "internal_error",
        }
    }

    /// Whether the durable store behind the failing call could not be reached.
    /// Validation treats these according to the configured failure policy.
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(
            self,
            AuthError::StorageUnavailable(_) | AuthError::Database(_) | AuthError::Redis(_)
        )
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::TokenExpired
            | AuthError::TokenRevoked
            | AuthError::WrongTokenKind { .. }
            | AuthError::InvalidIssuer
            | AuthError::InvalidAudience => StatusCode::UNAUTHORIZED,
            AuthError::SessionLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AuthError::SessionNotFound => StatusCode::NOT_FOUND,
            AuthError::StorageUnavailable(_) | AuthError::RotationFailed(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AuthError::SigningFailure(_)
            | AuthError::Database(_)
            | AuthError::Redis(_)
            | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details stay in the logs, not on the wire.
        let message = match &self {
            AuthError::SigningFailure(_)
            | AuthError::Database(_)
            | AuthError::Redis(_)
            | AuthError::Internal(_) => {
                tracing::error!(kind = self.kind(), error = %self, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "kind": self.kind(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);
        match err {
            sqlx::Error::PoolTimedOut => {
                AuthError::StorageUnavailable("database pool timed out".to_string())
            }
            other => AuthError::Database(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for AuthError {
    fn from(err: redis::RedisError) -> Self {
        tracing::error!("Redis error: {}", err);
        AuthError::Redis(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName => AuthError::InvalidSignature,
            ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            ErrorKind::InvalidAudience => AuthError::InvalidAudience,
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidKeyFormat => {
                AuthError::SigningFailure(err.to_string())
            }
            _ => AuthError::MalformedToken,
        }
    }
}

//! Signed token payload.
//!
//! A `Claims` value is the unit the codec signs and verifies. Every issued
//! token carries its own id (`jti`, the revocation key), the session it is
//! bound to (`sid`), and its kind; access and refresh tokens issued together
//! share `sid` but never `jti`.

use std::fmt;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminates access tokens from refresh tokens inside the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user this token authenticates.
    pub sub: Uuid,
    /// Server-tracked session the token is bound to.
    pub sid: Uuid,
    /// Unique token id, the key under which revocations are recorded.
    pub jti: Uuid,
    pub iss: String,
    pub aud: String,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    pub kind: TokenKind,
}

impl Claims {
    /// Build claims for a fresh token expiring `ttl` from now.
    pub fn new(
        user_id: Uuid,
        session_id: Uuid,
        kind: TokenKind,
        issuer: &str,
        audience: &str,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id,
            sid: session_id,
            jti: Uuid::new_v4(),
            iss: issuer.to_string(),
            aud: audience.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            kind,
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.sub
    }

    pub fn session_id(&self) -> Uuid {
        self.sid
    }

    pub fn token_id(&self) -> Uuid {
        self.jti
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

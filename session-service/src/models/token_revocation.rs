use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::security::claims::Claims;

/// A blacklisted token id.
///
/// Authoritative until `expires_at` passes, after which the token would be
/// rejected as expired anyway and the row becomes garbage.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RevocationEntry {
    pub id: Uuid,
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub session_id: Uuid,
    /// 'logout', 'rotated', 'evicted', 'revoke_all'
    pub reason: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RevocationEntry {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Request to record a revocation.
#[derive(Debug, Clone)]
pub struct Revocation {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub reason: String,
}

impl Revocation {
    /// Revocation for a token whose claims are in hand; the entry expires
    /// when the token would have.
    pub fn from_claims(claims: &Claims, reason: &str) -> Self {
        Self {
            token_id: claims.jti,
            user_id: claims.sub,
            session_id: claims.sid,
            expires_at: claims.expires_at(),
            reason: reason.to_string(),
        }
    }

    /// Revocation for a token known only by id, using a conservative expiry
    /// horizon (the longest lifetime a token could still have).
    pub fn for_token_id(
        token_id: Uuid,
        user_id: Uuid,
        session_id: Uuid,
        horizon: DateTime<Utc>,
        reason: &str,
    ) -> Self {
        Self {
            token_id,
            user_id,
            session_id,
            expires_at: horizon,
            reason: reason.to_string(),
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A server-tracked client session.
///
/// One row per authenticated client context. Tokens come and go over the
/// session's life; the latest issued pair is remembered via the `*_jti`
/// columns so logout can revoke outstanding tokens it never saw.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Derived from client IP and user agent; identifies "the same client"
    /// across repeated authentications.
    pub client_fingerprint: String,
    pub access_token_jti: Option<Uuid>,
    pub refresh_token_jti: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Session {
    /// Shortened fingerprint for user-facing device lists.
    pub fn fingerprint_prefix(&self) -> &str {
        let end = self.client_fingerprint.len().min(12);
        &self.client_fingerprint[..end]
    }
}

/// Read-only session view for the "manage devices" UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub client: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub is_current: bool,
}

impl From<Session> for SessionSummary {
    fn from(session: Session) -> Self {
        let client = session.fingerprint_prefix().to_string();
        Self {
            id: session.id,
            client,
            created_at: session.created_at,
            last_seen_at: session.last_seen_at,
            is_current: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> Session {
        Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            client_fingerprint: "abcdef0123456789abcdef0123456789".to_string(),
            access_token_jti: None,
            refresh_token_jti: None,
            created_at: Utc::now(),
            last_seen_at: Utc::now(),
            is_active: true,
        }
    }

    #[test]
    fn fingerprint_prefix_is_shortened() {
        let session = sample_session();
        assert_eq!(session.fingerprint_prefix(), "abcdef012345");
    }

    #[test]
    fn fingerprint_prefix_handles_short_values() {
        let mut session = sample_session();
        session.client_fingerprint = "abc".to_string();
        assert_eq!(session.fingerprint_prefix(), "abc");
    }

    #[test]
    fn summary_defaults_to_not_current() {
        let summary = SessionSummary::from(sample_session());
        assert!(!summary.is_current);
        assert_eq!(summary.client.len(), 12);
    }
}

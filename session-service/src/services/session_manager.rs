//! Session orchestration: the entry point behind the identity-exchange and
//! logout endpoints.
//!
//! Decides whether an authentication reuses an existing session or creates a
//! new one, applies the session-limit policy, and drives the token and
//! session stores together. Reuse is the correctness fix for clients that
//! re-authenticate on every popup open; the cap is an independent safety
//! valve.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::SessionLimitPolicy;
use crate::db::SessionStore;
use crate::error::{AuthError, Result};
use crate::models::{Revocation, Session, SessionSummary};
use crate::security::Claims;
use crate::services::token_service::{TokenPair, TokenService};

/// A verified identity assertion from the external identity collaborator.
/// Trusted as-is; this service performs no credential verification of its own.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityAssertion {
    pub subject_id: Uuid,
    pub email: String,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Result of a successful identity exchange.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub session: Session,
    pub tokens: TokenPair,
}

pub struct SessionManager {
    sessions: Arc<dyn SessionStore>,
    tokens: Arc<TokenService>,
    limit_policy: SessionLimitPolicy,
}

/// Derive the identifier that recognizes "the same client" across repeated
/// authentications.
pub fn client_fingerprint(client_ip: Option<&str>, user_agent: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(client_ip.unwrap_or_default().as_bytes());
    hasher.update(b"\n");
    hasher.update(user_agent.unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}

impl SessionManager {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        tokens: Arc<TokenService>,
        limit_policy: SessionLimitPolicy,
    ) -> Self {
        Self {
            sessions,
            tokens,
            limit_policy,
        }
    }

    /// Exchange a verified identity assertion for a token pair bound to a
    /// session, reusing the client's existing session when one is active.
    pub async fn authenticate(&self, assertion: &IdentityAssertion) -> Result<AuthenticatedSession> {
        let fingerprint = client_fingerprint(
            assertion.client_ip.as_deref(),
            assertion.user_agent.as_deref(),
        );

        let session = self.resolve_session(assertion.subject_id, &fingerprint).await?;
        let tokens = self.tokens.issue_pair(assertion.subject_id, session.id)?;

        // Bookkeeping so logout can revoke tokens it never saw. Losing it
        // narrows logout to the presented token, it does not block issuance.
        if let Err(err) = self
            .sessions
            .store_token_ids(
                session.id,
                tokens.access_claims.jti,
                tokens.refresh_claims.jti,
            )
            .await
        {
            tracing::warn!(
                session_id = %session.id,
                error = %err,
                "failed to record issued token ids"
            );
        }

        tracing::info!(
            user_id = %assertion.subject_id,
            email = %assertion.email,
            session_id = %session.id,
            "identity exchanged for session tokens"
        );

        Ok(AuthenticatedSession { session, tokens })
    }

    /// Reuse-or-create with cap enforcement.
    async fn resolve_session(&self, user_id: Uuid, fingerprint: &str) -> Result<Session> {
        if let Some(session) = self
            .sessions
            .find_active_by_fingerprint(user_id, fingerprint)
            .await?
        {
            if let Err(err) = self.sessions.touch(session.id).await {
                tracing::warn!(session_id = %session.id, error = %err, "session touch failed");
            }
            tracing::debug!(
                user_id = %user_id,
                session_id = %session.id,
                "reusing active session for known client"
            );
            return Ok(session);
        }

        match self.sessions.create(user_id, fingerprint).await {
            Ok(session) => Ok(session),
            Err(AuthError::SessionLimitExceeded) => match self.limit_policy {
                SessionLimitPolicy::Reject => Err(AuthError::SessionLimitExceeded),
                SessionLimitPolicy::EvictOldest => {
                    self.evict_oldest(user_id).await?;
                    // Retry once; under heavy contention the cap can win again
                    // and the error surfaces to the caller.
                    self.sessions.create(user_id, fingerprint).await
                }
            },
            Err(err) => Err(err),
        }
    }

    async fn evict_oldest(&self, user_id: Uuid) -> Result<()> {
        let Some(evicted) = self.sessions.deactivate_oldest(user_id).await? else {
            return Ok(());
        };

        tracing::info!(
            user_id = %user_id,
            session_id = %evicted.id,
            "evicted least-recently-seen session to stay under the session cap"
        );

        // The evicted session's outstanding tokens must stop working too.
        let revocations = outstanding_revocations(&evicted, self.tokens.refresh_ttl(), "evicted");
        if !revocations.is_empty() {
            if let Err(err) = self.tokens.revoke_tokens(&revocations).await {
                tracing::warn!(
                    session_id = %evicted.id,
                    error = %err,
                    "failed to revoke tokens of evicted session"
                );
            }
        }

        Ok(())
    }

    /// Exchange a refresh token for a new pair and touch the session.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let pair = self.tokens.refresh(refresh_token).await?;
        let session_id = pair.session_id();

        if let Err(err) = self.sessions.touch(session_id).await {
            tracing::warn!(session_id = %session_id, error = %err, "session touch failed");
        }
        if let Err(err) = self
            .sessions
            .store_token_ids(session_id, pair.access_claims.jti, pair.refresh_claims.jti)
            .await
        {
            tracing::warn!(
                session_id = %session_id,
                error = %err,
                "failed to record rotated token ids"
            );
        }

        Ok(pair)
    }

    /// Log out the session behind a validated bearer token.
    ///
    /// Token revocation is the security-critical half and runs first; a
    /// failure to mark the session row inactive afterwards is logged for
    /// reconciliation but does not undo or mask the revocation. Logging out
    /// an already-inactive session succeeds.
    pub async fn logout(&self, claims: &Claims) -> Result<()> {
        let mut revocations = vec![Revocation::from_claims(claims, "logout")];

        // Pull the session's recorded token ids so the other half of the
        // pair dies too. Best-effort: the presented token is always revoked.
        match self.sessions.get(claims.sid).await {
            Ok(Some(session)) => {
                for revocation in
                    outstanding_revocations(&session, self.tokens.refresh_ttl(), "logout")
                {
                    if revocation.token_id != claims.jti {
                        revocations.push(revocation);
                    }
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(
                    session_id = %claims.sid,
                    error = %err,
                    "could not load session during logout; revoking presented token only"
                );
            }
        }

        let revoke_result = self.tokens.revoke_tokens(&revocations).await;

        match self.sessions.deactivate(claims.sid).await {
            Ok(true) => {
                tracing::info!(session_id = %claims.sid, "session logged out");
            }
            Ok(false) => {
                tracing::debug!(session_id = %claims.sid, "logout of inactive session");
            }
            Err(err) => {
                tracing::warn!(
                    session_id = %claims.sid,
                    error = %err,
                    "session deactivation failed after token revocation; left for reconciliation"
                );
            }
        }

        revoke_result
    }

    /// Revoke every active session of the user behind a validated token.
    pub async fn revoke_all(&self, claims: &Claims) -> Result<u64> {
        let sessions = self.sessions.list_active(claims.sub).await?;

        let mut revocations = vec![Revocation::from_claims(claims, "revoke_all")];
        for session in &sessions {
            for revocation in
                outstanding_revocations(session, self.tokens.refresh_ttl(), "revoke_all")
            {
                if revocation.token_id != claims.jti {
                    revocations.push(revocation);
                }
            }
        }

        let revoke_result = self.tokens.revoke_tokens(&revocations).await;

        let deactivated = match self.sessions.deactivate_all(claims.sub).await {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(
                    user_id = %claims.sub,
                    error = %err,
                    "bulk session deactivation failed after token revocation"
                );
                0
            }
        };

        revoke_result?;

        tracing::info!(
            user_id = %claims.sub,
            sessions = deactivated,
            "revoked all sessions for user"
        );
        Ok(deactivated)
    }

    /// Active sessions for the "manage devices" view. Read-only.
    pub async fn list_sessions(
        &self,
        user_id: Uuid,
        current_session: Option<Uuid>,
    ) -> Result<Vec<SessionSummary>> {
        let sessions = self.sessions.list_active(user_id).await?;
        Ok(sessions
            .into_iter()
            .map(|session| {
                let mut summary = SessionSummary::from(session);
                summary.is_current = current_session == Some(summary.id);
                summary
            })
            .collect())
    }
}

/// Revocations for the token ids a session has on record. The true expiry of
/// those tokens is unknown here, so entries use the longest lifetime a token
/// could still have.
fn outstanding_revocations(
    session: &Session,
    refresh_ttl: chrono::Duration,
    reason: &str,
) -> Vec<Revocation> {
    let horizon = Utc::now() + refresh_ttl;
    [session.access_token_jti, session.refresh_token_jti]
        .into_iter()
        .flatten()
        .map(|jti| Revocation::for_token_id(jti, session.user_id, session.id, horizon, reason))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JwtSettings, RevocationFailurePolicy};
    use crate::db::{MemoryRevocationStore, MemorySessionStore};
    use crate::security::TokenKind;

    fn jwt_settings() -> JwtSettings {
        JwtSettings {
            signing_key: "session-manager-test-secret".to_string(),
            validation_key: None,
            algorithm: "HS256".to_string(),
            issuer: "notes-platform".to_string(),
            audience: "notes-api".to_string(),
            access_ttl_secs: 900,
            refresh_ttl_secs: 86_400,
            leeway_secs: 10,
        }
    }

    fn manager(max_sessions: i64, policy: SessionLimitPolicy) -> SessionManager {
        let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new(max_sessions));
        let tokens = Arc::new(
            TokenService::from_settings(
                &jwt_settings(),
                Arc::new(MemoryRevocationStore::new()),
                None,
                RevocationFailurePolicy::FailClosed,
            )
            .unwrap(),
        );
        SessionManager::new(sessions, tokens, policy)
    }

    fn assertion(user: Uuid, device: &str) -> IdentityAssertion {
        IdentityAssertion {
            subject_id: user,
            email: "ada@example.com".to_string(),
            client_ip: Some("203.0.113.7".to_string()),
            user_agent: Some(device.to_string()),
        }
    }

    #[test]
    fn fingerprint_is_stable_and_client_specific() {
        let a = client_fingerprint(Some("203.0.113.7"), Some("Firefox/133"));
        let b = client_fingerprint(Some("203.0.113.7"), Some("Firefox/133"));
        let c = client_fingerprint(Some("203.0.113.7"), Some("Chrome/131"));
        let d = client_fingerprint(Some("198.51.100.1"), Some("Firefox/133"));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn repeated_authentication_reuses_the_session() {
        let manager = manager(10, SessionLimitPolicy::Reject);
        let user = Uuid::new_v4();

        let first = manager.authenticate(&assertion(user, "ext")).await.unwrap();
        let second = manager.authenticate(&assertion(user, "ext")).await.unwrap();
        let third = manager.authenticate(&assertion(user, "ext")).await.unwrap();

        assert_eq!(first.session.id, second.session.id);
        assert_eq!(second.session.id, third.session.id);
        assert_ne!(
            first.tokens.access_claims.jti,
            second.tokens.access_claims.jti
        );

        let listed = manager.list_sessions(user, None).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn distinct_clients_get_distinct_sessions() {
        let manager = manager(10, SessionLimitPolicy::Reject);
        let user = Uuid::new_v4();

        let ext = manager.authenticate(&assertion(user, "ext")).await.unwrap();
        let web = manager.authenticate(&assertion(user, "web")).await.unwrap();

        assert_ne!(ext.session.id, web.session.id);
        assert_eq!(manager.list_sessions(user, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reject_policy_surfaces_the_limit() {
        let manager = manager(2, SessionLimitPolicy::Reject);
        let user = Uuid::new_v4();

        manager.authenticate(&assertion(user, "a")).await.unwrap();
        manager.authenticate(&assertion(user, "b")).await.unwrap();

        let result = manager.authenticate(&assertion(user, "c")).await;
        assert!(matches!(result, Err(AuthError::SessionLimitExceeded)));
        assert_eq!(manager.list_sessions(user, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn evict_oldest_policy_replaces_the_stalest_session() {
        let manager = manager(2, SessionLimitPolicy::EvictOldest);
        let user = Uuid::new_v4();

        let a = manager.authenticate(&assertion(user, "a")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let b = manager.authenticate(&assertion(user, "b")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let c = manager.authenticate(&assertion(user, "c")).await.unwrap();

        let active: Vec<Uuid> = manager
            .list_sessions(user, None)
            .await
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();

        assert_eq!(active.len(), 2);
        assert!(active.contains(&b.session.id));
        assert!(active.contains(&c.session.id));
        assert!(!active.contains(&a.session.id));

        // The evicted session's tokens stop working.
        let result = manager
            .tokens
            .validate(&a.tokens.access_token, TokenKind::Access)
            .await;
        assert!(matches!(result, Err(AuthError::TokenRevoked)));
    }

    #[tokio::test]
    async fn logout_revokes_tokens_and_deactivates_the_session() {
        let manager = manager(10, SessionLimitPolicy::Reject);
        let user = Uuid::new_v4();
        let authed = manager.authenticate(&assertion(user, "ext")).await.unwrap();

        manager
            .tokens
            .validate(&authed.tokens.access_token, TokenKind::Access)
            .await
            .unwrap();

        manager.logout(&authed.tokens.access_claims).await.unwrap();

        let access = manager
            .tokens
            .validate(&authed.tokens.access_token, TokenKind::Access)
            .await;
        assert!(matches!(access, Err(AuthError::TokenRevoked)));

        // The refresh token recorded on the session dies with it.
        let refreshed = manager.refresh(&authed.tokens.refresh_token).await;
        assert!(matches!(refreshed, Err(AuthError::TokenRevoked)));

        assert!(manager.list_sessions(user, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let manager = manager(10, SessionLimitPolicy::Reject);
        let authed = manager
            .authenticate(&assertion(Uuid::new_v4(), "ext"))
            .await
            .unwrap();

        manager.logout(&authed.tokens.access_claims).await.unwrap();
        manager.logout(&authed.tokens.access_claims).await.unwrap();
    }

    #[tokio::test]
    async fn refresh_rotates_and_keeps_the_session() {
        let manager = manager(10, SessionLimitPolicy::Reject);
        let user = Uuid::new_v4();
        let authed = manager.authenticate(&assertion(user, "ext")).await.unwrap();

        let next = manager.refresh(&authed.tokens.refresh_token).await.unwrap();
        assert_eq!(next.session_id(), authed.session.id);

        let replay = manager.refresh(&authed.tokens.refresh_token).await;
        assert!(matches!(replay, Err(AuthError::TokenRevoked)));

        assert_eq!(manager.list_sessions(user, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn revoke_all_clears_every_session() {
        let manager = manager(10, SessionLimitPolicy::Reject);
        let user = Uuid::new_v4();

        let ext = manager.authenticate(&assertion(user, "ext")).await.unwrap();
        let web = manager.authenticate(&assertion(user, "web")).await.unwrap();

        let count = manager.revoke_all(&ext.tokens.access_claims).await.unwrap();
        assert_eq!(count, 2);

        assert!(manager.list_sessions(user, None).await.unwrap().is_empty());
        for pair in [&ext.tokens, &web.tokens] {
            let result = manager.tokens.validate(&pair.access_token, TokenKind::Access).await;
            assert!(matches!(result, Err(AuthError::TokenRevoked)));
        }
    }

    #[tokio::test]
    async fn list_sessions_marks_the_caller() {
        let manager = manager(10, SessionLimitPolicy::Reject);
        let user = Uuid::new_v4();

        let ext = manager.authenticate(&assertion(user, "ext")).await.unwrap();
        manager.authenticate(&assertion(user, "web")).await.unwrap();

        let listed = manager
            .list_sessions(user, Some(ext.session.id))
            .await
            .unwrap();

        assert_eq!(listed.len(), 2);
        let current: Vec<_> = listed.iter().filter(|s| s.is_current).collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].id, ext.session.id);
    }
}

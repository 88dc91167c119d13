//! Token issuance, validation, and refresh rotation.
//!
//! Composes the codec with the revocation store. `validate` is the single
//! gate every authenticated request passes through; `refresh` rotates the
//! presented refresh token so a stolen one stops working the moment its
//! legitimate holder exchanges it.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::config::{JwtSettings, RevocationFailurePolicy};
use crate::db::RevocationStore;
use crate::error::{AuthError, Result};
use crate::models::Revocation;
use crate::security::{Claims, RevocationCache, TokenCodec, TokenKind};

/// An access/refresh pair bound to one session.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_claims: Claims,
    pub refresh_claims: Claims,
    /// Access token lifetime in seconds, for the HTTP response body.
    pub expires_in: i64,
}

impl TokenPair {
    pub fn session_id(&self) -> Uuid {
        self.access_claims.sid
    }
}

pub struct TokenService {
    codec: TokenCodec,
    revocations: Arc<dyn RevocationStore>,
    cache: Option<RevocationCache>,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    failure_policy: RevocationFailurePolicy,
}

impl TokenService {
    pub fn from_settings(
        settings: &JwtSettings,
        revocations: Arc<dyn RevocationStore>,
        cache: Option<RevocationCache>,
        failure_policy: RevocationFailurePolicy,
    ) -> Result<Self> {
        if settings.refresh_ttl_secs <= settings.access_ttl_secs {
            return Err(AuthError::Internal(
                "refresh token TTL must exceed access token TTL".to_string(),
            ));
        }

        Ok(Self {
            codec: TokenCodec::new(settings)?,
            revocations,
            cache,
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            access_ttl: Duration::seconds(settings.access_ttl_secs as i64),
            refresh_ttl: Duration::seconds(settings.refresh_ttl_secs as i64),
            failure_policy,
        })
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue an access/refresh pair bound to `session_id`.
    ///
    /// The two tokens share the session but carry distinct ids, kinds, and
    /// lifetimes; the refresh token always outlives the access token.
    pub fn issue_pair(&self, user_id: Uuid, session_id: Uuid) -> Result<TokenPair> {
        let access_claims = Claims::new(
            user_id,
            session_id,
            TokenKind::Access,
            &self.issuer,
            &self.audience,
            self.access_ttl,
        );
        let refresh_claims = Claims::new(
            user_id,
            session_id,
            TokenKind::Refresh,
            &self.issuer,
            &self.audience,
            self.refresh_ttl,
        );

        let access_token = self.codec.issue(&access_claims)?;
        let refresh_token = self.codec.issue(&refresh_claims)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_claims,
            refresh_claims,
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    /// Parse, verify, and check revocation for a presented token.
    ///
    /// A token whose id has a live revocation entry never validates. When the
    /// revocation store is unreachable the configured failure policy decides
    /// between rejecting (safety) and assuming not revoked (availability).
    pub async fn validate(&self, token: &str, expected: TokenKind) -> Result<Claims> {
        let claims = self.codec.parse(token)?;

        if claims.kind != expected {
            return Err(AuthError::WrongTokenKind {
                expected,
                actual: claims.kind,
            });
        }

        if let Some(cache) = &self.cache {
            match cache.is_revoked(claims.jti).await {
                Ok(true) => return Err(AuthError::TokenRevoked),
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "revocation cache read failed, falling back to store");
                }
            }
        }

        match self.revocations.is_revoked(claims.jti).await {
            Ok(true) => Err(AuthError::TokenRevoked),
            Ok(false) => Ok(claims),
            Err(err) if err.is_storage_unavailable() => match self.failure_policy {
                RevocationFailurePolicy::FailOpen => {
                    tracing::warn!(
                        token_id = %claims.jti,
                        error = %err,
                        "revocation store unavailable, failing open"
                    );
                    Ok(claims)
                }
                RevocationFailurePolicy::FailClosed => Err(AuthError::StorageUnavailable(
                    format!("revocation check unavailable: {err}"),
                )),
            },
            Err(err) => Err(err),
        }
    }

    /// Exchange a refresh token for a new pair, rotating the old token.
    ///
    /// The rotation is a first-writer-wins claim on the token id: of two
    /// concurrent exchanges of the same token exactly one wins, the other
    /// sees the token as revoked. New tokens are only issued once the old
    /// one is confirmed revoked.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.validate(refresh_token, TokenKind::Refresh).await?;

        let rotation = Revocation::from_claims(&claims, "rotated");
        match self.revocations.claim(&rotation).await {
            Ok(true) => {}
            Ok(false) => return Err(AuthError::TokenRevoked),
            Err(err) => {
                return Err(AuthError::RotationFailed(format!(
                    "could not revoke exchanged refresh token: {err}"
                )))
            }
        }
        self.cache_revocation(&rotation).await;

        tracing::debug!(
            user_id = %claims.sub,
            session_id = %claims.sid,
            rotated_token_id = %claims.jti,
            "refresh token rotated"
        );

        self.issue_pair(claims.sub, claims.sid)
    }

    /// Record revocations for a batch of tokens, e.g. at logout.
    ///
    /// Every entry is attempted even if an earlier one fails; the first
    /// failure is reported after the batch so callers know the blacklist may
    /// be incomplete.
    pub async fn revoke_tokens(&self, revocations: &[Revocation]) -> Result<()> {
        let mut first_err = None;

        for revocation in revocations {
            match self.revocations.revoke(revocation).await {
                Ok(()) => {
                    tracing::info!(
                        token_id = %revocation.token_id,
                        session_id = %revocation.session_id,
                        reason = %revocation.reason,
                        "token revoked"
                    );
                    self.cache_revocation(revocation).await;
                }
                Err(err) => {
                    tracing::error!(
                        token_id = %revocation.token_id,
                        error = %err,
                        "failed to record token revocation"
                    );
                    first_err.get_or_insert(err);
                }
            }
        }

        match first_err {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    async fn cache_revocation(&self, revocation: &Revocation) {
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.insert(revocation.token_id, revocation.expires_at).await {
                tracing::warn!(
                    token_id = %revocation.token_id,
                    error = %err,
                    "revocation cache write failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryRevocationStore;
    use async_trait::async_trait;

    fn jwt_settings() -> JwtSettings {
        JwtSettings {
            signing_key: "token-service-test-secret".to_string(),
            validation_key: None,
            algorithm: "HS256".to_string(),
            issuer: "notes-platform".to_string(),
            audience: "notes-api".to_string(),
            access_ttl_secs: 900,
            refresh_ttl_secs: 86_400,
            leeway_secs: 10,
        }
    }

    fn service_with(
        revocations: Arc<dyn RevocationStore>,
        policy: RevocationFailurePolicy,
    ) -> TokenService {
        TokenService::from_settings(&jwt_settings(), revocations, None, policy).unwrap()
    }

    fn service() -> TokenService {
        service_with(
            Arc::new(MemoryRevocationStore::new()),
            RevocationFailurePolicy::FailClosed,
        )
    }

    /// Store double simulating an unreachable backend.
    struct UnavailableRevocationStore;

    #[async_trait]
    impl RevocationStore for UnavailableRevocationStore {
        async fn revoke(&self, _revocation: &Revocation) -> Result<()> {
            Err(AuthError::StorageUnavailable("store down".to_string()))
        }

        async fn claim(&self, _revocation: &Revocation) -> Result<bool> {
            Err(AuthError::StorageUnavailable("store down".to_string()))
        }

        async fn is_revoked(&self, _token_id: Uuid) -> Result<bool> {
            Err(AuthError::StorageUnavailable("store down".to_string()))
        }

        async fn purge_expired(&self) -> Result<u64> {
            Err(AuthError::StorageUnavailable("store down".to_string()))
        }
    }

    #[test]
    fn pair_shares_session_but_not_token_ids() {
        let service = service();
        let user = Uuid::new_v4();
        let session = Uuid::new_v4();

        let pair = service.issue_pair(user, session).unwrap();

        assert_eq!(pair.access_claims.sid, session);
        assert_eq!(pair.refresh_claims.sid, session);
        assert_eq!(pair.access_claims.kind, TokenKind::Access);
        assert_eq!(pair.refresh_claims.kind, TokenKind::Refresh);
        assert_ne!(pair.access_claims.jti, pair.refresh_claims.jti);
    }

    #[test]
    fn refresh_token_outlives_access_token() {
        let pair = service().issue_pair(Uuid::new_v4(), Uuid::new_v4()).unwrap();
        assert!(pair.refresh_claims.exp > pair.access_claims.exp);
        assert_eq!(pair.expires_in, 900);
    }

    #[test]
    fn inverted_ttls_are_rejected_at_construction() {
        let settings = JwtSettings {
            access_ttl_secs: 86_400,
            refresh_ttl_secs: 900,
            ..jwt_settings()
        };
        let result = TokenService::from_settings(
            &settings,
            Arc::new(MemoryRevocationStore::new()),
            None,
            RevocationFailurePolicy::FailClosed,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn validate_accepts_fresh_access_token() {
        let service = service();
        let user = Uuid::new_v4();
        let pair = service.issue_pair(user, Uuid::new_v4()).unwrap();

        let claims = service
            .validate(&pair.access_token, TokenKind::Access)
            .await
            .unwrap();
        assert_eq!(claims.sub, user);
    }

    #[tokio::test]
    async fn validate_rejects_wrong_kind() {
        let service = service();
        let pair = service.issue_pair(Uuid::new_v4(), Uuid::new_v4()).unwrap();

        let result = service.validate(&pair.refresh_token, TokenKind::Access).await;
        assert!(matches!(
            result,
            Err(AuthError::WrongTokenKind {
                expected: TokenKind::Access,
                actual: TokenKind::Refresh,
            })
        ));
    }

    #[tokio::test]
    async fn revoked_token_never_validates_again() {
        let service = service();
        let pair = service.issue_pair(Uuid::new_v4(), Uuid::new_v4()).unwrap();

        service
            .validate(&pair.access_token, TokenKind::Access)
            .await
            .unwrap();

        service
            .revoke_tokens(&[Revocation::from_claims(&pair.access_claims, "logout")])
            .await
            .unwrap();

        for _ in 0..3 {
            let result = service.validate(&pair.access_token, TokenKind::Access).await;
            assert!(matches!(result, Err(AuthError::TokenRevoked)));
        }
    }

    #[tokio::test]
    async fn refresh_rotates_the_presented_token() {
        let service = service();
        let user = Uuid::new_v4();
        let session = Uuid::new_v4();
        let pair = service.issue_pair(user, session).unwrap();

        let next = service.refresh(&pair.refresh_token).await.unwrap();
        assert_eq!(next.session_id(), session);
        assert_ne!(next.refresh_claims.jti, pair.refresh_claims.jti);

        // The exchanged token is burned.
        let replay = service.refresh(&pair.refresh_token).await;
        assert!(matches!(replay, Err(AuthError::TokenRevoked)));

        // The replacement works.
        assert!(service.refresh(&next.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_refreshes_of_one_token_yield_one_winner() {
        let service = Arc::new(service());
        let pair = service.issue_pair(Uuid::new_v4(), Uuid::new_v4()).unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let service = Arc::clone(&service);
            let token = pair.refresh_token.clone();
            handles.push(tokio::spawn(async move { service.refresh(&token).await }));
        }

        let mut ok = 0;
        let mut revoked = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(AuthError::TokenRevoked) => revoked += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(revoked, 1);
    }

    #[tokio::test]
    async fn fail_closed_rejects_when_store_is_down() {
        let service = service_with(
            Arc::new(UnavailableRevocationStore),
            RevocationFailurePolicy::FailClosed,
        );
        let pair = service.issue_pair(Uuid::new_v4(), Uuid::new_v4()).unwrap();

        let result = service.validate(&pair.access_token, TokenKind::Access).await;
        assert!(matches!(result, Err(AuthError::StorageUnavailable(_))));
    }

    #[tokio::test]
    async fn fail_open_accepts_when_store_is_down() {
        let service = service_with(
            Arc::new(UnavailableRevocationStore),
            RevocationFailurePolicy::FailOpen,
        );
        let pair = service.issue_pair(Uuid::new_v4(), Uuid::new_v4()).unwrap();

        assert!(service
            .validate(&pair.access_token, TokenKind::Access)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn refresh_never_issues_when_rotation_cannot_be_recorded() {
        // Fail open so validation passes and the rotation write is what fails.
        let service = service_with(
            Arc::new(UnavailableRevocationStore),
            RevocationFailurePolicy::FailOpen,
        );
        let pair = service.issue_pair(Uuid::new_v4(), Uuid::new_v4()).unwrap();

        let result = service.refresh(&pair.refresh_token).await;
        assert!(matches!(result, Err(AuthError::RotationFailed(_))));
    }

    #[tokio::test]
    async fn revoke_tokens_reports_store_failures() {
        let service = service_with(
            Arc::new(UnavailableRevocationStore),
            RevocationFailurePolicy::FailOpen,
        );
        let pair = service.issue_pair(Uuid::new_v4(), Uuid::new_v4()).unwrap();

        let result = service
            .revoke_tokens(&[Revocation::from_claims(&pair.access_claims, "logout")])
            .await;
        assert!(result.is_err());
    }
}

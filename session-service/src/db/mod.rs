//! Durable stores for sessions and revocations.
//!
//! Services depend on the [`SessionStore`] and [`RevocationStore`] traits and
//! receive an owned instance at construction, so tests run against isolated
//! in-memory stores while production wires up PostgreSQL.

pub mod memory;
pub mod sessions;
pub mod token_revocation;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{AuthError, Result};
use crate::models::{Revocation, Session};

pub use memory::{MemoryRevocationStore, MemorySessionStore};
pub use sessions::PgSessionStore;
pub use token_revocation::PgRevocationStore;

/// Per-user session records.
///
/// All mutating operations are safe under concurrent invocation for the same
/// user; the active-session count is only ever read and written inside
/// [`SessionStore::create`], never by callers.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create an active session, enforcing the per-user cap atomically with
    /// the insert. Two simultaneous creates for a user at the cap must not
    /// both succeed.
    ///
    /// If another request already holds an active session for the same
    /// fingerprint, that session is returned instead of inserting a
    /// duplicate.
    async fn create(&self, user_id: Uuid, client_fingerprint: &str) -> Result<Session>;

    async fn find_active_by_fingerprint(
        &self,
        user_id: Uuid,
        client_fingerprint: &str,
    ) -> Result<Option<Session>>;

    async fn get(&self, session_id: Uuid) -> Result<Option<Session>>;

    /// Update `last_seen_at`. Best-effort; callers log failures and move on.
    async fn touch(&self, session_id: Uuid) -> Result<()>;

    /// Remember the latest issued token pair so logout can revoke tokens it
    /// never saw.
    async fn store_token_ids(
        &self,
        session_id: Uuid,
        access_token_jti: Uuid,
        refresh_token_jti: Uuid,
    ) -> Result<()>;

    /// Active sessions for a user, most recently seen first.
    async fn list_active(&self, user_id: Uuid) -> Result<Vec<Session>>;

    /// Mark a session inactive. Returns `false` when it was already inactive
    /// or unknown (deactivation is idempotent).
    async fn deactivate(&self, session_id: Uuid) -> Result<bool>;

    async fn deactivate_all(&self, user_id: Uuid) -> Result<u64>;

    /// Deactivate the least-recently-seen active session for a user, the
    /// eviction primitive behind the `evict-oldest` limit policy.
    async fn deactivate_oldest(&self, user_id: Uuid) -> Result<Option<Session>>;

    /// Delete sessions not seen for `idle_for`. Run by the maintenance task.
    async fn purge_inactive(&self, idle_for: chrono::Duration) -> Result<u64>;
}

/// Durable set of revoked token ids.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Record a revocation. Idempotent: revoking an already-revoked id
    /// succeeds.
    async fn revoke(&self, revocation: &Revocation) -> Result<()>;

    /// First-writer-wins insert: returns `true` for the caller that recorded
    /// the revocation, `false` if the id was already revoked. Refresh
    /// rotation uses this so exactly one of two concurrent rotations of the
    /// same token succeeds.
    async fn claim(&self, revocation: &Revocation) -> Result<bool>;

    /// Whether a non-expired revocation exists for this token id.
    async fn is_revoked(&self, token_id: Uuid) -> Result<bool>;

    /// Delete entries whose tokens have expired naturally. Returns the count.
    async fn purge_expired(&self) -> Result<u64>;
}

/// Bound a store call with a timeout, surfacing elapsed timers as
/// [`AuthError::StorageUnavailable`].
pub(crate) async fn bounded<T, F>(timeout: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(AuthError::StorageUnavailable(format!(
            "{operation} timed out after {timeout:?}"
        ))),
    }
}

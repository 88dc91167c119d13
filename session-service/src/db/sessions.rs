//! PostgreSQL session store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{bounded, SessionStore};
use crate::error::{AuthError, Result};
use crate::models::Session;

const SESSION_COLUMNS: &str = "id, user_id, client_fingerprint, access_token_jti, \
     refresh_token_jti, created_at, last_seen_at, is_active";

pub struct PgSessionStore {
    pool: PgPool,
    max_sessions: i64,
    op_timeout: Duration,
}

impl PgSessionStore {
    pub fn new(pool: PgPool, max_sessions: i64, op_timeout: Duration) -> Self {
        Self {
            pool,
            max_sessions,
            op_timeout,
        }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, user_id: Uuid, client_fingerprint: &str) -> Result<Session> {
        bounded(self.op_timeout, "session create", async {
            let mut tx = self.pool.begin().await?;

            // Serialize cap checks per user. The count-then-insert below is
            // only correct because concurrent creates for the same user queue
            // on this lock; it is released at commit or rollback.
            sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;

            // A concurrent request for the same client may have created the
            // session after the caller's lookup missed; adopt it.
            let existing = sqlx::query_as::<_, Session>(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions \
                 WHERE user_id = $1 AND client_fingerprint = $2 AND is_active"
            ))
            .bind(user_id)
            .bind(client_fingerprint)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(session) = existing {
                tx.commit().await?;
                return Ok(session);
            }

            let active: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM sessions WHERE user_id = $1 AND is_active",
            )
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

            if active >= self.max_sessions {
                return Err(AuthError::SessionLimitExceeded);
            }

            let session = sqlx::query_as::<_, Session>(&format!(
                "INSERT INTO sessions (id, user_id, client_fingerprint, created_at, last_seen_at, is_active) \
                 VALUES ($1, $2, $3, NOW(), NOW(), TRUE) \
                 RETURNING {SESSION_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(client_fingerprint)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(session)
        })
        .await
    }

    async fn find_active_by_fingerprint(
        &self,
        user_id: Uuid,
        client_fingerprint: &str,
    ) -> Result<Option<Session>> {
        bounded(self.op_timeout, "session lookup", async {
            let session = sqlx::query_as::<_, Session>(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions \
                 WHERE user_id = $1 AND client_fingerprint = $2 AND is_active"
            ))
            .bind(user_id)
            .bind(client_fingerprint)
            .fetch_optional(&self.pool)
            .await?;
            Ok(session)
        })
        .await
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<Session>> {
        bounded(self.op_timeout, "session get", async {
            let session = sqlx::query_as::<_, Session>(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
            ))
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(session)
        })
        .await
    }

    async fn touch(&self, session_id: Uuid) -> Result<()> {
        bounded(self.op_timeout, "session touch", async {
            sqlx::query("UPDATE sessions SET last_seen_at = NOW() WHERE id = $1 AND is_active")
                .bind(session_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn store_token_ids(
        &self,
        session_id: Uuid,
        access_token_jti: Uuid,
        refresh_token_jti: Uuid,
    ) -> Result<()> {
        bounded(self.op_timeout, "session token ids", async {
            sqlx::query(
                "UPDATE sessions SET access_token_jti = $1, refresh_token_jti = $2 WHERE id = $3",
            )
            .bind(access_token_jti)
            .bind(refresh_token_jti)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn list_active(&self, user_id: Uuid) -> Result<Vec<Session>> {
        bounded(self.op_timeout, "session list", async {
            let sessions = sqlx::query_as::<_, Session>(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions \
                 WHERE user_id = $1 AND is_active \
                 ORDER BY last_seen_at DESC"
            ))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(sessions)
        })
        .await
    }

    async fn deactivate(&self, session_id: Uuid) -> Result<bool> {
        bounded(self.op_timeout, "session deactivate", async {
            let result = sqlx::query(
                "UPDATE sessions SET is_active = FALSE WHERE id = $1 AND is_active",
            )
            .bind(session_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        })
        .await
    }

    async fn deactivate_all(&self, user_id: Uuid) -> Result<u64> {
        bounded(self.op_timeout, "session deactivate all", async {
            let result = sqlx::query(
                "UPDATE sessions SET is_active = FALSE WHERE user_id = $1 AND is_active",
            )
            .bind(user_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn deactivate_oldest(&self, user_id: Uuid) -> Result<Option<Session>> {
        bounded(self.op_timeout, "session evict", async {
            let session = sqlx::query_as::<_, Session>(&format!(
                "UPDATE sessions SET is_active = FALSE \
                 WHERE id = ( \
                     SELECT id FROM sessions \
                     WHERE user_id = $1 AND is_active \
                     ORDER BY last_seen_at ASC \
                     LIMIT 1 \
                     FOR UPDATE SKIP LOCKED \
                 ) \
                 RETURNING {SESSION_COLUMNS}"
            ))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(session)
        })
        .await
    }

    async fn purge_inactive(&self, idle_for: chrono::Duration) -> Result<u64> {
        bounded(self.op_timeout, "session purge", async {
            let cutoff = Utc::now() - idle_for;
            let result = sqlx::query("DELETE FROM sessions WHERE last_seen_at < $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        })
        .await
    }
}

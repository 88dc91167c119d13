//! PostgreSQL revocation store.
//!
//! The durable, cross-process-visible blacklist. Entries key on the token's
//! `jti` and carry the token's natural expiry so the table stays bounded.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{bounded, RevocationStore};
use crate::error::Result;
use crate::models::Revocation;

pub struct PgRevocationStore {
    pool: PgPool,
    op_timeout: Duration,
}

impl PgRevocationStore {
    pub fn new(pool: PgPool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }
}

#[async_trait]
impl RevocationStore for PgRevocationStore {
    async fn revoke(&self, revocation: &Revocation) -> Result<()> {
        bounded(self.op_timeout, "revocation insert", async {
            sqlx::query(
                r#"
                INSERT INTO token_revocations
                    (id, token_id, user_id, session_id, reason, expires_at, revoked_at, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
                ON CONFLICT (token_id) DO UPDATE SET
                    reason = EXCLUDED.reason,
                    expires_at = GREATEST(token_revocations.expires_at, EXCLUDED.expires_at)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(revocation.token_id)
            .bind(revocation.user_id)
            .bind(revocation.session_id)
            .bind(&revocation.reason)
            .bind(revocation.expires_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn claim(&self, revocation: &Revocation) -> Result<bool> {
        bounded(self.op_timeout, "revocation claim", async {
            // First writer wins; a conflicting row means someone else already
            // revoked (or rotated) this token id.
            let result = sqlx::query(
                r#"
                INSERT INTO token_revocations
                    (id, token_id, user_id, session_id, reason, expires_at, revoked_at, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
                ON CONFLICT (token_id) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(revocation.token_id)
            .bind(revocation.user_id)
            .bind(revocation.session_id)
            .bind(&revocation.reason)
            .bind(revocation.expires_at)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        })
        .await
    }

    async fn is_revoked(&self, token_id: Uuid) -> Result<bool> {
        bounded(self.op_timeout, "revocation check", async {
            let revoked: bool = sqlx::query_scalar(
                "SELECT EXISTS( \
                     SELECT 1 FROM token_revocations \
                     WHERE token_id = $1 AND expires_at > NOW() \
                 )",
            )
            .bind(token_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(revoked)
        })
        .await
    }

    async fn purge_expired(&self) -> Result<u64> {
        bounded(self.op_timeout, "revocation purge", async {
            let result = sqlx::query("DELETE FROM token_revocations WHERE expires_at < NOW()")
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        })
        .await
    }
}

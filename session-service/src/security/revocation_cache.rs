//! Redis fast path for revocation checks.
//!
//! A write-through cache in front of the durable blacklist. Entries expire
//! with the token they blacklist, so the keyspace stays bounded. The cache is
//! best-effort on both sides: a failed write never gates the durable
//! revocation, and a failed or missing read falls back to the durable store.

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use uuid::Uuid;

use crate::error::Result;

const KEY_PREFIX: &str = "notes:revoked:token:";

/// Floor for cache entry TTLs, covering tokens already at or past expiry.
const MIN_TTL_SECS: i64 = 300;

#[derive(Clone)]
pub struct RevocationCache {
    conn: ConnectionManager,
}

impl RevocationCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Record a revoked token id, expiring when the token would have.
    pub async fn insert(&self, token_id: Uuid, expires_at: DateTime<Utc>) -> Result<()> {
        let ttl = cache_ttl_secs(expires_at, Utc::now());

        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(cache_key(token_id))
            .arg(1)
            .arg("EX")
            .arg(ttl)
            .query_async::<_, ()>(&mut conn)
            .await?;

        tracing::debug!(%token_id, ttl_secs = ttl, "revocation cached");
        Ok(())
    }

    pub async fn is_revoked(&self, token_id: Uuid) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(cache_key(token_id))
            .query_async(&mut conn)
            .await?;
        Ok(exists)
    }
}

fn cache_key(token_id: Uuid) -> String {
    format!("{KEY_PREFIX}{token_id}")
}

fn cache_ttl_secs(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (expires_at - now).num_seconds().max(MIN_TTL_SECS) as u64
}

//! Background maintenance task.
//!
//! Periodically drops revocation entries whose tokens have expired naturally
//! and sessions idle past the retention horizon. Runs alongside the server
//! and dies with it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::db::{RevocationStore, SessionStore};

pub fn spawn(
    sessions: Arc<dyn SessionStore>,
    revocations: Arc<dyn RevocationStore>,
    session_retention: chrono::Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match revocations.purge_expired().await {
                Ok(purged) if purged > 0 => {
                    tracing::info!(purged, "purged expired revocation entries");
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "revocation purge failed");
                }
            }

            match sessions.purge_inactive(session_retention).await {
                Ok(purged) if purged > 0 => {
                    tracing::info!(purged, "purged idle sessions");
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "session purge failed");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryRevocationStore, MemorySessionStore};
    use crate::models::Revocation;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn maintenance_purges_expired_entries() {
        let sessions = Arc::new(MemorySessionStore::new(10));
        let revocations = Arc::new(MemoryRevocationStore::new());

        let expired = Revocation {
            token_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            expires_at: Utc::now() - chrono::Duration::seconds(1),
            reason: "logout".to_string(),
        };
        revocations.revoke(&expired).await.unwrap();

        let handle = spawn(
            sessions.clone(),
            revocations.clone(),
            chrono::Duration::days(7),
            Duration::from_millis(20),
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        handle.abort();

        assert_eq!(revocations.purge_expired().await.unwrap(), 0);
    }
}

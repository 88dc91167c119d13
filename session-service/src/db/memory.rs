//! In-memory store implementations.
//!
//! Used by the test suite and for local development without PostgreSQL. Each
//! instance owns its state, so every test case gets an isolated store. A
//! single mutex around the map makes create's count-then-insert atomic, the
//! same guarantee the PostgreSQL store gets from its per-user lock.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::{RevocationStore, SessionStore};
use crate::error::{AuthError, Result};
use crate::models::{Revocation, RevocationEntry, Session};

#[derive(Debug)]
pub struct MemorySessionStore {
    max_sessions: i64,
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl MemorySessionStore {
    pub fn new(max_sessions: i64) -> Self {
        Self {
            max_sessions,
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, user_id: Uuid, client_fingerprint: &str) -> Result<Session> {
        let mut sessions = self.sessions.lock().await;

        if let Some(existing) = sessions.values().find(|s| {
            s.user_id == user_id && s.is_active && s.client_fingerprint == client_fingerprint
        }) {
            return Ok(existing.clone());
        }

        let active = sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_active)
            .count() as i64;
        if active >= self.max_sessions {
            return Err(AuthError::SessionLimitExceeded);
        }

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            client_fingerprint: client_fingerprint.to_string(),
            access_token_jti: None,
            refresh_token_jti: None,
            created_at: now,
            last_seen_at: now,
            is_active: true,
        };
        sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_active_by_fingerprint(
        &self,
        user_id: Uuid,
        client_fingerprint: &str,
    ) -> Result<Option<Session>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .values()
            .find(|s| {
                s.user_id == user_id && s.is_active && s.client_fingerprint == client_fingerprint
            })
            .cloned())
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<Session>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.get(&session_id).cloned())
    }

    async fn touch(&self, session_id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(&session_id) {
            if session.is_active {
                session.last_seen_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn store_token_ids(
        &self,
        session_id: Uuid,
        access_token_jti: Uuid,
        refresh_token_jti: Uuid,
    ) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(&session_id) {
            session.access_token_jti = Some(access_token_jti);
            session.refresh_token_jti = Some(refresh_token_jti);
        }
        Ok(())
    }

    async fn list_active(&self, user_id: Uuid) -> Result<Vec<Session>> {
        let sessions = self.sessions.lock().await;
        let mut active: Vec<Session> = sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_active)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        Ok(active)
    }

    async fn deactivate(&self, session_id: Uuid) -> Result<bool> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(&session_id) {
            Some(session) if session.is_active => {
                session.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn deactivate_all(&self, user_id: Uuid) -> Result<u64> {
        let mut sessions = self.sessions.lock().await;
        let mut count = 0;
        for session in sessions.values_mut() {
            if session.user_id == user_id && session.is_active {
                session.is_active = false;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn deactivate_oldest(&self, user_id: Uuid) -> Result<Option<Session>> {
        let mut sessions = self.sessions.lock().await;
        let oldest = sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_active)
            .min_by_key(|s| (s.last_seen_at, s.created_at, s.id))
            .map(|s| s.id);

        Ok(oldest.and_then(|id| {
            sessions.get_mut(&id).map(|session| {
                session.is_active = false;
                session.clone()
            })
        }))
    }

    async fn purge_inactive(&self, idle_for: chrono::Duration) -> Result<u64> {
        let mut sessions = self.sessions.lock().await;
        let cutoff = Utc::now() - idle_for;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_seen_at >= cutoff);
        Ok((before - sessions.len()) as u64)
    }
}

#[derive(Debug, Default)]
pub struct MemoryRevocationStore {
    entries: Mutex<HashMap<Uuid, RevocationEntry>>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn entry_from(revocation: &Revocation) -> RevocationEntry {
    let now = Utc::now();
    RevocationEntry {
        id: Uuid::new_v4(),
        token_id: revocation.token_id,
        user_id: revocation.user_id,
        session_id: revocation.session_id,
        reason: revocation.reason.clone(),
        expires_at: revocation.expires_at,
        revoked_at: now,
        created_at: now,
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn revoke(&self, revocation: &Revocation) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries
            .entry(revocation.token_id)
            .or_insert_with(|| entry_from(revocation));
        Ok(())
    }

    async fn claim(&self, revocation: &Revocation) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        match entries.entry(revocation.token_id) {
            std::collections::hash_map::Entry::Occupied(_) => Ok(false),
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(entry_from(revocation));
                Ok(true)
            }
        }
    }

    async fn is_revoked(&self, token_id: Uuid) -> Result<bool> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(&token_id)
            .is_some_and(|entry| !entry.is_expired()))
    }

    async fn purge_expired(&self) -> Result<u64> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        Ok((before - entries.len()) as u64)
    }
}

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::domain::{DomainResult, Session, SessionLedger};

/// In-memory session ledger
#[derive(Default)]
pub struct InMemorySessionLedger {
    sessions: DashMap<String, Session>,
}

impl InMemorySessionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionLedger for InMemorySessionLedger {
    async fn open(
        &self,
        user_id: &str,
        ip_address: &str,
        user_agent: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> DomainResult<String> {
        let session = Session::new(user_id, ip_address, user_agent, created_at, expires_at);
        let id = session.id.clone();
        self.sessions.insert(id.clone(), session);
        Ok(id)
    }

    async fn close(&self, session_id: &str) -> DomainResult<()> {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.ended_at.get_or_insert_with(Utc::now);
        }
        Ok(())
    }

    async fn close_all_for_user(&self, user_id: &str) -> DomainResult<u64> {
        let now = Utc::now();
        let mut closed = 0;
        for mut entry in self.sessions.iter_mut() {
            if entry.user_id == user_id && entry.ended_at.is_none() {
                entry.ended_at = Some(now);
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn get(&self, session_id: &str) -> DomainResult<Option<Session>> {
        Ok(self.sessions.get(session_id).map(|s| s.clone()))
    }

    async fn list_live(&self, user_id: &str, now: DateTime<Utc>) -> DomainResult<Vec<Session>> {
        let mut live: Vec<Session> = self
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.is_live_at(now))
            .map(|s| s.value().clone())
            .collect();
        live.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(live)
    }

    async fn count_online_users(&self, now: DateTime<Utc>) -> DomainResult<u64> {
        let users: HashSet<String> = self
            .sessions
            .iter()
            .filter(|s| s.is_live_at(now))
            .map(|s| s.user_id.clone())
            .collect();
        Ok(users.len() as u64)
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> DomainResult<u64> {
        let mut purged = 0u64;
        self.sessions.retain(|_, s| {
            let keep = s.expires_at >= before;
            if !keep {
                purged += 1;
            }
            keep
        });
        Ok(purged)
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Session;
use crate::domain::DomainResult;

/// Authoritative record of which sessions are still usable.
///
/// Independent of token validity: a correctly signed, unexpired token is only
/// honoured while its session is live here.
#[async_trait]
pub trait SessionLedger: Send + Sync {
    /// Persists a new session and returns its id.
    async fn open(
        &self,
        user_id: &str,
        ip_address: &str,
        user_agent: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> DomainResult<String>;

    /// Marks a session ended. Unknown or already-ended ids are not an error.
    async fn close(&self, session_id: &str) -> DomainResult<()>;

    /// Ends every open session of `user_id`, returning how many were closed.
    async fn close_all_for_user(&self, user_id: &str) -> DomainResult<u64>;

    async fn get(&self, session_id: &str) -> DomainResult<Option<Session>>;

    /// Sessions of `user_id` that are live at `now`.
    async fn list_live(&self, user_id: &str, now: DateTime<Utc>) -> DomainResult<Vec<Session>>;

    /// Number of distinct users holding at least one live session.
    async fn count_online_users(&self, now: DateTime<Utc>) -> DomainResult<u64>;

    /// Deletes rows that expired before `before`. Returns rows removed.
    async fn purge_expired(&self, before: DateTime<Utc>) -> DomainResult<u64>;

    async fn is_live_at(&self, session_id: &str, now: DateTime<Utc>) -> DomainResult<bool> {
        Ok(self
            .get(session_id)
            .await?
            .is_some_and(|s| s.is_live_at(now)))
    }

    async fn is_live(&self, session_id: &str) -> DomainResult<bool> {
        self.is_live_at(session_id, Utc::now()).await
    }
}

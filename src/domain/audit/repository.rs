use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::SecurityEvent;
use crate::domain::DomainResult;

/// Persistence port for the security audit trail.
#[async_trait]
pub trait SecurityEventLog: Send + Sync {
    async fn append(&self, event: SecurityEvent) -> DomainResult<()>;

    /// Newest first, at most `limit` rows.
    async fn recent(&self, limit: u64) -> DomainResult<Vec<SecurityEvent>>;

    /// Deletes events recorded before `before`. Returns rows removed.
    async fn purge_before(&self, before: DateTime<Utc>) -> DomainResult<u64>;
}

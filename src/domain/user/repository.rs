use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::User;
use crate::domain::DomainResult;

/// Persistence port for operator accounts.
///
/// Uniqueness of `username` and `email` is enforced by the store and reported
/// as [`DomainError::Conflict`](crate::domain::DomainError::Conflict). Emails
/// are stored lowercased, so uniqueness ignores case on every backend.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> DomainResult<Option<User>>;
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<User>>;
    async fn insert(&self, user: User) -> DomainResult<User>;
    /// Replaces the stored record with `user`. Returns `NotFound` for unknown ids.
    async fn update(&self, user: User) -> DomainResult<User>;
    async fn list(&self) -> DomainResult<Vec<User>>;
    /// Stamps `last_login_at` and `updated_at` on an active account and
    /// writes nothing else. `false` when the account is missing or inactive.
    async fn record_login(&self, user_id: &str, at: DateTime<Utc>) -> DomainResult<bool>;
}

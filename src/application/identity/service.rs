//! User management service: application-layer orchestration
//!
//! HTTP handlers are thin wrappers that delegate here.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};
use validator::ValidateEmail;

use crate::application::auth::{AuthError, AuthResult, Identity};
use crate::domain::{
    CredentialStore, DomainError, DomainResult, Session, SessionLedger, UpdateUserDto, User,
    UserRole, UserStats,
};
use crate::infrastructure::crypto::password::{hash_password_with_cost, verify_password};
use crate::shared::{message_of, validate_password_strength, validate_username};

/// Input for [`UserService::create_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
}

pub struct UserService {
    users: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionLedger>,
    bcrypt_cost: u32,
}

impl UserService {
    pub fn new(users: Arc<dyn CredentialStore>, sessions: Arc<dyn SessionLedger>) -> Self {
        Self {
            users,
            sessions,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Override the bcrypt work factor (tests use the minimum).
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    // ── Accounts ────────────────────────────────────────────────

    pub async fn create_user(&self, input: NewUser) -> DomainResult<User> {
        validate_username(&input.username).map_err(|e| DomainError::Validation(message_of(&e)))?;
        check_email(&input.email)?;
        validate_password_strength(&input.password)
            .map_err(|e| DomainError::Validation(message_of(&e)))?;

        let hash = self.hash(input.password).await?;
        let user = self
            .users
            .insert(User::new(input.username, input.email, hash, input.role))
            .await?;

        info!(user_id = %user.id, username = %user.username, role = %user.role, "User created");
        Ok(user)
    }

    /// Seed an account without the password policy. Used for the bootstrap admin.
    pub async fn ensure_user(&self, input: NewUser) -> DomainResult<Option<User>> {
        if self.users.find_by_username(&input.username).await?.is_some() {
            return Ok(None);
        }
        let hash = self.hash(input.password).await?;
        let user = self
            .users
            .insert(User::new(input.username, input.email, hash, input.role))
            .await?;
        Ok(Some(user))
    }

    pub async fn get_user(&self, id: &str) -> DomainResult<User> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::user_not_found(id))
    }

    pub async fn list_users(&self) -> DomainResult<Vec<User>> {
        self.users.list().await
    }

    /// Apply an administrative update. Deactivation ends every session of the user.
    pub async fn update_user(&self, id: &str, dto: UpdateUserDto) -> DomainResult<User> {
        if dto.is_empty() {
            return Err(DomainError::Validation("no fields to update".into()));
        }
        let mut user = self.get_user(id).await?;

        if let Some(email) = dto.email {
            check_email(&email)?;
            user.email = email;
        }
        if let Some(role) = dto.role {
            user.role = role;
        }
        let deactivating = dto.is_active == Some(false) && user.is_active;
        if let Some(active) = dto.is_active {
            user.is_active = active;
        }
        user.updated_at = Utc::now();

        let user = self.users.update(user).await?;
        if deactivating {
            self.revoke_all(&user.id).await?;
        }
        info!(user_id = %user.id, "User updated");
        Ok(user)
    }

    /// Soft delete. Admin accounts cannot be deactivated this way.
    pub async fn deactivate_user(&self, id: &str) -> DomainResult<User> {
        let user = self.get_user(id).await?;
        if user.is_admin() {
            return Err(DomainError::Validation(
                "admin accounts cannot be deactivated".into(),
            ));
        }
        self.update_user(
            id,
            UpdateUserDto {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn stats(&self) -> DomainResult<UserStats> {
        let users = self.users.list().await?;
        let now = Utc::now();
        let since = |d: Duration| users.iter().filter(|u| u.created_at > now - d).count() as u64;
        let with_role = |r: UserRole| users.iter().filter(|u| u.role == r).count() as u64;

        Ok(UserStats {
            total_users: users.len() as u64,
            active_users: users.iter().filter(|u| u.is_active).count() as u64,
            online_users: self.sessions.count_online_users(now).await?,
            admin_users: with_role(UserRole::Admin),
            operator_users: with_role(UserRole::Operator),
            viewer_users: with_role(UserRole::Viewer),
            last_24_hours: since(Duration::hours(24)),
            last_7_days: since(Duration::days(7)),
            last_30_days: since(Duration::days(30)),
        })
    }

    // ── Profile ─────────────────────────────────────────────────

    pub async fn update_email(&self, user_id: &str, email: String) -> DomainResult<User> {
        self.update_user(
            user_id,
            UpdateUserDto {
                email: Some(email),
                ..Default::default()
            },
        )
        .await
    }

    /// Change the caller's password after verifying the current one. Every
    /// other session of the user is ended; `keep_session` survives.
    pub async fn change_password(
        &self,
        user_id: &str,
        keep_session: &str,
        current_password: &str,
        new_password: &str,
    ) -> DomainResult<u64> {
        let mut user = self.get_user(user_id).await?;

        let hash = user.password_hash.clone();
        let current = current_password.to_owned();
        let matches = tokio::task::spawn_blocking(move || verify_password(&current, &hash))
            .await
            .map_err(|e| DomainError::Storage(e.to_string()))?
            .unwrap_or(false);
        if !matches {
            warn!(target: "security", user_id, "password change rejected: wrong current password");
            return Err(DomainError::Validation("current password is incorrect".into()));
        }
        validate_password_strength(new_password)
            .map_err(|e| DomainError::Validation(format!("new {}", message_of(&e))))?;

        user.password_hash = self.hash(new_password.to_owned()).await?;
        user.updated_at = Utc::now();
        self.users.update(user).await?;

        let mut closed = 0;
        for session in self.sessions.list_live(user_id, Utc::now()).await? {
            if session.id != keep_session {
                self.sessions.close(&session.id).await?;
                closed += 1;
            }
        }
        info!(target: "security", user_id, other_sessions_closed = closed, "Password changed");
        Ok(closed)
    }

    // ── Sessions ────────────────────────────────────────────────

    pub async fn live_sessions(&self, user_id: &str) -> DomainResult<Vec<Session>> {
        self.sessions.list_live(user_id, Utc::now()).await
    }

    /// Owners may end their own sessions, admins any. Unknown ids succeed.
    pub async fn end_session(&self, actor: &Identity, session_id: &str) -> AuthResult<()> {
        let Some(session) = self.sessions.get(session_id).await? else {
            return Ok(());
        };
        if session.user_id != actor.user_id && !actor.is_admin() {
            warn!(
                target: "security",
                user_id = %actor.user_id,
                session_id,
                "attempt to end another user's session"
            );
            return Err(AuthError::Forbidden);
        }
        self.sessions.close(session_id).await?;
        info!(target: "security", user_id = %actor.user_id, session_id, owner = %session.user_id, "Session ended");
        Ok(())
    }

    async fn revoke_all(&self, user_id: &str) -> DomainResult<()> {
        let closed = self.sessions.close_all_for_user(user_id).await?;
        if closed > 0 {
            info!(target: "security", user_id, sessions = closed, "Sessions revoked");
        }
        Ok(())
    }

    async fn hash(&self, password: String) -> DomainResult<String> {
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || hash_password_with_cost(&password, cost))
            .await
            .map_err(|e| DomainError::Storage(e.to_string()))?
            .map_err(|e| DomainError::Storage(format!("failed to hash password: {e}")))
    }
}

fn check_email(email: &str) -> DomainResult<()> {
    if email.validate_email() {
        Ok(())
    } else {
        Err(DomainError::Validation("invalid email".into()))
    }
}

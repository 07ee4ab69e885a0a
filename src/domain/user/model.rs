//! User aggregate root

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Operator role. Ordered from most to least privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Operator,
    #[default]
    Viewer,
}

/// Actions gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ViewDashboard,
    ViewSystemStats,
    ViewLogs,
    ManageService,
    ManageBackups,
    ManageUsers,
    ManageSessions,
    ViewSecurityEvents,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Operator => "operator",
            Self::Viewer => "viewer",
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        use Permission::*;
        match self {
            Self::Admin => true,
            Self::Operator => matches!(
                permission,
                ViewDashboard | ViewSystemStats | ViewLogs | ManageService | ManageBackups
            ),
            Self::Viewer => matches!(permission, ViewDashboard | ViewSystemStats | ViewLogs),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "operator" => Ok(Self::Operator),
            "viewer" => Ok(Self::Viewer),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Operator account.
///
/// `username` is fixed at creation. Accounts are never hard-deleted; they are
/// deactivated by clearing `is_active`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        role: UserRole,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            role,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_has_every_permission() {
        for p in [
            Permission::ViewDashboard,
            Permission::ManageService,
            Permission::ManageUsers,
            Permission::ManageSessions,
            Permission::ViewSecurityEvents,
        ] {
            assert!(UserRole::Admin.has_permission(p));
        }
    }

    #[test]
    fn operator_cannot_manage_users() {
        assert!(UserRole::Operator.has_permission(Permission::ManageService));
        assert!(!UserRole::Operator.has_permission(Permission::ManageUsers));
        assert!(!UserRole::Operator.has_permission(Permission::ManageSessions));
        assert!(!UserRole::Operator.has_permission(Permission::ViewSecurityEvents));
    }

    #[test]
    fn viewer_is_read_only() {
        assert!(UserRole::Viewer.has_permission(Permission::ViewSystemStats));
        assert!(!UserRole::Viewer.has_permission(Permission::ManageService));
        assert!(!UserRole::Viewer.has_permission(Permission::ManageBackups));
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Admin".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert_eq!("operator".parse::<UserRole>().unwrap(), UserRole::Operator);
        assert!("root".parse::<UserRole>().is_err());
    }

    #[test]
    fn new_user_is_active_without_last_login() {
        let user = User::new("alice", "alice@example.com", "hash", UserRole::Viewer);
        assert!(user.is_active);
        assert!(user.last_login_at.is_none());
        assert_eq!(user.created_at, user.updated_at);
        assert!(!user.is_admin());
    }
}

//! User DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::domain::{UpdateUserDto, User, UserRole, UserStats};
use crate::shared::{validate_password_strength, validate_username};

/// User API representation. The password hash never leaves the server.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserDto {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<User> for UserDto {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            role: u.role,
            active: u.is_active,
            created_at: u.created_at,
            updated_at: u.updated_at,
            last_login: u.last_login_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,
    #[serde(default)]
    pub role: UserRole,
}

/// Username is immutable and therefore absent.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: Option<String>,
    pub role: Option<UserRole>,
    pub active: Option<bool>,
}

impl From<UpdateUserRequest> for UpdateUserDto {
    fn from(r: UpdateUserRequest) -> Self {
        Self {
            email: r.email,
            role: r.role,
            is_active: r.active,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserStatsDto {
    pub total_users: u64,
    pub active_users: u64,
    pub online_users: u64,
    pub admin_users: u64,
    pub operator_users: u64,
    pub viewer_users: u64,
    pub last_24_hours: u64,
    pub last_7_days: u64,
    pub last_30_days: u64,
}

impl From<UserStats> for UserStatsDto {
    fn from(s: UserStats) -> Self {
        Self {
            total_users: s.total_users,
            active_users: s.active_users,
            online_users: s.online_users,
            admin_users: s.admin_users,
            operator_users: s.operator_users,
            viewer_users: s.viewer_users,
            last_24_hours: s.last_24_hours,
            last_7_days: s.last_7_days,
            last_30_days: s.last_30_days,
        }
    }
}

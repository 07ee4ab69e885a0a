use super::UserRole;

/// Fields an administrator may change on an existing account.
///
/// The username is not part of this DTO: it is immutable once set.
#[derive(Debug, Clone, Default)]
pub struct UpdateUserDto {
    pub email: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

impl UpdateUserDto {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.role.is_none() && self.is_active.is_none()
    }
}

/// Aggregate user counts for the administration dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserStats {
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

//! Login session record

use chrono::{DateTime, Duration, Utc};

/// One authenticated login, owned by a single user.
///
/// `expires_at` is always `created_at + session timeout`. A session is dead
/// once `ended_at` is set or `expires_at` has passed, whether or not the row
/// is still stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(
        user_id: impl Into<String>,
        ip_address: impl Into<String>,
        user_agent: impl Into<String>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
            created_at,
            expires_at,
            ended_at: None,
        }
    }

    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.ended_at.is_none() && now < self.expires_at
    }

    pub fn is_live(&self) -> bool {
        self.is_live_at(Utc::now())
    }

    /// Remaining lifetime, zero once dead.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        if self.is_live_at(now) {
            self.expires_at - now
        } else {
            Duration::zero()
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{SecurityEvent, SecurityEventKind, Severity};

#[derive(Debug, Serialize, ToSchema)]
pub struct SecurityEventDto {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SecurityEventKind,
    pub severity: Severity,
    pub message: String,
    pub user_id: Option<String>,
    pub ip: String,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
}

impl From<SecurityEvent> for SecurityEventDto {
    fn from(e: SecurityEvent) -> Self {
        Self {
            id: e.id,
            kind: e.kind,
            severity: e.severity,
            message: e.message,
            user_id: e.user_id,
            ip: e.ip_address,
            user_agent: e.user_agent,
            timestamp: e.created_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SecurityEventParams {
    /// Maximum events to return, newest first (1-1000)
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    100
}

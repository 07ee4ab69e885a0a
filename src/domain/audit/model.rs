//! Security audit record

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    LoginSuccess,
    LoginFailed,
    Logout,
    /// The access gate refused a request (bad token, revoked session, blocked address).
    AccessDenied,
    /// A client exceeded the rate limit and was temporarily banned.
    ClientBanned,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginSuccess => "login_success",
            Self::LoginFailed => "login_failed",
            Self::Logout => "logout",
            Self::AccessDenied => "access_denied",
            Self::ClientBanned => "client_banned",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::LoginSuccess | Self::Logout => Severity::Info,
            Self::LoginFailed | Self::AccessDenied | Self::ClientBanned => Severity::Warning,
        }
    }
}

impl fmt::Display for SecurityEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login_success" => Ok(Self::LoginSuccess),
            "login_failed" => Ok(Self::LoginFailed),
            "logout" => Ok(Self::Logout),
            "access_denied" => Ok(Self::AccessDenied),
            "client_banned" => Ok(Self::ClientBanned),
            other => Err(format!("unknown security event type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// One security-relevant occurrence. Append-only; rows leave the trail only
/// through retention purges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityEvent {
    pub id: String,
    pub kind: SecurityEventKind,
    pub severity: Severity,
    pub message: String,
    /// Set when the actor is known.
    pub user_id: Option<String>,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(kind: SecurityEventKind, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            severity: kind.severity(),
            message: message.into(),
            user_id: None,
            ip_address: String::new(),
            user_agent: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn by_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn from_client(mut self, ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        self.ip_address = ip.into();
        self.user_agent = user_agent.into();
        self
    }
}

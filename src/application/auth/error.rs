//! Authentication and access-control failures

use thiserror::Error;

use crate::domain::DomainError;
use crate::shared::DeadlineExceeded;

/// Every way the auth core can refuse a caller.
///
/// The HTTP edge maps each variant to exactly one status code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Startup-only. The process must refuse to run.
    #[error("insecure or missing configuration: {0}")]
    Configuration(String),

    #[error("too many requests")]
    RateLimited,

    #[error("client address is not allowed")]
    IpNotAllowed,

    #[error("authentication token required")]
    MissingToken,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    ExpiredToken,

    #[error("session has been revoked")]
    SessionRevoked,

    #[error("invalid username or password")]
    AuthenticationFailed,

    #[error("insufficient permissions")]
    Forbidden,

    #[error("storage unavailable: {0}")]
    Storage(String),
}

impl AuthError {
    /// Stable snake_case label used in error envelopes, logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Configuration(_) => "configuration_error",
            AuthError::RateLimited => "rate_limited",
            AuthError::IpNotAllowed => "ip_not_allowed",
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidToken => "invalid_token",
            AuthError::ExpiredToken => "expired_token",
            AuthError::SessionRevoked => "session_revoked",
            AuthError::AuthenticationFailed => "authentication_failed",
            AuthError::Forbidden => "forbidden",
            AuthError::Storage(_) => "storage_error",
        }
    }
}

impl From<DomainError> for AuthError {
    fn from(err: DomainError) -> Self {
        AuthError::Storage(err.to_string())
    }
}

impl From<DeadlineExceeded> for AuthError {
    fn from(err: DeadlineExceeded) -> Self {
        AuthError::Storage(err.to_string())
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

//! Error envelope returned by every failing endpoint
//!
//! `{"error": "session_revoked", "code": 401, "message": "...", "timestamp": "..."}`

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::application::auth::AuthError;
use crate::domain::DomainError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Stable machine-readable label.
    pub error: String,
    /// Mirrors the HTTP status.
    pub code: u16,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    label: &'static str,
    message: String,
    retry_after: Option<Duration>,
}

impl ApiError {
    pub fn new(status: StatusCode, label: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            label,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::from(AuthError::RateLimited)
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let status = match &err {
            AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::IpNotAllowed | AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::MissingToken
            | AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::SessionRevoked
            | AuthError::AuthenticationFailed => StatusCode::UNAUTHORIZED,
            AuthError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Internal details stay in the logs.
        let message = match &err {
            AuthError::Storage(_) => "storage temporarily unavailable".to_string(),
            AuthError::Configuration(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        Self::new(status, err.reason(), message)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { entity, .. } => Self::new(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("{} not found", entity),
            ),
            DomainError::Conflict(msg) => Self::new(StatusCode::CONFLICT, "conflict", msg),
            DomainError::Validation(msg) => {
                Self::new(StatusCode::BAD_REQUEST, "validation_error", msg)
            }
            DomainError::Storage(msg) => {
                error!(error = %msg, "Storage failure");
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "storage_error",
                    "storage temporarily unavailable",
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.label.to_string(),
            code: self.status.as_u16(),
            message: self.message,
            timestamp: Utc::now(),
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(retry) = self.retry_after {
            let secs = retry.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

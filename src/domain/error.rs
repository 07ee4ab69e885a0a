//! Domain errors

use thiserror::Error;

/// Errors surfaced by the credential store and the session ledger.
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Validation: {0}")]
    Validation(String),

    /// Backing store unavailable or failed mid-operation.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn user_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "User",
            field: "id",
            value: id.into(),
        }
    }

    /// Whether this error points at infrastructure trouble rather than bad input.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

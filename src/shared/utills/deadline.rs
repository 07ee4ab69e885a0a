//! Request-scoped deadlines for storage calls
//!
//! Credential store and session ledger calls may block on I/O. Callers bound
//! them with [`with_deadline`] so a stuck database fails the request instead
//! of hanging it.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// The wrapped operation did not finish in time.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("operation '{operation}' exceeded its {timeout:?} deadline")]
pub struct DeadlineExceeded {
    pub operation: &'static str,
    pub timeout: Duration,
}

/// Run `fut` with an upper bound of `timeout`.
pub async fn with_deadline<F, T>(
    operation: &'static str,
    timeout: Duration,
    fut: F,
) -> Result<T, DeadlineExceeded>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| DeadlineExceeded { operation, timeout })
}

//! In-memory stores for development and testing
//!
//! `DashMap`-backed implementations of the credential store, session ledger
//! and security event log ports. Selected with `database.url = "memory"`.

mod audit;
mod credentials;
mod sessions;

pub use audit::InMemorySecurityEventLog;
pub use credentials::InMemoryCredentialStore;
pub use sessions::InMemorySessionLedger;

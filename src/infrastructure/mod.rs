//! Infrastructure layer: persistence and cryptography

pub mod crypto;
pub mod database;
pub mod memory;

pub use database::{
    init_database, DatabaseConfig, SecurityEventRepository, SessionRepository, UserRepository,
};
pub use memory::{InMemoryCredentialStore, InMemorySecurityEventLog, InMemorySessionLedger};

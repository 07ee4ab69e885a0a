//! Database repository implementations
//!
//! Per-aggregate SeaORM repositories backing the credential store, the
//! session ledger and the security event log ports.

pub mod security_event_repository;
pub mod session_repository;
pub mod user_repository;

pub use security_event_repository::SecurityEventRepository;
pub use session_repository::SessionRepository;
pub use user_repository::UserRepository;

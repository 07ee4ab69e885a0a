//! Domain layer: entities and the persistence ports the auth core depends on.

pub mod audit;
pub mod error;
pub mod session;
pub mod user;

pub use audit::{SecurityEvent, SecurityEventKind, SecurityEventLog, Severity};
pub use error::{DomainError, DomainResult};
pub use session::{Session, SessionLedger};
pub use user::{CredentialStore, Permission, UpdateUserDto, User, UserRole, UserStats};

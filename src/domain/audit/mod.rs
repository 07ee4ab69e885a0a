//! Security audit trail

pub mod model;
pub mod repository;

pub use model::{SecurityEvent, SecurityEventKind, Severity};
pub use repository::SecurityEventLog;

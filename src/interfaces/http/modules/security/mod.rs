//! Security module: the persisted audit trail

pub mod dto;
pub mod handlers;

pub use dto::*;
pub use handlers::*;

//! Users module: account administration (admin only)

pub mod dto;
pub mod handlers;

pub use dto::*;
pub use handlers::*;

//! Sessions module: inspect and end login sessions

pub mod dto;
pub mod handlers;

pub use dto::*;
pub use handlers::*;

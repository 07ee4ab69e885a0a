//! HTTP REST API
//!
//! - `middleware`: rate limiting and the access gate
//! - `modules`: request handlers and DTOs per resource
//! - `router`: route table, shared state and Swagger documentation

pub mod common;
pub mod error;
pub mod middleware;
pub mod modules;
pub mod router;

pub use error::{ApiError, ApiResult};
pub use router::{create_api_router, AppState, Stores};

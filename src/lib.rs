//! # LMS Manager
//!
//! Administrative control plane for a learning-management deployment:
//! credential login, signed session tokens backed by a revocable session
//! ledger, role permissions, per-client rate limiting and IP allow-listing.
//!
//! ## Architecture
//!
//! - **domain**: users, sessions and the storage ports
//! - **application**: the auth core (tokens, limiter, allow-list, gate,
//!   login) plus account management and housekeeping
//! - **infrastructure**: SeaORM/SQLite and in-memory stores, password hashing
//! - **interfaces**: REST API with Swagger documentation
//! - **server**: process lifecycle shared by the CLI and tests

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod server;
pub mod shared;

pub use config::{default_config_path, AppConfig};

pub use infrastructure::{init_database, DatabaseConfig};

pub use interfaces::http::{create_api_router, AppState, Stores};

pub mod auth;
pub mod health;
pub mod metrics;
pub mod profile;
pub mod security;
pub mod sessions;
pub mod users;

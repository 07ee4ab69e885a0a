//! Identity module: account administration, profiles and session control
//!
//! Login/logout live in [`crate::application::auth`]; this module covers
//! everything an operator does to accounts once authenticated.

pub mod service;

pub use service::{NewUser, UserService};

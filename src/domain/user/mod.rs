//! User aggregate
//!
//! Contains the User entity, DTOs, and the credential store interface.

pub mod model;
pub mod repository;

mod dto;

pub use dto::{UpdateUserDto, UserStats};
pub use model::{Permission, User, UserRole};
pub use repository::CredentialStore;

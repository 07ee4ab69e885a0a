//! Database entities module

pub mod security_event;
pub mod user;
pub mod user_session;

pub use security_event::Entity as SecurityEvent;
pub use user::Entity as User;
pub use user_session::Entity as UserSession;

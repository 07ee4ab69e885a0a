pub mod audit;
pub mod auth;
pub mod housekeeping;
pub mod identity;

pub use auth::{
    AccessGate, AuthError, AuthResult, AuthService, ClientInfo, Identity, LoginOutcome,
    RateDecision, RateLimitConfig, RateLimiter, TokenConfig, TokenService,
};
pub use audit::AuditTrail;
pub use housekeeping::{Housekeeper, HousekeepingConfig, SweepReport};
pub use identity::{NewUser, UserService};

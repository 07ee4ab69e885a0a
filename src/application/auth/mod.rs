//! Authentication and access control
//!
//! [`TokenService`] signs and verifies tokens, [`RateLimiter`] bounds per-client
//! throughput, [`AccessGate`] combines them with the IP allow-list and the
//! session ledger, and [`AuthService`] runs the login/logout flows.

pub mod error;
pub mod gate;
pub mod ip_allow;
pub mod login;
pub mod rate_limiter;
pub mod token;

pub use error::{AuthError, AuthResult};
pub use gate::{AccessGate, Identity};
pub use ip_allow::{IpAllowList, IpNet, IpRuleError};
pub use login::{AuthService, ClientInfo, LoginOutcome};
pub use rate_limiter::{RateDecision, RateLimitConfig, RateLimiter};
pub use token::{insecure_secret_reason, IssuedToken, TokenClaims, TokenConfig, TokenService};

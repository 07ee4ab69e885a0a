//! Access policy gate
//!
//! Single decision point for protected requests:
//! rate limit -> IP allow-list -> token -> session ledger -> identity.
//! Every stage short-circuits; no account or session state is written before
//! the chain succeeds. Denials are reported to the audit trail when one is
//! attached.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, warn};

use super::error::{AuthError, AuthResult};
use super::ip_allow::IpAllowList;
use super::rate_limiter::{RateDecision, RateLimiter};
use super::token::TokenService;
use crate::application::audit::AuditTrail;
use crate::domain::{Permission, SecurityEvent, SecurityEventKind, SessionLedger, UserRole};
use crate::shared::with_deadline;

/// Who is calling, attached to the request after the gate admits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    pub role: UserRole,
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn require(&self, permission: Permission) -> AuthResult<()> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            warn!(
                target: "security",
                user_id = %self.user_id,
                role = %self.role,
                ?permission,
                "permission denied"
            );
            metrics::counter!("auth_denials_total", "reason" => "forbidden").increment(1);
            Err(AuthError::Forbidden)
        }
    }
}

pub struct AccessGate {
    tokens: Arc<TokenService>,
    sessions: Arc<dyn SessionLedger>,
    limiter: Arc<RateLimiter>,
    allow_list: IpAllowList,
    storage_timeout: Duration,
    audit: Option<AuditTrail>,
}

impl AccessGate {
    pub fn new(
        tokens: Arc<TokenService>,
        sessions: Arc<dyn SessionLedger>,
        limiter: Arc<RateLimiter>,
        allow_list: IpAllowList,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            tokens,
            sessions,
            limiter,
            allow_list,
            storage_timeout,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditTrail) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// First stage, applied to every request whether authenticated or not.
    pub fn check_rate(&self, client_ip: &str) -> RateDecision {
        let decision = self.limiter.check(client_ip);
        match decision {
            RateDecision::Allowed { .. } => {}
            RateDecision::Limited { retry_after } => {
                warn!(target: "security", ip = %client_ip, retry_after_secs = retry_after.as_secs(), "rate limit exceeded");
                metrics::counter!("rate_limit_rejections_total").increment(1);
                if !self.limiter.config().ban.is_zero() {
                    warn!(target: "security", ip = %client_ip, ban_secs = retry_after.as_secs(), "client temporarily banned");
                    self.report(
                        SecurityEvent::new(
                            SecurityEventKind::ClientBanned,
                            format!(
                                "Client banned for {}s after exceeding the rate limit",
                                retry_after.as_secs()
                            ),
                        )
                        .from_client(client_ip, ""),
                    );
                }
            }
            RateDecision::Banned { .. } => {
                metrics::counter!("rate_limit_rejections_total").increment(1);
            }
        }
        decision
    }

    pub fn check_ip(&self, client_ip: &str) -> AuthResult<()> {
        if self.allow_list.permits(client_ip) {
            Ok(())
        } else {
            Err(self.deny(AuthError::IpNotAllowed, client_ip))
        }
    }

    /// Validate the bearer token and confirm its session is still live.
    pub async fn authenticate(&self, token: Option<&str>) -> AuthResult<Identity> {
        self.authenticate_at(token, Utc::now()).await
    }

    pub async fn authenticate_at(
        &self,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> AuthResult<Identity> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;
        let claims = self.tokens.validate_at(token, now)?;

        let session = with_deadline(
            "session_ledger.get",
            self.storage_timeout,
            self.sessions.get(&claims.sid),
        )
        .await
        .map_err(AuthError::from)
        .and_then(|res| res.map_err(AuthError::from))
        .inspect_err(|e| error!(error = %e, session_id = %claims.sid, "session lookup failed"))?;

        let live = session.is_some_and(|s| s.user_id == claims.sub && s.is_live_at(now));
        if !live {
            return Err(AuthError::SessionRevoked);
        }

        Ok(Identity {
            expires_at: claims.expires_at(),
            user_id: claims.sub,
            username: claims.username,
            role: claims.role,
            session_id: claims.sid,
        })
    }

    /// IP allow-list then token and session. Rate limiting is applied
    /// separately by the caller, once per request.
    pub async fn authorize(&self, client_ip: &str, token: Option<&str>) -> AuthResult<Identity> {
        self.check_ip(client_ip)?;
        self.authenticate(token)
            .await
            .map_err(|e| self.deny(e, client_ip))
    }

    /// The full chain, rate limit included.
    pub async fn admit(&self, client_ip: &str, token: Option<&str>) -> AuthResult<Identity> {
        if !self.check_rate(client_ip).is_allowed() {
            return Err(AuthError::RateLimited);
        }
        self.authorize(client_ip, token).await
    }

    fn deny(&self, err: AuthError, client_ip: &str) -> AuthError {
        if !matches!(err, AuthError::Storage(_)) {
            warn!(target: "security", ip = %client_ip, reason = err.reason(), "request denied");
            metrics::counter!("auth_denials_total", "reason" => err.reason()).increment(1);
            self.report(
                SecurityEvent::new(
                    SecurityEventKind::AccessDenied,
                    format!("Request denied: {}", err.reason()),
                )
                .from_client(client_ip, ""),
            );
        }
        err
    }

    fn report(&self, event: SecurityEvent) {
        if let Some(audit) = &self.audit {
            audit.record(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::application::auth::rate_limiter::RateLimitConfig;
    use crate::application::auth::token::TokenConfig;
    use crate::domain::{DomainError, DomainResult, Session, User};
    use crate::infrastructure::memory::InMemorySessionLedger;

    struct Fixture {
        gate: AccessGate,
        tokens: Arc<TokenService>,
        ledger: Arc<InMemorySessionLedger>,
    }

    fn fixture(limit: u32, allowed: &[&str]) -> Fixture {
        let tokens = Arc::new(
            TokenService::new(TokenConfig {
                secret: "gate-test-secret-value".into(),
                session_timeout: Duration::from_secs(600),
            })
            .unwrap(),
        );
        let ledger = Arc::new(InMemorySessionLedger::new());
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            limit,
            ..Default::default()
        }));
        let gate = AccessGate::new(
            tokens.clone(),
            ledger.clone(),
            limiter,
            IpAllowList::parse(allowed).unwrap(),
            Duration::from_secs(1),
        );
        Fixture { gate, tokens, ledger }
    }

    async fn login(fx: &Fixture, user: &User) -> (String, String) {
        let now = Utc::now();
        let sid = fx
            .ledger
            .open(&user.id, "127.0.0.1", "test", now, fx.tokens.expiry_for(now))
            .await
            .unwrap();
        let issued = fx.tokens.issue_at(user, &sid, now).unwrap();
        (sid, issued.token)
    }

    fn admin() -> User {
        User::new("admin", "admin@localhost", "hash", UserRole::Admin)
    }

    #[tokio::test]
    async fn admits_live_session() {
        let fx = fixture(100, &[]);
        let user = admin();
        let (sid, token) = login(&fx, &user).await;

        let identity = fx.gate.admit("127.0.0.1", Some(&token)).await.unwrap();
        assert_eq!(identity.user_id, user.id);
        assert_eq!(identity.username, "admin");
        assert_eq!(identity.session_id, sid);
        assert!(identity.is_admin());
    }

    #[tokio::test]
    async fn closed_session_is_revoked_while_token_still_validates() {
        let fx = fixture(100, &[]);
        let (sid, token) = login(&fx, &admin()).await;

        fx.ledger.close(&sid).await.unwrap();

        assert!(fx.tokens.validate(&token).is_ok());
        assert!(!fx.ledger.is_live(&sid).await.unwrap());
        assert_eq!(
            fx.gate.admit("127.0.0.1", Some(&token)).await,
            Err(AuthError::SessionRevoked)
        );
    }

    #[tokio::test]
    async fn token_failures_map_to_their_kind() {
        let fx = fixture(100, &[]);
        assert_eq!(fx.gate.admit("1.1.1.1", None).await, Err(AuthError::MissingToken));
        assert_eq!(fx.gate.admit("1.1.1.1", Some("  ")).await, Err(AuthError::MissingToken));
        assert_eq!(
            fx.gate.admit("1.1.1.1", Some("garbage")).await,
            Err(AuthError::InvalidToken)
        );

        let (_, token) = login(&fx, &admin()).await;
        let later = Utc::now() + chrono::Duration::seconds(601);
        assert_eq!(
            fx.gate.authenticate_at(Some(&token), later).await,
            Err(AuthError::ExpiredToken)
        );
    }

    #[tokio::test]
    async fn session_of_another_user_is_rejected() {
        let fx = fixture(100, &[]);
        let victim = admin();
        let (victim_sid, _) = login(&fx, &victim).await;

        // A validly signed token pointing at someone else's session.
        let attacker = User::new("mallory", "m@example.com", "hash", UserRole::Viewer);
        let token = fx.tokens.issue(&attacker, &victim_sid).unwrap().token;
        assert_eq!(
            fx.gate.admit("1.1.1.1", Some(&token)).await,
            Err(AuthError::SessionRevoked)
        );
    }

    #[tokio::test]
    async fn ip_check_runs_before_token_parsing() {
        let fx = fixture(100, &["10.0.0.0/8"]);
        assert_eq!(
            fx.gate.admit("192.168.0.1", Some("garbage")).await,
            Err(AuthError::IpNotAllowed)
        );
        assert_eq!(
            fx.gate.admit("10.1.1.1", Some("garbage")).await,
            Err(AuthError::InvalidToken)
        );
    }

    #[tokio::test]
    async fn rate_limit_runs_first() {
        let fx = fixture(2, &["10.0.0.0/8"]);
        assert_eq!(fx.gate.admit("8.8.8.8", None).await, Err(AuthError::IpNotAllowed));
        assert_eq!(fx.gate.admit("8.8.8.8", None).await, Err(AuthError::IpNotAllowed));
        assert_eq!(fx.gate.admit("8.8.8.8", None).await, Err(AuthError::RateLimited));
    }

    #[tokio::test]
    async fn permissions_follow_role() {
        let identity = Identity {
            user_id: "u".into(),
            username: "v".into(),
            role: UserRole::Viewer,
            session_id: "s".into(),
            expires_at: Utc::now(),
        };
        assert!(identity.require(Permission::ViewDashboard).is_ok());
        assert_eq!(identity.require(Permission::ManageUsers), Err(AuthError::Forbidden));
    }

    struct FailingLedger;

    #[async_trait]
    impl SessionLedger for FailingLedger {
        async fn open(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> DomainResult<String> {
            Err(DomainError::Storage("down".into()))
        }
        async fn close(&self, _: &str) -> DomainResult<()> {
            Err(DomainError::Storage("down".into()))
        }
        async fn close_all_for_user(&self, _: &str) -> DomainResult<u64> {
            Err(DomainError::Storage("down".into()))
        }
        async fn get(&self, _: &str) -> DomainResult<Option<Session>> {
            std::future::pending::<()>().await;
            Ok(None)
        }
        async fn list_live(&self, _: &str, _: DateTime<Utc>) -> DomainResult<Vec<Session>> {
            Ok(Vec::new())
        }
        async fn count_online_users(&self, _: DateTime<Utc>) -> DomainResult<u64> {
            Ok(0)
        }
        async fn purge_expired(&self, _: DateTime<Utc>) -> DomainResult<u64> {
            Ok(0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_ledger_becomes_storage_error() {
        let tokens = Arc::new(
            TokenService::new(TokenConfig {
                secret: "gate-test-secret-value".into(),
                session_timeout: Duration::from_secs(600),
            })
            .unwrap(),
        );
        let gate = AccessGate::new(
            tokens.clone(),
            Arc::new(FailingLedger),
            Arc::new(RateLimiter::new(RateLimitConfig::default())),
            IpAllowList::default(),
            Duration::from_millis(200),
        );
        let token = tokens.issue(&admin(), "sid").unwrap().token;

        let result = gate.admit("127.0.0.1", Some(&token)).await;
        assert!(matches!(result, Err(AuthError::Storage(_))));
    }

    #[tokio::test]
    async fn denials_and_bans_reach_the_audit_trail() {
        use crate::application::audit::test_support::wait_for_events;
        use crate::infrastructure::memory::InMemorySecurityEventLog;

        let log = Arc::new(InMemorySecurityEventLog::new());
        let (audit, _writer) = AuditTrail::start(log.clone(), Duration::from_secs(1));
        let fx = fixture(100, &["10.0.0.0/8"]);
        let user = admin();
        let (_, token) = login(&fx, &user).await;
        let gate = AccessGate::new(
            fx.tokens.clone(),
            fx.ledger.clone(),
            Arc::new(RateLimiter::new(RateLimitConfig {
                limit: 1,
                window: Duration::from_secs(60),
                ban: Duration::from_secs(300),
            })),
            IpAllowList::parse(&["10.0.0.0/8"]).unwrap(),
            Duration::from_secs(1),
        )
        .with_audit(audit);

        assert!(gate.admit("10.0.0.1", Some(&token)).await.is_ok());
        assert_eq!(
            gate.authorize("192.168.0.9", Some(&token)).await,
            Err(AuthError::IpNotAllowed)
        );
        assert_eq!(gate.admit("10.0.0.1", Some(&token)).await, Err(AuthError::RateLimited));

        let events = wait_for_events(log.as_ref(), 2).await;
        let mut kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        kinds.sort_by_key(|k| k.as_str());
        assert_eq!(
            kinds,
            vec![SecurityEventKind::AccessDenied, SecurityEventKind::ClientBanned]
        );
        let denied = events
            .iter()
            .find(|e| e.kind == SecurityEventKind::AccessDenied)
            .unwrap();
        assert_eq!(denied.ip_address, "192.168.0.9");
        assert_eq!(denied.message, "Request denied: ip_not_allowed");
    }
}

//! Login and logout flows

use std::sync::Arc;
use std::time::Duration;

use chrono::{SubsecRound, Utc};
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use super::error::{AuthError, AuthResult};
use super::gate::Identity;
use super::token::{IssuedToken, TokenService};
use crate::application::audit::AuditTrail;
use crate::domain::{CredentialStore, SecurityEvent, SecurityEventKind, SessionLedger, User};
use crate::infrastructure::crypto::password::{dummy_hash, verify_password};
use crate::shared::with_deadline;

/// Where a request came from.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: IssuedToken,
    pub session_id: String,
    pub expires_in: i64,
    pub user: User,
}

pub struct AuthService {
    users: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionLedger>,
    tokens: Arc<TokenService>,
    storage_timeout: Duration,
    bcrypt_cost: u32,
    dummy: OnceCell<String>,
    audit: Option<AuditTrail>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionLedger>,
        tokens: Arc<TokenService>,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            tokens,
            storage_timeout,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            dummy: OnceCell::new(),
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditTrail) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Must match the cost used for stored hashes so unknown-user logins take
    /// as long as real ones.
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    async fn dummy(&self) -> AuthResult<String> {
        let cost = self.bcrypt_cost;
        self.dummy
            .get_or_try_init(|| async move {
                tokio::task::spawn_blocking(move || dummy_hash(cost))
                    .await
                    .map_err(|e| AuthError::Configuration(e.to_string()))?
                    .map_err(|e| AuthError::Configuration(format!("bcrypt: {e}")))
            })
            .await
            .cloned()
    }

    /// Verify credentials, open a ledger session, then mint its token.
    ///
    /// Unknown user, inactive user and wrong password are indistinguishable
    /// to the caller: all yield [`AuthError::AuthenticationFailed`] after the
    /// same amount of bcrypt work.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        client: &ClientInfo,
    ) -> AuthResult<LoginOutcome> {
        let found = self
            .storage("credential_store.find_by_username", self.users.find_by_username(username))
            .await?;

        let candidate = found.filter(|u| u.is_active);
        let (hash, real) = match &candidate {
            Some(user) => (user.password_hash.clone(), true),
            None => (self.dummy().await?, false),
        };
        let password = password.to_owned();
        let verified = tokio::task::spawn_blocking(move || {
            let matched = verify_password(&password, &hash).unwrap_or(false);
            real && matched
        })
        .await
        .map_err(|e| AuthError::Storage(format!("password verification task failed: {e}")))?;

        let user = match candidate {
            Some(user) if verified => user,
            _ => {
                warn!(
                    target: "security",
                    username = %username,
                    ip = %client.ip,
                    user_agent = %client.user_agent,
                    "login failed"
                );
                self.login_failed(username, client);
                return Err(AuthError::AuthenticationFailed);
            }
        };

        let issued_at = Utc::now().trunc_subsecs(0);
        let expires_at = self.tokens.expiry_for(issued_at);
        let session_id = self
            .storage(
                "session_ledger.open",
                self.sessions
                    .open(&user.id, &client.ip, &client.user_agent, issued_at, expires_at),
            )
            .await?;

        // Stamping the login doubles as a re-check: an account deactivated
        // while bcrypt ran is refused and its fresh session closed.
        let still_active = self
            .storage(
                "credential_store.record_login",
                self.users.record_login(&user.id, issued_at),
            )
            .await;
        match still_active {
            Ok(true) => {}
            Ok(false) => {
                self.abandon_session(&session_id).await;
                warn!(
                    target: "security",
                    username = %username,
                    ip = %client.ip,
                    "login refused: account deactivated during login"
                );
                self.login_failed(username, client);
                return Err(AuthError::AuthenticationFailed);
            }
            Err(e) => {
                self.abandon_session(&session_id).await;
                return Err(e);
            }
        }

        let token = match self.tokens.issue_at(&user, &session_id, issued_at) {
            Ok(token) => token,
            Err(e) => {
                self.abandon_session(&session_id).await;
                return Err(e);
            }
        };

        let user = User {
            last_login_at: Some(issued_at),
            updated_at: issued_at,
            ..user
        };

        info!(
            target: "security",
            user_id = %user.id,
            username = %user.username,
            session_id = %session_id,
            ip = %client.ip,
            user_agent = %client.user_agent,
            "login succeeded"
        );
        metrics::counter!("auth_logins_total", "outcome" => "success").increment(1);
        self.report(
            SecurityEvent::new(
                SecurityEventKind::LoginSuccess,
                format!("User logged in: {}", user.username),
            )
            .by_user(&user.id)
            .from_client(&client.ip, &client.user_agent),
        );

        Ok(LoginOutcome {
            expires_in: self.tokens.session_timeout().num_seconds(),
            token,
            session_id,
            user,
        })
    }

    /// End the caller's session. The token stays cryptographically valid but
    /// the gate will refuse it from now on.
    pub async fn logout(&self, identity: &Identity, client: &ClientInfo) -> AuthResult<()> {
        self.storage("session_ledger.close", self.sessions.close(&identity.session_id))
            .await?;
        info!(
            target: "security",
            user_id = %identity.user_id,
            session_id = %identity.session_id,
            ip = %client.ip,
            "logout"
        );
        self.report(
            SecurityEvent::new(
                SecurityEventKind::Logout,
                format!("User logged out: {}", identity.username),
            )
            .by_user(&identity.user_id)
            .from_client(&client.ip, &client.user_agent),
        );
        Ok(())
    }

    fn login_failed(&self, username: &str, client: &ClientInfo) {
        metrics::counter!("auth_logins_total", "outcome" => "failure").increment(1);
        self.report(
            SecurityEvent::new(
                SecurityEventKind::LoginFailed,
                format!("Login failed for user: {}", username),
            )
            .from_client(&client.ip, &client.user_agent),
        );
    }

    fn report(&self, event: SecurityEvent) {
        if let Some(audit) = &self.audit {
            audit.record(event);
        }
    }

    async fn abandon_session(&self, session_id: &str) {
        if let Err(e) = self.sessions.close(session_id).await {
            error!(error = %e, session_id = %session_id, "failed to close orphaned session");
        }
    }

    async fn storage<T>(
        &self,
        operation: &'static str,
        fut: impl std::future::Future<Output = crate::domain::DomainResult<T>>,
    ) -> AuthResult<T> {
        match with_deadline(operation, self.storage_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(operation, error = %e, "storage failure during authentication");
                Err(e.into())
            }
            Err(e) => {
                error!(operation, error = %e, "storage timeout during authentication");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::auth::token::TokenConfig;
    use crate::domain::{DomainResult, UserRole};
    use crate::infrastructure::crypto::password::hash_password_with_cost;
    use crate::infrastructure::memory::{InMemoryCredentialStore, InMemorySessionLedger};

    struct Fixture {
        auth: AuthService,
        users: Arc<InMemoryCredentialStore>,
        ledger: Arc<InMemorySessionLedger>,
        tokens: Arc<TokenService>,
    }

    async fn fixture() -> Fixture {
        let users = Arc::new(InMemoryCredentialStore::new());
        let ledger = Arc::new(InMemorySessionLedger::new());
        let tokens = Arc::new(
            TokenService::new(TokenConfig {
                secret: "login-test-secret".into(),
                session_timeout: Duration::from_secs(3600),
            })
            .unwrap(),
        );

        let hash = hash_password_with_cost("admin123", 4).unwrap();
        users
            .insert(User::new("admin", "admin@localhost", hash.clone(), UserRole::Admin))
            .await
            .unwrap();
        let mut disabled = User::new("ghost", "ghost@localhost", hash, UserRole::Viewer);
        disabled.is_active = false;
        users.insert(disabled).await.unwrap();

        let auth = AuthService::new(
            users.clone(),
            ledger.clone(),
            tokens.clone(),
            Duration::from_secs(2),
        )
        .with_bcrypt_cost(4);
        Fixture {
            auth,
            users,
            ledger,
            tokens,
        }
    }

    fn client() -> ClientInfo {
        ClientInfo {
            ip: "127.0.0.1".into(),
            user_agent: "unit-test".into(),
        }
    }

    #[tokio::test]
    async fn successful_login_opens_matching_session() {
        let fx = fixture().await;
        let out = fx.auth.login("admin", "admin123", &client()).await.unwrap();

        let claims = fx.tokens.validate(&out.token.token).unwrap();
        assert_eq!(claims.sid, out.session_id);
        assert_eq!(claims.sub, out.user.id);
        assert_eq!(out.expires_in, 3600);

        let session = fx.ledger.get(&out.session_id).await.unwrap().unwrap();
        assert_eq!(session.created_at, out.token.issued_at);
        assert_eq!(session.expires_at, out.token.expires_at);
        assert_eq!(session.ip_address, "127.0.0.1");
        assert_eq!(session.user_agent, "unit-test");
        assert!(session.is_live());

        let stored = fx.users.find_by_username("admin").await.unwrap().unwrap();
        assert_eq!(stored.last_login_at, Some(out.token.issued_at));
    }

    #[tokio::test]
    async fn failures_are_indistinguishable() {
        let fx = fixture().await;
        let wrong_pw = fx.auth.login("admin", "nope", &client()).await.unwrap_err();
        let unknown = fx.auth.login("nobody", "admin123", &client()).await.unwrap_err();
        let inactive = fx.auth.login("ghost", "admin123", &client()).await.unwrap_err();

        assert_eq!(wrong_pw, AuthError::AuthenticationFailed);
        assert_eq!(unknown, wrong_pw);
        assert_eq!(inactive, wrong_pw);
        assert!(fx.ledger.is_empty());
    }

    #[tokio::test]
    async fn logout_closes_only_that_session() {
        let fx = fixture().await;
        let first = fx.auth.login("admin", "admin123", &client()).await.unwrap();
        let second = fx.auth.login("admin", "admin123", &client()).await.unwrap();

        let identity = Identity {
            user_id: first.user.id.clone(),
            username: first.user.username.clone(),
            role: first.user.role,
            session_id: first.session_id.clone(),
            expires_at: first.token.expires_at,
        };
        fx.auth.logout(&identity, &client()).await.unwrap();
        fx.auth.logout(&identity, &client()).await.unwrap();

        assert!(!fx.ledger.is_live(&first.session_id).await.unwrap());
        assert!(fx.ledger.is_live(&second.session_id).await.unwrap());
    }

    #[tokio::test]
    async fn logins_and_logouts_are_audited() {
        use crate::application::audit::test_support::wait_for_events;
        use crate::domain::SecurityEventLog;
        use crate::infrastructure::memory::InMemorySecurityEventLog;

        let fx = fixture().await;
        let log = Arc::new(InMemorySecurityEventLog::new());
        let (audit, _writer) = AuditTrail::start(log.clone(), Duration::from_secs(1));
        let auth = AuthService::new(
            fx.users.clone(),
            fx.ledger.clone(),
            fx.tokens.clone(),
            Duration::from_secs(2),
        )
        .with_bcrypt_cost(4)
        .with_audit(audit);

        auth.login("admin", "wrong", &client()).await.unwrap_err();
        let out = auth.login("admin", "admin123", &client()).await.unwrap();
        let identity = Identity {
            user_id: out.user.id.clone(),
            username: out.user.username.clone(),
            role: out.user.role,
            session_id: out.session_id.clone(),
            expires_at: out.token.expires_at,
        };
        auth.logout(&identity, &client()).await.unwrap();

        wait_for_events(log.as_ref(), 3).await;
        let events = log.recent(10).await.unwrap();
        let failed = events
            .iter()
            .find(|e| e.kind == SecurityEventKind::LoginFailed)
            .unwrap();
        assert_eq!(failed.message, "Login failed for user: admin");
        assert_eq!(failed.user_agent, "unit-test");
        assert!(failed.user_id.is_none());
        for kind in [SecurityEventKind::LoginSuccess, SecurityEventKind::Logout] {
            let event = events.iter().find(|e| e.kind == kind).unwrap();
            assert_eq!(event.user_id.as_deref(), Some(out.user.id.as_str()));
            assert_eq!(event.ip_address, "127.0.0.1");
        }
    }

    /// Deactivates and re-keys the account right after handing out the
    /// lookup snapshot, as an admin acting mid-login would.
    struct DeactivatingStore {
        inner: InMemoryCredentialStore,
    }

    #[async_trait::async_trait]
    impl CredentialStore for DeactivatingStore {
        async fn find_by_username(&self, username: &str) -> DomainResult<Option<User>> {
            let found = self.inner.find_by_username(username).await?;
            if let Some(user) = &found {
                let mut changed = user.clone();
                changed.is_active = false;
                changed.password_hash = "rotated".into();
                self.inner.update(changed).await?;
            }
            Ok(found)
        }
        async fn find_by_id(&self, id: &str) -> DomainResult<Option<User>> {
            self.inner.find_by_id(id).await
        }
        async fn insert(&self, user: User) -> DomainResult<User> {
            self.inner.insert(user).await
        }
        async fn update(&self, user: User) -> DomainResult<User> {
            self.inner.update(user).await
        }
        async fn list(&self) -> DomainResult<Vec<User>> {
            self.inner.list().await
        }
        async fn record_login(
            &self,
            user_id: &str,
            at: chrono::DateTime<Utc>,
        ) -> DomainResult<bool> {
            self.inner.record_login(user_id, at).await
        }
    }

    #[tokio::test]
    async fn deactivation_during_login_wins() {
        let store = Arc::new(DeactivatingStore {
            inner: InMemoryCredentialStore::new(),
        });
        let hash = hash_password_with_cost("admin123", 4).unwrap();
        let bob = store
            .insert(User::new("bob", "bob@localhost", hash, UserRole::Operator))
            .await
            .unwrap();
        let ledger = Arc::new(InMemorySessionLedger::new());
        let tokens = Arc::new(
            TokenService::new(TokenConfig {
                secret: "login-test-secret".into(),
                session_timeout: Duration::from_secs(3600),
            })
            .unwrap(),
        );
        let auth = AuthService::new(store.clone(), ledger.clone(), tokens, Duration::from_secs(2))
            .with_bcrypt_cost(4);

        let err = auth.login("bob", "admin123", &client()).await.unwrap_err();
        assert_eq!(err, AuthError::AuthenticationFailed);

        let stored = store.find_by_id(&bob.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.password_hash, "rotated");
        assert!(stored.last_login_at.is_none());
        assert!(ledger.list_live(&bob.id, Utc::now()).await.unwrap().is_empty());
    }
}

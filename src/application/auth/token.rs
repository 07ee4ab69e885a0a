//! Signed session tokens (HS256 JWT)

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::error::{AuthError, AuthResult};
use crate::domain::{User, UserRole};

/// Value of the `iss` claim on every token minted by this service.
pub const TOKEN_ISSUER: &str = "lms-manager";

/// Placeholder secrets shipped in sample configs. Never accepted.
pub const INSECURE_SECRETS: &[&str] = &[
    "your-secret-key-change-this",
    "super-secret-key-change-in-production",
];

/// Returns why `secret` cannot be used for signing, if it cannot.
pub fn insecure_secret_reason(secret: &str) -> Option<&'static str> {
    if secret.trim().is_empty() {
        Some("JWT secret is empty")
    } else if INSECURE_SECRETS.contains(&secret) {
        Some("JWT secret is a known placeholder value")
    } else {
        None
    }
}

#[derive(Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub session_timeout: Duration,
}

/// Claims carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id
    pub sub: String,
    pub username: String,
    pub role: UserRole,
    /// Session ledger id
    pub sid: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub iss: String,
}

impl TokenClaims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// A freshly minted token and the window it is valid for.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Mints and verifies bearer tokens. Holds the signing secret for the life of
/// the process; never consults the session ledger.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    session_timeout: chrono::Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("session_timeout", &self.session_timeout)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(config: TokenConfig) -> AuthResult<Self> {
        if let Some(reason) = insecure_secret_reason(&config.secret) {
            return Err(AuthError::Configuration(reason.into()));
        }
        if config.session_timeout.is_zero() {
            return Err(AuthError::Configuration(
                "session timeout must be greater than zero".into(),
            ));
        }
        let session_timeout = chrono::Duration::from_std(config.session_timeout)
            .map_err(|_| AuthError::Configuration("session timeout is out of range".into()))?;

        // Expiry and not-before are checked by hand against the caller's clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["sub", "exp", "nbf", "iat", "iss"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            session_timeout,
        })
    }

    pub fn session_timeout(&self) -> chrono::Duration {
        self.session_timeout
    }

    /// Expiry instant for a session issued at `issued_at`.
    pub fn expiry_for(&self, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        issued_at + self.session_timeout
    }

    pub fn issue(&self, user: &User, session_id: &str) -> AuthResult<IssuedToken> {
        self.issue_at(user, session_id, Utc::now())
    }

    /// Mint a token valid from `issued_at` (truncated to whole seconds) until
    /// `issued_at + session_timeout`.
    pub fn issue_at(
        &self,
        user: &User,
        session_id: &str,
        issued_at: DateTime<Utc>,
    ) -> AuthResult<IssuedToken> {
        let iat = issued_at.timestamp();
        let issued_at = Utc
            .timestamp_opt(iat, 0)
            .single()
            .ok_or_else(|| AuthError::Configuration("issue time out of range".into()))?;
        let expires_at = self.expiry_for(issued_at);

        let claims = TokenClaims {
            sub: user.id.clone(),
            username: user.username.clone(),
            role: user.role,
            sid: session_id.to_string(),
            iat,
            nbf: iat,
            exp: expires_at.timestamp(),
            iss: TOKEN_ISSUER.to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Configuration(format!("failed to sign token: {e}")))?;

        Ok(IssuedToken {
            token,
            issued_at,
            expires_at,
        })
    }

    pub fn validate(&self, token: &str) -> AuthResult<TokenClaims> {
        self.validate_at(token, Utc::now())
    }

    /// Verify the signature, then require `nbf <= now < exp`.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult<TokenClaims> {
        let claims = decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map_err(|_| AuthError::InvalidToken)?
            .claims;

        let now = now.timestamp();
        if now < claims.nbf {
            return Err(AuthError::InvalidToken);
        }
        if now >= claims.exp {
            return Err(AuthError::ExpiredToken);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-signing-secret-0123456789";

    fn service(secret: &str, timeout_secs: u64) -> AuthResult<TokenService> {
        TokenService::new(TokenConfig {
            secret: secret.into(),
            session_timeout: Duration::from_secs(timeout_secs),
        })
    }

    fn user() -> User {
        User::new("alice", "alice@example.com", "hash", UserRole::Operator)
    }

    #[test]
    fn rejects_insecure_secrets() {
        for secret in ["", "   ", "your-secret-key-change-this", "super-secret-key-change-in-production"] {
            assert!(matches!(service(secret, 60), Err(AuthError::Configuration(_))));
        }
        assert!(matches!(service(SECRET, 0), Err(AuthError::Configuration(_))));
    }

    #[test]
    fn issue_then_validate() {
        let svc = service(SECRET, 3600).unwrap();
        let user = user();
        let issued = svc.issue(&user, "sid-1").unwrap();

        assert!(issued.token.len() > 100);
        assert_eq!(issued.expires_at - issued.issued_at, chrono::Duration::seconds(3600));

        let claims = svc.validate(&issued.token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, UserRole::Operator);
        assert_eq!(claims.sid, "sid-1");
        assert_eq!(claims.iss, TOKEN_ISSUER);
        assert_eq!(claims.expires_at(), issued.expires_at);
    }

    #[test]
    fn valid_until_exp_then_expired() {
        let svc = service(SECRET, 60).unwrap();
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let issued = svc.issue_at(&user(), "sid", t0).unwrap();

        for offset in [0, 1, 30, 59] {
            assert!(svc
                .validate_at(&issued.token, t0 + chrono::Duration::seconds(offset))
                .is_ok());
        }
        for offset in [60, 61, 3600] {
            assert_eq!(
                svc.validate_at(&issued.token, t0 + chrono::Duration::seconds(offset)),
                Err(AuthError::ExpiredToken)
            );
        }
    }

    #[test]
    fn not_yet_valid_is_invalid() {
        let svc = service(SECRET, 60).unwrap();
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let issued = svc.issue_at(&user(), "sid", t0).unwrap();
        assert_eq!(
            svc.validate_at(&issued.token, t0 - chrono::Duration::seconds(5)),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn every_signature_mutation_is_invalid() {
        let svc = service(SECRET, 3600).unwrap();
        let issued = svc.issue(&user(), "sid").unwrap();
        let token = issued.token;
        let sig_start = token.rfind('.').unwrap() + 1;

        for i in sig_start..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            assert_eq!(svc.validate(&tampered), Err(AuthError::InvalidToken), "index {i}");
        }
    }

    #[test]
    fn payload_tampering_is_invalid() {
        let svc = service(SECRET, 3600).unwrap();
        let token = svc.issue(&user(), "sid").unwrap().token;
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = flip_first_char(parts[1]);
        parts[1] = &forged;
        assert_eq!(svc.validate(&parts.join(".")), Err(AuthError::InvalidToken));
    }

    fn flip_first_char(original: &str) -> String {
        let mut bytes = original.as_bytes().to_vec();
        bytes[0] = if bytes[0] == b'e' { b'f' } else { b'e' };
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn wrong_secret_and_garbage_are_invalid() {
        let svc = service(SECRET, 3600).unwrap();
        let other = service("a-completely-different-secret", 3600).unwrap();
        let token = other.issue(&user(), "sid").unwrap().token;

        assert_eq!(svc.validate(&token), Err(AuthError::InvalidToken));
        assert_eq!(svc.validate(""), Err(AuthError::InvalidToken));
        assert_eq!(svc.validate("not.a.jwt"), Err(AuthError::InvalidToken));
        assert_eq!(svc.validate("a.b"), Err(AuthError::InvalidToken));
    }
}

//! Application configuration
//!
//! Loaded from a TOML file (default `~/.config/lms-manager/config.toml`).
//! A missing file is created with defaults. A handful of environment
//! variables override file values so secrets need not live on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::auth::{insecure_secret_reason, IpAllowList, RateLimitConfig, TokenConfig};
use crate::infrastructure::database::DatabaseConfig;

pub const ENV_CONFIG_PATH: &str = "LMS_MANAGER_CONFIG";
pub const ENV_JWT_SECRET: &str = "LMS_JWT_SECRET";
pub const ENV_DATABASE_URL: &str = "LMS_DATABASE_URL";

/// `database.url` value selecting the in-process stores.
pub const MEMORY_DATABASE: &str = "memory";

/// Upper bound for every duration setting, in seconds (one year).
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub security: SecuritySection,
    pub admin: AdminSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Seconds allowed for in-flight requests after a shutdown signal.
    pub shutdown_timeout: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            shutdown_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// A sea-orm connection URL, or `"memory"` for non-persistent stores.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: format!("sqlite://{}?mode=rwc", default_data_dir().join("lms-manager.db").display()),
            max_connections: 10,
        }
    }
}

impl DatabaseSection {
    pub fn is_memory(&self) -> bool {
        self.url == MEMORY_DATABASE
    }

    pub fn to_database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            ..DatabaseConfig::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySection {
    pub jwt_secret: String,
    /// Seconds a session (and its token) stays valid.
    pub session_timeout: u64,
    /// Requests per client address per window.
    pub rate_limit: u32,
    /// Window length in seconds.
    pub rate_window: u64,
    /// Seconds a client is refused after exceeding the limit. 0 disables bans.
    pub ban_duration: u64,
    /// CIDR blocks or literal addresses. Empty admits everyone.
    pub allowed_ips: Vec<String>,
    /// Honour `X-Forwarded-For` / `X-Real-IP`. Only enable behind a trusted proxy.
    pub trust_proxy_headers: bool,
    pub storage_timeout_ms: u64,
    /// Seconds between housekeeping sweeps.
    pub sweep_interval: u64,
    /// bcrypt work factor for stored password hashes.
    pub bcrypt_cost: u32,
    /// Seconds security events are kept. 0 keeps them forever.
    pub audit_retention: u64,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            jwt_secret: "your-secret-key-change-this".into(),
            session_timeout: 3600,
            rate_limit: 100,
            rate_window: 60,
            ban_duration: 300,
            allowed_ips: Vec::new(),
            trust_proxy_headers: false,
            storage_timeout_ms: 5000,
            sweep_interval: 60,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            audit_retention: 30 * 24 * 60 * 60,
        }
    }
}

impl SecuritySection {
    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            secret: self.jwt_secret.clone(),
            session_timeout: Duration::from_secs(self.session_timeout),
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            limit: self.rate_limit,
            window: Duration::from_secs(self.rate_window),
            ban: Duration::from_secs(self.ban_duration),
        }
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    pub fn audit_retention(&self) -> Option<chrono::Duration> {
        (self.audit_retention > 0).then(|| chrono::Duration::seconds(self.audit_retention as i64))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminSection {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Default for AdminSection {
    fn default() -> Self {
        Self {
            username: "admin".into(),
            email: "admin@localhost".into(),
            password: "admin123".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    /// `"text"` or `"json"`.
    pub format: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl AppConfig {
    /// Read `path`, writing defaults first when it does not exist, then apply
    /// environment overrides. Validation is left to the caller.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            return Ok(config.with_env_overrides());
        }

        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config.with_env_overrides())
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let body = toml::to_string_pretty(self)?;
        fs::write(path, body).map_err(write_err)
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(secret) = std::env::var(ENV_JWT_SECRET) {
            self.security.jwt_secret = secret;
        }
        if let Ok(url) = std::env::var(ENV_DATABASE_URL) {
            self.database.url = url;
        }
        self
    }

    /// Refuse configurations the server must not start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sec = &self.security;
        if let Some(reason) = insecure_secret_reason(&sec.jwt_secret) {
            return Err(ConfigError::Invalid(format!(
                "{reason}; set security.jwt_secret or {ENV_JWT_SECRET}"
            )));
        }
        if sec.session_timeout == 0 {
            return Err(ConfigError::Invalid("security.session_timeout must be > 0".into()));
        }
        if sec.rate_limit == 0 {
            return Err(ConfigError::Invalid("security.rate_limit must be > 0".into()));
        }
        if sec.rate_window == 0 {
            return Err(ConfigError::Invalid("security.rate_window must be > 0".into()));
        }
        if sec.storage_timeout_ms == 0 {
            return Err(ConfigError::Invalid("security.storage_timeout_ms must be > 0".into()));
        }
        if sec.sweep_interval == 0 {
            return Err(ConfigError::Invalid("security.sweep_interval must be > 0".into()));
        }
        for (name, secs) in [
            ("security.session_timeout", sec.session_timeout),
            ("security.rate_window", sec.rate_window),
            ("security.ban_duration", sec.ban_duration),
            ("security.sweep_interval", sec.sweep_interval),
            ("security.audit_retention", sec.audit_retention),
            ("server.shutdown_timeout", self.server.shutdown_timeout),
        ] {
            if secs > MAX_DURATION_SECS {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be <= {MAX_DURATION_SECS} seconds"
                )));
            }
        }
        if sec.storage_timeout_ms > MAX_DURATION_SECS * 1000 {
            return Err(ConfigError::Invalid(format!(
                "security.storage_timeout_ms must be <= {} ms",
                MAX_DURATION_SECS * 1000
            )));
        }
        if !(4..=31).contains(&sec.bcrypt_cost) {
            return Err(ConfigError::Invalid("security.bcrypt_cost must be within 4..=31".into()));
        }
        IpAllowList::parse(&sec.allowed_ips).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::Invalid(format!(
                "logging.format must be \"text\" or \"json\", got \"{}\"",
                self.logging.format
            )));
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn config_dir() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lms-manager")
}

fn default_data_dir() -> PathBuf {
    dirs_next::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lms-manager")
}

/// `$LMS_MANAGER_CONFIG` if set, else `~/.config/lms-manager/config.toml`.
pub fn default_config_path() -> PathBuf {
    std::env::var_os(ENV_CONFIG_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secure() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.security.jwt_secret = "a-real-deployment-secret".into();
        cfg
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.security.session_timeout, 3600);
        assert_eq!(cfg.security.rate_limit, 100);
        assert_eq!(cfg.security.rate_window, 60);
        assert_eq!(cfg.admin.username, "admin");
        assert_eq!(cfg.admin.password, "admin123");
    }

    #[test]
    fn placeholder_secret_is_rejected() {
        let cfg = AppConfig::default();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = secure();
        cfg.security.jwt_secret = String::new();
        assert!(cfg.validate().is_err());

        assert!(secure().validate().is_ok());
    }

    #[test]
    fn rejects_zero_limits_and_bad_allow_list() {
        let mut cfg = secure();
        cfg.security.session_timeout = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = secure();
        cfg.security.rate_limit = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = secure();
        cfg.security.allowed_ips = vec!["10.0.0.0/8".into(), "bogus".into()];
        assert!(cfg.validate().is_err());

        let mut cfg = secure();
        cfg.logging.format = "xml".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_durations_beyond_one_year() {
        let mut cfg = secure();
        cfg.security.ban_duration = u64::MAX;
        assert!(cfg.validate().is_err());

        let mut cfg = secure();
        cfg.security.rate_window = MAX_DURATION_SECS + 1;
        assert!(cfg.validate().is_err());

        let mut cfg = secure();
        cfg.security.session_timeout = u64::MAX / 2;
        assert!(cfg.validate().is_err());

        let mut cfg = secure();
        cfg.security.ban_duration = MAX_DURATION_SECS;
        cfg.security.rate_window = MAX_DURATION_SECS;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [security]
            jwt_secret = "from-file"
            rate_limit = 5
            allowed_ips = ["127.0.0.1"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.security.jwt_secret, "from-file");
        assert_eq!(cfg.security.rate_limit, 5);
        assert_eq!(cfg.security.session_timeout, 3600);
        assert_eq!(cfg.server.port, 8080);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_writes_defaults_when_missing() {
        let dir = std::env::temp_dir().join(format!("lms-manager-cfg-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");

        let cfg = AppConfig::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.server.port, 8080);

        let reloaded = AppConfig::load(&path).unwrap();
        assert_eq!(reloaded.security.rate_limit, cfg.security.rate_limit);

        let _ = fs::remove_dir_all(dir);
    }
}

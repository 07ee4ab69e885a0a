//! Reusable server runtime.
//!
//! [`ServerHandle`] owns the full lifecycle: configuration checks, storage
//! and migrations, default admin, the housekeeping task, the HTTP API and
//! graceful shutdown.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::housekeeping::{Housekeeper, HousekeepingConfig};
use crate::application::AuditTrail;
use crate::application::identity::{NewUser, UserService};
use crate::config::{AdminSection, AppConfig};
use crate::domain::{DomainResult, UserRole};
use crate::infrastructure::database::migrator::Migrator;
use crate::infrastructure::{
    init_database, InMemoryCredentialStore, InMemorySecurityEventLog, InMemorySessionLedger,
    SecurityEventRepository, SessionRepository, UserRepository,
};
use crate::interfaces::http::{create_api_router, AppState, Stores};
use crate::shared::shutdown::{drain_with_timeout, listen_for_shutdown_signals, ShutdownSignal};

// ── Options ────────────────────────────────────────────────────────

pub struct ServerOptions {
    pub config: AppConfig,
    /// Run database migrations on startup (default: true).
    pub auto_migrate: bool,
    /// Create the configured admin account when it does not exist (default: true).
    pub create_default_admin: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            auto_migrate: true,
            create_default_admin: true,
        }
    }
}

// ── ServerHandle ───────────────────────────────────────────────────

/// Handle to a running server.
///
/// ```rust,no_run
/// use lms_manager::server::{ServerHandle, ServerOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let handle = ServerHandle::start(ServerOptions::default()).await?;
///     handle.install_signal_handler();
///     handle.shutdown_signal().wait().await;
///     handle.wait().await;
///     Ok(())
/// }
/// ```
pub struct ServerHandle {
    pub config: AppConfig,
    /// Address the API is bound to. Differs from the config when port 0 is used.
    pub local_addr: SocketAddr,

    db: Option<DatabaseConnection>,
    shutdown: ShutdownSignal,
    api_task: JoinHandle<()>,
    housekeeping_task: JoinHandle<()>,
    audit_task: JoinHandle<()>,
}

impl ServerHandle {
    /// Start the server. An invalid configuration (including a placeholder
    /// JWT secret) is refused before anything is bound.
    pub async fn start(opts: ServerOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let app_cfg = opts.config;
        app_cfg.validate()?;

        info!("Starting LMS Manager...");

        let prometheus_handle = prometheus_handle();

        // ── Storage ────────────────────────────────────────────
        let (stores, db) = if app_cfg.database.is_memory() {
            warn!("Using in-memory storage; accounts and sessions are lost on restart");
            let stores = Stores {
                users: Arc::new(InMemoryCredentialStore::new()),
                sessions: Arc::new(InMemorySessionLedger::new()),
                audit: Arc::new(InMemorySecurityEventLog::new()),
                db: None,
            };
            (stores, None)
        } else {
            let db = init_database(&app_cfg.database.to_database_config()).await?;
            if opts.auto_migrate {
                info!("Running database migrations...");
                Migrator::up(&db, None).await?;
                info!("Migrations completed");
            }
            let stores = Stores {
                users: Arc::new(UserRepository::new(db.clone())),
                sessions: Arc::new(SessionRepository::new(db.clone())),
                audit: Arc::new(SecurityEventRepository::new(db.clone())),
                db: Some(db.clone()),
            };
            (stores, Some(db))
        };

        let (audit, audit_task) =
            AuditTrail::start(stores.audit.clone(), app_cfg.security.storage_timeout());
        let state = AppState::build(&app_cfg, stores.clone(), audit, prometheus_handle)?;
        info!(
            session_timeout_secs = app_cfg.security.session_timeout,
            rate_limit = app_cfg.security.rate_limit,
            rate_window_secs = app_cfg.security.rate_window,
            allow_list_entries = app_cfg.security.allowed_ips.len(),
            "Auth core configured"
        );

        if opts.create_default_admin {
            match ensure_default_admin(&state.user_service, &app_cfg.admin).await {
                Ok(true) => {}
                Ok(false) => info!(username = %app_cfg.admin.username, "Admin account present"),
                Err(e) => error!(error = %e, "Failed to create default admin"),
            }
        }

        let shutdown = ShutdownSignal::new();

        // ── Background tasks ───────────────────────────────────
        let housekeeper = Housekeeper::new(
            state.limiter(),
            stores.sessions,
            HousekeepingConfig {
                interval: Duration::from_secs(app_cfg.security.sweep_interval),
                session_retention: chrono::Duration::seconds(
                    app_cfg.security.session_timeout as i64,
                ),
                audit_retention: app_cfg.security.audit_retention(),
            },
        )
        .with_audit_log(stores.audit);
        let housekeeping_task = housekeeper.start(shutdown.clone());

        // ── REST API ───────────────────────────────────────────
        let router = create_api_router(state);
        let listener = tokio::net::TcpListener::bind(app_cfg.address()).await?;
        let local_addr = listener.local_addr()?;
        info!("REST API listening on http://{}", local_addr);
        info!("Swagger UI available at http://{}/docs/", local_addr);

        let api_shutdown = shutdown.clone();
        let api_server = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            api_shutdown.wait().await;
            info!("REST API received shutdown signal");
        });

        let api_task = tokio::spawn(async move {
            if let Err(e) = api_server.await {
                error!("REST API server error: {}", e);
            }
        });

        Ok(Self {
            config: app_cfg,
            local_addr,
            db,
            shutdown,
            api_task,
            housekeeping_task,
            audit_task,
        })
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Listen for SIGTERM/SIGINT and trigger shutdown.
    pub fn install_signal_handler(&self) {
        tokio::spawn(listen_for_shutdown_signals(self.shutdown.clone()));
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Wait for every task to stop after shutdown has been triggered, bounded
    /// by `server.shutdown_timeout`.
    pub async fn wait(self) {
        let timeout = Duration::from_secs(self.config.server.shutdown_timeout);
        let api_task = self.api_task;
        let housekeeping_task = self.housekeeping_task;
        let audit_task = self.audit_task;

        let drained = drain_with_timeout(timeout, async move {
            if let Err(e) = api_task.await {
                error!("REST API task panicked: {}", e);
            }
            if let Err(e) = housekeeping_task.await {
                error!("Housekeeping task panicked: {}", e);
            }
            // Finishes once the router and its trail handles are dropped.
            if let Err(e) = audit_task.await {
                error!("Audit writer task panicked: {}", e);
            }
        })
        .await;
        if !drained {
            warn!("Abandoning in-flight requests");
        }

        if let Some(db) = self.db {
            match db.close().await {
                Ok(()) => info!("Database connection closed"),
                Err(e) => warn!("Error closing database connection: {}", e),
            }
        }

        info!("LMS Manager shutdown complete");
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) {
        info!("Shutting down LMS Manager...");
        self.trigger_shutdown();
        self.wait().await;
    }

    pub fn is_running(&self) -> bool {
        !self.api_task.is_finished()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// The global recorder can only be installed once per process, so a restart
/// within the same process reuses the first handle.
fn prometheus_handle() -> Option<PrometheusHandle> {
    static PROM_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();
    PROM_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                info!("Prometheus metrics recorder installed");
                Some(handle)
            }
            Err(e) => {
                warn!(error = %e, "Prometheus recorder unavailable; /metrics disabled");
                None
            }
        })
        .clone()
}

/// Create the configured admin account unless that username already exists.
/// Returns whether an account was created.
pub async fn ensure_default_admin(users: &UserService, admin: &AdminSection) -> DomainResult<bool> {
    let created = users
        .ensure_user(NewUser {
            username: admin.username.clone(),
            email: admin.email.clone(),
            password: admin.password.clone(),
            role: UserRole::Admin,
        })
        .await?;

    if created.is_some() {
        info!(username = %admin.username, "Default admin created");
        warn!("Change the default admin password immediately");
    }
    Ok(created.is_some())
}

/// Initialize tracing from the application config. `RUST_LOG` takes
/// precedence over `logging.level`.
///
/// Call once at process startup, before [`ServerHandle::start`].
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    // A subscriber installed earlier in the process wins.
    let _ = match config.logging.format.to_lowercase().as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init(),
    };
}

//! API router with Swagger UI
//!
//! Every route passes the rate limiter. Everything except `/login`,
//! `/health`, `/metrics` and the docs additionally passes the access gate.
//! Gate denials and login outcomes are written to the audit trail.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::FromRef,
    http::{header, HeaderValue},
    middleware,
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sea_orm::DatabaseConnection;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use super::error::ErrorBody;
use super::middleware::{auth_middleware, rate_limit_middleware, SecurityState};
use super::modules::{auth, health, metrics, profile, security, sessions, users};
use crate::application::auth::{
    AccessGate, AuthError, AuthService, IpAllowList, RateLimiter, TokenService,
};
use crate::application::identity::UserService;
use crate::application::AuditTrail;
use crate::config::AppConfig;
use crate::domain::{
    CredentialStore, SecurityEventKind, SecurityEventLog, SessionLedger, Severity, UserRole,
};

/// Persistence backends the router runs on.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn CredentialStore>,
    pub sessions: Arc<dyn SessionLedger>,
    pub audit: Arc<dyn SecurityEventLog>,
    /// Present when backed by a database, for health pings.
    pub db: Option<DatabaseConnection>,
}

/// Root router state. Handlers extract their own slice through `FromRef`.
#[derive(Clone)]
pub struct AppState {
    pub security: SecurityState,
    pub auth: Arc<AuthService>,
    pub user_service: Arc<UserService>,
    pub sessions: Arc<dyn SessionLedger>,
    pub audit: AuditTrail,
    pub health: health::HealthState,
    pub metrics: metrics::MetricsState,
}

impl AppState {
    /// Wire the auth core from configuration. Fails on an insecure secret or
    /// an unparsable allow-list. `audit` must write to `stores.audit`.
    pub fn build(
        config: &AppConfig,
        stores: Stores,
        audit: AuditTrail,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Result<Self, AuthError> {
        let sec = &config.security;
        let tokens = Arc::new(TokenService::new(sec.token_config())?);
        let limiter = Arc::new(RateLimiter::new(sec.rate_limit_config()));
        let allow_list = IpAllowList::parse(&sec.allowed_ips)
            .map_err(|e| AuthError::Configuration(e.to_string()))?;

        let gate = Arc::new(
            AccessGate::new(
                tokens.clone(),
                stores.sessions.clone(),
                limiter,
                allow_list,
                sec.storage_timeout(),
            )
            .with_audit(audit.clone()),
        );
        let auth = Arc::new(
            AuthService::new(
                stores.users.clone(),
                stores.sessions.clone(),
                tokens,
                sec.storage_timeout(),
            )
            .with_bcrypt_cost(sec.bcrypt_cost)
            .with_audit(audit.clone()),
        );
        let user_service = Arc::new(
            UserService::new(stores.users.clone(), stores.sessions.clone())
                .with_bcrypt_cost(sec.bcrypt_cost),
        );

        Ok(Self {
            security: SecurityState {
                gate,
                trust_proxy_headers: sec.trust_proxy_headers,
            },
            auth,
            user_service,
            sessions: stores.sessions,
            audit,
            health: health::HealthState {
                db: stores.db,
                started_at: Arc::new(Instant::now()),
            },
            metrics: metrics::MetricsState {
                handle: metrics_handle,
            },
        })
    }

    pub fn limiter(&self) -> Arc<RateLimiter> {
        self.security.gate.limiter().clone()
    }
}

impl FromRef<AppState> for auth::AuthHandlerState {
    fn from_ref(s: &AppState) -> Self {
        auth::AuthHandlerState {
            auth: Arc::clone(&s.auth),
            gate: Arc::clone(&s.security.gate),
            user_service: Arc::clone(&s.user_service),
        }
    }
}

impl FromRef<AppState> for users::UserHandlerState {
    fn from_ref(s: &AppState) -> Self {
        users::UserHandlerState {
            user_service: Arc::clone(&s.user_service),
        }
    }
}

impl FromRef<AppState> for profile::ProfileHandlerState {
    fn from_ref(s: &AppState) -> Self {
        profile::ProfileHandlerState {
            user_service: Arc::clone(&s.user_service),
        }
    }
}

impl FromRef<AppState> for sessions::SessionHandlerState {
    fn from_ref(s: &AppState) -> Self {
        sessions::SessionHandlerState {
            user_service: Arc::clone(&s.user_service),
        }
    }
}

impl FromRef<AppState> for security::SecurityHandlerState {
    fn from_ref(s: &AppState) -> Self {
        security::SecurityHandlerState {
            audit: s.audit.clone(),
        }
    }
}

impl FromRef<AppState> for health::HealthState {
    fn from_ref(s: &AppState) -> Self {
        s.health.clone()
    }
}

impl FromRef<AppState> for metrics::MetricsState {
    fn from_ref(s: &AppState) -> Self {
        s.metrics.clone()
    }
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Session token from POST /login"))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::logout,
        auth::current_user,
        users::list_users,
        users::create_user,
        users::update_user,
        users::deactivate_user,
        users::user_stats,
        profile::get_profile,
        profile::update_profile,
        profile::change_password,
        sessions::list_sessions,
        sessions::end_session,
        security::list_security_events,
    ),
    components(
        schemas(
            ErrorBody,
            UserRole,
            auth::LoginRequest,
            auth::LoginResponse,
            auth::LogoutResponse,
            users::UserDto,
            users::CreateUserRequest,
            users::UpdateUserRequest,
            users::UserStatsDto,
            profile::UpdateProfileRequest,
            profile::ChangePasswordRequest,
            profile::ChangePasswordResponse,
            sessions::SessionDto,
            sessions::EndSessionResponse,
            security::SecurityEventDto,
            SecurityEventKind,
            Severity,
            health::HealthResponse,
            health::ComponentHealth,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Authentication", description = "Login, logout and the current identity"),
        (name = "Users", description = "Account administration (admin role)"),
        (name = "Profile", description = "The caller's own account"),
        (name = "Sessions", description = "Login sessions: list and revoke"),
        (name = "Security", description = "Audit trail of logins and denials (admin role)"),
    ),
    info(
        title = "LMS Manager API",
        version = "1.0.0",
        description = "Administrative control plane: authentication and access control"
    )
)]
pub struct ApiDoc;

pub fn create_api_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/logout", post(auth::logout))
        .route("/api/me", get(auth::current_user))
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route("/api/users/stats", get(users::user_stats))
        .route(
            "/api/users/{id}",
            put(users::update_user).delete(users::deactivate_user),
        )
        .route(
            "/api/profile",
            get(profile::get_profile).put(profile::update_profile),
        )
        .route("/api/profile/password", post(profile::change_password))
        .route("/api/sessions", get(sessions::list_sessions))
        .route("/api/sessions/{id}", axum::routing::delete(sessions::end_session))
        .route("/api/security/events", get(security::list_security_events))
        .route_layer(middleware::from_fn_with_state(
            state.security.clone(),
            auth_middleware,
        ));

    let api = Router::new()
        .route("/login", post(auth::login))
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::prometheus_metrics))
        .merge(protected)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'self'"),
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn_with_state(
            state.security.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn(metrics::http_metrics_middleware))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! Authentication API handlers

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Extension, Json,
};

use super::dto::{LoginRequest, LoginResponse, LogoutResponse};
use crate::application::auth::{AccessGate, AuthService, ClientInfo, Identity};
use crate::application::identity::UserService;
use crate::interfaces::http::common::ValidatedJson;
use crate::interfaces::http::error::{ApiResult, ErrorBody};
use crate::interfaces::http::middleware::AUTH_COOKIE;
use crate::interfaces::http::modules::users::UserDto;

#[derive(Clone)]
pub struct AuthHandlerState {
    pub auth: Arc<AuthService>,
    pub gate: Arc<AccessGate>,
    pub user_service: Arc<UserService>,
}

fn cookie(value: &str, max_age: i64) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{AUTH_COOKIE}={value}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Strict"
    ))
    .ok()
}

#[utoipa::path(
    post,
    path = "/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Successful login", body = LoginResponse),
        (status = 400, description = "Malformed request", body = ErrorBody),
        (status = 401, description = "Invalid username or password", body = ErrorBody),
        (status = 403, description = "Client address not allowed", body = ErrorBody),
        (status = 429, description = "Too many requests", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AuthHandlerState>,
    client: Option<Extension<ClientInfo>>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> ApiResult<Response> {
    let client = client.map(|Extension(c)| c).unwrap_or_default();
    state.gate.check_ip(&client.ip)?;

    let outcome = state.auth.login(&req.username, &req.password, &client).await?;
    let set_cookie = cookie(&outcome.token.token, outcome.expires_in);

    let body = LoginResponse {
        token: outcome.token.token,
        token_type: "Bearer".to_string(),
        expires_at: outcome.token.expires_at,
        expires_in: outcome.expires_in,
        session_id: outcome.session_id,
        user: outcome.user.into(),
    };

    let mut response = Json(body).into_response();
    if let Some(value) = set_cookie {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    Ok(response)
}

#[utoipa::path(
    post,
    path = "/logout",
    tag = "Authentication",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Session closed", body = LogoutResponse),
        (status = 401, description = "Missing, invalid, expired or revoked token", body = ErrorBody)
    )
)]
pub async fn logout(
    State(state): State<AuthHandlerState>,
    Extension(identity): Extension<Identity>,
    Extension(client): Extension<ClientInfo>,
) -> ApiResult<Response> {
    state.auth.logout(&identity, &client).await?;

    let mut response = Json(LogoutResponse {
        message: "Logged out successfully".to_string(),
        logged_out: true,
    })
    .into_response();
    if let Some(value) = cookie("", 0) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    Ok(response)
}

#[utoipa::path(
    get,
    path = "/api/me",
    tag = "Authentication",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = UserDto),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    )
)]
pub async fn current_user(
    State(state): State<AuthHandlerState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<UserDto>> {
    let user = state.user_service.get_user(&identity.user_id).await?;
    Ok(Json(user.into()))
}

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Extension, Json,
};

use super::dto::{SecurityEventDto, SecurityEventParams};
use crate::application::auth::Identity;
use crate::application::AuditTrail;
use crate::domain::Permission;
use crate::interfaces::http::error::{ApiError, ApiResult, ErrorBody};

#[derive(Clone)]
pub struct SecurityHandlerState {
    pub audit: AuditTrail,
}

#[utoipa::path(
    get,
    path = "/api/security/events",
    tag = "Security",
    security(("bearer_auth" = [])),
    params(SecurityEventParams),
    responses(
        (status = 200, description = "Recent security events, newest first", body = [SecurityEventDto]),
        (status = 400, description = "Malformed query", body = ErrorBody),
        (status = 401, description = "Not authenticated", body = ErrorBody),
        (status = 403, description = "Not an administrator", body = ErrorBody)
    )
)]
pub async fn list_security_events(
    State(state): State<SecurityHandlerState>,
    Extension(identity): Extension<Identity>,
    params: Result<Query<SecurityEventParams>, QueryRejection>,
) -> ApiResult<Json<Vec<SecurityEventDto>>> {
    identity.require(Permission::ViewSecurityEvents)?;
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let events = state.audit.recent(params.limit).await?;
    Ok(Json(events.into_iter().map(SecurityEventDto::from).collect()))
}

//! Session API handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use super::dto::{EndSessionResponse, SessionDto};
use crate::application::auth::Identity;
use crate::application::identity::UserService;
use crate::interfaces::http::error::{ApiResult, ErrorBody};

#[derive(Clone)]
pub struct SessionHandlerState {
    pub user_service: Arc<UserService>,
}

#[utoipa::path(
    get,
    path = "/api/sessions",
    tag = "Sessions",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Caller's live sessions", body = [SessionDto]))
)]
pub async fn list_sessions(
    State(state): State<SessionHandlerState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<SessionDto>>> {
    let sessions = state.user_service.live_sessions(&identity.user_id).await?;
    Ok(Json(
        sessions
            .into_iter()
            .map(|s| SessionDto::new(s, &identity.session_id))
            .collect(),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/sessions/{id}",
    tag = "Sessions",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session ended (or did not exist)", body = EndSessionResponse),
        (status = 403, description = "Session belongs to another user", body = ErrorBody)
    )
)]
pub async fn end_session(
    State(state): State<SessionHandlerState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Json<EndSessionResponse>> {
    state.user_service.end_session(&identity, &id).await?;
    Ok(Json(EndSessionResponse {
        message: "Session ended".to_string(),
        session_id: id,
    }))
}

//! Profile API handlers. Any authenticated role may use these.

use std::sync::Arc;

use axum::{extract::State, Extension, Json};

use super::dto::{ChangePasswordRequest, ChangePasswordResponse, UpdateProfileRequest};
use crate::application::auth::Identity;
use crate::application::identity::UserService;
use crate::interfaces::http::common::ValidatedJson;
use crate::interfaces::http::error::{ApiResult, ErrorBody};
use crate::interfaces::http::modules::users::UserDto;

#[derive(Clone)]
pub struct ProfileHandlerState {
    pub user_service: Arc<UserService>,
}

#[utoipa::path(
    get,
    path = "/api/profile",
    tag = "Profile",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Own profile", body = UserDto))
)]
pub async fn get_profile(
    State(state): State<ProfileHandlerState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<UserDto>> {
    Ok(Json(state.user_service.get_user(&identity.user_id).await?.into()))
}

#[utoipa::path(
    put,
    path = "/api/profile",
    tag = "Profile",
    security(("bearer_auth" = [])),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserDto),
        (status = 409, description = "Email already in use", body = ErrorBody)
    )
)]
pub async fn update_profile(
    State(state): State<ProfileHandlerState>,
    Extension(identity): Extension<Identity>,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> ApiResult<Json<UserDto>> {
    let user = state
        .user_service
        .update_email(&identity.user_id, req.email)
        .await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    post,
    path = "/api/profile/password",
    tag = "Profile",
    security(("bearer_auth" = [])),
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = ChangePasswordResponse),
        (status = 400, description = "Wrong current password or weak new password", body = ErrorBody)
    )
)]
pub async fn change_password(
    State(state): State<ProfileHandlerState>,
    Extension(identity): Extension<Identity>,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> ApiResult<Json<ChangePasswordResponse>> {
    let sessions_closed = state
        .user_service
        .change_password(
            &identity.user_id,
            &identity.session_id,
            &req.current_password,
            &req.new_password,
        )
        .await?;
    Ok(Json(ChangePasswordResponse {
        message: "Password changed successfully".to_string(),
        sessions_closed,
    }))
}

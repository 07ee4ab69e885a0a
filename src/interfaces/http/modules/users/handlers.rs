//! User management API handlers
//!
//! Admin-only endpoints. Delegates to `UserService` from the identity layer.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};

use super::dto::{CreateUserRequest, UpdateUserRequest, UserDto, UserStatsDto};
use crate::application::auth::Identity;
use crate::application::identity::{NewUser, UserService};
use crate::domain::Permission;
use crate::interfaces::http::common::ValidatedJson;
use crate::interfaces::http::error::{ApiResult, ErrorBody};

#[derive(Clone)]
pub struct UserHandlerState {
    pub user_service: Arc<UserService>,
}

#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All users", body = [UserDto]),
        (status = 401, description = "Not authenticated", body = ErrorBody),
        (status = 403, description = "Not an administrator", body = ErrorBody)
    )
)]
pub async fn list_users(
    State(state): State<UserHandlerState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<UserDto>>> {
    identity.require(Permission::ManageUsers)?;
    let users = state.user_service.list_users().await?;
    Ok(Json(users.into_iter().map(UserDto::from).collect()))
}

#[utoipa::path(
    post,
    path = "/api/users",
    tag = "Users",
    security(("bearer_auth" = [])),
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserDto),
        (status = 400, description = "Validation error", body = ErrorBody),
        (status = 409, description = "Username or email taken", body = ErrorBody)
    )
)]
pub async fn create_user(
    State(state): State<UserHandlerState>,
    Extension(identity): Extension<Identity>,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserDto>)> {
    identity.require(Permission::ManageUsers)?;
    let user = state
        .user_service
        .create_user(NewUser {
            username: req.username,
            email: req.email,
            password: req.password,
            role: req.role,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserDto),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn update_user(
    State(state): State<UserHandlerState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> ApiResult<Json<UserDto>> {
    identity.require(Permission::ManageUsers)?;
    let user = state.user_service.update_user(&id, req.into()).await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deactivated", body = UserDto),
        (status = 400, description = "Admin accounts cannot be deactivated", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn deactivate_user(
    State(state): State<UserHandlerState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Json<UserDto>> {
    identity.require(Permission::ManageUsers)?;
    let user = state.user_service.deactivate_user(&id).await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    get,
    path = "/api/users/stats",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Account statistics", body = UserStatsDto)
    )
)]
pub async fn user_stats(
    State(state): State<UserHandlerState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<UserStatsDto>> {
    identity.require(Permission::ManageUsers)?;
    Ok(Json(state.user_service.stats().await?.into()))
}

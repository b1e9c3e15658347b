//! Administrative user handlers: listing, activation, unlock, role
//! assignment.

use axum::{
    extract::{Json, Path, State},
    http::HeaderMap,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::handlers::auth::sanitize_with_roles;
use crate::handlers::MessageResponse;
use crate::middleware::{client_info, AuthUser};
use crate::models::user::UserResponse;
use crate::AppState;
use service_core::error::AppError;

/// Request to assign a role to a user.
#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role_id: Uuid,
}

/// List all users with their roles and effective permissions.
///
/// GET /admin/users
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserResponse>>, AppError> {
    let users = state.db.list_users().await?;

    let mut responses = Vec::with_capacity(users.len());
    for user in &users {
        responses.push(sanitize_with_roles(&state, user).await?);
    }
    Ok(Json(responses))
}

/// Get one user.
///
/// GET /admin/users/:user_id
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state
        .db
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    Ok(Json(sanitize_with_roles(&state, &user).await?))
}

/// Reactivate an account.
///
/// POST /admin/users/:user_id/activate
pub async fn activate_user(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(user_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, AppError> {
    let client = client_info(&headers);
    state
        .rbac
        .set_user_active(&ctx.user, user_id, true, &client)
        .await?;
    Ok(Json(MessageResponse::new("User activated")))
}

/// Deactivate an account. Self-deactivation is forbidden.
///
/// POST /admin/users/:user_id/deactivate
pub async fn deactivate_user(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(user_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, AppError> {
    let client = client_info(&headers);
    state
        .rbac
        .set_user_active(&ctx.user, user_id, false, &client)
        .await?;
    Ok(Json(MessageResponse::new("User deactivated")))
}

/// Force-unlock an account regardless of timer state.
///
/// POST /admin/users/:user_id/unlock
pub async fn unlock_user(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(user_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, AppError> {
    let client = client_info(&headers);
    state.rbac.unlock_user(&ctx.user, user_id, &client).await?;
    Ok(Json(MessageResponse::new("User unlocked")))
}

/// Assign a role to a user.
///
/// POST /admin/users/:user_id/roles
pub async fn assign_role(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(user_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<AssignRoleRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let client = client_info(&headers);
    state
        .rbac
        .assign_role(&ctx.user, user_id, req.role_id, &client)
        .await?;
    Ok(Json(MessageResponse::new("Role assigned successfully")))
}

/// Revoke a role from a user.
///
/// DELETE /admin/users/:user_id/roles/:role_id
pub async fn revoke_role(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path((user_id, role_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, AppError> {
    let client = client_info(&headers);
    state
        .rbac
        .revoke_role(&ctx.user, user_id, role_id, &client)
        .await?;
    Ok(Json(MessageResponse::new("Role revoked successfully")))
}

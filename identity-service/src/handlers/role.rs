//! Role administration handlers.

use axum::{
    extract::{Json, Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::handlers::MessageResponse;
use crate::middleware::{client_info, AuthUser};
use crate::models::role::{RoleDetailResponse, RoleResponse};
use crate::models::Role;
use crate::AppState;
use service_core::error::AppError;

// ============================================================================
// Request DTOs
// ============================================================================

/// Request to create a role.
#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    pub role_name: String,
    pub description: Option<String>,
}

/// Request to update a role's name/description.
#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role_name: Option<String>,
    pub description: Option<String>,
}

/// Request to grant a permission to a role.
#[derive(Debug, Deserialize)]
pub struct GrantPermissionRequest {
    pub permission_id: Uuid,
}

// ============================================================================
// Handlers
// ============================================================================

async fn role_detail(state: &AppState, role: Role) -> Result<RoleDetailResponse, AppError> {
    let permissions = state.db.role_permission_names(role.role_id).await?;
    let user_count = state.db.count_role_assignees(role.role_id).await?;
    Ok(RoleDetailResponse {
        role: RoleResponse::from(role),
        permissions,
        user_count,
    })
}

/// List all roles with their permissions and assignee counts.
///
/// GET /admin/roles
pub async fn list_roles(
    State(state): State<AppState>,
) -> Result<Json<Vec<RoleDetailResponse>>, AppError> {
    let roles = state.db.list_roles().await?;

    let mut responses = Vec::with_capacity(roles.len());
    for role in roles {
        responses.push(role_detail(&state, role).await?);
    }
    Ok(Json(responses))
}

/// Get one role.
///
/// GET /admin/roles/:role_id
pub async fn get_role(
    State(state): State<AppState>,
    Path(role_id): Path<Uuid>,
) -> Result<Json<RoleDetailResponse>, AppError> {
    let role = state
        .db
        .find_role_by_id(role_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Role not found")))?;

    Ok(Json(role_detail(&state, role).await?))
}

/// Create a new role.
///
/// POST /admin/roles
pub async fn create_role(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    headers: HeaderMap,
    Json(req): Json<CreateRoleRequest>,
) -> Result<(StatusCode, Json<RoleResponse>), AppError> {
    if req.role_name.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Role name must not be empty"
        )));
    }

    let client = client_info(&headers);
    let role = state
        .rbac
        .create_role(
            &ctx.user,
            req.role_name.trim().to_string(),
            req.description,
            &client,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(RoleResponse::from(role))))
}

/// Update a role's name/description. System roles are protected.
///
/// PATCH /admin/roles/:role_id
pub async fn update_role(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(role_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<Json<RoleResponse>, AppError> {
    let client = client_info(&headers);
    let role = state
        .rbac
        .update_role(&ctx.user, role_id, req.role_name, req.description, &client)
        .await?;

    Ok(Json(RoleResponse::from(role)))
}

/// Delete a role. Rejected while any user still holds it.
///
/// DELETE /admin/roles/:role_id
pub async fn delete_role(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(role_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, AppError> {
    let client = client_info(&headers);
    state.rbac.delete_role(&ctx.user, role_id, &client).await?;
    Ok(Json(MessageResponse::new("Role deleted successfully")))
}

/// Grant a permission to a role.
///
/// POST /admin/roles/:role_id/permissions
pub async fn grant_permission(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(role_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<GrantPermissionRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let client = client_info(&headers);
    state
        .rbac
        .grant_permission(&ctx.user, role_id, req.permission_id, &client)
        .await?;
    Ok(Json(MessageResponse::new("Permission granted to role")))
}

/// Remove a permission from a role.
///
/// DELETE /admin/roles/:role_id/permissions/:permission_id
pub async fn revoke_permission(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path((role_id, permission_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, AppError> {
    let client = client_info(&headers);
    state
        .rbac
        .revoke_permission(&ctx.user, role_id, permission_id, &client)
        .await?;
    Ok(Json(MessageResponse::new("Permission revoked from role")))
}

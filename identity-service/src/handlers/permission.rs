//! Permission catalog handlers.

use axum::{
    extract::{Json, Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::handlers::MessageResponse;
use crate::middleware::{client_info, AuthUser};
use crate::models::permission::PermissionResponse;
use crate::models::Permission;
use crate::AppState;
use service_core::error::AppError;

/// Request to create a permission. The name defaults to `resource:action`.
#[derive(Debug, Deserialize)]
pub struct CreatePermissionRequest {
    pub permission_name: Option<String>,
    pub description: Option<String>,
    pub resource: String,
    pub action: String,
}

/// List all permissions.
///
/// GET /admin/permissions
pub async fn list_permissions(
    State(state): State<AppState>,
) -> Result<Json<Vec<PermissionResponse>>, AppError> {
    let permissions = state.db.list_permissions().await?;
    Ok(Json(
        permissions.into_iter().map(PermissionResponse::from).collect(),
    ))
}

/// Get one permission.
///
/// GET /admin/permissions/:permission_id
pub async fn get_permission(
    State(state): State<AppState>,
    Path(permission_id): Path<Uuid>,
) -> Result<Json<PermissionResponse>, AppError> {
    let permission = state
        .db
        .find_permission_by_id(permission_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Permission not found")))?;

    Ok(Json(PermissionResponse::from(permission)))
}

/// Create a new permission.
///
/// POST /admin/permissions
pub async fn create_permission(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    headers: HeaderMap,
    Json(req): Json<CreatePermissionRequest>,
) -> Result<(StatusCode, Json<PermissionResponse>), AppError> {
    if req.resource.trim().is_empty() || req.action.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Resource and action are required"
        )));
    }

    let resource = req.resource.trim().to_string();
    let action = req.action.trim().to_string();
    let name = req
        .permission_name
        .unwrap_or_else(|| Permission::name_for(&resource, &action));

    let client = client_info(&headers);
    let permission = state
        .rbac
        .create_permission(&ctx.user, name, req.description, resource, action, &client)
        .await?;

    Ok((StatusCode::CREATED, Json(PermissionResponse::from(permission))))
}

/// Delete a permission. Rejected while any role references it.
///
/// DELETE /admin/permissions/:permission_id
pub async fn delete_permission(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(permission_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, AppError> {
    let client = client_info(&headers);
    state
        .rbac
        .delete_permission(&ctx.user, permission_id, &client)
        .await?;
    Ok(Json(MessageResponse::new("Permission deleted successfully")))
}

//! Audit query handlers: the read-only reporting surface.

use axum::extract::{Json, Query, State};

use crate::models::audit_entry::AuditEntryResponse;
use crate::services::AuditFilter;
use crate::AppState;
use service_core::error::AppError;

/// List audit entries, newest first, with optional filters.
///
/// GET /admin/audit
pub async fn list_audit_entries(
    State(state): State<AppState>,
    Query(filter): Query<AuditFilter>,
) -> Result<Json<Vec<AuditEntryResponse>>, AppError> {
    let entries = state.audit.query(&filter).await?;
    Ok(Json(
        entries.into_iter().map(AuditEntryResponse::from).collect(),
    ))
}

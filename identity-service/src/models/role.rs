//! Role model - named permission bundles for RBAC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Role entity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub role_id: Uuid,
    pub role_name: String,
    pub description: Option<String>,
    /// System roles reject name/description/permission-set mutation and
    /// deletion through the administrative surface.
    pub is_system_role: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Role {
    /// Create a new non-system role.
    pub fn new(role_name: String, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            role_id: Uuid::new_v4(),
            role_name,
            description,
            is_system_role: false,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Create a system-protected role (seed data only).
    pub fn new_system(role_name: String, description: Option<String>) -> Self {
        Self {
            is_system_role: true,
            ..Self::new(role_name, description)
        }
    }
}

/// A role together with the names of its permissions, as loaded for
/// effective-permission resolution.
#[derive(Debug, Clone)]
pub struct RoleWithPermissions {
    pub role_name: String,
    pub permissions: Vec<String>,
}

/// Role response for API.
#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub role_id: Uuid,
    pub role_name: String,
    pub description: Option<String>,
    pub is_system_role: bool,
    pub created_utc: DateTime<Utc>,
}

impl From<Role> for RoleResponse {
    fn from(r: Role) -> Self {
        Self {
            role_id: r.role_id,
            role_name: r.role_name,
            description: r.description,
            is_system_role: r.is_system_role,
            created_utc: r.created_utc,
        }
    }
}

/// Role with its permission names and assignee count, for detail views.
#[derive(Debug, Serialize)]
pub struct RoleDetailResponse {
    #[serde(flatten)]
    pub role: RoleResponse,
    pub permissions: Vec<String>,
    pub user_count: i64,
}

//! Permission model - atomic capabilities identified by name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Permission entity. The name is the lookup key; `(resource, action)` is a
/// decomposition of it and need not be unique.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub permission_id: Uuid,
    pub permission_name: String,
    pub description: Option<String>,
    pub resource: String,
    pub action: String,
    pub created_utc: DateTime<Utc>,
}

impl Permission {
    pub fn new(
        permission_name: String,
        description: Option<String>,
        resource: String,
        action: String,
    ) -> Self {
        Self {
            permission_id: Uuid::new_v4(),
            permission_name,
            description,
            resource,
            action,
            created_utc: Utc::now(),
        }
    }

    /// Build the conventional `resource:action` permission name.
    pub fn name_for(resource: &str, action: &str) -> String {
        format!("{}:{}", resource, action)
    }
}

/// Permission response for API.
#[derive(Debug, Serialize)]
pub struct PermissionResponse {
    pub permission_id: Uuid,
    pub permission_name: String,
    pub description: Option<String>,
    pub resource: String,
    pub action: String,
    pub created_utc: DateTime<Utc>,
}

impl From<Permission> for PermissionResponse {
    fn from(p: Permission) -> Self {
        Self {
            permission_id: p.permission_id,
            permission_name: p.permission_name,
            description: p.description,
            resource: p.resource,
            action: p.action,
            created_utc: p.created_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_for_joins_resource_and_action() {
        assert_eq!(Permission::name_for("tasks", "read"), "tasks:read");
    }
}

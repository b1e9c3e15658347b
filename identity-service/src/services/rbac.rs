//! RBAC engine: effective-permission resolution and the administrative
//! mutations over the role/permission graph.
//!
//! Permission checks are exact-match set membership; wildcard expansion, if a
//! caller wants it, is a policy decision above this layer.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::models::{
    AuditEntry, AuditEventType, ClientInfo, Permission, Role, RoleWithPermissions, User,
};
use crate::services::{AuditService, Database, ServiceError};

/// The union of permission names across a principal's roles, deduplicated
/// and order-independent.
pub fn effective_permissions(roles: &[RoleWithPermissions]) -> BTreeSet<String> {
    roles
        .iter()
        .flat_map(|r| r.permissions.iter().cloned())
        .collect()
}

#[derive(Clone)]
pub struct RbacService {
    db: Database,
    audit: AuditService,
}

impl RbacService {
    pub fn new(db: Database, audit: AuditService) -> Self {
        Self { db, audit }
    }

    // ==================== User administration ====================

    /// Assign a role to a user. Assigning an already-held role is a
    /// conflict, not a no-op.
    pub async fn assign_role(
        &self,
        actor: &User,
        user_id: Uuid,
        role_id: Uuid,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        let target = self
            .db
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "User" })?;
        let role = self
            .db
            .find_role_by_id(role_id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "Role" })?;

        let inserted = self.db.assign_role_to_user(user_id, role_id).await?;
        if !inserted {
            return Err(ServiceError::AlreadyAssigned {
                name: role.role_name,
            });
        }

        self.audit
            .record(
                AuditEntry::new(
                    AuditEventType::RoleAssigned,
                    format!("Role {} assigned to {}", role.role_name, target.handle),
                    true,
                    client,
                )
                .actor(actor.user_id, &actor.handle)
                .metadata(serde_json::json!({
                    "target_user": target.user_id,
                    "role": role.role_name,
                })),
            )
            .await?;

        Ok(())
    }

    /// Revoke a role from a user. A principal may not revoke their own
    /// `admin` role.
    pub async fn revoke_role(
        &self,
        actor: &User,
        user_id: Uuid,
        role_id: Uuid,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        let target = self
            .db
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "User" })?;
        let role = self
            .db
            .find_role_by_id(role_id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "Role" })?;

        if actor.user_id == user_id && role.role_name == "admin" {
            return Err(ServiceError::SelfModificationForbidden);
        }

        let removed = self.db.revoke_role_from_user(user_id, role_id).await?;
        if !removed {
            return Err(ServiceError::NotAssigned {
                name: role.role_name,
            });
        }

        self.audit
            .record(
                AuditEntry::new(
                    AuditEventType::RoleRevoked,
                    format!("Role {} revoked from {}", role.role_name, target.handle),
                    true,
                    client,
                )
                .actor(actor.user_id, &actor.handle)
                .metadata(serde_json::json!({
                    "target_user": target.user_id,
                    "role": role.role_name,
                })),
            )
            .await?;

        Ok(())
    }

    /// Activate or deactivate an account. A principal may not deactivate
    /// their own account.
    pub async fn set_user_active(
        &self,
        actor: &User,
        user_id: Uuid,
        active: bool,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        let target = self
            .db
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "User" })?;

        if actor.user_id == user_id && !active {
            return Err(ServiceError::SelfModificationForbidden);
        }

        self.db.update_user_active(user_id, active).await?;

        let (event, verb) = if active {
            (AuditEventType::UserActivated, "activated")
        } else {
            (AuditEventType::UserDeactivated, "deactivated")
        };
        self.audit
            .record(
                AuditEntry::new(
                    event,
                    format!("User {} {}", target.handle, verb),
                    true,
                    client,
                )
                .actor(actor.user_id, &actor.handle)
                .metadata(serde_json::json!({ "target_user": target.user_id })),
            )
            .await?;

        Ok(())
    }

    /// Administrative unlock: clears the lock and the failure counter
    /// regardless of timer state.
    pub async fn unlock_user(
        &self,
        actor: &User,
        user_id: Uuid,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        let target = self
            .db
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "User" })?;

        self.db.clear_lockout(user_id).await?;

        self.audit
            .record(
                AuditEntry::new(
                    AuditEventType::UserUnlocked,
                    format!("User {} unlocked", target.handle),
                    true,
                    client,
                )
                .actor(actor.user_id, &actor.handle)
                .metadata(serde_json::json!({ "target_user": target.user_id })),
            )
            .await?;

        Ok(())
    }

    // ==================== Role administration ====================

    pub async fn create_role(
        &self,
        actor: &User,
        role_name: String,
        description: Option<String>,
        client: &ClientInfo,
    ) -> Result<Role, ServiceError> {
        let role = Role::new(role_name, description);
        self.db.insert_role(&role).await?;

        self.audit
            .record(
                AuditEntry::new(
                    AuditEventType::RoleCreated,
                    format!("Role {} created", role.role_name),
                    true,
                    client,
                )
                .actor(actor.user_id, &actor.handle),
            )
            .await?;

        Ok(role)
    }

    /// Rename or re-describe a role. System roles are immutable through this
    /// surface.
    pub async fn update_role(
        &self,
        actor: &User,
        role_id: Uuid,
        role_name: Option<String>,
        description: Option<String>,
        client: &ClientInfo,
    ) -> Result<Role, ServiceError> {
        let role = self
            .db
            .find_role_by_id(role_id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "Role" })?;

        if role.is_system_role {
            return Err(ServiceError::SystemRoleProtected);
        }

        let new_name = role_name.unwrap_or_else(|| role.role_name.clone());
        let new_description = description.or_else(|| role.description.clone());
        self.db
            .update_role(role_id, &new_name, new_description.as_deref())
            .await?;

        self.audit
            .record(
                AuditEntry::new(
                    AuditEventType::RoleUpdated,
                    format!("Role {} updated", new_name),
                    true,
                    client,
                )
                .actor(actor.user_id, &actor.handle),
            )
            .await?;

        self.db
            .find_role_by_id(role_id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "Role" })
    }

    /// Delete a role. Rejected for system roles and for roles still held by
    /// any principal.
    pub async fn delete_role(
        &self,
        actor: &User,
        role_id: Uuid,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        let role = self
            .db
            .find_role_by_id(role_id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "Role" })?;

        if role.is_system_role {
            return Err(ServiceError::SystemRoleProtected);
        }

        let assigned = self.db.count_role_assignees(role_id).await?;
        if assigned > 0 {
            return Err(ServiceError::RoleInUse { assigned });
        }

        self.db.delete_role(role_id).await?;

        self.audit
            .record(
                AuditEntry::new(
                    AuditEventType::RoleDeleted,
                    format!("Role {} deleted", role.role_name),
                    true,
                    client,
                )
                .actor(actor.user_id, &actor.handle),
            )
            .await?;

        Ok(())
    }

    /// Grant a permission to a role. System roles' permission sets are
    /// immutable through this surface.
    pub async fn grant_permission(
        &self,
        actor: &User,
        role_id: Uuid,
        permission_id: Uuid,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        let role = self
            .db
            .find_role_by_id(role_id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "Role" })?;

        if role.is_system_role {
            return Err(ServiceError::SystemRoleProtected);
        }

        let permission = self
            .db
            .find_permission_by_id(permission_id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "Permission" })?;

        let inserted = self
            .db
            .assign_permission_to_role(role_id, permission_id)
            .await?;
        if !inserted {
            return Err(ServiceError::AlreadyAssigned {
                name: permission.permission_name,
            });
        }

        self.audit
            .record(
                AuditEntry::new(
                    AuditEventType::PermissionAssigned,
                    format!(
                        "Permission {} granted to role {}",
                        permission.permission_name, role.role_name
                    ),
                    true,
                    client,
                )
                .actor(actor.user_id, &actor.handle),
            )
            .await?;

        Ok(())
    }

    /// Remove a permission from a role.
    pub async fn revoke_permission(
        &self,
        actor: &User,
        role_id: Uuid,
        permission_id: Uuid,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        let role = self
            .db
            .find_role_by_id(role_id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "Role" })?;

        if role.is_system_role {
            return Err(ServiceError::SystemRoleProtected);
        }

        let permission = self
            .db
            .find_permission_by_id(permission_id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "Permission" })?;

        let removed = self
            .db
            .revoke_permission_from_role(role_id, permission_id)
            .await?;
        if !removed {
            return Err(ServiceError::NotAssigned {
                name: permission.permission_name,
            });
        }

        self.audit
            .record(
                AuditEntry::new(
                    AuditEventType::PermissionRevoked,
                    format!(
                        "Permission {} revoked from role {}",
                        permission.permission_name, role.role_name
                    ),
                    true,
                    client,
                )
                .actor(actor.user_id, &actor.handle),
            )
            .await?;

        Ok(())
    }

    // ==================== Permission administration ====================

    pub async fn create_permission(
        &self,
        actor: &User,
        permission_name: String,
        description: Option<String>,
        resource: String,
        action: String,
        client: &ClientInfo,
    ) -> Result<Permission, ServiceError> {
        let permission = Permission::new(permission_name, description, resource, action);
        self.db.insert_permission(&permission).await?;

        self.audit
            .record(
                AuditEntry::new(
                    AuditEventType::PermissionCreated,
                    format!("Permission {} created", permission.permission_name),
                    true,
                    client,
                )
                .actor(actor.user_id, &actor.handle),
            )
            .await?;

        Ok(permission)
    }

    /// Delete a permission. Rejected while any role references it.
    pub async fn delete_permission(
        &self,
        actor: &User,
        permission_id: Uuid,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        let permission = self
            .db
            .find_permission_by_id(permission_id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "Permission" })?;

        let references = self.db.count_permission_roles(permission_id).await?;
        if references > 0 {
            return Err(ServiceError::PermissionInUse);
        }

        self.db.delete_permission(permission_id).await?;

        self.audit
            .record(
                AuditEntry::new(
                    AuditEventType::PermissionDeleted,
                    format!("Permission {} deleted", permission.permission_name),
                    true,
                    client,
                )
                .actor(actor.user_id, &actor.handle),
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(name: &str, permissions: &[&str]) -> RoleWithPermissions {
        RoleWithPermissions {
            role_name: name.to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn effective_permissions_is_exact_set_union() {
        let roles = vec![role("a", &["p1", "p2"]), role("b", &["p2", "p3"])];
        let effective = effective_permissions(&roles);

        assert_eq!(effective.len(), 3);
        assert!(effective.contains("p1"));
        assert!(effective.contains("p2"));
        assert!(effective.contains("p3"));
    }

    #[test]
    fn effective_permissions_of_no_roles_is_empty() {
        assert!(effective_permissions(&[]).is_empty());
    }

    #[test]
    fn effective_permissions_ignores_role_order() {
        let forward = vec![role("a", &["p1"]), role("b", &["p2"])];
        let backward = vec![role("b", &["p2"]), role("a", &["p1"])];
        assert_eq!(
            effective_permissions(&forward),
            effective_permissions(&backward)
        );
    }
}

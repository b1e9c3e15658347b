//! Idempotent seed data: the default permission catalog, the system roles,
//! and the bootstrap admin account.

use crate::models::{Permission, Role, User};
use crate::services::{Database, ServiceError};
use crate::utils::{hash_password, Password};

/// Default permission catalog for the MES backend.
const PERMISSIONS: &[(&str, &str, &str, &str)] = &[
    ("tasks:create", "Create new tasks", "tasks", "create"),
    ("tasks:read", "View tasks", "tasks", "read"),
    ("tasks:update", "Update tasks", "tasks", "update"),
    ("tasks:delete", "Delete tasks", "tasks", "delete"),
    ("routes:create", "Create new routes", "routes", "create"),
    ("routes:read", "View routes", "routes", "read"),
    ("routes:update", "Update routes", "routes", "update"),
    ("routes:delete", "Delete routes", "routes", "delete"),
    ("operations:create", "Create new operations", "operations", "create"),
    ("operations:read", "View operations", "operations", "read"),
    ("operations:update", "Update operations", "operations", "update"),
    ("operations:delete", "Delete operations", "operations", "delete"),
    ("bom:create", "Create new BOM items", "bom", "create"),
    ("bom:read", "View BOM items", "bom", "read"),
    ("bom:update", "Update BOM items", "bom", "update"),
    ("bom:delete", "Delete BOM items", "bom", "delete"),
    ("reports:create", "Create new reports", "reports", "create"),
    ("reports:read", "View reports", "reports", "read"),
    ("reports:update", "Update reports", "reports", "update"),
    ("reports:delete", "Delete reports", "reports", "delete"),
    ("users:create", "Create new users", "users", "create"),
    ("users:read", "View users", "users", "read"),
    ("users:update", "Update users", "users", "update"),
    ("users:delete", "Delete users", "users", "delete"),
    ("roles:create", "Create new roles", "roles", "create"),
    ("roles:read", "View roles", "roles", "read"),
    ("roles:update", "Update roles", "roles", "update"),
    ("roles:delete", "Delete roles", "roles", "delete"),
    ("system:admin", "System administration", "system", "admin"),
    ("audit_logs:read", "View audit logs", "audit_logs", "read"),
];

/// Default system roles and their permission grants.
const ROLES: &[(&str, &str, &[&str])] = &[
    (
        "worker",
        "Basic worker role with limited access",
        &["tasks:read", "tasks:update", "routes:read"],
    ),
    (
        "engineer",
        "Engineer role with extended access",
        &[
            "tasks:create", "tasks:read", "tasks:update", "tasks:delete",
            "routes:create", "routes:read", "routes:update", "routes:delete",
            "operations:create", "operations:read", "operations:update", "operations:delete",
            "bom:create", "bom:read", "bom:update", "bom:delete",
            "reports:read",
        ],
    ),
    (
        "manager",
        "Manager role with management access",
        &[
            "tasks:create", "tasks:read", "tasks:update", "tasks:delete",
            "routes:create", "routes:read", "routes:update", "routes:delete",
            "reports:create", "reports:read", "reports:update", "reports:delete",
            "users:read", "audit_logs:read",
        ],
    ),
    (
        "admin",
        "Administrator role with full access",
        &[
            "tasks:create", "tasks:read", "tasks:update", "tasks:delete",
            "routes:create", "routes:read", "routes:update", "routes:delete",
            "operations:create", "operations:read", "operations:update", "operations:delete",
            "bom:create", "bom:read", "bom:update", "bom:delete",
            "reports:create", "reports:read", "reports:update", "reports:delete",
            "users:create", "users:read", "users:update", "users:delete",
            "roles:create", "roles:read", "roles:update", "roles:delete",
            "system:admin", "audit_logs:read",
        ],
    ),
];

const ADMIN_HANDLE: &str = "admin";
const ADMIN_EMAIL: &str = "admin@mes.local";

/// Create the default permissions, system roles, and bootstrap admin account.
/// Safe to run on every startup; existing records are left untouched.
pub async fn seed_defaults(db: &Database, admin_password: &str) -> Result<(), ServiceError> {
    for (name, description, resource, action) in PERMISSIONS {
        if db.find_permission_by_name(name).await?.is_none() {
            let permission = Permission::new(
                (*name).to_string(),
                Some((*description).to_string()),
                (*resource).to_string(),
                (*action).to_string(),
            );
            db.insert_permission(&permission).await?;
        }
    }

    for (role_name, description, permission_names) in ROLES {
        let role = match db.find_role_by_name(role_name).await? {
            Some(role) => role,
            None => {
                let role =
                    Role::new_system((*role_name).to_string(), Some((*description).to_string()));
                db.insert_role(&role).await?;
                role
            }
        };

        for permission_name in *permission_names {
            if let Some(permission) = db.find_permission_by_name(permission_name).await? {
                db.assign_permission_to_role(role.role_id, permission.permission_id)
                    .await?;
            }
        }
    }

    if db.find_user_by_handle(ADMIN_HANDLE).await?.is_none() {
        let password_hash = hash_password(&Password::new(admin_password.to_string()))
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Password hashing error: {}", e)))?;
        let admin = User::new(
            ADMIN_HANDLE.to_string(),
            ADMIN_EMAIL.to_string(),
            password_hash.into_string(),
            None,
        );
        db.insert_user(&admin).await?;

        if let Some(admin_role) = db.find_role_by_name("admin").await? {
            db.assign_role_to_user(admin.user_id, admin_role.role_id)
                .await?;
        }

        tracing::info!(handle = ADMIN_HANDLE, "Bootstrap admin account created");
    }

    tracing::info!("Seed data ensured");
    Ok(())
}

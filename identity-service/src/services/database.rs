//! PostgreSQL store for the identity service.
//!
//! Operations that participate in lockout accounting or backup-code
//! consumption run against an explicit transaction handle with the user row
//! locked (`SELECT ... FOR UPDATE`), so concurrent attempts on the same
//! principal serialize at the storage boundary. Everything else goes through
//! the shared pool.

use sqlx::postgres::{PgPool, Postgres};
use sqlx::{QueryBuilder, Transaction};
use uuid::Uuid;

use crate::models::{AuditEntry, Permission, Role, RoleWithPermissions, User};
use crate::services::audit::AuditFilter;
use crate::services::error::ServiceError;

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

fn duplicate_identity(e: sqlx::Error, field: &'static str) -> ServiceError {
    match e.as_database_error() {
        Some(db) if db.code().as_deref() == Some("23505") => {
            ServiceError::DuplicateIdentity { field }
        }
        _ => ServiceError::Database(e),
    }
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Open an explicit transaction. Callers must commit on every success
    /// path; dropping the handle rolls back.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, ServiceError> {
        Ok(self.pool.begin().await?)
    }

    // ==================== User Operations ====================

    /// Insert a new user. Handle/email collisions surface as
    /// `DuplicateIdentity`.
    pub async fn insert_user(&self, user: &User) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO users (
                user_id, handle, email, password_hash, phone_number,
                totp_secret, backup_codes, two_factor_enabled,
                failed_login_attempts, locked_until, last_login,
                is_active, created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.handle)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.phone_number)
        .bind(&user.totp_secret)
        .bind(&user.backup_codes)
        .bind(user.two_factor_enabled)
        .bind(user.failed_login_attempts)
        .bind(user.locked_until)
        .bind(user.last_login)
        .bind(user.is_active)
        .bind(user.created_utc)
        .bind(user.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_identity(e, "handle or email"))?;
        Ok(())
    }

    /// Find user by ID.
    pub async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Find user by handle.
    pub async fn find_user_by_handle(&self, handle: &str) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE handle = $1")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Find user by handle inside a transaction, locking the row for the
    /// remainder of the transaction.
    pub async fn find_user_by_handle_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        handle: &str,
    ) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE handle = $1 FOR UPDATE")
            .bind(handle)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(user)
    }

    /// Find user by ID inside a transaction, locking the row.
    pub async fn find_user_by_id_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        user_id: Uuid,
    ) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(user)
    }

    /// Persist the security-relevant state of a (row-locked) user: lockout
    /// counters and the two-factor credential.
    pub async fn persist_security_state(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        user: &User,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = $2,
                locked_until = $3,
                last_login = $4,
                totp_secret = $5,
                backup_codes = $6,
                two_factor_enabled = $7,
                updated_utc = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user.user_id)
        .bind(user.failed_login_attempts)
        .bind(user.locked_until)
        .bind(user.last_login)
        .bind(&user.totp_secret)
        .bind(&user.backup_codes)
        .bind(user.two_factor_enabled)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// List all users.
    pub async fn list_users(&self) -> Result<Vec<User>, ServiceError> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY handle")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    /// Update a user's password hash.
    pub async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE users SET password_hash = $2, updated_utc = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Set a user's active flag.
    pub async fn update_user_active(
        &self,
        user_id: Uuid,
        is_active: bool,
    ) -> Result<(), ServiceError> {
        sqlx::query("UPDATE users SET is_active = $2, updated_utc = NOW() WHERE user_id = $1")
            .bind(user_id)
            .bind(is_active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Administrative unlock: clear the lock and the failure counter.
    pub async fn clear_lockout(&self, user_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = 0, locked_until = NULL, updated_utc = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ==================== Role Operations ====================

    /// Insert a new role. Name collisions surface as `DuplicateIdentity`.
    pub async fn insert_role(&self, role: &Role) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO roles (role_id, role_name, description, is_system_role, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(role.role_id)
        .bind(&role.role_name)
        .bind(&role.description)
        .bind(role.is_system_role)
        .bind(role.created_utc)
        .bind(role.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_identity(e, "role name"))?;
        Ok(())
    }

    pub async fn find_role_by_id(&self, role_id: Uuid) -> Result<Option<Role>, ServiceError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE role_id = $1")
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role)
    }

    pub async fn find_role_by_name(&self, role_name: &str) -> Result<Option<Role>, ServiceError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE role_name = $1")
            .bind(role_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role)
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, ServiceError> {
        let roles = sqlx::query_as::<_, Role>("SELECT * FROM roles ORDER BY role_name")
            .fetch_all(&self.pool)
            .await?;
        Ok(roles)
    }

    /// Update a role's name/description.
    pub async fn update_role(
        &self,
        role_id: Uuid,
        role_name: &str,
        description: Option<&str>,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            UPDATE roles SET role_name = $2, description = $3, updated_utc = NOW()
            WHERE role_id = $1
            "#,
        )
        .bind(role_id)
        .bind(role_name)
        .bind(description)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_identity(e, "role name"))?;
        Ok(())
    }

    pub async fn delete_role(&self, role_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query("DELETE FROM roles WHERE role_id = $1")
            .bind(role_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of users currently holding the role.
    pub async fn count_role_assignees(&self, role_id: Uuid) -> Result<i64, ServiceError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM user_roles WHERE role_id = $1")
                .bind(role_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Permission names granted by a role.
    pub async fn role_permission_names(&self, role_id: Uuid) -> Result<Vec<String>, ServiceError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT p.permission_name
            FROM role_permissions rp
            JOIN permissions p ON p.permission_id = rp.permission_id
            WHERE rp.role_id = $1
            ORDER BY p.permission_name
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    // ==================== Permission Operations ====================

    /// Insert a new permission. Name collisions surface as
    /// `DuplicateIdentity`.
    pub async fn insert_permission(&self, permission: &Permission) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO permissions (permission_id, permission_name, description, resource, action, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(permission.permission_id)
        .bind(&permission.permission_name)
        .bind(&permission.description)
        .bind(&permission.resource)
        .bind(&permission.action)
        .bind(permission.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_identity(e, "permission name"))?;
        Ok(())
    }

    pub async fn find_permission_by_id(
        &self,
        permission_id: Uuid,
    ) -> Result<Option<Permission>, ServiceError> {
        let permission =
            sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE permission_id = $1")
                .bind(permission_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(permission)
    }

    pub async fn find_permission_by_name(
        &self,
        permission_name: &str,
    ) -> Result<Option<Permission>, ServiceError> {
        let permission = sqlx::query_as::<_, Permission>(
            "SELECT * FROM permissions WHERE permission_name = $1",
        )
        .bind(permission_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(permission)
    }

    pub async fn list_permissions(&self) -> Result<Vec<Permission>, ServiceError> {
        let permissions =
            sqlx::query_as::<_, Permission>("SELECT * FROM permissions ORDER BY permission_name")
                .fetch_all(&self.pool)
                .await?;
        Ok(permissions)
    }

    pub async fn delete_permission(&self, permission_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query("DELETE FROM permissions WHERE permission_id = $1")
            .bind(permission_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of roles referencing the permission.
    pub async fn count_permission_roles(&self, permission_id: Uuid) -> Result<i64, ServiceError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM role_permissions WHERE permission_id = $1")
                .bind(permission_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    // ==================== Association Operations ====================

    /// Assign a role to a user. Returns false when the assignment already
    /// existed (the caller decides whether that is a conflict).
    pub async fn assign_role_to_user(
        &self,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(role_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke a role from a user. Returns false when no assignment existed.
    pub async fn revoke_role_from_user(
        &self,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id)
            .bind(role_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Grant a permission to a role. Returns false when already granted.
    pub async fn assign_permission_to_role(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id)
            VALUES ($1, $2) ON CONFLICT DO NOTHING
            "#,
        )
        .bind(role_id)
        .bind(permission_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove a permission from a role. Returns false when it was not
    /// granted.
    pub async fn revoke_permission_from_role(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let result =
            sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = $2")
                .bind(role_id)
                .bind(permission_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Names of the roles assigned to a user.
    pub async fn user_role_names(&self, user_id: Uuid) -> Result<Vec<String>, ServiceError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT r.role_name
            FROM user_roles ur
            JOIN roles r ON r.role_id = ur.role_id
            WHERE ur.user_id = $1
            ORDER BY r.role_name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Load a user's roles together with each role's permission names, the
    /// input to effective-permission resolution.
    pub async fn load_roles_with_permissions(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RoleWithPermissions>, ServiceError> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT r.role_name, p.permission_name
            FROM user_roles ur
            JOIN roles r ON r.role_id = ur.role_id
            LEFT JOIN role_permissions rp ON rp.role_id = r.role_id
            LEFT JOIN permissions p ON p.permission_id = rp.permission_id
            WHERE ur.user_id = $1
            ORDER BY r.role_name, p.permission_name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut roles: Vec<RoleWithPermissions> = Vec::new();
        for (role_name, permission) in rows {
            match roles.last_mut() {
                Some(last) if last.role_name == role_name => {
                    if let Some(p) = permission {
                        last.permissions.push(p);
                    }
                }
                _ => roles.push(RoleWithPermissions {
                    role_name,
                    permissions: permission.into_iter().collect(),
                }),
            }
        }
        Ok(roles)
    }

    // ==================== Audit Operations ====================

    /// Append an audit entry. There is intentionally no update or delete
    /// counterpart.
    pub async fn insert_audit_entry(&self, entry: &AuditEntry) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO audit_entries (
                entry_id, user_id, handle, event_type, event_description,
                success, ip_address, user_agent, event_metadata, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.entry_id)
        .bind(entry.user_id)
        .bind(&entry.handle)
        .bind(&entry.event_type)
        .bind(&entry.event_description)
        .bind(entry.success)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(&entry.event_metadata)
        .bind(entry.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Query audit entries with optional filters, newest first.
    pub async fn query_audit_entries(
        &self,
        filter: &AuditFilter,
    ) -> Result<Vec<AuditEntry>, ServiceError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM audit_entries WHERE TRUE");

        if let Some(event_type) = &filter.event_type {
            qb.push(" AND event_type = ").push_bind(event_type);
        }
        if let Some(user_id) = filter.user_id {
            qb.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(success) = filter.success {
            qb.push(" AND success = ").push_bind(success);
        }
        if let Some(from) = filter.from {
            qb.push(" AND created_utc >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND created_utc <= ").push_bind(to);
        }

        qb.push(" ORDER BY created_utc DESC LIMIT ")
            .push_bind(filter.limit())
            .push(" OFFSET ")
            .push_bind(filter.offset());

        let entries = qb
            .build_query_as::<AuditEntry>()
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }
}

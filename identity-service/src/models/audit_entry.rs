//! Audit entry model - immutable records of authorization-relevant decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Audit event kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    UserRegistered,
    LoginSuccess,
    LoginFailure,
    Logout,
    PasswordChanged,
    PasswordChangeFailed,
    TwoFactorSetup,
    TwoFactorEnabled,
    TwoFactorEnableFailed,
    TwoFactorDisabled,
    TwoFactorDisableFailed,
    TwoFactorVerificationSuccess,
    TwoFactorVerificationFailed,
    AuthorizationFailure,
    RoleAssigned,
    RoleRevoked,
    RoleCreated,
    RoleUpdated,
    RoleDeleted,
    PermissionCreated,
    PermissionDeleted,
    PermissionAssigned,
    PermissionRevoked,
    UserActivated,
    UserDeactivated,
    UserUnlocked,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::UserRegistered => "user_registered",
            AuditEventType::LoginSuccess => "login_success",
            AuditEventType::LoginFailure => "login_failure",
            AuditEventType::Logout => "logout",
            AuditEventType::PasswordChanged => "password_changed",
            AuditEventType::PasswordChangeFailed => "password_change_failed",
            AuditEventType::TwoFactorSetup => "2fa_setup",
            AuditEventType::TwoFactorEnabled => "2fa_enabled",
            AuditEventType::TwoFactorEnableFailed => "2fa_enable_failed",
            AuditEventType::TwoFactorDisabled => "2fa_disabled",
            AuditEventType::TwoFactorDisableFailed => "2fa_disable_failed",
            AuditEventType::TwoFactorVerificationSuccess => "2fa_verification_success",
            AuditEventType::TwoFactorVerificationFailed => "2fa_verification_failed",
            AuditEventType::AuthorizationFailure => "authorization_failure",
            AuditEventType::RoleAssigned => "role_assigned",
            AuditEventType::RoleRevoked => "role_revoked",
            AuditEventType::RoleCreated => "role_created",
            AuditEventType::RoleUpdated => "role_updated",
            AuditEventType::RoleDeleted => "role_deleted",
            AuditEventType::PermissionCreated => "permission_created",
            AuditEventType::PermissionDeleted => "permission_deleted",
            AuditEventType::PermissionAssigned => "permission_assigned",
            AuditEventType::PermissionRevoked => "permission_revoked",
            AuditEventType::UserActivated => "user_activated",
            AuditEventType::UserDeactivated => "user_deactivated",
            AuditEventType::UserUnlocked => "user_unlocked",
        }
    }
}

/// Client metadata passed through opaquely by the transport layer.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Audit entry entity. Append-only: never mutated or deleted through the
/// engine.
#[derive(Debug, Clone, FromRow)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    pub user_id: Option<Uuid>,
    /// Denormalized so entries remain attributable after user deletion.
    pub handle: Option<String>,
    pub event_type: String,
    pub event_description: String,
    pub success: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub event_metadata: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        event_type: AuditEventType,
        event_description: impl Into<String>,
        success: bool,
        client: &ClientInfo,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            user_id: None,
            handle: None,
            event_type: event_type.as_str().to_string(),
            event_description: event_description.into(),
            success,
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
            event_metadata: None,
            created_utc: Utc::now(),
        }
    }

    pub fn actor(mut self, user_id: Uuid, handle: &str) -> Self {
        self.user_id = Some(user_id);
        self.handle = Some(handle.to_string());
        self
    }

    /// Attribute the entry by handle only (e.g. failed login for an unknown
    /// or not-yet-resolved principal).
    pub fn actor_handle(mut self, handle: &str) -> Self {
        self.handle = Some(handle.to_string());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.event_metadata = Some(metadata);
        self
    }
}

/// Audit entry response for API.
#[derive(Debug, Serialize)]
pub struct AuditEntryResponse {
    pub entry_id: Uuid,
    pub user_id: Option<Uuid>,
    pub handle: Option<String>,
    pub event_type: String,
    pub event_description: String,
    pub success: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub event_metadata: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}

impl From<AuditEntry> for AuditEntryResponse {
    fn from(e: AuditEntry) -> Self {
        Self {
            entry_id: e.entry_id,
            user_id: e.user_id,
            handle: e.handle,
            event_type: e.event_type,
            event_description: e.event_description,
            success: e.success,
            ip_address: e.ip_address,
            user_agent: e.user_agent,
            event_metadata: e.event_metadata,
            created_utc: e.created_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_attaches_actor_and_metadata() {
        let client = ClientInfo {
            ip_address: Some("10.1.2.3".to_string()),
            user_agent: Some("test-agent".to_string()),
        };
        let user_id = Uuid::new_v4();

        let entry = AuditEntry::new(
            AuditEventType::AuthorizationFailure,
            "denied",
            false,
            &client,
        )
        .actor(user_id, "operator1")
        .metadata(serde_json::json!({ "required_permission": "tasks:read" }));

        assert_eq!(entry.event_type, "authorization_failure");
        assert_eq!(entry.user_id, Some(user_id));
        assert_eq!(entry.handle.as_deref(), Some("operator1"));
        assert!(!entry.success);
        assert_eq!(entry.ip_address.as_deref(), Some("10.1.2.3"));
        assert!(entry.event_metadata.is_some());
    }
}

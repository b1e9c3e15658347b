use chrono::{DateTime, Utc};
use service_core::error::AppError;
use thiserror::Error;

/// Domain error taxonomy for the identity engine.
///
/// Every variant is terminal for the calling operation; storage failures are
/// kept distinct from authorization outcomes so infrastructure problems are
/// never reported as denials.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Account is locked due to too many failed attempts")]
    AccountLocked { until: Option<DateTime<Utc>> },

    #[error("Permission denied: {required}")]
    PermissionDenied { required: String },

    #[error("Role required: {required}")]
    RoleRequired { required: String },

    // Unknown handle and wrong password intentionally share this variant so
    // callers cannot enumerate accounts.
    #[error("Invalid credentials")]
    InvalidCredential,

    #[error("Invalid two-factor code")]
    InvalidCode,

    #[error("Two-factor authentication is not enabled")]
    TwoFactorNotEnabled,

    #[error("Two-factor authentication is already enabled")]
    TwoFactorAlreadyEnabled,

    #[error("{name} is already assigned")]
    AlreadyAssigned { name: String },

    #[error("{name} is not assigned")]
    NotAssigned { name: String },

    #[error("{field} already exists")]
    DuplicateIdentity { field: &'static str },

    #[error("Operation not permitted on your own account")]
    SelfModificationForbidden,

    #[error("System roles cannot be modified or deleted")]
    SystemRoleProtected,

    #[error("Role is assigned to {assigned} user(s) and cannot be deleted")]
    RoleInUse { assigned: i64 },

    #[error("Permission is referenced by one or more roles and cannot be deleted")]
    PermissionInUse,

    #[error("{0}")]
    WeakPassword(&'static str),

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Machine-readable denial reason for the transport layer.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Unauthenticated => "unauthenticated",
            ServiceError::AccountInactive => "account_inactive",
            ServiceError::AccountLocked { .. } => "account_locked",
            ServiceError::PermissionDenied { .. } => "permission_denied",
            ServiceError::RoleRequired { .. } => "role_required",
            ServiceError::InvalidCredential => "invalid_credential",
            ServiceError::InvalidCode => "invalid_code",
            ServiceError::TwoFactorNotEnabled => "two_factor_not_enabled",
            ServiceError::TwoFactorAlreadyEnabled => "two_factor_already_enabled",
            ServiceError::AlreadyAssigned { .. } => "already_assigned",
            ServiceError::NotAssigned { .. } => "not_assigned",
            ServiceError::DuplicateIdentity { .. } => "duplicate_identity",
            ServiceError::SelfModificationForbidden => "self_modification_forbidden",
            ServiceError::SystemRoleProtected => "system_role_protected",
            ServiceError::RoleInUse { .. } => "role_in_use",
            ServiceError::PermissionInUse => "permission_in_use",
            ServiceError::WeakPassword(_) => "weak_password",
            ServiceError::NotFound { .. } => "not_found",
            ServiceError::Database(_) => "infrastructure",
            ServiceError::Internal(_) => "internal",
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        match err {
            ServiceError::Unauthenticated
            | ServiceError::InvalidCredential
            | ServiceError::InvalidCode => AppError::Unauthorized { kind, message },

            ServiceError::AccountInactive
            | ServiceError::AccountLocked { .. }
            | ServiceError::PermissionDenied { .. }
            | ServiceError::RoleRequired { .. }
            | ServiceError::SelfModificationForbidden
            | ServiceError::SystemRoleProtected => AppError::Forbidden { kind, message },

            ServiceError::TwoFactorNotEnabled
            | ServiceError::TwoFactorAlreadyEnabled
            | ServiceError::AlreadyAssigned { .. }
            | ServiceError::NotAssigned { .. }
            | ServiceError::DuplicateIdentity { .. }
            | ServiceError::RoleInUse { .. }
            | ServiceError::PermissionInUse => AppError::Conflict { kind, message },

            ServiceError::WeakPassword(reason) => {
                AppError::BadRequest(anyhow::anyhow!("{}", reason))
            }

            ServiceError::NotFound { .. } => AppError::NotFound(anyhow::anyhow!("{}", message)),

            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    fn status_of(err: ServiceError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn credential_failures_map_to_401() {
        assert_eq!(status_of(ServiceError::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(ServiceError::InvalidCredential), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(ServiceError::InvalidCode), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn denials_map_to_403() {
        assert_eq!(status_of(ServiceError::AccountInactive), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(ServiceError::AccountLocked { until: None }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(ServiceError::PermissionDenied {
                required: "tasks:read".to_string()
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(ServiceError::SelfModificationForbidden),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn state_conflicts_map_to_409() {
        assert_eq!(
            status_of(ServiceError::AlreadyAssigned {
                name: "worker".to_string()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ServiceError::NotAssigned {
                name: "worker".to_string()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ServiceError::DuplicateIdentity { field: "handle" }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ServiceError::RoleInUse { assigned: 2 }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn storage_failures_are_not_reported_as_denials() {
        assert_eq!(
            status_of(ServiceError::Database(sqlx::Error::PoolClosed)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unknown_handle_and_wrong_password_render_identically() {
        // Both paths construct the same variant; the message carries no
        // distinguishing detail.
        let a = ServiceError::InvalidCredential.to_string();
        let b = ServiceError::InvalidCredential.to_string();
        assert_eq!(a, b);
        assert!(!a.contains("handle"));
        assert!(!a.contains("password"));
    }
}

//! Route-table authorization guards.
//!
//! Each protected route is wrapped with an explicit guard layer naming the
//! capability it requires; there is no annotation magic. Denial ordering:
//! unauthenticated, inactive, locked, then membership. Every failure emits an
//! audit entry before the response leaves.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::middleware::auth::{client_info, AuthContext};
use crate::models::{AuditEntry, AuditEventType};
use crate::services::ServiceError;
use crate::AppState;
use service_core::error::AppError;

/// A required capability for a protected operation.
#[derive(Debug, Clone, Copy)]
pub enum AuthorizationGuard {
    /// Any resolved, active, unlocked principal.
    Authenticated,
    /// Requires an exact permission name in the effective set.
    Permission(&'static str),
    /// Requires an exact role name among the assigned roles.
    Role(&'static str),
}

impl AuthorizationGuard {
    /// Evaluate the guard against a resolved principal.
    pub fn check(&self, ctx: &AuthContext) -> Result<(), ServiceError> {
        if !ctx.user.is_active {
            return Err(ServiceError::AccountInactive);
        }

        if ctx.user.is_locked() {
            return Err(ServiceError::AccountLocked {
                until: ctx.user.locked_until,
            });
        }

        match self {
            AuthorizationGuard::Authenticated => Ok(()),
            AuthorizationGuard::Permission(name) => {
                if ctx.has_permission(name) {
                    Ok(())
                } else {
                    Err(ServiceError::PermissionDenied {
                        required: (*name).to_string(),
                    })
                }
            }
            AuthorizationGuard::Role(name) => {
                if ctx.has_role(name) {
                    Ok(())
                } else {
                    Err(ServiceError::RoleRequired {
                        required: (*name).to_string(),
                    })
                }
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            AuthorizationGuard::Authenticated => "authenticated access".to_string(),
            AuthorizationGuard::Permission(name) => format!("permission {}", name),
            AuthorizationGuard::Role(name) => format!("role {}", name),
        }
    }
}

/// State for one guard layer: the application state plus the capability the
/// wrapped routes require.
#[derive(Clone)]
pub struct GuardState {
    pub state: AppState,
    pub guard: AuthorizationGuard,
}

impl GuardState {
    pub fn new(state: AppState, guard: AuthorizationGuard) -> Self {
        Self { state, guard }
    }
}

/// Middleware enforcing an `AuthorizationGuard` on the wrapped routes.
/// Expects `auth_middleware` to have run first.
pub async fn authorization_guard_middleware(
    State(gs): State<GuardState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = client_info(req.headers());

    let Some(ctx) = req.extensions().get::<AuthContext>() else {
        gs.state.audit.record_async(AuditEntry::new(
            AuditEventType::AuthorizationFailure,
            format!("Unauthenticated request requiring {}", gs.guard.describe()),
            false,
            &client,
        ));
        return Err(ServiceError::Unauthenticated.into());
    };

    if let Err(err) = gs.guard.check(ctx) {
        gs.state.audit.record_async(
            AuditEntry::new(
                AuditEventType::AuthorizationFailure,
                format!(
                    "User {} denied {}: {}",
                    ctx.user.handle,
                    gs.guard.describe(),
                    err.kind()
                ),
                false,
                &client,
            )
            .actor(ctx.user.user_id, &ctx.user.handle)
            .metadata(serde_json::json!({ "required": gs.guard.describe() })),
        );
        return Err(err.into());
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use chrono::{Duration, Utc};
    use std::collections::BTreeSet;

    fn context(active: bool, locked: bool, roles: &[&str], permissions: &[&str]) -> AuthContext {
        let mut user = User::new(
            "operator1".to_string(),
            "operator1@mes.local".to_string(),
            "$argon2id$fake".to_string(),
            None,
        );
        user.is_active = active;
        if locked {
            user.locked_until = Some(Utc::now() + Duration::minutes(30));
        }

        AuthContext {
            user,
            role_names: roles.iter().map(|r| r.to_string()).collect(),
            permissions: permissions.iter().map(|p| p.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn inactive_account_is_denied_before_membership() {
        let ctx = context(false, false, &["admin"], &["users:read"]);
        let err = AuthorizationGuard::Permission("users:read")
            .check(&ctx)
            .unwrap_err();
        assert!(matches!(err, ServiceError::AccountInactive));
    }

    #[test]
    fn locked_account_is_denied_before_membership() {
        let ctx = context(true, true, &["admin"], &["users:read"]);
        let err = AuthorizationGuard::Permission("users:read")
            .check(&ctx)
            .unwrap_err();
        assert!(matches!(err, ServiceError::AccountLocked { .. }));
    }

    #[test]
    fn inactive_wins_over_locked() {
        let ctx = context(false, true, &[], &[]);
        let err = AuthorizationGuard::Authenticated.check(&ctx).unwrap_err();
        assert!(matches!(err, ServiceError::AccountInactive));
    }

    #[test]
    fn permission_check_is_exact_match() {
        let ctx = context(true, false, &[], &["users:read"]);
        assert!(AuthorizationGuard::Permission("users:read").check(&ctx).is_ok());

        // No wildcard expansion at this layer
        let err = AuthorizationGuard::Permission("users:update")
            .check(&ctx)
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::PermissionDenied { required } if required == "users:update"
        ));
    }

    #[test]
    fn role_check_is_exact_match() {
        let ctx = context(true, false, &["manager"], &[]);
        assert!(AuthorizationGuard::Role("manager").check(&ctx).is_ok());
        let err = AuthorizationGuard::Role("admin").check(&ctx).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::RoleRequired { required } if required == "admin"
        ));
    }

    #[test]
    fn expired_lock_no_longer_denies() {
        let mut ctx = context(true, false, &[], &[]);
        ctx.user.locked_until = Some(Utc::now() - Duration::seconds(1));
        assert!(AuthorizationGuard::Authenticated.check(&ctx).is_ok());
    }
}

//! Bearer-credential resolution: token -> claims -> principal.
//!
//! The resolved `AuthContext` (user plus role names plus effective
//! permissions) is stored in request extensions for guards and handlers.

use std::collections::BTreeSet;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::models::{ClientInfo, User};
use crate::services::effective_permissions;
use crate::AppState;
use service_core::error::AppError;

/// The resolved principal for the current request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub role_names: Vec<String>,
    pub permissions: BTreeSet<String>,
}

impl AuthContext {
    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.contains(name)
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.role_names.iter().any(|r| r == name)
    }
}

/// Extract the opaque client metadata for audit entries.
pub fn client_info(headers: &HeaderMap) -> ClientInfo {
    ClientInfo {
        ip_address: headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string()),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
    }
}

fn unauthenticated(message: &str) -> AppError {
    AppError::Unauthorized {
        kind: "unauthenticated",
        message: message.to_string(),
    }
}

/// Middleware resolving the bearer credential to a principal.
///
/// Activity and lock state are deliberately not checked here; that is the
/// guard's job, so the denial ordering stays in one place.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| unauthenticated("Missing or invalid Authorization header"))?;

    let claims = state
        .jwt
        .validate_access_token(token)
        .map_err(|_| unauthenticated("Invalid or expired token"))?;

    let user_id: Uuid = claims
        .sub
        .parse()
        .map_err(|_| unauthenticated("Invalid token subject"))?;

    let user = state
        .db
        .find_user_by_id(user_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| {
            state.audit.record_async(crate::models::AuditEntry::new(
                crate::models::AuditEventType::AuthorizationFailure,
                format!("No principal found for token subject {}", user_id),
                false,
                &client_info(req.headers()),
            ));
            unauthenticated("Unknown principal")
        })?;

    let roles = state
        .db
        .load_roles_with_permissions(user.user_id)
        .await
        .map_err(AppError::from)?;

    let context = AuthContext {
        role_names: roles.iter().map(|r| r.role_name.clone()).collect(),
        permissions: effective_permissions(&roles),
        user,
    };

    req.extensions_mut().insert(context);

    Ok(next.run(req).await)
}

/// Extractor for handlers running behind `auth_middleware`.
pub struct AuthUser(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts
            .extensions
            .get::<AuthContext>()
            .ok_or_else(|| unauthenticated("Authentication required"))?;

        Ok(AuthUser(context.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_info_reads_forwarded_ip_and_agent() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        headers.insert(header::USER_AGENT, "mes-frontend/1.2".parse().unwrap());

        let client = client_info(&headers);
        assert_eq!(client.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(client.user_agent.as_deref(), Some("mes-frontend/1.2"));
    }

    #[test]
    fn client_info_tolerates_missing_headers() {
        let client = client_info(&HeaderMap::new());
        assert!(client.ip_address.is_none());
        assert!(client.user_agent.is_none());
    }
}

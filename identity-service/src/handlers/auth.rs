//! Authentication handlers: registration, login, 2FA completion, session
//! utilities.

use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::handlers::MessageResponse;
use crate::middleware::{client_info, AuthUser};
use crate::models::user::UserResponse;
use crate::models::{AuditEntry, AuditEventType};
use crate::services::{LoginOutcome, TokenResponse};
use crate::AppState;
use service_core::error::AppError;

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Request to register a new account.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 80))]
    pub handle: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    pub phone_number: Option<String>,
}

/// Request to login with handle/password.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub handle: String,
    pub password: String,
}

/// Request to complete a 2FA login.
#[derive(Debug, Deserialize)]
pub struct VerifyTwoFactorRequest {
    pub user_id: Uuid,
    pub code: String,
}

/// Request to change the current user's password.
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Login response: either a token or a 2FA challenge.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    TwoFactorRequired {
        message: String,
        requires_two_factor: bool,
        user_id: Uuid,
    },
    Authenticated {
        #[serde(flatten)]
        token: TokenResponse,
        user: UserResponse,
    },
}

/// Response after completing a 2FA login.
#[derive(Debug, Serialize)]
pub struct VerifyTwoFactorResponse {
    #[serde(flatten)]
    pub token: TokenResponse,
    pub user: UserResponse,
    pub verification_method: &'static str,
}

// ============================================================================
// Handlers
// ============================================================================

/// Register a new user account.
///
/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    req.validate()?;

    if !req
        .handle
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Handle can only contain letters, numbers, underscores, and hyphens"
        )));
    }

    let client = client_info(&headers);
    let user = state
        .auth
        .register(
            req.handle.trim().to_string(),
            req.email.trim().to_string(),
            req.password,
            req.phone_number,
            &client,
        )
        .await?;

    let response = sanitize_with_roles(&state, &user).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Authenticate with handle and password.
///
/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let client = client_info(&headers);

    match state
        .auth
        .authenticate(req.handle.trim(), &req.password, &client)
        .await?
    {
        LoginOutcome::TwoFactorRequired { user_id } => Ok(Json(LoginResponse::TwoFactorRequired {
            message: "Password verified. 2FA required.".to_string(),
            requires_two_factor: true,
            user_id,
        })),
        LoginOutcome::Authenticated { user, token } => {
            let user = sanitize_with_roles(&state, &user).await?;
            Ok(Json(LoginResponse::Authenticated { token, user }))
        }
    }
}

/// Complete a 2FA login with a time-based code or a backup code.
///
/// POST /auth/verify-2fa
pub async fn verify_two_factor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<VerifyTwoFactorRequest>,
) -> Result<Json<VerifyTwoFactorResponse>, AppError> {
    let client = client_info(&headers);

    let (user, token, method) = state
        .auth
        .complete_two_factor(req.user_id, &req.code, &client)
        .await?;

    let user = sanitize_with_roles(&state, &user).await?;
    Ok(Json(VerifyTwoFactorResponse {
        token,
        user,
        verification_method: method.as_str(),
    }))
}

/// Issue a fresh access token for the current principal.
///
/// POST /auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> Result<Json<TokenResponse>, AppError> {
    let token = state.auth.issue_token(&ctx.user)?;
    Ok(Json(token))
}

/// Log the logout event. Tokens stay valid until expiry; there is no
/// server-side revocation store.
///
/// POST /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, AppError> {
    let client = client_info(&headers);
    state.audit.record_async(
        AuditEntry::new(
            AuditEventType::Logout,
            format!("User {} logged out", ctx.user.handle),
            true,
            &client,
        )
        .actor(ctx.user.user_id, &ctx.user.handle),
    );

    Ok(Json(MessageResponse::new("Logged out successfully")))
}

/// Get the current user's profile.
///
/// GET /auth/profile
pub async fn profile(AuthUser(ctx): AuthUser) -> Result<Json<UserResponse>, AppError> {
    let roles = ctx.role_names.clone();
    let permissions = ctx.permissions.iter().cloned().collect();
    Ok(Json(ctx.user.sanitized(roles, permissions)))
}

/// Change the current user's password.
///
/// POST /auth/change-password
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    headers: HeaderMap,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let client = client_info(&headers);
    state
        .auth
        .change_password(
            ctx.user.user_id,
            &req.current_password,
            &req.new_password,
            &client,
        )
        .await?;

    Ok(Json(MessageResponse::new("Password changed successfully")))
}

/// Load a user's roles and effective permissions for a sanitized response.
pub(crate) async fn sanitize_with_roles(
    state: &AppState,
    user: &crate::models::User,
) -> Result<UserResponse, AppError> {
    let roles = state.db.load_roles_with_permissions(user.user_id).await?;
    let role_names: Vec<String> = roles.iter().map(|r| r.role_name.clone()).collect();
    let permissions = crate::services::effective_permissions(&roles)
        .into_iter()
        .collect();
    Ok(user.sanitized(role_names, permissions))
}

//! Two-factor enrollment handlers: setup, enable, disable.

use axum::{
    extract::{Json, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};

use crate::handlers::MessageResponse;
use crate::middleware::{client_info, AuthUser};
use crate::AppState;
use service_core::error::AppError;

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Request to promote a pending 2FA credential.
#[derive(Debug, Deserialize)]
pub struct EnableTwoFactorRequest {
    pub totp_code: String,
}

/// Request to disable 2FA; requires password re-proof.
#[derive(Debug, Deserialize)]
pub struct DisableTwoFactorRequest {
    pub password: String,
}

/// Setup response. The backup codes appear here exactly once.
#[derive(Debug, Serialize)]
pub struct SetupTwoFactorResponse {
    pub message: String,
    pub secret: String,
    pub totp_uri: String,
    /// Base64-encoded PNG for authenticator enrollment.
    pub qr_code: String,
    pub backup_codes: Vec<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Begin 2FA setup for the current user.
///
/// POST /auth/2fa/setup
pub async fn setup(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    headers: HeaderMap,
) -> Result<Json<SetupTwoFactorResponse>, AppError> {
    let client = client_info(&headers);
    let setup = state.two_factor.setup(ctx.user.user_id, &client).await?;

    Ok(Json(SetupTwoFactorResponse {
        message: "2FA setup initiated. Store the backup codes now; they cannot be retrieved again."
            .to_string(),
        secret: setup.secret,
        totp_uri: setup.provisioning_uri,
        qr_code: setup.qr_code,
        backup_codes: setup.backup_codes,
    }))
}

/// Enable 2FA after verifying a time-based code.
///
/// POST /auth/2fa/enable
pub async fn enable(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    headers: HeaderMap,
    Json(req): Json<EnableTwoFactorRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let client = client_info(&headers);
    state
        .two_factor
        .enable(ctx.user.user_id, req.totp_code.trim(), &client)
        .await?;

    Ok(Json(MessageResponse::new("2FA enabled successfully")))
}

/// Disable 2FA after password re-proof.
///
/// POST /auth/2fa/disable
pub async fn disable(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    headers: HeaderMap,
    Json(req): Json<DisableTwoFactorRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let client = client_info(&headers);
    state
        .two_factor
        .disable(ctx.user.user_id, &req.password, &client)
        .await?;

    Ok(Json(MessageResponse::new("2FA disabled successfully")))
}

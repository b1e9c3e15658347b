use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Common HTTP error type shared by the workspace services.
///
/// Denial variants carry a machine-readable `kind` so the transport layer can
/// surface a structured reason alongside the human-readable message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("{message}")]
    Unauthorized { kind: &'static str, message: String },

    #[error("{message}")]
    Forbidden { kind: &'static str, message: String },

    #[error("{message}")]
    Conflict { kind: &'static str, message: String },

    #[error("Too many requests: {0}")]
    TooManyRequests(String, Option<u64>),

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body, retry_after) = match self {
            AppError::ValidationError(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody {
                    error: "Validation error".to_string(),
                    kind: Some("validation"),
                    details: Some(err.to_string()),
                },
                None,
            ),
            AppError::BadRequest(err) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: err.to_string(),
                    kind: None,
                    details: None,
                },
                None,
            ),
            AppError::NotFound(err) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: err.to_string(),
                    kind: Some("not_found"),
                    details: None,
                },
                None,
            ),
            AppError::Unauthorized { kind, message } => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: message,
                    kind: Some(kind),
                    details: None,
                },
                None,
            ),
            AppError::Forbidden { kind, message } => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    error: message,
                    kind: Some(kind),
                    details: None,
                },
                None,
            ),
            AppError::Conflict { kind, message } => (
                StatusCode::CONFLICT,
                ErrorBody {
                    error: message,
                    kind: Some(kind),
                    details: None,
                },
                None,
            ),
            AppError::TooManyRequests(msg, retry) => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorBody {
                    error: msg,
                    kind: Some("rate_limited"),
                    details: None,
                },
                retry,
            ),
            AppError::InvalidToken(err) => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: "Invalid token".to_string(),
                    kind: Some("unauthenticated"),
                    details: Some(err.to_string()),
                },
                None,
            ),
            AppError::DatabaseError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: "Database error".to_string(),
                    kind: Some("infrastructure"),
                    details: Some(err.to_string()),
                },
                None,
            ),
            AppError::ConfigError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: "Configuration error".to_string(),
                    kind: Some("infrastructure"),
                    details: Some(err.to_string()),
                },
                None,
            ),
            AppError::InternalError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: "Internal server error".to_string(),
                    kind: Some("internal"),
                    details: Some(err.to_string()),
                },
                None,
            ),
        };

        let mut res = (status, Json(body)).into_response();

        if let Some(retry) = retry_after {
            res.headers_mut()
                .insert(axum::http::header::RETRY_AFTER, retry.into());
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_401() {
        let err = AppError::Unauthorized {
            kind: "invalid_credential",
            message: "Invalid credentials".to_string(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn conflict_maps_to_409() {
        let err = AppError::Conflict {
            kind: "already_assigned",
            message: "Role already assigned".to_string(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn rate_limit_sets_retry_after() {
        let err = AppError::TooManyRequests("slow down".to_string(), Some(30));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(axum::http::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
            Some("30")
        );
    }
}

pub mod audit;
pub mod auth;
pub mod permission;
pub mod role;
pub mod two_factor;
pub mod user;

use serde::Serialize;

/// Generic message response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

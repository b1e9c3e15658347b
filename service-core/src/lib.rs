//! service-core: shared infrastructure for MES backend services.
//!
//! Provides the common HTTP error type, logging initialization, and generic
//! axum middleware (request-id propagation, security headers, IP rate
//! limiting) used by every service in the workspace.

pub mod error;
pub mod middleware;
pub mod observability;

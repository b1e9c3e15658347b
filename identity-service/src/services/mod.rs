pub mod audit;
pub mod auth;
pub mod database;
pub mod error;
pub mod jwt;
pub mod rbac;
pub mod seed;
pub mod two_factor;

pub use audit::{AuditFilter, AuditService};
pub use auth::{AuthService, LoginOutcome};
pub use database::Database;
pub use error::ServiceError;
pub use jwt::{AccessTokenClaims, JwtService, TokenResponse};
pub use rbac::{effective_permissions, RbacService};
pub use two_factor::{TwoFactorService, VerificationMethod};

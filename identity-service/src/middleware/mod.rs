pub mod auth;
pub mod guard;

pub use auth::{auth_middleware, client_info, AuthContext, AuthUser};
pub use guard::{authorization_guard_middleware, AuthorizationGuard, GuardState};

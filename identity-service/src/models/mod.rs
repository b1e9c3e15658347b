pub mod audit_entry;
pub mod permission;
pub mod role;
pub mod user;

pub use audit_entry::{AuditEntry, AuditEventType, ClientInfo};
pub use permission::Permission;
pub use role::{Role, RoleWithPermissions};
pub use user::{TwoFactorState, User, UserResponse};

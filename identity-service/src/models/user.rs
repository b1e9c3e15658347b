//! User model - account identity, credential, 2FA, and lockout state.
//!
//! The lockout and 2FA state machines live here as total functions over the
//! embedded state; persistence is the caller's responsibility and happens
//! inside the login transaction with the user row locked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::types::Json;
use sqlx::FromRow;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::SecurityPolicy;

/// Two-factor credential lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoFactorState {
    Disabled,
    /// A secret exists but the holder has not yet proven possession.
    PendingSetup,
    Enabled,
}

/// User entity.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub handle: String,
    pub email: String,
    pub password_hash: String,
    pub phone_number: Option<String>,

    pub totp_secret: Option<String>,
    /// SHA-256 digests of the outstanding single-use backup codes.
    pub backup_codes: Option<Json<Vec<String>>>,
    pub two_factor_enabled: bool,

    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,

    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl User {
    /// Create a new active user from an already-hashed credential.
    pub fn new(
        handle: String,
        email: String,
        password_hash: String,
        phone_number: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            handle,
            email,
            password_hash,
            phone_number,
            totp_secret: None,
            backup_codes: None,
            two_factor_enabled: false,
            failed_login_attempts: 0,
            locked_until: None,
            last_login: None,
            is_active: true,
            created_utc: now,
            updated_utc: now,
        }
    }

    // ==================== Lockout state machine ====================

    /// Whether the account is currently locked. A `locked_until` in the past
    /// means the account is treated as active again without an explicit
    /// transition (lazy expiry).
    pub fn is_locked(&self) -> bool {
        match self.locked_until {
            Some(until) => Utc::now() < until,
            None => false,
        }
    }

    /// Record a failed credential check. Reaching the configured maximum
    /// pins the counter there and starts the lockout window. Returns whether
    /// this failure locked the account.
    pub fn record_failure(&mut self, policy: &SecurityPolicy) -> bool {
        self.failed_login_attempts += 1;
        if self.failed_login_attempts >= policy.max_login_attempts {
            self.failed_login_attempts = policy.max_login_attempts;
            self.locked_until = Some(Utc::now() + policy.lockout_duration());
            return true;
        }
        false
    }

    /// Record a successful credential check: reset the counter, clear any
    /// lock, and stamp the activity time.
    pub fn record_success(&mut self) {
        self.failed_login_attempts = 0;
        self.locked_until = None;
        self.last_login = Some(Utc::now());
    }

    /// Administrative unlock: force-clear the lock and the counter
    /// regardless of timer state.
    pub fn unlock(&mut self) {
        self.failed_login_attempts = 0;
        self.locked_until = None;
    }

    // ==================== Two-factor credential ====================

    pub fn two_factor_state(&self) -> TwoFactorState {
        if self.two_factor_enabled {
            TwoFactorState::Enabled
        } else if self.totp_secret.is_some() {
            TwoFactorState::PendingSetup
        } else {
            TwoFactorState::Disabled
        }
    }

    /// Install a fresh two-factor credential without enforcing it yet.
    pub fn install_two_factor_secret(&mut self, secret: String, code_digests: Vec<String>) {
        self.totp_secret = Some(secret);
        self.backup_codes = Some(Json(code_digests));
        self.two_factor_enabled = false;
    }

    pub fn enable_two_factor(&mut self) {
        self.two_factor_enabled = true;
    }

    /// Clear the secret, all backup codes, and the enabled flag.
    pub fn disable_two_factor(&mut self) {
        self.two_factor_enabled = false;
        self.totp_secret = None;
        self.backup_codes = None;
    }

    /// Match `code` against the outstanding backup codes and consume it on
    /// success. Each code verifies at most once.
    pub fn consume_backup_code(&mut self, code: &str) -> bool {
        let digest = hash_backup_code(code);
        let Some(Json(codes)) = self.backup_codes.as_mut() else {
            return false;
        };

        let position = codes
            .iter()
            .position(|stored| bool::from(stored.as_bytes().ct_eq(digest.as_bytes())));

        match position {
            Some(idx) => {
                codes.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Sanitized representation for API responses: no hash, no secret, no
    /// backup codes.
    pub fn sanitized(&self, roles: Vec<String>, permissions: Vec<String>) -> UserResponse {
        UserResponse {
            user_id: self.user_id,
            handle: self.handle.clone(),
            email: self.email.clone(),
            phone_number: self.phone_number.clone(),
            two_factor_enabled: self.two_factor_enabled,
            is_active: self.is_active,
            is_locked: self.is_locked(),
            last_login: self.last_login,
            created_utc: self.created_utc,
            roles,
            permissions,
        }
    }
}

/// Normalize and digest a backup code for storage or comparison.
/// Codes are case-insensitive on input.
pub fn hash_backup_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.trim().to_uppercase().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// User response for API (without sensitive fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub handle: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub two_factor_enabled: bool,
    pub is_active: bool,
    pub is_locked: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn policy(max: i32, minutes: i64) -> SecurityPolicy {
        SecurityPolicy {
            max_login_attempts: max,
            lockout_duration_minutes: minutes,
            min_password_length: 8,
        }
    }

    fn test_user() -> User {
        User::new(
            "operator1".to_string(),
            "operator1@mes.local".to_string(),
            "$argon2id$fake".to_string(),
            None,
        )
    }

    #[test]
    fn failures_below_threshold_do_not_lock() {
        let mut user = test_user();
        let policy = policy(5, 30);

        for _ in 0..4 {
            assert!(!user.record_failure(&policy));
        }
        assert_eq!(user.failed_login_attempts, 4);
        assert!(!user.is_locked());
    }

    #[test]
    fn reaching_threshold_locks_and_pins_counter() {
        let mut user = test_user();
        let policy = policy(3, 30);

        assert!(!user.record_failure(&policy));
        assert!(!user.record_failure(&policy));
        assert!(user.record_failure(&policy));
        assert!(user.is_locked());
        assert_eq!(user.failed_login_attempts, 3);

        // Further failures keep the counter pinned at the maximum
        user.record_failure(&policy);
        assert_eq!(user.failed_login_attempts, 3);
    }

    #[test]
    fn expired_lock_is_treated_as_active() {
        let mut user = test_user();
        user.failed_login_attempts = 3;
        user.locked_until = Some(Utc::now() - Duration::seconds(1));

        assert!(!user.is_locked());
        // Lazy expiry: the counter is untouched until success or unlock
        assert_eq!(user.failed_login_attempts, 3);
    }

    #[test]
    fn record_success_resets_everything() {
        let mut user = test_user();
        let policy = policy(3, 30);
        user.record_failure(&policy);
        user.record_failure(&policy);
        user.record_failure(&policy);
        assert!(user.is_locked());

        user.record_success();
        assert_eq!(user.failed_login_attempts, 0);
        assert!(user.locked_until.is_none());
        assert!(user.last_login.is_some());
    }

    #[test]
    fn unlock_clears_lock_and_counter() {
        let mut user = test_user();
        user.failed_login_attempts = 5;
        user.locked_until = Some(Utc::now() + Duration::minutes(30));

        user.unlock();
        assert!(!user.is_locked());
        assert_eq!(user.failed_login_attempts, 0);
        assert!(user.last_login.is_none());
    }

    #[test]
    fn two_factor_state_transitions() {
        let mut user = test_user();
        assert_eq!(user.two_factor_state(), TwoFactorState::Disabled);

        user.install_two_factor_secret("JBSWY3DPEHPK3PXP".to_string(), vec![]);
        assert_eq!(user.two_factor_state(), TwoFactorState::PendingSetup);

        user.enable_two_factor();
        assert_eq!(user.two_factor_state(), TwoFactorState::Enabled);

        user.disable_two_factor();
        assert_eq!(user.two_factor_state(), TwoFactorState::Disabled);
        assert!(user.totp_secret.is_none());
        assert!(user.backup_codes.is_none());
    }

    #[test]
    fn backup_codes_are_single_use() {
        let mut user = test_user();
        let codes: Vec<String> = (0..10).map(|i| format!("C0DE{:04X}", i)).collect();
        let digests = codes.iter().map(|c| hash_backup_code(c)).collect();
        user.install_two_factor_secret("JBSWY3DPEHPK3PXP".to_string(), digests);

        for code in &codes {
            assert!(user.consume_backup_code(code));
        }
        // Every code has been consumed; none verifies a second time
        for code in &codes {
            assert!(!user.consume_backup_code(code));
        }
        assert!(user.backup_codes.as_ref().unwrap().0.is_empty());
    }

    #[test]
    fn backup_codes_match_case_insensitively() {
        let mut user = test_user();
        user.install_two_factor_secret(
            "JBSWY3DPEHPK3PXP".to_string(),
            vec![hash_backup_code("A1B2C3D4")],
        );

        assert!(user.consume_backup_code("a1b2c3d4"));
        assert!(!user.consume_backup_code("A1B2C3D4"));
    }

    #[test]
    fn sanitized_response_carries_no_secrets() {
        let mut user = test_user();
        user.install_two_factor_secret(
            "JBSWY3DPEHPK3PXP".to_string(),
            vec![hash_backup_code("A1B2C3D4")],
        );

        let response = user.sanitized(vec!["worker".to_string()], vec!["tasks:read".to_string()]);
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("JBSWY3DPEHPK3PXP"));
        assert!(!json.contains("argon2"));
        assert!(!json.contains("backup"));
    }
}

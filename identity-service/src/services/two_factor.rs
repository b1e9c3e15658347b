//! Two-factor credential lifecycle: setup, enable, disable, verification.
//!
//! The credential is only trusted after the holder proves possession by
//! submitting one valid time-based code, so a mistyped secret cannot lock an
//! account out of 2FA permanently.

use rand::Rng;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::models::user::hash_backup_code;
use crate::models::{AuditEntry, AuditEventType, ClientInfo, TwoFactorState, User};
use crate::services::{AuditService, Database, ServiceError};
use crate::utils::{verify_password, Password, PasswordHashString};

const TOTP_DIGITS: usize = 6;
const TOTP_STEP: u64 = 30;
/// Accepted clock skew, in time steps, on either side of now.
const TOTP_SKEW: u8 = 1;
const BACKUP_CODE_COUNT: usize = 10;

/// Which second factor satisfied a verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMethod {
    Totp,
    BackupCode,
}

impl VerificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMethod::Totp => "totp",
            VerificationMethod::BackupCode => "backup_code",
        }
    }
}

/// Generate a fresh random TOTP secret, base32-encoded.
pub fn generate_secret() -> String {
    Secret::generate_secret().to_encoded().to_string()
}

/// Generate the fixed-size set of single-use backup codes (plaintext).
pub fn generate_backup_codes() -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..BACKUP_CODE_COUNT)
        .map(|_| format!("{:08X}", rng.gen::<u32>()))
        .collect()
}

/// Build the TOTP verifier for a stored secret.
pub fn build_totp(secret_base32: &str, handle: &str, issuer: &str) -> Result<TOTP, ServiceError> {
    let secret = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Invalid TOTP secret: {:?}", e)))?;

    TOTP::new(
        Algorithm::SHA1,
        TOTP_DIGITS,
        TOTP_SKEW,
        TOTP_STEP,
        secret,
        Some(issuer.to_string()),
        handle.to_string(),
    )
    .map_err(|e| ServiceError::Internal(anyhow::anyhow!("TOTP init error: {}", e)))
}

/// Verify `code` against the user's second factor: time-based first, then the
/// stored backup codes. A matched backup code is consumed from the user's
/// state; the caller persists the mutation in its own transaction.
pub fn verify_and_consume(
    user: &mut User,
    code: &str,
    issuer: &str,
) -> Result<Option<VerificationMethod>, ServiceError> {
    if let Some(secret) = user.totp_secret.clone() {
        let totp = build_totp(&secret, &user.handle, issuer)?;
        if totp.check_current(code).unwrap_or(false) {
            return Ok(Some(VerificationMethod::Totp));
        }
    }

    if user.consume_backup_code(code) {
        return Ok(Some(VerificationMethod::BackupCode));
    }

    Ok(None)
}

/// Result of initiating 2FA setup. The backup codes appear here in plaintext
/// exactly once; only digests are stored.
#[derive(Debug)]
pub struct TwoFactorSetup {
    pub secret: String,
    pub provisioning_uri: String,
    pub qr_code: String,
    pub backup_codes: Vec<String>,
}

#[derive(Clone)]
pub struct TwoFactorService {
    db: Database,
    audit: AuditService,
    issuer: String,
}

impl TwoFactorService {
    pub fn new(db: Database, audit: AuditService, issuer: String) -> Self {
        Self { db, audit, issuer }
    }

    /// Begin 2FA setup: generate and store a fresh secret and backup-code
    /// digests without enforcing the factor yet. Re-running while setup is
    /// pending regenerates both.
    pub async fn setup(
        &self,
        user_id: uuid::Uuid,
        client: &ClientInfo,
    ) -> Result<TwoFactorSetup, ServiceError> {
        let mut tx = self.db.begin().await?;
        let mut user = self
            .db
            .find_user_by_id_for_update(&mut tx, user_id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "User" })?;

        if user.two_factor_state() == TwoFactorState::Enabled {
            return Err(ServiceError::TwoFactorAlreadyEnabled);
        }

        let secret = generate_secret();
        let backup_codes = generate_backup_codes();
        let digests = backup_codes.iter().map(|c| hash_backup_code(c)).collect();

        user.install_two_factor_secret(secret.clone(), digests);
        self.db.persist_security_state(&mut tx, &user).await?;
        tx.commit().await?;

        let (provisioning_uri, qr_code) = self.provisioning(&user)?;

        self.audit.record_async(
            AuditEntry::new(
                AuditEventType::TwoFactorSetup,
                format!("User {} started 2FA setup", user.handle),
                true,
                client,
            )
            .actor(user.user_id, &user.handle),
        );

        Ok(TwoFactorSetup {
            secret,
            provisioning_uri,
            qr_code,
            backup_codes,
        })
    }

    /// Promote a pending credential to enforced after the holder submits one
    /// valid time-based code.
    pub async fn enable(
        &self,
        user_id: uuid::Uuid,
        code: &str,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        let mut tx = self.db.begin().await?;
        let mut user = self
            .db
            .find_user_by_id_for_update(&mut tx, user_id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "User" })?;

        if user.two_factor_state() == TwoFactorState::Enabled {
            return Err(ServiceError::TwoFactorAlreadyEnabled);
        }

        let verified = match user.totp_secret.clone() {
            Some(secret) => build_totp(&secret, &user.handle, &self.issuer)?
                .check_current(code)
                .unwrap_or(false),
            None => false,
        };

        if !verified {
            self.audit.record_async(
                AuditEntry::new(
                    AuditEventType::TwoFactorEnableFailed,
                    format!("User {} failed to enable 2FA: invalid code", user.handle),
                    false,
                    client,
                )
                .actor(user.user_id, &user.handle),
            );
            return Err(ServiceError::InvalidCode);
        }

        user.enable_two_factor();
        self.db.persist_security_state(&mut tx, &user).await?;
        tx.commit().await?;

        self.audit.record_async(
            AuditEntry::new(
                AuditEventType::TwoFactorEnabled,
                format!("User {} enabled 2FA", user.handle),
                true,
                client,
            )
            .actor(user.user_id, &user.handle),
        );

        Ok(())
    }

    /// Disable 2FA after password re-proof, clearing the secret and all
    /// backup codes.
    pub async fn disable(
        &self,
        user_id: uuid::Uuid,
        current_password: &str,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        let mut tx = self.db.begin().await?;
        let mut user = self
            .db
            .find_user_by_id_for_update(&mut tx, user_id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "User" })?;

        if user.two_factor_state() != TwoFactorState::Enabled {
            return Err(ServiceError::TwoFactorNotEnabled);
        }

        let password = Password::new(current_password.to_string());
        let hash = PasswordHashString::new(user.password_hash.clone());
        if !verify_password(&password, &hash) {
            self.audit.record_async(
                AuditEntry::new(
                    AuditEventType::TwoFactorDisableFailed,
                    format!("User {} failed to disable 2FA: incorrect password", user.handle),
                    false,
                    client,
                )
                .actor(user.user_id, &user.handle),
            );
            return Err(ServiceError::InvalidCredential);
        }

        user.disable_two_factor();
        self.db.persist_security_state(&mut tx, &user).await?;
        tx.commit().await?;

        self.audit.record_async(
            AuditEntry::new(
                AuditEventType::TwoFactorDisabled,
                format!("User {} disabled 2FA", user.handle),
                true,
                client,
            )
            .actor(user.user_id, &user.handle),
        );

        Ok(())
    }

    /// Provisioning URI and QR image for the stored secret. Fails when no
    /// secret is present.
    pub fn provisioning(&self, user: &User) -> Result<(String, String), ServiceError> {
        let secret = user
            .totp_secret
            .as_deref()
            .ok_or(ServiceError::TwoFactorNotEnabled)?;

        let totp = build_totp(secret, &user.handle, &self.issuer)?;
        let uri = totp.get_url();
        let qr = totp
            .get_qr_base64()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("QR generation error: {}", e)))?;
        Ok((uri, qr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user_with_secret(secret: &str) -> User {
        let mut user = User::new(
            "operator1".to_string(),
            "operator1@mes.local".to_string(),
            "$argon2id$fake".to_string(),
            None,
        );
        user.install_two_factor_secret(secret.to_string(), vec![]);
        user.enable_two_factor();
        user
    }

    #[test]
    fn generated_secret_is_base32() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 32);
        assert!(secret.chars().all(|c| "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567".contains(c)));
    }

    #[test]
    fn backup_codes_are_fixed_count_hex() {
        let codes = generate_backup_codes();
        assert_eq!(codes.len(), BACKUP_CODE_COUNT);
        for code in &codes {
            assert_eq!(code.len(), 8);
            assert!(code.chars().all(|c| c.is_ascii_hexdigit()));
            assert_eq!(code.to_uppercase(), *code);
        }
    }

    #[test]
    fn totp_accepts_one_step_of_skew_and_rejects_two() {
        let secret = generate_secret();
        let totp = build_totp(&secret, "operator1", "MES Identity").unwrap();

        // Pin the reference time to a step boundary so the offsets below are
        // exactly whole steps away.
        let t: u64 = 1_700_000_100;
        assert_eq!(t % TOTP_STEP, 0);
        let code = totp.generate(t);

        assert!(totp.check(&code, t));
        assert!(totp.check(&code, t - TOTP_STEP));
        assert!(totp.check(&code, t + TOTP_STEP));
        assert!(!totp.check(&code, t - 2 * TOTP_STEP));
        assert!(!totp.check(&code, t + 2 * TOTP_STEP));
    }

    #[test]
    fn verify_falls_back_to_backup_code_and_consumes_it() {
        let secret = generate_secret();
        let mut user = test_user_with_secret(&secret);
        user.backup_codes = Some(sqlx::types::Json(vec![hash_backup_code("A1B2C3D4")]));

        // "XXXXXX" can never match a numeric TOTP code, forcing the fallback
        let method = verify_and_consume(&mut user, "XXXXXX", "MES Identity").unwrap();
        assert_eq!(method, None);

        let method = verify_and_consume(&mut user, "A1B2C3D4", "MES Identity").unwrap();
        assert_eq!(method, Some(VerificationMethod::BackupCode));

        // Single use: the same code never verifies again
        let method = verify_and_consume(&mut user, "A1B2C3D4", "MES Identity").unwrap();
        assert_eq!(method, None);
    }

    #[test]
    fn verify_reports_totp_method_for_current_code() {
        let secret = generate_secret();
        let mut user = test_user_with_secret(&secret);

        let totp = build_totp(&secret, "operator1", "MES Identity").unwrap();
        let code = totp.generate_current().unwrap();

        let method = verify_and_consume(&mut user, &code, "MES Identity").unwrap();
        assert_eq!(method, Some(VerificationMethod::Totp));
    }

    #[test]
    fn provisioning_uri_embeds_issuer_and_handle() {
        let secret = generate_secret();
        let totp = build_totp(&secret, "operator1", "MES Identity").unwrap();
        let url = totp.get_url();
        assert!(url.starts_with("otpauth://totp/"));
        assert!(url.contains("operator1"));
        assert!(url.contains("MES%20Identity"));
    }
}

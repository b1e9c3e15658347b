//! Authentication engine: registration, the password login pipeline with
//! lockout accounting, and second-factor completion.
//!
//! Every state transition on a principal happens inside one transaction with
//! the user row locked, so concurrent attempts against the same account
//! serialize: two simultaneous failures cannot both observe the counter below
//! the maximum, and a backup code is consumed exactly once.

use uuid::Uuid;

use crate::config::SecurityPolicy;
use crate::models::{AuditEntry, AuditEventType, ClientInfo, User};
use crate::services::two_factor::{verify_and_consume, VerificationMethod};
use crate::services::{AuditService, Database, JwtService, ServiceError, TokenResponse};
use crate::utils::{
    hash_password, validate_password_strength, verify_password, Password, PasswordHashString,
};

/// Outcome of a successful password check.
#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated { user: User, token: TokenResponse },
    /// Password verified but a second factor is still required.
    TwoFactorRequired { user_id: Uuid },
}

#[derive(Clone)]
pub struct AuthService {
    db: Database,
    jwt: JwtService,
    audit: AuditService,
    policy: SecurityPolicy,
    totp_issuer: String,
}

impl AuthService {
    pub fn new(
        db: Database,
        jwt: JwtService,
        audit: AuditService,
        policy: SecurityPolicy,
        totp_issuer: String,
    ) -> Self {
        Self {
            db,
            jwt,
            audit,
            policy,
            totp_issuer,
        }
    }

    /// Register a new account and grant the default worker role when it
    /// exists.
    pub async fn register(
        &self,
        handle: String,
        email: String,
        password: String,
        phone_number: Option<String>,
        client: &ClientInfo,
    ) -> Result<User, ServiceError> {
        validate_password_strength(&password, self.policy.min_password_length)
            .map_err(ServiceError::WeakPassword)?;

        let password_hash = hash_password(&Password::new(password))
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Password hashing error: {}", e)))?;

        let user = User::new(handle, email, password_hash.into_string(), phone_number);
        self.db.insert_user(&user).await?;

        if let Some(worker) = self.db.find_role_by_name("worker").await? {
            self.db
                .assign_role_to_user(user.user_id, worker.role_id)
                .await?;
        }

        tracing::info!(user_id = %user.user_id, "User registered");

        self.audit.record_async(
            AuditEntry::new(
                AuditEventType::UserRegistered,
                format!("User {} registered", user.handle),
                true,
                client,
            )
            .actor(user.user_id, &user.handle),
        );

        Ok(user)
    }

    /// Authenticate with handle and password.
    ///
    /// Unknown handle and wrong password surface identically as
    /// `InvalidCredential`; the lock check runs before password verification
    /// so a locked account rejects even the correct password.
    pub async fn authenticate(
        &self,
        handle: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<LoginOutcome, ServiceError> {
        let mut tx = self.db.begin().await?;

        let Some(mut user) = self
            .db
            .find_user_by_handle_for_update(&mut tx, handle)
            .await?
        else {
            self.audit.record_async(
                AuditEntry::new(
                    AuditEventType::LoginFailure,
                    "Login attempt for unknown handle",
                    false,
                    client,
                )
                .actor_handle(handle),
            );
            return Err(ServiceError::InvalidCredential);
        };

        if user.is_locked() {
            self.audit.record_async(
                AuditEntry::new(
                    AuditEventType::LoginFailure,
                    format!("Login attempt on locked account {}", user.handle),
                    false,
                    client,
                )
                .actor(user.user_id, &user.handle),
            );
            return Err(ServiceError::AccountLocked {
                until: user.locked_until,
            });
        }

        if !user.is_active {
            self.audit.record_async(
                AuditEntry::new(
                    AuditEventType::LoginFailure,
                    format!("Login attempt on inactive account {}", user.handle),
                    false,
                    client,
                )
                .actor(user.user_id, &user.handle),
            );
            return Err(ServiceError::AccountInactive);
        }

        let supplied = Password::new(password.to_string());
        let stored = PasswordHashString::new(user.password_hash.clone());
        if !verify_password(&supplied, &stored) {
            let locked_now = user.record_failure(&self.policy);
            self.db.persist_security_state(&mut tx, &user).await?;
            tx.commit().await?;

            self.audit.record_async(
                AuditEntry::new(
                    AuditEventType::LoginFailure,
                    format!("Invalid password for {}", user.handle),
                    false,
                    client,
                )
                .actor(user.user_id, &user.handle)
                .metadata(serde_json::json!({
                    "failed_attempts": user.failed_login_attempts,
                    "account_locked": locked_now,
                })),
            );
            return Err(ServiceError::InvalidCredential);
        }

        user.record_success();
        self.db.persist_security_state(&mut tx, &user).await?;
        tx.commit().await?;

        self.audit.record_async(
            AuditEntry::new(
                AuditEventType::LoginSuccess,
                format!("User {} logged in", user.handle),
                true,
                client,
            )
            .actor(user.user_id, &user.handle),
        );

        if user.two_factor_enabled {
            return Ok(LoginOutcome::TwoFactorRequired {
                user_id: user.user_id,
            });
        }

        let token = self.jwt.token_response(&user)?;
        Ok(LoginOutcome::Authenticated { user, token })
    }

    /// Complete a 2FA login: verify a time-based code or consume a backup
    /// code. Verification failures feed the same lockout budget as password
    /// failures.
    pub async fn complete_two_factor(
        &self,
        user_id: Uuid,
        code: &str,
        client: &ClientInfo,
    ) -> Result<(User, TokenResponse, VerificationMethod), ServiceError> {
        let mut tx = self.db.begin().await?;

        let mut user = self
            .db
            .find_user_by_id_for_update(&mut tx, user_id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "User" })?;

        if !user.two_factor_enabled {
            return Err(ServiceError::TwoFactorNotEnabled);
        }

        if user.is_locked() {
            return Err(ServiceError::AccountLocked {
                until: user.locked_until,
            });
        }

        if !user.is_active {
            return Err(ServiceError::AccountInactive);
        }

        match verify_and_consume(&mut user, code, &self.totp_issuer)? {
            Some(method) => {
                user.record_success();
                self.db.persist_security_state(&mut tx, &user).await?;
                tx.commit().await?;

                self.audit.record_async(
                    AuditEntry::new(
                        AuditEventType::TwoFactorVerificationSuccess,
                        format!("User {} verified 2FA", user.handle),
                        true,
                        client,
                    )
                    .actor(user.user_id, &user.handle)
                    .metadata(serde_json::json!({ "verification_method": method.as_str() })),
                );

                let token = self.jwt.token_response(&user)?;
                Ok((user, token, method))
            }
            None => {
                let locked_now = user.record_failure(&self.policy);
                self.db.persist_security_state(&mut tx, &user).await?;
                tx.commit().await?;

                self.audit.record_async(
                    AuditEntry::new(
                        AuditEventType::TwoFactorVerificationFailed,
                        format!("User {} failed 2FA verification", user.handle),
                        false,
                        client,
                    )
                    .actor(user.user_id, &user.handle)
                    .metadata(serde_json::json!({ "account_locked": locked_now })),
                );
                Err(ServiceError::InvalidCode)
            }
        }
    }

    /// Change the password of an authenticated user after re-proving the
    /// current one.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
        client: &ClientInfo,
    ) -> Result<(), ServiceError> {
        let user = self
            .db
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "User" })?;

        let current = Password::new(current_password.to_string());
        let stored = PasswordHashString::new(user.password_hash.clone());
        if !verify_password(&current, &stored) {
            self.audit.record_async(
                AuditEntry::new(
                    AuditEventType::PasswordChangeFailed,
                    format!("User {} failed password change: wrong current password", user.handle),
                    false,
                    client,
                )
                .actor(user.user_id, &user.handle),
            );
            return Err(ServiceError::InvalidCredential);
        }

        validate_password_strength(new_password, self.policy.min_password_length)
            .map_err(ServiceError::WeakPassword)?;

        let new_hash = hash_password(&Password::new(new_password.to_string()))
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Password hashing error: {}", e)))?;
        self.db
            .update_password_hash(user.user_id, new_hash.as_str())
            .await?;

        self.audit.record_async(
            AuditEntry::new(
                AuditEventType::PasswordChanged,
                format!("User {} changed password", user.handle),
                true,
                client,
            )
            .actor(user.user_id, &user.handle),
        );

        Ok(())
    }

    /// Issue a fresh access token for an already-authenticated principal.
    pub fn issue_token(&self, user: &User) -> Result<TokenResponse, ServiceError> {
        Ok(self.jwt.token_response(user)?)
    }
}

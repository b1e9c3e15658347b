//! Two-factor enrollment and login flows against PostgreSQL.

mod common;

use common::{client, register_user, TEST_PASSWORD};
use identity_service::services::two_factor::build_totp;
use identity_service::services::{LoginOutcome, ServiceError, VerificationMethod};

const ISSUER: &str = "MES Identity Test";

/// Enroll and enforce 2FA for a user, returning the backup codes.
async fn enable_two_factor(
    state: &identity_service::AppState,
    user: &identity_service::models::User,
) -> Vec<String> {
    let setup = state
        .two_factor
        .setup(user.user_id, &client())
        .await
        .unwrap();
    assert_eq!(setup.backup_codes.len(), 10);

    let totp = build_totp(&setup.secret, &user.handle, ISSUER).unwrap();
    let code = totp.generate_current().unwrap();
    state
        .two_factor
        .enable(user.user_id, &code, &client())
        .await
        .unwrap();

    setup.backup_codes
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn setup_is_not_enforced_until_enable_proves_possession() {
    let state = common::test_state().await;
    let user = register_user(&state, "2fa-pending").await;

    state
        .two_factor
        .setup(user.user_id, &client())
        .await
        .unwrap();

    // Still pending: login does not demand a second factor
    let outcome = state
        .auth
        .authenticate(&user.handle, TEST_PASSWORD, &client())
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::Authenticated { .. }));

    // A wrong code leaves the credential pending ("ABCDEF" never matches a
    // numeric TOTP code)
    let err = state
        .two_factor
        .enable(user.user_id, "ABCDEF", &client())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidCode));
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn enabled_two_factor_gates_login_and_totp_completes_it() {
    let state = common::test_state().await;
    let user = register_user(&state, "2fa-login").await;
    let _codes = enable_two_factor(&state, &user).await;

    let outcome = state
        .auth
        .authenticate(&user.handle, TEST_PASSWORD, &client())
        .await
        .unwrap();
    let LoginOutcome::TwoFactorRequired { user_id } = outcome else {
        panic!("expected a 2FA challenge");
    };

    let stored = state.db.find_user_by_id(user_id).await.unwrap().unwrap();
    let secret = stored.totp_secret.clone().unwrap();
    let code = build_totp(&secret, &stored.handle, ISSUER)
        .unwrap()
        .generate_current()
        .unwrap();

    let (_, token, method) = state
        .auth
        .complete_two_factor(user_id, &code, &client())
        .await
        .unwrap();
    assert_eq!(method, VerificationMethod::Totp);
    assert!(!token.access_token.is_empty());
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn backup_code_completes_login_once_and_only_once() {
    let state = common::test_state().await;
    let user = register_user(&state, "2fa-backup").await;
    let codes = enable_two_factor(&state, &user).await;

    // Two wrong TOTP codes, then a valid backup code
    for wrong in ["XXXXXX", "YYYYYY"] {
        let err = state
            .auth
            .complete_two_factor(user.user_id, wrong, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCode));
    }

    let (_, _, method) = state
        .auth
        .complete_two_factor(user.user_id, &codes[0], &client())
        .await
        .unwrap();
    assert_eq!(method, VerificationMethod::BackupCode);

    // The consumed code never verifies again
    let err = state
        .auth
        .complete_two_factor(user.user_id, &codes[0], &client())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidCode));

    let stored = state
        .db
        .find_user_by_id(user.user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.backup_codes.unwrap().0.len(), 9);
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn two_factor_failures_feed_the_shared_lockout_budget() {
    let state = common::test_state().await;
    let user = register_user(&state, "2fa-lockout").await;
    enable_two_factor(&state, &user).await;

    // Policy is 3 attempts; burn all of them on bad 2FA codes
    for _ in 0..3 {
        let _ = state
            .auth
            .complete_two_factor(user.user_id, "XXXXXX", &client())
            .await;
    }

    let err = state
        .auth
        .complete_two_factor(user.user_id, "XXXXXX", &client())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AccountLocked { .. }));

    // The lock also gates password login
    let err = state
        .auth
        .authenticate(&user.handle, TEST_PASSWORD, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AccountLocked { .. }));
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn disable_requires_password_reproof_and_clears_the_credential() {
    let state = common::test_state().await;
    let user = register_user(&state, "2fa-disable").await;
    enable_two_factor(&state, &user).await;

    let err = state
        .two_factor
        .disable(user.user_id, "Wr0ng!Password", &client())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidCredential));

    state
        .two_factor
        .disable(user.user_id, TEST_PASSWORD, &client())
        .await
        .unwrap();

    let stored = state
        .db
        .find_user_by_id(user.user_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.two_factor_enabled);
    assert!(stored.totp_secret.is_none());
    assert!(stored.backup_codes.is_none());

    // Login no longer demands a second factor
    let outcome = state
        .auth
        .authenticate(&user.handle, TEST_PASSWORD, &client())
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::Authenticated { .. }));
}

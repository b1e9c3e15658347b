//! End-to-end lockout scenarios against PostgreSQL.
//!
//! Policy under test: 3 attempts, 30 minute lockout (see common::test_state).

mod common;

use common::{client, register_user, TEST_PASSWORD};
use identity_service::services::{LoginOutcome, ServiceError};

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn three_failures_lock_even_the_correct_password() {
    let state = common::test_state().await;
    let user = register_user(&state, "lockout").await;

    for _ in 0..3 {
        let err = state
            .auth
            .authenticate(&user.handle, "Wr0ng!Password", &client())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredential));
    }

    // Fourth attempt with the CORRECT password is still rejected as locked
    let err = state
        .auth
        .authenticate(&user.handle, TEST_PASSWORD, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AccountLocked { .. }));

    let stored = state
        .db
        .find_user_by_id(user.user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.failed_login_attempts, 3);
    assert!(stored.locked_until.is_some());
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn elapsed_lockout_expires_lazily_and_success_resets_counter() {
    let state = common::test_state().await;
    let user = register_user(&state, "lockout-expiry").await;

    for _ in 0..3 {
        let _ = state
            .auth
            .authenticate(&user.handle, "Wr0ng!Password", &client())
            .await;
    }

    // Fast-forward: move the lock expiry into the past
    sqlx::query("UPDATE users SET locked_until = NOW() - INTERVAL '1 second' WHERE user_id = $1")
        .bind(user.user_id)
        .execute(state.db.pool())
        .await
        .unwrap();

    // No explicit unlock happened, yet the correct password succeeds
    let outcome = state
        .auth
        .authenticate(&user.handle, TEST_PASSWORD, &client())
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::Authenticated { .. }));

    let stored = state
        .db
        .find_user_by_id(user.user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.failed_login_attempts, 0);
    assert!(stored.locked_until.is_none());
    assert!(stored.last_login.is_some());
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn administrative_unlock_clears_an_active_lock() {
    let state = common::test_state().await;
    let admin = common::admin_user(&state).await;
    let user = register_user(&state, "lockout-unlock").await;

    for _ in 0..3 {
        let _ = state
            .auth
            .authenticate(&user.handle, "Wr0ng!Password", &client())
            .await;
    }

    state
        .rbac
        .unlock_user(&admin, user.user_id, &client())
        .await
        .unwrap();

    let outcome = state
        .auth
        .authenticate(&user.handle, TEST_PASSWORD, &client())
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::Authenticated { .. }));
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn unknown_handle_and_wrong_password_are_indistinguishable() {
    let state = common::test_state().await;
    let user = register_user(&state, "lockout-enum").await;

    let unknown = state
        .auth
        .authenticate("no-such-handle", "Wr0ng!Password", &client())
        .await
        .unwrap_err();
    let wrong = state
        .auth
        .authenticate(&user.handle, "Wr0ng!Password", &client())
        .await
        .unwrap_err();

    assert_eq!(unknown.to_string(), wrong.to_string());
    assert_eq!(unknown.kind(), wrong.kind());
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn inactive_account_cannot_authenticate() {
    let state = common::test_state().await;
    let admin = common::admin_user(&state).await;
    let user = register_user(&state, "lockout-inactive").await;

    state
        .rbac
        .set_user_active(&admin, user.user_id, false, &client())
        .await
        .unwrap();

    let err = state
        .auth
        .authenticate(&user.handle, TEST_PASSWORD, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AccountInactive));
}

//! Test helpers for PostgreSQL-backed integration tests.

#![allow(dead_code)]

use identity_service::config::{
    DatabaseConfig, Environment, IdentityConfig, JwtConfig, RateLimitConfig, SecurityPolicy,
};
use identity_service::models::{ClientInfo, User};
use identity_service::services::seed;
use identity_service::{build_state, AppState};
use uuid::Uuid;

/// Connect to the test database, run migrations and seed data, and build the
/// application state with a tight lockout policy (3 attempts, 30 minutes).
pub async fn test_state() -> AppState {
    let url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/mes_identity_test".to_string());

    let config = IdentityConfig {
        environment: Environment::Dev,
        service_name: "identity-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "warn".to_string(),
        log_json: false,
        port: 0,
        database: DatabaseConfig {
            url: url.clone(),
            max_connections: 5,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: "integration-test-secret".to_string(),
            access_token_expiry_minutes: 5,
        },
        security: SecurityPolicy {
            max_login_attempts: 3,
            lockout_duration_minutes: 30,
            min_password_length: 8,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 1000,
            login_window_seconds: 60,
        },
        totp_issuer: "MES Identity Test".to_string(),
        seed_on_startup: true,
        bootstrap_admin_password: "Adm1n!Pass".to_string(),
        allowed_origins: vec!["http://localhost:3000".to_string()],
    };

    let pool = identity_service::db::create_pool(&config.database)
        .await
        .expect("test database must be reachable");
    identity_service::db::run_migrations(&pool)
        .await
        .expect("migrations must apply");

    let state = build_state(config, pool);
    seed::seed_defaults(&state.db, "Adm1n!Pass")
        .await
        .expect("seed must succeed");
    state
}

pub fn client() -> ClientInfo {
    ClientInfo {
        ip_address: Some("127.0.0.1".to_string()),
        user_agent: Some("integration-test".to_string()),
    }
}

/// A unique handle so repeated test runs never collide.
pub fn unique_handle(prefix: &str) -> String {
    format!("{}-{}", prefix, &Uuid::new_v4().to_string()[..8])
}

pub const TEST_PASSWORD: &str = "C0rrect!Horse";

/// Register a fresh user with the standard test password.
pub async fn register_user(state: &AppState, prefix: &str) -> User {
    let handle = unique_handle(prefix);
    let email = format!("{}@mes.local", handle);
    state
        .auth
        .register(handle, email, TEST_PASSWORD.to_string(), None, &client())
        .await
        .expect("registration must succeed")
}

/// Load the seeded bootstrap admin.
pub async fn admin_user(state: &AppState) -> User {
    state
        .db
        .find_user_by_handle("admin")
        .await
        .expect("database reachable")
        .expect("seeded admin exists")
}

pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    http::{HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::IdentityConfig;
use crate::middleware::{
    auth_middleware, authorization_guard_middleware, AuthorizationGuard, GuardState,
};
use crate::services::{AuditService, AuthService, Database, JwtService, RbacService, TwoFactorService};
use service_core::error::AppError;
use service_core::middleware::rate_limit::{ip_rate_limit_middleware, IpRateLimiter};
use service_core::middleware::security_headers::security_headers_middleware;
use service_core::middleware::tracing::request_id_middleware;

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub db: Database,
    pub jwt: JwtService,
    pub auth: AuthService,
    pub two_factor: TwoFactorService,
    pub rbac: RbacService,
    pub audit: AuditService,
    pub login_rate_limiter: IpRateLimiter,
}

fn guard(state: &AppState, guard: AuthorizationGuard) -> GuardState {
    GuardState::new(state.clone(), guard)
}

pub fn build_router(state: AppState) -> Router {
    // Public authentication routes; login and 2FA completion share the IP
    // rate limiter on top of the per-account lockout.
    let login_limiter = state.login_rate_limiter.clone();
    let public_auth = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/verify-2fa", post(handlers::auth::verify_two_factor))
        .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware))
        .route("/auth/register", post(handlers::auth::register));

    // Routes for any resolved, active, unlocked principal.
    let session_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/profile", get(handlers::auth::profile))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/change-password", post(handlers::auth::change_password))
        .route("/auth/2fa/setup", post(handlers::two_factor::setup))
        .route("/auth/2fa/enable", post(handlers::two_factor::enable))
        .route("/auth/2fa/disable", post(handlers::two_factor::disable))
        .route_layer(from_fn_with_state(
            guard(&state, AuthorizationGuard::Authenticated),
            authorization_guard_middleware,
        ));

    // Administrative routes, grouped by the permission each group requires.
    // Guards are composed here, per route table, not implied by handlers.
    let users_read = Router::new()
        .route("/admin/users", get(handlers::user::list_users))
        .route("/admin/users/:user_id", get(handlers::user::get_user))
        .route_layer(from_fn_with_state(
            guard(&state, AuthorizationGuard::Permission("users:read")),
            authorization_guard_middleware,
        ));

    let users_update = Router::new()
        .route(
            "/admin/users/:user_id/activate",
            post(handlers::user::activate_user),
        )
        .route(
            "/admin/users/:user_id/deactivate",
            post(handlers::user::deactivate_user),
        )
        .route(
            "/admin/users/:user_id/roles",
            post(handlers::user::assign_role),
        )
        .route(
            "/admin/users/:user_id/roles/:role_id",
            delete(handlers::user::revoke_role),
        )
        .route_layer(from_fn_with_state(
            guard(&state, AuthorizationGuard::Permission("users:update")),
            authorization_guard_middleware,
        ));

    // Unlock requires the admin role itself, not a delegable permission.
    let admin_only = Router::new()
        .route(
            "/admin/users/:user_id/unlock",
            post(handlers::user::unlock_user),
        )
        .route_layer(from_fn_with_state(
            guard(&state, AuthorizationGuard::Role("admin")),
            authorization_guard_middleware,
        ));

    let roles_read = Router::new()
        .route("/admin/roles", get(handlers::role::list_roles))
        .route("/admin/roles/:role_id", get(handlers::role::get_role))
        .route(
            "/admin/permissions",
            get(handlers::permission::list_permissions),
        )
        .route(
            "/admin/permissions/:permission_id",
            get(handlers::permission::get_permission),
        )
        .route_layer(from_fn_with_state(
            guard(&state, AuthorizationGuard::Permission("roles:read")),
            authorization_guard_middleware,
        ));

    let roles_create = Router::new()
        .route("/admin/roles", post(handlers::role::create_role))
        .route_layer(from_fn_with_state(
            guard(&state, AuthorizationGuard::Permission("roles:create")),
            authorization_guard_middleware,
        ));

    let roles_update = Router::new()
        .route("/admin/roles/:role_id", patch(handlers::role::update_role))
        .route(
            "/admin/roles/:role_id/permissions",
            post(handlers::role::grant_permission),
        )
        .route(
            "/admin/roles/:role_id/permissions/:permission_id",
            delete(handlers::role::revoke_permission),
        )
        .route_layer(from_fn_with_state(
            guard(&state, AuthorizationGuard::Permission("roles:update")),
            authorization_guard_middleware,
        ));

    let roles_delete = Router::new()
        .route("/admin/roles/:role_id", delete(handlers::role::delete_role))
        .route_layer(from_fn_with_state(
            guard(&state, AuthorizationGuard::Permission("roles:delete")),
            authorization_guard_middleware,
        ));

    let system_admin = Router::new()
        .route(
            "/admin/permissions",
            post(handlers::permission::create_permission),
        )
        .route(
            "/admin/permissions/:permission_id",
            delete(handlers::permission::delete_permission),
        )
        .route_layer(from_fn_with_state(
            guard(&state, AuthorizationGuard::Permission("system:admin")),
            authorization_guard_middleware,
        ));

    let audit_read = Router::new()
        .route("/admin/audit", get(handlers::audit::list_audit_entries))
        .route_layer(from_fn_with_state(
            guard(&state, AuthorizationGuard::Permission("audit_logs:read")),
            authorization_guard_middleware,
        ));

    // Principal resolution wraps every guarded route.
    let protected = session_routes
        .merge(users_read)
        .merge(users_update)
        .merge(admin_only)
        .merge(roles_read)
        .merge(roles_create)
        .merge(roles_update)
        .merge(roles_delete)
        .merge(system_admin)
        .merge(audit_read)
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let cors_origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}", o, e);
                None
            }
        })
        .collect();

    Router::new()
        .route("/health", get(health_check))
        .merge(public_auth)
        .merge(protected)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(cors_origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                ]),
        )
}

/// Service health check.
///
/// GET /health
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, AppError> {
    state.db.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        AppError::from(e)
    })?;

    Ok(axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "checks": {
            "postgres": "up"
        }
    })))
}

/// Wire up the full application state from config and a connected pool.
pub fn build_state(config: IdentityConfig, pool: sqlx::PgPool) -> AppState {
    let db = Database::new(pool);
    let jwt = JwtService::new(&config.jwt);
    let audit = AuditService::new(db.clone());
    let auth = AuthService::new(
        db.clone(),
        jwt.clone(),
        audit.clone(),
        config.security.clone(),
        config.totp_issuer.clone(),
    );
    let two_factor = TwoFactorService::new(db.clone(), audit.clone(), config.totp_issuer.clone());
    let rbac = RbacService::new(db.clone(), audit.clone());
    let login_rate_limiter = service_core::middleware::rate_limit::create_ip_rate_limiter(
        config.rate_limit.login_attempts,
        config.rate_limit.login_window_seconds,
    );

    AppState {
        config,
        db,
        jwt,
        auth,
        two_factor,
        rbac,
        audit,
        login_rate_limiter,
    }
}

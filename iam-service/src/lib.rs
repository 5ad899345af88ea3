pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod services;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, patch},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::services::{AccessPolicy, AccessStore, AuditRecorder, PermissionCache, SessionResolver};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn AccessStore>,
    pub sessions: SessionResolver,
    pub policy: Arc<AccessPolicy>,
    pub permissions: PermissionCache,
    pub audit: AuditRecorder,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn AccessStore>) -> Self {
        let sessions = SessionResolver::new(&config.session);
        let permissions = PermissionCache::new(Arc::clone(&store));
        let audit = AuditRecorder::new(Arc::clone(&store), config.audit.detached_write_budget);
        Self {
            config,
            store,
            sessions,
            policy: Arc::new(AccessPolicy::dashboard_defaults()),
            permissions,
            audit,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(
            state
                .config
                .security
                .allowed_origins
                .iter()
                .map(|o| {
                    o.parse::<HeaderValue>().unwrap_or_else(|e| {
                        tracing::error!("Invalid CORS origin '{}': {}. Using fallback.", o, e);
                        HeaderValue::from_static("http://localhost:3000")
                    })
                })
                .collect::<Vec<HeaderValue>>(),
        )
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::PUT])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/health", get(health_check))
        .route("/profile", get(handlers::profile::get_profile))
        .route(
            "/api/me/permissions/:name",
            get(handlers::profile::check_permission),
        )
        .route("/admin/users", get(handlers::admin::users::list_users))
        .route(
            "/admin/users/:id/role",
            patch(handlers::admin::users::update_user_role),
        )
        .route(
            "/admin/roles/:role/permissions",
            get(handlers::admin::roles::get_role_permissions)
                .put(handlers::admin::roles::replace_role_permissions),
        )
        .route("/admin/audit-logs", get(handlers::audit::list_audit_logs))
        .layer(from_fn_with_state(state.clone(), middleware::access_pipeline))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Service health check.
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        e
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "checks": {
            "store": "up"
        }
    })))
}

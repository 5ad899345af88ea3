//! Test helper module for iam-service integration tests.
//!
//! Builds the full router against the in-memory store so tests exercise the
//! pipeline end to end without a database.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request};
use axum::Router;
use http_body_util::BodyExt;
use iam_service::{
    build_router,
    config::{
        AppConfig, AuditConfig, DatabaseConfig, Environment, SecurityConfig, SessionConfig,
    },
    models::User,
    services::{AccessStore, MemoryStore},
    AppState,
};

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    /// Build the application over a fresh in-memory store with the default
    /// permission catalog.
    pub fn spawn() -> Self {
        let store = Arc::new(MemoryStore::with_default_catalog());
        let state = AppState::new(
            test_config(),
            Arc::clone(&store) as Arc<dyn AccessStore>,
        );
        let app = build_router(state.clone());
        Self { app, state, store }
    }

    /// Mint a session cookie header value for a user, the way the auth
    /// provider would.
    pub fn session_cookie(&self, user: &User) -> String {
        format!(
            "{}={}",
            self.state.sessions.cookie_name(),
            self.state.sessions.encode(user.id, user.role)
        )
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        environment: Environment::Dev,
        service_name: "iam-service".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        port: 8080,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        session: SessionConfig {
            cookie_name: "iam_session".to_string(),
            secret: "integration-test-session-secret".to_string(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        audit: AuditConfig {
            detached_write_budget: 8,
        },
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn get_with_cookie(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

pub async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

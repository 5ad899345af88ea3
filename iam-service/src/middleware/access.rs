//! Request-interception access-control pipeline.
//!
//! Every inbound request passes through here: resolve the session cookie,
//! authorize against the path rules, invoke the downstream handler, record
//! an audit event with the request's wall-clock duration. Denials redirect;
//! handler faults are contained at this boundary and degrade to a generic
//! error response.

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use futures::FutureExt;

use crate::models::{AuditEvent, AuthMethod, EventType};
use crate::services::{AccessDecision, AuditRecorder, SessionIdentity};
use crate::AppState;

const SIGN_IN_PATH: &str = "/sign-in";
const ACCESS_DENIED_PATH: &str = "/access-denied";

/// Routes owned by the external auth provider; exempt from session guarding
/// but still timed and audited (they are the source of login events).
const AUTH_ROUTE_PREFIX: &str = "/api/auth";

pub async fn access_pipeline(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();

    // Static assets bypass the pipeline entirely.
    if is_static_asset(&path) {
        return next.run(req).await;
    }

    let started = Instant::now();
    let method = req.method().clone();
    let client = ClientInfo::from_headers(req.headers());
    let identity = state.sessions.resolve(req.headers());
    let auth_route = path.starts_with(AUTH_ROUTE_PREFIX);

    if !auth_route {
        match state.policy.evaluate(identity.as_ref(), &path) {
            AccessDecision::Allow => {}
            AccessDecision::RedirectToSignIn => {
                record_denied(&state, identity.as_ref(), &client, &path, &method, "unauthenticated", started)
                    .await;
                return Redirect::to(SIGN_IN_PATH).into_response();
            }
            AccessDecision::RedirectToAccessDenied => {
                record_denied(&state, identity.as_ref(), &client, &path, &method, "forbidden", started)
                    .await;
                return Redirect::to(ACCESS_DENIED_PATH).into_response();
            }
        }
    }

    if let Some(identity) = &identity {
        req.extensions_mut().insert(identity.clone());
    }

    let protected = state.policy.is_protected(&path);
    let user_id = identity.as_ref().map(|i| i.user_id);
    let auth_method = if auth_route {
        AuthMethod::from_path_hint(&path)
    } else {
        AuthMethod::EmailPassword
    };

    // Armed until the audit stage runs; if the request is cancelled first,
    // the drop handler ships a best-effort event without blocking teardown.
    let mut abort_audit = AbortAudit {
        recorder: state.audit.clone(),
        started,
        event: (auth_route || protected).then(|| {
            AuditEvent::new(
                user_id,
                client.ip_address.clone(),
                client.user_agent.clone(),
                auth_method,
                if auth_route {
                    EventType::LoginFailure
                } else {
                    EventType::AccessDenied
                },
                detail(&path, &method, Some("request aborted")),
                false,
                None,
            )
        }),
    };

    let outcome = AssertUnwindSafe(next.run(req)).catch_unwind().await;
    abort_audit.disarm();
    let elapsed_ms = started.elapsed().as_millis() as i64;

    let response = match outcome {
        Ok(response) => response,
        Err(panic) => {
            let message = panic_message(panic);
            tracing::error!(
                path = %path,
                method = %method,
                error = %message,
                "Handler fault contained at pipeline boundary"
            );
            let event = AuditEvent::new(
                user_id,
                client.ip_address.clone(),
                client.user_agent.clone(),
                auth_method,
                EventType::AccessDenied,
                detail(&path, &method, Some(&message)),
                false,
                Some(elapsed_ms),
            );
            state.audit.record(event).await;
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "An error occurred" })),
            )
                .into_response();
        }
    };

    let status = response.status();
    if auth_route {
        let event = AuditEvent::new(
            user_id,
            client.ip_address,
            client.user_agent,
            auth_method,
            if status.is_success() {
                EventType::LoginSuccess
            } else {
                EventType::LoginFailure
            },
            detail(&path, &method, None),
            status.is_success(),
            Some(elapsed_ms),
        );
        state.audit.record(event).await;
    } else if protected {
        let event = AuditEvent::new(
            user_id,
            client.ip_address,
            client.user_agent,
            auth_method,
            if status.is_success() {
                EventType::LoginSuccess
            } else {
                EventType::AccessDenied
            },
            detail(&path, &method, None),
            status.is_success(),
            Some(elapsed_ms),
        );
        state.audit.record(event).await;
    }

    response
}

async fn record_denied(
    state: &AppState,
    identity: Option<&SessionIdentity>,
    client: &ClientInfo,
    path: &str,
    method: &Method,
    reason: &str,
    started: Instant,
) {
    let event = AuditEvent::new(
        identity.map(|i| i.user_id),
        client.ip_address.clone(),
        client.user_agent.clone(),
        AuthMethod::EmailPassword,
        EventType::AccessDenied,
        detail(path, method, Some(reason)),
        false,
        Some(started.elapsed().as_millis() as i64),
    );
    state.audit.record(event).await;
}

fn detail(path: &str, method: &Method, error: Option<&str>) -> String {
    let mut value = serde_json::json!({
        "path": path,
        "method": method.as_str(),
    });
    if let Some(error) = error {
        value["error"] = serde_json::Value::String(error.to_string());
    }
    value.to_string()
}

fn is_static_asset(path: &str) -> bool {
    if path.starts_with("/_next") {
        return true;
    }
    path.rsplit('/')
        .next()
        .map(|segment| segment.contains('.'))
        .unwrap_or(false)
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

struct ClientInfo {
    ip_address: Option<String>,
    user_agent: Option<String>,
}

impl ClientInfo {
    fn from_headers(headers: &HeaderMap) -> Self {
        let ip_address = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        Self {
            ip_address,
            user_agent,
        }
    }
}

/// Ships a best-effort audit event if the request future is dropped before
/// the pipeline reaches its audit stage.
struct AbortAudit {
    recorder: AuditRecorder,
    started: Instant,
    event: Option<AuditEvent>,
}

impl AbortAudit {
    fn disarm(&mut self) {
        self.event = None;
    }
}

impl Drop for AbortAudit {
    fn drop(&mut self) {
        if let Some(mut event) = self.event.take() {
            event.response_time_ms = Some(self.started.elapsed().as_millis() as i64);
            self.recorder.record_detached(event);
        }
    }
}

/// Extractor for the identity resolved by the pipeline.
pub struct CurrentUser(pub SessionIdentity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = crate::error::AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts
            .extensions
            .get::<SessionIdentity>()
            .cloned()
            .ok_or_else(|| {
                crate::error::AppError::Unauthorized(anyhow::anyhow!("Authentication required"))
            })?;
        Ok(CurrentUser(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_asset_detection() {
        assert!(is_static_asset("/_next/static/chunk.js"));
        assert!(is_static_asset("/favicon.ico"));
        assert!(is_static_asset("/images/logo.png"));
        assert!(!is_static_asset("/admin/audit-logs"));
        assert!(!is_static_asset("/profile"));
        assert!(!is_static_asset("/"));
    }

    #[test]
    fn test_client_info_parses_forwarded_chain() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.7, 10.0.0.1".parse().unwrap(),
        );
        headers.insert(header::USER_AGENT, "test-agent/1.0".parse().unwrap());

        let client = ClientInfo::from_headers(&headers);
        assert_eq!(client.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(client.user_agent.as_deref(), Some("test-agent/1.0"));
    }

    #[test]
    fn test_detail_serializes_error() {
        let value = detail("/admin", &Method::GET, Some("forbidden"));
        let parsed: serde_json::Value = serde_json::from_str(&value).unwrap();
        assert_eq!(parsed["path"], "/admin");
        assert_eq!(parsed["method"], "GET");
        assert_eq!(parsed["error"], "forbidden");
    }
}

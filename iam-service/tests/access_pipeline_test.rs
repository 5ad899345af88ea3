//! End-to-end tests for the request-interception pipeline.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::routing;
use axum::Router;
use common::{get, get_with_cookie, response_json, TestApp};
use iam_service::middleware::access_pipeline;
use iam_service::models::{EventType, Role};
use tower::util::ServiceExt;

#[tokio::test]
async fn test_anonymous_protected_path_redirects_to_sign_in() {
    let app = TestApp::spawn();

    let request = Request::builder()
        .uri("/profile")
        .header("x-forwarded-for", "203.0.113.9")
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "/sign-in"
    );

    let events = app.store.audit_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::AccessDenied);
    assert!(!events[0].success);
    assert_eq!(events[0].user_id, None);
    assert_eq!(events[0].ip_address.as_deref(), Some("203.0.113.9"));
}

#[tokio::test]
async fn test_malformed_cookie_is_treated_as_anonymous() {
    let app = TestApp::spawn();

    let response = app
        .app
        .clone()
        .oneshot(get_with_cookie("/profile", "iam_session=not-a-valid-cookie"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "/sign-in"
    );
}

#[tokio::test]
async fn test_user_role_denied_on_admin_path() {
    let app = TestApp::spawn();
    let user = app.store.seed_user("Uma", "uma@example.com", Role::User);
    let cookie = app.session_cookie(&user);

    let response = app
        .app
        .clone()
        .oneshot(get_with_cookie("/admin/users", &cookie))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "/access-denied"
    );

    let events = app.store.audit_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::AccessDenied);
    assert_eq!(events[0].user_id, Some(user.id));
}

#[tokio::test]
async fn test_admin_reaches_audit_logs_with_timing() {
    let app = TestApp::spawn();
    let admin = app.store.seed_user("Ada", "ada@example.com", Role::Admin);
    let cookie = app.session_cookie(&admin);

    let response = app
        .app
        .clone()
        .oneshot(get_with_cookie("/admin/audit-logs", &cookie))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let events = app.store.audit_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::LoginSuccess);
    assert!(events[0].success);
    assert_eq!(events[0].user_id, Some(admin.id));
    assert!(events[0].response_time_ms.unwrap() >= 0);
}

#[tokio::test]
async fn test_moderator_denied_on_nested_admin_prefix() {
    let app = TestApp::spawn();
    let moderator = app
        .store
        .seed_user("Mia", "mia@example.com", Role::Moderator);
    let cookie = app.session_cookie(&moderator);

    let response = app
        .app
        .clone()
        .oneshot(get_with_cookie("/admin/audit-logs", &cookie))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "/access-denied"
    );
}

#[tokio::test]
async fn test_profile_returns_identity() {
    let app = TestApp::spawn();
    let user = app.store.seed_user("Paul", "paul@example.com", Role::User);
    let cookie = app.session_cookie(&user);

    let response = app
        .app
        .clone()
        .oneshot(get_with_cookie("/profile", &cookie))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["email"], "paul@example.com");
    assert_eq!(body["role"], "user");

    let events = app.store.audit_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::LoginSuccess);
}

#[tokio::test]
async fn test_static_assets_bypass_pipeline() {
    let app = TestApp::spawn();

    for uri in ["/favicon.ico", "/_next/static/chunk.js", "/logo.svg"] {
        let response = app.app.clone().oneshot(get(uri)).await.unwrap();
        // No route is registered; the point is that nothing was audited and
        // nothing redirected.
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
    assert!(app.store.audit_events().is_empty());
}

#[tokio::test]
async fn test_unprotected_path_is_not_audited() {
    let app = TestApp::spawn();

    let response = app.app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.store.audit_events().is_empty());
}

#[tokio::test]
async fn test_auth_provider_route_is_audited_with_method_inference() {
    let app = TestApp::spawn();

    // The auth provider's routes are not served by this router; the pipeline
    // still classifies and audits the attempt.
    let response = app
        .app
        .clone()
        .oneshot(get("/api/auth/callback/github"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let events = app.store.audit_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::LoginFailure);
    assert!(!events[0].success);
    assert_eq!(events[0].auth_method.as_str(), "github");
}

#[tokio::test]
async fn test_audit_store_failure_does_not_change_response() {
    let app = TestApp::spawn();
    let admin = app.store.seed_user("Ada", "ada@example.com", Role::Admin);
    let cookie = app.session_cookie(&admin);

    app.store.set_fail_audit_writes(true);

    // Denied request still redirects.
    let response = app.app.clone().oneshot(get("/profile")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    // Allowed request still succeeds.
    let response = app
        .app
        .clone()
        .oneshot(get_with_cookie("/admin/audit-logs", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(app.store.audit_events().is_empty());
}

#[tokio::test]
async fn test_handler_panic_is_contained_and_audited() {
    let app = TestApp::spawn();
    let admin = app.store.seed_user("Ada", "ada@example.com", Role::Admin);
    let cookie = app.session_cookie(&admin);

    // A router with a faulting handler behind the same pipeline.
    async fn boom() -> StatusCode {
        panic!("boom")
    }
    let faulty: Router = Router::new()
        .route("/admin/boom", routing::get(boom))
        .layer(from_fn_with_state(app.state.clone(), access_pipeline));

    let request = Request::builder()
        .method(Method::GET)
        .uri("/admin/boom")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let response = faulty.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = response_json(response).await;
    assert_eq!(body["error"], "An error occurred");

    let events = app.store.audit_events();
    assert_eq!(events.len(), 1);
    assert!(!events[0].success);
    assert_eq!(events[0].user_id, Some(admin.id));
    assert!(events[0].event_details.contains("boom"));
}

#[tokio::test]
async fn test_cancelled_request_still_ships_best_effort_audit() {
    let app = TestApp::spawn();
    let admin = app.store.seed_user("Ada", "ada@example.com", Role::Admin);
    let cookie = app.session_cookie(&admin);

    let slow: Router = Router::new()
        .route(
            "/admin/slow",
            routing::get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }),
        )
        .layer(from_fn_with_state(app.state.clone(), access_pipeline));

    let request = Request::builder()
        .uri("/admin/slow")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();

    // Abandon the request before the handler completes; the in-flight
    // pipeline future is dropped.
    let aborted = tokio::time::timeout(Duration::from_millis(50), slow.oneshot(request)).await;
    assert!(aborted.is_err());

    // The audit write is fire-and-forget: it lands without the request.
    for _ in 0..20 {
        if !app.store.audit_events().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    let events = app.store.audit_events();
    assert_eq!(events.len(), 1);
    assert!(!events[0].success);
    assert_eq!(events[0].user_id, Some(admin.id));
    assert!(events[0].event_details.contains("request aborted"));
    assert!(events[0].response_time_ms.unwrap() >= 0);
}

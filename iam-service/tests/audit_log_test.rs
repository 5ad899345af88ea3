//! Audit-log viewer tests: filtering, search and pagination.

mod common;

use axum::http::StatusCode;
use common::{get_with_cookie, response_json, TestApp};
use iam_service::models::{AuditEvent, AuthMethod, EventType, Role, User};
use iam_service::services::AccessStore;
use tower::util::ServiceExt;

async fn seed_events(app: &TestApp, actor: &User) {
    let events = [
        AuditEvent::new(
            Some(actor.id),
            Some("198.51.100.4".to_string()),
            Some("browser/1.0".to_string()),
            AuthMethod::Google,
            EventType::LoginSuccess,
            r#"{"path":"/api/auth/callback/google"}"#.to_string(),
            true,
            Some(12),
        ),
        AuditEvent::new(
            None,
            Some("203.0.113.50".to_string()),
            None,
            AuthMethod::EmailPassword,
            EventType::AccessDenied,
            r#"{"path":"/admin"}"#.to_string(),
            false,
            Some(2),
        ),
        AuditEvent::new(
            Some(actor.id),
            None,
            None,
            AuthMethod::EmailPassword,
            EventType::RoleChange,
            r#"{"role":"moderator"}"#.to_string(),
            true,
            None,
        ),
    ];
    for event in events {
        app.store.insert_audit_event(&event).await.unwrap();
    }
}

#[tokio::test]
async fn test_viewer_lists_newest_first() {
    let app = TestApp::spawn();
    let admin = app.store.seed_user("Ada", "ada@example.com", Role::Admin);
    seed_events(&app, &admin).await;
    let cookie = app.session_cookie(&admin);

    let response = app
        .app
        .clone()
        .oneshot(get_with_cookie("/admin/audit-logs", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["total"], 3);
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0]["event_type"], "role_change");
    // Joined actor name is present for attributed events.
    assert_eq!(events[0]["user_name"], "Ada");
}

#[tokio::test]
async fn test_viewer_filters_by_event_type() {
    let app = TestApp::spawn();
    let admin = app.store.seed_user("Ada", "ada@example.com", Role::Admin);
    seed_events(&app, &admin).await;
    let cookie = app.session_cookie(&admin);

    let response = app
        .app
        .clone()
        .oneshot(get_with_cookie(
            "/admin/audit-logs?event_type=access_denied",
            &cookie,
        ))
        .await
        .unwrap();
    let body = response_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["events"][0]["event_type"], "access_denied");
    assert_eq!(body["events"][0]["user_id"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_viewer_search_matches_name_ip_and_details() {
    let app = TestApp::spawn();
    let admin = app.store.seed_user("Ada", "ada@example.com", Role::Admin);
    seed_events(&app, &admin).await;
    let cookie = app.session_cookie(&admin);

    for (query, expected_total) in [
        ("search=ada", 2),
        ("search=203.0.113", 1),
        ("search=moderator", 1),
        ("search=nothing-matches", 0),
    ] {
        let response = app
            .app
            .clone()
            .oneshot(get_with_cookie(
                &format!("/admin/audit-logs?{}", query),
                &cookie,
            ))
            .await
            .unwrap();
        let body = response_json(response).await;
        assert_eq!(body["total"], expected_total, "query {:?}", query);
    }
}

#[tokio::test]
async fn test_viewer_pagination() {
    let app = TestApp::spawn();
    let admin = app.store.seed_user("Ada", "ada@example.com", Role::Admin);
    seed_events(&app, &admin).await;
    let cookie = app.session_cookie(&admin);

    let response = app
        .app
        .clone()
        .oneshot(get_with_cookie(
            "/admin/audit-logs?limit=2&offset=2",
            &cookie,
        ))
        .await
        .unwrap();
    let body = response_json(response).await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["events"].as_array().unwrap().len(), 1);
    assert_eq!(body["limit"], 2);
    assert_eq!(body["offset"], 2);
}

#[tokio::test]
async fn test_viewer_rejects_unknown_event_type() {
    let app = TestApp::spawn();
    let admin = app.store.seed_user("Ada", "ada@example.com", Role::Admin);
    let cookie = app.session_cookie(&admin);

    let response = app
        .app
        .clone()
        .oneshot(get_with_cookie(
            "/admin/audit-logs?event_type=bogus",
            &cookie,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_viewer_accepts_all_filter() {
    let app = TestApp::spawn();
    let admin = app.store.seed_user("Ada", "ada@example.com", Role::Admin);
    seed_events(&app, &admin).await;
    let cookie = app.session_cookie(&admin);

    let response = app
        .app
        .clone()
        .oneshot(get_with_cookie("/admin/audit-logs?event_type=all", &cookie))
        .await
        .unwrap();
    let body = response_json(response).await;
    assert_eq!(body["total"], 3);
}

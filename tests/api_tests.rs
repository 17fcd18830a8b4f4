// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API route tests.
//!
//! These tests verify that:
//! 1. Protected routes reject requests without a valid session
//! 2. Sessions are accepted from the cookie or a Bearer header
//! 3. Connection, polling, metric, and disconnect routes drive the services

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use serde_json::Value;
use tower::ServiceExt;

mod common;
use common::{now_ms, RefreshMode, SourceMode, TestApp};

async fn json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn authed(app: &TestApp, method: &str, uri: &str, user_id: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", app.jwt(user_id)))
        .body(Body::empty())
        .unwrap()
}

fn authed_json(app: &TestApp, method: &str, uri: &str, user_id: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", app.jwt(user_id)))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ─── Health & Auth ───────────────────────────────────────────

#[tokio::test]
async fn test_health_reports_active_schedules() {
    let app = TestApp::new();
    app.seed_valid("alice").await;
    app.state.scheduler.start_user_polling("alice");

    let response = app
        .router()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_schedules"], 1);
}

#[tokio::test]
async fn test_protected_route_without_token() {
    let app = TestApp::new();

    let response = app
        .router()
        .oneshot(Request::builder().uri("/api/me").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "unauthorized");
}

#[tokio::test]
async fn test_protected_route_with_invalid_token() {
    let app = TestApp::new();

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/api/me")
                .header(header::AUTHORIZATION, "Bearer invalid.token.here")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_signed_with_other_key_rejected() {
    let app = TestApp::new();
    let token = pulse_relay::middleware::create_jwt("alice", b"some_other_key").unwrap();

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/api/me")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_cookie_accepted() {
    let app = TestApp::new();

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/api/me")
                .header(header::COOKIE, format!("pulse_token={}", app.jwt("alice")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["user_id"], "alice");
}

#[tokio::test]
async fn test_cors_preflight() {
    let app = TestApp::new();

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/me")
                .header(header::ORIGIN, "http://localhost:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:5173"
    );
}

// ─── Connection Status ───────────────────────────────────────

#[tokio::test]
async fn test_me_not_connected() {
    let app = TestApp::new();

    let response = app
        .router()
        .oneshot(authed(&app, "GET", "/api/me", "alice"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["connected"], false);
    assert_eq!(body["polling_active"], false);
}

#[tokio::test]
async fn test_me_connected_does_not_refresh() {
    let app = TestApp::new();
    let expires_at = now_ms() - 1000;
    app.seed("alice", expires_at, true).await;

    let response = app
        .router()
        .oneshot(authed(&app, "GET", "/api/me", "alice"))
        .await
        .unwrap();

    let body = json_body(response).await;
    assert_eq!(body["connected"], true);
    assert_eq!(body["polling_enabled"], true);
    assert_eq!(body["expires_at"], expires_at);
    assert_eq!(app.endpoint.refresh_count(), 0);
}

// ─── One-shot Metric ─────────────────────────────────────────

#[tokio::test]
async fn test_metric_returns_sample() {
    let app = TestApp::new();
    app.seed_valid("alice").await;
    app.source.set_mode(SourceMode::Value(64.5));

    let response = app
        .router()
        .oneshot(authed(&app, "GET", "/api/metric", "alice"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["user_id"], "alice");
    assert_eq!(body["metric_value"], 64.5);
    assert_eq!(body["auxiliary_fields"]["quality"], "good");

    // One-shot reads are not relayed.
    assert_eq!(app.sink.count(), 0);
}

#[tokio::test]
async fn test_metric_without_credential_is_not_authenticated() {
    let app = TestApp::new();

    let response = app
        .router()
        .oneshot(authed(&app, "GET", "/api/metric", "alice"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "not_authenticated");
}

#[tokio::test]
async fn test_metric_no_data() {
    let app = TestApp::new();
    app.seed_valid("alice").await;
    app.source.set_mode(SourceMode::Empty);

    let response = app
        .router()
        .oneshot(authed(&app, "GET", "/api/metric", "alice"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "no_data");
}

#[tokio::test]
async fn test_metric_upstream_unavailable() {
    let app = TestApp::new();
    app.seed("alice", now_ms() - 1000, false).await;
    app.endpoint.set_mode(RefreshMode::Transient);

    let response = app
        .router()
        .oneshot(authed(&app, "GET", "/api/metric", "alice"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["error"], "upstream_unavailable");
    assert_eq!(app.store.len(), 1);
}

#[tokio::test]
async fn test_metric_rejected_grant_is_not_authenticated() {
    let app = TestApp::new();
    app.seed("alice", now_ms() - 1000, false).await;
    app.endpoint.set_mode(RefreshMode::Reject);

    let response = app
        .router()
        .oneshot(authed(&app, "GET", "/api/metric", "alice"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.store.is_empty());
}

// ─── Polling Toggle ──────────────────────────────────────────

#[tokio::test]
async fn test_enable_polling_persists_and_starts() {
    let app = TestApp::new();
    app.seed_valid("alice").await;

    let response = app
        .router()
        .oneshot(authed_json(
            &app,
            "PUT",
            "/api/polling",
            "alice",
            serde_json::json!({ "enabled": true }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["polling_enabled"], true);
    assert_eq!(body["polling_active"], true);

    assert!(app.state.scheduler.is_polling("alice"));
    assert_eq!(
        app.state.vault.polling_enabled_users().await.unwrap(),
        vec!["alice".to_string()]
    );
}

#[tokio::test]
async fn test_disable_polling_persists_and_stops() {
    let app = TestApp::new();
    app.seed("alice", now_ms() + 3_600_000, true).await;
    app.state.scheduler.start_user_polling("alice");

    let response = app
        .router()
        .oneshot(authed_json(
            &app,
            "PUT",
            "/api/polling",
            "alice",
            serde_json::json!({ "enabled": false }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!app.state.scheduler.is_polling("alice"));
    assert!(app.state.vault.polling_enabled_users().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_enable_polling_without_credential() {
    let app = TestApp::new();

    let response = app
        .router()
        .oneshot(authed_json(
            &app,
            "PUT",
            "/api/polling",
            "alice",
            serde_json::json!({ "enabled": true }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!app.state.scheduler.is_polling("alice"));
}

// ─── Disconnect ──────────────────────────────────────────────

#[tokio::test]
async fn test_disconnect_stops_revokes_and_deletes() {
    let app = TestApp::new();
    app.seed("alice", now_ms() + 3_600_000, true).await;
    app.state.scheduler.start_user_polling("alice");

    let response = app
        .router()
        .oneshot(authed(&app, "DELETE", "/api/connection", "alice"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["had_credential"], true);

    assert!(!app.state.scheduler.is_polling("alice"));
    assert!(app.store.is_empty());
    assert_eq!(*app.endpoint.revoked.lock().unwrap(), vec!["access-seed"]);
}

#[tokio::test]
async fn test_disconnect_without_credential() {
    let app = TestApp::new();

    let response = app
        .router()
        .oneshot(authed(&app, "DELETE", "/api/connection", "alice"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["had_credential"], false);
    assert!(app.endpoint.revoked.lock().unwrap().is_empty());
}

// ─── Startup Resume ──────────────────────────────────────────

#[tokio::test]
async fn test_resume_enabled_schedules() {
    let app = TestApp::new();
    app.seed("a", now_ms() + 3_600_000, true).await;
    app.seed("b", now_ms() + 3_600_000, true).await;
    app.seed("c", now_ms() + 3_600_000, false).await;

    let started = app.state.account.resume_enabled_schedules().await.unwrap();

    assert_eq!(started, 2);
    assert_eq!(app.state.scheduler.active_users(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_connect_keeps_existing_polling_flag() {
    let app = TestApp::new();
    app.seed("alice", now_ms() + 3_600_000, true).await;

    app.state
        .account
        .connect("alice", "fresh".into(), "fresh-refresh".into(), now_ms() + 3_600_000)
        .await
        .unwrap();

    let credential = app.state.vault.get_raw("alice").await.unwrap().unwrap();
    assert_eq!(credential.access_token, "fresh");
    assert!(credential.polling_enabled);
}

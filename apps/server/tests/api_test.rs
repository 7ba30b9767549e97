//! Control-plane route tests, driven through the router without a listener.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tower::ServiceExt;

use courier_core::config::CourierConfig;
use courier_core::connect::LoopbackConnector;
use courier_core::dispatch::NoopHandler;
use courier_core::session::SessionManager;
use courier_core::store::{SessionStore, SqliteStore};

use courier_server::routes::{AppState, router};

struct TestApp {
    app: Router,
    // Keeps the temp credential root alive for the test's duration.
    _creds_dir: TempDir,
}

fn test_app() -> TestApp {
    let creds_dir = TempDir::new().expect("temp credential dir");
    let mut cfg = CourierConfig::default();
    cfg.credentials_dir = creds_dir.path().to_path_buf();
    let cfg = Arc::new(cfg);

    let store: Arc<dyn SessionStore> =
        Arc::new(SqliteStore::open_in_memory().expect("in-memory store"));
    let manager = SessionManager::new(
        Arc::clone(&cfg),
        Arc::clone(&store),
        Arc::new(LoopbackConnector::new()),
        Arc::new(NoopHandler),
    )
    .expect("manager construction");

    let state = AppState { manager, store, started_at: Instant::now() };
    TestApp { app: router(state), _creds_dir: creds_dir }
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_create_requires_number() {
    let t = test_app();
    let (status, body) = get_json(&t.app, "/").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("number"));
}

#[tokio::test]
async fn test_create_and_report_session() {
    let t = test_app();

    let (status, body) = get_json(&t.app, "/?number=94741671668").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["number"], "94741671668");
    assert_eq!(body["message"], "Session creation initiated");

    // Second call reports the existing session instead of duplicating it.
    let (status, body) = get_json(&t.app, "/?number=94741671668").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Session already active");

    let (_, active) = get_json(&t.app, "/active").await;
    assert_eq!(active["count"], 1);
}

#[tokio::test]
async fn test_create_sanitizes_number() {
    let t = test_app();
    let (status, body) = get_json(&t.app, "/?number=%2B94%20741-671-668").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["number"], "94741671668");
}

#[tokio::test]
async fn test_ping_reports_store_and_sessions() {
    let t = test_app();
    let (status, body) = get_json(&t.app, "/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "pong");
    assert_eq!(body["store_connected"], true);
    assert_eq!(body["active_sessions"], 0);
}

#[tokio::test]
async fn test_session_health_aggregates() {
    let t = test_app();
    get_json(&t.app, "/?number=111").await;
    // Let the auto-open event settle into active health.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let (status, body) = get_json(&t.app, "/session-health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overall"]["total"], 1);
    assert_eq!(body["overall"]["active"], 1);
}

#[tokio::test]
async fn test_delete_session_route() {
    let t = test_app();
    get_json(&t.app, "/?number=94741671668").await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/session/94741671668")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["number"], "94741671668");

    let (_, active) = get_json(&t.app, "/active").await;
    assert_eq!(active["count"], 0);
}

#[tokio::test]
async fn test_sync_and_cleanup_and_restore_routes() {
    let t = test_app();

    let (status, body) = get_json(&t.app, "/sync-store").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = get_json(&t.app, "/cleanup").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = get_json(&t.app, "/restore-all").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_store_status_route() {
    let t = test_app();
    let (status, body) = get_json(&t.app, "/store-status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["connected"], true);
    assert_eq!(body["pending_writes"], 0);
    assert_eq!(body["records"]["total"], 0);
}

#[tokio::test]
async fn test_request_pair_route() {
    let t = test_app();
    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/request-pair")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"number":"94741671668"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["code"].as_str().unwrap().len(), 8);
}

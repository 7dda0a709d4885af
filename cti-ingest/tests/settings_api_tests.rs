//! Integration tests for the LLM API key settings endpoint

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use cti_common::events::EventBus;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tower::ServiceExt;

use cti_ingest::config::LlmRuntime;
use cti_ingest::{build_router, AppState};

async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .unwrap();
    cti_common::db::init::create_tables(&pool).await.unwrap();
    pool
}

fn test_state(pool: SqlitePool) -> AppState {
    let event_bus = EventBus::new(100);
    AppState::new(pool, event_bus, LlmRuntime::new(None, None))
}

#[tokio::test]
async fn test_set_api_key_success() {
    let pool = test_pool().await;
    let state = test_state(pool.clone());
    let app = build_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/api/settings/llm_api_key")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "api_key": "test-key-valid-123" }).to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let response_json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(response_json["success"], true);
    assert!(response_json["message"]
        .as_str()
        .unwrap()
        .contains("configured successfully"));

    // Verify database
    let db_key = cti_ingest::db::settings::get_llm_api_key(&pool)
        .await
        .unwrap();
    assert_eq!(db_key, Some("test-key-valid-123".to_string()));
}

#[tokio::test]
async fn test_set_api_key_rejects_empty_key() {
    let pool = test_pool().await;
    let state = test_state(pool.clone());
    let app = build_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/api/settings/llm_api_key")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "api_key": "" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Verify database NOT updated
    let db_key = cti_ingest::db::settings::get_llm_api_key(&pool)
        .await
        .unwrap();
    assert_eq!(db_key, None);
}

#[tokio::test]
async fn test_set_api_key_rejects_whitespace_key() {
    let pool = test_pool().await;
    let state = test_state(pool.clone());
    let app = build_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/api/settings/llm_api_key")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "api_key": "   " }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_key_status_reports_unconfigured() {
    let pool = test_pool().await;
    let state = test_state(pool);
    let app = build_router(state);

    let request = Request::builder()
        .method("GET")
        .uri("/api/settings/llm_api_key")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let response_json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(response_json["configured"], false);
    assert!(response_json.get("source").is_none());
}

#[tokio::test]
async fn test_set_key_updates_running_service() {
    let pool = test_pool().await;
    let state = test_state(pool);
    let app = build_router(state.clone());

    let request = Request::builder()
        .method("POST")
        .uri("/api/settings/llm_api_key")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "api_key": "sk-live" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(state.llm.read().await.is_configured());
}

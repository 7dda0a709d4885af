//! Router-level integration tests: health, params, scrape and workflow
//! endpoint contracts

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Utc;
use cti_common::db::models::{Article, TriageStatus};
use cti_common::events::EventBus;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tower::ServiceExt;
use uuid::Uuid;

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
    AppState::new(pool, EventBus::new(100), LlmRuntime::new(None, None))
}

async fn insert_article(pool: &SqlitePool) -> Uuid {
    let article = Article {
        article_id: Uuid::new_v4(),
        source_id: None,
        title: "Test article".to_string(),
        url: format!("https://example.com/{}", Uuid::new_v4()),
        content: "The actor used certutil to download a payload.".to_string(),
        content_hash: format!("{:064x}", rand_hash()),
        summary: None,
        published_at: None,
        scraped_at: Utc::now(),
        triage_status: TriageStatus::New,
        os_targets: None,
        indicators: None,
        ttps: None,
    };
    cti_ingest::db::articles::insert_article(pool, &article)
        .await
        .unwrap();
    article.article_id
}

fn rand_hash() -> u128 {
    Uuid::new_v4().as_u128()
}

#[tokio::test]
async fn test_health_endpoint() {
    let pool = test_pool().await;
    let app = build_router(test_state(pool));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["module"], "cti-ingest");
    assert_eq!(health["llm_configured"], false);
}

#[tokio::test]
async fn test_params_roundtrip() {
    let pool = test_pool().await;
    let app = build_router(test_state(pool));

    // Defaults come back when nothing is stored.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/params")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let params: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(params["ranking_threshold"], 40);

    // Update and read back.
    let mut updated = params.clone();
    updated["ranking_threshold"] = json!(65);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/params")
                .header("content-type", "application/json")
                .body(Body::from(updated.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/params")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let params: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(params["ranking_threshold"], 65);
}

#[tokio::test]
async fn test_params_rejects_out_of_range() {
    let pool = test_pool().await;
    let app = build_router(test_state(pool));

    let mut params = serde_json::to_value(cti_common::params::PipelineParams::default()).unwrap();
    params["junk_threshold"] = json!(2.5);

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/params")
                .header("content-type", "application/json")
                .body(Body::from(params.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_workflow_start_requires_existing_article() {
    let pool = test_pool().await;
    let app = build_router(test_state(pool));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/workflow/start")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "article_id": Uuid::new_v4() }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_workflow_start_requires_llm_key() {
    let pool = test_pool().await;
    let article_id = insert_article(&pool).await;
    let app = build_router(test_state(pool));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/workflow/start")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "article_id": article_id }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(error["error"]["message"]
        .as_str()
        .unwrap()
        .contains("LLM API key"));
}

#[tokio::test]
async fn test_workflow_status_unknown_session() {
    let pool = test_pool().await;
    let app = build_router(test_state(pool));

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/workflow/status/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_scrape_status_unknown_session() {
    let pool = test_pool().await;
    let app = build_router(test_state(pool));

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/scrape/status/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_scrape_start_with_no_due_sources() {
    let pool = test_pool().await;
    let app = build_router(test_state(pool.clone()));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/scrape/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let started: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(started["source_count"], 0);

    // The background session over zero sources completes quickly.
    let session_id: Uuid = started["session_id"].as_str().unwrap().parse().unwrap();
    for _ in 0..50 {
        let session = cti_ingest::db::scrape_sessions::load_session(&pool, session_id)
            .await
            .unwrap()
            .expect("session persisted");
        if session.state == cti_ingest::models::ScrapeState::Completed {
            assert_eq!(session.sources_polled, 0);
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("scrape session did not complete");
}

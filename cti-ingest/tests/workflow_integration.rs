//! End-to-end workflow tests against a mock LLM provider
//!
//! A local TCP server plays the Messages API, answering each request in
//! order with a canned body. The orchestrator runs the full pipeline
//! against it with an in-memory database.

use chrono::Utc;
use cti_common::db::models::{Article, RuleStatus, SigmaRule, TriageStatus};
use cti_common::events::EventBus;
use cti_common::params::PipelineParams;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use cti_ingest::llm::client::LlmClient;
use cti_ingest::models::{WorkflowSession, WorkflowStage};
use cti_ingest::workflow::WorkflowOrchestrator;

const RULE_YAML: &str = "title: Certutil Remote Download\nid: 9b1c2d3e-1111-2222-3333-444455556666\nstatus: experimental\ndescription: Detects certutil downloading remote files\nlogsource:\n    category: process_creation\n    product: windows\ndetection:\n    selection:\n        Image|endswith: '\\certutil.exe'\n        CommandLine|contains: '-urlcache'\n    condition: selection\nlevel: medium\n";

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

async fn insert_article(pool: &SqlitePool) -> Uuid {
    let article = Article {
        article_id: Uuid::new_v4(),
        source_id: None,
        title: "Certutil abuse in the wild".to_string(),
        url: "https://example.com/certutil-abuse".to_string(),
        content: "The actor ran certutil -urlcache against 203.0.113.9 \
                  to stage a second payload."
            .to_string(),
        content_hash: format!("{:064x}", Uuid::new_v4().as_u128()),
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

fn messages_body(text: &str) -> String {
    serde_json::json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": text}],
        "model": "claude-sonnet-4-5",
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 100, "output_tokens": 20}
    })
    .to_string()
}

/// Serve the given bodies, one per connection, in order
async fn mock_llm_server(responses: Vec<String>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        for body in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut buf = vec![0u8; 65536];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.flush().await;
        }
    });

    addr
}

fn client_for(addr: std::net::SocketAddr) -> LlmClient {
    LlmClient::new(
        "test-key".to_string(),
        "claude-sonnet-4-5".to_string(),
        format!("http://{}", addr),
    )
    .unwrap()
}

#[tokio::test]
async fn full_pipeline_generates_rule_and_queues_review() {
    let pool = test_pool().await;
    let article_id = insert_article(&pool).await;

    let responses = vec![
        messages_body(r#"{"platforms": ["windows"]}"#),
        messages_body(r#"{"score": 0.9, "reason": "detailed intrusion analysis"}"#),
        messages_body(r#"{"score": 80, "reason": "concrete commands"}"#),
        messages_body(
            r#"{"ipv4": ["198.51.100.23"], "domains": [], "hashes": [], "cves": [], "commands": ["certutil -urlcache"]}"#,
        ),
        messages_body(
            r#"{"ttps": [{"technique_id": "T1105", "name": "Ingress Tool Transfer", "description": "certutil used to download a payload"}]}"#,
        ),
        messages_body(RULE_YAML),
    ];
    let addr = mock_llm_server(responses).await;

    let orchestrator = WorkflowOrchestrator::new(
        pool.clone(),
        EventBus::new(100),
        client_for(addr),
        PipelineParams::default(),
    );

    let session = WorkflowSession::new(article_id);
    let session_id = session.session_id;
    cti_ingest::db::workflow_sessions::save_session(&pool, &session)
        .await
        .unwrap();

    let result = orchestrator
        .execute(session, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.stage, WorkflowStage::Completed);
    assert_eq!(result.junk_score, Some(0.9));
    assert_eq!(result.ranking_score, Some(80));
    assert_eq!(result.os_targets, vec!["windows".to_string()]);
    assert_eq!(result.rules_generated, 1);
    assert_eq!(result.rules_duplicate, 0);
    assert!(result.input_tokens > 0);

    // Indicators: regex pre-pass IP merged with the agent's IP.
    let indicators = result.indicators.expect("indicators stored");
    assert!(indicators.ipv4.contains(&"203.0.113.9".to_string()));
    assert!(indicators.ipv4.contains(&"198.51.100.23".to_string()));
    assert_eq!(indicators.commands.len(), 1);

    // Persisted session matches the returned one.
    let stored = cti_ingest::db::workflow_sessions::load_session(&pool, session_id)
        .await
        .unwrap()
        .expect("session persisted");
    assert_eq!(stored.stage, WorkflowStage::Completed);
    assert_eq!(stored.ttps.len(), 1);
    assert_eq!(stored.ttps[0].technique_id, "T1105");

    // Rule stored as a draft.
    let rules = cti_ingest::db::rules::list_comparison_targets(&pool)
        .await
        .unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].title, "Certutil Remote Download");
    assert_eq!(rules[0].status, RuleStatus::Draft);

    // Review queue: one article entry plus one rule entry.
    let queue_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM review_queue")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(queue_count, 2);

    // Article finished processed with analysis attached.
    let article = cti_ingest::db::articles::get_article(&pool, article_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(article.triage_status, TriageStatus::Processed);
    assert!(article.indicators.unwrap().contains("203.0.113.9"));
}

#[tokio::test]
async fn junk_articles_are_discarded() {
    let pool = test_pool().await;
    let article_id = insert_article(&pool).await;

    let responses = vec![
        messages_body(r#"{"platforms": []}"#),
        messages_body(r#"{"score": 0.1, "reason": "product marketing"}"#),
    ];
    let addr = mock_llm_server(responses).await;

    let orchestrator = WorkflowOrchestrator::new(
        pool.clone(),
        EventBus::new(100),
        client_for(addr),
        PipelineParams::default(),
    );

    let session = WorkflowSession::new(article_id);
    cti_ingest::db::workflow_sessions::save_session(&pool, &session)
        .await
        .unwrap();

    let result = orchestrator
        .execute(session, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.stage, WorkflowStage::Discarded);
    assert_eq!(result.junk_score, Some(0.1));
    assert_eq!(result.rules_generated, 0);

    let article = cti_ingest::db::articles::get_article(&pool, article_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(article.triage_status, TriageStatus::Junk);

    let queue_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM review_queue")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(queue_count, 0);
}

#[tokio::test]
async fn low_ranking_skips_extraction() {
    let pool = test_pool().await;
    let article_id = insert_article(&pool).await;

    let responses = vec![
        messages_body(r#"{"platforms": ["windows"]}"#),
        messages_body(r#"{"score": 0.8}"#),
        messages_body(r#"{"score": 10, "reason": "vague trend piece"}"#),
    ];
    let addr = mock_llm_server(responses).await;

    let orchestrator = WorkflowOrchestrator::new(
        pool.clone(),
        EventBus::new(100),
        client_for(addr),
        PipelineParams::default(),
    );

    let session = WorkflowSession::new(article_id);
    cti_ingest::db::workflow_sessions::save_session(&pool, &session)
        .await
        .unwrap();

    let result = orchestrator
        .execute(session, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.stage, WorkflowStage::Completed);
    assert_eq!(result.ranking_score, Some(10));
    // Extraction never ran.
    assert!(result.indicators.is_none());
    assert!(result.ttps.is_empty());
    assert_eq!(result.rules_generated, 0);

    let article = cti_ingest::db::articles::get_article(&pool, article_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(article.triage_status, TriageStatus::Processed);
}

#[tokio::test]
async fn near_identical_rule_is_flagged_duplicate() {
    let pool = test_pool().await;
    let article_id = insert_article(&pool).await;

    // Pre-store the same rule the model is about to generate.
    let existing = SigmaRule {
        rule_id: Uuid::new_v4(),
        article_id: None,
        title: "Certutil Remote Download".to_string(),
        yaml: RULE_YAML.to_string(),
        status: RuleStatus::Approved,
        duplicate_of: None,
        similarity: None,
        created_at: Utc::now(),
        updated_at: None,
    };
    cti_ingest::db::rules::insert_rule(&pool, &existing)
        .await
        .unwrap();

    let responses = vec![
        messages_body(r#"{"platforms": ["windows"]}"#),
        messages_body(r#"{"score": 0.9}"#),
        messages_body(r#"{"score": 75}"#),
        messages_body(r#"{"ipv4": [], "domains": [], "hashes": [], "cves": [], "commands": []}"#),
        messages_body(
            r#"{"ttps": [{"technique_id": "T1105", "name": "Ingress Tool Transfer", "description": "certutil download"}]}"#,
        ),
        messages_body(RULE_YAML),
    ];
    let addr = mock_llm_server(responses).await;

    let orchestrator = WorkflowOrchestrator::new(
        pool.clone(),
        EventBus::new(100),
        client_for(addr),
        PipelineParams::default(),
    );

    let session = WorkflowSession::new(article_id);
    cti_ingest::db::workflow_sessions::save_session(&pool, &session)
        .await
        .unwrap();

    let result = orchestrator
        .execute(session, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.stage, WorkflowStage::Completed);
    assert_eq!(result.rules_generated, 0);
    assert_eq!(result.rules_duplicate, 1);

    // The duplicate row links to the pre-existing rule.
    let row = sqlx::query("SELECT * FROM sigma_rules WHERE status = 'duplicate'")
        .fetch_one(&pool)
        .await
        .unwrap();
    let duplicate = SigmaRule::from_row(&row).unwrap();
    assert_eq!(duplicate.duplicate_of, Some(existing.rule_id));
    assert!(duplicate.similarity.unwrap() > 0.9);

    // Only the article-level queue entry exists.
    let queue_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM review_queue")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(queue_count, 1);
}

#[tokio::test]
async fn cancellation_before_first_stage_preserves_article() {
    let pool = test_pool().await;
    let article_id = insert_article(&pool).await;

    // No responses needed; the token is cancelled before any call.
    let addr = mock_llm_server(Vec::new()).await;

    let orchestrator = WorkflowOrchestrator::new(
        pool.clone(),
        EventBus::new(100),
        client_for(addr),
        PipelineParams::default(),
    );

    let session = WorkflowSession::new(article_id);
    cti_ingest::db::workflow_sessions::save_session(&pool, &session)
        .await
        .unwrap();

    let token = CancellationToken::new();
    token.cancel();

    let result = orchestrator.execute(session, token).await.unwrap();

    assert_eq!(result.stage, WorkflowStage::Cancelled);

    let article = cti_ingest::db::articles::get_article(&pool, article_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(article.triage_status, TriageStatus::New);
}

//! Workflow trigger, status, and cancellation API
//!
//! POST /api/workflow/start, GET /api/workflow/status/:session_id,
//! POST /api/workflow/cancel/:session_id

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use cti_common::params::PipelineParams;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{WorkflowSession, WorkflowStage};
use crate::workflow::ioc::IndicatorSet;
use crate::workflow::ttp::TtpFinding;
use crate::workflow::WorkflowOrchestrator;
use crate::{db, AppState};

/// POST /api/workflow/start request
#[derive(Debug, Deserialize)]
pub struct StartWorkflowRequest {
    pub article_id: Uuid,
}

/// POST /api/workflow/start response
#[derive(Debug, Serialize)]
pub struct StartWorkflowResponse {
    pub session_id: Uuid,
    pub article_id: Uuid,
    pub stage: WorkflowStage,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// GET /api/workflow/status response
#[derive(Debug, Serialize)]
pub struct WorkflowStatusResponse {
    pub session_id: Uuid,
    pub article_id: Uuid,
    pub stage: WorkflowStage,
    pub os_targets: Vec<String>,
    pub junk_score: Option<f64>,
    pub ranking_score: Option<i64>,
    pub indicators: Option<IndicatorSet>,
    pub ttps: Vec<TtpFinding>,
    pub rules_generated: i64,
    pub rules_duplicate: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub error: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<WorkflowSession> for WorkflowStatusResponse {
    fn from(session: WorkflowSession) -> Self {
        Self {
            session_id: session.session_id,
            article_id: session.article_id,
            stage: session.stage,
            os_targets: session.os_targets,
            junk_score: session.junk_score,
            ranking_score: session.ranking_score,
            indicators: session.indicators,
            ttps: session.ttps,
            rules_generated: session.rules_generated,
            rules_duplicate: session.rules_duplicate,
            input_tokens: session.input_tokens,
            output_tokens: session.output_tokens,
            error: session.error,
            started_at: session.started_at,
            ended_at: session.ended_at,
        }
    }
}

/// POST /api/workflow/cancel response
#[derive(Debug, Serialize)]
pub struct CancelWorkflowResponse {
    pub session_id: Uuid,
    pub stage: WorkflowStage,
    pub cancelled_at: chrono::DateTime<chrono::Utc>,
}

/// POST /api/workflow/start
///
/// Begin the agentic workflow for one article. Returns the session id;
/// progress streams over /events.
pub async fn start_workflow(
    State(state): State<AppState>,
    Json(request): Json<StartWorkflowRequest>,
) -> ApiResult<Json<StartWorkflowResponse>> {
    let article = db::articles::get_article(&state.db, request.article_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("Article not found: {}", request.article_id))
        })?;

    let llm_client = {
        let llm = state.llm.read().await;
        llm.client().map_err(|_| {
            ApiError::BadRequest(
                "LLM API key not configured; set it via POST /api/settings/llm_api_key"
                    .to_string(),
            )
        })?
    };

    if db::workflow_sessions::has_running_session_for_article(&state.db, article.article_id)
        .await?
    {
        return Err(ApiError::Conflict(format!(
            "Workflow already running for article {}",
            article.article_id
        )));
    }

    let session = WorkflowSession::new(article.article_id);
    let response = StartWorkflowResponse {
        session_id: session.session_id,
        article_id: session.article_id,
        stage: session.stage,
        started_at: session.started_at,
    };

    db::workflow_sessions::save_session(&state.db, &session).await?;

    let cancel_token = CancellationToken::new();
    state
        .cancellation_tokens
        .write()
        .await
        .insert(session.session_id, cancel_token.clone());

    tracing::info!(
        session_id = %session.session_id,
        article_id = %session.article_id,
        "Workflow session started and persisted"
    );

    let state_clone = state.clone();
    let session_id = session.session_id;
    tokio::spawn(async move {
        let params = PipelineParams::load(&state_clone.db)
            .await
            .unwrap_or_default();
        let orchestrator = WorkflowOrchestrator::new(
            state_clone.db.clone(),
            state_clone.event_bus.clone(),
            llm_client,
            params,
        );

        if let Err(e) = orchestrator.execute(session, cancel_token).await {
            tracing::error!(session_id = %session_id, error = %e, "Workflow failed");
            *state_clone.last_error.write().await = Some(e.to_string());

            // Ensure the session reaches a terminal state even when the
            // failure path itself hits errors.
            match db::workflow_sessions::load_session(&state_clone.db, session_id).await {
                Ok(Some(failed_session)) => {
                    if let Err(failure_error) =
                        orchestrator.handle_failure(failed_session, &e).await
                    {
                        tracing::error!(
                            session_id = %session_id,
                            error = %failure_error,
                            "Failed to mark session as failed - attempting direct update"
                        );
                        mark_failed_directly(&state_clone, session_id, &e).await;
                    }
                }
                Ok(None) => {
                    tracing::error!(
                        session_id = %session_id,
                        "Session not found in database - cannot mark as failed"
                    );
                }
                Err(db_error) => {
                    tracing::error!(
                        session_id = %session_id,
                        error = %db_error,
                        "Failed to load session - attempting direct update"
                    );
                    mark_failed_directly(&state_clone, session_id, &e).await;
                }
            }
        }

        state_clone
            .cancellation_tokens
            .write()
            .await
            .remove(&session_id);
    });

    Ok(Json(response))
}

async fn mark_failed_directly(state: &AppState, session_id: Uuid, error: &cti_common::Error) {
    let _ = sqlx::query(
        "UPDATE workflow_sessions SET stage = 'failed', error = ?, ended_at = ? WHERE session_id = ?",
    )
    .bind(error.to_string())
    .bind(Utc::now().to_rfc3339())
    .bind(session_id.to_string())
    .execute(&state.db)
    .await;
}

/// GET /api/workflow/status/:session_id
pub async fn get_workflow_status(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<WorkflowStatusResponse>> {
    let session = db::workflow_sessions::load_session(&state.db, session_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("Workflow session not found: {}", session_id))
        })?;

    Ok(Json(session.into()))
}

/// POST /api/workflow/cancel/:session_id
///
/// Signals the running session to stop at the next stage boundary.
/// Sessions with no live task (e.g. after a restart) are cancelled
/// directly in the database.
pub async fn cancel_workflow(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<CancelWorkflowResponse>> {
    let mut session = db::workflow_sessions::load_session(&state.db, session_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("Workflow session not found: {}", session_id))
        })?;

    if session.is_terminal() {
        return Err(ApiError::BadRequest(format!(
            "Workflow session already in terminal state: {}",
            session.stage.as_str()
        )));
    }

    let token = state.cancellation_tokens.read().await.get(&session_id).cloned();
    match token {
        Some(token) => {
            token.cancel();
            tracing::info!(session_id = %session_id, "Workflow cancellation requested");
        }
        None => {
            // No live task; finalize the record here.
            session.transition_to(WorkflowStage::Cancelled);
            db::workflow_sessions::save_session(&state.db, &session).await?;
            tracing::info!(session_id = %session_id, "Stale workflow session cancelled");
        }
    }

    Ok(Json(CancelWorkflowResponse {
        session_id,
        stage: session.stage,
        cancelled_at: Utc::now(),
    }))
}

/// Build workflow routes
pub fn workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflow/start", post(start_workflow))
        .route("/api/workflow/status/:session_id", get(get_workflow_status))
        .route("/api/workflow/cancel/:session_id", post(cancel_workflow))
}

//! Scrape trigger and status API
//!
//! POST /api/scrape/start, POST /api/scrape/source/:source_id,
//! GET /api/scrape/status/:session_id

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{ScrapeError, ScrapeSession, ScrapeState};
use crate::scraper::ScrapeOrchestrator;
use crate::{db, scheduler, AppState};

/// POST /api/scrape/* response
#[derive(Debug, Serialize)]
pub struct StartScrapeResponse {
    pub session_id: Uuid,
    pub state: ScrapeState,
    pub source_count: usize,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// GET /api/scrape/status response
#[derive(Debug, Serialize)]
pub struct ScrapeStatusResponse {
    pub session_id: Uuid,
    pub state: ScrapeState,
    pub sources_polled: usize,
    pub entries_seen: usize,
    pub articles_stored: usize,
    pub articles_skipped: usize,
    pub errors: Vec<ScrapeError>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// POST /api/scrape/start
///
/// Poll every due source now. Returns 202-style session info; progress
/// streams over /events.
pub async fn start_scrape(State(state): State<AppState>) -> ApiResult<Json<StartScrapeResponse>> {
    if db::scrape_sessions::has_running_session(&state.db).await? {
        return Err(ApiError::Conflict(
            "Scrape session already running".to_string(),
        ));
    }

    let sources = db::sources::list_due(&state.db, Utc::now()).await?;
    spawn_scrape(state, sources).await
}

/// POST /api/scrape/source/:source_id
///
/// Poll one source immediately, regardless of its schedule.
pub async fn start_scrape_source(
    State(state): State<AppState>,
    Path(source_id): Path<Uuid>,
) -> ApiResult<Json<StartScrapeResponse>> {
    if db::scrape_sessions::has_running_session(&state.db).await? {
        return Err(ApiError::Conflict(
            "Scrape session already running".to_string(),
        ));
    }

    let source = db::sources::get_source(&state.db, source_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Source not found: {}", source_id)))?;

    spawn_scrape(state, vec![source]).await
}

async fn spawn_scrape(
    state: AppState,
    sources: Vec<cti_common::db::models::Source>,
) -> ApiResult<Json<StartScrapeResponse>> {
    let session = ScrapeSession::new();
    let response = StartScrapeResponse {
        session_id: session.session_id,
        state: session.state,
        source_count: sources.len(),
        started_at: session.started_at,
    };

    db::scrape_sessions::save_session(&state.db, &session).await?;

    tracing::info!(
        session_id = %session.session_id,
        sources = sources.len(),
        "Scrape session started via API"
    );

    let session_id = session.session_id;
    tokio::spawn(async move {
        let orchestrator = match ScrapeOrchestrator::new(state.db.clone(), state.event_bus.clone())
        {
            Ok(orchestrator) => orchestrator,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Scrape setup failed");
                scheduler::mark_session_failed(&state, session_id, &e).await;
                return;
            }
        };

        if let Err(e) = orchestrator.run_session(session, sources).await {
            tracing::error!(session_id = %session_id, error = %e, "Scrape session failed");
            scheduler::mark_session_failed(&state, session_id, &e).await;
        }
    });

    Ok(Json(response))
}

/// GET /api/scrape/status/:session_id
pub async fn get_scrape_status(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<ScrapeStatusResponse>> {
    let session = db::scrape_sessions::load_session(&state.db, session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Scrape session not found: {}", session_id)))?;

    Ok(Json(ScrapeStatusResponse {
        session_id: session.session_id,
        state: session.state,
        sources_polled: session.sources_polled,
        entries_seen: session.entries_seen,
        articles_stored: session.articles_stored,
        articles_skipped: session.articles_skipped,
        errors: session.errors,
        started_at: session.started_at,
        ended_at: session.ended_at,
    }))
}

/// Build scrape routes
pub fn scrape_routes() -> Router<AppState> {
    Router::new()
        .route("/api/scrape/start", post(start_scrape))
        .route("/api/scrape/source/:source_id", post(start_scrape_source))
        .route("/api/scrape/status/:session_id", get(get_scrape_status))
}

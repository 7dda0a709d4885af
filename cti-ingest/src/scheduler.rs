//! Background polling and maintenance
//!
//! A tokio loop wakes every `scheduler_tick_seconds`, polls due sources,
//! and once a day prunes old workflow sessions and orphaned queue
//! entries. A failed cycle is logged and never stops the loop.

use chrono::{Duration as ChronoDuration, Utc};
use cti_common::events::CtiEvent;
use cti_common::params::PipelineParams;
use cti_common::Result;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::db;
use crate::models::ScrapeSession;
use crate::scraper::ScrapeOrchestrator;
use crate::AppState;

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Run the scheduler until shutdown
pub async fn run_scheduler(state: AppState, shutdown: CancellationToken) {
    tracing::info!("Scheduler started");
    let mut last_maintenance: Option<Instant> = None;

    loop {
        let params = PipelineParams::load(&state.db).await.unwrap_or_default();
        let tick = Duration::from_secs(params.scheduler_tick_seconds.max(10) as u64);

        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Scheduler stopped");
                break;
            }
            _ = tokio::time::sleep(tick) => {}
        }

        if let Err(e) = poll_cycle(&state).await {
            tracing::warn!(error = %e, "Scheduler poll cycle failed");
        }

        let maintenance_due = last_maintenance
            .map_or(true, |t| t.elapsed() >= MAINTENANCE_INTERVAL);
        if maintenance_due {
            if let Err(e) = maintenance(&state, &params).await {
                tracing::warn!(error = %e, "Scheduler maintenance failed");
            }
            last_maintenance = Some(Instant::now());
        }
    }
}

/// Poll every due source in one scrape session
async fn poll_cycle(state: &AppState) -> Result<()> {
    if db::scrape_sessions::has_running_session(&state.db).await? {
        tracing::debug!("Scrape session already running, skipping cycle");
        return Ok(());
    }

    let due = db::sources::list_due(&state.db, Utc::now()).await?;
    if due.is_empty() {
        tracing::debug!("No sources due");
        return Ok(());
    }

    tracing::info!(count = due.len(), "Polling due sources");

    let orchestrator = ScrapeOrchestrator::new(state.db.clone(), state.event_bus.clone())?;
    let session = ScrapeSession::new();
    let session_id = session.session_id;
    db::scrape_sessions::save_session(&state.db, &session).await?;

    if let Err(e) = orchestrator.run_session(session, due).await {
        tracing::error!(session_id = %session_id, error = %e, "Scheduled scrape failed");
        mark_session_failed(state, session_id, &e).await;
    }

    Ok(())
}

/// Prune retained workflow sessions and orphaned queue entries
async fn maintenance(state: &AppState, params: &PipelineParams) -> Result<()> {
    let cutoff = Utc::now() - ChronoDuration::days(params.session_retention_days);
    let pruned_sessions = db::workflow_sessions::prune_finished_before(&state.db, cutoff).await?;
    let pruned_entries = db::queue::prune_orphaned(&state.db).await?;

    tracing::info!(
        pruned_sessions,
        pruned_entries,
        retention_days = params.session_retention_days,
        "Maintenance pass completed"
    );

    Ok(())
}

/// Last-resort direct update when session bookkeeping itself failed
pub(crate) async fn mark_session_failed(
    state: &AppState,
    session_id: uuid::Uuid,
    error: &cti_common::Error,
) {
    let result = sqlx::query(
        "UPDATE scrape_sessions SET state = 'failed', ended_at = ? WHERE session_id = ?",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(session_id.to_string())
    .execute(&state.db)
    .await;

    if let Err(db_err) = result {
        tracing::error!(
            session_id = %session_id,
            error = %db_err,
            "Failed to mark scrape session as failed"
        );
    }

    state.event_bus.emit_lossy(CtiEvent::ScrapeSessionFailed {
        session_id,
        error_message: error.to_string(),
        timestamp: Utc::now(),
    });
}

//! Scrape session persistence

use cti_common::db::retry_on_lock;
use cti_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{ScrapeError, ScrapeSession, ScrapeState};

use super::LOCK_WAIT_MS;

/// Save (insert or update) a scrape session
pub async fn save_session(pool: &SqlitePool, session: &ScrapeSession) -> Result<()> {
    let session_id = session.session_id.to_string();
    let state = session.state.as_str();
    let errors = serde_json::to_string(&session.errors)
        .map_err(|e| Error::Internal(format!("Failed to serialize errors: {}", e)))?;
    let started_at = session.started_at.to_rfc3339();
    let ended_at = session.ended_at.map(|dt| dt.to_rfc3339());
    let sources_polled = session.sources_polled as i64;
    let entries_seen = session.entries_seen as i64;
    let articles_stored = session.articles_stored as i64;
    let articles_skipped = session.articles_skipped as i64;

    retry_on_lock("save_scrape_session", LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO scrape_sessions (
                session_id, state, sources_polled, entries_seen,
                articles_stored, articles_skipped, errors, started_at, ended_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                state = excluded.state,
                sources_polled = excluded.sources_polled,
                entries_seen = excluded.entries_seen,
                articles_stored = excluded.articles_stored,
                articles_skipped = excluded.articles_skipped,
                errors = excluded.errors,
                ended_at = excluded.ended_at
            "#,
        )
        .bind(&session_id)
        .bind(state)
        .bind(sources_polled)
        .bind(entries_seen)
        .bind(articles_stored)
        .bind(articles_skipped)
        .bind(&errors)
        .bind(&started_at)
        .bind(&ended_at)
        .execute(pool)
        .await?;
        Ok(())
    })
    .await
}

/// Load a scrape session
pub async fn load_session(pool: &SqlitePool, session_id: Uuid) -> Result<Option<ScrapeSession>> {
    let row = sqlx::query("SELECT * FROM scrape_sessions WHERE session_id = ?")
        .bind(session_id.to_string())
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let state: String = row.get("state");
    let errors: String = row.get("errors");
    let errors: Vec<ScrapeError> = serde_json::from_str(&errors)
        .map_err(|e| Error::Internal(format!("Failed to deserialize errors: {}", e)))?;

    Ok(Some(ScrapeSession {
        session_id,
        state: ScrapeState::parse(&state)?,
        sources_polled: row.get::<i64, _>("sources_polled") as usize,
        entries_seen: row.get::<i64, _>("entries_seen") as usize,
        articles_stored: row.get::<i64, _>("articles_stored") as usize,
        articles_skipped: row.get::<i64, _>("articles_skipped") as usize,
        errors,
        started_at: cti_common::db::models::parse_timestamp(row.get("started_at"))?,
        ended_at: cti_common::db::models::parse_opt_timestamp(row.get("ended_at"))?,
    }))
}

/// Is any scrape session still running?
pub async fn has_running_session(pool: &SqlitePool) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM scrape_sessions WHERE state = 'running'")
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

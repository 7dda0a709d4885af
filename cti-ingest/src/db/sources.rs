//! Source registry queries used by the scraper

use chrono::{DateTime, Utc};
use cti_common::db::models::Source;
use cti_common::db::retry_on_lock;
use cti_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::LOCK_WAIT_MS;

/// Load a single source
pub async fn get_source(pool: &SqlitePool, source_id: Uuid) -> Result<Option<Source>> {
    let row = sqlx::query("SELECT * FROM sources WHERE source_id = ?")
        .bind(source_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| Source::from_row(&r)).transpose()
}

/// All active sources
pub async fn list_active(pool: &SqlitePool) -> Result<Vec<Source>> {
    let rows = sqlx::query("SELECT * FROM sources WHERE active = 1 ORDER BY name")
        .fetch_all(pool)
        .await?;

    rows.iter().map(Source::from_row).collect()
}

/// Active sources whose poll interval has elapsed
pub async fn list_due(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Vec<Source>> {
    let sources = list_active(pool).await?;
    Ok(sources.into_iter().filter(|s| s.is_due(now)).collect())
}

/// Record the outcome of polling a source
///
/// Success resets the failure counter; failure increments it.
pub async fn record_poll_outcome(
    pool: &SqlitePool,
    source_id: Uuid,
    success: bool,
    polled_at: DateTime<Utc>,
) -> Result<()> {
    let source_id = source_id.to_string();
    let polled_at = polled_at.to_rfc3339();

    retry_on_lock("record_poll_outcome", LOCK_WAIT_MS, || async {
        if success {
            sqlx::query(
                "UPDATE sources SET last_polled_at = ?, consecutive_failures = 0 WHERE source_id = ?",
            )
            .bind(&polled_at)
            .bind(&source_id)
            .execute(pool)
            .await?;
        } else {
            sqlx::query(
                "UPDATE sources SET last_polled_at = ?, consecutive_failures = consecutive_failures + 1 WHERE source_id = ?",
            )
            .bind(&polled_at)
            .bind(&source_id)
            .execute(pool)
            .await?;
        }
        Ok(())
    })
    .await
}

//! Review queue writes from the workflow

use cti_common::db::models::QueueEntry;
use cti_common::db::retry_on_lock;
use cti_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::LOCK_WAIT_MS;

/// Insert a review-queue entry unless an identical pending one exists.
///
/// Returns true when a row was inserted.
pub async fn enqueue(pool: &SqlitePool, entry: &QueueEntry) -> Result<bool> {
    let article_id = entry.article_id.to_string();
    let rule_id = entry.rule_id.map(|id| id.to_string());

    // Duplicate pending entries for the same (article, rule) pair are not created.
    let existing: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM review_queue
        WHERE article_id = ?
          AND (rule_id = ? OR (rule_id IS NULL AND ? IS NULL))
          AND state = 'pending'
        "#,
    )
    .bind(&article_id)
    .bind(&rule_id)
    .bind(&rule_id)
    .fetch_one(pool)
    .await?;

    if existing > 0 {
        return Ok(false);
    }

    let entry_id = entry.entry_id.to_string();
    let state = entry.state.as_str();
    let enqueued_at = entry.enqueued_at.to_rfc3339();

    retry_on_lock("enqueue_review_entry", LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO review_queue (
                entry_id, article_id, rule_id, priority, state, enqueued_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry_id)
        .bind(&article_id)
        .bind(&rule_id)
        .bind(entry.priority)
        .bind(state)
        .bind(&enqueued_at)
        .execute(pool)
        .await?;
        Ok(())
    })
    .await?;

    Ok(true)
}

/// Remove queue entries whose article no longer exists; returns rows removed
pub async fn prune_orphaned(pool: &SqlitePool) -> Result<u64> {
    let result = retry_on_lock("prune_orphaned_queue", LOCK_WAIT_MS, || async {
        let res = sqlx::query(
            r#"
            DELETE FROM review_queue
            WHERE article_id NOT IN (SELECT article_id FROM articles)
            "#,
        )
        .execute(pool)
        .await?;
        Ok(res.rows_affected())
    })
    .await?;

    Ok(result)
}

/// Look up an entry (used by tests and status endpoints)
pub async fn get_entry(pool: &SqlitePool, entry_id: Uuid) -> Result<Option<QueueEntry>> {
    let row = sqlx::query("SELECT * FROM review_queue WHERE entry_id = ?")
        .bind(entry_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| QueueEntry::from_row(&r)).transpose()
}

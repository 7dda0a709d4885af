//! Workflow session persistence
//!
//! Session state is written after every stage so a crash mid-pipeline
//! leaves an inspectable record.

use chrono::{DateTime, Utc};
use cti_common::db::retry_on_lock;
use cti_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{WorkflowSession, WorkflowStage};
use crate::workflow::ioc::IndicatorSet;
use crate::workflow::ttp::TtpFinding;

use super::LOCK_WAIT_MS;

/// Save (insert or update) a workflow session
pub async fn save_session(pool: &SqlitePool, session: &WorkflowSession) -> Result<()> {
    let session_id = session.session_id.to_string();
    let article_id = session.article_id.to_string();
    let stage = session.stage.as_str();
    let os_targets = serde_json::to_string(&session.os_targets)
        .map_err(|e| Error::Internal(format!("Failed to serialize os_targets: {}", e)))?;
    let indicators = session
        .indicators
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to serialize indicators: {}", e)))?;
    let ttps = serde_json::to_string(&session.ttps)
        .map_err(|e| Error::Internal(format!("Failed to serialize ttps: {}", e)))?;
    let started_at = session.started_at.to_rfc3339();
    let ended_at = session.ended_at.map(|dt| dt.to_rfc3339());

    retry_on_lock("save_workflow_session", LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO workflow_sessions (
                session_id, article_id, stage, os_targets, junk_score,
                ranking_score, indicators, ttps, rules_generated, rules_duplicate,
                input_tokens, output_tokens, error, started_at, ended_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                stage = excluded.stage,
                os_targets = excluded.os_targets,
                junk_score = excluded.junk_score,
                ranking_score = excluded.ranking_score,
                indicators = excluded.indicators,
                ttps = excluded.ttps,
                rules_generated = excluded.rules_generated,
                rules_duplicate = excluded.rules_duplicate,
                input_tokens = excluded.input_tokens,
                output_tokens = excluded.output_tokens,
                error = excluded.error,
                ended_at = excluded.ended_at
            "#,
        )
        .bind(&session_id)
        .bind(&article_id)
        .bind(stage)
        .bind(&os_targets)
        .bind(session.junk_score)
        .bind(session.ranking_score)
        .bind(&indicators)
        .bind(&ttps)
        .bind(session.rules_generated)
        .bind(session.rules_duplicate)
        .bind(session.input_tokens)
        .bind(session.output_tokens)
        .bind(&session.error)
        .bind(&started_at)
        .bind(&ended_at)
        .execute(pool)
        .await?;
        Ok(())
    })
    .await
}

/// Load a workflow session
pub async fn load_session(pool: &SqlitePool, session_id: Uuid) -> Result<Option<WorkflowSession>> {
    let row = sqlx::query("SELECT * FROM workflow_sessions WHERE session_id = ?")
        .bind(session_id.to_string())
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let stage: String = row.get("stage");
    let os_targets: String = row.get("os_targets");
    let os_targets: Vec<String> = serde_json::from_str(&os_targets)
        .map_err(|e| Error::Internal(format!("Failed to deserialize os_targets: {}", e)))?;
    let indicators: Option<String> = row.get("indicators");
    let indicators: Option<IndicatorSet> = indicators
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize indicators: {}", e)))?;
    let ttps: String = row.get("ttps");
    let ttps: Vec<TtpFinding> = serde_json::from_str(&ttps)
        .map_err(|e| Error::Internal(format!("Failed to deserialize ttps: {}", e)))?;

    Ok(Some(WorkflowSession {
        session_id,
        article_id: cti_common::db::models::parse_uuid(row.get("article_id"))?,
        stage: WorkflowStage::parse(&stage)?,
        os_targets,
        junk_score: row.get("junk_score"),
        ranking_score: row.get("ranking_score"),
        indicators,
        ttps,
        rules_generated: row.get("rules_generated"),
        rules_duplicate: row.get("rules_duplicate"),
        input_tokens: row.get("input_tokens"),
        output_tokens: row.get("output_tokens"),
        error: row.get("error"),
        started_at: cti_common::db::models::parse_timestamp(row.get("started_at"))?,
        ended_at: cti_common::db::models::parse_opt_timestamp(row.get("ended_at"))?,
    }))
}

/// Is a non-terminal workflow session running for this article?
pub async fn has_running_session_for_article(
    pool: &SqlitePool,
    article_id: Uuid,
) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM workflow_sessions
        WHERE article_id = ?
          AND stage NOT IN ('completed', 'discarded', 'failed', 'cancelled')
        "#,
    )
    .bind(article_id.to_string())
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Delete finished sessions older than the cutoff; returns rows removed
pub async fn prune_finished_before(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64> {
    let cutoff = cutoff.to_rfc3339();

    let result = retry_on_lock("prune_workflow_sessions", LOCK_WAIT_MS, || async {
        let res = sqlx::query(
            r#"
            DELETE FROM workflow_sessions
            WHERE stage IN ('completed', 'discarded', 'failed', 'cancelled')
              AND ended_at IS NOT NULL
              AND ended_at < ?
            "#,
        )
        .bind(&cutoff)
        .execute(pool)
        .await?;
        Ok(res.rows_affected())
    })
    .await?;

    Ok(result)
}

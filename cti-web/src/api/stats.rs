//! Dashboard counters
//!
//! GET /api/stats

use axum::{extract::State, Json};
use serde::Serialize;
use sqlx::Row;
use std::collections::HashMap;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Dashboard statistics response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Articles grouped by triage status
    pub articles: HashMap<String, i64>,
    /// Review queue entries grouped by state
    pub queue: HashMap<String, i64>,
    /// SIGMA rules grouped by status
    pub rules: HashMap<String, i64>,
    /// Source registry health
    pub sources: SourceStats,
}

#[derive(Debug, Serialize)]
pub struct SourceStats {
    pub total: i64,
    pub active: i64,
    pub failing: i64,
}

/// GET /api/stats
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let articles = group_count(&state, "SELECT triage_status, COUNT(*) FROM articles GROUP BY triage_status").await?;
    let queue = group_count(&state, "SELECT state, COUNT(*) FROM review_queue GROUP BY state").await?;
    let rules = group_count(&state, "SELECT status, COUNT(*) FROM sigma_rules GROUP BY status").await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sources")
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let active: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sources WHERE active = 1")
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let failing: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sources WHERE consecutive_failures > 0")
            .fetch_one(&state.db)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(StatsResponse {
        articles,
        queue,
        rules,
        sources: SourceStats {
            total,
            active,
            failing,
        },
    }))
}

async fn group_count(state: &AppState, sql: &str) -> ApiResult<HashMap<String, i64>> {
    let rows = sqlx::query(sql)
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(rows
        .iter()
        .map(|row| (row.get::<String, _>(0), row.get::<i64, _>(1)))
        .collect())
}

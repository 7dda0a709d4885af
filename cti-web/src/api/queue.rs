//! Analyst review queue
//!
//! GET /api/queue, POST /api/queue/:id/claim, POST /api/queue/:id/resolve
//!
//! State machine: pending -> claimed -> resolved. Claiming an entry that
//! is not pending is a conflict; two analysts claiming one entry is the
//! exact situation the queue exists to prevent.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use cti_common::db::models::{QueueEntry, QueueState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, PAGE_SIZE};
use crate::AppState;

/// Query parameters for queue listing
#[derive(Debug, Default, Deserialize)]
pub struct QueueQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    pub state: Option<String>,
}

fn default_page() -> i64 {
    1
}

/// Paginated queue listing response
#[derive(Debug, Serialize)]
pub struct QueueListResponse {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub entries: Vec<QueueEntry>,
}

/// GET /api/queue
///
/// Ordered by priority (desc), then age (oldest first).
pub async fn list_queue(
    State(state): State<AppState>,
    Query(query): Query<QueueQuery>,
) -> ApiResult<Json<QueueListResponse>> {
    let entry_state = query
        .state
        .as_deref()
        .map(QueueState::parse)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let state_bind = entry_state.map(|s| s.as_str().to_string());
    let where_sql = if state_bind.is_some() {
        " WHERE state = ?"
    } else {
        ""
    };

    let count_sql = format!("SELECT COUNT(*) FROM review_queue{}", where_sql);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(v) = &state_bind {
        count_query = count_query.bind(v);
    }
    let total = count_query
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let pagination = calculate_pagination(total, query.page);

    let list_sql = format!(
        "SELECT * FROM review_queue{} ORDER BY priority DESC, enqueued_at ASC LIMIT {} OFFSET {}",
        where_sql, PAGE_SIZE, pagination.offset
    );
    let mut list_query = sqlx::query(&list_sql);
    if let Some(v) = &state_bind {
        list_query = list_query.bind(v);
    }

    let rows = list_query
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let entries = rows
        .iter()
        .map(QueueEntry::from_row)
        .collect::<cti_common::Result<Vec<_>>>()?;

    Ok(Json(QueueListResponse {
        total,
        page: pagination.page,
        page_size: PAGE_SIZE,
        total_pages: pagination.total_pages,
        entries,
    }))
}

/// POST /api/queue/:id/claim request
#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub analyst: String,
}

/// POST /api/queue/:id/claim
pub async fn claim_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
    Json(request): Json<ClaimRequest>,
) -> ApiResult<Json<QueueEntry>> {
    if request.analyst.trim().is_empty() {
        return Err(ApiError::BadRequest("analyst must not be empty".to_string()));
    }

    let entry = load_entry(&state, entry_id).await?;
    if entry.state != QueueState::Pending {
        return Err(ApiError::Conflict(format!(
            "Queue entry is {}, not pending",
            entry.state.as_str()
        )));
    }

    // Guard the transition in SQL so concurrent claims race safely.
    let result = sqlx::query(
        "UPDATE review_queue SET state = 'claimed', claimed_by = ? WHERE entry_id = ? AND state = 'pending'",
    )
    .bind(request.analyst.trim())
    .bind(entry_id.to_string())
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::Conflict(
            "Queue entry was claimed concurrently".to_string(),
        ));
    }

    tracing::info!(entry_id = %entry_id, analyst = %request.analyst, "Queue entry claimed");
    load_entry(&state, entry_id).await.map(Json)
}

/// POST /api/queue/:id/resolve
pub async fn resolve_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
) -> ApiResult<Json<QueueEntry>> {
    let entry = load_entry(&state, entry_id).await?;
    if entry.state != QueueState::Claimed {
        return Err(ApiError::Conflict(format!(
            "Queue entry is {}, not claimed",
            entry.state.as_str()
        )));
    }

    let result = sqlx::query(
        "UPDATE review_queue SET state = 'resolved', resolved_at = ? WHERE entry_id = ? AND state = 'claimed'",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(entry_id.to_string())
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::Conflict(
            "Queue entry changed state concurrently".to_string(),
        ));
    }

    tracing::info!(entry_id = %entry_id, "Queue entry resolved");
    load_entry(&state, entry_id).await.map(Json)
}

async fn load_entry(state: &AppState, entry_id: Uuid) -> ApiResult<QueueEntry> {
    let row = sqlx::query("SELECT * FROM review_queue WHERE entry_id = ?")
        .bind(entry_id.to_string())
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("Queue entry not found: {}", entry_id)))?;

    Ok(QueueEntry::from_row(&row)?)
}

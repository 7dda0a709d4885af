//! SIGMA rule review
//!
//! GET /api/rules (paginated, status filter), GET /api/rules/:id,
//! PUT /api/rules/:id/status, DELETE /api/rules/:id,
//! GET /api/rules/:id/similar

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use cti_common::db::models::{RuleStatus, SigmaRule};
use cti_common::similarity;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, PAGE_SIZE};
use crate::AppState;

const SIMILAR_LIMIT: usize = 5;

/// Query parameters for rule listing
#[derive(Debug, Default, Deserialize)]
pub struct RuleQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    pub status: Option<String>,
}

fn default_page() -> i64 {
    1
}

/// Paginated rule listing response
#[derive(Debug, Serialize)]
pub struct RuleListResponse {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub rules: Vec<SigmaRule>,
}

/// GET /api/rules
pub async fn list_rules(
    State(state): State<AppState>,
    Query(query): Query<RuleQuery>,
) -> ApiResult<Json<RuleListResponse>> {
    let status = query
        .status
        .as_deref()
        .map(RuleStatus::parse)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let status_bind = status.map(|s| s.as_str().to_string());
    let where_sql = if status_bind.is_some() {
        " WHERE status = ?"
    } else {
        ""
    };

    let count_sql = format!("SELECT COUNT(*) FROM sigma_rules{}", where_sql);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(v) = &status_bind {
        count_query = count_query.bind(v);
    }
    let total = count_query
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let pagination = calculate_pagination(total, query.page);

    let list_sql = format!(
        "SELECT * FROM sigma_rules{} ORDER BY created_at DESC LIMIT {} OFFSET {}",
        where_sql, PAGE_SIZE, pagination.offset
    );
    let mut list_query = sqlx::query(&list_sql);
    if let Some(v) = &status_bind {
        list_query = list_query.bind(v);
    }

    let rows = list_query
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let rules = rows
        .iter()
        .map(SigmaRule::from_row)
        .collect::<cti_common::Result<Vec<_>>>()?;

    Ok(Json(RuleListResponse {
        total,
        page: pagination.page,
        page_size: PAGE_SIZE,
        total_pages: pagination.total_pages,
        rules,
    }))
}

/// GET /api/rules/:id
pub async fn get_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
) -> ApiResult<Json<SigmaRule>> {
    Ok(Json(load_rule(&state, rule_id).await?))
}

/// PUT /api/rules/:id/status request
#[derive(Debug, Deserialize)]
pub struct RuleStatusRequest {
    pub status: RuleStatus,
}

/// PUT /api/rules/:id/status
pub async fn set_rule_status(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
    Json(request): Json<RuleStatusRequest>,
) -> ApiResult<Json<SigmaRule>> {
    let result = sqlx::query("UPDATE sigma_rules SET status = ?, updated_at = ? WHERE rule_id = ?")
        .bind(request.status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(rule_id.to_string())
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("Rule not found: {}", rule_id)));
    }

    tracing::info!(
        rule_id = %rule_id,
        status = request.status.as_str(),
        "Rule status updated"
    );
    load_rule(&state, rule_id).await.map(Json)
}

/// DELETE /api/rules/:id
pub async fn delete_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM sigma_rules WHERE rule_id = ?")
        .bind(rule_id.to_string())
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("Rule not found: {}", rule_id)));
    }

    tracing::info!(rule_id = %rule_id, "Rule deleted");
    Ok(Json(serde_json::json!({ "deleted": rule_id })))
}

/// Similar-rule row
#[derive(Debug, Serialize)]
pub struct SimilarRule {
    pub rule_id: Uuid,
    pub title: String,
    pub score: f64,
}

/// GET /api/rules/:id/similar
///
/// Top-5 most similar stored rules with scores.
pub async fn similar_rules(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
) -> ApiResult<Json<Vec<SimilarRule>>> {
    let rule = load_rule(&state, rule_id).await?;

    let rows = sqlx::query("SELECT * FROM sigma_rules WHERE rule_id != ?")
        .bind(rule_id.to_string())
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let others = rows
        .iter()
        .map(SigmaRule::from_row)
        .collect::<cti_common::Result<Vec<_>>>()?;

    let similar = similarity::rank_matches(&rule.title, &rule.yaml, &others)
        .into_iter()
        .take(SIMILAR_LIMIT)
        .map(|m| SimilarRule {
            rule_id: m.rule_id,
            title: m.title,
            score: m.score,
        })
        .collect();

    Ok(Json(similar))
}

async fn load_rule(state: &AppState, rule_id: Uuid) -> ApiResult<SigmaRule> {
    let row = sqlx::query("SELECT * FROM sigma_rules WHERE rule_id = ?")
        .bind(rule_id.to_string())
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("Rule not found: {}", rule_id)))?;

    Ok(SigmaRule::from_row(&row)?)
}

//! Article search shortcut
//!
//! GET /api/search?q= — top matches over title and content, newest
//! first. The full article listing offers the same filter with
//! pagination; this endpoint backs the dashboard search box.

use axum::{
    extract::{Query, State},
    Json,
};
use cti_common::db::models::Article;
use serde::{Deserialize, Serialize};

use crate::api::articles::ArticleSummary;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const SEARCH_LIMIT: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub matches: Vec<ArticleSummary>,
}

/// GET /api/search
pub async fn search_articles(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let term = query.q.trim();
    if term.is_empty() {
        return Err(ApiError::BadRequest("q must not be empty".to_string()));
    }

    let like = format!("%{}%", term);
    let rows = sqlx::query(
        "SELECT * FROM articles WHERE title LIKE ? OR content LIKE ? ORDER BY scraped_at DESC LIMIT ?",
    )
    .bind(&like)
    .bind(&like)
    .bind(SEARCH_LIMIT)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    let matches = rows
        .iter()
        .map(|row| Article::from_row(row).map(ArticleSummary::from))
        .collect::<cti_common::Result<Vec<_>>>()?;

    Ok(Json(SearchResponse {
        query: term.to_string(),
        matches,
    }))
}

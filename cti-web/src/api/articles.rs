//! Article browsing, triage, and deletion
//!
//! GET /api/articles (paginated, filtered), GET/DELETE /api/articles/:id,
//! PUT /api/articles/:id/triage

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use cti_common::db::models::{Article, TriageStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, PAGE_SIZE};
use crate::AppState;

/// Query parameters for article listing
#[derive(Debug, Default, Deserialize)]
pub struct ArticleQuery {
    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    pub page: i64,
    /// Filter by source
    pub source_id: Option<Uuid>,
    /// Filter by triage status
    pub status: Option<String>,
    /// Case-insensitive substring search over title and content
    pub q: Option<String>,
}

fn default_page() -> i64 {
    1
}

/// Article listing row (content omitted; it can be megabytes)
#[derive(Debug, Serialize)]
pub struct ArticleSummary {
    pub article_id: Uuid,
    pub source_id: Option<Uuid>,
    pub title: String,
    pub url: String,
    pub summary: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub scraped_at: DateTime<Utc>,
    pub triage_status: TriageStatus,
}

impl From<Article> for ArticleSummary {
    fn from(article: Article) -> Self {
        Self {
            article_id: article.article_id,
            source_id: article.source_id,
            title: article.title,
            url: article.url,
            summary: article.summary,
            published_at: article.published_at,
            scraped_at: article.scraped_at,
            triage_status: article.triage_status,
        }
    }
}

/// Paginated article listing response
#[derive(Debug, Serialize)]
pub struct ArticleListResponse {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub articles: Vec<ArticleSummary>,
}

/// GET /api/articles
pub async fn list_articles(
    State(state): State<AppState>,
    Query(query): Query<ArticleQuery>,
) -> ApiResult<Json<ArticleListResponse>> {
    // Validate the status filter up front so typos get a 400, not an
    // empty result set.
    let status = query
        .status
        .as_deref()
        .map(TriageStatus::parse)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let mut where_sql = String::from(" WHERE 1=1");
    if query.source_id.is_some() {
        where_sql.push_str(" AND source_id = ?");
    }
    if status.is_some() {
        where_sql.push_str(" AND triage_status = ?");
    }
    if query.q.is_some() {
        where_sql.push_str(" AND (title LIKE ? OR content LIKE ?)");
    }

    let source_bind = query.source_id.map(|id| id.to_string());
    let status_bind = status.map(|s| s.as_str().to_string());
    let like_bind = query.q.as_ref().map(|q| format!("%{}%", q));

    // Total count with the same filters
    let count_sql = format!("SELECT COUNT(*) FROM articles{}", where_sql);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(v) = &source_bind {
        count_query = count_query.bind(v);
    }
    if let Some(v) = &status_bind {
        count_query = count_query.bind(v);
    }
    if let Some(v) = &like_bind {
        count_query = count_query.bind(v).bind(v);
    }
    let total: i64 = count_query
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let pagination = calculate_pagination(total, query.page);

    let list_sql = format!(
        "SELECT * FROM articles{} ORDER BY scraped_at DESC LIMIT {} OFFSET {}",
        where_sql, PAGE_SIZE, pagination.offset
    );
    let mut list_query = sqlx::query(&list_sql);
    if let Some(v) = &source_bind {
        list_query = list_query.bind(v);
    }
    if let Some(v) = &status_bind {
        list_query = list_query.bind(v);
    }
    if let Some(v) = &like_bind {
        list_query = list_query.bind(v).bind(v);
    }

    let rows = list_query
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let articles = rows
        .iter()
        .map(|row| Article::from_row(row).map(ArticleSummary::from))
        .collect::<cti_common::Result<Vec<_>>>()?;

    Ok(Json(ArticleListResponse {
        total,
        page: pagination.page,
        page_size: PAGE_SIZE,
        total_pages: pagination.total_pages,
        articles,
    }))
}

/// GET /api/articles/:id
pub async fn get_article(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
) -> ApiResult<Json<Article>> {
    let row = sqlx::query("SELECT * FROM articles WHERE article_id = ?")
        .bind(article_id.to_string())
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("Article not found: {}", article_id)))?;

    Ok(Json(Article::from_row(&row)?))
}

/// DELETE /api/articles/:id
///
/// Annotations cascade via the foreign key.
pub async fn delete_article(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM articles WHERE article_id = ?")
        .bind(article_id.to_string())
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!(
            "Article not found: {}",
            article_id
        )));
    }

    tracing::info!(article_id = %article_id, "Article deleted");
    Ok(Json(serde_json::json!({ "deleted": article_id })))
}

/// PUT /api/articles/:id/triage request
#[derive(Debug, Deserialize)]
pub struct TriageRequest {
    pub status: TriageStatus,
}

/// PUT /api/articles/:id/triage
pub async fn set_triage(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
    Json(request): Json<TriageRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let result = sqlx::query("UPDATE articles SET triage_status = ? WHERE article_id = ?")
        .bind(request.status.as_str())
        .bind(article_id.to_string())
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!(
            "Article not found: {}",
            article_id
        )));
    }

    tracing::info!(
        article_id = %article_id,
        status = request.status.as_str(),
        "Article triage updated"
    );
    Ok(Json(serde_json::json!({
        "article_id": article_id,
        "triage_status": request.status,
    })))
}

//! Analyst annotations on articles
//!
//! GET/POST /api/articles/:id/annotations,
//! PUT/DELETE /api/annotations/:id

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use cti_common::db::models::Annotation;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /api/articles/:id/annotations
pub async fn list_annotations(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Annotation>>> {
    ensure_article_exists(&state, article_id).await?;

    let rows = sqlx::query(
        "SELECT * FROM annotations WHERE article_id = ? ORDER BY created_at",
    )
    .bind(article_id.to_string())
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    let annotations = rows
        .iter()
        .map(Annotation::from_row)
        .collect::<cti_common::Result<Vec<_>>>()?;

    Ok(Json(annotations))
}

/// POST /api/articles/:id/annotations request
#[derive(Debug, Deserialize)]
pub struct CreateAnnotationRequest {
    pub author: String,
    pub body: String,
}

/// POST /api/articles/:id/annotations
pub async fn create_annotation(
    State(state): State<AppState>,
    Path(article_id): Path<Uuid>,
    Json(request): Json<CreateAnnotationRequest>,
) -> ApiResult<Json<Annotation>> {
    if request.author.trim().is_empty() {
        return Err(ApiError::BadRequest("author must not be empty".to_string()));
    }
    if request.body.trim().is_empty() {
        return Err(ApiError::BadRequest("body must not be empty".to_string()));
    }

    ensure_article_exists(&state, article_id).await?;

    let annotation = Annotation {
        annotation_id: Uuid::new_v4(),
        article_id,
        author: request.author.trim().to_string(),
        body: request.body,
        created_at: Utc::now(),
        updated_at: None,
    };

    sqlx::query(
        r#"
        INSERT INTO annotations (annotation_id, article_id, author, body, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(annotation.annotation_id.to_string())
    .bind(annotation.article_id.to_string())
    .bind(&annotation.author)
    .bind(&annotation.body)
    .bind(annotation.created_at.to_rfc3339())
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(
        annotation_id = %annotation.annotation_id,
        article_id = %article_id,
        "Annotation created"
    );

    Ok(Json(annotation))
}

/// PUT /api/annotations/:id request
#[derive(Debug, Deserialize)]
pub struct UpdateAnnotationRequest {
    pub body: String,
}

/// PUT /api/annotations/:id
pub async fn update_annotation(
    State(state): State<AppState>,
    Path(annotation_id): Path<Uuid>,
    Json(request): Json<UpdateAnnotationRequest>,
) -> ApiResult<Json<Annotation>> {
    if request.body.trim().is_empty() {
        return Err(ApiError::BadRequest("body must not be empty".to_string()));
    }

    let result = sqlx::query(
        "UPDATE annotations SET body = ?, updated_at = ? WHERE annotation_id = ?",
    )
    .bind(&request.body)
    .bind(Utc::now().to_rfc3339())
    .bind(annotation_id.to_string())
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!(
            "Annotation not found: {}",
            annotation_id
        )));
    }

    let row = sqlx::query("SELECT * FROM annotations WHERE annotation_id = ?")
        .bind(annotation_id.to_string())
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(Annotation::from_row(&row)?))
}

/// DELETE /api/annotations/:id
pub async fn delete_annotation(
    State(state): State<AppState>,
    Path(annotation_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM annotations WHERE annotation_id = ?")
        .bind(annotation_id.to_string())
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!(
            "Annotation not found: {}",
            annotation_id
        )));
    }

    Ok(Json(serde_json::json!({ "deleted": annotation_id })))
}

async fn ensure_article_exists(state: &AppState, article_id: Uuid) -> ApiResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE article_id = ?")
        .bind(article_id.to_string())
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if count == 0 {
        return Err(ApiError::NotFound(format!(
            "Article not found: {}",
            article_id
        )));
    }
    Ok(())
}

//! Source registry management
//!
//! GET/POST /api/sources, GET/PUT/DELETE /api/sources/:id,
//! POST /api/sources/:id/toggle

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use cti_common::db::models::Source;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /api/sources
pub async fn list_sources(State(state): State<AppState>) -> ApiResult<Json<Vec<Source>>> {
    let rows = sqlx::query("SELECT * FROM sources ORDER BY name")
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let sources = rows
        .iter()
        .map(Source::from_row)
        .collect::<cti_common::Result<Vec<_>>>()?;

    Ok(Json(sources))
}

/// POST /api/sources request
#[derive(Debug, Deserialize)]
pub struct CreateSourceRequest {
    pub name: String,
    pub feed_url: String,
    pub site_url: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_minutes: i64,
}

fn default_poll_interval() -> i64 {
    60
}

/// POST /api/sources
pub async fn create_source(
    State(state): State<AppState>,
    Json(request): Json<CreateSourceRequest>,
) -> ApiResult<Json<Source>> {
    validate_name(&request.name)?;
    validate_feed_url(&request.feed_url)?;
    validate_poll_interval(request.poll_interval_minutes)?;

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sources WHERE feed_url = ?")
        .bind(&request.feed_url)
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if existing > 0 {
        return Err(ApiError::Conflict(format!(
            "Source with feed URL already exists: {}",
            request.feed_url
        )));
    }

    let source = Source {
        source_id: Uuid::new_v4(),
        name: request.name.trim().to_string(),
        feed_url: request.feed_url.trim().to_string(),
        site_url: request.site_url,
        active: true,
        poll_interval_minutes: request.poll_interval_minutes,
        last_polled_at: None,
        consecutive_failures: 0,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO sources (
            source_id, name, feed_url, site_url, active,
            poll_interval_minutes, consecutive_failures, created_at
        ) VALUES (?, ?, ?, ?, 1, ?, 0, ?)
        "#,
    )
    .bind(source.source_id.to_string())
    .bind(&source.name)
    .bind(&source.feed_url)
    .bind(&source.site_url)
    .bind(source.poll_interval_minutes)
    .bind(source.created_at.to_rfc3339())
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(source_id = %source.source_id, name = %source.name, "Source created");
    Ok(Json(source))
}

/// GET /api/sources/:id
pub async fn get_source(
    State(state): State<AppState>,
    Path(source_id): Path<Uuid>,
) -> ApiResult<Json<Source>> {
    Ok(Json(load_source(&state, source_id).await?))
}

/// PUT /api/sources/:id request (all fields optional)
#[derive(Debug, Deserialize)]
pub struct UpdateSourceRequest {
    pub name: Option<String>,
    pub feed_url: Option<String>,
    pub site_url: Option<String>,
    pub active: Option<bool>,
    pub poll_interval_minutes: Option<i64>,
}

/// PUT /api/sources/:id
pub async fn update_source(
    State(state): State<AppState>,
    Path(source_id): Path<Uuid>,
    Json(request): Json<UpdateSourceRequest>,
) -> ApiResult<Json<Source>> {
    let mut source = load_source(&state, source_id).await?;

    if let Some(name) = request.name {
        validate_name(&name)?;
        source.name = name.trim().to_string();
    }
    if let Some(feed_url) = request.feed_url {
        validate_feed_url(&feed_url)?;
        let taken: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sources WHERE feed_url = ? AND source_id != ?",
        )
        .bind(&feed_url)
        .bind(source_id.to_string())
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
        if taken > 0 {
            return Err(ApiError::Conflict(format!(
                "Source with feed URL already exists: {}",
                feed_url
            )));
        }
        source.feed_url = feed_url.trim().to_string();
    }
    if let Some(site_url) = request.site_url {
        source.site_url = Some(site_url);
    }
    if let Some(active) = request.active {
        source.active = active;
    }
    if let Some(interval) = request.poll_interval_minutes {
        validate_poll_interval(interval)?;
        source.poll_interval_minutes = interval;
    }

    sqlx::query(
        r#"
        UPDATE sources SET
            name = ?, feed_url = ?, site_url = ?, active = ?, poll_interval_minutes = ?
        WHERE source_id = ?
        "#,
    )
    .bind(&source.name)
    .bind(&source.feed_url)
    .bind(&source.site_url)
    .bind(source.active as i64)
    .bind(source.poll_interval_minutes)
    .bind(source_id.to_string())
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(source_id = %source_id, "Source updated");
    Ok(Json(source))
}

/// DELETE /api/sources/:id
///
/// Articles keep their rows; source_id goes NULL via the foreign key.
pub async fn delete_source(
    State(state): State<AppState>,
    Path(source_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM sources WHERE source_id = ?")
        .bind(source_id.to_string())
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!(
            "Source not found: {}",
            source_id
        )));
    }

    tracing::info!(source_id = %source_id, "Source deleted");
    Ok(Json(serde_json::json!({ "deleted": source_id })))
}

/// POST /api/sources/:id/toggle
pub async fn toggle_source(
    State(state): State<AppState>,
    Path(source_id): Path<Uuid>,
) -> ApiResult<Json<Source>> {
    let source = load_source(&state, source_id).await?;
    let new_active = !source.active;

    sqlx::query("UPDATE sources SET active = ? WHERE source_id = ?")
        .bind(new_active as i64)
        .bind(source_id.to_string())
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(source_id = %source_id, active = new_active, "Source toggled");
    load_source(&state, source_id).await.map(Json)
}

async fn load_source(state: &AppState, source_id: Uuid) -> ApiResult<Source> {
    let row = sqlx::query("SELECT * FROM sources WHERE source_id = ?")
        .bind(source_id.to_string())
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("Source not found: {}", source_id)))?;

    Ok(Source::from_row(&row)?)
}

fn validate_name(name: &str) -> ApiResult<()> {
    if name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    Ok(())
}

fn validate_feed_url(url: &str) -> ApiResult<()> {
    let trimmed = url.trim();
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(ApiError::BadRequest(format!(
            "feed_url must be an http(s) URL: {}",
            url
        )));
    }
    Ok(())
}

fn validate_poll_interval(minutes: i64) -> ApiResult<()> {
    if !(5..=10080).contains(&minutes) {
        return Err(ApiError::BadRequest(
            "poll_interval_minutes must be within 5-10080".to_string(),
        ));
    }
    Ok(())
}

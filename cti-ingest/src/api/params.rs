//! Pipeline parameter endpoints
//!
//! GET /api/params, PUT /api/params

use axum::{extract::State, routing::get, Json, Router};
use cti_common::params::PipelineParams;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /api/params
pub async fn get_params(State(state): State<AppState>) -> ApiResult<Json<PipelineParams>> {
    let params = PipelineParams::load(&state.db).await?;
    Ok(Json(params))
}

/// PUT /api/params
///
/// Validates ranges before persisting; invalid values reject the whole
/// update.
pub async fn put_params(
    State(state): State<AppState>,
    Json(params): Json<PipelineParams>,
) -> ApiResult<Json<PipelineParams>> {
    params
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    params.save(&state.db).await?;
    tracing::info!(?params, "Pipeline parameters updated");

    Ok(Json(params))
}

/// Build parameter routes
pub fn params_routes() -> Router<AppState> {
    Router::new().route("/api/params", get(get_params).put(put_params))
}

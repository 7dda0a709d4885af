//! LLM API key settings endpoint
//!
//! GET reports whether a key is configured (never the key itself);
//! POST stores a key in the database tier and updates the running
//! service, with a best-effort TOML backup.

use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config;
use crate::error::{ApiError, ApiResult};
use crate::{db, AppState};

/// GET /api/settings/llm_api_key response
#[derive(Debug, Serialize)]
pub struct KeyStatusResponse {
    pub configured: bool,
    /// Resolution tier currently in effect, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub model: String,
}

/// POST /api/settings/llm_api_key request
#[derive(Debug, Deserialize)]
pub struct SetKeyRequest {
    pub api_key: String,
}

/// POST /api/settings/llm_api_key response
#[derive(Debug, Serialize)]
pub struct SetKeyResponse {
    pub success: bool,
    pub message: String,
}

/// GET /api/settings/llm_api_key
pub async fn get_key_status(State(state): State<AppState>) -> ApiResult<Json<KeyStatusResponse>> {
    let llm = state.llm.read().await;
    let configured = llm.is_configured();
    let model = llm.model.clone();
    drop(llm);

    let source = if configured {
        // Re-resolve to report the effective tier.
        config::resolve_llm_api_key(&state.db, None)
            .await?
            .map(|(_, source)| source.to_string())
    } else {
        None
    };

    Ok(Json(KeyStatusResponse {
        configured,
        source,
        model,
    }))
}

/// POST /api/settings/llm_api_key
pub async fn set_key(
    State(state): State<AppState>,
    Json(request): Json<SetKeyRequest>,
) -> ApiResult<Json<SetKeyResponse>> {
    if !config::is_valid_key(&request.api_key) {
        return Err(ApiError::BadRequest(
            "API key must not be empty".to_string(),
        ));
    }

    let key = request.api_key.trim().to_string();

    // Database is the authoritative tier.
    db::settings::set_llm_api_key(&state.db, key.clone()).await?;

    // Update the running service.
    state.llm.write().await.api_key = Some(key.clone());

    // Best-effort TOML backup; failure is logged, not surfaced.
    if let Ok(toml_path) = cti_common::config::toml_config_path("cti-ingest") {
        let mut settings = HashMap::new();
        settings.insert("llm_api_key".to_string(), key);
        let _ = config::sync_settings_to_toml(settings, &toml_path).await;
    }

    tracing::info!("LLM API key configured via settings API");

    Ok(Json(SetKeyResponse {
        success: true,
        message: "LLM API key configured successfully".to_string(),
    }))
}

/// Build settings routes
pub fn settings_routes() -> Router<AppState> {
    Router::new().route("/api/settings/llm_api_key", get(get_key_status).post(set_key))
}

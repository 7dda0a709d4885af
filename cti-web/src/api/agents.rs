//! Agent configuration tuning
//!
//! GET /api/agents, GET /api/agents/:name, PUT /api/agents/:name
//!
//! Prompts, model, and token budget per pipeline agent. Rows are seeded
//! by the ingest service on first run; the dashboard edits them in
//! place. Changes take effect on the next workflow session.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use cti_common::db::models::AgentConfig;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /api/agents
pub async fn list_agents(State(state): State<AppState>) -> ApiResult<Json<Vec<AgentConfig>>> {
    let rows = sqlx::query("SELECT * FROM agent_configs ORDER BY name")
        .fetch_all(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let agents = rows
        .iter()
        .map(AgentConfig::from_row)
        .collect::<cti_common::Result<Vec<_>>>()?;

    Ok(Json(agents))
}

/// GET /api/agents/:name
pub async fn get_agent(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<AgentConfig>> {
    Ok(Json(load_agent(&state, &name).await?))
}

/// PUT /api/agents/:name request (all fields optional)
#[derive(Debug, Deserialize)]
pub struct UpdateAgentRequest {
    pub model: Option<String>,
    pub max_tokens: Option<i64>,
    pub prompt_template: Option<String>,
}

/// PUT /api/agents/:name
pub async fn update_agent(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<UpdateAgentRequest>,
) -> ApiResult<Json<AgentConfig>> {
    let mut agent = load_agent(&state, &name).await?;

    if let Some(model) = request.model {
        if model.trim().is_empty() {
            return Err(ApiError::BadRequest("model must not be empty".to_string()));
        }
        agent.model = model.trim().to_string();
    }
    if let Some(max_tokens) = request.max_tokens {
        if !(256..=16384).contains(&max_tokens) {
            return Err(ApiError::BadRequest(
                "max_tokens must be within 256-16384".to_string(),
            ));
        }
        agent.max_tokens = max_tokens;
    }
    if let Some(prompt_template) = request.prompt_template {
        if prompt_template.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "prompt_template must not be empty".to_string(),
            ));
        }
        agent.prompt_template = prompt_template;
    }

    sqlx::query(
        "UPDATE agent_configs SET model = ?, max_tokens = ?, prompt_template = ?, updated_at = ? WHERE name = ?",
    )
    .bind(&agent.model)
    .bind(agent.max_tokens)
    .bind(&agent.prompt_template)
    .bind(Utc::now().to_rfc3339())
    .bind(&name)
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(agent = %name, "Agent config updated");
    load_agent(&state, &name).await.map(Json)
}

async fn load_agent(state: &AppState, name: &str) -> ApiResult<AgentConfig> {
    let row = sqlx::query("SELECT * FROM agent_configs WHERE name = ?")
        .bind(name)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("Agent not found: {}", name)))?;

    Ok(AgentConfig::from_row(&row)?)
}

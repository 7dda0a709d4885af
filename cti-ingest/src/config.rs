//! LLM provider configuration for cti-ingest
//!
//! API key resolution priority: Database → ENV → TOML. The database is
//! authoritative; keys found in lower tiers are migrated into it so the
//! dashboard settings page always reflects reality.

use cti_common::config::{write_toml_config, TomlConfig};
use cti_common::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::llm::client::{LlmClient, LlmError, DEFAULT_BASE_URL, DEFAULT_MODEL};

/// Environment variable consulted during key resolution
pub const LLM_API_KEY_ENV: &str = "CTI_LLM_API_KEY";

/// Runtime LLM configuration held in application state
#[derive(Debug, Clone)]
pub struct LlmRuntime {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl LlmRuntime {
    /// Assemble runtime config from the resolved key and TOML overrides
    pub fn new(api_key: Option<String>, toml_config: Option<&TomlConfig>) -> Self {
        let model = toml_config
            .and_then(|c| c.llm_model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = toml_config
            .and_then(|c| c.llm_base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Self {
            api_key,
            model,
            base_url,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(is_valid_key)
    }

    /// Build a client from this config
    pub fn client(&self) -> std::result::Result<LlmClient, LlmError> {
        let key = self
            .api_key
            .clone()
            .filter(|k| is_valid_key(k))
            .ok_or(LlmError::NotConfigured)?;
        LlmClient::new(key, self.model.clone(), self.base_url.clone())
    }
}

/// Resolve the LLM API key from 3-tier configuration
///
/// Returns `(key, source)`; `None` when no tier holds a valid key.
pub async fn resolve_llm_api_key(
    db: &Pool<Sqlite>,
    toml_config: Option<&TomlConfig>,
) -> Result<Option<(String, &'static str)>> {
    let db_key = crate::db::settings::get_llm_api_key(db).await?;
    let env_key = std::env::var(LLM_API_KEY_ENV).ok();
    let toml_key = toml_config.and_then(|c| c.llm_api_key.clone());

    let mut sources = Vec::new();
    if db_key.as_deref().is_some_and(is_valid_key) {
        sources.push("database");
    }
    if env_key.as_deref().is_some_and(is_valid_key) {
        sources.push("environment");
    }
    if toml_key.as_deref().is_some_and(is_valid_key) {
        sources.push("TOML");
    }

    if sources.len() > 1 {
        warn!(
            "LLM API key found in multiple sources: {}. Using database (highest priority).",
            sources.join(", ")
        );
    }

    if let Some(key) = db_key.filter(|k| is_valid_key(k)) {
        info!("LLM API key loaded from database");
        return Ok(Some((key, "database")));
    }

    if let Some(key) = env_key.filter(|k| is_valid_key(k)) {
        info!("LLM API key loaded from environment variable");
        return Ok(Some((key, "environment")));
    }

    if let Some(key) = toml_key.filter(|k| is_valid_key(k)) {
        info!("LLM API key loaded from TOML config");
        return Ok(Some((key, "TOML")));
    }

    info!(
        "LLM API key not configured. Workflow endpoints will reject requests until one of:\n\
         1. Dashboard settings: POST /api/settings/llm_api_key\n\
         2. Environment: {}=your-key-here\n\
         3. TOML config: ~/.config/cti-scraper/cti-ingest.toml (llm_api_key = \"your-key\")",
        LLM_API_KEY_ENV
    );
    Ok(None)
}

/// Validate an API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Sync settings from database to the TOML file (best-effort backup)
pub async fn sync_settings_to_toml(
    settings: HashMap<String, String>,
    toml_path: &Path,
) -> Result<()> {
    let mut config = if toml_path.exists() {
        let content = std::fs::read_to_string(toml_path)
            .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?
    } else {
        TomlConfig::default()
    };

    if let Some(key) = settings.get("llm_api_key") {
        config.llm_api_key = Some(key.clone());
    }

    match write_toml_config(&config, toml_path) {
        Ok(()) => {
            info!("Settings synced to TOML: {}", toml_path.display());
            Ok(())
        }
        Err(e) => {
            warn!("TOML write failed (database write succeeded): {}", e);
            Ok(())
        }
    }
}

/// Migrate a key discovered in ENV/TOML into the database tier
pub async fn migrate_key_to_database(
    key: String,
    source: &str,
    db: &Pool<Sqlite>,
    toml_path: &Path,
) -> Result<()> {
    crate::db::settings::set_llm_api_key(db, key.clone()).await?;

    // Back the key up to TOML when it only existed in the environment.
    if source == "environment" {
        let mut settings = HashMap::new();
        settings.insert("llm_api_key".to_string(), key);
        sync_settings_to_toml(settings, toml_path).await?;
    }

    info!("LLM API key migrated from {} to database", source);
    Ok(())
}

//! Tunable pipeline parameters
//!
//! Thresholds and budgets for the agentic workflow, persisted in the
//! settings table so analysts can tune them from the dashboard without
//! restarting the services. Defaults are seeded on first run.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// Pipeline parameters with validated ranges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineParams {
    /// Junk-filter score below which an article is discarded (0.0-1.0)
    pub junk_threshold: f64,
    /// Ranking score below which extraction is skipped (0-100)
    pub ranking_threshold: i64,
    /// Rule similarity above which a candidate is flagged duplicate (0.0-1.0)
    pub similarity_threshold: f64,
    /// Cap on SIGMA rules generated per article (1-20)
    pub max_rules_per_article: i64,
    /// Token budget per LLM call (256-16384)
    pub llm_max_tokens: i64,
    /// Scheduler wake interval in seconds (10-3600)
    pub scheduler_tick_seconds: i64,
    /// Days to retain finished workflow sessions (1-365)
    pub session_retention_days: i64,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            junk_threshold: 0.5,
            ranking_threshold: 40,
            similarity_threshold: 0.82,
            max_rules_per_article: 5,
            llm_max_tokens: 2048,
            scheduler_tick_seconds: 60,
            session_retention_days: 30,
        }
    }
}

impl PipelineParams {
    /// Validate all parameters against their documented ranges
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.junk_threshold) {
            return Err(Error::InvalidInput(
                "junk_threshold must be within 0.0-1.0".to_string(),
            ));
        }
        if !(0..=100).contains(&self.ranking_threshold) {
            return Err(Error::InvalidInput(
                "ranking_threshold must be within 0-100".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::InvalidInput(
                "similarity_threshold must be within 0.0-1.0".to_string(),
            ));
        }
        if !(1..=20).contains(&self.max_rules_per_article) {
            return Err(Error::InvalidInput(
                "max_rules_per_article must be within 1-20".to_string(),
            ));
        }
        if !(256..=16384).contains(&self.llm_max_tokens) {
            return Err(Error::InvalidInput(
                "llm_max_tokens must be within 256-16384".to_string(),
            ));
        }
        if !(10..=3600).contains(&self.scheduler_tick_seconds) {
            return Err(Error::InvalidInput(
                "scheduler_tick_seconds must be within 10-3600".to_string(),
            ));
        }
        if !(1..=365).contains(&self.session_retention_days) {
            return Err(Error::InvalidInput(
                "session_retention_days must be within 1-365".to_string(),
            ));
        }
        Ok(())
    }

    /// Load parameters from the settings table, falling back to defaults
    /// for missing or unparseable keys.
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            junk_threshold: get_f64(pool, "junk_threshold")
                .await?
                .unwrap_or(defaults.junk_threshold),
            ranking_threshold: get_i64(pool, "ranking_threshold")
                .await?
                .unwrap_or(defaults.ranking_threshold),
            similarity_threshold: get_f64(pool, "similarity_threshold")
                .await?
                .unwrap_or(defaults.similarity_threshold),
            max_rules_per_article: get_i64(pool, "max_rules_per_article")
                .await?
                .unwrap_or(defaults.max_rules_per_article),
            llm_max_tokens: get_i64(pool, "llm_max_tokens")
                .await?
                .unwrap_or(defaults.llm_max_tokens),
            scheduler_tick_seconds: get_i64(pool, "scheduler_tick_seconds")
                .await?
                .unwrap_or(defaults.scheduler_tick_seconds),
            session_retention_days: get_i64(pool, "session_retention_days")
                .await?
                .unwrap_or(defaults.session_retention_days),
        })
    }

    /// Persist all parameters to the settings table
    ///
    /// Callers must `validate()` first; this writes unconditionally.
    pub async fn save(&self, pool: &SqlitePool) -> Result<()> {
        set(pool, "junk_threshold", &self.junk_threshold.to_string()).await?;
        set(pool, "ranking_threshold", &self.ranking_threshold.to_string()).await?;
        set(
            pool,
            "similarity_threshold",
            &self.similarity_threshold.to_string(),
        )
        .await?;
        set(
            pool,
            "max_rules_per_article",
            &self.max_rules_per_article.to_string(),
        )
        .await?;
        set(pool, "llm_max_tokens", &self.llm_max_tokens.to_string()).await?;
        set(
            pool,
            "scheduler_tick_seconds",
            &self.scheduler_tick_seconds.to_string(),
        )
        .await?;
        set(
            pool,
            "session_retention_days",
            &self.session_retention_days.to_string(),
        )
        .await?;
        Ok(())
    }

    /// Seed default values for any missing keys (first-run initialization)
    pub async fn seed_defaults(pool: &SqlitePool) -> Result<()> {
        let defaults = Self::default();
        seed(pool, "junk_threshold", &defaults.junk_threshold.to_string()).await?;
        seed(
            pool,
            "ranking_threshold",
            &defaults.ranking_threshold.to_string(),
        )
        .await?;
        seed(
            pool,
            "similarity_threshold",
            &defaults.similarity_threshold.to_string(),
        )
        .await?;
        seed(
            pool,
            "max_rules_per_article",
            &defaults.max_rules_per_article.to_string(),
        )
        .await?;
        seed(pool, "llm_max_tokens", &defaults.llm_max_tokens.to_string()).await?;
        seed(
            pool,
            "scheduler_tick_seconds",
            &defaults.scheduler_tick_seconds.to_string(),
        )
        .await?;
        seed(
            pool,
            "session_retention_days",
            &defaults.session_retention_days.to_string(),
        )
        .await?;
        Ok(())
    }
}

async fn get_value(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

async fn get_f64(pool: &SqlitePool, key: &str) -> Result<Option<f64>> {
    Ok(get_value(pool, key).await?.and_then(|v| v.parse().ok()))
}

async fn get_i64(pool: &SqlitePool, key: &str) -> Result<Option<i64>> {
    Ok(get_value(pool, key).await?.and_then(|v| v.parse().ok()))
}

async fn set(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
    Ok(())
}

async fn seed(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        crate::db::init::create_settings_table(&pool).await.unwrap();
        pool
    }

    #[test]
    fn defaults_validate() {
        PipelineParams::default().validate().unwrap();
    }

    #[test]
    fn out_of_range_rejected() {
        let mut params = PipelineParams::default();
        params.junk_threshold = 1.5;
        assert!(params.validate().is_err());

        let mut params = PipelineParams::default();
        params.ranking_threshold = -1;
        assert!(params.validate().is_err());

        let mut params = PipelineParams::default();
        params.max_rules_per_article = 0;
        assert!(params.validate().is_err());
    }

    #[tokio::test]
    async fn load_falls_back_to_defaults() {
        let pool = test_pool().await;
        let params = PipelineParams::load(&pool).await.unwrap();
        assert_eq!(params, PipelineParams::default());
    }

    #[tokio::test]
    async fn save_then_load_roundtrip() {
        let pool = test_pool().await;

        let mut params = PipelineParams::default();
        params.junk_threshold = 0.3;
        params.ranking_threshold = 55;
        params.max_rules_per_article = 3;
        params.save(&pool).await.unwrap();

        let loaded = PipelineParams::load(&pool).await.unwrap();
        assert_eq!(loaded, params);
    }

    #[tokio::test]
    async fn seed_does_not_overwrite_existing() {
        let pool = test_pool().await;

        let mut params = PipelineParams::default();
        params.junk_threshold = 0.9;
        params.save(&pool).await.unwrap();

        PipelineParams::seed_defaults(&pool).await.unwrap();

        let loaded = PipelineParams::load(&pool).await.unwrap();
        assert_eq!(loaded.junk_threshold, 0.9);
    }
}

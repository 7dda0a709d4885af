//! Settings persistence for cti-ingest

use cti_common::db::retry_on_lock;
use cti_common::Result;
use sqlx::SqlitePool;

use super::LOCK_WAIT_MS;

const LLM_API_KEY: &str = "llm_api_key";

/// Get the stored LLM API key (database tier of key resolution)
pub async fn get_llm_api_key(pool: &SqlitePool) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(LLM_API_KEY)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

/// Store the LLM API key (authoritative tier)
pub async fn set_llm_api_key(pool: &SqlitePool, key: String) -> Result<()> {
    retry_on_lock("set_llm_api_key", LOCK_WAIT_MS, || async {
        sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
            .bind(LLM_API_KEY)
            .bind(&key)
            .execute(pool)
            .await?;
        Ok(())
    })
    .await
}

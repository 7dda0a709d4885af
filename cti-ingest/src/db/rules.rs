//! SIGMA rule persistence for the workflow

use cti_common::db::models::SigmaRule;
use cti_common::db::retry_on_lock;
use cti_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::LOCK_WAIT_MS;

/// Insert a generated rule
pub async fn insert_rule(pool: &SqlitePool, rule: &SigmaRule) -> Result<()> {
    let rule_id = rule.rule_id.to_string();
    let article_id = rule.article_id.map(|id| id.to_string());
    let status = rule.status.as_str();
    let duplicate_of = rule.duplicate_of.map(|id| id.to_string());
    let created_at = rule.created_at.to_rfc3339();

    retry_on_lock("insert_rule", LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO sigma_rules (
                rule_id, article_id, title, yaml, status,
                duplicate_of, similarity, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rule_id)
        .bind(&article_id)
        .bind(&rule.title)
        .bind(&rule.yaml)
        .bind(status)
        .bind(&duplicate_of)
        .bind(rule.similarity)
        .bind(&created_at)
        .execute(pool)
        .await?;
        Ok(())
    })
    .await
}

/// Load all rules that can serve as similarity-comparison targets
/// (anything not already marked duplicate).
pub async fn list_comparison_targets(pool: &SqlitePool) -> Result<Vec<SigmaRule>> {
    let rows = sqlx::query("SELECT * FROM sigma_rules WHERE status != 'duplicate'")
        .fetch_all(pool)
        .await?;

    rows.iter().map(SigmaRule::from_row).collect()
}

/// Load a single rule
pub async fn get_rule(pool: &SqlitePool, rule_id: Uuid) -> Result<Option<SigmaRule>> {
    let row = sqlx::query("SELECT * FROM sigma_rules WHERE rule_id = ?")
        .bind(rule_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| SigmaRule::from_row(&r)).transpose()
}

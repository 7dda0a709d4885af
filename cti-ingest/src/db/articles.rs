//! Article persistence for the scraper and workflow

use cti_common::db::models::{Article, TriageStatus};
use cti_common::db::retry_on_lock;
use cti_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::LOCK_WAIT_MS;

/// Does an article with this canonical URL already exist?
pub async fn exists_by_url(pool: &SqlitePool, url: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE url = ?")
        .bind(url)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Does an article with this content hash already exist?
pub async fn exists_by_hash(pool: &SqlitePool, content_hash: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE content_hash = ?")
        .bind(content_hash)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Insert a newly scraped article
pub async fn insert_article(pool: &SqlitePool, article: &Article) -> Result<()> {
    let article_id = article.article_id.to_string();
    let source_id = article.source_id.map(|id| id.to_string());
    let published_at = article.published_at.map(|dt| dt.to_rfc3339());
    let scraped_at = article.scraped_at.to_rfc3339();
    let triage = article.triage_status.as_str();

    retry_on_lock("insert_article", LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO articles (
                article_id, source_id, title, url, content, content_hash,
                summary, published_at, scraped_at, triage_status
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article_id)
        .bind(&source_id)
        .bind(&article.title)
        .bind(&article.url)
        .bind(&article.content)
        .bind(&article.content_hash)
        .bind(&article.summary)
        .bind(&published_at)
        .bind(&scraped_at)
        .bind(triage)
        .execute(pool)
        .await?;
        Ok(())
    })
    .await
}

/// Load an article by id
pub async fn get_article(pool: &SqlitePool, article_id: Uuid) -> Result<Option<Article>> {
    let row = sqlx::query("SELECT * FROM articles WHERE article_id = ?")
        .bind(article_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| Article::from_row(&r)).transpose()
}

/// Update an article's triage status
pub async fn set_triage_status(
    pool: &SqlitePool,
    article_id: Uuid,
    status: TriageStatus,
) -> Result<()> {
    let article_id = article_id.to_string();
    let status = status.as_str();

    retry_on_lock("set_triage_status", LOCK_WAIT_MS, || async {
        sqlx::query("UPDATE articles SET triage_status = ? WHERE article_id = ?")
            .bind(status)
            .bind(&article_id)
            .execute(pool)
            .await?;
        Ok(())
    })
    .await
}

/// Attach workflow analysis output (JSON blobs) to an article
pub async fn update_analysis(
    pool: &SqlitePool,
    article_id: Uuid,
    os_targets: Option<&str>,
    indicators: Option<&str>,
    ttps: Option<&str>,
) -> Result<()> {
    let article_id = article_id.to_string();

    retry_on_lock("update_analysis", LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            UPDATE articles SET
                os_targets = COALESCE(?, os_targets),
                indicators = COALESCE(?, indicators),
                ttps = COALESCE(?, ttps)
            WHERE article_id = ?
            "#,
        )
        .bind(os_targets)
        .bind(indicators)
        .bind(ttps)
        .bind(&article_id)
        .execute(pool)
        .await?;
        Ok(())
    })
    .await
}

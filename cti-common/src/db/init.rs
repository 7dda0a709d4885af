//! Idempotent table creation for the shared database

use crate::Result;
use sqlx::SqlitePool;

/// Create all CTI Scraper tables if they don't exist
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_sources_table(pool).await?;
    create_articles_table(pool).await?;
    create_annotations_table(pool).await?;
    create_scrape_sessions_table(pool).await?;
    create_workflow_sessions_table(pool).await?;
    create_sigma_rules_table(pool).await?;
    create_review_queue_table(pool).await?;
    create_agent_configs_table(pool).await?;

    tracing::info!("Database tables initialized");
    Ok(())
}

/// Settings table for key/value parameter persistence
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_sources_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            source_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            feed_url TEXT NOT NULL UNIQUE,
            site_url TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            poll_interval_minutes INTEGER NOT NULL DEFAULT 60,
            last_polled_at TEXT,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_articles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS articles (
            article_id TEXT PRIMARY KEY,
            source_id TEXT REFERENCES sources(source_id) ON DELETE SET NULL,
            title TEXT NOT NULL,
            url TEXT NOT NULL UNIQUE,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL UNIQUE,
            summary TEXT,
            published_at TEXT,
            scraped_at TEXT NOT NULL,
            triage_status TEXT NOT NULL DEFAULT 'new',
            os_targets TEXT,
            indicators TEXT,
            ttps TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_annotations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS annotations (
            annotation_id TEXT PRIMARY KEY,
            article_id TEXT NOT NULL REFERENCES articles(article_id) ON DELETE CASCADE,
            author TEXT NOT NULL,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_scrape_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scrape_sessions (
            session_id TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            sources_polled INTEGER NOT NULL DEFAULT 0,
            entries_seen INTEGER NOT NULL DEFAULT 0,
            articles_stored INTEGER NOT NULL DEFAULT 0,
            articles_skipped INTEGER NOT NULL DEFAULT 0,
            errors TEXT NOT NULL DEFAULT '[]',
            started_at TEXT NOT NULL,
            ended_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_workflow_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workflow_sessions (
            session_id TEXT PRIMARY KEY,
            article_id TEXT NOT NULL,
            stage TEXT NOT NULL,
            os_targets TEXT,
            junk_score REAL,
            ranking_score INTEGER,
            indicators TEXT,
            ttps TEXT,
            rules_generated INTEGER NOT NULL DEFAULT 0,
            rules_duplicate INTEGER NOT NULL DEFAULT 0,
            input_tokens INTEGER NOT NULL DEFAULT 0,
            output_tokens INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            started_at TEXT NOT NULL,
            ended_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_sigma_rules_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sigma_rules (
            rule_id TEXT PRIMARY KEY,
            article_id TEXT,
            title TEXT NOT NULL,
            yaml TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'draft',
            duplicate_of TEXT,
            similarity REAL,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_review_queue_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS review_queue (
            entry_id TEXT PRIMARY KEY,
            article_id TEXT NOT NULL,
            rule_id TEXT,
            priority INTEGER NOT NULL DEFAULT 0,
            state TEXT NOT NULL DEFAULT 'pending',
            claimed_by TEXT,
            enqueued_at TEXT NOT NULL,
            resolved_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_agent_configs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS agent_configs (
            name TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            max_tokens INTEGER NOT NULL,
            prompt_template TEXT NOT NULL,
            updated_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

//! Shared database access for the CTI Scraper services
//!
//! Both services open the same `cti.db` in the resolved root folder.
//! Table creation is idempotent so either service can start first.

pub mod init;
pub mod models;
pub mod retry;

use crate::Result;
use sqlx::SqlitePool;
use std::path::Path;

pub use retry::retry_on_lock;

/// Initialize the database connection pool
///
/// Connects to the shared cti.db in the root folder with mode=rwc
/// (read, write, create) and creates missing tables.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    init::create_tables(&pool).await?;

    Ok(pool)
}

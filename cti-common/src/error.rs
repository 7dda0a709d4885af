//! Common error types for CTI Scraper

use thiserror::Error;

/// Common result type for CTI Scraper operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the CTI Scraper services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Feed or article fetch/parse failure
    #[error("Scrape error: {0}")]
    Scrape(String),

    /// LLM provider call failure
    #[error("LLM error: {0}")]
    Llm(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

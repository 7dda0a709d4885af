//! Shared-secret API authentication
//!
//! Protected dashboard endpoints require the `X-CTI-Auth` header to match
//! the shared secret stored in the settings table. The special value 0
//! disables auth checking entirely (local single-analyst deployments).

#[cfg(feature = "sqlx")]
use sqlx::SqlitePool;

/// Header carrying the shared secret on protected requests
pub const AUTH_HEADER: &str = "x-cti-auth";

/// Settings key under which the shared secret is stored
pub const SHARED_SECRET_KEY: &str = "api_shared_secret";

/// Authentication error types
#[derive(Debug, Clone)]
pub enum ApiAuthError {
    /// Header missing from a protected request
    MissingHeader,
    /// Header present but does not match the shared secret
    InvalidSecret,
    /// Database error loading the shared secret
    DatabaseError(String),
}

impl std::fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiAuthError::MissingHeader => write!(f, "Missing {} header", AUTH_HEADER),
            ApiAuthError::InvalidSecret => write!(f, "Invalid shared secret"),
            ApiAuthError::DatabaseError(err) => write!(f, "Database error: {}", err),
        }
    }
}

impl std::error::Error for ApiAuthError {}

/// Load the shared secret from the settings table
///
/// Generates and stores a new non-zero secret when none exists.
/// Value 0 means auth is disabled.
#[cfg(feature = "sqlx")]
pub async fn load_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(SHARED_SECRET_KEY)
            .fetch_optional(db)
            .await
            .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    match result {
        Some((value,)) => value
            .parse::<i64>()
            .map_err(|e| ApiAuthError::DatabaseError(format!("Invalid i64: {}", e))),
        None => initialize_shared_secret(db).await,
    }
}

/// Generate and store a fresh non-zero shared secret
#[cfg(feature = "sqlx")]
pub async fn initialize_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    let secret: i64 = loop {
        let val = rng.gen::<i64>();
        if val != 0 {
            break val;
        }
    };

    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
        .bind(SHARED_SECRET_KEY)
        .bind(secret.to_string())
        .execute(db)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    Ok(secret)
}

/// Validate a presented header value against the shared secret
///
/// Secret 0 disables validation (always Ok).
pub fn validate_secret(presented: Option<&str>, shared_secret: i64) -> Result<(), ApiAuthError> {
    if shared_secret == 0 {
        return Ok(());
    }

    let presented = presented.ok_or(ApiAuthError::MissingHeader)?;
    let presented: i64 = presented
        .trim()
        .parse()
        .map_err(|_| ApiAuthError::InvalidSecret)?;

    if presented != shared_secret {
        return Err(ApiAuthError::InvalidSecret);
    }

    Ok(())
}

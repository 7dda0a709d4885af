//! cti-web - Analyst Dashboard Service
//!
//! **Module Identity:**
//! - Name: cti-web
//! - Port: 5841
//!
//! Serves the analyst dashboard and the REST API over the shared
//! database: article triage, annotations, source management, SIGMA rule
//! review, and the review queue.

use anyhow::Result;
use clap::Parser;
use cti_common::auth::load_shared_secret;
use cti_common::config::{RootFolderInitializer, RootFolderResolver};
use tracing::{error, info};

use cti_web::{build_router, AppState};

#[derive(Debug, Parser)]
#[command(name = "cti-web", about = "CTI Scraper analyst dashboard")]
struct Args {
    /// Root folder holding cti.db (overrides env and TOML config)
    #[arg(long)]
    root_folder: Option<String>,

    /// Listen port
    #[arg(long, default_value_t = 5841)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Log build identification immediately after tracing init
    info!(
        "Starting CTI Scraper dashboard (cti-web) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    // Resolve and create the root folder
    let resolver = RootFolderResolver::new("cti-web").with_cli_arg(args.root_folder.clone());
    let root_folder = resolver.resolve();

    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());

    let pool = match cti_common::db::init_database_pool(&db_path).await {
        Ok(pool) => {
            info!("✓ Connected to database");
            pool
        }
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            return Err(e.into());
        }
    };

    // Load (or initialize) the shared secret for API authentication
    let shared_secret = match load_shared_secret(&pool).await {
        Ok(secret) => {
            if secret == 0 {
                info!("API authentication disabled (shared_secret = 0)");
            } else {
                info!("✓ Loaded shared secret for API authentication");
            }
            secret
        }
        Err(e) => {
            error!("Failed to load shared secret: {}", e);
            return Err(anyhow::anyhow!("Failed to load shared secret: {}", e));
        }
    };

    // Create application state and router
    let state = AppState::new(pool, shared_secret);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", args.port)).await?;
    info!("cti-web listening on http://127.0.0.1:{}", args.port);
    info!("Health check: http://127.0.0.1:{}/health", args.port);

    axum::serve(listener, app).await?;

    Ok(())
}

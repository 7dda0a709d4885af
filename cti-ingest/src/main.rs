//! cti-ingest - Scraping and Agentic Workflow Service
//!
//! **Module Identity:**
//! - Name: cti-ingest
//! - Port: 5840
//!
//! Polls blog/news sources, stores articles in the shared database,
//! runs the agentic LLM pipeline over article content, and streams
//! progress to dashboard clients via SSE.

use anyhow::Result;
use clap::Parser;
use cti_common::config::{RootFolderInitializer, RootFolderResolver};
use cti_common::events::EventBus;
use cti_common::params::PipelineParams;
use tokio_util::sync::CancellationToken;
use tracing::info;

use cti_ingest::config::LlmRuntime;
use cti_ingest::{build_router, AppState};

#[derive(Debug, Parser)]
#[command(name = "cti-ingest", about = "CTI Scraper ingest service")]
struct Args {
    /// Root folder holding cti.db (overrides env and TOML config)
    #[arg(long)]
    root_folder: Option<String>,

    /// Listen port
    #[arg(long, default_value_t = 5840)]
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
        "Starting CTI Scraper ingest (cti-ingest) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    // Resolve and create the root folder
    let resolver = RootFolderResolver::new("cti-ingest").with_cli_arg(args.root_folder.clone());
    let root_folder = resolver.resolve();

    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());

    // Open or create the shared database
    let db_pool = cti_common::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    // Seed tunable defaults and agent configs on first run
    PipelineParams::seed_defaults(&db_pool).await?;

    // Resolve LLM configuration (Database -> ENV -> TOML)
    let toml_config = cti_common::config::load_toml_config("cti-ingest").ok();
    let resolved = cti_ingest::config::resolve_llm_api_key(&db_pool, toml_config.as_ref()).await?;

    if let Some((key, source)) = resolved.clone() {
        if source != "database" {
            if let Ok(toml_path) = cti_common::config::toml_config_path("cti-ingest") {
                cti_ingest::config::migrate_key_to_database(key, source, &db_pool, &toml_path)
                    .await?;
            }
        }
    }

    let llm = LlmRuntime::new(resolved.map(|(key, _)| key), toml_config.as_ref());
    cti_ingest::llm::prompts::seed_agent_configs(&db_pool, &llm.model).await?;

    // Event bus for SSE broadcasting
    let event_bus = EventBus::new(1000);
    info!("Event bus initialized");

    // Create application state
    let state = AppState::new(db_pool, event_bus, llm);

    // Start the background scheduler
    let shutdown = CancellationToken::new();
    tokio::spawn(cti_ingest::scheduler::run_scheduler(
        state.clone(),
        shutdown.clone(),
    ));

    // Build router and serve
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", args.port)).await?;
    info!("cti-ingest listening on http://127.0.0.1:{}", args.port);
    info!("Health check: http://127.0.0.1:{}/health", args.port);

    axum::serve(listener, app).await?;

    shutdown.cancel();
    Ok(())
}

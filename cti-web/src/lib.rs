//! cti-web library - Analyst dashboard service
//!
//! REST API over articles, sources, annotations, rules, the review
//! queue, and agent configuration, plus the server-rendered dashboard.

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

pub mod api;
pub mod error;
pub mod pagination;

pub use error::{ApiError, ApiResult};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Shared secret for API authentication (0 disables auth)
    pub shared_secret: i64,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, shared_secret: i64) -> Self {
        Self {
            db,
            shared_secret,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// Health and static routes are public; everything under /api requires
/// the shared-secret header (unless the secret is 0).
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    // Protected routes (require authentication)
    let protected = Router::new()
        // Articles
        .route("/api/articles", get(api::articles::list_articles))
        .route(
            "/api/articles/:id",
            get(api::articles::get_article).delete(api::articles::delete_article),
        )
        .route("/api/articles/:id/triage", axum::routing::put(api::articles::set_triage))
        // Annotations
        .route(
            "/api/articles/:id/annotations",
            get(api::annotations::list_annotations).post(api::annotations::create_annotation),
        )
        .route(
            "/api/annotations/:id",
            axum::routing::put(api::annotations::update_annotation)
                .delete(api::annotations::delete_annotation),
        )
        // Sources
        .route(
            "/api/sources",
            get(api::sources::list_sources).post(api::sources::create_source),
        )
        .route(
            "/api/sources/:id",
            get(api::sources::get_source)
                .put(api::sources::update_source)
                .delete(api::sources::delete_source),
        )
        .route("/api/sources/:id/toggle", post(api::sources::toggle_source))
        // Rules
        .route("/api/rules", get(api::rules::list_rules))
        .route(
            "/api/rules/:id",
            get(api::rules::get_rule).delete(api::rules::delete_rule),
        )
        .route("/api/rules/:id/status", axum::routing::put(api::rules::set_rule_status))
        .route("/api/rules/:id/similar", get(api::rules::similar_rules))
        // Review queue
        .route("/api/queue", get(api::queue::list_queue))
        .route("/api/queue/:id/claim", post(api::queue::claim_entry))
        .route("/api/queue/:id/resolve", post(api::queue::resolve_entry))
        // Agent configuration
        .route("/api/agents", get(api::agents::list_agents))
        .route(
            "/api/agents/:name",
            get(api::agents::get_agent).put(api::agents::update_agent),
        )
        // Search and stats
        .route("/api/search", get(api::search::search_articles))
        .route("/api/stats", get(api::stats::get_stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    // Public routes (no authentication)
    let public = Router::new()
        .merge(api::ui_routes())
        .merge(api::health_routes());

    Router::new().merge(protected).merge(public).with_state(state)
}

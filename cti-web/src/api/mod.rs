//! HTTP API handlers for cti-web

pub mod agents;
pub mod annotations;
pub mod articles;
pub mod auth;
pub mod health;
pub mod queue;
pub mod rules;
pub mod search;
pub mod sources;
pub mod stats;
pub mod ui;

pub use auth::auth_middleware;
pub use health::health_routes;
pub use ui::ui_routes;

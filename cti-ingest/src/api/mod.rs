//! HTTP API handlers for cti-ingest

pub mod health;
pub mod params;
pub mod scrape;
pub mod settings;
pub mod sse;
pub mod ui;
pub mod workflow;

pub use health::health_routes;
pub use params::params_routes;
pub use scrape::scrape_routes;
pub use settings::settings_routes;
pub use sse::event_stream;
pub use ui::ui_routes;
pub use workflow::workflow_routes;

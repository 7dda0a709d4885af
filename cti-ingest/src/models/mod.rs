//! Session models for cti-ingest

pub mod scrape_session;
pub mod workflow_session;

pub use scrape_session::{ScrapeError, ScrapeSession, ScrapeState};
pub use workflow_session::{WorkflowSession, WorkflowStage};

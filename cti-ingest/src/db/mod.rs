//! Database access for cti-ingest
//!
//! Repositories over the shared cti.db. All writes that can contend with
//! the dashboard service go through `retry_on_lock`.

pub mod articles;
pub mod queue;
pub mod rules;
pub mod scrape_sessions;
pub mod settings;
pub mod sources;
pub mod workflow_sessions;

/// Bound on lock-retry time for contended writes
pub const LOCK_WAIT_MS: u64 = 5000;

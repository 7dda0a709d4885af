//! Scrape session state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scrape session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeState {
    Running,
    Completed,
    Failed,
}

impl ScrapeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeState::Running => "running",
            ScrapeState::Completed => "completed",
            ScrapeState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> cti_common::Result<Self> {
        match s {
            "running" => Ok(ScrapeState::Running),
            "completed" => Ok(ScrapeState::Completed),
            "failed" => Ok(ScrapeState::Failed),
            other => Err(cti_common::Error::InvalidInput(format!(
                "Unknown scrape state: {}",
                other
            ))),
        }
    }
}

/// Per-source error recorded during a scrape session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeError {
    pub source: String,
    pub message: String,
}

/// One scrape run over one or more sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeSession {
    pub session_id: Uuid,
    pub state: ScrapeState,
    pub sources_polled: usize,
    pub entries_seen: usize,
    pub articles_stored: usize,
    pub articles_skipped: usize,
    pub errors: Vec<ScrapeError>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ScrapeSession {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            state: ScrapeState::Running,
            sources_polled: 0,
            entries_seen: 0,
            articles_stored: 0,
            articles_skipped: 0,
            errors: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn finish(&mut self, state: ScrapeState) {
        self.state = state;
        self.ended_at = Some(Utc::now());
    }

    pub fn record_error(&mut self, source: &str, message: String) {
        self.errors.push(ScrapeError {
            source: source.to_string(),
            message,
        });
    }
}

impl Default for ScrapeSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_running() {
        let session = ScrapeSession::new();
        assert_eq!(session.state, ScrapeState::Running);
        assert!(session.ended_at.is_none());
    }

    #[test]
    fn finish_sets_end_time() {
        let mut session = ScrapeSession::new();
        session.finish(ScrapeState::Completed);
        assert_eq!(session.state, ScrapeState::Completed);
        assert!(session.ended_at.is_some());
    }

    #[test]
    fn state_roundtrip() {
        for state in [ScrapeState::Running, ScrapeState::Completed, ScrapeState::Failed] {
            assert_eq!(ScrapeState::parse(state.as_str()).unwrap(), state);
        }
        assert!(ScrapeState::parse("paused").is_err());
    }
}

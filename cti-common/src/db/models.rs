//! Shared row models for the CTI Scraper database
//!
//! Timestamps are stored as RFC 3339 text, UUIDs as text, and
//! semi-structured agent output as JSON text columns. Row mapping is
//! explicit so both services share one decoding path.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// Analyst triage state of an article
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageStatus {
    New,
    InReview,
    Processed,
    Junk,
    Archived,
}

impl TriageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriageStatus::New => "new",
            TriageStatus::InReview => "in_review",
            TriageStatus::Processed => "processed",
            TriageStatus::Junk => "junk",
            TriageStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "new" => Ok(TriageStatus::New),
            "in_review" => Ok(TriageStatus::InReview),
            "processed" => Ok(TriageStatus::Processed),
            "junk" => Ok(TriageStatus::Junk),
            "archived" => Ok(TriageStatus::Archived),
            other => Err(Error::InvalidInput(format!(
                "Unknown triage status: {}",
                other
            ))),
        }
    }
}

/// Review state of a generated SIGMA rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Draft,
    Approved,
    Rejected,
    Duplicate,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Draft => "draft",
            RuleStatus::Approved => "approved",
            RuleStatus::Rejected => "rejected",
            RuleStatus::Duplicate => "duplicate",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(RuleStatus::Draft),
            "approved" => Ok(RuleStatus::Approved),
            "rejected" => Ok(RuleStatus::Rejected),
            "duplicate" => Ok(RuleStatus::Duplicate),
            other => Err(Error::InvalidInput(format!("Unknown rule status: {}", other))),
        }
    }
}

/// Review-queue entry state machine: pending -> claimed -> resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Pending,
    Claimed,
    Resolved,
}

impl QueueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueState::Pending => "pending",
            QueueState::Claimed => "claimed",
            QueueState::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(QueueState::Pending),
            "claimed" => Ok(QueueState::Claimed),
            "resolved" => Ok(QueueState::Resolved),
            other => Err(Error::InvalidInput(format!("Unknown queue state: {}", other))),
        }
    }
}

/// A scraped feed source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub source_id: Uuid,
    pub name: String,
    pub feed_url: String,
    pub site_url: Option<String>,
    pub active: bool,
    pub poll_interval_minutes: i64,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub consecutive_failures: i64,
    pub created_at: DateTime<Utc>,
}

impl Source {
    /// A source is due when active and its poll interval has elapsed
    /// (never-polled sources are always due).
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        match self.last_polled_at {
            None => true,
            Some(last) => {
                let elapsed = now.signed_duration_since(last);
                elapsed.num_minutes() >= self.poll_interval_minutes
            }
        }
    }

    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            source_id: parse_uuid(row.get("source_id"))?,
            name: row.get("name"),
            feed_url: row.get("feed_url"),
            site_url: row.get("site_url"),
            active: row.get::<i64, _>("active") != 0,
            poll_interval_minutes: row.get("poll_interval_minutes"),
            last_polled_at: parse_opt_timestamp(row.get("last_polled_at"))?,
            consecutive_failures: row.get("consecutive_failures"),
            created_at: parse_timestamp(row.get("created_at"))?,
        })
    }
}

/// A stored article
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub article_id: Uuid,
    pub source_id: Option<Uuid>,
    pub title: String,
    pub url: String,
    pub content: String,
    pub content_hash: String,
    pub summary: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub scraped_at: DateTime<Utc>,
    pub triage_status: TriageStatus,
    /// Target platforms from the workflow OS-detection stage (JSON array)
    pub os_targets: Option<String>,
    /// Extracted indicators (JSON object)
    pub indicators: Option<String>,
    /// Extracted TTPs (JSON array)
    pub ttps: Option<String>,
}

impl Article {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            article_id: parse_uuid(row.get("article_id"))?,
            source_id: parse_opt_uuid(row.get("source_id"))?,
            title: row.get("title"),
            url: row.get("url"),
            content: row.get("content"),
            content_hash: row.get("content_hash"),
            summary: row.get("summary"),
            published_at: parse_opt_timestamp(row.get("published_at"))?,
            scraped_at: parse_timestamp(row.get("scraped_at"))?,
            triage_status: TriageStatus::parse(&row.get::<String, _>("triage_status"))?,
            os_targets: row.get("os_targets"),
            indicators: row.get("indicators"),
            ttps: row.get("ttps"),
        })
    }
}

/// Analyst note attached to an article
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub annotation_id: Uuid,
    pub article_id: Uuid,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Annotation {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            annotation_id: parse_uuid(row.get("annotation_id"))?,
            article_id: parse_uuid(row.get("article_id"))?,
            author: row.get("author"),
            body: row.get("body"),
            created_at: parse_timestamp(row.get("created_at"))?,
            updated_at: parse_opt_timestamp(row.get("updated_at"))?,
        })
    }
}

/// A generated (or imported) SIGMA detection rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigmaRule {
    pub rule_id: Uuid,
    pub article_id: Option<Uuid>,
    pub title: String,
    pub yaml: String,
    pub status: RuleStatus,
    pub duplicate_of: Option<Uuid>,
    pub similarity: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SigmaRule {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            rule_id: parse_uuid(row.get("rule_id"))?,
            article_id: parse_opt_uuid(row.get("article_id"))?,
            title: row.get("title"),
            yaml: row.get("yaml"),
            status: RuleStatus::parse(&row.get::<String, _>("status"))?,
            duplicate_of: parse_opt_uuid(row.get("duplicate_of"))?,
            similarity: row.get("similarity"),
            created_at: parse_timestamp(row.get("created_at"))?,
            updated_at: parse_opt_timestamp(row.get("updated_at"))?,
        })
    }
}

/// Analyst review queue entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub entry_id: Uuid,
    pub article_id: Uuid,
    pub rule_id: Option<Uuid>,
    pub priority: i64,
    pub state: QueueState,
    pub claimed_by: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            entry_id: parse_uuid(row.get("entry_id"))?,
            article_id: parse_uuid(row.get("article_id"))?,
            rule_id: parse_opt_uuid(row.get("rule_id"))?,
            priority: row.get("priority"),
            state: QueueState::parse(&row.get::<String, _>("state"))?,
            claimed_by: row.get("claimed_by"),
            enqueued_at: parse_timestamp(row.get("enqueued_at"))?,
            resolved_at: parse_opt_timestamp(row.get("resolved_at"))?,
        })
    }
}

/// Per-agent LLM configuration (prompt template, model, token budget)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub model: String,
    pub max_tokens: i64,
    pub prompt_template: String,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AgentConfig {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            name: row.get("name"),
            model: row.get("model"),
            max_tokens: row.get("max_tokens"),
            prompt_template: row.get("prompt_template"),
            updated_at: parse_opt_timestamp(row.get("updated_at"))?,
        })
    }
}

/// Parse a required RFC 3339 timestamp column
pub fn parse_timestamp(s: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", s, e)))
}

/// Parse a nullable RFC 3339 timestamp column
pub fn parse_opt_timestamp(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.map(parse_timestamp).transpose()
}

/// Parse a required UUID column
pub fn parse_uuid(s: String) -> Result<Uuid> {
    Uuid::parse_str(&s).map_err(|e| Error::Internal(format!("Failed to parse uuid '{}': {}", s, e)))
}

/// Parse a nullable UUID column
pub fn parse_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
    s.map(parse_uuid).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triage_status_roundtrip() {
        for status in [
            TriageStatus::New,
            TriageStatus::InReview,
            TriageStatus::Processed,
            TriageStatus::Junk,
            TriageStatus::Archived,
        ] {
            assert_eq!(TriageStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(TriageStatus::parse("bogus").is_err());
    }

    #[test]
    fn queue_state_roundtrip() {
        for state in [QueueState::Pending, QueueState::Claimed, QueueState::Resolved] {
            assert_eq!(QueueState::parse(state.as_str()).unwrap(), state);
        }
    }

    #[test]
    fn serde_uses_snake_case_tags() {
        let json = serde_json::to_string(&TriageStatus::InReview).unwrap();
        assert_eq!(json, "\"in_review\"");
        let json = serde_json::to_string(&RuleStatus::Duplicate).unwrap();
        assert_eq!(json, "\"duplicate\"");
    }

    #[test]
    fn source_due_computation() {
        let now = Utc::now();
        let mut source = Source {
            source_id: Uuid::new_v4(),
            name: "Vendor blog".to_string(),
            feed_url: "https://example.com/feed.xml".to_string(),
            site_url: None,
            active: true,
            poll_interval_minutes: 60,
            last_polled_at: None,
            consecutive_failures: 0,
            created_at: now,
        };

        // Never polled: always due.
        assert!(source.is_due(now));

        // Polled 10 minutes ago with a 60 minute interval: not due.
        source.last_polled_at = Some(now - chrono::Duration::minutes(10));
        assert!(!source.is_due(now));

        // Polled 61 minutes ago: due.
        source.last_polled_at = Some(now - chrono::Duration::minutes(61));
        assert!(source.is_due(now));

        // Inactive sources are never due.
        source.active = false;
        assert!(!source.is_due(now));
    }

    #[test]
    fn timestamp_parse_rejects_garbage() {
        assert!(parse_timestamp("not-a-time".to_string()).is_err());
        assert!(parse_opt_timestamp(None).unwrap().is_none());
        let ts = parse_timestamp("2026-01-15T10:30:00+00:00".to_string()).unwrap();
        assert_eq!(ts.timezone(), Utc);
    }
}

//! Event types and EventBus for the CTI Scraper services
//!
//! Events are broadcast via the EventBus and serialized for SSE
//! transmission to connected dashboard clients. All services share this
//! central enum for type safety and exhaustive matching.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// CTI Scraper event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CtiEvent {
    /// Scrape session started (all due sources or a single source)
    ScrapeSessionStarted {
        session_id: Uuid,
        source_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One source finished polling within a scrape session
    ///
    /// Triggers:
    /// - SSE: update per-source progress rows
    /// - Source health: reset or increment failure counter
    SourcePolled {
        session_id: Uuid,
        source_id: Uuid,
        source_name: String,
        entries_seen: usize,
        articles_stored: usize,
        articles_skipped: usize,
        failed: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// New article stored by the scraper
    ArticleStored {
        article_id: Uuid,
        source_id: Option<Uuid>,
        title: String,
        url: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Scrape session finished
    ScrapeSessionCompleted {
        session_id: Uuid,
        sources_polled: usize,
        articles_stored: usize,
        duration_seconds: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Scrape session aborted with an error
    ScrapeSessionFailed {
        session_id: Uuid,
        error_message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Agentic workflow session started for an article
    WorkflowSessionStarted {
        session_id: Uuid,
        article_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Workflow entered a new stage
    WorkflowStageStarted {
        session_id: Uuid,
        article_id: Uuid,
        stage: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Workflow stage finished
    ///
    /// `detail` carries a short human-readable result summary
    /// (e.g. "junk score 0.12" or "4 indicators, 2 techniques").
    WorkflowStageCompleted {
        session_id: Uuid,
        article_id: Uuid,
        stage: String,
        detail: String,
        input_tokens: u64,
        output_tokens: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Workflow completed through all stages
    WorkflowSessionCompleted {
        session_id: Uuid,
        article_id: Uuid,
        rules_generated: usize,
        rules_duplicate: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Workflow rejected the article at the junk filter
    WorkflowSessionDiscarded {
        session_id: Uuid,
        article_id: Uuid,
        junk_score: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Workflow failed with an error
    WorkflowSessionFailed {
        session_id: Uuid,
        article_id: Uuid,
        error_message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Workflow cancelled by the user
    WorkflowSessionCancelled {
        session_id: Uuid,
        article_id: Uuid,
        stage: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Entry added to the analyst review queue
    QueueEntryAdded {
        entry_id: Uuid,
        article_id: Uuid,
        rule_id: Option<Uuid>,
        priority: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl CtiEvent {
    /// Get event type as string for SSE event naming and filtering
    pub fn event_type(&self) -> &str {
        match self {
            CtiEvent::ScrapeSessionStarted { .. } => "ScrapeSessionStarted",
            CtiEvent::SourcePolled { .. } => "SourcePolled",
            CtiEvent::ArticleStored { .. } => "ArticleStored",
            CtiEvent::ScrapeSessionCompleted { .. } => "ScrapeSessionCompleted",
            CtiEvent::ScrapeSessionFailed { .. } => "ScrapeSessionFailed",
            CtiEvent::WorkflowSessionStarted { .. } => "WorkflowSessionStarted",
            CtiEvent::WorkflowStageStarted { .. } => "WorkflowStageStarted",
            CtiEvent::WorkflowStageCompleted { .. } => "WorkflowStageCompleted",
            CtiEvent::WorkflowSessionCompleted { .. } => "WorkflowSessionCompleted",
            CtiEvent::WorkflowSessionDiscarded { .. } => "WorkflowSessionDiscarded",
            CtiEvent::WorkflowSessionFailed { .. } => "WorkflowSessionFailed",
            CtiEvent::WorkflowSessionCancelled { .. } => "WorkflowSessionCancelled",
            CtiEvent::QueueEntryAdded { .. } => "QueueEntryAdded",
        }
    }
}

/// Central event distribution bus for application-wide events
///
/// Backed by tokio::broadcast, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CtiEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    ///
    /// Recommended: 1000 for services, 10-100 for tests.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<CtiEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: CtiEvent) -> Result<usize, broadcast::error::SendError<CtiEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Used for progress events where it's acceptable that no component
    /// is currently listening.
    pub fn emit_lossy(&self, event: CtiEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> CtiEvent {
        CtiEvent::ArticleStored {
            article_id: Uuid::new_v4(),
            source_id: Some(Uuid::new_v4()),
            title: "Test campaign report".to_string(),
            url: "https://example.com/post".to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_emit_and_receive() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(sample_event()).expect("emit should succeed");

        let received = rx.try_recv().expect("should receive event");
        assert_eq!(received.event_type(), "ArticleStored");
    }

    #[test]
    fn test_eventbus_emit_lossy_without_subscribers() {
        let bus = EventBus::new(2);
        // No subscribers; emit_lossy must not panic or error.
        for _ in 0..10 {
            bus.emit_lossy(sample_event());
        }
    }

    #[test]
    fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(sample_event()).expect("emit should succeed");

        assert_eq!(rx1.try_recv().unwrap().event_type(), "ArticleStored");
        assert_eq!(rx2.try_recv().unwrap().event_type(), "ArticleStored");
    }

    #[test]
    fn test_event_serialization_tags_type() {
        let event = CtiEvent::WorkflowStageCompleted {
            session_id: Uuid::new_v4(),
            article_id: Uuid::new_v4(),
            stage: "ranking".to_string(),
            detail: "score 72".to_string(),
            input_tokens: 512,
            output_tokens: 64,
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"WorkflowStageCompleted\""));
        assert!(json.contains("\"stage\":\"ranking\""));

        let back: CtiEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "WorkflowStageCompleted");
    }

    #[test]
    fn test_event_type_covers_session_lifecycle() {
        let id = Uuid::new_v4();
        let article = Uuid::new_v4();
        let ts = chrono::Utc::now();

        let events = vec![
            (
                CtiEvent::WorkflowSessionStarted {
                    session_id: id,
                    article_id: article,
                    timestamp: ts,
                },
                "WorkflowSessionStarted",
            ),
            (
                CtiEvent::WorkflowSessionDiscarded {
                    session_id: id,
                    article_id: article,
                    junk_score: 0.1,
                    timestamp: ts,
                },
                "WorkflowSessionDiscarded",
            ),
            (
                CtiEvent::WorkflowSessionCancelled {
                    session_id: id,
                    article_id: article,
                    stage: "extraction".to_string(),
                    timestamp: ts,
                },
                "WorkflowSessionCancelled",
            ),
        ];

        for (event, expected) in events {
            assert_eq!(event.event_type(), expected);
        }
    }
}

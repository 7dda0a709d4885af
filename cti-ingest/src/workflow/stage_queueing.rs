//! Queueing stage: surface the article and its new rules to analysts
//!
//! Priority comes from the ranking score, so high-relevance articles
//! float to the top of the review queue.

use chrono::Utc;
use cti_common::db::models::{Article, QueueEntry, QueueState};
use cti_common::events::CtiEvent;
use cti_common::Result;
use uuid::Uuid;

use crate::db;
use crate::models::WorkflowSession;

use super::WorkflowOrchestrator;

impl WorkflowOrchestrator {
    pub(super) async fn stage_queueing(
        &self,
        session: &mut WorkflowSession,
        article: &Article,
        new_rule_ids: &[Uuid],
    ) -> Result<String> {
        let priority = session.ranking_score.unwrap_or(0);
        let mut added = 0usize;

        // Article-level entry first, then one per surviving rule.
        let mut entries = vec![None];
        entries.extend(new_rule_ids.iter().copied().map(Some));

        for rule_id in entries {
            let entry = QueueEntry {
                entry_id: Uuid::new_v4(),
                article_id: article.article_id,
                rule_id,
                priority,
                state: QueueState::Pending,
                claimed_by: None,
                enqueued_at: Utc::now(),
                resolved_at: None,
            };

            if db::queue::enqueue(&self.db, &entry).await? {
                added += 1;
                self.event_bus.emit_lossy(CtiEvent::QueueEntryAdded {
                    entry_id: entry.entry_id,
                    article_id: entry.article_id,
                    rule_id: entry.rule_id,
                    priority: entry.priority,
                    timestamp: Utc::now(),
                });
            }
        }

        Ok(format!("{} queue entries", added))
    }
}

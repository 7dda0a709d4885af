//! Similarity stage: compare candidates against the rule store
//!
//! A candidate above the similarity threshold is stored with status
//! Duplicate and linked to its nearest rule; everything else is stored
//! as a Draft. Drafts stored earlier in the same pass join the
//! comparison set so near-identical candidates from one article don't
//! both land as drafts.

use chrono::Utc;
use cti_common::db::models::{RuleStatus, SigmaRule};
use cti_common::similarity;
use cti_common::Result;
use uuid::Uuid;

use crate::db;
use crate::models::WorkflowSession;
use crate::sigma::SigmaCandidate;

use super::WorkflowOrchestrator;

impl WorkflowOrchestrator {
    pub(super) async fn stage_similarity(
        &self,
        session: &mut WorkflowSession,
        candidates: Vec<SigmaCandidate>,
    ) -> Result<(Vec<Uuid>, String)> {
        let mut existing = db::rules::list_comparison_targets(&self.db).await?;
        let mut new_rule_ids = Vec::new();
        let mut duplicates = 0usize;

        for candidate in candidates {
            let best = similarity::best_match(&candidate.title, &candidate.yaml, &existing);

            let (status, duplicate_of, score) = match &best {
                Some(m) if m.score >= self.params.similarity_threshold => {
                    tracing::info!(
                        session_id = %session.session_id,
                        title = %candidate.title,
                        nearest = %m.title,
                        score = m.score,
                        "Candidate rule flagged duplicate"
                    );
                    (RuleStatus::Duplicate, Some(m.rule_id), Some(m.score))
                }
                Some(m) => (RuleStatus::Draft, None, Some(m.score)),
                None => (RuleStatus::Draft, None, None),
            };

            let rule = SigmaRule {
                rule_id: Uuid::new_v4(),
                article_id: Some(session.article_id),
                title: candidate.title,
                yaml: candidate.yaml,
                status,
                duplicate_of,
                similarity: score,
                created_at: Utc::now(),
                updated_at: None,
            };

            db::rules::insert_rule(&self.db, &rule).await?;

            if status == RuleStatus::Duplicate {
                duplicates += 1;
                session.rules_duplicate += 1;
            } else {
                session.rules_generated += 1;
                new_rule_ids.push(rule.rule_id);
                existing.push(rule);
            }
        }

        let detail = format!("{} new, {} duplicate", new_rule_ids.len(), duplicates);
        Ok((new_rule_ids, detail))
    }
}

//! Rule generation stage: one SIGMA rule per extracted behavior
//!
//! Capped by `max_rules_per_article`. A rule that fails validation is
//! logged and skipped; the stage succeeds as long as the calls succeed.

use cti_common::db::models::Article;
use cti_common::Result;

use crate::llm::prompts;
use crate::models::WorkflowSession;
use crate::sigma::{self, SigmaCandidate};

use super::WorkflowOrchestrator;

impl WorkflowOrchestrator {
    pub(super) async fn stage_rule_generation(
        &self,
        session: &mut WorkflowSession,
        article: &Article,
    ) -> Result<Vec<SigmaCandidate>> {
        if session.ttps.is_empty() {
            tracing::info!(
                session_id = %session.session_id,
                "No extracted behaviors, skipping rule generation"
            );
            return Ok(Vec::new());
        }

        let max_rules = self.params.max_rules_per_article.max(0) as usize;
        let findings = session.ttps.clone();
        let mut candidates = Vec::new();

        for finding in findings.iter().take(max_rules) {
            let user = prompts::build_rule_prompt(
                &article.title,
                &finding.technique_id,
                &finding.description,
            );
            let text = self
                .run_agent_text(session, prompts::RULE_GENERATION, &user)
                .await?;

            match sigma::validate_sigma(&text) {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => {
                    tracing::warn!(
                        session_id = %session.session_id,
                        technique = %finding.technique_id,
                        error = %e,
                        "Generated rule rejected by validation"
                    );
                }
            }
        }

        if findings.len() > max_rules {
            tracing::info!(
                session_id = %session.session_id,
                findings = findings.len(),
                max_rules,
                "Rule generation capped"
            );
        }

        Ok(candidates)
    }
}

//! Junk filter stage: score whether the article is substantive threat intel

use cti_common::db::models::Article;
use cti_common::Result;
use serde::Deserialize;

use crate::llm::prompts;
use crate::models::WorkflowSession;

use super::WorkflowOrchestrator;

#[derive(Debug, Deserialize)]
struct JunkScoreResponse {
    score: f64,
    #[serde(default)]
    reason: Option<String>,
}

impl WorkflowOrchestrator {
    pub(super) async fn stage_junk_filter(
        &self,
        session: &mut WorkflowSession,
        article: &Article,
    ) -> Result<f64> {
        let user = prompts::build_article_prompt(&article.title, &article.content);
        let response: JunkScoreResponse = self
            .run_agent_json(session, prompts::JUNK_FILTER, &user)
            .await?;

        let score = response.score.clamp(0.0, 1.0);
        session.junk_score = Some(score);

        if let Some(reason) = &response.reason {
            tracing::debug!(
                session_id = %session.session_id,
                score,
                reason,
                "Junk filter verdict"
            );
        }

        Ok(score)
    }
}

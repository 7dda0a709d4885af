//! Ranking stage: rate how actionable the article is for detection work

use cti_common::db::models::Article;
use cti_common::Result;
use serde::Deserialize;

use crate::llm::prompts;
use crate::models::WorkflowSession;

use super::WorkflowOrchestrator;

#[derive(Debug, Deserialize)]
struct RankingResponse {
    score: i64,
    #[serde(default)]
    reason: Option<String>,
}

impl WorkflowOrchestrator {
    pub(super) async fn stage_ranking(
        &self,
        session: &mut WorkflowSession,
        article: &Article,
    ) -> Result<i64> {
        let user = prompts::build_article_prompt(&article.title, &article.content);
        let response: RankingResponse = self
            .run_agent_json(session, prompts::RANKING, &user)
            .await?;

        let score = response.score.clamp(0, 100);
        session.ranking_score = Some(score);

        if let Some(reason) = &response.reason {
            tracing::debug!(
                session_id = %session.session_id,
                score,
                reason,
                "Ranking verdict"
            );
        }

        Ok(score)
    }
}

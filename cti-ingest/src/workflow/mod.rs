//! Agentic workflow orchestration
//!
//! # Stage Progression
//! OS_DETECTION → JUNK_FILTER → RANKING → EXTRACTION → RULE_GENERATION
//! → SIMILARITY_SEARCH → QUEUEING → COMPLETED
//!
//! Each stage is handled by a dedicated `stage_*` method in its own
//! module. Session state is persisted after every stage and progress is
//! broadcast on the event bus for SSE. Cancellation is checked between
//! stages; a cancelled session keeps its partial results.

pub mod ioc;
pub mod ttp;

mod stage_extraction;
mod stage_junk_filter;
mod stage_os_detection;
mod stage_queueing;
mod stage_ranking;
mod stage_rule_generation;
mod stage_similarity;

use chrono::Utc;
use cti_common::db::models::{Article, TriageStatus};
use cti_common::events::{CtiEvent, EventBus};
use cti_common::params::PipelineParams;
use cti_common::{Error, Result};
use serde::de::DeserializeOwned;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::db;
use crate::llm::{parse, prompts, LlmClient};
use crate::models::{WorkflowSession, WorkflowStage};

/// Workflow orchestrator service
pub struct WorkflowOrchestrator {
    db: SqlitePool,
    event_bus: EventBus,
    llm: LlmClient,
    params: PipelineParams,
}

impl WorkflowOrchestrator {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        llm: LlmClient,
        params: PipelineParams,
    ) -> Self {
        Self {
            db,
            event_bus,
            llm,
            params,
        }
    }

    /// Execute the complete workflow for one article
    pub async fn execute(
        &self,
        mut session: WorkflowSession,
        cancel_token: CancellationToken,
    ) -> Result<WorkflowSession> {
        let article = db::articles::get_article(&self.db, session.article_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Article not found: {}", session.article_id)))?;

        tracing::info!(
            session_id = %session.session_id,
            article_id = %session.article_id,
            "Starting workflow"
        );

        self.event_bus.emit_lossy(CtiEvent::WorkflowSessionStarted {
            session_id: session.session_id,
            article_id: session.article_id,
            timestamp: Utc::now(),
        });

        db::articles::set_triage_status(&self.db, article.article_id, TriageStatus::InReview)
            .await?;

        // Stage 1: OS detection
        if cancel_token.is_cancelled() {
            return self.finish_cancelled(session).await;
        }
        self.begin_stage(&mut session, WorkflowStage::OsDetection).await?;
        let usage_mark = self.usage_mark(&session);
        let detail = self.stage_os_detection(&mut session, &article).await?;
        self.complete_stage(&session, detail, usage_mark).await?;

        // Stage 2: Junk filter
        if cancel_token.is_cancelled() {
            return self.finish_cancelled(session).await;
        }
        self.begin_stage(&mut session, WorkflowStage::JunkFilter).await?;
        let usage_mark = self.usage_mark(&session);
        let junk_score = self.stage_junk_filter(&mut session, &article).await?;
        self.complete_stage(&session, format!("junk score {:.2}", junk_score), usage_mark)
            .await?;

        if junk_score < self.params.junk_threshold {
            return self.finish_discarded(session, junk_score).await;
        }

        // Stage 3: Ranking
        if cancel_token.is_cancelled() {
            return self.finish_cancelled(session).await;
        }
        self.begin_stage(&mut session, WorkflowStage::Ranking).await?;
        let usage_mark = self.usage_mark(&session);
        let ranking_score = self.stage_ranking(&mut session, &article).await?;
        self.complete_stage(&session, format!("relevance {}", ranking_score), usage_mark)
            .await?;

        if ranking_score < self.params.ranking_threshold {
            tracing::info!(
                session_id = %session.session_id,
                ranking_score,
                threshold = self.params.ranking_threshold,
                "Ranking below threshold, skipping extraction"
            );
            return self.finish_completed(session, &article).await;
        }

        // Stage 4: Multi-agent extraction
        if cancel_token.is_cancelled() {
            return self.finish_cancelled(session).await;
        }
        self.begin_stage(&mut session, WorkflowStage::Extraction).await?;
        let usage_mark = self.usage_mark(&session);
        let detail = self.stage_extraction(&mut session, &article).await?;
        self.complete_stage(&session, detail, usage_mark).await?;

        // Stage 5: SIGMA rule generation
        if cancel_token.is_cancelled() {
            return self.finish_cancelled(session).await;
        }
        self.begin_stage(&mut session, WorkflowStage::RuleGeneration).await?;
        let usage_mark = self.usage_mark(&session);
        let candidates = self.stage_rule_generation(&mut session, &article).await?;
        self.complete_stage(
            &session,
            format!("{} rule candidates", candidates.len()),
            usage_mark,
        )
        .await?;

        // Stage 6: Similarity search against the rule store
        if cancel_token.is_cancelled() {
            return self.finish_cancelled(session).await;
        }
        self.begin_stage(&mut session, WorkflowStage::SimilaritySearch).await?;
        let usage_mark = self.usage_mark(&session);
        let (new_rule_ids, detail) = self.stage_similarity(&mut session, candidates).await?;
        self.complete_stage(&session, detail, usage_mark).await?;

        // Stage 7: Review queueing
        if cancel_token.is_cancelled() {
            return self.finish_cancelled(session).await;
        }
        self.begin_stage(&mut session, WorkflowStage::Queueing).await?;
        let usage_mark = self.usage_mark(&session);
        let detail = self.stage_queueing(&mut session, &article, &new_rule_ids).await?;
        self.complete_stage(&session, detail, usage_mark).await?;

        self.finish_completed(session, &article).await
    }

    /// Mark a failed session and return the article to triage
    ///
    /// Called by the background task when `execute` errors, so the
    /// session never sticks in a non-terminal stage.
    pub async fn handle_failure(
        &self,
        mut session: WorkflowSession,
        error: &Error,
    ) -> Result<()> {
        session.error = Some(error.to_string());
        session.transition_to(WorkflowStage::Failed);
        db::workflow_sessions::save_session(&self.db, &session).await?;
        db::articles::set_triage_status(&self.db, session.article_id, TriageStatus::New).await?;

        self.event_bus.emit_lossy(CtiEvent::WorkflowSessionFailed {
            session_id: session.session_id,
            article_id: session.article_id,
            error_message: error.to_string(),
            timestamp: Utc::now(),
        });

        Ok(())
    }

    // ------------------------------------------------------------------
    // Stage bookkeeping
    // ------------------------------------------------------------------

    async fn begin_stage(
        &self,
        session: &mut WorkflowSession,
        stage: WorkflowStage,
    ) -> Result<()> {
        session.transition_to(stage);
        db::workflow_sessions::save_session(&self.db, session).await?;

        self.event_bus.emit_lossy(CtiEvent::WorkflowStageStarted {
            session_id: session.session_id,
            article_id: session.article_id,
            stage: stage.as_str().to_string(),
            timestamp: Utc::now(),
        });

        Ok(())
    }

    fn usage_mark(&self, session: &WorkflowSession) -> (i64, i64) {
        (session.input_tokens, session.output_tokens)
    }

    async fn complete_stage(
        &self,
        session: &WorkflowSession,
        detail: String,
        usage_mark: (i64, i64),
    ) -> Result<()> {
        db::workflow_sessions::save_session(&self.db, session).await?;

        self.event_bus.emit_lossy(CtiEvent::WorkflowStageCompleted {
            session_id: session.session_id,
            article_id: session.article_id,
            stage: session.stage.as_str().to_string(),
            detail,
            input_tokens: (session.input_tokens - usage_mark.0).max(0) as u64,
            output_tokens: (session.output_tokens - usage_mark.1).max(0) as u64,
            timestamp: Utc::now(),
        });

        Ok(())
    }

    // ------------------------------------------------------------------
    // Terminal transitions
    // ------------------------------------------------------------------

    async fn finish_completed(
        &self,
        mut session: WorkflowSession,
        article: &Article,
    ) -> Result<WorkflowSession> {
        session.transition_to(WorkflowStage::Completed);
        db::workflow_sessions::save_session(&self.db, &session).await?;
        db::articles::set_triage_status(&self.db, article.article_id, TriageStatus::Processed)
            .await?;

        self.event_bus.emit_lossy(CtiEvent::WorkflowSessionCompleted {
            session_id: session.session_id,
            article_id: session.article_id,
            rules_generated: session.rules_generated.max(0) as usize,
            rules_duplicate: session.rules_duplicate.max(0) as usize,
            timestamp: Utc::now(),
        });

        tracing::info!(
            session_id = %session.session_id,
            rules = session.rules_generated,
            duplicates = session.rules_duplicate,
            "Workflow completed"
        );

        Ok(session)
    }

    async fn finish_discarded(
        &self,
        mut session: WorkflowSession,
        junk_score: f64,
    ) -> Result<WorkflowSession> {
        session.transition_to(WorkflowStage::Discarded);
        db::workflow_sessions::save_session(&self.db, &session).await?;
        db::articles::set_triage_status(&self.db, session.article_id, TriageStatus::Junk).await?;

        self.event_bus.emit_lossy(CtiEvent::WorkflowSessionDiscarded {
            session_id: session.session_id,
            article_id: session.article_id,
            junk_score,
            timestamp: Utc::now(),
        });

        tracing::info!(
            session_id = %session.session_id,
            junk_score,
            "Workflow discarded article at junk filter"
        );

        Ok(session)
    }

    async fn finish_cancelled(&self, mut session: WorkflowSession) -> Result<WorkflowSession> {
        let stage = session.stage;
        session.transition_to(WorkflowStage::Cancelled);
        db::workflow_sessions::save_session(&self.db, &session).await?;
        db::articles::set_triage_status(&self.db, session.article_id, TriageStatus::New).await?;

        self.event_bus.emit_lossy(CtiEvent::WorkflowSessionCancelled {
            session_id: session.session_id,
            article_id: session.article_id,
            stage: stage.as_str().to_string(),
            timestamp: Utc::now(),
        });

        tracing::info!(session_id = %session.session_id, "Workflow cancelled");

        Ok(session)
    }

    // ------------------------------------------------------------------
    // Agent call helpers
    // ------------------------------------------------------------------

    /// Run an agent expecting a JSON object reply.
    ///
    /// A malformed reply gets one re-prompt that quotes the parse error;
    /// a second failure fails the stage.
    async fn run_agent_json<T: DeserializeOwned>(
        &self,
        session: &mut WorkflowSession,
        agent: &str,
        user: &str,
    ) -> Result<T> {
        let config = prompts::load_agent(&self.db, agent, self.llm.default_model()).await?;

        let completion = self
            .llm
            .complete(
                &config.model,
                config.max_tokens as u32,
                &config.prompt_template,
                user,
            )
            .await
            .map_err(|e| Error::Llm(format!("{}: {}", agent, e)))?;
        session.add_usage(completion.input_tokens, completion.output_tokens);

        match parse::parse_json_response(&completion.text) {
            Ok(value) => Ok(value),
            Err(parse_err) => {
                tracing::warn!(
                    agent,
                    error = %parse_err,
                    "Malformed JSON from model, re-prompting once"
                );

                let reprompt = format!(
                    "{}\n\nYour previous reply could not be parsed as JSON ({}). \
                     Respond with the JSON object only.",
                    user, parse_err
                );

                let retry = self
                    .llm
                    .complete(
                        &config.model,
                        config.max_tokens as u32,
                        &config.prompt_template,
                        &reprompt,
                    )
                    .await
                    .map_err(|e| Error::Llm(format!("{}: {}", agent, e)))?;
                session.add_usage(retry.input_tokens, retry.output_tokens);

                parse::parse_json_response(&retry.text)
                    .map_err(|e| Error::Llm(format!("{}: {}", agent, e)))
            }
        }
    }

    /// Run an agent expecting free text (rule generation)
    async fn run_agent_text(
        &self,
        session: &mut WorkflowSession,
        agent: &str,
        user: &str,
    ) -> Result<String> {
        let config = prompts::load_agent(&self.db, agent, self.llm.default_model()).await?;

        let completion = self
            .llm
            .complete(
                &config.model,
                config.max_tokens as u32,
                &config.prompt_template,
                user,
            )
            .await
            .map_err(|e| Error::Llm(format!("{}: {}", agent, e)))?;
        session.add_usage(completion.input_tokens, completion.output_tokens);

        Ok(completion.text)
    }
}

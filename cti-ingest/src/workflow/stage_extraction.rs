//! Extraction stage: multi-agent IOC and TTP extraction
//!
//! The regex pre-pass runs first; the IOC agent's findings are merged
//! into it. The TTP agent maps behaviors to ATT&CK techniques; those
//! findings feed rule generation downstream.

use cti_common::db::models::Article;
use cti_common::{Error, Result};
use serde::Deserialize;

use crate::db;
use crate::llm::prompts;
use crate::models::WorkflowSession;

use super::ioc::{self, IndicatorSet};
use super::ttp::{self, TtpFinding};
use super::WorkflowOrchestrator;

#[derive(Debug, Deserialize)]
struct TtpResponse {
    #[serde(default)]
    ttps: Vec<TtpFinding>,
}

impl WorkflowOrchestrator {
    pub(super) async fn stage_extraction(
        &self,
        session: &mut WorkflowSession,
        article: &Article,
    ) -> Result<String> {
        let user = prompts::build_article_prompt(&article.title, &article.content);

        let mut indicators = ioc::regex_prepass(&article.content);

        let llm_indicators: IndicatorSet = self
            .run_agent_json(session, prompts::IOC_EXTRACTION, &user)
            .await?;
        indicators.merge(llm_indicators);

        let ttp_response: TtpResponse = self
            .run_agent_json(session, prompts::TTP_EXTRACTION, &user)
            .await?;
        let findings = ttp::sanitize_findings(ttp_response.ttps);

        session.indicators = Some(indicators.clone());
        session.ttps = findings.clone();

        // Persist the JSON blobs onto the article row for the dashboard.
        let os_targets = serde_json::to_string(&session.os_targets)
            .map_err(|e| Error::Internal(format!("Failed to serialize os_targets: {}", e)))?;
        let indicators_json = serde_json::to_string(&indicators)
            .map_err(|e| Error::Internal(format!("Failed to serialize indicators: {}", e)))?;
        let ttps_json = serde_json::to_string(&findings)
            .map_err(|e| Error::Internal(format!("Failed to serialize ttps: {}", e)))?;

        db::articles::update_analysis(
            &self.db,
            article.article_id,
            Some(&os_targets),
            Some(&indicators_json),
            Some(&ttps_json),
        )
        .await?;

        Ok(format!(
            "{} indicators, {} techniques",
            indicators.total(),
            findings.len()
        ))
    }
}

//! Agentic workflow session state
//!
//! Stage progression:
//! OsDetection -> JunkFilter -> Ranking -> Extraction -> RuleGeneration
//!   -> SimilaritySearch -> Queueing -> Completed
//!
//! Terminal alternatives: Discarded (junk filter rejected the article),
//! Failed (stage error) and Cancelled (user cancellation).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::ioc::IndicatorSet;
use crate::workflow::ttp::TtpFinding;

/// Workflow pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    OsDetection,
    JunkFilter,
    Ranking,
    Extraction,
    RuleGeneration,
    SimilaritySearch,
    Queueing,
    Completed,
    Discarded,
    Failed,
    Cancelled,
}

impl WorkflowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStage::OsDetection => "os_detection",
            WorkflowStage::JunkFilter => "junk_filter",
            WorkflowStage::Ranking => "ranking",
            WorkflowStage::Extraction => "extraction",
            WorkflowStage::RuleGeneration => "rule_generation",
            WorkflowStage::SimilaritySearch => "similarity_search",
            WorkflowStage::Queueing => "queueing",
            WorkflowStage::Completed => "completed",
            WorkflowStage::Discarded => "discarded",
            WorkflowStage::Failed => "failed",
            WorkflowStage::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> cti_common::Result<Self> {
        match s {
            "os_detection" => Ok(WorkflowStage::OsDetection),
            "junk_filter" => Ok(WorkflowStage::JunkFilter),
            "ranking" => Ok(WorkflowStage::Ranking),
            "extraction" => Ok(WorkflowStage::Extraction),
            "rule_generation" => Ok(WorkflowStage::RuleGeneration),
            "similarity_search" => Ok(WorkflowStage::SimilaritySearch),
            "queueing" => Ok(WorkflowStage::Queueing),
            "completed" => Ok(WorkflowStage::Completed),
            "discarded" => Ok(WorkflowStage::Discarded),
            "failed" => Ok(WorkflowStage::Failed),
            "cancelled" => Ok(WorkflowStage::Cancelled),
            other => Err(cti_common::Error::InvalidInput(format!(
                "Unknown workflow stage: {}",
                other
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStage::Completed
                | WorkflowStage::Discarded
                | WorkflowStage::Failed
                | WorkflowStage::Cancelled
        )
    }
}

/// One workflow run over one article
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSession {
    pub session_id: Uuid,
    pub article_id: Uuid,
    pub stage: WorkflowStage,
    pub os_targets: Vec<String>,
    pub junk_score: Option<f64>,
    pub ranking_score: Option<i64>,
    pub indicators: Option<IndicatorSet>,
    pub ttps: Vec<TtpFinding>,
    pub rules_generated: i64,
    pub rules_duplicate: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl WorkflowSession {
    pub fn new(article_id: Uuid) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            article_id,
            stage: WorkflowStage::OsDetection,
            os_targets: Vec::new(),
            junk_score: None,
            ranking_score: None,
            indicators: None,
            ttps: Vec::new(),
            rules_generated: 0,
            rules_duplicate: 0,
            input_tokens: 0,
            output_tokens: 0,
            error: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Move to the next stage; terminal stages stamp the end time.
    pub fn transition_to(&mut self, stage: WorkflowStage) {
        self.stage = stage;
        if stage.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Add one LLM call's token usage to the session totals
    pub fn add_usage(&mut self, input_tokens: u64, output_tokens: u64) {
        self.input_tokens += input_tokens as i64;
        self.output_tokens += output_tokens as i64;
    }
}

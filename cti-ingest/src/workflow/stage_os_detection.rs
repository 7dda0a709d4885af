//! OS detection stage: classify target platforms from article content

use cti_common::db::models::Article;
use cti_common::Result;
use serde::Deserialize;

use crate::llm::prompts;
use crate::models::WorkflowSession;

use super::WorkflowOrchestrator;

const KNOWN_PLATFORMS: [&str; 6] = ["windows", "linux", "macos", "cloud", "network", "other"];

#[derive(Debug, Deserialize)]
struct OsDetectionResponse {
    #[serde(default)]
    platforms: Vec<String>,
}

impl WorkflowOrchestrator {
    pub(super) async fn stage_os_detection(
        &self,
        session: &mut WorkflowSession,
        article: &Article,
    ) -> Result<String> {
        let user = prompts::build_article_prompt(&article.title, &article.content);
        let response: OsDetectionResponse = self
            .run_agent_json(session, prompts::OS_DETECTION, &user)
            .await?;

        let mut platforms: Vec<String> = response
            .platforms
            .iter()
            .map(|p| normalize_platform(p))
            .collect();
        platforms.sort();
        platforms.dedup();

        session.os_targets = platforms.clone();

        if platforms.is_empty() {
            Ok("no platform evidence".to_string())
        } else {
            Ok(format!("platforms: {}", platforms.join(", ")))
        }
    }
}

/// Map model output onto the known platform vocabulary
fn normalize_platform(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let canonical = match lower.as_str() {
        "osx" | "mac" | "mac os" | "darwin" => "macos",
        "win" | "win32" | "win64" => "windows",
        "unix" => "linux",
        "aws" | "azure" | "gcp" | "saas" => "cloud",
        other => other,
    };

    if KNOWN_PLATFORMS.contains(&canonical) {
        canonical.to_string()
    } else {
        "other".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_platforms_pass_through() {
        assert_eq!(normalize_platform("windows"), "windows");
        assert_eq!(normalize_platform("  Linux "), "linux");
    }

    #[test]
    fn aliases_are_mapped() {
        assert_eq!(normalize_platform("OSX"), "macos");
        assert_eq!(normalize_platform("AWS"), "cloud");
        assert_eq!(normalize_platform("win32"), "windows");
    }

    #[test]
    fn unknown_values_become_other() {
        assert_eq!(normalize_platform("solaris"), "other");
        assert_eq!(normalize_platform(""), "other");
    }
}

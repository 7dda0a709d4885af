//! Prompt templates for the workflow agents
//!
//! Each agent has a system-prompt template stored in `agent_configs` so
//! analysts can tune wording, model, and token budget from the dashboard.
//! Defaults are seeded on first run and used as fallback when a row is
//! missing.

use chrono::Utc;
use cti_common::db::models::AgentConfig;
use cti_common::db::retry_on_lock;
use cti_common::Result;
use sqlx::SqlitePool;

use crate::db::LOCK_WAIT_MS;

pub const OS_DETECTION: &str = "os_detection";
pub const JUNK_FILTER: &str = "junk_filter";
pub const RANKING: &str = "ranking";
pub const IOC_EXTRACTION: &str = "ioc_extraction";
pub const TTP_EXTRACTION: &str = "ttp_extraction";
pub const RULE_GENERATION: &str = "rule_generation";

pub const AGENT_NAMES: [&str; 6] = [
    OS_DETECTION,
    JUNK_FILTER,
    RANKING,
    IOC_EXTRACTION,
    TTP_EXTRACTION,
    RULE_GENERATION,
];

/// Article content is truncated to this many characters before prompting
/// so a single long post cannot blow the token budget.
pub const MAX_CONTENT_CHARS: usize = 24_000;

/// Default system prompt for an agent
pub fn default_prompt(name: &str) -> Option<&'static str> {
    match name {
        OS_DETECTION => Some(
            "You are a threat-intelligence triage assistant. Given an article, \
             identify which target platforms the described activity concerns.\n\
             Respond with a JSON object only:\n\
             {\"platforms\": [\"windows\"|\"linux\"|\"macos\"|\"cloud\"|\"network\"|\"other\", ...]}\n\
             Include a platform only when the article gives concrete evidence for it.",
        ),
        JUNK_FILTER => Some(
            "You are a threat-intelligence triage assistant. Score whether the \
             article is substantive threat intelligence (attacker behavior, \
             indicators, vulnerabilities, incident analysis) as opposed to \
             marketing, product announcements, or general news.\n\
             Respond with a JSON object only:\n\
             {\"score\": <0.0-1.0>, \"reason\": \"<one sentence>\"}\n\
             1.0 means clearly substantive threat intelligence.",
        ),
        RANKING => Some(
            "You are a threat-intelligence analyst. Rate how actionable this \
             article is for a detection-engineering team on a 0-100 scale. \
             Concrete TTPs, commands, and indicators score high; vague trend \
             commentary scores low.\n\
             Respond with a JSON object only:\n\
             {\"score\": <0-100>, \"reason\": \"<one sentence>\"}",
        ),
        IOC_EXTRACTION => Some(
            "You are an IOC extraction agent. Extract indicators of compromise \
             that the article attributes to malicious activity. Do not invent \
             indicators and do not include the publisher's own infrastructure.\n\
             Respond with a JSON object only:\n\
             {\"ipv4\": [...], \"domains\": [...], \"hashes\": [...], \
              \"cves\": [...], \"commands\": [...]}\n\
             Use empty arrays for categories with no findings.",
        ),
        TTP_EXTRACTION => Some(
            "You are a TTP extraction agent. Identify attacker behaviors in the \
             article and map each to a MITRE ATT&CK technique.\n\
             Respond with a JSON object only:\n\
             {\"ttps\": [{\"technique_id\": \"T....\", \"name\": \"...\", \
              \"description\": \"<behavior as described in the article>\"}]}\n\
             Only include behaviors the article actually describes.",
        ),
        RULE_GENERATION => Some(
            "You are a detection engineer. Write one SIGMA rule for the single \
             behavior described below. The rule must be valid YAML with title, \
             id, status, description, logsource and detection keys, and a \
             detection condition that matches the described behavior.\n\
             Respond with the YAML only, no commentary and no code fences.",
        ),
        _ => None,
    }
}

/// Default per-agent token budgets (rule generation needs more room)
pub fn default_max_tokens(name: &str) -> i64 {
    match name {
        RULE_GENERATION => 2048,
        IOC_EXTRACTION | TTP_EXTRACTION => 1536,
        _ => 512,
    }
}

/// Build the user message for article-analysis agents
pub fn build_article_prompt(title: &str, content: &str) -> String {
    let truncated = truncate_chars(content, MAX_CONTENT_CHARS);

    let mut prompt = String::with_capacity(truncated.len() + title.len() + 64);
    prompt.push_str("## ARTICLE\n");
    prompt.push_str(&format!("Title: {}\n\n", title));
    prompt.push_str(truncated);
    if truncated.len() < content.len() {
        prompt.push_str("\n\n[content truncated]");
    }
    prompt
}

/// Build the user message for the rule-generation agent
pub fn build_rule_prompt(title: &str, technique_id: &str, behavior: &str) -> String {
    let mut prompt = String::with_capacity(behavior.len() + 128);
    prompt.push_str("## BEHAVIOR\n");
    prompt.push_str(&format!("Source article: {}\n", title));
    prompt.push_str(&format!("ATT&CK technique: {}\n", technique_id));
    prompt.push_str(&format!("Description: {}\n", behavior));
    prompt
}

/// Truncate to a character budget without splitting a UTF-8 character
fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Seed default agent configs for any missing rows (first-run initialization)
pub async fn seed_agent_configs(pool: &SqlitePool, default_model: &str) -> Result<()> {
    for name in AGENT_NAMES {
        let Some(prompt) = default_prompt(name) else {
            continue;
        };
        let max_tokens = default_max_tokens(name);

        retry_on_lock("seed_agent_config", LOCK_WAIT_MS, || async {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO agent_configs (name, model, max_tokens, prompt_template, updated_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(name)
            .bind(default_model)
            .bind(max_tokens)
            .bind(prompt)
            .bind(Utc::now().to_rfc3339())
            .execute(pool)
            .await?;
            Ok(())
        })
        .await?;
    }
    Ok(())
}

/// Load an agent config, falling back to the built-in default
pub async fn load_agent(
    pool: &SqlitePool,
    name: &str,
    default_model: &str,
) -> Result<AgentConfig> {
    let row = sqlx::query("SELECT * FROM agent_configs WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    if let Some(row) = row {
        return AgentConfig::from_row(&row);
    }

    let prompt = default_prompt(name).ok_or_else(|| {
        cti_common::Error::NotFound(format!("Unknown agent: {}", name))
    })?;

    Ok(AgentConfig {
        name: name.to_string(),
        model: default_model.to_string(),
        max_tokens: default_max_tokens(name),
        prompt_template: prompt.to_string(),
        updated_at: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_agent_has_a_default_prompt() {
        for name in AGENT_NAMES {
            assert!(default_prompt(name).is_some(), "missing prompt for {}", name);
        }
        assert!(default_prompt("bogus_agent").is_none());
    }

    #[test]
    fn article_prompt_includes_title_and_content() {
        let prompt = build_article_prompt("APT99 campaign", "The actor used certutil.");
        assert!(prompt.contains("Title: APT99 campaign"));
        assert!(prompt.contains("certutil"));
        assert!(!prompt.contains("[content truncated]"));
    }

    #[test]
    fn long_content_is_truncated() {
        let content = "x".repeat(MAX_CONTENT_CHARS + 500);
        let prompt = build_article_prompt("Title", &content);
        assert!(prompt.contains("[content truncated]"));
        assert!(prompt.len() < content.len() + 200);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let content = "日本語のテキスト".repeat(8000);
        // Must not panic on a multi-byte boundary.
        let _ = build_article_prompt("Title", &content);
    }

    #[test]
    fn rule_prompt_carries_technique() {
        let prompt = build_rule_prompt("Post", "T1059.001", "PowerShell download cradle");
        assert!(prompt.contains("T1059.001"));
        assert!(prompt.contains("PowerShell download cradle"));
    }
}

//! SIGMA rule validation
//!
//! Generated rules must parse as YAML and carry the keys downstream
//! tooling needs (title, logsource, detection). Anything else is
//! rejected before it reaches the rule store.

use cti_common::{Error, Result};

/// A validated SIGMA rule candidate
#[derive(Debug, Clone)]
pub struct SigmaCandidate {
    pub title: String,
    pub yaml: String,
}

/// Validate model output as a SIGMA rule.
///
/// Strips Markdown code fences first; models occasionally add them
/// despite instructions.
pub fn validate_sigma(raw: &str) -> Result<SigmaCandidate> {
    let yaml_text = strip_code_fences(raw).trim().to_string();
    if yaml_text.is_empty() {
        return Err(Error::InvalidInput("empty rule output".to_string()));
    }

    let doc: serde_yaml::Value = serde_yaml::from_str(&yaml_text)
        .map_err(|e| Error::InvalidInput(format!("rule is not valid YAML: {}", e)))?;

    if doc.as_mapping().is_none() {
        return Err(Error::InvalidInput("rule is not a YAML mapping".to_string()));
    }

    for key in ["title", "logsource", "detection"] {
        if doc.get(key).is_none() {
            return Err(Error::InvalidInput(format!("rule is missing '{}' key", key)));
        }
    }

    let title = doc
        .get("title")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::InvalidInput("rule title is not a string".to_string()))?;

    Ok(SigmaCandidate {
        title,
        yaml: yaml_text,
    })
}

/// Remove a surrounding Markdown code fence, if present
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Skip the info string ("yaml", "yml", ...) on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => return trimmed,
    };

    rest.strip_suffix("```").map(str::trim).unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_RULE: &str = r#"
title: Suspicious Certutil Download
id: 6a2b9c7e-6c12-4f5a-9d1e-0e7f1a2b3c4d
status: experimental
description: Detects certutil being used as a downloader
logsource:
    category: process_creation
    product: windows
detection:
    selection:
        Image|endswith: '\certutil.exe'
        CommandLine|contains: '-urlcache'
    condition: selection
level: medium
"#;

    #[test]
    fn valid_rule_passes() {
        let candidate = validate_sigma(VALID_RULE).unwrap();
        assert_eq!(candidate.title, "Suspicious Certutil Download");
        assert!(candidate.yaml.contains("process_creation"));
    }

    #[test]
    fn code_fenced_rule_passes() {
        let fenced = format!("```yaml\n{}\n```", VALID_RULE.trim());
        let candidate = validate_sigma(&fenced).unwrap();
        assert_eq!(candidate.title, "Suspicious Certutil Download");
        assert!(!candidate.yaml.contains("```"));
    }

    #[test]
    fn missing_detection_rejected() {
        let rule = "title: No detection\nlogsource:\n    product: windows\n";
        let err = validate_sigma(rule).unwrap_err();
        assert!(err.to_string().contains("detection"));
    }

    #[test]
    fn non_yaml_rejected() {
        assert!(validate_sigma("this is: not: valid: yaml: {{{").is_err());
    }

    #[test]
    fn empty_output_rejected() {
        assert!(validate_sigma("").is_err());
        assert!(validate_sigma("```yaml\n```").is_err());
    }

    #[test]
    fn scalar_document_rejected() {
        assert!(validate_sigma("just a string").is_err());
    }
}

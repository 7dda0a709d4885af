//! TTP extraction types
//!
//! Attacker behaviors mapped to MITRE ATT&CK techniques by the TTP
//! extraction agent. Findings with malformed technique ids are dropped
//! rather than failing the stage.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static TECHNIQUE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^T\d{4}(?:\.\d{3})?$").expect("static regex"));

/// One attacker behavior mapped to an ATT&CK technique
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtpFinding {
    pub technique_id: String,
    pub name: String,
    pub description: String,
}

impl TtpFinding {
    /// Technique ids follow the ATT&CK format: T1059 or T1059.001
    pub fn has_valid_technique_id(&self) -> bool {
        TECHNIQUE_ID_RE.is_match(&self.technique_id)
    }
}

/// Keep well-formed findings, dropping malformed technique ids and
/// empty descriptions.
pub fn sanitize_findings(findings: Vec<TtpFinding>) -> Vec<TtpFinding> {
    findings
        .into_iter()
        .map(|mut f| {
            f.technique_id = f.technique_id.trim().to_uppercase();
            f
        })
        .filter(|f| f.has_valid_technique_id() && !f.description.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(id: &str, description: &str) -> TtpFinding {
        TtpFinding {
            technique_id: id.to_string(),
            name: "Test".to_string(),
            description: description.to_string(),
        }
    }

    #[test]
    fn valid_ids_accepted() {
        assert!(finding("T1059", "x").has_valid_technique_id());
        assert!(finding("T1059.001", "x").has_valid_technique_id());
    }

    #[test]
    fn invalid_ids_rejected() {
        assert!(!finding("1059", "x").has_valid_technique_id());
        assert!(!finding("T10", "x").has_valid_technique_id());
        assert!(!finding("T1059.1", "x").has_valid_technique_id());
        assert!(!finding("TA0001", "x").has_valid_technique_id());
    }

    #[test]
    fn sanitize_normalizes_case_and_drops_bad_rows() {
        let findings = vec![
            finding("t1059.001", "PowerShell download cradle"),
            finding("T9999999", "bad id"),
            finding("T1027", "   "),
        ];

        let clean = sanitize_findings(findings);
        assert_eq!(clean.len(), 1);
        assert_eq!(clean[0].technique_id, "T1059.001");
    }
}

//! Rule similarity scoring
//!
//! A candidate rule is compared against every stored rule with a
//! weighted blend: normalized Levenshtein over normalized YAML bodies
//! plus Jaro-Winkler over titles. Title similarity alone is a weak
//! signal (many rules share phrasing like "Suspicious ... Execution"),
//! so the body dominates the blend.

use crate::db::models::SigmaRule;
use strsim::{jaro_winkler, normalized_levenshtein};
use uuid::Uuid;

const BODY_WEIGHT: f64 = 0.7;
const TITLE_WEIGHT: f64 = 0.3;

/// Nearest stored rule for a candidate
#[derive(Debug, Clone)]
pub struct SimilarityMatch {
    pub rule_id: Uuid,
    pub title: String,
    pub score: f64,
}

/// Normalize a YAML body for comparison: lowercase, collapse whitespace
pub fn normalize_rule_text(yaml: &str) -> String {
    yaml.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Blended similarity of two rules
pub fn rule_similarity(
    candidate_title: &str,
    candidate_yaml: &str,
    existing_title: &str,
    existing_yaml: &str,
) -> f64 {
    let body = normalized_levenshtein(
        &normalize_rule_text(candidate_yaml),
        &normalize_rule_text(existing_yaml),
    );
    let title = jaro_winkler(
        &candidate_title.to_lowercase(),
        &existing_title.to_lowercase(),
    );
    BODY_WEIGHT * body + TITLE_WEIGHT * title
}

/// Score a candidate against all stored rules, best match first
pub fn rank_matches(
    candidate_title: &str,
    candidate_yaml: &str,
    existing: &[SigmaRule],
) -> Vec<SimilarityMatch> {
    let mut matches: Vec<SimilarityMatch> = existing
        .iter()
        .map(|rule| SimilarityMatch {
            rule_id: rule.rule_id,
            title: rule.title.clone(),
            score: rule_similarity(candidate_title, candidate_yaml, &rule.title, &rule.yaml),
        })
        .collect();

    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    matches
}

/// Highest-scoring match; None when the store is empty
pub fn best_match(
    candidate_title: &str,
    candidate_yaml: &str,
    existing: &[SigmaRule],
) -> Option<SimilarityMatch> {
    rank_matches(candidate_title, candidate_yaml, existing)
        .into_iter()
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::db::models::RuleStatus;

    fn rule(title: &str, yaml: &str) -> SigmaRule {
        SigmaRule {
            rule_id: Uuid::new_v4(),
            article_id: None,
            title: title.to_string(),
            yaml: yaml.to_string(),
            status: RuleStatus::Draft,
            duplicate_of: None,
            similarity: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    const CERTUTIL_RULE: &str = "title: Suspicious Certutil Download\nlogsource:\n  category: process_creation\ndetection:\n  selection:\n    CommandLine|contains: '-urlcache'\n  condition: selection";

    #[test]
    fn identical_rules_score_one() {
        let score = rule_similarity(
            "Suspicious Certutil Download",
            CERTUTIL_RULE,
            "Suspicious Certutil Download",
            CERTUTIL_RULE,
        );
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn whitespace_and_case_do_not_matter() {
        let reformatted = CERTUTIL_RULE.to_uppercase().replace('\n', "\n\n   ");
        let score = rule_similarity(
            "Suspicious Certutil Download",
            CERTUTIL_RULE,
            "SUSPICIOUS CERTUTIL DOWNLOAD",
            &reformatted,
        );
        assert!(score > 0.99, "score was {}", score);
    }

    #[test]
    fn unrelated_rules_score_low() {
        let other = "title: Linux Cron Persistence\nlogsource:\n  product: linux\ndetection:\n  selection:\n    path: '/etc/cron.d'\n  condition: selection";
        let score = rule_similarity(
            "Suspicious Certutil Download",
            CERTUTIL_RULE,
            "Linux Cron Persistence",
            other,
        );
        assert!(score < 0.7, "score was {}", score);
    }

    #[test]
    fn rank_orders_best_first() {
        let near = CERTUTIL_RULE.replace("medium", "high");
        let existing = vec![
            rule("Linux Cron Persistence", "title: Linux Cron Persistence\ndetection:\n  condition: selection"),
            rule("Suspicious Certutil Download", &near),
        ];

        let ranked = rank_matches("Suspicious Certutil Download", CERTUTIL_RULE, &existing);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].title, "Suspicious Certutil Download");
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn empty_store_has_no_match() {
        assert!(best_match("Title", CERTUTIL_RULE, &[]).is_none());
    }
}

//! Indicator extraction: regex pre-pass merged with LLM output
//!
//! The regex pass catches the mechanical indicator classes (addresses,
//! hashes, CVE ids) that LLMs sometimes drop or mistype; the LLM pass
//! adds context-dependent ones (defanged forms, command lines). The
//! merged set is deduplicated and sorted for stable storage.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static IPV4_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("static regex")
});

static HASH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[a-fA-F0-9]{64}\b|\b[a-fA-F0-9]{40}\b|\b[a-fA-F0-9]{32}\b")
        .expect("static regex")
});

static CVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bCVE-\d{4}-\d{4,7}\b").expect("static regex"));

static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[a-z0-9][a-z0-9-]{0,62}(?:\.[a-z0-9][a-z0-9-]{0,62})+\b")
        .expect("static regex")
});

// Common file extensions that the domain regex would otherwise match
// in prose ("update.exe", "report.pdf").
const NON_DOMAIN_SUFFIXES: [&str; 12] = [
    ".exe", ".dll", ".pdf", ".doc", ".docx", ".xls", ".zip", ".rar", ".ps1", ".bat", ".txt",
    ".html",
];

/// Extracted indicators of compromise
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    #[serde(default)]
    pub ipv4: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub hashes: Vec<String>,
    #[serde(default)]
    pub cves: Vec<String>,
    #[serde(default)]
    pub commands: Vec<String>,
}

impl IndicatorSet {
    pub fn is_empty(&self) -> bool {
        self.ipv4.is_empty()
            && self.domains.is_empty()
            && self.hashes.is_empty()
            && self.cves.is_empty()
            && self.commands.is_empty()
    }

    pub fn total(&self) -> usize {
        self.ipv4.len()
            + self.domains.len()
            + self.hashes.len()
            + self.cves.len()
            + self.commands.len()
    }

    /// Merge another set into this one
    pub fn merge(&mut self, other: IndicatorSet) {
        self.ipv4.extend(other.ipv4);
        self.domains.extend(other.domains);
        self.hashes.extend(other.hashes);
        self.cves.extend(other.cves);
        self.commands.extend(other.commands);
        self.normalize();
    }

    /// Deduplicate and sort each category for stable storage
    pub fn normalize(&mut self) {
        for list in [
            &mut self.ipv4,
            &mut self.domains,
            &mut self.hashes,
            &mut self.cves,
            &mut self.commands,
        ] {
            list.retain(|s| !s.trim().is_empty());
            list.sort();
            list.dedup();
        }
    }
}

/// Run the regex pre-pass over article text
pub fn regex_prepass(content: &str) -> IndicatorSet {
    // Refang the common defusing patterns before matching.
    let refanged = content
        .replace("[.]", ".")
        .replace("(.)", ".")
        .replace("hxxp://", "http://")
        .replace("hxxps://", "https://");
    let lower = refanged.to_lowercase();

    let mut set = IndicatorSet::default();

    for m in IPV4_RE.find_iter(&refanged) {
        let candidate = m.as_str();
        if is_valid_ipv4(candidate) {
            set.ipv4.push(candidate.to_string());
        }
    }

    for m in HASH_RE.find_iter(&refanged) {
        set.hashes.push(m.as_str().to_lowercase());
    }

    for m in CVE_RE.find_iter(&refanged) {
        set.cves.push(m.as_str().to_uppercase());
    }

    for m in DOMAIN_RE.find_iter(&lower) {
        let candidate = m.as_str();
        if is_plausible_domain(candidate) {
            set.domains.push(candidate.to_string());
        }
    }

    set.normalize();
    set
}

/// All four octets must be 0-255
fn is_valid_ipv4(s: &str) -> bool {
    s.split('.')
        .filter_map(|octet| octet.parse::<u32>().ok())
        .filter(|&octet| octet <= 255)
        .count()
        == 4
}

/// Filter file names and version strings out of domain candidates
fn is_plausible_domain(s: &str) -> bool {
    for suffix in NON_DOMAIN_SUFFIXES {
        if s.ends_with(suffix) {
            return false;
        }
    }

    // The final label must look like a TLD: alphabetic, at least 2 chars.
    let Some(tld) = s.rsplit('.').next() else {
        return false;
    };
    tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
}

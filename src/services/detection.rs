//! Fixed signature tables for SQL injection and XSS detection.
//!
//! The rules are a closed, named set tuned for high recall on textbook
//! payloads. Known limitations, accepted rather than papered over:
//! - Input is matched as-is; URL- or HTML-encoded payloads are not decoded
//!   first. This is a heuristic filter, not a sanitizer.
//! - Legitimate text containing these substrings (for example a `--` in
//!   prose) will be flagged. Narrowing the rules to avoid that would trade
//!   false positives for false negatives, so the rules stay broad.

use regex::Regex;

struct Signature {
    name: &'static str,
    pattern: &'static str,
}

const SQL_SIGNATURES: &[Signature] = &[
    Signature {
        name: "stacked_statement",
        pattern: r"(?i);\s*(drop|delete|update|insert)\b",
    },
    Signature {
        name: "boolean_tautology",
        pattern: r"(?i)'\s*(or|and)\s*'?\w+'?\s*=\s*'?\w+",
    },
    Signature {
        name: "comment_sequence",
        pattern: r"--|/\*",
    },
    Signature {
        name: "union_select",
        pattern: r"(?i)\bunion\s+(all\s+)?select\b",
    },
];

const XSS_SIGNATURES: &[Signature] = &[
    Signature {
        name: "script_tag",
        pattern: r"(?i)<script",
    },
    Signature {
        name: "javascript_uri",
        pattern: r"(?i)javascript\s*:",
    },
    Signature {
        name: "event_handler",
        pattern: r"(?i)\bon\w+\s*=",
    },
];

pub struct DetectionRuleSet {
    sql_rules: Vec<(&'static str, Regex)>,
    xss_rules: Vec<(&'static str, Regex)>,
}

impl DetectionRuleSet {
    pub fn new() -> Self {
        Self {
            sql_rules: compile(SQL_SIGNATURES),
            xss_rules: compile(XSS_SIGNATURES),
        }
    }

    pub fn scan_for_sql_injection(&self, text: &str) -> bool {
        self.first_sql_match(text).is_some()
    }

    pub fn scan_for_xss(&self, text: &str) -> bool {
        self.first_xss_match(text).is_some()
    }

    /// Name of the first SQL signature that matches, if any.
    pub fn first_sql_match(&self, text: &str) -> Option<&'static str> {
        first_match(&self.sql_rules, text)
    }

    /// Name of the first XSS signature that matches, if any.
    pub fn first_xss_match(&self, text: &str) -> Option<&'static str> {
        first_match(&self.xss_rules, text)
    }
}

impl Default for DetectionRuleSet {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(signatures: &[Signature]) -> Vec<(&'static str, Regex)> {
    signatures
        .iter()
        .filter_map(|s| Regex::new(s.pattern).ok().map(|r| (s.name, r)))
        .collect()
}

fn first_match(rules: &[(&'static str, Regex)], text: &str) -> Option<&'static str> {
    if text.is_empty() {
        return None;
    }
    rules
        .iter()
        .find(|(_, regex)| regex.is_match(text))
        .map(|(name, _)| *name)
}

//! Report label helpers: audit markers, parent-company filter, name cleanup.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Marker for an audited report ("kiểm toán").
pub const AUDITED_MARKER: &str = "kiểm toán";
/// Marker for a reviewed report ("soát xét").
pub const REVIEWED_MARKER: &str = "soát xét";
/// Marker for a parent-company-only report ("công ty mẹ").
pub const PARENT_COMPANY_MARKER: &str = "mẹ";

static PARENTHESIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^)]*\)").expect("static regex is valid"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStatus {
    pub is_audited: bool,
    pub is_reviewed: bool,
}

fn fold(label: &str) -> String {
    label.nfc().collect::<String>().to_lowercase()
}

/// Case-insensitive marker test. Both flags may be set at once.
pub fn classify_audit(label: Option<&str>) -> AuditStatus {
    match label {
        Some(label) if !label.is_empty() => {
            let folded = fold(label);
            AuditStatus {
                is_audited: folded.contains(AUDITED_MARKER),
                is_reviewed: folded.contains(REVIEWED_MARKER),
            }
        }
        _ => AuditStatus::default(),
    }
}

pub fn is_parent_company_label(label: Option<&str>) -> bool {
    label.is_some_and(|label| fold(label).contains(PARENT_COMPANY_MARKER))
}

/// Drop every parenthesized annotation and trim. `None` stays `None`.
pub fn clean_report_name(label: Option<&str>) -> Option<String> {
    label.map(|label| PARENTHESIZED.replace_all(label, "").trim().to_string())
}

pub fn normalize_symbol(symbol: Option<&str>) -> String {
    symbol.map(|s| s.trim().to_uppercase()).unwrap_or_default()
}

//! Importance Model
//!
//! Canonical importance representation for the `detail.importance` field:
//! a numeric score in `[0,1]` plus a coarse label, with a tolerant parser
//! that accepts every legacy shape (bare number, bare label, partial
//! object) without ever failing.

mod heuristic;
mod task_marker;

pub use heuristic::{
    grade_observation, GradeInput, GradeResult, HEURISTIC_METHOD, HEURISTIC_VERSION,
};
pub use task_marker::starts_with_task_marker;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// LABELS
// ============================================================================

/// Coarse importance label; `Unknown` is the explicit fallthrough for
/// anything the parser cannot place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceLabel {
    MustRemember,
    NiceToHave,
    Ignore,
    #[default]
    Unknown,
}

impl ImportanceLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportanceLabel::MustRemember => "must_remember",
            ImportanceLabel::NiceToHave => "nice_to_have",
            ImportanceLabel::Ignore => "ignore",
            ImportanceLabel::Unknown => "unknown",
        }
    }

    /// Parse a label, accepting aliases and full-width variants.
    ///
    /// Width-normalizes first so `ＭＵＳＴ＿ＲＥＭＥＭＢＥＲ` and
    /// `ＮＩＣＥ－ＴＯ－ＨＡＶＥ` are accepted.
    pub fn parse_name(s: &str) -> Option<Self> {
        let key: String = s.nfkc().collect::<String>().trim().to_lowercase();
        match key.as_str() {
            "must_remember" | "must remember" | "must-remember" | "high" => {
                Some(ImportanceLabel::MustRemember)
            }
            "nice_to_have" | "nice to have" | "nice-to-have" | "medium" => {
                Some(ImportanceLabel::NiceToHave)
            }
            "ignore" | "low" => Some(ImportanceLabel::Ignore),
            _ => None,
        }
    }

    /// Representative score used when only a label was stored.
    pub fn representative_score(&self) -> f64 {
        match self {
            ImportanceLabel::MustRemember => 0.8,
            ImportanceLabel::NiceToHave => 0.5,
            ImportanceLabel::Ignore | ImportanceLabel::Unknown => 0.0,
        }
    }
}

impl std::fmt::Display for ImportanceLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Map a score to its label by the canonical thresholds.
pub fn label_from_score(score: f64) -> ImportanceLabel {
    let s = clamp01(score);
    if s >= 0.80 {
        ImportanceLabel::MustRemember
    } else if s >= 0.50 {
        ImportanceLabel::NiceToHave
    } else {
        ImportanceLabel::Ignore
    }
}

pub(crate) fn clamp01(x: f64) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    x.clamp(0.0, 1.0)
}

// ============================================================================
// CANONICAL RECORD
// ============================================================================

/// Canonical `detail.importance` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceRecord {
    pub score: f64,
    pub label: ImportanceLabel,
    pub rationale: String,
    pub method: String,
    pub version: i64,
    pub graded_at: String,
}

/// Build a canonical importance record, clamping the score and stamping a
/// second-resolution UTC timestamp when `graded_at` is absent.
pub fn make_importance(
    score: f64,
    method: &str,
    rationale: &str,
    version: i64,
    label: Option<ImportanceLabel>,
) -> ImportanceRecord {
    let s = clamp01(score);
    let lab = label.unwrap_or_else(|| label_from_score(s));
    ImportanceRecord {
        score: s,
        label: lab,
        rationale: rationale.to_string(),
        method: method.to_string(),
        version,
        graded_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    }
}

// ============================================================================
// TOLERANT PARSING
// ============================================================================

fn parse_score_like(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(_) => None,
        Value::Number(n) => {
            let score = n.as_f64()?;
            score.is_finite().then_some(score)
        }
        Value::String(s) => {
            let normalized: String = s.nfkc().collect::<String>().trim().to_string();
            if normalized.is_empty() {
                return None;
            }
            let score: f64 = normalized.parse().ok()?;
            score.is_finite().then_some(score)
        }
        _ => None,
    }
}

/// Whether `detail.importance` carries parseable signal at all.
pub fn is_parseable_importance(value: &Value) -> bool {
    if parse_score_like(value).is_some() {
        return true;
    }
    if let Value::Object(map) = value {
        if map.get("score").and_then(parse_score_like).is_some() {
            return true;
        }
        return map
            .get("label")
            .and_then(Value::as_str)
            .and_then(ImportanceLabel::parse_name)
            .is_some();
    }
    false
}

/// Best-effort parse of an importance score.
///
/// Accepts the canonical object form, a bare number, a numeric string, or a
/// label-only object. Missing or invalid input returns `0.0`; this function
/// never fails.
pub fn parse_importance_score(value: &Value) -> f64 {
    if let Some(score) = parse_score_like(value) {
        return clamp01(score);
    }

    if let Value::Object(map) = value {
        if let Some(score) = map.get("score").and_then(|v| parse_score_like(v)) {
            return clamp01(score);
        }
        if let Some(label) = map
            .get("label")
            .and_then(Value::as_str)
            .and_then(ImportanceLabel::parse_name)
        {
            return label.representative_score();
        }
    }

    0.0
}

/// Parse a label for display, falling back to `unknown`.
pub fn parse_importance_label(value: &Value) -> ImportanceLabel {
    if let Value::Object(map) = value {
        if let Some(label) = map
            .get("label")
            .and_then(Value::as_str)
            .and_then(ImportanceLabel::parse_name)
        {
            return label;
        }
        if let Some(score) = map.get("score").and_then(parse_score_like) {
            return label_from_score(score);
        }
        return ImportanceLabel::Unknown;
    }

    if let Value::String(s) = value {
        if let Some(label) = ImportanceLabel::parse_name(s) {
            return label;
        }
    }

    match parse_score_like(value) {
        Some(score) => label_from_score(score),
        None => ImportanceLabel::Unknown,
    }
}

// ============================================================================
// TESTS
// ============================================================================

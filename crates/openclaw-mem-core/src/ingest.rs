//! Ingest pipeline: line-delimited JSON intake.
//!
//! Each line is scrubbed, normalized, optionally autograded, and inserted.
//! Grading is fail-open: a grader error is counted and warned about, and
//! the observation is still stored without importance.

use std::collections::BTreeMap;
use std::io::BufRead;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::importance::{
    grade_observation, is_parseable_importance, parse_importance_label, GradeInput,
};
use crate::observation::ObservationInput;
use crate::storage::{Result, Store, StoreError};
use crate::text::scrub_surrogate_escapes;

/// Canonical top-level keys; anything else folds into `detail`.
const CANONICAL_KEYS: [&str; 8] = [
    "ts",
    "kind",
    "summary",
    "summary_en",
    "lang",
    "tool_name",
    "tool",
    "detail",
];

/// Cap on ids echoed back in the run summary.
const MAX_RECEIPT_IDS: usize = 50;

/// Escape hatch for fail-open testing: force the grader to error.
const TEST_RAISE_ENV: &str = "OPENCLAW_MEM_IMPORTANCE_TEST_RAISE";

// ============================================================================
// SCORER SETTING
// ============================================================================

pub const SCORER_HEURISTIC_V1: &str = "heuristic-v1";

/// Resolved autograde setting for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScorerSetting {
    Disabled,
    HeuristicV1,
}

impl ScorerSetting {
    /// Resolve from a CLI override, falling back to the environment.
    ///
    /// Disable sentinels: `off`, `none`, `disable`, `disabled`, `0`.
    /// Unrecognized scorer names disable autograde (with a warning) rather
    /// than aborting an unattended pipeline run.
    pub fn resolve(cli_override: Option<&str>) -> Self {
        let raw = match cli_override {
            Some(v) => Some(v.to_string()),
            None => crate::defaults::importance_scorer(),
        };
        let Some(raw) = raw else {
            return ScorerSetting::Disabled;
        };
        let value = raw.trim().to_lowercase();
        match value.as_str() {
            "" | "off" | "none" | "disable" | "disabled" | "0" => ScorerSetting::Disabled,
            SCORER_HEURISTIC_V1 => ScorerSetting::HeuristicV1,
            other => {
                tracing::warn!(scorer = other, "unrecognized importance scorer; autograde disabled");
                ScorerSetting::Disabled
            }
        }
    }
}

// ============================================================================
// RUN SUMMARY
// ============================================================================

/// Ingest receipt counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub total_seen: u64,
    pub graded_filled: u64,
    pub skipped_existing: u64,
    pub skipped_disabled: u64,
    pub scorer_errors: u64,
    pub label_counts: BTreeMap<String, u64>,
    pub inserted: u64,
    pub ids: Vec<i64>,
}

impl RunSummary {
    pub fn absorb(&mut self, other: &RunSummary) {
        self.total_seen += other.total_seen;
        self.graded_filled += other.graded_filled;
        self.skipped_existing += other.skipped_existing;
        self.skipped_disabled += other.skipped_disabled;
        self.scorer_errors += other.scorer_errors;
        self.inserted += other.inserted;
        for (label, n) in &other.label_counts {
            *self.label_counts.entry(label.clone()).or_default() += n;
        }
        for id in &other.ids {
            if self.ids.len() < MAX_RECEIPT_IDS {
                self.ids.push(*id);
            }
        }
    }

    fn bin_label(&mut self, label: &str) {
        *self.label_counts.entry(label.to_string()).or_default() += 1;
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Ingest line-delimited JSON records from any reader.
pub fn ingest_reader<R: BufRead>(
    store: &Store,
    reader: R,
    scorer: ScorerSetting,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let scrubbed = scrub_surrogate_escapes(trimmed);
        let value: Value = serde_json::from_str(&scrubbed)?;
        let Value::Object(record) = value else {
            return Err(StoreError::InvalidInput(
                "ingest records must be JSON objects".to_string(),
            ));
        };

        summary.total_seen += 1;
        let input = build_input(record, scorer, &mut summary);
        let id = store.insert_observation(&input)?;
        summary.inserted += 1;
        if summary.ids.len() < MAX_RECEIPT_IDS {
            summary.ids.push(id);
        }
    }

    Ok(summary)
}

/// Normalize one record: canonical fields out, everything else folded into
/// `detail`, autograde applied when configured.
fn build_input(
    mut record: Map<String, Value>,
    scorer: ScorerSetting,
    summary: &mut RunSummary,
) -> ObservationInput {
    let take_str = |record: &mut Map<String, Value>, key: &str| -> Option<String> {
        match record.remove(key) {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        }
    };

    let ts = take_str(&mut record, "ts");
    let kind = take_str(&mut record, "kind");
    let summary_text = take_str(&mut record, "summary");
    let summary_en = take_str(&mut record, "summary_en");
    let lang = take_str(&mut record, "lang");
    let tool_name = take_str(&mut record, "tool_name").or_else(|| take_str(&mut record, "tool"));

    let mut detail = crate::observation::normalize_detail(record.remove("detail"));

    // Fold unknown producer keys into detail.
    for (key, value) in record {
        if !CANONICAL_KEYS.contains(&key.as_str()) {
            detail.entry(key).or_insert(value);
        }
    }

    let has_importance = detail
        .get("importance")
        .map(is_parseable_importance)
        .unwrap_or(false);

    if has_importance {
        summary.skipped_existing += 1;
        let label = parse_importance_label(&detail["importance"]);
        summary.bin_label(label.as_str());
    } else {
        match scorer {
            ScorerSetting::Disabled => {
                summary.skipped_disabled += 1;
            }
            ScorerSetting::HeuristicV1 => {
                let grade = grade_checked(&GradeInput {
                    kind: kind.as_deref().unwrap_or(""),
                    tool_name: tool_name.as_deref().unwrap_or(""),
                    summary: summary_text.as_deref().unwrap_or(""),
                    summary_en: summary_en.as_deref().unwrap_or(""),
                    detail: None,
                });
                match grade {
                    Ok(record) => {
                        summary.graded_filled += 1;
                        summary.bin_label(record.label.as_str());
                        if let Ok(value) = serde_json::to_value(&record) {
                            detail.insert("importance".to_string(), value);
                        }
                    }
                    Err(err) => {
                        summary.scorer_errors += 1;
                        tracing::warn!(error = %err, "importance grading failed; inserting ungraded");
                    }
                }
            }
        }
    }

    ObservationInput {
        ts,
        kind,
        summary: summary_text,
        summary_en,
        lang,
        tool_name,
        detail: Some(Value::Object(detail)),
    }
}

fn grade_checked(input: &GradeInput<'_>) -> std::result::Result<crate::importance::ImportanceRecord, String> {
    if std::env::var(TEST_RAISE_ENV).map(|v| v == "1").unwrap_or(false) {
        return Err("forced grader failure (test hook)".to_string());
    }
    Ok(grade_observation(input).as_importance())
}

// ============================================================================
// TESTS
// ============================================================================

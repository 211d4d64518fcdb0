//! Deterministic heuristic importance grading (`heuristic-v1`).
//!
//! Runs only when `detail.importance` is absent and autograde is enabled.
//! Scoring starts at a 0.30 baseline and applies fixed adjustments; the
//! final score is clamped to `[0,1]` and labeled by the canonical
//! thresholds. Same input, same grade, every time.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::task_marker::starts_with_task_marker;
use super::{clamp01, make_importance, ImportanceLabel, ImportanceRecord};

pub const HEURISTIC_METHOD: &str = "heuristic-v1";
pub const HEURISTIC_VERSION: i64 = 1;

/// Result of one grading pass, with the reasons that moved the score.
#[derive(Debug, Clone)]
pub struct GradeResult {
    pub score: f64,
    pub label: ImportanceLabel,
    pub rationale: String,
    pub reasons: Vec<String>,
    pub penalties: Vec<String>,
}

impl GradeResult {
    pub fn as_importance(&self) -> ImportanceRecord {
        make_importance(
            self.score,
            HEURISTIC_METHOD,
            &self.rationale,
            HEURISTIC_VERSION,
            Some(self.label),
        )
    }
}

/// Observation fields the grader looks at.
#[derive(Debug, Clone, Default)]
pub struct GradeInput<'a> {
    pub kind: &'a str,
    pub tool_name: &'a str,
    pub summary: &'a str,
    pub summary_en: &'a str,
    pub detail: Option<&'a Value>,
}

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap_or_else(|_| Regex::new("$^").unwrap()))
}

static URL_RE: OnceLock<Regex> = OnceLock::new();
static UUID_RE: OnceLock<Regex> = OnceLock::new();
static CFG_RE: OnceLock<Regex> = OnceLock::new();
static KEY_RE: OnceLock<Regex> = OnceLock::new();
static DEADLINE_RE: OnceLock<Regex> = OnceLock::new();
static CHAT_RE: OnceLock<Regex> = OnceLock::new();
static CLOCK_RE: OnceLock<Regex> = OnceLock::new();

fn has_url(text: &str) -> bool {
    re(&URL_RE, r"(?i)https?://\S+").is_match(text)
}

fn has_uuid(text: &str) -> bool {
    re(
        &UUID_RE,
        r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b",
    )
    .is_match(text)
}

fn has_config_path(text: &str) -> bool {
    re(&CFG_RE, r"(?i)\bagents\.[a-z0-9_.]+\b").is_match(text)
}

fn has_env_var(text: &str) -> bool {
    text.contains("OPENCLAW_")
}

fn has_cli_command(lower: &str) -> bool {
    ["uv run", "python -m", "openclaw ", "openclaw-mem"]
        .iter()
        .any(|s| lower.contains(s))
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Grade one observation deterministically.
pub fn grade_observation(input: &GradeInput<'_>) -> GradeResult {
    let tool = input.tool_name.trim();
    let summary = input.summary.trim();

    // "tool: summary" composite mirrors how observations render; the
    // English summary is appended so its keywords count too.
    let mut text = if !tool.is_empty() && !summary.is_empty() {
        format!("{tool}: {summary}")
    } else if summary.is_empty() {
        tool.to_string()
    } else {
        summary.to_string()
    };
    if !input.summary_en.trim().is_empty() {
        text.push(' ');
        text.push_str(input.summary_en.trim());
    }
    let tl = text.to_lowercase();

    let mut score: f64 = 0.30;
    let mut reasons: Vec<String> = Vec::new();
    let mut penalties: Vec<String> = Vec::new();

    let is_task = input.kind.trim().eq_ignore_ascii_case("task")
        || starts_with_task_marker(summary)
        || text.contains("要做")
        || text.contains("待辦");

    let has_ident = has_url(&text)
        || has_uuid(&text)
        || has_config_path(&text)
        || has_env_var(&text)
        || has_cli_command(&tl);

    // Secret-like content is always down-ranked.
    if re(&KEY_RE, r"(?i)BEGIN (RSA|OPENSSH) PRIVATE KEY").is_match(&text)
        || contains_any(&text, &["sk-", "ghp_", "AKIA"])
    {
        score -= 0.40;
        penalties.push("Secret-like content; down-ranked for safety.".to_string());
    }

    // Constraints / preferences / policies.
    if contains_any(
        &tl,
        &[
            "prefer",
            "preference",
            "always",
            "never",
            "must",
            "should",
            "do not",
            "don't",
            "required",
            "rule",
            "policy",
            "hard requirement",
        ],
    ) || contains_any(
        &text,
        &["偏好", "規則", "一定", "必須", "不要", "禁止", "原則", "硬性", "需求", "不做", "不改"],
    ) {
        score += 0.40;
        reasons.push("Durable preference/policy that affects future behavior.".to_string());
    }

    // Decision / architecture choices; durable setup notes count when they
    // carry stable references.
    if !is_task {
        let decision_kw = contains_any(
            &tl,
            &[
                "decide", "decision", "decided", "chose", "chosen", "we will", "we'll", "mvp",
                "scope", "architecture",
            ],
        ) || contains_any(&text, &["決定", "選擇", "採用", "方案", "架構", "範圍"]);

        let setup_kw = contains_any(&tl, &["created", "create", "added", "set up", "setup"])
            && contains_any(&tl, &["repo", "repository", "cron", "jobid", "github.com"]);

        if decision_kw || setup_kw {
            score += 0.30;
            reasons.push("Captures a decision that should be consistent over time.".to_string());
        }
    }

    // Stable identifiers & reproducible references.
    if has_ident {
        score += 0.20;
        reasons.push("Contains stable identifiers useful for future lookup/automation.".to_string());
    }

    // Operational runbooks / automation controls.
    if contains_any(
        &tl,
        &[
            "cron",
            "every ",
            "tz",
            "asia/taipei",
            "how to",
            "how to run",
            "openclaw ",
            "uv run",
            "python -m",
        ],
    ) {
        score += 0.20;
        reasons.push("Repeatable operational step; useful as a runbook.".to_string());
    }

    // Errors / incidents, plus cause/fix annotations.
    let has_error = contains_any(
        &tl,
        &[
            "error",
            "failed",
            "exception",
            "traceback",
            "timeout",
            "rate_limit",
            "unauthorized",
            "forbidden",
        ],
    );
    if has_error {
        score += 0.15;
        reasons.push("Operational issue with potential future recurrence.".to_string());

        if contains_any(
            &tl,
            &["root cause", "fixed by", "workaround", "mitigation", "resolved by"],
        ) {
            score += 0.10;
            reasons.push("Includes a cause/fix/workaround.".to_string());
        }
    }

    // Tasks / deadlines.
    if is_task {
        score += 0.20;
        reasons.push("Action item that remains relevant until done.".to_string());

        if re(&DEADLINE_RE, r"\bby\s+\d{4}-\d{2}-\d{2}\b").is_match(&tl)
            || contains_any(&text, &["今天", "明天", "之前"])
            || contains_any(&tl, &["today", "tomorrow", "eod", "before"])
        {
            score += 0.10;
            reasons.push("Has an explicit deadline/time window.".to_string());
        }
    }

    // Chit-chat / acknowledgements.
    if re(&CHAT_RE, r"\b(lol|thanks|thx|ok|got it|nice)\b").is_match(&tl)
        || contains_any(&text, &["收到", "謝謝", "哈哈"])
    {
        score -= 0.25;
        penalties.push("Acknowledgement/chit-chat; low reuse.".to_string());
    }

    // Pure progress updates.
    let progress_kw = contains_any(&tl, &["done", "finished", "pushed", "merged", "wip"]);
    if progress_kw && !(has_ident || has_error || is_task) {
        score -= 0.20;
        penalties.push("Pure progress update; low reuse.".to_string());
    }

    // Calendar-only items.
    let meeting_kw =
        contains_any(&tl, &["meeting", "call"]) || contains_any(&text, &["開會", "約"]);
    let time_kw = re(&CLOCK_RE, r"\b\d{1,2}(:\d{2}|am|pm)\b").is_match(&tl);
    if meeting_kw && time_kw && !(is_task || has_ident || has_error) {
        score -= 0.15;
        penalties.push("Calendar-only note without lasting context.".to_string());
    }

    score = clamp01(score);

    // Rationale: up to two positive reasons, plus one penalty if present.
    let mut rationale_parts: Vec<&str> = Vec::new();
    for r in &reasons {
        if !rationale_parts.contains(&r.as_str()) {
            rationale_parts.push(r);
        }
        if rationale_parts.len() >= 2 {
            break;
        }
    }
    if let Some(p) = penalties.first() {
        if rationale_parts.len() < 3 {
            rationale_parts.push(p);
        }
    }
    let rationale = if rationale_parts.is_empty() {
        "Heuristic grade.".to_string()
    } else {
        rationale_parts.join(" ")
    };

    let imp = make_importance(score, HEURISTIC_METHOD, &rationale, HEURISTIC_VERSION, None);
    GradeResult {
        score: imp.score,
        label: imp.label,
        rationale: imp.rationale,
        reasons,
        penalties,
    }
}

// ============================================================================
// TESTS
// ============================================================================

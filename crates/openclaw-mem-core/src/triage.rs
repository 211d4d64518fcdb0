//! Triage scanner: a deterministic local heartbeat.
//!
//! Raises attention flags without calling any remote service. Four modes:
//! `heartbeat` (all), `observations`, `cron-errors`, `tasks`. Watermarks in
//! a JSON state file (written atomically) deduplicate across runs, so a
//! finding alerts exactly once.

use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::importance::{parse_importance_score, starts_with_task_marker};
use crate::observation::Observation;
use crate::storage::{Result, Store, StoreError};

/// Default anomaly keywords for observations mode.
pub const DEFAULT_KEYWORDS: [&str; 10] = [
    "error",
    "failed",
    "exception",
    "traceback",
    "timeout",
    "rate_limit",
    "unauthorized",
    "forbidden",
    "not allowed",
    "db locked",
];

/// Default observation window (minutes).
pub const DEFAULT_SINCE_MINUTES: i64 = 60;

/// Default task window (minutes).
pub const DEFAULT_TASKS_SINCE_MINUTES: i64 = 24 * 60;

/// Default minimum importance for task alerts.
pub const DEFAULT_IMPORTANCE_MIN: f64 = 0.7;

// ============================================================================
// MODES / STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageMode {
    Heartbeat,
    Observations,
    CronErrors,
    Tasks,
}

impl TriageMode {
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "heartbeat" => Some(TriageMode::Heartbeat),
            "observations" => Some(TriageMode::Observations),
            "cron-errors" => Some(TriageMode::CronErrors),
            "tasks" => Some(TriageMode::Tasks),
            _ => None,
        }
    }
}

/// Persisted watermarks; items at or below these never re-alert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriageState {
    #[serde(default)]
    pub observations: StreamState,
    #[serde(default)]
    pub tasks: StreamState,
    #[serde(default)]
    pub cron: CronState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamState {
    #[serde(default)]
    pub last_alerted_id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronState {
    #[serde(default)]
    pub last_alerted_bad_run_at_ms: i64,
}

impl TriageState {
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        crate::storage::write_atomic(path, &json).map_err(StoreError::Io)
    }
}

// ============================================================================
// OPTIONS / REPORT
// ============================================================================

#[derive(Debug, Clone)]
pub struct TriageOptions {
    pub mode: TriageMode,
    pub since_minutes: i64,
    pub tasks_since_minutes: i64,
    pub limit: usize,
    pub keywords: Option<Vec<String>>,
    pub cron_jobs_path: Option<PathBuf>,
    pub importance_min: f64,
    pub state_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObservationMatch {
    pub id: i64,
    pub ts: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CronMatch {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub status: String,
    pub last_run_at_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamReport<T: Serialize> {
    pub found_new: usize,
    pub matches: Vec<T>,
}

impl<T: Serialize> Default for StreamReport<T> {
    fn default() -> Self {
        Self {
            found_new: 0,
            matches: Vec::new(),
        }
    }
}

/// Triage receipt; `needs_attention` drives the exit code (10 vs 0).
#[derive(Debug, Clone, Serialize)]
pub struct TriageReport {
    pub needs_attention: bool,
    pub observations: StreamReport<ObservationMatch>,
    pub cron: StreamReport<CronMatch>,
    pub tasks: StreamReport<ObservationMatch>,
}

// ============================================================================
// SCANNER
// ============================================================================

/// Run one triage pass, advancing watermarks for anything reported.
pub fn triage(store: &Store, opts: &TriageOptions) -> Result<TriageReport> {
    let mut state = TriageState::load(&opts.state_path);

    let run_observations = matches!(opts.mode, TriageMode::Heartbeat | TriageMode::Observations);
    let run_cron = matches!(opts.mode, TriageMode::Heartbeat | TriageMode::CronErrors);
    let run_tasks = matches!(opts.mode, TriageMode::Heartbeat | TriageMode::Tasks);

    let mut report = TriageReport {
        needs_attention: false,
        observations: StreamReport::default(),
        cron: StreamReport::default(),
        tasks: StreamReport::default(),
    };

    if run_observations {
        report.observations = scan_observations(store, opts, &mut state)?;
    }
    if run_cron {
        report.cron = scan_cron(opts, &mut state);
    }
    if run_tasks {
        report.tasks = scan_tasks(store, opts, &mut state)?;
    }

    report.needs_attention = report.observations.found_new > 0
        || report.cron.found_new > 0
        || report.tasks.found_new > 0;

    if report.needs_attention {
        state.save(&opts.state_path)?;
    }

    Ok(report)
}

fn window_start(minutes: i64) -> String {
    (Utc::now() - Duration::minutes(minutes.max(1)))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

fn scan_observations(
    store: &Store,
    opts: &TriageOptions,
    state: &mut TriageState,
) -> Result<StreamReport<ObservationMatch>> {
    let keywords: Vec<String> = opts
        .keywords
        .clone()
        .unwrap_or_else(|| DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect());

    let since = window_start(opts.since_minutes);
    let rows = store.observations_since(state.observations.last_alerted_id, &since)?;

    let mut matches = Vec::new();
    let mut max_id = state.observations.last_alerted_id;
    for obs in rows {
        if matches.len() >= opts.limit {
            break;
        }
        if observation_matches(&obs, &keywords) {
            max_id = max_id.max(obs.id);
            matches.push(ObservationMatch {
                id: obs.id,
                ts: obs.ts.clone(),
                tool_name: obs.tool_name.clone(),
                summary: obs.summary.clone(),
            });
        }
    }

    if !matches.is_empty() {
        state.observations.last_alerted_id = max_id;
    }
    Ok(StreamReport {
        found_new: matches.len(),
        matches,
    })
}

fn observation_matches(obs: &Observation, keywords: &[String]) -> bool {
    let haystack = format!(
        "{} {} {}",
        obs.summary.as_deref().unwrap_or(""),
        obs.tool_name.as_deref().unwrap_or(""),
        obs.detail_json
    )
    .to_lowercase();
    keywords.iter().any(|k| haystack.contains(&k.to_lowercase()))
}

fn scan_cron(opts: &TriageOptions, state: &mut TriageState) -> StreamReport<CronMatch> {
    let Some(path) = &opts.cron_jobs_path else {
        return StreamReport::default();
    };
    let Ok(raw) = std::fs::read_to_string(path) else {
        tracing::warn!(path = %path.display(), "cron jobs store unreadable; skipping cron scan");
        return StreamReport::default();
    };
    let Ok(root) = serde_json::from_str::<Value>(&raw) else {
        tracing::warn!(path = %path.display(), "cron jobs store malformed; skipping cron scan");
        return StreamReport::default();
    };

    let window_ms = Utc::now()
        .timestamp_millis()
        .saturating_sub(opts.since_minutes.max(1) * 60 * 1000);

    let mut matches = Vec::new();
    let mut max_seen = state.cron.last_alerted_bad_run_at_ms;
    let jobs = root.get("jobs").and_then(Value::as_array).cloned().unwrap_or_default();
    for job in jobs {
        if matches.len() >= opts.limit {
            break;
        }
        let job_state = job.get("state").cloned().unwrap_or(Value::Null);
        let status = job_state
            .get("lastStatus")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        if status.is_empty() || status == "ok" {
            continue;
        }
        let run_at = job_state.get("lastRunAtMs").and_then(Value::as_i64).unwrap_or(0);
        if run_at < window_ms || run_at <= state.cron.last_alerted_bad_run_at_ms {
            continue;
        }
        max_seen = max_seen.max(run_at);
        matches.push(CronMatch {
            id: job.get("id").and_then(Value::as_str).unwrap_or("").to_string(),
            name: job.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
            enabled: job.get("enabled").and_then(Value::as_bool).unwrap_or(false),
            status,
            last_run_at_ms: run_at,
            last_duration_ms: job_state.get("lastDurationMs").and_then(Value::as_i64),
        });
    }

    if !matches.is_empty() {
        state.cron.last_alerted_bad_run_at_ms = max_seen;
    }
    StreamReport {
        found_new: matches.len(),
        matches,
    }
}

fn scan_tasks(
    store: &Store,
    opts: &TriageOptions,
    state: &mut TriageState,
) -> Result<StreamReport<ObservationMatch>> {
    let since = window_start(opts.tasks_since_minutes);
    let rows = store.observations_since(state.tasks.last_alerted_id, &since)?;

    let mut matches = Vec::new();
    let mut max_id = state.tasks.last_alerted_id;
    for obs in rows {
        if matches.len() >= opts.limit {
            break;
        }
        if obs.tool_name.as_deref() != Some("memory_store") {
            continue;
        }
        let is_task = obs.kind.as_deref() == Some("task")
            || obs
                .summary
                .as_deref()
                .map(starts_with_task_marker)
                .unwrap_or(false);
        if !is_task {
            continue;
        }
        let importance = obs
            .detail()
            .get("importance")
            .map(parse_importance_score)
            .unwrap_or(0.0);
        if importance < opts.importance_min {
            continue;
        }
        max_id = max_id.max(obs.id);
        matches.push(ObservationMatch {
            id: obs.id,
            ts: obs.ts.clone(),
            tool_name: obs.tool_name.clone(),
            summary: obs.summary.clone(),
        });
    }

    if !matches.is_empty() {
        state.tasks.last_alerted_id = max_id;
    }
    Ok(StreamReport {
        found_new: matches.len(),
        matches,
    })
}

// ============================================================================
// TESTS
// ============================================================================

//! LanceDB writeback bridge.
//!
//! Propagates governance metadata (importance, trust, scope, category)
//! from the ledger into an external vector store. The store's native
//! runtime stays out of this crate: batches are handed to an opaque child
//! process as JSON on stdin, and its JSON report is validated on the way
//! back. The bridge is never trusted to report its own success.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::importance::{parse_importance_label, parse_importance_score, ImportanceLabel};
use crate::observation::TrustTier;
use crate::storage::Store;

/// Ledger rows inspected per run.
pub const DEFAULT_INSPECT_LIMIT: usize = 50;

/// Updates per bridge invocation.
pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Env override for the bridge executable.
pub const BRIDGE_ENV: &str = "OPENCLAW_MEM_LANCEDB_BRIDGE";

/// Default bridge executable name, resolved via PATH.
pub const DEFAULT_BRIDGE_COMMAND: &str = "openclaw-mem-lancedb-bridge";

/// Fields the bridge may overwrite when `force` is set.
pub const FORCE_FIELDS: [&str; 5] = [
    "importance",
    "importance_label",
    "scope",
    "category",
    "trust_tier",
];

/// Overwrite set used when `force` is given without an explicit list.
pub const DEFAULT_FORCE_FIELDS: [&str; 4] = ["importance", "importance_label", "scope", "category"];

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone)]
pub struct WritebackOptions {
    pub db_path: PathBuf,
    pub table_name: String,
    pub inspect_limit: usize,
    pub batch_size: usize,
    pub dry_run: bool,
    pub force: bool,
    /// Comma-separated `--force-fields` value, already split.
    pub force_fields: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum WritebackError {
    #[error("invalid force-field: {0}")]
    InvalidForceField(String),

    #[error(transparent)]
    Store(#[from] crate::storage::StoreError),

    #[error("bridge spawn failed: {0}")]
    Spawn(std::io::Error),

    #[error("bridge I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("bridge returned malformed output: {0}")]
    MalformedOutput(String),
}

/// One governance patch for one external record.
#[derive(Debug, Clone, Serialize)]
struct WritebackUpdate {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    importance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    importance_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trust_tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BridgePayload<'a> {
    db_path: String,
    table_name: &'a str,
    dry_run: bool,
    force_overwrite: bool,
    force_fields: &'a [String],
    updates: &'a [WritebackUpdate],
}

/// Counters the bridge must report per batch.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeReport {
    pub checked: u64,
    pub updated: u64,
    pub overwritten: u64,
    pub overwritten_fields: BTreeMap<String, u64>,
    pub skipped: u64,
    pub missing_ids: Vec<String>,
    pub errors: u64,
    pub error_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WritebackReceipt {
    pub inspected: usize,
    pub candidates: usize,
    pub batches: usize,
    pub dry_run: bool,
    pub report: BridgeReport,
    /// True when every batch came back clean.
    pub ok: bool,
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Run the writeback: derive patches from recent `memory_store` rows and
/// push them through the bridge in batches.
pub fn writeback(store: &Store, opts: &WritebackOptions) -> Result<WritebackReceipt, WritebackError> {
    let force_fields = resolve_force_fields(opts)?;

    let rows = store.recent_by_tool("memory_store", opts.inspect_limit.max(1))?;
    let inspected = rows.len();

    let mut updates: Vec<WritebackUpdate> = Vec::new();
    for obs in &rows {
        let detail = obs.detail();
        let Some(external_id) = extract_external_id(&detail, obs.summary.as_deref()) else {
            continue;
        };
        updates.push(derive_update(external_id, &detail));
    }

    let mut report = BridgeReport::default();
    let mut batches = 0;
    let mut ok = true;

    for batch in updates.chunks(opts.batch_size.max(1)) {
        batches += 1;
        let payload = BridgePayload {
            db_path: opts.db_path.to_string_lossy().into_owned(),
            table_name: &opts.table_name,
            dry_run: opts.dry_run,
            force_overwrite: opts.force,
            force_fields: &force_fields,
            updates: batch,
        };
        match run_bridge(&payload) {
            Ok(batch_report) => {
                if batch_report.errors > 0 {
                    ok = false;
                }
                merge_report(&mut report, batch_report);
            }
            Err(err) => {
                tracing::warn!(error = %err, "bridge batch failed");
                ok = false;
                report.errors += batch.len() as u64;
                report
                    .error_ids
                    .extend(batch.iter().map(|u| u.id.clone()));
            }
        }
    }

    Ok(WritebackReceipt {
        inspected,
        candidates: updates.len(),
        batches,
        dry_run: opts.dry_run,
        report,
        ok,
    })
}

/// Validate `--force-fields` against the closed set before any spawn.
fn resolve_force_fields(opts: &WritebackOptions) -> Result<Vec<String>, WritebackError> {
    let Some(fields) = &opts.force_fields else {
        if opts.force {
            return Ok(DEFAULT_FORCE_FIELDS.iter().map(|s| s.to_string()).collect());
        }
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for field in fields {
        let f = field.trim().to_lowercase();
        if f.is_empty() {
            continue;
        }
        if !FORCE_FIELDS.contains(&f.as_str()) {
            return Err(WritebackError::InvalidForceField(f));
        }
        if !out.contains(&f) {
            out.push(f);
        }
    }
    Ok(out)
}

static UUID_RE: OnceLock<Regex> = OnceLock::new();

fn uuid_re() -> &'static Regex {
    UUID_RE.get_or_init(|| {
        Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
            .unwrap_or_else(|_| Regex::new("$^").unwrap())
    })
}

/// Find a UUID-shaped external store id: direct detail fields, nested
/// result-ish containers, then the raw summary text.
fn extract_external_id(detail: &Value, summary: Option<&str>) -> Option<String> {
    for key in ["id", "memory_id", "memoryId", "external_id"] {
        if let Some(s) = detail.get(key).and_then(Value::as_str) {
            if let Some(m) = uuid_re().find(s) {
                return Some(m.as_str().to_lowercase());
            }
        }
    }
    for key in ["result", "response", "output", "payload", "memory", "data"] {
        if let Some(nested) = detail.get(key) {
            if let Some(found) = find_uuid_in_value(nested, 0) {
                return Some(found);
            }
        }
    }
    if let Some(found) = find_uuid_in_value(detail, 0) {
        return Some(found);
    }
    summary
        .and_then(|s| uuid_re().find(s))
        .map(|m| m.as_str().to_lowercase())
}

fn find_uuid_in_value(value: &Value, depth: usize) -> Option<String> {
    if depth > 4 {
        return None;
    }
    match value {
        Value::String(s) => uuid_re().find(s).map(|m| m.as_str().to_lowercase()),
        Value::Object(map) => map
            .values()
            .find_map(|v| find_uuid_in_value(v, depth + 1)),
        Value::Array(items) => items.iter().find_map(|v| find_uuid_in_value(v, depth + 1)),
        _ => None,
    }
}

fn derive_update(id: String, detail: &Value) -> WritebackUpdate {
    let importance = detail.get("importance");
    let score = importance.map(parse_importance_score);
    let label = importance
        .map(parse_importance_label)
        .filter(|l| *l != ImportanceLabel::Unknown)
        .map(|l| l.as_str().to_string());

    let trust = TrustTier::from_detail(detail);
    let trust_tier = (trust != TrustTier::Unknown).then(|| trust.as_str().to_string());

    let get_str = |key: &str| {
        detail
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    WritebackUpdate {
        id,
        importance: score,
        importance_label: label,
        scope: get_str("scope"),
        trust_tier,
        category: get_str("category"),
    }
}

fn merge_report(into: &mut BridgeReport, from: BridgeReport) {
    into.checked += from.checked;
    into.updated += from.updated;
    into.overwritten += from.overwritten;
    into.skipped += from.skipped;
    into.errors += from.errors;
    into.missing_ids.extend(from.missing_ids);
    into.error_ids.extend(from.error_ids);
    for (field, n) in from.overwritten_fields {
        *into.overwritten_fields.entry(field).or_default() += n;
    }
}

fn bridge_command() -> String {
    std::env::var(BRIDGE_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_BRIDGE_COMMAND.to_string())
}

fn run_bridge(payload: &BridgePayload<'_>) -> Result<BridgeReport, WritebackError> {
    let command = bridge_command();
    let mut child = Command::new(&command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(WritebackError::Spawn)?;

    let json = serde_json::to_string(payload)
        .map_err(|e| WritebackError::MalformedOutput(e.to_string()))?;
    if let Some(stdin) = child.stdin.as_mut() {
        stdin.write_all(json.as_bytes())?;
    }
    drop(child.stdin.take());

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(WritebackError::MalformedOutput(format!(
            "bridge exited with {}",
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let report: BridgeReport = serde_json::from_str(stdout.trim())
        .map_err(|e| WritebackError::MalformedOutput(e.to_string()))?;
    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================

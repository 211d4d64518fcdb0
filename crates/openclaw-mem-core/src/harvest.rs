//! Harvest pipeline: drain the append-only observation log with crash
//! resilience.
//!
//! Protocol per run:
//! 1. recovery sweep for `<log>.*.processing` orphans from interrupted runs
//! 2. atomic rotation of the live log
//! 3. per-file ingest, committed per file
//! 4. optional index refresh (non-fatal)
//! 5. optional embedding top-up (non-fatal, bounded)
//! 6. archive or delete processed files (fatal on failure)
//!
//! A crash between any two steps is recovered by the next run's sweep; a
//! record is never lost and never ingested twice.

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use crate::embeddings::{backfill_embeddings, EmbedError, EmbeddingsClient};
use crate::ingest::{ingest_reader, RunSummary, ScorerSetting};
use crate::storage::{EmbeddingTable, Store};

/// Embedding top-up bound per harvest run.
const EMBED_LIMIT: usize = 500;

// ============================================================================
// OPTIONS / RECEIPT
// ============================================================================

#[derive(Debug, Clone)]
pub struct HarvestOptions {
    /// Live log path; siblings named `<log>.*.processing` are recovered.
    pub source: PathBuf,
    /// Archive directory; `None` deletes processed files instead.
    pub archive_dir: Option<PathBuf>,
    pub scorer: ScorerSetting,
    /// Run the embedding top-up after ingest.
    pub embed: bool,
    /// Rebuild the Markdown index artifact after ingest.
    pub update_index: bool,
    pub index_path: Option<PathBuf>,
    pub embed_model: String,
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReceipt {
    pub file: String,
    pub inserted: u64,
}

/// Harvest receipt; the CLI wraps it in the versioned envelope.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestReceipt {
    pub ok: bool,
    pub processed_files: usize,
    pub recovered: bool,
    pub rotated: bool,
    pub ingested: u64,
    pub embedded: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_updated: Option<usize>,
    pub files: Vec<FileReceipt>,
    #[serde(flatten)]
    pub summary: RunSummary,
}

#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] crate::storage::StoreError),

    #[error("log rotation failed for {path}: {source}")]
    Rotation {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("archival failed for {path}: {source}")]
    Archive {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Run one harvest pass.
pub fn harvest(store: &Store, opts: &HarvestOptions) -> Result<HarvestReceipt, HarvestError> {
    let dir = opts
        .source
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let log_name = opts
        .source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "observations.jsonl".to_string());

    // 1. Recovery sweep: orphaned *.processing files from a prior crash.
    let mut queue = sweep_orphans(&dir, &log_name)?;
    let recovered = !queue.is_empty();

    // 2. Rotation. Atomic rename; older orphans sort before the new file.
    let mut rotated = false;
    if opts.source.exists() && fs::metadata(&opts.source)?.len() > 0 {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let target = dir.join(format!("{log_name}.{stamp}.processing"));
        fs::rename(&opts.source, &target).map_err(|source| HarvestError::Rotation {
            path: opts.source.clone(),
            source,
        })?;
        queue.push(target);
        rotated = true;
    }
    queue.sort();

    // 3. Ingest, one commit per file.
    let mut summary = RunSummary::default();
    let mut files = Vec::with_capacity(queue.len());
    for path in &queue {
        let reader = BufReader::new(fs::File::open(path)?);
        let file_summary = ingest_reader(store, reader, opts.scorer)?;
        files.push(FileReceipt {
            file: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            inserted: file_summary.inserted,
        });
        summary.absorb(&file_summary);
    }

    // 4. Index refresh is best-effort.
    let mut index_updated = None;
    if opts.update_index {
        let index_path = opts
            .index_path
            .clone()
            .unwrap_or_else(crate::defaults::index_path);
        match crate::graph::build_index_file(store, &index_path, crate::graph::DEFAULT_INDEX_LIMIT)
        {
            Ok(n) => index_updated = Some(n),
            Err(err) => {
                tracing::warn!(error = %err, "index refresh failed; continuing");
            }
        }
    }

    // 5. Embedding top-up is best-effort; missing credentials are a normal
    // condition, not a failure.
    let mut embedded = 0;
    let mut embed_error = None;
    if opts.embed {
        match top_up_embeddings(store, opts) {
            Ok(n) => embedded = n,
            Err(EmbedError::MissingApiKey) => {
                embed_error = Some("missing_api_key".to_string());
            }
            Err(err) => {
                embed_error = Some(err.to_string());
            }
        }
    }

    // 6. Finalization must not silently drop files.
    for path in &queue {
        finalize_file(path, opts.archive_dir.as_deref())?;
    }

    Ok(HarvestReceipt {
        ok: true,
        processed_files: queue.len(),
        recovered,
        rotated,
        ingested: summary.inserted,
        embedded,
        embed_error,
        index_updated,
        files,
        summary,
    })
}

fn sweep_orphans(dir: &Path, log_name: &str) -> std::io::Result<Vec<PathBuf>> {
    let prefix = format!("{log_name}.");
    let mut orphans = Vec::new();
    if !dir.exists() {
        return Ok(orphans);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(&prefix) && name.ends_with(".processing") {
            orphans.push(entry.path());
        }
    }
    orphans.sort();
    Ok(orphans)
}

fn top_up_embeddings(store: &Store, opts: &HarvestOptions) -> Result<usize, EmbedError> {
    let api_key = opts
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(EmbedError::MissingApiKey)?;
    let client = EmbeddingsClient::new(api_key, &opts.base_url)?;
    backfill_embeddings(
        store,
        &client,
        EmbeddingTable::Original,
        &opts.embed_model,
        EMBED_LIMIT,
    )
}

fn finalize_file(path: &Path, archive_dir: Option<&Path>) -> Result<(), HarvestError> {
    match archive_dir {
        Some(dir) => {
            let wrap = |source| HarvestError::Archive {
                path: path.to_path_buf(),
                source,
            };
            fs::create_dir_all(dir).map_err(wrap)?;
            let target = dir.join(path.file_name().unwrap_or_default());
            fs::rename(path, &target).map_err(wrap)?;
        }
        None => {
            fs::remove_file(path).map_err(|source| HarvestError::Archive {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn options(dir: &Path) -> HarvestOptions {
        HarvestOptions {
            source: dir.join("openclaw-mem-observations.jsonl"),
            archive_dir: Some(dir.join("archive")),
            scorer: ScorerSetting::Disabled,
            embed: false,
            update_index: false,
            index_path: None,
            embed_model: "test-model".to_string(),
            base_url: "https://example.com/v1".to_string(),
            api_key: None,
        }
    }

    fn write_log(path: &Path, lines: &[serde_json::Value]) {
        let joined = lines
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(path, joined + "\n").unwrap();
    }

    #[test]
    fn test_rotate_and_ingest_live_log() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let opts = options(tmp.path());
        write_log(
            &opts.source,
            &[serde_json::json!({"ts": "2026-02-18T00:00:00Z", "summary": "one"})],
        );

        let receipt = harvest(&store, &opts).unwrap();
        assert!(receipt.ok);
        assert!(receipt.rotated);
        assert!(!receipt.recovered);
        assert_eq!(receipt.ingested, 1);
        assert_eq!(receipt.processed_files, 1);
        assert!(!opts.source.exists());

        // Processed file landed in the archive.
        let archived: Vec<_> = fs::read_dir(tmp.path().join("archive"))
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(archived.len(), 1);
    }

    #[test]
    fn test_recovers_orphan_processing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let opts = options(tmp.path());

        // Simulated crash between rotation and ingest: no live log, one
        // orphaned processing file.
        let orphan = tmp
            .path()
            .join("openclaw-mem-observations.jsonl.20260218_000000.processing");
        write_log(
            &orphan,
            &[serde_json::json!({
                "ts": "2026-02-18T00:00:00Z", "kind": "tool", "tool_name": "memory_store",
                "summary": "TODO: verify harvest crash recovery", "detail": {"ok": true}
            })],
        );

        let receipt = harvest(&store, &opts).unwrap();
        assert!(receipt.ok);
        assert!(receipt.recovered);
        assert!(!receipt.rotated);
        assert_eq!(receipt.ingested, 1);
        assert_eq!(receipt.processed_files, 1);
        assert!(!orphan.exists());
        assert!(tmp
            .path()
            .join("archive")
            .join("openclaw-mem-observations.jsonl.20260218_000000.processing")
            .exists());
    }

    #[test]
    fn test_orphans_ingest_before_fresh_rotation() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let opts = options(tmp.path());

        let orphan = tmp
            .path()
            .join("openclaw-mem-observations.jsonl.20200101_000000.processing");
        write_log(&orphan, &[serde_json::json!({"summary": "older"})]);
        write_log(&opts.source, &[serde_json::json!({"summary": "newer"})]);

        let receipt = harvest(&store, &opts).unwrap();
        assert!(receipt.recovered);
        assert!(receipt.rotated);
        assert_eq!(receipt.processed_files, 2);

        // Input order is preserved: the orphan's record gets the lower id.
        let rows = store.get_observations(&[1, 2]).unwrap();
        assert_eq!(rows[0].summary.as_deref(), Some("older"));
        assert_eq!(rows[1].summary.as_deref(), Some("newer"));
    }

    #[test]
    fn test_empty_live_log_not_rotated() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let opts = options(tmp.path());
        fs::write(&opts.source, b"").unwrap();

        let receipt = harvest(&store, &opts).unwrap();
        assert!(!receipt.rotated);
        assert_eq!(receipt.processed_files, 0);
        assert!(opts.source.exists());
    }

    #[test]
    fn test_embed_without_key_reports_missing_api_key() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let mut opts = options(tmp.path());
        opts.embed = true;
        write_log(&opts.source, &[serde_json::json!({"summary": "one"})]);

        let receipt = harvest(&store, &opts).unwrap();
        assert!(receipt.ok);
        assert_eq!(receipt.embed_error.as_deref(), Some("missing_api_key"));
        assert_eq!(receipt.embedded, 0);
        assert_eq!(receipt.ingested, 1);
    }

    #[test]
    fn test_delete_mode_removes_processed_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let mut opts = options(tmp.path());
        opts.archive_dir = None;
        write_log(&opts.source, &[serde_json::json!({"summary": "one"})]);

        harvest(&store, &opts).unwrap();
        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("processing"))
            .collect();
        assert!(leftovers.is_empty());
    }
}

//! Shared helpers for the end-to-end suite.

use std::io::Cursor;

use openclaw_mem_core::{ingest_reader, RunSummary, ScorerSetting, Store};

/// Ingest JSON records into a store, panicking on failure.
pub fn ingest_values(
    store: &Store,
    records: &[serde_json::Value],
    scorer: ScorerSetting,
) -> RunSummary {
    let joined = records
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("\n");
    ingest_reader(store, Cursor::new(joined.into_bytes()), scorer).expect("ingest failed")
}

/// A fresh in-memory ledger.
pub fn temp_store() -> Store {
    Store::open_in_memory().expect("store open failed")
}

/// A fresh file-backed ledger inside a tempdir (for WAL/path behavior).
pub fn file_store(dir: &tempfile::TempDir) -> Store {
    Store::open(Some(&dir.path().join("test.sqlite"))).expect("store open failed")
}

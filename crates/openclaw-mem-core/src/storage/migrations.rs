//! Schema definition and drift migration.
//!
//! The schema is created idempotently on every open. Older databases that
//! predate the dual-language columns are upgraded in place: missing
//! `summary_en`/`lang` columns are added, and a stale full-text index is
//! dropped, recreated, and repopulated in one transaction.

use rusqlite::Connection;

/// Base schema, safe to run on every open.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS observations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ts TEXT NOT NULL,
    kind TEXT,
    summary TEXT,
    summary_en TEXT,
    lang TEXT,
    tool_name TEXT,
    detail_json TEXT
);

-- Vector storage: one embedding per observation per table, packed float32.
CREATE TABLE IF NOT EXISTS observation_embeddings (
    observation_id INTEGER PRIMARY KEY REFERENCES observations(id) ON DELETE CASCADE,
    model TEXT NOT NULL,
    dim INTEGER NOT NULL,
    vector BLOB NOT NULL,
    norm REAL NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_observation_embeddings_model
    ON observation_embeddings(model);

-- Parallel table for English-summary embeddings.
CREATE TABLE IF NOT EXISTS observation_embeddings_en (
    observation_id INTEGER PRIMARY KEY REFERENCES observations(id) ON DELETE CASCADE,
    model TEXT NOT NULL,
    dim INTEGER NOT NULL,
    vector BLOB NOT NULL,
    norm REAL NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_observation_embeddings_en_model
    ON observation_embeddings_en(model);

-- Source-capture state: per-repo commit dedupe and per-section fingerprints.
CREATE TABLE IF NOT EXISTS graph_capture_git_seen (
    repo TEXT NOT NULL,
    sha TEXT NOT NULL,
    captured_at TEXT NOT NULL,
    PRIMARY KEY (repo, sha)
);

CREATE TABLE IF NOT EXISTS graph_capture_md_seen (
    fingerprint TEXT PRIMARY KEY,
    source_path TEXT NOT NULL,
    mtime REAL NOT NULL
);
"#;

const FTS_CREATE: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS observations_fts USING fts5(
    summary, summary_en, tool_name, detail_json,
    content='observations', content_rowid='id'
);
"#;

const FTS_REPOPULATE: &str = r#"
INSERT INTO observations_fts(rowid, summary, summary_en, tool_name, detail_json)
SELECT id, summary, summary_en, tool_name, detail_json FROM observations;
"#;

/// Apply the schema, adding dual-language columns and rebuilding the FTS
/// index when an older database is opened.
pub fn apply_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)?;

    let columns = table_columns(conn, "observations")?;
    if !columns.iter().any(|c| c == "summary_en") {
        conn.execute("ALTER TABLE observations ADD COLUMN summary_en TEXT", [])?;
    }
    if !columns.iter().any(|c| c == "lang") {
        conn.execute("ALTER TABLE observations ADD COLUMN lang TEXT", [])?;
    }

    conn.execute_batch(FTS_CREATE)?;

    let fts_columns = table_columns(conn, "observations_fts")?;
    if !fts_columns.iter().any(|c| c == "summary_en") {
        // Rebuild atomically so a crash leaves either the old or new index.
        conn.execute_batch(&format!(
            "BEGIN;\nDROP TABLE observations_fts;\n{FTS_CREATE}\n{FTS_REPOPULATE}\nCOMMIT;"
        ))?;
    }

    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let cols = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(cols)
}

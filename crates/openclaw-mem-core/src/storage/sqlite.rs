//! SQLite Storage Implementation
//!
//! Durable observation ledger with an FTS5 mirror and two parallel
//! embedding tables. One connection per process invocation; WAL mode for
//! concurrent-reader safety; coarse transactions per insert batch.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::observation::{normalize_detail, Observation, ObservationInput};
use crate::vector::{l2_norm, pack_f32};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
    /// Validation error (maps to exit code 2 at the CLI boundary)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// STATUS
// ============================================================================

/// Counts reported by `status`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStatus {
    pub count: i64,
    pub min_ts: Option<String>,
    pub max_ts: Option<String>,
    pub embeddings: EmbeddingTableStatus,
    pub embeddings_en: EmbeddingTableStatus,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EmbeddingTableStatus {
    pub count: i64,
    pub models: Vec<String>,
}

/// Which of the two parallel embedding tables to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTable {
    Original,
    English,
}

impl EmbeddingTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            EmbeddingTable::Original => "observation_embeddings",
            EmbeddingTable::English => "observation_embeddings_en",
        }
    }

    /// Which observation column this table embeds.
    pub fn text_column(&self) -> &'static str {
        match self {
            EmbeddingTable::Original => "summary",
            EmbeddingTable::English => "summary_en",
        }
    }
}

// ============================================================================
// STORE
// ============================================================================

/// The observation ledger.
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (or create) the ledger at `path`; `None` resolves the default
    /// location from the environment.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let resolved = match path {
            Some(p) => p.to_path_buf(),
            None => crate::defaults::db_path(),
        };
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&resolved)?;
        Self::configure_connection(&conn)?;
        super::migrations::apply_migrations(&conn)?;
        Ok(Self {
            conn,
            path: Some(resolved),
        })
    }

    /// In-memory ledger for tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        super::migrations::apply_migrations(&conn)?;
        Ok(Self { conn, path: None })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Filesystem path of the ledger, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    // ========================================================================
    // OBSERVATIONS
    // ========================================================================

    /// Insert one observation atomically (row + FTS mirror), returning the
    /// assigned id. Text fields are expected pre-scrubbed by the ingest
    /// boundary; `ts` is stamped as UTC ISO-8601 when absent.
    pub fn insert_observation(&self, input: &ObservationInput) -> Result<i64> {
        let ts = match input.ts.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        };
        let detail = normalize_detail(input.detail.clone());
        let detail_json = serde_json::to_string(&detail)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO observations (ts, kind, summary, summary_en, lang, tool_name, detail_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                ts,
                input.kind,
                input.summary,
                input.summary_en,
                input.lang,
                input.tool_name,
                detail_json,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO observations_fts (rowid, summary, summary_en, tool_name, detail_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, input.summary, input.summary_en, input.tool_name, detail_json],
        )?;
        tx.commit()?;
        Ok(id)
    }

    /// Fetch observations by id, ascending.
    pub fn get_observations(&self, ids: &[i64]) -> Result<Vec<Observation>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "SELECT id, ts, kind, summary, summary_en, lang, tool_name, detail_json
             FROM observations WHERE id IN ({placeholders}) ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(ids.iter()), row_to_observation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn get_observation(&self, id: i64) -> Result<Option<Observation>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, ts, kind, summary, summary_en, lang, tool_name, detail_json
                 FROM observations WHERE id = ?1",
                params![id],
                row_to_observation,
            )
            .optional()?;
        Ok(row)
    }

    /// Windowed timeline: `[id - window, id + window]` around each id,
    /// deduplicated and sorted ascending.
    pub fn timeline(&self, ids: &[i64], window: i64) -> Result<Vec<Observation>> {
        let mut seen = std::collections::BTreeMap::new();
        for &id in ids {
            let lo = id.saturating_sub(window);
            let hi = id.saturating_add(window);
            let mut stmt = self.conn.prepare(
                "SELECT id, ts, kind, summary, summary_en, lang, tool_name, detail_json
                 FROM observations WHERE id BETWEEN ?1 AND ?2 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![lo, hi], row_to_observation)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for obs in rows {
                seen.entry(obs.id).or_insert(obs);
            }
        }
        Ok(seen.into_values().collect())
    }

    /// The most recent `limit` observations, ascending by id.
    pub fn recent_observations(&self, limit: usize) -> Result<Vec<Observation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ts, kind, summary, summary_en, lang, tool_name, detail_json
             FROM observations ORDER BY id DESC LIMIT ?1",
        )?;
        let mut rows = stmt
            .query_map(params![limit as i64], row_to_observation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.reverse();
        Ok(rows)
    }

    /// Recent observations from one producer, descending (newest first).
    pub fn recent_by_tool(&self, tool_name: &str, limit: usize) -> Result<Vec<Observation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ts, kind, summary, summary_en, lang, tool_name, detail_json
             FROM observations WHERE tool_name = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![tool_name, limit as i64], row_to_observation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Observations with `id > after_id` and `ts >= since_ts` (ISO-8601
    /// strings compare lexicographically), ascending.
    pub fn observations_since(&self, after_id: i64, since_ts: &str) -> Result<Vec<Observation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ts, kind, summary, summary_en, lang, tool_name, detail_json
             FROM observations WHERE id > ?1 AND ts >= ?2 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![after_id, since_ts], row_to_observation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Ledger counters for `status`.
    pub fn status(&self) -> Result<StoreStatus> {
        let (count, min_ts, max_ts) = self.conn.query_row(
            "SELECT COUNT(*), MIN(ts), MAX(ts) FROM observations",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?;
        Ok(StoreStatus {
            count,
            min_ts,
            max_ts,
            embeddings: self.embedding_status(EmbeddingTable::Original)?,
            embeddings_en: self.embedding_status(EmbeddingTable::English)?,
        })
    }

    // ========================================================================
    // EMBEDDINGS
    // ========================================================================

    /// Upsert an embedding; each observation has at most one per table.
    pub fn insert_embedding(
        &self,
        table: EmbeddingTable,
        observation_id: i64,
        model: &str,
        vector: &[f32],
    ) -> Result<()> {
        let blob = pack_f32(vector);
        let norm = l2_norm(vector);
        let sql = format!(
            "INSERT OR REPLACE INTO {} (observation_id, model, dim, vector, norm, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            table.table_name()
        );
        self.conn.execute(
            &sql,
            params![
                observation_id,
                model,
                vector.len() as i64,
                blob,
                norm,
                Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            ],
        )?;
        Ok(())
    }

    /// All `(observation_id, vector_blob, norm)` rows for one model.
    pub fn embedding_rows(
        &self,
        table: EmbeddingTable,
        model: &str,
    ) -> Result<Vec<(i64, Vec<u8>, f64)>> {
        let sql = format!(
            "SELECT observation_id, vector, norm FROM {} WHERE model = ?1",
            table.table_name()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![model], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Distinct models present in one table.
    pub fn embedding_models(&self, table: EmbeddingTable) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT model FROM {} ORDER BY model",
            table.table_name()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn embedding_status(&self, table: EmbeddingTable) -> Result<EmbeddingTableStatus> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.table_name());
        let count = self.conn.query_row(&sql, [], |r| r.get(0))?;
        Ok(EmbeddingTableStatus {
            count,
            models: self.embedding_models(table)?,
        })
    }

    /// Observations lacking an embedding in `table` for `model`, with the
    /// text that would be embedded. Used by the backfill.
    pub fn observations_missing_embedding(
        &self,
        table: EmbeddingTable,
        model: &str,
        limit: usize,
    ) -> Result<Vec<(i64, String)>> {
        let sql = format!(
            "SELECT o.id, o.{col} FROM observations o
             LEFT JOIN {tbl} e ON e.observation_id = o.id AND e.model = ?1
             WHERE e.observation_id IS NULL
               AND o.{col} IS NOT NULL AND TRIM(o.{col}) != ''
             ORDER BY o.id LIMIT ?2",
            col = table.text_column(),
            tbl = table.table_name(),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![model, limit as i64], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ========================================================================
    // CAPTURE STATE
    // ========================================================================

    pub fn git_commit_seen(&self, repo: &str, sha: &str) -> Result<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM graph_capture_git_seen WHERE repo = ?1 AND sha = ?2",
            params![repo, sha],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    pub fn mark_git_commit_seen(&self, repo: &str, sha: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO graph_capture_git_seen (repo, sha, captured_at)
             VALUES (?1, ?2, ?3)",
            params![repo, sha, Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()],
        )?;
        Ok(())
    }

    /// Backward-compat dedupe: older databases recorded captures only as
    /// observations from the capture tool itself.
    pub fn legacy_git_capture_exists(&self, repo: &str, sha: &str) -> Result<bool> {
        let pattern = format!("%\"repo\":\"{repo}\"%");
        let sha_pattern = format!("%\"sha\":\"{sha}\"%");
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM observations
             WHERE tool_name = 'graph.capture-git'
               AND detail_json LIKE ?1 AND detail_json LIKE ?2",
            params![pattern, sha_pattern],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    pub fn md_fingerprint_seen(&self, fingerprint: &str) -> Result<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM graph_capture_md_seen WHERE fingerprint = ?1",
            params![fingerprint],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    pub fn mark_md_fingerprint_seen(
        &self,
        fingerprint: &str,
        source_path: &str,
        mtime: f64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO graph_capture_md_seen (fingerprint, source_path, mtime)
             VALUES (?1, ?2, ?3)",
            params![fingerprint, source_path, mtime],
        )?;
        Ok(())
    }

    /// Newest recorded mtime for a scanned file, if any.
    pub fn md_file_last_mtime(&self, source_path: &str) -> Result<Option<f64>> {
        let mtime = self
            .conn
            .query_row(
                "SELECT MAX(mtime) FROM graph_capture_md_seen WHERE source_path = ?1",
                params![source_path],
                |r| r.get::<_, Option<f64>>(0),
            )
            .optional()?
            .flatten();
        Ok(mtime)
    }
}

fn row_to_observation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Observation> {
    Ok(Observation {
        id: row.get(0)?,
        ts: row.get(1)?,
        kind: row.get(2)?,
        summary: row.get(3)?,
        summary_en: row.get(4)?,
        lang: row.get(5)?,
        tool_name: row.get(6)?,
        detail_json: row.get::<_, Option<String>>(7)?.unwrap_or_else(|| "{}".to_string()),
    })
}

// ============================================================================
// TESTS
// ============================================================================

//! # openclaw-mem-core
//!
//! Local-first, agent-facing memory engine:
//!
//! - **Observation ledger**: SQLite + FTS5, append-only from the agent's
//!   point of view, enriched in place (importance autograde, embeddings)
//! - **Hybrid retrieval**: lexical + cosine lanes fused with Reciprocal
//!   Rank Fusion, optional external rerank with fail-open fallback
//! - **Context packs**: budget-bounded, citation-safe payloads with a
//!   versioned retrieval trace (`pack.trace.v1`)
//! - **Harvest**: crash-resilient log drain (rotate, recover, archive)
//! - **Triage**: deterministic local heartbeat with watermark dedupe
//! - **Graph-lite**: index-first recall over timeline adjacency plus
//!   idempotent git/Markdown source capture
//! - **Writeback**: governance metadata pushed to an external vector
//!   store through an opaque bridge subprocess
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use openclaw_mem_core::{Store, ObservationInput};
//!
//! let store = Store::open(None)?;
//! let id = store.insert_observation(&ObservationInput {
//!     summary: Some("gateway timeout while fetching docs".into()),
//!     tool_name: Some("web_fetch".into()),
//!     ..Default::default()
//! })?;
//! ```

// ============================================================================
// MODULES
// ============================================================================

pub mod defaults;
pub mod embeddings;
pub mod graph;
pub mod harvest;
pub mod importance;
pub mod ingest;
pub mod observation;
pub mod pack;
pub mod search;
pub mod storage;
pub mod text;
pub mod triage;
pub mod vector;
pub mod writeback;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use observation::{normalize_detail, Observation, ObservationInput, TrustTier};

pub use importance::{
    grade_observation, is_parseable_importance, label_from_score, make_importance,
    parse_importance_label, parse_importance_score, starts_with_task_marker, GradeInput,
    GradeResult, ImportanceLabel, ImportanceRecord, HEURISTIC_METHOD, HEURISTIC_VERSION,
};

pub use storage::{
    write_atomic, EmbeddingTable, EmbeddingTableStatus, Store, StoreError, StoreStatus,
};

pub use ingest::{ingest_reader, RunSummary, ScorerSetting, SCORER_HEURISTIC_V1};

pub use harvest::{harvest, FileReceipt, HarvestError, HarvestOptions, HarvestReceipt};

pub use embeddings::{backfill_embeddings, EmbedError, EmbeddingsClient};

pub use search::{
    sanitize_fts_query, search_cjk_fallback, search_hybrid, search_lexical, search_vector,
    search_vector_english, HybridHit, HybridOptions, LexicalHit, RerankError, RerankOptions,
    RerankProvider, SearchError, DEFAULT_RERANK_TIMEOUT_SECS, DEFAULT_RERANK_TOPN, DEFAULT_RRF_K,
};

pub use pack::{
    build_pack, PackCitation, PackError, PackItem, PackOptions, PackResult, PackTraceV1,
    DEFAULT_BUDGET_TOKENS, DEFAULT_PACK_LIMIT, PACK_TRACE_V1_KIND,
};

pub use triage::{
    triage, CronMatch, ObservationMatch, StreamReport, TriageMode, TriageOptions, TriageReport,
    TriageState, DEFAULT_IMPORTANCE_MIN, DEFAULT_SINCE_MINUTES, DEFAULT_TASKS_SINCE_MINUTES,
};

pub use graph::{
    build_context_pack, build_index_file, build_index_pack, capture_git, capture_markdown,
    preflight, ContextPack, GitCaptureOptions, GitCaptureReceipt, IndexPack, IndexPackOptions,
    MdCaptureOptions, MdCaptureReceipt, DEFAULT_INDEX_LIMIT,
};

pub use writeback::{
    writeback, BridgeReport, WritebackError, WritebackOptions, WritebackReceipt,
    DEFAULT_BATCH_SIZE, DEFAULT_INSPECT_LIMIT,
};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Receipt schema tag for v0 pipeline receipts.
pub const RECEIPT_SCHEMA_V0: &str = "v0";

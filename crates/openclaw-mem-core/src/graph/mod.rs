//! Graph-lite helpers: index-first recall and deterministic source capture.
//!
//! No graph database, no edges table. The ledger's id sequence is the
//! timeline; adjacency over it is enough for "what happened around this"
//! navigation. Captures are strictly index-only: fingerprints and
//! identifiers, never raw bodies.

mod capture;
mod index;
mod index_file;

pub use capture::{
    capture_git, capture_markdown, GitCaptureOptions, GitCaptureReceipt, GitCaptureState,
    MdCaptureOptions, MdCaptureReceipt, DEFAULT_LOOKBACK_HOURS, DEFAULT_MAX_COMMITS,
    DEFAULT_MIN_HEADING_LEVEL, GIT_CAPTURE_TOOL, MD_CAPTURE_TOOL,
};
pub use index::{
    build_context_pack, build_index_pack, parse_record_refs, preflight, ContextPack, IndexPack,
    IndexPackOptions, Suggestion, DEFAULT_ADJACENCY_WINDOW,
};
pub use index_file::{
    build_index_file, extract_obs_ids, rank_obs_ids_from_snippet, tokenize_query,
    DEFAULT_INDEX_LIMIT,
};

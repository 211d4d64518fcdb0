//! Retrieval engine.
//!
//! Four modes over shared primitives:
//! - lexical (FTS5 + CJK fallback)
//! - vector (cosine over the embedding tables)
//! - hybrid (RRF fusion of both, plus the English route)
//! - hybrid + external rerank (fail-open)

mod hybrid;
mod lexical;
mod rerank;
mod semantic;

pub use hybrid::{search_hybrid, HybridHit, HybridOptions, DEFAULT_RRF_K};
pub use lexical::{
    cjk_terms, contains_cjk, sanitize_fts_query, search_cjk_fallback, search_lexical, LexicalHit,
};
pub use rerank::{
    RerankError, RerankOptions, RerankProvider, DEFAULT_RERANK_TIMEOUT_SECS, DEFAULT_RERANK_TOPN,
};
pub use semantic::{search_vector, search_vector_english};

/// Retrieval error: storage problems or a failed embedding call the caller
/// explicitly asked for.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Store(#[from] crate::storage::StoreError),

    #[error(transparent)]
    Embed(#[from] crate::embeddings::EmbedError),
}

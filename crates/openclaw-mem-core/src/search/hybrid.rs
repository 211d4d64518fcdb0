//! Hybrid retrieval: lexical + vector lanes fused with RRF, plus the
//! optional external rerank stage.
//!
//! The fused ordering is the contract; reranking may only reorder a prefix
//! and must fail open back to it.

use crate::embeddings::EmbeddingsClient;
use crate::observation::Observation;
use crate::storage::{EmbeddingTable, Store};
use crate::vector::rank_rrf;

use super::lexical::search_lexical;
use super::rerank::{apply_rerank_order, rerank_call, RerankOptions};
use super::semantic::{search_vector, search_vector_english};
use super::SearchError;

/// Default RRF smoothing constant.
pub const DEFAULT_RRF_K: u32 = 60;

/// Retrieval options shared by `hybrid` and the pack builder.
#[derive(Debug, Clone)]
pub struct HybridOptions {
    pub limit: usize,
    pub k: u32,
    pub model: String,
    pub query_en: Option<String>,
    pub rerank: Option<RerankOptions>,
    /// Caller-supplied inner candidate limit (pack builder widens this).
    pub candidate_limit: Option<usize>,
}

impl HybridOptions {
    pub fn new(model: &str) -> Self {
        Self {
            limit: 20,
            k: DEFAULT_RRF_K,
            model: model.to_string(),
            query_en: None,
            rerank: None,
            candidate_limit: None,
        }
    }

    /// Inner candidate pool: wider than the user limit so fusion and rerank
    /// have material to work with.
    fn inner_limit(&self) -> usize {
        let base = self.candidate_limit.unwrap_or(self.limit.saturating_mul(2));
        match &self.rerank {
            Some(r) => base.max(r.topn.saturating_mul(3)),
            None => base,
        }
    }
}

/// One fused retrieval hit with lane provenance.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HybridHit {
    #[serde(flatten)]
    pub observation: Observation,
    pub rrf_score: f64,
    /// Lanes that surfaced this row: `fts`, `vector`, `vector_en`.
    #[serde(rename = "match")]
    pub matches: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fts_rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vec_rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank_stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
}

/// Run the full hybrid retrieval pipeline.
///
/// Without an embedder the vector lanes are skipped and fusion degrades to
/// the lexical ordering; embedding failures with an embedder present
/// propagate (the caller asked for semantic retrieval and cannot get it).
pub fn search_hybrid(
    store: &Store,
    embedder: Option<&EmbeddingsClient>,
    query: &str,
    opts: &HybridOptions,
) -> Result<Vec<HybridHit>, SearchError> {
    let inner_limit = opts.inner_limit();

    let lexical = search_lexical(store, query, inner_limit)?;
    let fts_ids: Vec<i64> = lexical.iter().map(|h| h.observation.id).collect();

    let mut vec_ids: Vec<i64> = Vec::new();
    let mut vec_en_ids: Vec<i64> = Vec::new();

    if let Some(client) = embedder {
        let mut texts = vec![query.to_string()];
        if let Some(en) = opts.query_en.as_deref() {
            texts.push(en.to_string());
        }
        let mut vectors = client.embed(&texts, &opts.model)?;

        let query_vec = vectors.remove(0);
        vec_ids = search_vector(store, EmbeddingTable::Original, &opts.model, &query_vec, inner_limit)?
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        if !vectors.is_empty() {
            let en_vec = vectors.remove(0);
            let (hits, _table) = search_vector_english(store, &opts.model, &en_vec, inner_limit)?;
            vec_en_ids = hits.into_iter().map(|(id, _)| id).collect();
        }
    }

    let mut lanes: Vec<Vec<i64>> = vec![fts_ids.clone()];
    if embedder.is_some() {
        lanes.push(vec_ids.clone());
        if !vec_en_ids.is_empty() {
            lanes.push(vec_en_ids.clone());
        }
    }

    let fused = rank_rrf(&lanes, opts.k, inner_limit);

    // Resolve rows and lane provenance.
    let ids: Vec<i64> = fused.iter().map(|(id, _)| *id).collect();
    let rows = store.get_observations(&ids)?;
    let by_id: std::collections::HashMap<i64, Observation> =
        rows.into_iter().map(|o| (o.id, o)).collect();

    let fts_rank_of = |id: i64| fts_ids.iter().position(|&x| x == id);
    let vec_rank_of = |id: i64| vec_ids.iter().position(|&x| x == id);

    let mut hits: Vec<HybridHit> = Vec::with_capacity(fused.len());
    for (id, rrf_score) in fused {
        let Some(observation) = by_id.get(&id).cloned() else {
            continue;
        };
        let mut matches = Vec::new();
        if fts_ids.contains(&id) {
            matches.push("fts".to_string());
        }
        if vec_ids.contains(&id) {
            matches.push("vector".to_string());
        }
        if vec_en_ids.contains(&id) {
            matches.push("vector_en".to_string());
        }
        hits.push(HybridHit {
            fts_rank: fts_rank_of(id).map(|r| r + 1),
            vec_rank: vec_rank_of(id).map(|r| r + 1),
            observation,
            rrf_score,
            matches,
            rerank_provider: None,
            rank_stage: None,
            rerank_score: None,
        });
    }

    if let Some(rerank) = &opts.rerank {
        hits = apply_rerank_stage(hits, rerank, query, opts.query_en.as_deref());
    }

    hits.truncate(opts.limit);
    Ok(hits)
}

/// Rerank the head of the fused list; any failure keeps the base ordering.
fn apply_rerank_stage(
    hits: Vec<HybridHit>,
    rerank: &RerankOptions,
    query: &str,
    query_en: Option<&str>,
) -> Vec<HybridHit> {
    let provider = rerank.provider.as_str().to_string();
    let head_len = hits.len().min(rerank.topn.saturating_mul(3));
    if head_len == 0 {
        return hits;
    }

    let documents: Vec<String> = hits[..head_len]
        .iter()
        .map(|h| h.observation.packed_text().unwrap_or_default().to_string())
        .collect();
    let rerank_query = query_en.unwrap_or(query);

    let mut out = match rerank_call(rerank, rerank_query, &documents) {
        Ok(winners) => {
            let head: Vec<HybridHit> = hits[..head_len].to_vec();
            let mut reordered: Vec<HybridHit> = apply_rerank_order(&head, &winners)
                .into_iter()
                .map(|(mut hit, score)| {
                    if let Some(s) = score {
                        hit.rank_stage = Some("reranked".to_string());
                        hit.rerank_score = Some(s);
                    }
                    hit
                })
                .collect();
            reordered.extend(hits[head_len..].iter().cloned());
            reordered
        }
        Err(err) => {
            tracing::warn!(provider = %provider, error = %err, "rerank failed; keeping RRF order");
            hits
        }
    };

    for hit in &mut out {
        hit.rerank_provider = Some(provider.clone());
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================

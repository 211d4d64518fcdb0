//! Pack builder: budget-bounded, cited injection payloads.
//!
//! Selects candidates in fused RRF order, packs them under an explicit
//! token budget, and emits one citation per included item. With the trace
//! flag set, every decision is recorded in the versioned
//! `openclaw-mem.pack.trace.v1` contract.

mod trace;

pub use trace::{
    v1_lanes, PackTraceBudgets, PackTraceCandidate, PackTraceCaps, PackTraceCitations,
    PackTraceCoverage, PackTraceDecision, PackTraceLane, PackTraceOutput, PackTraceQuery,
    PackTraceRetriever, PackTraceScores, PackTraceTiming, PackTraceV1, PackTraceVersion,
    PACK_TRACE_V1_KIND,
};

use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use crate::embeddings::EmbeddingsClient;
use crate::importance::parse_importance_label;
use crate::observation::TrustTier;
use crate::search::{search_hybrid, HybridOptions, SearchError, DEFAULT_RRF_K};
use crate::storage::Store;
use crate::text::{estimate_tokens, one_line};

/// Default item cap.
pub const DEFAULT_PACK_LIMIT: usize = 12;

/// Default token budget.
pub const DEFAULT_BUDGET_TOKENS: usize = 1200;

// Decision reason vocabulary; nothing else may appear in a reason array.
pub const REASON_MISSING_ROW: &str = "missing_row";
pub const REASON_MISSING_SUMMARY: &str = "missing_summary";
pub const REASON_MAX_ITEMS: &str = "max_items_reached";
pub const REASON_BUDGET_EXCEEDED: &str = "budget_tokens_exceeded";
pub const REASON_WITHIN_ITEM_LIMIT: &str = "within_item_limit";
pub const REASON_WITHIN_BUDGET: &str = "within_budget";
pub const REASON_MATCHED_FTS: &str = "matched_fts";
pub const REASON_MATCHED_VECTOR: &str = "matched_vector";

// ============================================================================
// OPTIONS / RESULT
// ============================================================================

#[derive(Debug, Clone)]
pub struct PackOptions {
    pub limit: usize,
    pub budget_tokens: usize,
    pub query_en: Option<String>,
    pub model: String,
    pub trace: bool,
}

impl PackOptions {
    pub fn new(model: &str) -> Self {
        Self {
            limit: DEFAULT_PACK_LIMIT,
            budget_tokens: DEFAULT_BUDGET_TOKENS,
            query_en: None,
            model: model.to_string(),
            trace: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackItem {
    pub record_ref: String,
    pub layer: String,
    pub id: i64,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackCitation {
    pub record_ref: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackResult {
    pub bundle_text: String,
    pub items: Vec<PackItem>,
    pub citations: Vec<PackCitation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<PackTraceV1>,
}

#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("empty query")]
    EmptyQuery,

    #[error(transparent)]
    Search(#[from] SearchError),
}

// ============================================================================
// BUILDER
// ============================================================================

/// Build a pack for `query`. Reranking is disabled here: the budget walk
/// wants the deterministic fused ordering.
pub fn build_pack(
    store: &Store,
    embedder: Option<&EmbeddingsClient>,
    query: &str,
    opts: &PackOptions,
) -> Result<PackResult, PackError> {
    let started = Instant::now();
    let query = query.trim();
    if query.is_empty() {
        return Err(PackError::EmptyQuery);
    }

    let limit = opts.limit.max(1);
    let budget = opts.budget_tokens.max(1);
    let candidate_limit = std::cmp::max(limit * 3, limit + 8);

    let mut search_opts = HybridOptions::new(&opts.model);
    search_opts.limit = candidate_limit;
    search_opts.candidate_limit = Some(candidate_limit);
    search_opts.query_en = opts.query_en.clone();
    let hits = search_hybrid(store, embedder, query, &search_opts)?;

    let mut items: Vec<PackItem> = Vec::new();
    let mut citations: Vec<PackCitation> = Vec::new();
    let mut lines: Vec<String> = Vec::new();
    let mut candidates: Vec<PackTraceCandidate> = Vec::new();
    let mut used_tokens = 0usize;

    for hit in &hits {
        let record_ref = hit.observation.record_ref();
        let matched_fts = hit.matches.iter().any(|m| m == "fts");
        let matched_vector = hit.matches.iter().any(|m| m.starts_with("vector"));

        let text = hit.observation.packed_text().map(one_line);
        let mut reasons: Vec<String> = Vec::new();
        let mut included = false;

        match text {
            None => reasons.push(REASON_MISSING_SUMMARY.to_string()),
            Some(text) => {
                let estimate = estimate_tokens(&text);
                if items.len() >= limit {
                    reasons.push(REASON_MAX_ITEMS.to_string());
                } else if used_tokens + estimate > budget {
                    reasons.push(REASON_BUDGET_EXCEEDED.to_string());
                } else {
                    included = true;
                    used_tokens += estimate;
                    reasons.push(REASON_WITHIN_ITEM_LIMIT.to_string());
                    reasons.push(REASON_WITHIN_BUDGET.to_string());
                    if matched_fts {
                        reasons.push(REASON_MATCHED_FTS.to_string());
                    }
                    if matched_vector {
                        reasons.push(REASON_MATCHED_VECTOR.to_string());
                    }

                    lines.push(format!("- [{record_ref}] {text}"));
                    items.push(PackItem {
                        record_ref: record_ref.clone(),
                        layer: "L1".to_string(),
                        id: hit.observation.id,
                        summary: text,
                        kind: hit.observation.kind.clone(),
                        lang: hit.observation.lang.clone(),
                    });
                    citations.push(PackCitation {
                        record_ref: record_ref.clone(),
                        url: None,
                    });
                }
            }
        }

        if opts.trace {
            let detail = hit.observation.detail();
            let importance = detail
                .get("importance")
                .map(parse_importance_label)
                .unwrap_or_default();
            candidates.push(PackTraceCandidate {
                id: record_ref.clone(),
                layer: "L1".to_string(),
                importance: importance.as_str().to_string(),
                trust: TrustTier::from_detail(&detail).as_str().to_string(),
                scores: PackTraceScores {
                    rrf: hit.rrf_score,
                    fts: if matched_fts { 1.0 } else { 0.0 },
                    semantic: if matched_vector { 1.0 } else { 0.0 },
                },
                decision: PackTraceDecision {
                    included,
                    reason: reasons.clone(),
                    rationale: reasons.clone(),
                    caps: PackTraceCaps {
                        nice_cap_hit: false,
                        l2_cap_hit: false,
                    },
                },
                citations: PackTraceCitations {
                    url: None,
                    record_ref,
                },
            });
        }
    }

    let trace = opts.trace.then(|| {
        let included_count = items.len();
        let excluded_count = candidates.len().saturating_sub(included_count);
        let refreshed: Vec<String> = items.iter().map(|i| i.record_ref.clone()).collect();
        let coverage = PackTraceCoverage {
            all_included_have_rationale: candidates
                .iter()
                .filter(|c| c.decision.included)
                .all(|c| !c.decision.rationale.is_empty()),
            all_included_have_citation: candidates
                .iter()
                .filter(|c| c.decision.included)
                .all(|c| !c.citations.record_ref.is_empty()),
        };
        PackTraceV1 {
            kind: PACK_TRACE_V1_KIND.to_string(),
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            version: PackTraceVersion {
                openclaw_mem: crate::VERSION.to_string(),
                schema: "v1".to_string(),
            },
            query: PackTraceQuery {
                text: query.to_string(),
                scope: None,
                intent: None,
            },
            budgets: PackTraceBudgets {
                budget_tokens: budget,
                max_items: limit,
                max_l2_items: 0,
                nice_cap: 100,
            },
            lanes: v1_lanes(candidate_limit, DEFAULT_RRF_K),
            candidates,
            output: PackTraceOutput {
                included_count,
                excluded_count,
                l2_included_count: 0,
                citations_count: citations.len(),
                refreshed_record_refs: refreshed,
                coverage,
            },
            timing: PackTraceTiming {
                duration_ms: started.elapsed().as_millis() as u64,
            },
        }
    });

    Ok(PackResult {
        bundle_text: lines.join("\n"),
        items,
        citations,
        trace,
    })
}

// ============================================================================
// TESTS
// ============================================================================

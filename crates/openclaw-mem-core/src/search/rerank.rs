//! External reranking with fail-open semantics.
//!
//! A single rerank HTTP call reorders the head of the fused candidate list.
//! Every failure path - missing key, unknown provider, network error,
//! malformed response - leaves the base RRF ordering untouched; retrieval
//! quality degrades, retrieval itself never does.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default rerank call timeout.
pub const DEFAULT_RERANK_TIMEOUT_SECS: u64 = 15;

/// Default number of results the reranker is asked for.
pub const DEFAULT_RERANK_TOPN: usize = 10;

// ============================================================================
// TYPES
// ============================================================================

/// Supported rerank providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankProvider {
    Jina,
    Cohere,
}

impl RerankProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            RerankProvider::Jina => "jina",
            RerankProvider::Cohere => "cohere",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "jina" => Some(RerankProvider::Jina),
            "cohere" => Some(RerankProvider::Cohere),
            _ => None,
        }
    }

    fn endpoint(&self) -> &'static str {
        match self {
            RerankProvider::Jina => "https://api.jina.ai/v1/rerank",
            RerankProvider::Cohere => "https://api.cohere.com/v2/rerank",
        }
    }
}

/// Rerank configuration carried by a retrieval call.
#[derive(Debug, Clone)]
pub struct RerankOptions {
    pub provider: RerankProvider,
    pub api_key: Option<String>,
    pub model: String,
    pub topn: usize,
    pub timeout_secs: u64,
}

impl RerankOptions {
    pub fn new(provider: RerankProvider, api_key: Option<String>, model: String) -> Self {
        Self {
            provider,
            api_key,
            model,
            topn: DEFAULT_RERANK_TOPN,
            timeout_secs: DEFAULT_RERANK_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RerankError {
    #[error("missing_api_key")]
    MissingApiKey,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider API error: status={status}, body={body}")]
    Api { status: u16, body: String },

    #[error("provider returned invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f64,
}

// ============================================================================
// CALL + REORDER
// ============================================================================

/// Issue one rerank call. Returns `(candidate_index, score)` pairs sorted by
/// provider score descending.
pub fn rerank_call(
    opts: &RerankOptions,
    query: &str,
    documents: &[String],
) -> Result<Vec<(usize, f64)>, RerankError> {
    let api_key = opts
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(RerankError::MissingApiKey)?;

    let http = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(opts.timeout_secs))
        .build()?;

    let response = http
        .post(opts.provider.endpoint())
        .bearer_auth(api_key)
        .json(&RerankRequest {
            model: &opts.model,
            query,
            documents,
            top_n: opts.topn.min(documents.len()),
        })
        .send()?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(RerankError::Api {
            status: status.as_u16(),
            body,
        });
    }

    let parsed: RerankResponse = response
        .json()
        .map_err(|e| RerankError::InvalidResponse(e.to_string()))?;

    let mut pairs: Vec<(usize, f64)> = Vec::with_capacity(parsed.results.len());
    for r in parsed.results {
        if r.index >= documents.len() {
            return Err(RerankError::InvalidResponse(format!(
                "result index {} out of range ({} documents)",
                r.index,
                documents.len()
            )));
        }
        pairs.push((r.index, r.relevance_score));
    }
    pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    Ok(pairs)
}

/// Reorder `items` so the reranked winners lead (by provider score) and the
/// remaining candidates follow in their original order.
pub fn apply_rerank_order<T: Clone>(items: &[T], winners: &[(usize, f64)]) -> Vec<(T, Option<f64>)> {
    let mut out: Vec<(T, Option<f64>)> = Vec::with_capacity(items.len());
    let mut taken = vec![false; items.len()];

    for (idx, score) in winners {
        if let Some(item) = items.get(*idx) {
            if !taken[*idx] {
                taken[*idx] = true;
                out.push((item.clone(), Some(*score)));
            }
        }
    }
    for (idx, item) in items.iter().enumerate() {
        if !taken[idx] {
            out.push((item.clone(), None));
        }
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!(RerankProvider::parse_name(" Jina "), Some(RerankProvider::Jina));
        assert_eq!(RerankProvider::parse_name("cohere"), Some(RerankProvider::Cohere));
        assert_eq!(RerankProvider::parse_name("voyage"), None);
    }

    #[test]
    fn test_missing_key_is_an_error_before_any_network() {
        let opts = RerankOptions::new(RerankProvider::Jina, None, "m".to_string());
        let err = rerank_call(&opts, "q", &["d".to_string()]).unwrap_err();
        assert!(matches!(err, RerankError::MissingApiKey));
    }

    #[test]
    fn test_apply_rerank_order_prefix_then_rrf_tail() {
        let items = vec!["a", "b", "c", "d"];
        // Provider promoted c then a; b and d keep base order behind them.
        let reordered = apply_rerank_order(&items, &[(2, 0.9), (0, 0.5)]);
        let order: Vec<&str> = reordered.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec!["c", "a", "b", "d"]);
        assert_eq!(reordered[0].1, Some(0.9));
        assert_eq!(reordered[2].1, None);
    }

    #[test]
    fn test_apply_rerank_order_ignores_out_of_range() {
        let items = vec!["a"];
        let reordered = apply_rerank_order(&items, &[(7, 0.9)]);
        let order: Vec<&str> = reordered.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec!["a"]);
    }
}

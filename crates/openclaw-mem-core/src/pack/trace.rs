//! Pack trace schema (v1).
//!
//! The redaction-safe, versioned `pack --trace` receipt contract. The trace
//! records *retrieval decisions* (why included/excluded), never content:
//! no raw memory text, no secrets, no absolute local paths. Fields are
//! stable for v1; additions require a new schema tag.

use serde::Serialize;

pub const PACK_TRACE_V1_KIND: &str = "openclaw-mem.pack.trace.v1";

#[derive(Debug, Clone, Serialize)]
pub struct PackTraceVersion {
    pub openclaw_mem: String,
    pub schema: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackTraceQuery {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackTraceBudgets {
    pub budget_tokens: usize,
    pub max_items: usize,
    /// Reserved for a future L2 layer; always 0 in v1.
    pub max_l2_items: usize,
    /// Reserved nice-to-have cap; always 100 in v1.
    pub nice_cap: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackTraceRetriever {
    pub kind: String,
    #[serde(rename = "topK", skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackTraceLane {
    pub name: String,
    pub source: String,
    pub searched: bool,
    pub retrievers: Vec<PackTraceRetriever>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackTraceCaps {
    pub nice_cap_hit: bool,
    pub l2_cap_hit: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackTraceDecision {
    pub included: bool,
    pub reason: Vec<String>,
    /// Mirror of `reason`; kept separate so consumers relying on either
    /// name keep working for the life of v1.
    pub rationale: Vec<String>,
    pub caps: PackTraceCaps,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackTraceScores {
    pub rrf: f64,
    pub fts: f64,
    pub semantic: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackTraceCitations {
    pub url: Option<String>,
    pub record_ref: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackTraceCandidate {
    pub id: String,
    pub layer: String,
    pub importance: String,
    pub trust: String,
    pub scores: PackTraceScores,
    pub decision: PackTraceDecision,
    pub citations: PackTraceCitations,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackTraceCoverage {
    pub all_included_have_rationale: bool,
    pub all_included_have_citation: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackTraceOutput {
    pub included_count: usize,
    pub excluded_count: usize,
    pub l2_included_count: usize,
    pub citations_count: usize,
    pub refreshed_record_refs: Vec<String>,
    pub coverage: PackTraceCoverage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackTraceTiming {
    pub duration_ms: u64,
}

/// One pack invocation's full decision record.
#[derive(Debug, Clone, Serialize)]
pub struct PackTraceV1 {
    pub kind: String,
    pub ts: String,
    pub version: PackTraceVersion,
    pub query: PackTraceQuery,
    pub budgets: PackTraceBudgets,
    pub lanes: Vec<PackTraceLane>,
    pub candidates: Vec<PackTraceCandidate>,
    pub output: PackTraceOutput,
    pub timing: PackTraceTiming,
}

/// The fixed v1 lane description: hot (session) and cold (curated) exist
/// but are not searched; warm is the ledger with its three retrievers.
pub fn v1_lanes(top_k: usize, k: u32) -> Vec<PackTraceLane> {
    vec![
        PackTraceLane {
            name: "hot".to_string(),
            source: "session/recent".to_string(),
            searched: false,
            retrievers: Vec::new(),
        },
        PackTraceLane {
            name: "warm".to_string(),
            source: "ledger".to_string(),
            searched: true,
            retrievers: vec![
                PackTraceRetriever {
                    kind: "fts5".to_string(),
                    top_k: Some(top_k),
                    k: None,
                },
                PackTraceRetriever {
                    kind: "vector".to_string(),
                    top_k: Some(top_k),
                    k: None,
                },
                PackTraceRetriever {
                    kind: "rrf".to_string(),
                    top_k: None,
                    k: Some(k),
                },
            ],
        },
        PackTraceLane {
            name: "cold".to_string(),
            source: "curated/durable".to_string(),
            searched: false,
            retrievers: Vec::new(),
        },
    ]
}

//! IndexPack / ContextPack: progressive-disclosure recall payloads.
//!
//! The index is a short pointer list plus suggested expansions from
//! timeline adjacency; the context pack is the selected material, loaded
//! and budgeted. Both respect the token estimator with a hard character
//! truncation as a safety net.

use serde::Serialize;

use crate::observation::Observation;
use crate::search::search_lexical;
use crate::storage::{Result, Store};
use crate::text::estimate_tokens;

/// Timeline adjacency half-window for suggestions.
pub const DEFAULT_ADJACENCY_WINDOW: i64 = 3;

#[derive(Debug, Clone)]
pub struct IndexPackOptions {
    pub limit: usize,
    pub budget_tokens: usize,
    pub window: i64,
}

impl Default for IndexPackOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            budget_tokens: 600,
            window: DEFAULT_ADJACENCY_WINDOW,
        }
    }
}

/// A suggested expansion: a neighbor id and how many candidates it borders.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub id: i64,
    pub support: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexPack {
    pub text: String,
    pub candidate_refs: Vec<String>,
    pub suggestions: Vec<Suggestion>,
    pub estimated_tokens: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextPack {
    pub text: String,
    pub refs: Vec<String>,
    pub estimated_tokens: usize,
}

// ============================================================================
// INDEX
// ============================================================================

/// Build an `IndexPack` for a query: header, top lexical candidates, and
/// adjacency-derived suggestions, all inside the token budget.
pub fn build_index_pack(store: &Store, query: &str, opts: &IndexPackOptions) -> Result<IndexPack> {
    let budget = opts.budget_tokens.max(1);
    let hits = search_lexical(store, query, opts.limit.max(1))?;

    let candidates: Vec<&Observation> = hits.iter().map(|h| &h.observation).collect();
    let candidate_ids: Vec<i64> = candidates.iter().map(|o| o.id).collect();

    // Suggested next expansions: neighbors of candidates ranked by how many
    // candidates they are adjacent to, then by ascending id.
    let mut support: std::collections::HashMap<i64, usize> = std::collections::HashMap::new();
    for &id in &candidate_ids {
        let lo = id.saturating_sub(opts.window).max(1);
        let hi = id.saturating_add(opts.window);
        for neighbor in lo..=hi {
            if !candidate_ids.contains(&neighbor) {
                *support.entry(neighbor).or_default() += 1;
            }
        }
    }
    // Only suggest rows that exist.
    let neighbor_ids: Vec<i64> = support.keys().copied().collect();
    let existing: std::collections::HashSet<i64> = store
        .get_observations(&neighbor_ids)?
        .into_iter()
        .map(|o| o.id)
        .collect();

    let mut suggestions: Vec<Suggestion> = support
        .into_iter()
        .filter(|(id, _)| existing.contains(id))
        .map(|(id, support)| Suggestion { id, support })
        .collect();
    suggestions.sort_by(|a, b| b.support.cmp(&a.support).then_with(|| a.id.cmp(&b.id)));

    // Assemble the budgeted text payload.
    let mut lines = vec![format!("index: {query}")];
    let mut used = estimate_tokens(&lines[0]);
    let mut kept_refs: Vec<String> = Vec::new();

    for obs in &candidates {
        let line = index_line(obs);
        let cost = estimate_tokens(&line);
        if used + cost > budget {
            break;
        }
        used += cost;
        kept_refs.push(obs.record_ref());
        lines.push(line);
    }

    if !suggestions.is_empty() {
        let line = format!(
            "expand: {}",
            suggestions
                .iter()
                .take(8)
                .map(|s| format!("obs#{}(+{})", s.id, s.support))
                .collect::<Vec<_>>()
                .join(" ")
        );
        let cost = estimate_tokens(&line);
        if used + cost <= budget {
            used += cost;
            lines.push(line);
        }
    }

    let text = truncate_to_budget(lines.join("\n"), budget);
    Ok(IndexPack {
        estimated_tokens: used.min(estimate_tokens(&text)),
        text,
        candidate_refs: kept_refs,
        suggestions,
    })
}

fn index_line(obs: &Observation) -> String {
    format!(
        "- obs#{} {} [{}] {} :: {}",
        obs.id,
        obs.ts,
        obs.kind.as_deref().unwrap_or(""),
        obs.tool_name.as_deref().unwrap_or(""),
        crate::text::one_line(obs.summary.as_deref().unwrap_or("")),
    )
}

// ============================================================================
// PACK
// ============================================================================

/// Parse record references (`obs:<id>`, `obs#<id>`, or bare integers),
/// deduplicating while preserving order.
pub fn parse_record_refs(refs: &[String]) -> Vec<i64> {
    let mut out: Vec<i64> = Vec::new();
    for r in refs {
        let token = r.trim();
        let id = token
            .strip_prefix("obs:")
            .or_else(|| token.strip_prefix("obs#"))
            .unwrap_or(token)
            .parse::<i64>();
        if let Ok(id) = id {
            if !out.contains(&id) {
                out.push(id);
            }
        }
    }
    out
}

/// Build a numbered `ContextPack` from record references.
pub fn build_context_pack(store: &Store, refs: &[String], budget_tokens: usize) -> Result<ContextPack> {
    let budget = budget_tokens.max(1);
    let ids = parse_record_refs(refs);
    let rows = store.get_observations(&ids)?;
    let by_id: std::collections::HashMap<i64, Observation> =
        rows.into_iter().map(|o| (o.id, o)).collect();

    let mut lines: Vec<String> = Vec::new();
    let mut kept: Vec<String> = Vec::new();
    let mut used = 0usize;

    for (n, id) in ids.iter().enumerate() {
        let Some(obs) = by_id.get(id) else {
            continue;
        };
        let line = format!(
            "{}. obs#{} {} [{}] {} :: {}",
            n + 1,
            obs.id,
            obs.ts,
            obs.kind.as_deref().unwrap_or(""),
            obs.tool_name.as_deref().unwrap_or(""),
            crate::text::one_line(obs.summary.as_deref().unwrap_or("")),
        );
        let cost = estimate_tokens(&line);
        if used + cost > budget {
            break;
        }
        used += cost;
        kept.push(obs.record_ref());
        lines.push(line);
    }

    let text = truncate_to_budget(lines.join("\n"), budget);
    Ok(ContextPack {
        estimated_tokens: used.min(estimate_tokens(&text)),
        text,
        refs: kept,
    })
}

/// Index, select the first `take` unique refs (candidates then
/// suggestions), and pack, in one call.
pub fn preflight(
    store: &Store,
    query: &str,
    opts: &IndexPackOptions,
    take: usize,
) -> Result<ContextPack> {
    let index = build_index_pack(store, query, opts)?;

    let mut selection: Vec<String> = Vec::new();
    for r in &index.candidate_refs {
        if selection.len() >= take {
            break;
        }
        if !selection.contains(r) {
            selection.push(r.clone());
        }
    }
    for s in &index.suggestions {
        if selection.len() >= take {
            break;
        }
        let r = format!("obs:{}", s.id);
        if !selection.contains(&r) {
            selection.push(r);
        }
    }

    build_context_pack(store, &selection, opts.budget_tokens)
}

/// Hard safety net: cap the payload at `4 * budget - 3` bytes on a char
/// boundary, marking the cut with an ellipsis.
fn truncate_to_budget(text: String, budget_tokens: usize) -> String {
    let cap = (budget_tokens * 4).saturating_sub(3).max(1);
    if text.len() <= cap {
        return text;
    }
    let mut cut = cap;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &text[..cut])
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::ObservationInput;

    fn seed(store: &Store, summary: &str) -> i64 {
        store
            .insert_observation(&ObservationInput {
                ts: Some("2026-02-06T00:00:00Z".to_string()),
                kind: Some("tool".to_string()),
                tool_name: Some("exec".to_string()),
                summary: Some(summary.to_string()),
                detail: Some(serde_json::json!({})),
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn test_parse_record_refs_dedup_preserves_order() {
        let refs = vec![
            "obs:5".to_string(),
            "obs#3".to_string(),
            "5".to_string(),
            "obs:9".to_string(),
            "garbage".to_string(),
        ];
        assert_eq!(parse_record_refs(&refs), vec![5, 3, 9]);
    }

    #[test]
    fn test_index_pack_lists_candidates_and_suggestions() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..6 {
            seed(&store, &format!("filler {i}"));
        }
        let target = seed(&store, "harvest recovery deep dive");

        let pack = build_index_pack(&store, "harvest", &IndexPackOptions::default()).unwrap();
        assert!(pack.candidate_refs.contains(&format!("obs:{target}")));
        assert!(pack.text.starts_with("index: harvest"));
        // Neighbors of the hit are suggested, the hit itself is not.
        assert!(pack.suggestions.iter().all(|s| s.id != target));
        assert!(!pack.suggestions.is_empty());
    }

    #[test]
    fn test_suggestions_ranked_by_support_then_id() {
        let store = Store::open_in_memory().unwrap();
        // Two adjacent hits share neighbors; shared neighbors get support 2.
        for i in 0..8 {
            if i == 3 || i == 5 {
                seed(&store, &format!("target entry {i}"));
            } else {
                seed(&store, &format!("filler {i}"));
            }
        }

        let opts = IndexPackOptions {
            window: 2,
            ..Default::default()
        };
        let pack = build_index_pack(&store, "target", &opts).unwrap();
        assert!(!pack.suggestions.is_empty());
        // Support never increases down the list; equal support sorts by id.
        for w in pack.suggestions.windows(2) {
            assert!(
                w[0].support > w[1].support
                    || (w[0].support == w[1].support && w[0].id < w[1].id)
            );
        }
    }

    #[test]
    fn test_context_pack_numbered_and_budgeted() {
        let store = Store::open_in_memory().unwrap();
        let a = seed(&store, "first entry");
        let b = seed(&store, "second entry");

        let refs = vec![format!("obs:{b}"), format!("obs:{a}"), format!("obs:{b}")];
        let pack = build_context_pack(&store, &refs, 200).unwrap();
        // Dedup keeps first occurrence order: b then a.
        assert_eq!(pack.refs, vec![format!("obs:{b}"), format!("obs:{a}")]);
        assert!(pack.text.starts_with(&format!("1. obs#{b}")));
        assert!(pack.text.contains(&format!("2. obs#{a}")));
    }

    #[test]
    fn test_budget_limits_pack_lines() {
        let store = Store::open_in_memory().unwrap();
        let mut refs = Vec::new();
        for i in 0..30 {
            let id = seed(&store, &format!("entry number {i} with a reasonably long text body"));
            refs.push(format!("obs:{id}"));
        }

        let pack = build_context_pack(&store, &refs, 40).unwrap();
        assert!(pack.refs.len() < 30);
        assert!(pack.estimated_tokens <= 40);
    }

    #[test]
    fn test_hard_truncation_cap() {
        let long = "x".repeat(1000);
        let out = truncate_to_budget(long, 10);
        assert!(out.len() <= 37 + '…'.len_utf8());
    }

    #[test]
    fn test_preflight_composes_index_and_pack() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..5 {
            seed(&store, &format!("filler {i}"));
        }
        seed(&store, "preflight target row");

        let pack = preflight(&store, "preflight", &IndexPackOptions::default(), 3).unwrap();
        assert!(!pack.refs.is_empty());
        assert!(pack.refs.len() <= 3);
        assert!(pack.text.contains("preflight target row"));
    }
}

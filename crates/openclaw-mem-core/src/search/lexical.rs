//! Lexical lane: FTS5 match ranking with a CJK substring fallback.
//!
//! FTS5 syntax rejects bare hyphens and a few other shapes agents love to
//! type, so queries are sanitized first. CJK text tokenizes poorly in the
//! default FTS tokenizer; when a CJK query finds nothing, a LIKE-based
//! bigram fallback recovers substring matches.

use rusqlite::params;

use crate::observation::Observation;
use crate::storage::{Result, Store};

/// Cap on fallback terms after stable dedup.
const MAX_CJK_TERMS: usize = 16;

/// One lexical hit with its bm25 score (lower is better) and a snippet.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub observation: Observation,
    pub score: f64,
    pub snippet: String,
}

// ============================================================================
// QUERY SANITIZATION
// ============================================================================

/// Sanitize a user query for the FTS5 MATCH parser.
///
/// Hyphenated tokens are phrase-quoted (FTS5 treats `-` as column syntax),
/// Boolean operators and parentheses pass through, everything already
/// quoted is left alone.
pub fn sanitize_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| {
            if token.starts_with('"') && token.ends_with('"') {
                return token.to_string();
            }
            if matches!(token, "OR" | "AND" | "NOT" | "(" | ")") {
                return token.to_string();
            }
            if token.contains('-') {
                return format!("\"{}\"", token.trim_matches('"'));
            }
            token.to_string()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether the query contains characters from the unified CJK block.
pub fn contains_cjk(query: &str) -> bool {
    query.chars().any(is_cjk)
}

fn is_cjk(c: char) -> bool {
    ('\u{4E00}'..='\u{9FFF}').contains(&c)
}

/// Extract CJK fallback terms: whole runs of length >= 2 plus overlapping
/// bigrams, stable-deduplicated and capped.
pub fn cjk_terms(query: &str, max_terms: usize) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    let mut push = |t: String| {
        if !terms.contains(&t) && terms.len() < max_terms {
            terms.push(t);
        }
    };

    let mut run: Vec<char> = Vec::new();
    let mut runs: Vec<Vec<char>> = Vec::new();
    for c in query.chars() {
        if is_cjk(c) {
            run.push(c);
        } else if !run.is_empty() {
            runs.push(std::mem::take(&mut run));
        }
    }
    if !run.is_empty() {
        runs.push(run);
    }

    for run in &runs {
        if run.len() >= 2 {
            push(run.iter().collect());
        }
    }
    for run in &runs {
        for pair in run.windows(2) {
            push(pair.iter().collect());
        }
    }
    terms
}

// ============================================================================
// SEARCH
// ============================================================================

/// Run the lexical lane. Returns hits ranked by bm25, or the CJK fallback
/// ranking when the query is CJK and the index comes up empty. A query the
/// FTS parser still rejects after sanitization skips the lane with a
/// warning instead of failing the search.
pub fn search_lexical(store: &Store, query: &str, limit: usize) -> Result<Vec<LexicalHit>> {
    let sanitized = sanitize_fts_query(query);

    let hits = match fts_match(store, &sanitized, limit) {
        Ok(hits) => hits,
        Err(err) => {
            tracing::warn!(query = %sanitized, error = %err, "FTS query rejected; skipping lexical lane");
            return Ok(Vec::new());
        }
    };

    if hits.is_empty() && contains_cjk(query) {
        return Ok(search_cjk_fallback(store, query, limit)?
            .into_iter()
            .map(|(observation, matched)| LexicalHit {
                snippet: observation
                    .summary
                    .clone()
                    .unwrap_or_default(),
                score: -(matched as f64),
                observation,
            })
            .collect());
    }

    Ok(hits)
}

fn fts_match(store: &Store, query: &str, limit: usize) -> rusqlite::Result<Vec<LexicalHit>> {
    let mut stmt = store.conn().prepare(
        "SELECT o.id, o.ts, o.kind, o.summary, o.summary_en, o.lang, o.tool_name, o.detail_json,
                snippet(observations_fts, 0, '[', ']', '…', 12) AS snippet,
                bm25(observations_fts) AS score
         FROM observations_fts
         JOIN observations o ON o.id = observations_fts.rowid
         WHERE observations_fts MATCH ?1
         ORDER BY score ASC
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![query, limit as i64], |row| {
            Ok(LexicalHit {
                observation: Observation {
                    id: row.get(0)?,
                    ts: row.get(1)?,
                    kind: row.get(2)?,
                    summary: row.get(3)?,
                    summary_en: row.get(4)?,
                    lang: row.get(5)?,
                    tool_name: row.get(6)?,
                    detail_json: row
                        .get::<_, Option<String>>(7)?
                        .unwrap_or_else(|| "{}".to_string()),
                },
                snippet: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                score: row.get(9)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// LIKE-based substring fallback over `summary`, ranked by how many terms
/// matched (more matches first, then ascending id).
pub fn search_cjk_fallback(
    store: &Store,
    query: &str,
    limit: usize,
) -> Result<Vec<(Observation, usize)>> {
    let terms = cjk_terms(query, MAX_CJK_TERMS);
    if terms.is_empty() {
        return Ok(Vec::new());
    }

    let mut counts: std::collections::HashMap<i64, usize> = std::collections::HashMap::new();
    for term in &terms {
        let pattern = format!("%{term}%");
        let mut stmt = store
            .conn()
            .prepare("SELECT id FROM observations WHERE summary LIKE ?1")?;
        let ids = stmt
            .query_map(params![pattern], |r| r.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for id in ids {
            *counts.entry(id).or_default() += 1;
        }
    }

    let mut ranked: Vec<(i64, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);

    let ids: Vec<i64> = ranked.iter().map(|(id, _)| *id).collect();
    let rows = store.get_observations(&ids)?;
    let by_id: std::collections::HashMap<i64, Observation> =
        rows.into_iter().map(|o| (o.id, o)).collect();

    Ok(ranked
        .into_iter()
        .filter_map(|(id, n)| by_id.get(&id).cloned().map(|o| (o, n)))
        .collect())
}

// ============================================================================
// TESTS
// ============================================================================

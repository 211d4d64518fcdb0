//! Markdown index artifact.
//!
//! A flat file listing recent observations, one per line, written
//! atomically. External semantic-recall tooling searches this file and
//! returns snippets; the helper here parses `obs#<id>` tokens back out of
//! those snippets and ranks them against the query.

use std::collections::BTreeSet;
use std::path::Path;

use crate::storage::{Result, Store, StoreError};

/// Default number of observations listed in the artifact.
pub const DEFAULT_INDEX_LIMIT: usize = 5000;

/// Build the index file; returns the number of lines written.
pub fn build_index_file(store: &Store, path: &Path, limit: usize) -> Result<usize> {
    let rows = store.recent_observations(limit)?;
    let mut lines = Vec::with_capacity(rows.len());
    for obs in &rows {
        lines.push(format!(
            "- obs#{} {} [{}] {} :: {}",
            obs.id,
            obs.ts,
            obs.kind.as_deref().unwrap_or(""),
            obs.tool_name.as_deref().unwrap_or(""),
            crate::text::one_line(obs.summary.as_deref().unwrap_or("")),
        ));
    }
    let mut content = lines.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    crate::storage::write_atomic(path, &content).map_err(StoreError::Io)?;
    Ok(rows.len())
}

/// Extract unique observation ids from `obs#<id>` tokens, ascending.
pub fn extract_obs_ids(snippet: &str) -> Vec<i64> {
    let mut ids = BTreeSet::new();
    let mut rest = snippet;
    while let Some(at) = rest.find("obs#") {
        rest = &rest[at + 4..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() {
            if let Ok(id) = digits.parse::<i64>() {
                ids.insert(id);
            }
        }
    }
    ids.into_iter().collect()
}

/// Tokenize a query for overlap ranking: lowercase, `obs#<id>` tokens kept
/// verbatim, everything else split on non-alphanumerics and filtered to
/// length >= 3.
pub fn tokenize_query(query: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for raw in query.split_whitespace() {
        let lower = raw.to_lowercase();
        if lower.starts_with("obs#") && lower[4..].chars().all(|c| c.is_ascii_digit()) {
            if !tokens.contains(&lower) {
                tokens.push(lower);
            }
            continue;
        }
        for part in lower.split(|c: char| !c.is_alphanumeric()) {
            if part.len() >= 3 && !tokens.contains(&part.to_string()) {
                tokens.push(part.to_string());
            }
        }
    }
    tokens
}

/// Rank the ids found in a snippet by token overlap with the query.
///
/// An exact `obs#<id>` mention in the query dominates; otherwise the score
/// is the count of query tokens appearing in that id's line.
pub fn rank_obs_ids_from_snippet(snippet: &str, query: &str) -> Vec<(i64, f64)> {
    let tokens = tokenize_query(query);
    let mut scored: Vec<(i64, f64)> = Vec::new();

    for line in snippet.lines() {
        let ids = extract_obs_ids(line);
        let Some(&id) = ids.first() else {
            continue;
        };
        if scored.iter().any(|(seen, _)| *seen == id) {
            continue;
        }

        let line_lower = line.to_lowercase();
        let mut score = 0.0;
        for token in &tokens {
            if token == &format!("obs#{id}") {
                score += 100.0;
            } else if line_lower.contains(token.as_str()) {
                score += 1.0;
            }
        }
        scored.push((id, score));
    }

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::ObservationInput;

    #[test]
    fn test_extract_obs_ids_sorted_unique() {
        let snippet = "- obs#12 2026-02-06 [tool] exec :: did a thing\n- obs#7 ...\n- obs#12 again";
        assert_eq!(extract_obs_ids(snippet), vec![7, 12]);
    }

    #[test]
    fn test_tokenize_query_keeps_obs_ids_filters_short() {
        let tokens = tokenize_query("Need obs#5 status + api timeout aa a b");
        assert!(tokens.contains(&"obs#5".to_string()));
        assert!(tokens.contains(&"status".to_string()));
        assert!(tokens.contains(&"timeout".to_string()));
        assert!(!tokens.contains(&"aa".to_string()));
        assert!(!tokens.contains(&"a".to_string()));
    }

    #[test]
    fn test_rank_prefers_exact_obs_mention() {
        let snippet = "- obs#1 tool :: alpha\n- obs#5 tool :: harvest test\n";
        let ranked = rank_obs_ids_from_snippet(snippet, "obs#5");
        assert!(!ranked.is_empty());
        assert_eq!(ranked[0].0, 5);
    }

    #[test]
    fn test_rank_by_token_overlap() {
        let snippet = "- obs#1 exec :: gateway timeout error\n- obs#2 exec :: quiet day\n";
        let ranked = rank_obs_ids_from_snippet(snippet, "gateway timeout");
        assert_eq!(ranked[0].0, 1);
        assert!(ranked[0].1 > ranked[1].1);
    }

    #[test]
    fn test_build_index_file_writes_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        for (summary, tool) in [("first", "exec"), ("second", "cron.list")] {
            store
                .insert_observation(&ObservationInput {
                    ts: Some("2026-02-06T00:00:00Z".to_string()),
                    kind: Some("tool".to_string()),
                    summary: Some(summary.to_string()),
                    tool_name: Some(tool.to_string()),
                    detail: Some(serde_json::json!({})),
                    ..Default::default()
                })
                .unwrap();
        }

        let path = tmp.path().join("index.md");
        let n = build_index_file(&store, &path, 100).unwrap();
        assert_eq!(n, 2);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("obs#1"));
        assert!(content.contains("obs#2"));
        assert!(content.contains("cron.list"));
    }

    #[test]
    fn test_index_file_respects_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .insert_observation(&ObservationInput {
                    summary: Some(format!("row {i}")),
                    ..Default::default()
                })
                .unwrap();
        }

        let path = tmp.path().join("index.md");
        let n = build_index_file(&store, &path, 2).unwrap();
        assert_eq!(n, 2);
        let content = std::fs::read_to_string(&path).unwrap();
        // The two newest rows survive the cap.
        assert!(content.contains("obs#4"));
        assert!(content.contains("obs#5"));
        assert!(!content.contains("obs#1"));
    }
}

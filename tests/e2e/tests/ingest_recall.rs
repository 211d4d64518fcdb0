//! Scenario: ingest two observations, then search, timeline, and get.
//! Plus the CJK bigram fallback over a Chinese summary.

use openclaw_mem_e2e_tests::{ingest_values, temp_store};
use openclaw_mem_core::{search_lexical, ScorerSetting};
use serde_json::json;

#[test]
fn ingest_fts_search_timeline_get() {
    let store = temp_store();
    let summary = ingest_values(
        &store,
        &[
            json!({"ts": "2026-02-04T13:00:00Z", "kind": "tool", "tool_name": "cron.list",
                   "summary": "cron list called", "detail": {"ok": true}}),
            json!({"ts": "2026-02-04T13:01:00Z", "kind": "tool", "tool_name": "gateway.config.get",
                   "summary": "read gateway config", "detail": {"ok": true}}),
        ],
        ScorerSetting::Disabled,
    );
    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.ids, vec![1, 2]);

    // Search "cron" returns exactly the cron.list row.
    let hits = search_lexical(&store, "cron", 20).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].observation.tool_name.as_deref(), Some("cron.list"));

    // Timeline ±1 around id 1 returns rows 1 and 2.
    let timeline = store.timeline(&[1], 1).unwrap();
    let ids: Vec<i64> = timeline.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![1, 2]);

    // Get both rows back with parseable detail.
    let rows = store.get_observations(&[1, 2]).unwrap();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        let detail = row.detail();
        assert!(detail.is_object());
        assert_eq!(detail["ok"], true);
    }
}

#[test]
fn cjk_fallback_recovers_semantic_substring_match() {
    let store = temp_store();
    ingest_values(
        &store,
        &[
            json!({"ts": "2026-02-04T13:00:00Z", "kind": "tool", "tool_name": "memorybench",
                   "summary": "我今天在台北開產品會議，晚上再整理筆記。", "detail": {"session_id": "s-zh-1"}}),
            json!({"ts": "2026-02-04T13:01:00Z", "kind": "tool", "tool_name": "memorybench",
                   "summary": "I booked a train ticket to Taichung for next week.", "detail": {"session_id": "s-en-1"}}),
        ],
        ScorerSetting::Disabled,
    );

    // Not an exact phrase; the FTS index misses and the bigram fallback
    // recovers the Chinese row.
    let hits = search_lexical(&store, "今天會議在什麼城市", 10).unwrap();
    assert!(!hits.is_empty());
    assert!(hits[0]
        .observation
        .summary
        .as_deref()
        .unwrap()
        .contains("台北"));
}

#[test]
fn status_reports_counts_and_embedding_tables() {
    let store = temp_store();
    ingest_values(
        &store,
        &[json!({"ts": "2026-02-04T13:00:00Z", "summary": "only row"})],
        ScorerSetting::Disabled,
    );

    let status = store.status().unwrap();
    assert_eq!(status.count, 1);
    assert_eq!(status.min_ts.as_deref(), Some("2026-02-04T13:00:00Z"));
    assert_eq!(status.max_ts.as_deref(), Some("2026-02-04T13:00:00Z"));
    assert_eq!(status.embeddings.count, 0);
    assert_eq!(status.embeddings_en.count, 0);
}

#[test]
fn surrogate_escapes_are_scrubbed_at_the_boundary() {
    let store = temp_store();
    // A raw line with a lone surrogate escape; ingest_reader scrubs it.
    let line = "{\"summary\":\"bad \\ud800 escape\"}";
    let cursor = std::io::Cursor::new(line.as_bytes().to_vec());
    let summary = openclaw_mem_core::ingest_reader(&store, cursor, ScorerSetting::Disabled).unwrap();
    assert_eq!(summary.inserted, 1);

    let row = store.get_observation(1).unwrap().unwrap();
    let text = row.summary.unwrap();
    assert!(text.contains('\u{FFFD}'));
    assert!(!text.contains("ud800"));
}

//! Scenario: importance autograde during ingest, on and off.

use openclaw_mem_e2e_tests::{ingest_values, temp_store};
use openclaw_mem_core::ScorerSetting;
use serde_json::json;

fn cron_setup_record() -> serde_json::Value {
    json!({
        "ts": "2026-02-11T08:00:00Z",
        "kind": "tool",
        "tool_name": "cron.add",
        "summary": "Created cron job jobId=00000000-0000-0000-0000-000000000000 for importance grading; set OPENCLAW_MEM_IMPORTANCE_SCORER=heuristic-v1",
        "detail": {"ok": true}
    })
}

#[test]
fn autograde_attaches_canonical_importance() {
    let store = temp_store();
    let summary = ingest_values(&store, &[cron_setup_record()], ScorerSetting::HeuristicV1);

    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.total_seen, 1);
    assert_eq!(summary.graded_filled, 1);
    assert_eq!(summary.skipped_existing, 0);
    assert_eq!(summary.skipped_disabled, 0);
    assert_eq!(summary.scorer_errors, 0);
    assert_eq!(summary.label_counts.values().sum::<u64>(), 1);

    let detail = store.get_observation(1).unwrap().unwrap().detail();
    let importance = &detail["importance"];
    assert!(importance.is_object());
    assert_eq!(importance["method"], "heuristic-v1");
    assert_eq!(importance["version"], 1);
    let label = importance["label"].as_str().unwrap();
    assert!(["ignore", "nice_to_have", "must_remember"].contains(&label));
    let score = importance["score"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&score));
    assert!(importance["graded_at"].as_str().unwrap().ends_with('Z'));
}

#[test]
fn autograde_off_leaves_detail_untouched() {
    let store = temp_store();
    let summary = ingest_values(&store, &[cron_setup_record()], ScorerSetting::Disabled);

    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.graded_filled, 0);
    assert_eq!(summary.skipped_disabled, 1);
    assert!(summary.label_counts.is_empty());

    let detail = store.get_observation(1).unwrap().unwrap().detail();
    assert!(detail.get("importance").is_none());
}

#[test]
fn existing_importance_wins_over_the_grader() {
    let store = temp_store();
    let summary = ingest_values(
        &store,
        &[json!({
            "summary": "already graded elsewhere",
            "detail": {"importance": {"score": 0.91, "label": "must_remember"}}
        })],
        ScorerSetting::HeuristicV1,
    );

    assert_eq!(summary.skipped_existing, 1);
    assert_eq!(summary.graded_filled, 0);
    assert_eq!(summary.label_counts.get("must_remember"), Some(&1));

    let detail = store.get_observation(1).unwrap().unwrap().detail();
    assert_eq!(detail["importance"]["score"], 0.91);
}

#[test]
fn grader_is_deterministic_across_runs() {
    let store_a = temp_store();
    let store_b = temp_store();
    ingest_values(&store_a, &[cron_setup_record()], ScorerSetting::HeuristicV1);
    ingest_values(&store_b, &[cron_setup_record()], ScorerSetting::HeuristicV1);

    let a = store_a.get_observation(1).unwrap().unwrap().detail();
    let b = store_b.get_observation(1).unwrap().unwrap().detail();
    assert_eq!(a["importance"]["score"], b["importance"]["score"]);
    assert_eq!(a["importance"]["label"], b["importance"]["label"]);
    assert_eq!(a["importance"]["rationale"], b["importance"]["rationale"]);
}

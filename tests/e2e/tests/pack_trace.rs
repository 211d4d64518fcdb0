//! Scenario: pack trace shape, budget enforcement, and redaction.

use openclaw_mem_e2e_tests::{ingest_values, temp_store};
use openclaw_mem_core::{build_pack, PackOptions, ScorerSetting, PACK_TRACE_V1_KIND};
use serde_json::json;

#[test]
fn trace_shape_and_single_inclusion() {
    let store = temp_store();
    ingest_values(
        &store,
        &[json!({"ts": "2026-02-04T13:00:00Z", "kind": "fact", "summary": "test"})],
        ScorerSetting::Disabled,
    );

    let mut opts = PackOptions::new("test-model");
    opts.trace = true;
    opts.budget_tokens = 1;
    let result = build_pack(&store, None, "test", &opts).unwrap();

    assert_eq!(result.items.len(), 1);
    assert_eq!(result.citations.len(), 1);
    assert_eq!(result.citations[0].record_ref, "obs:1");
    assert!(result.citations[0].url.is_none());
    assert_eq!(result.bundle_text, "- [obs:1] test");

    let trace = result.trace.unwrap();
    assert_eq!(trace.kind, PACK_TRACE_V1_KIND);
    assert_eq!(trace.version.schema, "v1");
    assert_eq!(trace.output.included_count, 1);
    assert_eq!(trace.output.l2_included_count, 0);
    assert_eq!(trace.output.citations_count, 1);
    assert_eq!(trace.output.refreshed_record_refs, vec!["obs:1".to_string()]);
    assert!(trace.output.coverage.all_included_have_rationale);
    assert!(trace.output.coverage.all_included_have_citation);

    // Three fixed lanes; only warm is searched.
    assert_eq!(trace.lanes.len(), 3);
    assert!(!trace.lanes[0].searched);
    assert!(trace.lanes[1].searched);
    assert!(!trace.lanes[2].searched);

    // Reserved caps hold their v1 values.
    assert_eq!(trace.budgets.max_l2_items, 0);
    assert_eq!(trace.budgets.nice_cap, 100);

    // Every candidate decision mirrors reason into rationale.
    for candidate in &trace.candidates {
        assert_eq!(candidate.decision.reason, candidate.decision.rationale);
        if candidate.decision.included {
            assert!(!candidate.decision.reason.is_empty());
        }
    }
}

#[test]
fn over_budget_candidate_excluded_with_exact_reason() {
    let store = temp_store();
    ingest_values(
        &store,
        &[
            json!({"summary": "test"}),
            json!({"summary": "test observation with a summary long enough to blow through the leftover budget"}),
        ],
        ScorerSetting::Disabled,
    );

    let mut opts = PackOptions::new("test-model");
    opts.trace = true;
    opts.budget_tokens = 1;
    let result = build_pack(&store, None, "test", &opts).unwrap();

    assert_eq!(result.items.len(), 1);
    let trace = result.trace.unwrap();
    assert_eq!(trace.output.included_count, 1);
    assert_eq!(trace.output.excluded_count, 1);

    let excluded: Vec<_> = trace
        .candidates
        .iter()
        .filter(|c| !c.decision.included)
        .collect();
    assert_eq!(excluded.len(), 1);
    assert_eq!(
        excluded[0].decision.reason,
        vec!["budget_tokens_exceeded".to_string()]
    );
}

#[test]
fn trace_serialization_is_redaction_safe() {
    let store = temp_store();
    ingest_values(
        &store,
        &[json!({
            "summary": "the raw memory content that must never leak into a trace",
            "detail": {"importance": {"score": 0.9}, "trust_tier": "trusted"}
        })],
        ScorerSetting::Disabled,
    );

    let mut opts = PackOptions::new("test-model");
    opts.trace = true;
    let result = build_pack(&store, None, "memory", &opts).unwrap();
    let trace = result.trace.unwrap();

    let serialized = serde_json::to_string(&trace).unwrap();
    assert!(!serialized.contains("raw memory content"));
    for root in ["/home/", "/Users/", "C:\\\\"] {
        assert!(!serialized.contains(root), "trace leaked a path root: {root}");
    }
    // Only record refs point at observations.
    assert!(serialized.contains("obs:1"));

    // Importance and trust surface as labels, not content.
    assert_eq!(trace.candidates[0].importance, "must_remember");
    assert_eq!(trace.candidates[0].trust, "trusted");
}

#[test]
fn included_count_never_exceeds_limit() {
    let store = temp_store();
    let records: Vec<serde_json::Value> = (0..30)
        .map(|i| json!({"summary": format!("test entry {i}")}))
        .collect();
    ingest_values(&store, &records, ScorerSetting::Disabled);

    let mut opts = PackOptions::new("test-model");
    opts.limit = 5;
    opts.budget_tokens = 10_000;
    let result = build_pack(&store, None, "test", &opts).unwrap();
    assert!(result.items.len() <= 5);
    assert_eq!(result.items.len(), result.citations.len());
}

#[test]
fn pack_is_deterministic() {
    let store = temp_store();
    let records: Vec<serde_json::Value> = (0..10)
        .map(|i| json!({"summary": format!("test entry {i}")}))
        .collect();
    ingest_values(&store, &records, ScorerSetting::Disabled);

    let opts = PackOptions::new("test-model");
    let a = build_pack(&store, None, "test", &opts).unwrap();
    let b = build_pack(&store, None, "test", &opts).unwrap();
    assert_eq!(a.bundle_text, b.bundle_text);
    let refs_a: Vec<_> = a.items.iter().map(|i| i.record_ref.clone()).collect();
    let refs_b: Vec<_> = b.items.iter().map(|i| i.record_ref.clone()).collect();
    assert_eq!(refs_a, refs_b);
}

//! Vector lane: cosine ranking over the embedding tables.
//!
//! Loads all rows for the requested model and ranks in-process. Emits
//! advisory warnings when the table does not contain the requested model
//! or holds a mix of models (silent quality drift).

use crate::storage::{EmbeddingTable, Result, Store};
use crate::vector::rank_cosine;

/// Rank observations in `table` by cosine similarity with the query vector.
pub fn search_vector(
    store: &Store,
    table: EmbeddingTable,
    model: &str,
    query_vec: &[f32],
    limit: usize,
) -> Result<Vec<(i64, f64)>> {
    warn_on_model_drift(store, table, model)?;
    let rows = store.embedding_rows(table, model)?;
    Ok(rank_cosine(query_vec, rows, limit))
}

/// English-route search: prefer the English embeddings table; when it holds
/// nothing for the model, fall back to the original-language table with the
/// same (English) query vector.
pub fn search_vector_english(
    store: &Store,
    model: &str,
    query_vec: &[f32],
    limit: usize,
) -> Result<(Vec<(i64, f64)>, EmbeddingTable)> {
    let en_rows = store.embedding_rows(EmbeddingTable::English, model)?;
    if en_rows.is_empty() {
        tracing::debug!(model, "english embedding table empty; falling back to original table");
        let hits = search_vector(store, EmbeddingTable::Original, model, query_vec, limit)?;
        return Ok((hits, EmbeddingTable::Original));
    }
    Ok((rank_cosine(query_vec, en_rows, limit), EmbeddingTable::English))
}

fn warn_on_model_drift(store: &Store, table: EmbeddingTable, model: &str) -> Result<()> {
    let models = store.embedding_models(table)?;
    if models.is_empty() {
        return Ok(());
    }
    if !models.iter().any(|m| m == model) {
        tracing::warn!(
            table = table.table_name(),
            requested = model,
            present = ?models,
            "requested embedding model not present in table"
        );
    }
    if models.len() > 1 {
        tracing::warn!(
            table = table.table_name(),
            present = ?models,
            "embedding table contains multiple models; results may silently drift"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::ObservationInput;

    fn seed(store: &Store, summary: &str) -> i64 {
        store
            .insert_observation(&ObservationInput {
                ts: Some("2026-02-04T13:00:00Z".to_string()),
                summary: Some(summary.to_string()),
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn test_vector_search_ranks_by_cosine() {
        let store = Store::open_in_memory().unwrap();
        let a = seed(&store, "apple");
        let b = seed(&store, "banana");
        store
            .insert_embedding(EmbeddingTable::Original, a, "m", &[1.0, 0.0])
            .unwrap();
        store
            .insert_embedding(EmbeddingTable::Original, b, "m", &[0.0, 1.0])
            .unwrap();

        let hits = search_vector(&store, EmbeddingTable::Original, "m", &[1.0, 0.1], 10).unwrap();
        assert_eq!(hits[0].0, a);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_model_filter_excludes_other_models() {
        let store = Store::open_in_memory().unwrap();
        let a = seed(&store, "apple");
        store
            .insert_embedding(EmbeddingTable::Original, a, "other-model", &[1.0, 0.0])
            .unwrap();

        let hits = search_vector(&store, EmbeddingTable::Original, "m", &[1.0, 0.0], 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_english_route_prefers_en_table() {
        let store = Store::open_in_memory().unwrap();
        let a = seed(&store, "사과");
        let b = seed(&store, "바나나");
        // Original table aligns a with the query; EN table is reversed so
        // the route is observable.
        store
            .insert_embedding(EmbeddingTable::Original, a, "m", &[1.0, 0.0])
            .unwrap();
        store
            .insert_embedding(EmbeddingTable::Original, b, "m", &[0.0, 1.0])
            .unwrap();
        store
            .insert_embedding(EmbeddingTable::English, a, "m", &[0.0, 1.0])
            .unwrap();
        store
            .insert_embedding(EmbeddingTable::English, b, "m", &[1.0, 0.0])
            .unwrap();

        let (hits, table) = search_vector_english(&store, "m", &[1.0, 0.0], 10).unwrap();
        assert_eq!(table, EmbeddingTable::English);
        assert_eq!(hits[0].0, b);
    }

    #[test]
    fn test_english_route_falls_back_to_original() {
        let store = Store::open_in_memory().unwrap();
        let a = seed(&store, "apple");
        store
            .insert_embedding(EmbeddingTable::Original, a, "m", &[1.0, 0.0])
            .unwrap();

        let (hits, table) = search_vector_english(&store, "m", &[1.0, 0.0], 10).unwrap();
        assert_eq!(table, EmbeddingTable::Original);
        assert_eq!(hits[0].0, a);
    }
}

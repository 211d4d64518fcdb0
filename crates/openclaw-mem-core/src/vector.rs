//! Vector Codec
//!
//! Minimal vector arithmetic over packed float32 blobs:
//! - Compact storage (little-endian f32 BLOB + precomputed L2 norm)
//! - Brute-force cosine ranking, streamed over rows
//! - Reciprocal Rank Fusion for combining retrieval lanes
//!
//! Vectors live in SQLite as opaque bytes; ranking happens in-process.
//! At ledger scales the linear scan is the simple, predictable choice.

use std::collections::HashMap;

// ============================================================================
// PACK / UNPACK
// ============================================================================

/// Pack a float vector into little-endian float32 bytes.
pub fn pack_f32(vec: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Unpack little-endian float32 bytes into a float vector.
///
/// Trailing bytes that do not complete a float are ignored.
pub fn unpack_f32(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

// ============================================================================
// BASIC ARITHMETIC
// ============================================================================

/// Euclidean (L2) length of a vector.
pub fn l2_norm(vec: &[f32]) -> f64 {
    vec.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt()
}

/// Dot product over the common prefix of two vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum()
}

/// Cosine similarity; zero when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let na = l2_norm(a);
    let nb = l2_norm(b);
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot(a, b) / (na * nb)
}

// ============================================================================
// RANKING
// ============================================================================

/// Rank `(observation_id, score)` by cosine similarity against a query vector.
///
/// `items` yields `(observation_id, vector_blob, precomputed_norm)` rows.
/// Rows with empty blobs or zero norms are skipped. Returns the top `limit`
/// by score descending.
pub fn rank_cosine<I>(query_vec: &[f32], items: I, limit: usize) -> Vec<(i64, f64)>
where
    I: IntoIterator<Item = (i64, Vec<u8>, f64)>,
{
    let qn = l2_norm(query_vec);
    if qn == 0.0 {
        return Vec::new();
    }

    let mut scored: Vec<(i64, f64)> = Vec::new();
    for (obs_id, blob, norm) in items {
        if blob.is_empty() || norm == 0.0 {
            continue;
        }
        let v = unpack_f32(&blob);
        let s = dot(query_vec, &v) / (qn * norm);
        scored.push((obs_id, s));
    }

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(limit);
    scored
}

/// Reciprocal Rank Fusion over any number of ranked id lists.
///
/// Each list contributes `1 / (k + rank + 1)` per id (rank is 0-based).
/// Results are sorted by fused score descending; ties break by ascending id
/// so the ordering is deterministic across runs.
pub fn rank_rrf(ranked_lists: &[Vec<i64>], k: u32, limit: usize) -> Vec<(i64, f64)> {
    let mut scores: HashMap<i64, f64> = HashMap::new();

    for ranking in ranked_lists {
        for (rank, item_id) in ranking.iter().enumerate() {
            *scores.entry(*item_id).or_default() += 1.0 / (f64::from(k) + rank as f64 + 1.0);
        }
    }

    let mut results: Vec<(i64, f64)> = scores.into_iter().collect();
    results.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    results.truncate(limit);
    results
}

// ============================================================================
// TESTS
// ============================================================================

//! Embedding provider client.
//!
//! Talks to an OpenAI-style `/embeddings` endpoint. The endpoint is opaque:
//! the engine only needs vectors back, in request order. All calls are
//! blocking with a finite timeout; harvest treats failures as non-fatal.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::{EmbeddingTable, Store};

/// Embedding request timeout. Batched backfills can be slow on cold
/// endpoints; two minutes bounds the worst case.
const EMBED_TIMEOUT_SECS: u64 = 120;

/// Batch size for bulk backfill calls.
const BACKFILL_BATCH: usize = 64;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing_api_key")]
    MissingApiKey,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider API error: status={status}, body={body}")]
    Api { status: u16, body: String },

    #[error("provider returned invalid response: {0}")]
    InvalidResponse(String),

    #[error("storage error: {0}")]
    Store(#[from] crate::storage::StoreError),
}

// ============================================================================
// CLIENT
// ============================================================================

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// Blocking client for an OpenAI-compatible embeddings endpoint.
#[derive(Debug)]
pub struct EmbeddingsClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl EmbeddingsClient {
    pub fn new(api_key: &str, base_url: &str) -> Result<Self, EmbedError> {
        if api_key.trim().is_empty() {
            return Err(EmbedError::MissingApiKey);
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(EMBED_TIMEOUT_SECS))
            .build()
            .map_err(EmbedError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Embed a batch of texts; vectors come back in request order.
    pub fn embed(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest { model, input: texts })
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(EmbedError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;
        if parsed.data.len() != texts.len() {
            return Err(EmbedError::InvalidResponse(format!(
                "expected {} vectors, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

// ============================================================================
// BACKFILL
// ============================================================================

/// Embed up to `limit` observations that lack a vector in `table`.
///
/// Commits per batch so an interrupt keeps completed work. Returns the
/// number of embeddings written.
pub fn backfill_embeddings(
    store: &Store,
    client: &EmbeddingsClient,
    table: EmbeddingTable,
    model: &str,
    limit: usize,
) -> Result<usize, EmbedError> {
    let pending = store.observations_missing_embedding(table, model, limit)?;
    if pending.is_empty() {
        return Ok(0);
    }

    let mut written = 0;
    for batch in pending.chunks(BACKFILL_BATCH) {
        let texts: Vec<String> = batch.iter().map(|(_, t)| t.clone()).collect();
        let vectors = client.embed(&texts, model)?;
        for ((id, _), vector) in batch.iter().zip(vectors.iter()) {
            store.insert_embedding(table, *id, model, vector)?;
            written += 1;
        }
        tracing::debug!(table = table.table_name(), written, "embedding backfill batch committed");
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_api_key() {
        let err = EmbeddingsClient::new("", "https://api.openai.com/v1").unwrap_err();
        assert!(matches!(err, EmbedError::MissingApiKey));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = EmbeddingsClient::new("k", "https://example.com/v1/").unwrap();
        assert_eq!(client.base_url, "https://example.com/v1");
    }

    #[test]
    fn test_empty_batch_short_circuits() {
        let client = EmbeddingsClient::new("k", "https://example.com/v1").unwrap();
        // No network call happens for an empty input.
        assert!(client.embed(&[], "m").unwrap().is_empty());
    }
}

//! Embedding provider abstraction and the batching gateway.
//!
//! [`EmbeddingClient`] is the raw provider boundary: one call, one batch,
//! all-or-nothing. [`GeminiEmbedder`] implements it against the Gemini
//! embeddings API. [`EmbeddingGateway`] layers on the pipeline policy:
//! per-text token-budget truncation, bounded exponential backoff, batch
//! skip-on-failure for indexing, and a strict no-retry single-text path
//! for user questions.
//!
//! Also provides the vector byte-encoding helpers shared with the index
//! store:
//! - [`vec_to_blob`] — encode a `Vec<f32>` as little-endian bytes
//! - [`blob_to_vec`] — decode the bytes back
//! - [`cosine_similarity`] — similarity between two vectors

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::Error;

/// Approximate chars-per-token ratio used for budget enforcement.
const CHARS_PER_TOKEN: usize = 4;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Raw embedding provider: embeds one ordered batch of texts, returning
/// a same-length ordered sequence of vectors, or failing as a whole.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Output vector dimensionality.
    fn dims(&self) -> usize;
}

/// Truncate text to a token budget. Over-length input is silently and
/// deterministically cut at a character boundary; it never raises.
pub fn truncate_to_token_budget(text: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens * CHARS_PER_TOKEN;
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

/// Estimated provider-token count for a text.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

// ============ Gemini provider ============

/// Embedding client for the Gemini embeddings API
/// (`models/{model}:batchEmbedContents`). Requires the `GEMINI_API_KEY`
/// environment variable.
pub struct GeminiEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    http: reqwest::Client,
}

impl GeminiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY environment variable not set"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            api_key,
            http,
        })
    }
}

#[async_trait]
impl EmbeddingClient for GeminiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|text| {
                serde_json::json!({
                    "model": format!("models/{}", self.model),
                    "content": { "parts": [{ "text": text }] },
                    "taskType": "SEMANTIC_SIMILARITY",
                })
            })
            .collect();

        let url = format!(
            "{}/models/{}:batchEmbedContents",
            GEMINI_API_BASE, self.model
        );

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&serde_json::json!({ "requests": requests }))
            .send()
            .await
            .context("embedding request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Gemini embeddings API error {}: {}", status, body);
        }

        let json: serde_json::Value = response.json().await?;
        let vectors = parse_batch_response(&json)?;

        if vectors.len() != texts.len() {
            bail!(
                "Gemini returned {} embeddings for {} texts",
                vectors.len(),
                texts.len()
            );
        }

        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Extract the `embeddings[].values` arrays, in order.
fn parse_batch_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing embeddings array"))?;

    let mut vectors = Vec::with_capacity(embeddings.len());
    for item in embeddings {
        let values = item
            .get("values")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing values"))?;
        let vec: Vec<f32> = values
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        if vec.is_empty() {
            bail!("Invalid Gemini response: empty embedding vector");
        }
        vectors.push(vec);
    }

    Ok(vectors)
}

// ============ Gateway ============

/// Batching gateway over an [`EmbeddingClient`].
///
/// Indexing path: texts are truncated to the token budget, embedded in
/// bounded batches, each failed batch retried with exponential backoff
/// (1s, 2s, 4s, ... capped) up to `max_retries` and then dropped — a
/// dropped batch leaves `None` slots and never fails the run. A pacing
/// delay separates successful batches.
///
/// Query path: same truncation, one attempt, failure surfaces.
pub struct EmbeddingGateway {
    client: Arc<dyn EmbeddingClient>,
    config: EmbeddingConfig,
}

impl EmbeddingGateway {
    pub fn new(client: Arc<dyn EmbeddingClient>, config: EmbeddingConfig) -> Self {
        Self { client, config }
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    /// Embed all texts for indexing. The result is aligned with the
    /// input: `None` marks a text whose batch was dropped after
    /// exhausting retries.
    pub async fn embed_chunks(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let batch_count = texts.len().div_ceil(self.config.batch_size.max(1));

        for (batch_index, batch) in texts.chunks(self.config.batch_size.max(1)).enumerate() {
            let truncated: Vec<String> = batch
                .iter()
                .map(|t| truncate_to_token_budget(t, self.config.max_tokens))
                .collect();

            match self.embed_batch_with_retry(&truncated, batch_index).await {
                Some(vectors) => {
                    results.extend(vectors.into_iter().map(Some));
                    // Pace between successful batches to respect
                    // provider rate limits.
                    if batch_index + 1 < batch_count && self.config.pacing_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(self.config.pacing_ms)).await;
                    }
                }
                None => {
                    results.extend(std::iter::repeat_with(|| None).take(batch.len()));
                }
            }
        }

        results
    }

    /// Embed a single user question. Truncates to the same budget but
    /// performs exactly one attempt; failure is fatal to the query.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, Error> {
        let truncated = truncate_to_token_budget(text, self.config.max_tokens);
        let mut vectors = self
            .client
            .embed_batch(&[truncated])
            .await
            .map_err(|e| Error::Embedding(e.to_string()))?;

        match vectors.pop() {
            Some(v) if vectors.is_empty() => Ok(v),
            _ => Err(Error::Embedding("empty embedding response".to_string())),
        }
    }

    async fn embed_batch_with_retry(
        &self,
        texts: &[String],
        batch_index: usize,
    ) -> Option<Vec<Vec<f32>>> {
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.client.embed_batch(texts).await {
                Ok(vectors) => return Some(vectors),
                Err(e) => {
                    tracing::warn!(
                        batch = batch_index,
                        attempt,
                        error = %e,
                        "embedding batch attempt failed"
                    );
                }
            }
        }

        tracing::warn!(
            batch = batch_index,
            size = texts.len(),
            "dropping embedding batch after exhausting retries"
        );
        None
    }
}

// ============ Vector byte encoding ============

/// Encode a float vector as little-endian `f32` bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two vectors; `0.0` for empty or
/// mismatched-length input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

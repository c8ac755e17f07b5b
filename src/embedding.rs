//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: fails every call; used when embeddings are not configured.
//! - **[`OpenAIProvider`]**: calls an OpenAI-compatible `POST /embeddings` endpoint.
//! - **[`OllamaProvider`]**: calls a local Ollama `POST /api/embeddings` endpoint.
//!
//! [`Embedder`] wraps a provider and enforces the input ceiling: text longer
//! than `max_chars` characters is cut before it is sent, a `warn!` event is
//! emitted, and the returned [`Embedding`] carries a [`Truncation`] record so
//! callers can audit lossy embeddings.
//!
//! Also provides vector utilities for SQLite storage:
//! - [`cosine_similarity`]: compute similarity between two embedding vectors
//! - [`vec_to_blob`] / [`blob_to_vec`]: little-endian `f32` BLOB encoding
//!
//! # Retry Strategy
//!
//! Providers retry transient errors with exponential backoff, up to
//! `embedding.max_retries` extra attempts:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry

use anyhow::bail;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::config::EmbeddingConfig;

/// Failure of a single embedding call.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding provider is disabled")]
    Disabled,
    #[error("cannot embed empty text")]
    EmptyInput,
    #[error("embedding service returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("embedding request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
    #[error("embedding has {got} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Trait for embedding providers.
///
/// One call embeds one text. There is no batching contract; see
/// [`Embedder::embed_batch`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed one non-empty text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns [`EmbedError::Disabled`].
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::Disabled)
    }
}

// ============ OpenAI Provider ============

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Embedding provider for OpenAI-compatible APIs.
pub struct OpenAIProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAIProvider {
    /// Create a provider from configuration. The API key must already be
    /// resolved into `config.api_key`.
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = config.api_key.clone().ok_or_else(|| {
            anyhow::anyhow!("{} environment variable not set", config.api_key_env)
        })?;

        Ok(Self {
            client: build_client(config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_BASE_URL.to_string()),
            api_key,
            model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });
        let json = post_with_retry(
            &self.client,
            &url,
            Some(&self.api_key),
            &body,
            self.max_retries,
        )
        .await?;
        let vector = parse_openai_response(&json)?;
        check_dims(vector, self.dims)
    }
}

/// Extract `data[0].embedding` from an OpenAI embeddings response.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>, EmbedError> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .ok_or_else(|| EmbedError::InvalidResponse("missing data[0].embedding".to_string()))?;
    parse_vector(embedding)
}

// ============ Ollama Provider ============

const OLLAMA_DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Embedding provider for a local Ollama server.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;

        Ok(Self {
            client: build_client(config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OLLAMA_DEFAULT_BASE_URL.to_string()),
            model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let url = format!("{}/api/embeddings", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });
        let json = post_with_retry(&self.client, &url, None, &body, self.max_retries).await?;
        let embedding = json
            .get("embedding")
            .ok_or_else(|| EmbedError::InvalidResponse("missing embedding".to_string()))?;
        check_dims(parse_vector(embedding)?, self.dims)
    }
}

// ============ Shared HTTP plumbing ============

fn build_client(config: &EmbeddingConfig) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// POST a JSON body, retrying 429/5xx and network errors with backoff.
async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
) -> Result<serde_json::Value, EmbedError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // 1s, 2s, 4s, ... capped at 32s
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(key) = bearer {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = EmbedError::Http {
                    status: status.as_u16(),
                    body: body_text,
                };
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                last_err = Some(EmbedError::Transport(e));
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| EmbedError::InvalidResponse("no attempt was made".to_string())))
}

fn parse_vector(value: &serde_json::Value) -> Result<Vec<f32>, EmbedError> {
    let items = value
        .as_array()
        .ok_or_else(|| EmbedError::InvalidResponse("embedding is not an array".to_string()))?;
    items
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| EmbedError::InvalidResponse("non-numeric component".to_string()))
        })
        .collect()
}

fn check_dims(vector: Vec<f32>, expected: usize) -> Result<Vec<f32>, EmbedError> {
    if vector.len() != expected {
        return Err(EmbedError::DimensionMismatch {
            expected,
            got: vector.len(),
        });
    }
    Ok(vector)
}

/// Create the [`EmbeddingProvider`] named by the configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
pub fn create_provider(config: &EmbeddingConfig) -> anyhow::Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Embedder ============

/// Record of an input that was cut to the character ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncation {
    pub original_chars: usize,
    pub kept_chars: usize,
}

/// A vector plus whether its input was truncated.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub truncated: Option<Truncation>,
}

/// Applies the input ceiling in front of an [`EmbeddingProvider`].
pub struct Embedder {
    provider: Box<dyn EmbeddingProvider>,
    max_chars: usize,
}

impl Embedder {
    pub fn new(provider: Box<dyn EmbeddingProvider>, max_chars: usize) -> Self {
        Self {
            provider,
            max_chars,
        }
    }

    /// Build the configured provider with the configured ceiling.
    pub fn from_config(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        Ok(Self::new(create_provider(config)?, config.max_chars))
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn dims(&self) -> usize {
        self.provider.dims()
    }

    /// Embed one text, truncating it first if it exceeds the ceiling.
    pub async fn embed(&self, text: &str) -> Result<Embedding, EmbedError> {
        if text.trim().is_empty() {
            return Err(EmbedError::EmptyInput);
        }

        let (input, truncated) = truncate_chars(text, self.max_chars);
        if let Some(t) = truncated {
            warn!(
                original_chars = t.original_chars,
                kept_chars = t.kept_chars,
                "embedding input truncated"
            );
        }

        let vector = self.provider.embed(input).await?;
        Ok(Embedding { vector, truncated })
    }

    /// Embed each text in order with one call per text. Failures are
    /// reported per element.
    pub async fn embed_batch(&self, texts: &[&str]) -> Vec<Result<Embedding, EmbedError>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await);
        }
        results
    }
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, Option<Truncation>) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (
            &text[..byte_idx],
            Some(Truncation {
                original_chars: text.chars().count(),
                kept_chars: max_chars,
            }),
        ),
        None => (text, None),
    }
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use knowledge_harness::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a BLOB produced by [`vec_to_blob`]. Trailing partial bytes are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, or zero-magnitude vectors.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
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

/// Cosine similarity mapped onto the `[0, 1]` score range used by queries.
pub fn similarity_score(a: &[f32], b: &[f32]) -> f64 {
    (cosine_similarity(a, b) as f64).clamp(0.0, 1.0)
}

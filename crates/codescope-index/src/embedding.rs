//! Embedding providers.
//!
//! [`HttpEmbedder`] talks to Voyage or OpenAI-compatible `/embeddings`
//! endpoints, using `input_type: "document"` for indexing and `"query"` for
//! searching where the provider supports it. [`HashEmbedder`] is an offline,
//! deterministic feature-hashing embedder used by default and in tests.

use std::sync::Arc;

use async_trait::async_trait;
use codescope_core::{CodescopeError, EmbeddingConfig};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::chunker::symbol_tokens;

const VOYAGE_BASE_URL: &str = "https://api.voyageai.com/v1";
const VOYAGE_MODEL: &str = "voyage-code-3";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_MODEL: &str = "text-embedding-3-small";
const BATCH_SIZE: usize = 64;
const BATCH_DELAY_MS: u64 = 200;

/// Whether text is being embedded for storage or for lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Document,
    Query,
}

impl InputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InputKind::Document => "document",
            InputKind::Query => "query",
        }
    }
}

/// A single embedding tagged with the provider that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub dimensions: usize,
    pub provider: String,
}

/// Turns text into vectors.
///
/// `provider()` must change whenever vectors stop being comparable (a new
/// model or dimension count), since stored vectors are only ever compared with
/// query vectors from the same provider and dimensions.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier, e.g. `"voyage:voyage-code-3"`.
    fn provider(&self) -> &str;

    fn dimensions(&self) -> usize;

    /// Embed many texts; vectors come back in input order.
    async fn embed_batch(
        &self,
        texts: &[String],
        kind: InputKind,
    ) -> Result<Vec<Vec<f32>>, CodescopeError>;

    /// Embed one text.
    async fn embed(&self, text: &str, kind: InputKind) -> Result<Embedding, CodescopeError> {
        let vector = self
            .embed_batch(&[text.to_string()], kind)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                CodescopeError::Embedding(format!("empty response from {}", self.provider()))
            })?;
        Ok(Embedding {
            dimensions: vector.len(),
            vector,
            provider: self.provider().to_string(),
        })
    }
}

/// Build the embedder named by `config.provider`.
///
/// # Errors
///
/// Returns [`CodescopeError::Config`] for unknown providers or missing API keys.
///
/// # Examples
///
/// ```
/// use codescope_core::EmbeddingConfig;
/// use codescope_index::embedding::embedder_from_config;
///
/// let embedder = embedder_from_config(&EmbeddingConfig::default()).unwrap();
/// assert_eq!(embedder.provider(), "local:feature-hash");
/// assert_eq!(embedder.dimensions(), 384);
/// ```
pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, CodescopeError> {
    if config.dimensions == 0 {
        return Err(CodescopeError::Config(
            "embedding.dimensions must be greater than zero".into(),
        ));
    }
    match config.provider.as_str() {
        "local" => Ok(Arc::new(HashEmbedder::new(config.dimensions))),
        "voyage" | "openai" => Ok(Arc::new(HttpEmbedder::with_config(config)?)),
        other => Err(CodescopeError::Config(format!(
            "unknown embedding provider '{other}': expected local, voyage or openai"
        ))),
    }
}

/// Client for Voyage and OpenAI-compatible embedding APIs.
///
/// # Examples
///
/// ```
/// use codescope_core::EmbeddingConfig;
/// use codescope_index::embedding::{Embedder, HttpEmbedder};
///
/// let config = EmbeddingConfig {
///     provider: "voyage".into(),
///     api_key: Some("test-key".into()),
///     dimensions: 1024,
///     ..EmbeddingConfig::default()
/// };
/// let embedder = HttpEmbedder::with_config(&config).unwrap();
/// assert_eq!(embedder.provider(), "voyage:voyage-code-3");
/// ```
pub struct HttpEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    provider: String,
    dimensions: usize,
    flavor: Flavor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Voyage,
    OpenAi,
}

impl std::fmt::Debug for HttpEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbedder")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    input_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimension: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDataItem>,
}

#[derive(Deserialize)]
struct EmbedDataItem {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    /// Create a client from an [`EmbeddingConfig`].
    ///
    /// Falls back to `VOYAGE_API_KEY` / `OPENAI_API_KEY` if no key is configured.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Config`] if no API key is available or the
    /// provider is not an HTTP provider.
    pub fn with_config(config: &EmbeddingConfig) -> Result<Self, CodescopeError> {
        let (flavor, env_var, base_url, model) = match config.provider.as_str() {
            "voyage" => (Flavor::Voyage, "VOYAGE_API_KEY", VOYAGE_BASE_URL, VOYAGE_MODEL),
            "openai" => (Flavor::OpenAi, "OPENAI_API_KEY", OPENAI_BASE_URL, OPENAI_MODEL),
            other => {
                return Err(CodescopeError::Config(format!(
                    "'{other}' is not an HTTP embedding provider"
                )))
            }
        };

        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(env_var).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                CodescopeError::Config(format!(
                    "embedding API key not found: set embedding.api_key in .codescope.toml or {env_var} env var"
                ))
            })?;

        let model = config.model.clone().unwrap_or_else(|| model.to_string());
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| base_url.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            provider: format!("{}:{model}", config.provider),
            base_url,
            model,
            dimensions: config.dimensions,
            flavor,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(&'a self, texts: &'a [String], kind: InputKind) -> EmbedRequest<'a> {
        match self.flavor {
            Flavor::Voyage => EmbedRequest {
                model: &self.model,
                input: texts,
                input_type: Some(kind.as_str()),
                output_dimension: Some(self.dimensions),
                dimensions: None,
            },
            Flavor::OpenAi => EmbedRequest {
                model: &self.model,
                input: texts,
                input_type: None,
                output_dimension: None,
                dimensions: Some(self.dimensions),
            },
        }
    }

    async fn post_batch(
        &self,
        batch: &[String],
        kind: InputKind,
    ) -> Result<Vec<Vec<f32>>, CodescopeError> {
        let request = self.build_request(batch, kind);
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| CodescopeError::Embedding(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".into());
            return Err(CodescopeError::Embedding(format!(
                "{} API returned {status}: {body}",
                self.provider
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| CodescopeError::Embedding(format!("failed to parse response: {e}")))?;

        check_shape(parsed, batch.len(), self.dimensions)
    }
}

fn check_shape(
    response: EmbedResponse,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, CodescopeError> {
    if response.data.len() != expected {
        return Err(CodescopeError::Embedding(format!(
            "expected {expected} embeddings, got {}",
            response.data.len()
        )));
    }
    response
        .data
        .into_iter()
        .map(|item| {
            if item.embedding.len() == dimensions {
                Ok(item.embedding)
            } else {
                Err(CodescopeError::Embedding(format!(
                    "expected {dimensions}-dimensional vectors, got {}",
                    item.embedding.len()
                )))
            }
        })
        .collect()
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Splits into sub-batches of 64 with 200ms pauses for rate limiting.
    async fn embed_batch(
        &self,
        texts: &[String],
        kind: InputKind,
    ) -> Result<Vec<Vec<f32>>, CodescopeError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(BATCH_SIZE).enumerate() {
            if i > 0 {
                tokio::time::sleep(tokio::time::Duration::from_millis(BATCH_DELAY_MS)).await;
            }
            all.extend(self.post_batch(batch, kind).await?);
        }
        debug!(provider = %self.provider, texts = texts.len(), "embedded batch");
        Ok(all)
    }
}

/// Offline embedder: signed feature hashing of word and sub-word tokens,
/// L2-normalized.
///
/// Texts sharing vocabulary get a high cosine similarity, which is enough for
/// tests and air-gapped use. Identical input always yields identical output.
///
/// # Examples
///
/// ```
/// use codescope_index::embedding::HashEmbedder;
///
/// let embedder = HashEmbedder::new(64);
/// let a = embedder.vector("parse config file");
/// let b = embedder.vector("parse config file");
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
    provider: String,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            provider: "local:feature-hash".to_string(),
        }
    }

    /// Embed `text` synchronously.
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        for token in hash_tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

/// Lowercased words plus their identifier sub-tokens.
fn hash_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        if word.is_empty() {
            continue;
        }
        let lower = word.to_lowercase();
        let parts = symbol_tokens(word);
        if parts.len() > 1 || parts.first() != Some(&lower) {
            tokens.extend(parts);
        }
        tokens.push(lower);
    }
    tokens
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        _kind: InputKind,
    ) -> Result<Vec<Vec<f32>>, CodescopeError> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// Cosine similarity of two vectors; 0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b) {
        let ai = *x as f64;
        let bi = *y as f64;
        dot += ai * bi;
        norm_a += ai * ai;
        norm_b += bi * bi;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }

    dot / denom
}

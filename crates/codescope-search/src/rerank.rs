//! Cross-encoder re-ranking of the head of the candidate list.
//!
//! The stage never fails a query: a missing endpoint, a transport error, a
//! malformed response or a timeout all leave the incoming order unchanged
//! and are reported as a `rerank_unavailable` fallback in [`RerankMeta`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use codescope_core::{CodescopeError, Failure, RerankConfig, RerankMode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One document offered to the cross-encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct RerankCandidate {
    pub id: String,
    pub text: String,
}

/// Pairwise (query, document) relevance model.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// Relevance of one candidate; higher is better.
    async fn score(&self, query: &str, candidate: &RerankCandidate) -> Result<f32, CodescopeError>;

    /// Scores for many candidates, in input order.
    async fn score_batch(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
    ) -> Result<Vec<f32>, CodescopeError> {
        let mut scores = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            scores.push(self.score(query, candidate).await?);
        }
        Ok(scores)
    }
}

/// Sigmoid normalization: maps raw logits to 0-1.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Client for `/v1/rerank` compatible endpoints.
pub struct HttpCrossEncoder {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<&'a str>,
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResultRaw>,
}

#[derive(Deserialize)]
struct RerankResultRaw {
    index: usize,
    relevance_score: f32,
}

impl HttpCrossEncoder {
    /// # Errors
    ///
    /// Returns [`CodescopeError::RerankUnavailable`] if no base URL is set
    /// or the HTTP client cannot be built.
    pub fn with_config(config: &RerankConfig) -> Result<Self, CodescopeError> {
        let base_url = config
            .base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| CodescopeError::RerankUnavailable("rerank.base_url is not set".into()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| CodescopeError::RerankUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: format!("{}/v1/rerank", base_url.trim_end_matches('/')),
            model: config.model.clone().unwrap_or_else(|| "default".to_string()),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl CrossEncoder for HttpCrossEncoder {
    async fn score(&self, query: &str, candidate: &RerankCandidate) -> Result<f32, CodescopeError> {
        let scores = self
            .score_batch(query, std::slice::from_ref(candidate))
            .await?;
        scores
            .into_iter()
            .next()
            .ok_or_else(|| CodescopeError::RerankUnavailable("empty rerank response".into()))
    }

    async fn score_batch(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
    ) -> Result<Vec<f32>, CodescopeError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let body = RerankRequest {
            model: &self.model,
            query,
            documents: candidates.iter().map(|c| c.text.as_str()).collect(),
            top_n: candidates.len(),
        };
        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CodescopeError::RerankUnavailable(format!("request failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CodescopeError::RerankUnavailable(format!(
                "endpoint returned {status}: {text}"
            )));
        }
        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| CodescopeError::RerankUnavailable(format!("bad response: {e}")))?;

        // Documents the endpoint left out rank last.
        let mut scores = vec![0.0f32; candidates.len()];
        for result in parsed.results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = sigmoid(result.relevance_score);
            }
        }
        Ok(scores)
    }
}

/// Deterministic encoder with injected per-chunk scores; unknown ids score 0.
#[derive(Debug, Clone, Default)]
pub struct FixedScores {
    scores: HashMap<String, f32>,
}

impl FixedScores {
    pub fn new(scores: impl IntoIterator<Item = (String, f32)>) -> Self {
        Self {
            scores: scores.into_iter().collect(),
        }
    }
}

#[async_trait]
impl CrossEncoder for FixedScores {
    async fn score(&self, _query: &str, candidate: &RerankCandidate) -> Result<f32, CodescopeError> {
        Ok(self.scores.get(&candidate.id).copied().unwrap_or(0.0))
    }
}

/// What the re-ranker did for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankMeta {
    pub mode: RerankMode,
    pub applied: bool,
    /// Head size sent to the model.
    pub reranked: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Failure>,
}

impl RerankMeta {
    fn off() -> Self {
        Self {
            mode: RerankMode::Off,
            applied: false,
            reranked: 0,
            fallback: None,
        }
    }
}

/// Re-ranking stage with its timeout and head size.
pub struct Reranker {
    encoder: Result<Box<dyn CrossEncoder>, String>,
    top_n: usize,
    timeout: Duration,
}

impl Reranker {
    /// Build the HTTP encoder from configuration. A configuration that
    /// cannot produce an encoder yields a reranker that always falls back.
    pub fn from_config(config: &RerankConfig) -> Self {
        let encoder = HttpCrossEncoder::with_config(config)
            .map(|e| Box::new(e) as Box<dyn CrossEncoder>)
            .map_err(|e| match e {
                CodescopeError::RerankUnavailable(reason) => reason,
                other => other.to_string(),
            });
        Self {
            encoder,
            top_n: config.top_n,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn with_encoder(encoder: Box<dyn CrossEncoder>, top_n: usize, timeout: Duration) -> Self {
        Self {
            encoder: Ok(encoder),
            top_n,
            timeout,
        }
    }

    /// Head size scored by the model.
    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// A reranker with no model; cross-encoder requests always fall back.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            encoder: Err(reason.into()),
            top_n: codescope_core::scoring::RERANK_TOP_N,
            timeout: Duration::from_millis(RerankConfig::default().timeout_ms),
        }
    }

    /// New order of `candidates` as indices into it.
    ///
    /// The first `top_n` entries are stable-sorted by model score; the rest
    /// keep their positions after the head. On any failure the identity
    /// order is returned.
    pub async fn rerank(
        &self,
        query: &str,
        mode: RerankMode,
        candidates: &[RerankCandidate],
    ) -> (Vec<usize>, RerankMeta) {
        let identity: Vec<usize> = (0..candidates.len()).collect();
        if mode == RerankMode::Off || candidates.is_empty() {
            let meta = RerankMeta {
                mode,
                ..RerankMeta::off()
            };
            return (identity, meta);
        }

        let encoder = match &self.encoder {
            Ok(encoder) => encoder,
            Err(reason) => return (identity, fallback(mode, reason.clone())),
        };

        let head = self.top_n.min(candidates.len());
        let scored = tokio::time::timeout(
            self.timeout,
            encoder.score_batch(query, &candidates[..head]),
        )
        .await;
        let scores = match scored {
            Ok(Ok(scores)) if scores.len() == head => scores,
            Ok(Ok(scores)) => {
                return (
                    identity,
                    fallback(mode, format!("expected {head} scores, got {}", scores.len())),
                )
            }
            Ok(Err(e)) => return (identity, fallback(mode, e.to_string())),
            Err(_) => {
                return (
                    identity,
                    fallback(mode, format!("timed out after {} ms", self.timeout.as_millis())),
                )
            }
        };

        let mut order: Vec<usize> = (0..head).collect();
        order.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order.extend(head..candidates.len());
        debug!(head, "reranked candidates");

        let meta = RerankMeta {
            mode,
            applied: true,
            reranked: head,
            fallback: None,
        };
        (order, meta)
    }
}

fn fallback(mode: RerankMode, reason: String) -> RerankMeta {
    let failure = CodescopeError::RerankUnavailable(reason).to_failure();
    warn!(kind = "rerank_unavailable", reason = %failure.message, "keeping fused order");
    RerankMeta {
        mode,
        applied: false,
        reranked: 0,
        fallback: Some(failure),
    }
}

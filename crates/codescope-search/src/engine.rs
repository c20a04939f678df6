//! The query pipeline: intention lookup, hybrid retrieval, symbol boosting,
//! the similarity floor, re-ranking and intention learning.

use std::sync::Arc;

use codescope_core::{CodescopeError, ScopeFilter, ScopeMatcher};
use codescope_index::{ChunkBodyStore, ChunkRecord, Embedder, IndexStore, InputKind, LexicalIndex};
use serde::Serialize;
use tracing::{debug, info};

use crate::boost::{apply_floor, apply_symbol_boost, SymbolBoostMeta};
use crate::fusion::Candidate;
use crate::hybrid::{retrieve, HybridMeta};
use crate::intention::{normalize_query, IntentionCache};
use crate::rerank::{RerankCandidate, RerankMeta, Reranker};

/// One ranked chunk returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub file: String,
    pub symbol: String,
    pub language: String,
    pub chunk_type: codescope_core::ChunkType,
    pub start_line: u32,
    pub end_line: u32,
    pub signature: String,
    /// `rawVector * pathWeight + boost`, capped at 1.0. On an intention hit,
    /// the learned confidence.
    pub score: f64,
    pub vector_score: f64,
    pub fused_score: f64,
    pub boost: f64,
    /// Content hash; pass to `get_chunk` for the source text.
    pub sha: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub call_targets: Vec<String>,
    pub callers: Vec<String>,
    pub success_rate: f64,
}

impl SearchResult {
    fn from_record(record: ChunkRecord, score: f64) -> Self {
        Self {
            id: record.id,
            file: record.file,
            symbol: record.symbol,
            language: record.language,
            chunk_type: record.chunk_type,
            start_line: record.start_line,
            end_line: record.end_line,
            signature: record.signature,
            score,
            vector_score: 0.0,
            fused_score: 0.0,
            boost: 0.0,
            sha: record.content_hash,
            tags: record.tags,
            intent: record.intent,
            description: record.description,
            call_targets: record.call_targets,
            callers: record.callers,
            success_rate: record.success_rate,
        }
    }

    fn from_candidate(candidate: Candidate) -> Self {
        let score = candidate.final_score();
        let vector_score = candidate.vector_score;
        let fused_score = candidate.fused_score;
        let boost = candidate.boost;
        Self {
            vector_score,
            fused_score,
            boost,
            ..Self::from_record(candidate.record, score)
        }
    }
}

/// Results plus what each pipeline stage did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hybrid_meta: Option<HybridMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_boost_meta: Option<SymbolBoostMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_meta: Option<RerankMeta>,
    pub intention_hit: bool,
}

/// Query engine over one index.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use std::sync::Arc;
/// use codescope_core::{CodescopeConfig, ScopeFilter};
/// use codescope_index::{ChunkBodyStore, HashEmbedder, IndexStore};
/// use codescope_search::{Reranker, SearchEngine};
///
/// # async fn example() {
/// let config = CodescopeConfig::default();
/// let store = Arc::new(IndexStore::open(Path::new(".codescope/index.db")).unwrap());
/// let bodies = Arc::new(ChunkBodyStore::new(Path::new(".codescope/chunks"), None, false));
/// let engine = SearchEngine::new(
///     store,
///     bodies,
///     Arc::new(HashEmbedder::new(384)),
///     Reranker::from_config(&config.rerank),
/// );
/// let response = engine
///     .search("where are sessions opened", 10, &ScopeFilter::from_config(&config))
///     .await
///     .unwrap();
/// println!("{} results", response.results.len());
/// # }
/// ```
pub struct SearchEngine {
    store: Arc<IndexStore>,
    bodies: Arc<ChunkBodyStore>,
    embedder: Arc<dyn Embedder>,
    lexical: Arc<dyn LexicalIndex>,
    reranker: Reranker,
    intentions: IntentionCache,
}

impl SearchEngine {
    /// An engine whose lexical stream is the store's own FTS index.
    pub fn new(
        store: Arc<IndexStore>,
        bodies: Arc<ChunkBodyStore>,
        embedder: Arc<dyn Embedder>,
        reranker: Reranker,
    ) -> Self {
        let lexical: Arc<dyn LexicalIndex> = store.clone();
        Self {
            intentions: IntentionCache::new(store.clone()),
            store,
            bodies,
            embedder,
            lexical,
            reranker,
        }
    }

    /// Replace the lexical index.
    pub fn with_lexical(mut self, lexical: Arc<dyn LexicalIndex>) -> Self {
        self.lexical = lexical;
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_reranker(mut self, reranker: Reranker) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    /// Run a query and return at most `limit` results.
    ///
    /// # Errors
    ///
    /// - [`CodescopeError::StoreNotFound`] before the first index pass
    /// - [`CodescopeError::NoCandidates`] or
    ///   [`CodescopeError::DimensionMismatch`] when nothing is in scope
    /// - [`CodescopeError::NoRelevantMatches`] when nothing clears the floor
    /// - [`CodescopeError::Embedding`] if the query cannot be embedded
    ///
    /// Re-ranker failures never surface here; see [`RerankMeta::fallback`].
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: &ScopeFilter,
    ) -> Result<SearchResponse, CodescopeError> {
        self.store.ensure_indexed()?;
        let limit = limit.max(1);
        self.intentions.observe(query)?;

        let scope = ScopeMatcher::new(filter)?;
        let normalized = normalize_query(query);
        if !normalized.is_empty() {
            let hit = self
                .intentions
                .lookup(&normalized, &scope, self.embedder.as_ref())?;
            if let Some((record, chunk)) = hit {
                let score = record.confidence.min(codescope_core::scoring::MAX_SCORE);
                info!(query, target = %chunk.id, "answered from intention cache");
                return Ok(SearchResponse {
                    results: vec![SearchResult::from_record(chunk, score)],
                    intention_hit: true,
                    ..SearchResponse::default()
                });
            }
        }

        let embedding = self.embedder.embed(query, InputKind::Query).await?;
        let (mut candidates, hybrid_meta) = retrieve(
            &self.store,
            self.lexical.as_ref(),
            query,
            &embedding,
            limit,
            filter,
            &scope,
        )?;

        let boost_meta = apply_symbol_boost(query, &mut candidates, filter.symbol_boost_enabled);
        let candidates = apply_floor(candidates)?;

        let rerank_input: Vec<RerankCandidate> = candidates
            .iter()
            .take(self.reranker_head(filter, candidates.len()))
            .map(|c| RerankCandidate {
                id: c.record.id.clone(),
                text: self.rerank_text(&c.record),
            })
            .collect();
        let (head_order, rerank_meta) = self
            .reranker
            .rerank(query, filter.rerank_mode, &rerank_input)
            .await;

        let mut slots: Vec<Option<Candidate>> = candidates.into_iter().map(Some).collect();
        let mut ordered = Vec::with_capacity(slots.len());
        for i in head_order.into_iter().chain(rerank_input.len()..slots.len()) {
            if let Some(c) = slots.get_mut(i).and_then(Option::take) {
                ordered.push(c);
            }
        }
        ordered.truncate(limit);

        let results: Vec<SearchResult> = ordered.into_iter().map(SearchResult::from_candidate).collect();
        if let Some(top) = results.first() {
            self.intentions.learn(&normalized, query, &top.id, top.score)?;
        }

        debug!(query, results = results.len(), "search finished");
        Ok(SearchResponse {
            results,
            hybrid_meta: Some(hybrid_meta),
            symbol_boost_meta: Some(boost_meta),
            rerank_meta: Some(rerank_meta),
            intention_hit: false,
        })
    }

    /// Candidates handed to the reranker. With re-ranking off, none are read.
    fn reranker_head(&self, filter: &ScopeFilter, available: usize) -> usize {
        match filter.rerank_mode {
            codescope_core::RerankMode::Off => 0,
            codescope_core::RerankMode::CrossEncoder => self.reranker.top_n().min(available),
        }
    }

    /// Source text for the cross-encoder; falls back to the signature when
    /// the body cannot be read.
    fn rerank_text(&self, record: &ChunkRecord) -> String {
        match self.bodies.read_string(&record.content_hash) {
            Ok(body) => body,
            Err(e) => {
                debug!(chunk = %record.id, error = %e, "body unavailable for rerank");
                format!("{} {}", record.symbol, record.signature)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::tests::record;

    #[test]
    fn result_serializes_with_wire_names() {
        let mut candidate = Candidate::new(record("src/lib.rs:alpha:0011aabb"), 0.8);
        candidate.fused_score = 0.03;
        candidate.boost = 0.05;
        let result = SearchResult::from_candidate(candidate);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["chunkType"], "function");
        assert_eq!(json["startLine"], 1);
        assert_eq!(json["sha"], "00".repeat(32));
        assert!((json["score"].as_f64().unwrap() - 0.85).abs() < 1e-9);
        assert!(json.get("intent").is_none());
    }

    #[test]
    fn empty_response_omits_stage_meta() {
        let json = serde_json::to_value(SearchResponse::default()).unwrap();
        assert_eq!(json["intentionHit"], false);
        assert!(json.get("hybridMeta").is_none());
        assert!(json["results"].as_array().unwrap().is_empty());
    }
}

//! Candidate generation: cosine similarity and BM25 over the scoped chunk
//! set, fused with RRF.

use std::collections::{HashMap, HashSet};

use codescope_core::scoring::{candidate_pool, RRF_K};
use codescope_core::{CodescopeError, ScopeFilter, ScopeMatcher};
use codescope_index::embedding::cosine_similarity;
use codescope_index::{Embedding, IndexStore, LexicalIndex};
use serde::Serialize;
use tracing::debug;

use crate::fusion::{reciprocal_rank_fusion, sort_candidates, Candidate};

/// What hybrid retrieval did for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridMeta {
    /// Whether the lexical stream was fused in.
    pub enabled: bool,
    /// Chunks that passed the scope filter for this provider.
    pub scoped_chunks: usize,
    pub candidate_pool: usize,
    pub vector_candidates: usize,
    pub lexical_candidates: usize,
    pub fused_candidates: usize,
}

/// Retrieve and fuse candidates for `query`.
///
/// Only chunks embedded by the query's provider at the query's dimensions
/// are considered. The result is sorted best-first.
///
/// # Errors
///
/// - [`CodescopeError::DimensionMismatch`] if the index only holds vectors
///   from other providers or dimensions
/// - [`CodescopeError::NoCandidates`] if nothing is in scope
/// - [`CodescopeError::Database`] on store failures
pub fn retrieve(
    store: &IndexStore,
    lexical: &dyn LexicalIndex,
    query: &str,
    embedding: &Embedding,
    limit: usize,
    filter: &ScopeFilter,
    scope: &ScopeMatcher,
) -> Result<(Vec<Candidate>, HybridMeta), CodescopeError> {
    let records = store.candidates(&embedding.provider, embedding.dimensions, scope)?;
    if records.is_empty() {
        return Err(empty_scope_error(store, embedding)?);
    }

    let pool = candidate_pool(limit);
    let mut meta = HybridMeta {
        enabled: !filter.vector_only(),
        scoped_chunks: records.len(),
        candidate_pool: pool,
        ..HybridMeta::default()
    };

    let mut candidates: HashMap<String, Candidate> = records
        .into_iter()
        .map(|record| {
            let score = cosine_similarity(&embedding.vector, &record.embedding);
            (record.id.clone(), Candidate::new(record, score))
        })
        .collect();

    let mut by_vector: Vec<&Candidate> = candidates.values().collect();
    by_vector.sort_by(|a, b| {
        b.vector_score
            .partial_cmp(&a.vector_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.record
                    .success_rate
                    .partial_cmp(&a.record.success_rate)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    let vector_stream: Vec<String> = by_vector
        .into_iter()
        .take(pool)
        .map(|c| c.record.id.clone())
        .collect();
    meta.vector_candidates = vector_stream.len();

    let lexical_stream: Vec<String> = if meta.enabled {
        let scoped: HashSet<&str> = candidates.keys().map(String::as_str).collect();
        let total = store.stats()?.total_chunks.max(pool);
        lexical
            .query(query, total)?
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| scoped.contains(id.as_str()))
            .take(pool)
            .collect()
    } else {
        Vec::new()
    };
    meta.lexical_candidates = lexical_stream.len();

    for (i, id) in vector_stream.iter().enumerate() {
        if let Some(c) = candidates.get_mut(id) {
            c.vector_rank = Some(i + 1);
        }
    }
    for (i, id) in lexical_stream.iter().enumerate() {
        if let Some(c) = candidates.get_mut(id) {
            c.lexical_rank = Some(i + 1);
        }
    }

    let fused = reciprocal_rank_fusion(&[&vector_stream[..], &lexical_stream[..]], RRF_K);
    let mut ranked: Vec<Candidate> = fused
        .into_iter()
        .filter_map(|(id, score)| {
            candidates.remove(&id).map(|mut c| {
                c.fused_score = score;
                c
            })
        })
        .collect();
    sort_candidates(&mut ranked);
    meta.fused_candidates = ranked.len();

    debug!(
        scoped = meta.scoped_chunks,
        vector = meta.vector_candidates,
        lexical = meta.lexical_candidates,
        fused = meta.fused_candidates,
        "retrieved candidates"
    );
    Ok((ranked, meta))
}

fn empty_scope_error(store: &IndexStore, embedding: &Embedding) -> Result<CodescopeError, CodescopeError> {
    let summary = store.provider_summary()?;
    let same_provider = summary
        .iter()
        .any(|(p, d, _)| p == &embedding.provider && *d == embedding.dimensions);
    if summary.is_empty() || same_provider {
        return Ok(CodescopeError::NoCandidates {
            provider: embedding.provider.clone(),
            dimensions: embedding.dimensions,
        });
    }
    let indexed = summary
        .iter()
        .map(|(p, d, n)| format!("{p}/{d} ({n} chunks)"))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(CodescopeError::DimensionMismatch {
        provider: embedding.provider.clone(),
        dimensions: embedding.dimensions,
        indexed,
    })
}

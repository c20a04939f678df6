//! Reciprocal Rank Fusion and the candidate ordering shared by every stage.
//!
//! `score(c) = Σ 1 / (k + rank_s(c))` over the streams `s` that contain `c`,
//! with 1-based ranks. Lists without `c` contribute nothing, so no score
//! normalization across retrieval methods is needed.

use std::cmp::Ordering;
use std::collections::HashMap;

use codescope_core::scoring::MAX_SCORE;
use codescope_index::ChunkRecord;

/// A chunk moving through retrieval, boosting and re-ranking.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub record: ChunkRecord,
    /// Raw cosine similarity with the query embedding.
    pub vector_score: f64,
    /// 1-based position in the vector stream, if it made the pool.
    pub vector_rank: Option<usize>,
    /// 1-based position in the lexical stream, if it made the pool.
    pub lexical_rank: Option<usize>,
    pub fused_score: f64,
    pub boost: f64,
}

impl Candidate {
    pub fn new(record: ChunkRecord, vector_score: f64) -> Self {
        Self {
            record,
            vector_score,
            vector_rank: None,
            lexical_rank: None,
            fused_score: 0.0,
            boost: 0.0,
        }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// Ordering key: fused score plus any boost.
    pub fn rank_key(&self) -> f64 {
        self.fused_score + self.boost
    }

    /// The score reported to callers and compared against the floor.
    pub fn final_score(&self) -> f64 {
        (self.vector_score * self.record.path_weight + self.boost).min(MAX_SCORE)
    }
}

/// RRF contribution of one 1-based rank.
///
/// # Examples
///
/// ```
/// use codescope_search::fusion::rrf_contribution;
///
/// assert!((rrf_contribution(1, 60.0) - 1.0 / 61.0).abs() < 1e-12);
/// ```
pub fn rrf_contribution(rank: usize, k: f64) -> f64 {
    1.0 / (k + rank as f64)
}

/// Fuse ranked id lists. Each list is best-first.
///
/// # Examples
///
/// ```
/// use codescope_search::fusion::reciprocal_rank_fusion;
///
/// let vector = vec!["a".to_string(), "b".to_string()];
/// let lexical = vec!["b".to_string()];
/// let fused = reciprocal_rank_fusion(&[&vector[..], &lexical[..]], 60.0);
/// assert!(fused["b"] > fused["a"]);
/// ```
pub fn reciprocal_rank_fusion(streams: &[&[String]], k: f64) -> HashMap<String, f64> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    for stream in streams {
        for (i, id) in stream.iter().enumerate() {
            *scores.entry(id.clone()).or_default() += rrf_contribution(i + 1, k);
        }
    }
    scores
}

/// Best-first: higher rank key, then higher raw vector similarity, then
/// higher success rate, then chunk id.
pub fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    desc(a.rank_key(), b.rank_key())
        .then_with(|| desc(a.vector_score, b.vector_score))
        .then_with(|| desc(a.record.success_rate, b.record.success_rate))
        .then_with(|| a.record.id.cmp(&b.record.id))
}

pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(compare_candidates);
}

fn desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

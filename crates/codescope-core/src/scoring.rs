//! Fixed constants used to fuse, boost and threshold retrieval scores.

/// Reciprocal Rank Fusion damping constant.
pub const RRF_K: f64 = 60.0;

/// Final scores below this are dropped from results.
pub const SIMILARITY_FLOOR: f64 = 0.3;

/// Added when the query names the chunk's symbol or signature.
pub const SYMBOL_MATCH_BOOST: f64 = 0.3;

/// Added when the chunk calls, or is called by, another strong candidate.
pub const NEIGHBOR_BOOST: f64 = 0.05;

/// Upper bound for any final score.
pub const MAX_SCORE: f64 = 1.0;

/// Intention records above this confidence short-circuit retrieval.
pub const INTENTION_HIT_CONFIDENCE: f64 = 0.7;

/// A top result above this score is learned as an intention.
pub const INTENTION_RECORD_THRESHOLD: f64 = 0.8;

/// Smoothing factor for the success-rate moving average.
pub const SUCCESS_RATE_ALPHA: f64 = 0.3;

/// Number of head candidates sent to the cross-encoder by default.
pub const RERANK_TOP_N: usize = 50;

/// Minimum candidate pool per retrieval stream.
pub const MIN_CANDIDATE_POOL: usize = 50;

/// Multiplier applied to the requested limit to size the candidate pool.
pub const CANDIDATE_POOL_FACTOR: usize = 5;

/// Candidate pool size for a query asking for `limit` results.
///
/// # Examples
///
/// ```
/// use codescope_core::scoring::candidate_pool;
///
/// assert_eq!(candidate_pool(3), 50);
/// assert_eq!(candidate_pool(20), 100);
/// ```
pub fn candidate_pool(limit: usize) -> usize {
    (limit.saturating_mul(CANDIDATE_POOL_FACTOR)).max(MIN_CANDIDATE_POOL)
}

/// One step of the success-rate exponential moving average.
///
/// # Examples
///
/// ```
/// use codescope_core::scoring::update_success_rate;
///
/// let rate = update_success_rate(0.0, true);
/// assert!((rate - 0.3).abs() < 1e-9);
/// ```
pub fn update_success_rate(rate: f64, useful: bool) -> f64 {
    let outcome = if useful { 1.0 } else { 0.0 };
    (rate + SUCCESS_RATE_ALPHA * (outcome - rate)).clamp(0.0, 1.0)
}

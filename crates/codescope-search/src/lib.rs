//! Hybrid retrieval, symbol-aware boosting, re-ranking and adaptive learning.
//!
//! A query flows through [`engine::SearchEngine::search`]:
//! 1. the intention cache answers repeated confident queries directly
//! 2. [`hybrid::retrieve`] fuses cosine and BM25 rankings with RRF
//! 3. [`boost::apply_symbol_boost`] lifts chunks the query names, and their
//!    call-graph neighbors
//! 4. [`boost::apply_floor`] drops weak matches
//! 5. [`rerank::Reranker`] optionally reorders the head with a cross-encoder
//! 6. a confident top result is learned as an intention

pub mod boost;
pub mod engine;
pub mod fusion;
pub mod hybrid;
pub mod intention;
pub mod rerank;

pub use boost::SymbolBoostMeta;
pub use engine::{SearchEngine, SearchResponse, SearchResult};
pub use fusion::{reciprocal_rank_fusion, Candidate};
pub use hybrid::HybridMeta;
pub use intention::{generalize_pattern, normalize_query, IntentionCache};
pub use rerank::{CrossEncoder, FixedScores, HttpCrossEncoder, RerankCandidate, RerankMeta, Reranker};

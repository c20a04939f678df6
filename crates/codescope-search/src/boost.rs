//! Symbol-aware boosting and the similarity floor.

use std::collections::HashSet;

use codescope_core::scoring::{NEIGHBOR_BOOST, SIMILARITY_FLOOR, SYMBOL_MATCH_BOOST};
use codescope_core::CodescopeError;
use codescope_index::chunker::symbol_tokens;
use serde::Serialize;
use tracing::debug;

use crate::fusion::{sort_candidates, Candidate};

/// Tokens too generic to count as evidence that a query names a symbol.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "into", "that", "this", "get", "set", "new", "all",
    "not", "are", "has", "was", "via", "def", "func", "function", "class", "impl", "self", "pub",
];

const MIN_SIGNIFICANT_LEN: usize = 3;

/// What the booster did for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolBoostMeta {
    pub enabled: bool,
    /// Candidates whose symbol or signature the query names.
    pub symbol_matches: usize,
    /// Candidates adjacent in the call graph to a strong candidate.
    pub neighbor_matches: usize,
}

/// Lowercase, replace everything but alphanumerics and `_` with spaces, and
/// collapse whitespace.
///
/// # Examples
///
/// ```
/// use codescope_search::boost::normalize_text;
///
/// assert_eq!(normalize_text("fn  Parse(cfg: &Config)"), "fn parse cfg config");
/// ```
pub fn normalize_text(text: &str) -> String {
    let spaced: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The lowercased words of a raw query plus their identifier sub-tokens.
fn query_terms(query: &str) -> HashSet<String> {
    let mut terms = HashSet::new();
    for word in query
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
    {
        terms.insert(word.to_lowercase());
        terms.extend(symbol_tokens(word));
    }
    terms
}

fn significant_tokens(symbol: &str) -> Vec<String> {
    symbol_tokens(symbol)
        .into_iter()
        .filter(|t| t.len() >= MIN_SIGNIFICANT_LEN && !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

/// Whether a query names this candidate's symbol or signature.
fn names_symbol(normalized_query: &str, terms: &HashSet<String>, candidate: &Candidate) -> bool {
    let signature = normalize_text(&candidate.record.signature);
    if !signature.is_empty() && contains_phrase(normalized_query, &signature) {
        return true;
    }
    let symbol = normalize_text(&candidate.record.symbol);
    if !symbol.is_empty() && (terms.contains(&symbol) || contains_phrase(normalized_query, &symbol)) {
        return true;
    }
    let significant = significant_tokens(&candidate.record.symbol);
    !significant.is_empty() && significant.iter().all(|t| terms.contains(t))
}

/// Word-aligned substring test on normalized text.
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    format!(" {haystack} ").contains(&format!(" {needle} "))
}

/// Add symbol and neighbor boosts, then re-sort by `fused + boost`.
///
/// When disabled, boosts are cleared and the fused order is left untouched.
pub fn apply_symbol_boost(query: &str, candidates: &mut [Candidate], enabled: bool) -> SymbolBoostMeta {
    let mut meta = SymbolBoostMeta {
        enabled,
        ..SymbolBoostMeta::default()
    };
    if !enabled {
        for candidate in candidates.iter_mut() {
            candidate.boost = 0.0;
        }
        return meta;
    }

    let normalized = normalize_text(query);
    let terms = query_terms(query);
    let strong: HashSet<String> = candidates
        .iter()
        .filter(|c| c.vector_score >= SIMILARITY_FLOOR)
        .map(|c| c.record.id.clone())
        .collect();

    for candidate in candidates.iter_mut() {
        let mut boost = 0.0;
        if names_symbol(&normalized, &terms, candidate) {
            boost += SYMBOL_MATCH_BOOST;
            meta.symbol_matches += 1;
        }
        let id = candidate.record.id.as_str();
        let adjacent = candidate
            .record
            .call_targets
            .iter()
            .chain(candidate.record.callers.iter())
            .any(|n| n != id && strong.contains(n));
        if adjacent {
            boost += NEIGHBOR_BOOST;
            meta.neighbor_matches += 1;
        }
        candidate.boost = boost;
    }

    sort_candidates(candidates);
    debug!(
        symbol = meta.symbol_matches,
        neighbor = meta.neighbor_matches,
        "applied symbol boost"
    );
    meta
}

/// Drop candidates whose final score is under the floor.
///
/// # Errors
///
/// Returns [`CodescopeError::NoRelevantMatches`] if nothing survives.
pub fn apply_floor(candidates: Vec<Candidate>) -> Result<Vec<Candidate>, CodescopeError> {
    let before = candidates.len();
    let kept: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| c.final_score() >= SIMILARITY_FLOOR)
        .collect();
    if kept.is_empty() {
        return Err(CodescopeError::NoRelevantMatches {
            candidates: before,
            floor: SIMILARITY_FLOOR,
        });
    }
    Ok(kept)
}

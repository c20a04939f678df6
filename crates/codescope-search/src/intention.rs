//! Query normalization, the intention cache and query-pattern analytics.

use std::sync::{Arc, OnceLock};

use codescope_core::scoring::{INTENTION_HIT_CONFIDENCE, INTENTION_RECORD_THRESHOLD};
use codescope_core::{CodescopeError, ScopeMatcher};
use codescope_index::{ChunkRecord, Embedder, IndexStore, IntentionRecord};
use regex::Regex;
use tracing::debug;

/// Spanish query words mapped to the English terms code is written in.
const SYNONYMS: &[(&str, &str)] = &[
    ("crear", "create"),
    ("usuario", "user"),
    ("usuarios", "users"),
    ("buscar", "search"),
    ("obtener", "get"),
    ("funcion", "function"),
    ("función", "function"),
    ("sesion", "session"),
    ("sesión", "session"),
    ("pago", "payment"),
    ("pagos", "payments"),
    ("borrar", "delete"),
    ("eliminar", "delete"),
    ("actualizar", "update"),
    ("guardar", "save"),
    ("mensaje", "message"),
    ("mensajes", "messages"),
    ("sala", "room"),
    ("salas", "rooms"),
    ("enviar", "send"),
    ("archivo", "file"),
    ("iniciar", "start"),
    ("cerrar", "close"),
];

/// Canonical form of a query for intention lookups.
///
/// Case-folds, strips punctuation other than `_`, collapses whitespace and
/// translates known Spanish words token by token.
///
/// # Examples
///
/// ```
/// use codescope_search::intention::normalize_query;
///
/// assert_eq!(normalize_query("  Crear   USUARIO!? "), "create user");
/// assert_eq!(normalize_query("find_user()"), "find_user");
/// ```
pub fn normalize_query(query: &str) -> String {
    let lowered = query.to_lowercase();
    let spaced: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect();
    spaced
        .split_whitespace()
        .map(|token| {
            SYNONYMS
                .iter()
                .find(|(es, _)| *es == token)
                .map_or(token, |(_, en)| *en)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn quoted_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""[^"]*"|'[^']*'|`[^`]*`"#).ok())
        .as_ref()
}

fn number_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d+(?:\.\d+)?\b").ok())
        .as_ref()
}

fn word_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*(?:(?:::|\.)[A-Za-z_][A-Za-z0-9_]*)*").ok())
        .as_ref()
}

/// Whether a word looks like a code identifier rather than prose.
fn is_identifier(word: &str) -> bool {
    if word.contains('_') || word.contains("::") || word.contains('.') {
        return true;
    }
    let mut chars = word.chars();
    let first_lower = chars.next().is_some_and(|c| c.is_lowercase());
    let inner_upper = word.chars().skip(1).any(|c| c.is_uppercase());
    (first_lower && inner_upper) || (word.len() > 1 && word.chars().all(|c| c.is_uppercase()))
        || (word.chars().next().is_some_and(|c| c.is_uppercase()) && inner_upper)
}

/// Generalize a query into a template for analytics.
///
/// Quoted strings become `{string}`, numbers `{number}` and identifiers
/// (snake_case, camelCase, PascalCase runs, paths) `{entity}`.
///
/// # Examples
///
/// ```
/// use codescope_search::intention::generalize_pattern;
///
/// assert_eq!(
///     generalize_pattern("Where is parseConfig called with \"prod\" 3 times"),
///     "where is {entity} called with {string} {number} times"
/// );
/// ```
pub fn generalize_pattern(query: &str) -> String {
    let mut text = query.to_string();
    if let Some(re) = quoted_re() {
        text = re.replace_all(&text, " {string} ").into_owned();
    }
    if let Some(re) = number_re() {
        text = re.replace_all(&text, " {number} ").into_owned();
    }
    if let Some(re) = word_re() {
        text = re
            .replace_all(&text, |caps: &regex::Captures| {
                let word = &caps[0];
                if is_identifier(word) {
                    "{entity}".to_string()
                } else {
                    word.to_lowercase()
                }
            })
            .into_owned();
    }
    // Placeholders survive the word pass because braces are not word chars.
    text.split_whitespace()
        .map(|w| {
            if w.starts_with('{') && w.ends_with('}') {
                w.to_string()
            } else {
                w.chars()
                    .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '{' || *c == '}')
                    .collect()
            }
        })
        .filter(|w: &String| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Learned query → chunk mappings backed by the store.
#[derive(Clone)]
pub struct IntentionCache {
    store: Arc<IndexStore>,
}

impl IntentionCache {
    pub fn new(store: Arc<IndexStore>) -> Self {
        Self { store }
    }

    /// A confident intention whose target still exists, is in scope and was
    /// embedded by `embedder`'s provider.
    ///
    /// A hit bumps the record's usage count.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on store failures.
    pub fn lookup(
        &self,
        normalized: &str,
        scope: &ScopeMatcher,
        embedder: &dyn Embedder,
    ) -> Result<Option<(IntentionRecord, ChunkRecord)>, CodescopeError> {
        let Some(record) = self.store.find_intention(normalized)? else {
            return Ok(None);
        };
        if record.confidence <= INTENTION_HIT_CONFIDENCE {
            return Ok(None);
        }
        let Some(chunk) = self.store.get_chunk(&record.target_chunk_id)? else {
            return Ok(None);
        };
        if !scope.matches(&chunk.file, &chunk.language, &chunk.tags) {
            return Ok(None);
        }
        if chunk.provider != embedder.provider() || chunk.dimensions != embedder.dimensions() {
            debug!(query = normalized, target = %chunk.id, "intention target from another provider");
            return Ok(None);
        }
        self.store.touch_intention(normalized)?;
        debug!(query = normalized, target = %chunk.id, "intention hit");
        Ok(Some((record, chunk)))
    }

    /// Learn `target` for `normalized` when `score` clears the threshold.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on store failures.
    pub fn learn(
        &self,
        normalized: &str,
        original: &str,
        target: &str,
        score: f64,
    ) -> Result<Option<IntentionRecord>, CodescopeError> {
        if score <= INTENTION_RECORD_THRESHOLD || normalized.is_empty() {
            return Ok(None);
        }
        let record = self
            .store
            .upsert_intention(normalized, original, target, score)?;
        debug!(query = normalized, target, confidence = record.confidence, "learned intention");
        Ok(Some(record))
    }

    /// Count one occurrence of the query's generalized pattern.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on store failures.
    pub fn observe(&self, query: &str) -> Result<(), CodescopeError> {
        let pattern = generalize_pattern(query);
        if pattern.is_empty() {
            return Ok(());
        }
        self.store.bump_pattern(&pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codescope_core::{CodescopeConfig, ScopeFilter, ScopeOverrides};
    use codescope_index::HashEmbedder;

    #[test]
    fn normalization_folds_case_and_punctuation() {
        assert_eq!(normalize_query("Parse  the CONFIG, please."), "parse the config please");
        assert_eq!(normalize_query("buscar sesión de pago"), "search session de payment");
        assert_eq!(normalize_query("???"), "");
    }

    #[test]
    fn patterns_generalize_entities_strings_and_numbers() {
        assert_eq!(generalize_pattern("find user_id"), "find {entity}");
        assert_eq!(generalize_pattern("open 'config.toml' twice"), "open {string} twice");
        assert_eq!(generalize_pattern("retry 3 times in HttpClient"), "retry {number} times in {entity}");
        assert_eq!(generalize_pattern("Login flow"), "login flow");
    }

    #[test]
    fn identical_shapes_share_a_pattern() {
        assert_eq!(
            generalize_pattern("where is parseConfig used"),
            generalize_pattern("where is load_index used")
        );
    }

    #[test]
    fn learn_requires_high_score() {
        let store = Arc::new(IndexStore::in_memory().unwrap());
        let cache = IntentionCache::new(store.clone());
        assert!(cache.learn("q", "q", "a.rs:f:00000000", 0.8).unwrap().is_none());
        assert!(cache.learn("q", "q", "a.rs:f:00000000", 0.81).unwrap().is_some());
    }

    #[test]
    fn lookup_skips_stale_targets() {
        let store = Arc::new(IndexStore::in_memory().unwrap());
        let cache = IntentionCache::new(store.clone());
        cache.learn("q", "q", "gone.rs:f:00000000", 0.95).unwrap();

        let filter = ScopeFilter::resolve(&CodescopeConfig::default(), None, &ScopeOverrides::default());
        let scope = ScopeMatcher::new(&filter).unwrap();
        assert!(cache
            .lookup("q", &scope, &HashEmbedder::new(8))
            .unwrap()
            .is_none());
    }

    #[test]
    fn observe_counts_patterns() {
        let store = Arc::new(IndexStore::in_memory().unwrap());
        let cache = IntentionCache::new(store.clone());
        cache.observe("where is parseConfig").unwrap();
        cache.observe("where is load_index").unwrap();
        let top = store.top_patterns(5).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].pattern, "where is {entity}");
        assert_eq!(top[0].frequency, 2);
    }
}

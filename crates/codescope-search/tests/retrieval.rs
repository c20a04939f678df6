//! Integration test: index a small project, then query it end to end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use codescope_core::{CodescopeConfig, CodescopeError, ErrorKind, RerankMode, ScopeFilter};
use codescope_index::codec::ChunkBodyStore;
use codescope_index::store::DB_FILE_NAME;
use codescope_index::{Embedder, IndexRequest, IndexStore, Indexer, InputKind, LexicalIndex};
use codescope_search::{FixedScores, Reranker, SearchEngine};

const HANDLERS: &[&str] = &["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"];

/// Returns one vector for documents and another for queries, and counts
/// query embeddings.
struct SplitEmbedder {
    document: Vec<f32>,
    query: Vec<f32>,
    queries: AtomicUsize,
}

impl SplitEmbedder {
    /// Every chunk is a perfect cosine match for every query.
    fn constant() -> Self {
        Self {
            document: vec![1.0, 0.0],
            query: vec![1.0, 0.0],
            queries: AtomicUsize::new(0),
        }
    }

    /// Queries are orthogonal to every chunk.
    fn orthogonal() -> Self {
        Self {
            query: vec![0.0, 1.0],
            ..Self::constant()
        }
    }

    fn query_calls(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for SplitEmbedder {
    fn provider(&self) -> &str {
        "test:split"
    }

    fn dimensions(&self) -> usize {
        2
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        kind: InputKind,
    ) -> Result<Vec<Vec<f32>>, CodescopeError> {
        let vector = match kind {
            InputKind::Document => &self.document,
            InputKind::Query => {
                self.queries.fetch_add(1, Ordering::SeqCst);
                &self.query
            }
        };
        Ok(texts.iter().map(|_| vector.clone()).collect())
    }
}

/// Lexical index that counts queries before delegating to the store.
struct CountingLexical {
    inner: Arc<IndexStore>,
    queries: AtomicUsize,
}

impl LexicalIndex for CountingLexical {
    fn index(&self, chunk_id: &str, text: &str) -> Result<(), CodescopeError> {
        self.inner.index(chunk_id, text)
    }

    fn remove(&self, chunk_id: &str) -> Result<(), CodescopeError> {
        self.inner.remove(chunk_id)
    }

    fn query(&self, text: &str, limit: usize) -> Result<Vec<(String, f64)>, CodescopeError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(text, limit)
    }
}

struct Project {
    _dir: tempfile::TempDir,
    store: Arc<IndexStore>,
    bodies: Arc<ChunkBodyStore>,
}

impl Project {
    /// Ten look-alike handlers plus one function only a keyword search finds.
    async fn indexed(embedder: Arc<dyn Embedder>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        for name in HANDLERS {
            std::fs::write(
                src.join(format!("{name}.rs")),
                format!("pub fn handler_{name}() -> u32 {{\n    1\n}}\n"),
            )
            .unwrap();
        }
        std::fs::write(
            src.join("z.rs"),
            "pub fn settle(total: u64) -> u64 {\n    // ledger reconciliation\n    total\n}\n",
        )
        .unwrap();

        let data_dir = dir.path().join(".codescope");
        let store = Arc::new(IndexStore::open(&data_dir.join(DB_FILE_NAME)).unwrap());
        let bodies = Arc::new(ChunkBodyStore::new(&data_dir.join("chunks"), None, false));
        let report = Indexer::new(dir.path(), &data_dir, store.clone(), bodies.clone(), embedder)
            .run(IndexRequest::full(), None)
            .await
            .unwrap();
        assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
        assert_eq!(report.total_chunks, HANDLERS.len() + 1);

        Self {
            _dir: dir,
            store,
            bodies,
        }
    }

    fn engine(&self, embedder: Arc<dyn Embedder>, reranker: Reranker) -> SearchEngine {
        SearchEngine::new(self.store.clone(), self.bodies.clone(), embedder, reranker)
    }

    fn id_of(&self, symbol: &str) -> String {
        self.store
            .all_chunks()
            .unwrap()
            .into_iter()
            .find(|c| c.symbol == symbol)
            .map(|c| c.id)
            .unwrap()
    }
}

fn default_filter() -> ScopeFilter {
    ScopeFilter::from_config(&CodescopeConfig::default())
}

fn top_symbols(response: &codescope_search::SearchResponse, n: usize) -> Vec<String> {
    response
        .results
        .iter()
        .take(n)
        .map(|r| r.symbol.clone())
        .collect()
}

#[tokio::test]
async fn hybrid_recall_beats_vector_only() {
    let embedder: Arc<dyn Embedder> = Arc::new(SplitEmbedder::constant());

    let hybrid_project = Project::indexed(embedder.clone()).await;
    let hybrid = hybrid_project
        .engine(embedder.clone(), Reranker::unavailable("off"))
        .search("ledger reconciliation", 3, &default_filter())
        .await
        .unwrap();

    let vector_project = Project::indexed(embedder.clone()).await;
    let mut vector_only = default_filter();
    vector_only.hybrid_enabled = false;
    let plain = vector_project
        .engine(embedder, Reranker::unavailable("off"))
        .search("ledger reconciliation", 3, &vector_only)
        .await
        .unwrap();

    let recall = |symbols: Vec<String>| symbols.iter().filter(|s| *s == "settle").count();
    assert_eq!(recall(top_symbols(&hybrid, 3)), 1);
    assert_eq!(recall(top_symbols(&plain, 3)), 0);
    assert_eq!(hybrid.results[0].symbol, "settle");

    let meta = hybrid.hybrid_meta.unwrap();
    assert!(meta.enabled);
    assert_eq!(meta.lexical_candidates, 1);
    assert!(!plain.hybrid_meta.unwrap().enabled);
}

#[tokio::test]
async fn repeated_query_is_answered_from_intentions() {
    let embedder = Arc::new(SplitEmbedder::constant());
    let project = Project::indexed(embedder.clone()).await;
    let lexical = Arc::new(CountingLexical {
        inner: project.store.clone(),
        queries: AtomicUsize::new(0),
    });
    let engine = project
        .engine(embedder.clone(), Reranker::unavailable("off"))
        .with_lexical(lexical.clone());

    let first = engine
        .search("ledger reconciliation", 5, &default_filter())
        .await
        .unwrap();
    assert!(!first.intention_hit);
    assert_eq!(first.results[0].symbol, "settle");
    assert_eq!(embedder.query_calls(), 1);
    assert_eq!(lexical.queries.load(Ordering::SeqCst), 1);

    let second = engine
        .search("  Ledger   reconciliation? ", 5, &default_filter())
        .await
        .unwrap();
    assert!(second.intention_hit);
    assert_eq!(second.results.len(), 1);
    assert_eq!(second.results[0].symbol, "settle");
    assert!(second.hybrid_meta.is_none());
    assert_eq!(embedder.query_calls(), 1);
    assert_eq!(lexical.queries.load(Ordering::SeqCst), 1);

    let record = project
        .store
        .find_intention("ledger reconciliation")
        .unwrap()
        .unwrap();
    assert_eq!(record.usage_count, 2);

    let patterns = project.store.top_patterns(5).unwrap();
    assert_eq!(patterns[0].pattern, "ledger reconciliation");
    assert_eq!(patterns[0].frequency, 2);
}

#[tokio::test]
async fn intention_outside_scope_is_ignored() {
    let embedder = Arc::new(SplitEmbedder::constant());
    let project = Project::indexed(embedder.clone()).await;
    let engine = project.engine(embedder.clone(), Reranker::unavailable("off"));

    engine
        .search("ledger reconciliation", 5, &default_filter())
        .await
        .unwrap();

    let mut scoped = default_filter();
    scoped.path_globs = vec!["src/a.rs".into()];
    let response = engine
        .search("ledger reconciliation", 5, &scoped)
        .await
        .unwrap();
    assert!(!response.intention_hit);
    assert_eq!(top_symbols(&response, 5), vec!["handler_a"]);
    assert_eq!(embedder.query_calls(), 2);
}

/// Same vectors as the wrapped embedder under another provider name.
struct Renamed(SplitEmbedder);

#[async_trait]
impl Embedder for Renamed {
    fn provider(&self) -> &str {
        "test:renamed"
    }

    fn dimensions(&self) -> usize {
        self.0.dimensions()
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        kind: InputKind,
    ) -> Result<Vec<Vec<f32>>, CodescopeError> {
        self.0.embed_batch(texts, kind).await
    }
}

#[tokio::test]
async fn intention_from_another_provider_is_ignored() {
    let embedder = Arc::new(SplitEmbedder::constant());
    let project = Project::indexed(embedder.clone()).await;
    let learned = project
        .engine(embedder, Reranker::unavailable("off"))
        .search("ledger reconciliation", 5, &default_filter())
        .await
        .unwrap();
    assert!(!learned.intention_hit);

    let switched = project.engine(
        Arc::new(Renamed(SplitEmbedder::constant())),
        Reranker::unavailable("off"),
    );
    let err = switched
        .search("ledger reconciliation", 5, &default_filter())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmbeddingDimensionMismatch);

    let record = project
        .store
        .find_intention("ledger reconciliation")
        .unwrap()
        .unwrap();
    assert_eq!(record.usage_count, 1);
}

#[tokio::test]
async fn unavailable_reranker_keeps_fused_order() {
    let embedder: Arc<dyn Embedder> = Arc::new(SplitEmbedder::constant());
    let project = Project::indexed(embedder.clone()).await;

    let mut off = default_filter();
    off.rerank_mode = RerankMode::Off;
    let baseline = project
        .engine(embedder.clone(), Reranker::unavailable("no endpoint"))
        .search("handler results", 5, &off)
        .await
        .unwrap();

    let fresh = Project::indexed(embedder.clone()).await;
    let mut cross = default_filter();
    cross.rerank_mode = RerankMode::CrossEncoder;
    let fallback = fresh
        .engine(embedder, Reranker::unavailable("no endpoint"))
        .search("handler results", 5, &cross)
        .await
        .unwrap();

    assert_eq!(top_symbols(&baseline, 5), top_symbols(&fallback, 5));
    let meta = fallback.rerank_meta.unwrap();
    assert!(!meta.applied);
    assert_eq!(meta.fallback.unwrap().kind, ErrorKind::RerankUnavailable);
}

#[tokio::test]
async fn cross_encoder_scores_reorder_the_head() {
    let embedder: Arc<dyn Embedder> = Arc::new(SplitEmbedder::constant());
    let project = Project::indexed(embedder.clone()).await;
    let favored = project.id_of("handler_g");
    let reranker = Reranker::with_encoder(
        Box::new(FixedScores::new([(favored, 0.9)])),
        50,
        Duration::from_secs(5),
    );

    let mut filter = default_filter();
    filter.rerank_mode = RerankMode::CrossEncoder;
    let response = project
        .engine(embedder, reranker)
        .search("handler results", 4, &filter)
        .await
        .unwrap();

    assert_eq!(
        top_symbols(&response, 4),
        vec!["handler_g", "handler_a", "handler_b", "handler_c"]
    );
    let meta = response.rerank_meta.unwrap();
    assert!(meta.applied);
    assert!(meta.fallback.is_none());
}

#[tokio::test]
async fn named_symbol_ranks_first_unless_boost_is_disabled() {
    let embedder: Arc<dyn Embedder> = Arc::new(SplitEmbedder::constant());

    let mut vector_only = default_filter();
    vector_only.hybrid_enabled = false;

    let project = Project::indexed(embedder.clone()).await;
    let boosted = project
        .engine(embedder.clone(), Reranker::unavailable("off"))
        .search("where is settle", 3, &vector_only)
        .await
        .unwrap();
    assert_eq!(boosted.results[0].symbol, "settle");
    assert_eq!(boosted.symbol_boost_meta.unwrap().symbol_matches, 1);

    let mut unboosted = vector_only.clone();
    unboosted.symbol_boost_enabled = false;
    let fresh = Project::indexed(embedder.clone()).await;
    let plain = fresh
        .engine(embedder, Reranker::unavailable("off"))
        .search("where is settle", 3, &unboosted)
        .await
        .unwrap();
    assert_eq!(
        top_symbols(&plain, 3),
        vec!["handler_a", "handler_b", "handler_c"]
    );
}

#[tokio::test]
async fn weak_matches_are_dropped() {
    let embedder: Arc<dyn Embedder> = Arc::new(SplitEmbedder::orthogonal());
    let project = Project::indexed(embedder.clone()).await;

    let err = project
        .engine(embedder, Reranker::unavailable("off"))
        .search("ledger reconciliation", 5, &default_filter())
        .await
        .unwrap_err();
    assert!(matches!(err, CodescopeError::NoRelevantMatches { .. }));
    assert!(err.is_empty_result());
}

#[tokio::test]
async fn querying_before_indexing_fails() {
    let store = Arc::new(IndexStore::in_memory().unwrap());
    let dir = tempfile::tempdir().unwrap();
    let bodies = Arc::new(ChunkBodyStore::new(dir.path(), None, false));
    let engine = SearchEngine::new(
        store,
        bodies,
        Arc::new(SplitEmbedder::constant()),
        Reranker::unavailable("off"),
    );

    let err = engine
        .search("anything", 5, &default_filter())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreNotFound);
}

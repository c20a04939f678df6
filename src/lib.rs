//! codescope: a semantic code index for coding agents.
//!
//! [`Codescope`] is the project context every operation runs against. It
//! owns the repository root, the data directory (`.codescope/`), the loaded
//! configuration and the collaborators built from it.
//!
//! ```no_run
//! use codescope::Codescope;
//!
//! # async fn example() -> codescope_core::Result<()> {
//! let project = Codescope::open(std::path::Path::new("."))?;
//! let report = project.index_project(None, None).await?;
//! println!("{} chunks embedded", report.processed_chunks);
//!
//! let response = project.search_code("where are sessions opened", None, None).await?;
//! for hit in &response.results {
//!     println!("{}:{} {} ({:.2})", hit.file, hit.start_line, hit.symbol, hit.score);
//! }
//! # Ok(())
//! # }
//! ```

mod logging;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use codescope_core::{
    CodescopeConfig, CodescopeError, ContextPack, ScopeFilter, ScopeOverrides,
};
use codescope_index::store::{StoreStats, DB_FILE_NAME};
use codescope_index::{
    embedder_from_config, ChunkBodyStore, Codemap, Embedder, IndexEvent, IndexReport,
    IndexRequest, IndexStore, Indexer, QueryPattern, WatchHandle,
};
use codescope_search::{Reranker, SearchEngine, SearchResponse};
use codescope_syntax::walker::{walk_subtree, WalkOptions};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use codescope_core as core;
pub use codescope_index as index;
pub use codescope_search as search;
pub use codescope_syntax as syntax;
pub use logging::{init_logging, LOG_ENV_VAR};

/// Directory under the root holding the store, chunk bodies and projections.
pub const DATA_DIR_NAME: &str = ".codescope";

/// A repository opened for indexing and search.
pub struct Codescope {
    root: PathBuf,
    data_dir: PathBuf,
    config: CodescopeConfig,
    store: Arc<IndexStore>,
    bodies: Arc<ChunkBodyStore>,
    embedder: Arc<dyn Embedder>,
    engine: SearchEngine,
}

impl Codescope {
    /// Open `root`, loading `.codescope.toml` if present.
    ///
    /// # Errors
    ///
    /// - [`CodescopeError::FileNotFound`] if `root` is not a directory
    /// - [`CodescopeError::Config`] for invalid configuration, including
    ///   encryption enabled without a key
    /// - [`CodescopeError::Database`] if the store cannot be opened
    pub fn open(root: &Path) -> Result<Self, CodescopeError> {
        if !root.is_dir() {
            return Err(CodescopeError::FileNotFound(root.to_path_buf()));
        }
        let config = CodescopeConfig::load(root)?;
        Self::with_config(root, config)
    }

    /// Open `root` with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Same as [`Codescope::open`].
    pub fn with_config(root: &Path, config: CodescopeConfig) -> Result<Self, CodescopeError> {
        if !root.is_dir() {
            return Err(CodescopeError::FileNotFound(root.to_path_buf()));
        }
        let data_dir = root.join(DATA_DIR_NAME);
        let store = Arc::new(IndexStore::open(&data_dir.join(DB_FILE_NAME))?);
        let bodies = Arc::new(ChunkBodyStore::from_config(&data_dir, &config.encryption)?);
        let embedder = embedder_from_config(&config.embedding)?;
        let engine = SearchEngine::new(
            store.clone(),
            bodies.clone(),
            embedder.clone(),
            Reranker::from_config(&config.rerank),
        );

        Ok(Self {
            root: root.to_path_buf(),
            data_dir,
            config,
            store,
            bodies,
            embedder,
            engine,
        })
    }

    /// Replace the embedder used for both indexing and queries.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.engine = self.engine.with_embedder(embedder.clone());
        self.embedder = embedder;
        self
    }

    /// Replace the re-ranker.
    pub fn with_reranker(mut self, reranker: Reranker) -> Self {
        self.engine = self.engine.with_reranker(reranker);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config(&self) -> &CodescopeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    fn walk_options(&self) -> Result<WalkOptions, CodescopeError> {
        WalkOptions::new(self.config.index.max_file_size, &self.config.index.exclude)
    }

    fn indexer(&self) -> Result<Indexer, CodescopeError> {
        let walk = self.walk_options()?;
        Ok(Indexer::new(
            &self.root,
            &self.data_dir,
            self.store.clone(),
            self.bodies.clone(),
            self.embedder.clone(),
        )
        .with_walk_options(walk)
        .with_workers(self.config.index.workers))
    }

    /// Index the project.
    ///
    /// With neither list the whole repository is scanned; otherwise only the
    /// given paths (absolute or root-relative) are processed.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures that affect the whole pass; per-file
    /// failures are listed in [`IndexReport::errors`].
    pub async fn index_project(
        &self,
        changed: Option<Vec<PathBuf>>,
        deleted: Option<Vec<PathBuf>>,
    ) -> Result<IndexReport, CodescopeError> {
        let request = IndexRequest { changed, deleted };
        self.indexer()?.run(request, None).await
    }

    /// Index the project in the background, streaming progress events.
    ///
    /// The receiver may be dropped; the pass continues regardless.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Config`] if the exclude globs are invalid.
    pub fn index_project_with_events(
        &self,
        request: IndexRequest,
    ) -> Result<
        (
            JoinHandle<Result<IndexReport, CodescopeError>>,
            mpsc::UnboundedReceiver<IndexEvent>,
        ),
        CodescopeError,
    > {
        let indexer = self.indexer()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move { indexer.run(request, Some(tx)).await });
        Ok((task, rx))
    }

    /// The scope a query would run with.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::FileNotFound`] if the named context pack
    /// does not exist.
    pub fn resolve_scope(&self, overrides: &ScopeOverrides) -> Result<ScopeFilter, CodescopeError> {
        let pack = overrides
            .context_pack
            .as_deref()
            .map(|name| ContextPack::load(&self.data_dir, name))
            .transpose()?;
        Ok(ScopeFilter::resolve(&self.config, pack.as_ref(), overrides))
    }

    /// Search the index.
    ///
    /// `limit` defaults to `search.default_limit`.
    ///
    /// # Errors
    ///
    /// See [`SearchEngine::search`]. Empty results are reported as
    /// `no_candidates`, `embedding_dimension_mismatch` or
    /// `no_relevant_matches`; check [`CodescopeError::is_empty_result`].
    pub async fn search_code(
        &self,
        query: &str,
        limit: Option<usize>,
        scope: Option<ScopeOverrides>,
    ) -> Result<SearchResponse, CodescopeError> {
        let filter = self.resolve_scope(&scope.unwrap_or_default())?;
        let limit = limit.unwrap_or(self.config.search.default_limit);
        self.engine.search(query, limit, &filter).await
    }

    /// Source text of the chunk body stored under `sha`.
    ///
    /// # Errors
    ///
    /// - [`CodescopeError::ChunkNotFound`] if no body exists
    /// - [`CodescopeError::ChunkKeyMissing`] if it is sealed and no key is set
    /// - [`CodescopeError::ChunkAuthFailed`] if it fails authentication
    pub fn get_chunk(&self, sha: &str) -> Result<String, CodescopeError> {
        self.bodies.read_string(sha)
    }

    /// Regenerate `codescope.codemap.json` from the store.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] or [`CodescopeError::Io`].
    pub fn rebuild_codemap(&self) -> Result<Codemap, CodescopeError> {
        let codemap = Codemap::from_store(&self.store)?;
        let path = codemap.save(&self.root)?;
        info!(path = %path.display(), chunks = codemap.len(), "rebuilt codemap");
        Ok(codemap)
    }

    /// Record whether a returned chunk was useful. Returns the new success rate.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::ChunkNotFound`] for unknown ids.
    pub fn record_feedback(&self, chunk_id: &str, useful: bool) -> Result<f64, CodescopeError> {
        self.store.record_feedback(chunk_id, useful)
    }

    /// # Errors
    ///
    /// Returns [`CodescopeError::Io`] or [`CodescopeError::Serialization`].
    pub fn save_context_pack(&self, pack: &ContextPack) -> Result<PathBuf, CodescopeError> {
        pack.save(&self.data_dir)
    }

    /// # Errors
    ///
    /// Returns [`CodescopeError::FileNotFound`] if the pack does not exist.
    pub fn load_context_pack(&self, name: &str) -> Result<ContextPack, CodescopeError> {
        ContextPack::load(&self.data_dir, name)
    }

    /// # Errors
    ///
    /// Returns [`CodescopeError::Io`] or [`CodescopeError::Serialization`].
    pub fn list_context_packs(&self) -> Result<Vec<ContextPack>, CodescopeError> {
        ContextPack::list(&self.data_dir)
    }

    /// Most frequent generalized query shapes.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on store failure.
    pub fn top_query_patterns(&self, limit: usize) -> Result<Vec<QueryPattern>, CodescopeError> {
        self.store.top_patterns(limit)
    }

    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on store failure.
    pub fn stats(&self) -> Result<StoreStats, CodescopeError> {
        self.store.stats()
    }

    /// Re-index changed files as they are saved.
    ///
    /// Events are batched over `debounce` (default `watch.debounce_ms`) and
    /// each batch runs as one incremental pass. Call [`WatchHandle::stop`] to
    /// flush and finish.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Io`] if the platform watcher cannot start.
    pub fn watch(&self, debounce: Option<Duration>) -> Result<WatchHandle, CodescopeError> {
        let window =
            debounce.unwrap_or_else(|| Duration::from_millis(self.config.watch.debounce_ms));
        let indexer = self.indexer()?;
        let walk = self.walk_options()?;
        let store = self.store.clone();
        let root = self.root.clone();

        codescope_index::spawn_watcher(&self.root, window, move |batch: BTreeSet<PathBuf>| {
            let indexer = indexer.clone();
            let walk = walk.clone();
            let store = store.clone();
            let root = root.clone();
            async move {
                let request = match batch_request(&root, &store, &walk, batch) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!(error = %e, "could not plan watch batch");
                        return;
                    }
                };
                match indexer.run(request, None).await {
                    Ok(report) => info!(
                        processed = report.processed_chunks,
                        deleted = report.deleted_chunks,
                        errors = report.errors.len(),
                        "watch batch indexed"
                    ),
                    Err(e) => warn!(error = %e, "watch batch failed"),
                }
            }
        })
    }
}

/// Split a batch into changed and deleted paths. An existing directory
/// expands to the source files under it; a missing directory expands to the
/// indexed files under it.
fn batch_request(
    root: &Path,
    store: &IndexStore,
    walk: &WalkOptions,
    batch: BTreeSet<PathBuf>,
) -> Result<IndexRequest, CodescopeError> {
    let mut changed = Vec::new();
    let mut deleted = Vec::new();
    let indexed = if batch.iter().any(|p| !root.join(p).exists()) {
        store.indexed_files()?
    } else {
        Vec::new()
    };

    for relative in batch {
        let absolute = root.join(&relative);
        if absolute.is_file() {
            changed.push(relative);
        } else if absolute.is_dir() {
            changed.extend(walk_subtree(root, &relative, walk)?.into_iter().map(|f| f.path));
        } else if !absolute.exists() {
            let prefix = format!("{}/", codescope_syntax::walker::normalize_path(&relative));
            deleted.extend(
                indexed
                    .iter()
                    .filter(|f| f.starts_with(&prefix))
                    .map(PathBuf::from),
            );
            deleted.push(relative);
        }
    }
    changed.sort();
    changed.dedup();
    Ok(IndexRequest::paths(changed, deleted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = Codescope::open(&dir.path().join("nope")).err().unwrap();
        assert!(matches!(err, CodescopeError::FileNotFound(_)));
    }

    #[test]
    fn batch_splits_changed_and_deleted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kept.rs"), "fn kept() {}").unwrap();
        let store = IndexStore::in_memory().unwrap();

        let batch: BTreeSet<PathBuf> = ["kept.rs", "gone.rs"].iter().map(PathBuf::from).collect();
        let request = batch_request(dir.path(), &store, &WalkOptions::default(), batch).unwrap();
        assert_eq!(request.changed, Some(vec![PathBuf::from("kept.rs")]));
        assert_eq!(request.deleted, Some(vec![PathBuf::from("gone.rs")]));
    }

    #[test]
    fn existing_directory_expands_to_its_sources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("moved/sub")).unwrap();
        std::fs::write(dir.path().join("moved/sub/a.rs"), "fn a() {}").unwrap();
        std::fs::write(dir.path().join("moved/b.py"), "def b(): pass").unwrap();
        std::fs::write(dir.path().join("moved/notes.txt"), "not source").unwrap();
        let store = IndexStore::in_memory().unwrap();

        let batch: BTreeSet<PathBuf> = ["moved", "moved/b.py"].iter().map(PathBuf::from).collect();
        let request = batch_request(dir.path(), &store, &WalkOptions::default(), batch).unwrap();
        assert_eq!(
            request.changed,
            Some(vec![PathBuf::from("moved/b.py"), PathBuf::from("moved/sub/a.rs")])
        );
        assert_eq!(request.deleted, Some(Vec::new()));
    }
}

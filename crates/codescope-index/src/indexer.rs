//! One indexing pass: plan, chunk, diff, embed, commit, relink, project.
//!
//! Files are processed concurrently up to a worker limit. Each file is
//! committed in its own transaction, so a failure in one file never leaves
//! partial state behind and never stops the pass. Call-graph edges are
//! recomputed once every file has been committed.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use codescope_core::{CodescopeError, Failure};
use codescope_syntax::walker::normalize_path;
use codescope_syntax::{read_source, walk_repo, CallGraph, SourceFile, WalkOptions};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::chunker::{chunk_file, content_hash, Chunk};
use crate::codec::ChunkBodyStore;
use crate::codemap::Codemap;
use crate::embedding::{Embedder, InputKind};
use crate::merkle::{diff_chunks, FileEntry, MerkleTree};
use crate::store::{EmbeddedChunk, FileCommit, IndexStore};

const DEFAULT_WORKERS: usize = 4;

/// What to index.
///
/// With neither list set the whole repository is walked and stored files
/// that disappeared are removed. Otherwise only the named paths are touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRequest {
    pub changed: Option<Vec<PathBuf>>,
    pub deleted: Option<Vec<PathBuf>>,
}

impl IndexRequest {
    pub fn full() -> Self {
        Self::default()
    }

    /// An incremental pass over explicit paths, absolute or root-relative.
    pub fn paths(changed: Vec<PathBuf>, deleted: Vec<PathBuf>) -> Self {
        Self {
            changed: Some(changed),
            deleted: Some(deleted),
        }
    }

    pub fn is_full(&self) -> bool {
        self.changed.is_none() && self.deleted.is_none()
    }
}

/// A file that could not be indexed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFailure {
    pub path: String,
    #[serde(flatten)]
    pub failure: Failure,
}

/// Summary of one pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
    /// Chunks embedded in this pass.
    pub processed_chunks: usize,
    /// Chunks whose stored vector was reused.
    pub kept_chunks: usize,
    pub deleted_chunks: usize,
    /// Chunks in the store after the pass.
    pub total_chunks: usize,
    pub files_scanned: usize,
    /// Files whose content hash was unchanged.
    pub files_skipped: usize,
    pub files_deleted: usize,
    pub edges_updated: usize,
    pub errors: Vec<FileFailure>,
    /// Merkle root over every indexed file.
    pub root_hash: String,
}

/// Progress notifications emitted during a pass.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexEvent {
    Started { files: usize, deletions: usize },
    FileIndexed { path: String, embedded: usize, kept: usize, deleted: usize },
    FileSkipped { path: String },
    FileFailed { path: String, failure: Failure },
    FileRemoved { path: String, chunks: usize },
    GraphLinked { updated: usize },
    Finished(IndexReport),
}

/// Result of processing one file.
enum FileOutcome {
    Skipped,
    Indexed {
        embedded: usize,
        kept: usize,
        /// Body hashes of chunks that left the file.
        orphaned: Vec<String>,
    },
}

/// Runs indexing passes against a store.
#[derive(Clone)]
pub struct Indexer {
    root: PathBuf,
    data_dir: PathBuf,
    store: Arc<IndexStore>,
    bodies: Arc<ChunkBodyStore>,
    embedder: Arc<dyn Embedder>,
    walk: WalkOptions,
    workers: usize,
}

impl Indexer {
    pub fn new(
        root: &Path,
        data_dir: &Path,
        store: Arc<IndexStore>,
        bodies: Arc<ChunkBodyStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            data_dir: data_dir.to_path_buf(),
            store,
            bodies,
            embedder,
            walk: WalkOptions::default(),
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_walk_options(mut self, walk: WalkOptions) -> Self {
        self.walk = walk;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Run one pass.
    ///
    /// Per-file failures are collected in [`IndexReport::errors`]; only
    /// failures that affect the whole pass are returned as `Err`.
    ///
    /// # Errors
    ///
    /// - [`CodescopeError::FileNotFound`] if the root does not exist
    /// - [`CodescopeError::Database`] if the store cannot be read or relinked
    /// - [`CodescopeError::Io`] if the codemap or `merkle.json` cannot be written
    pub async fn run(
        &self,
        request: IndexRequest,
        events: Option<UnboundedSender<IndexEvent>>,
    ) -> Result<IndexReport, CodescopeError> {
        let (files, deletions) = self.plan(&request)?;
        info!(
            root = %self.root.display(),
            full = request.is_full(),
            files = files.len(),
            deletions = deletions.len(),
            "starting index pass"
        );
        emit(
            &events,
            IndexEvent::Started {
                files: files.len(),
                deletions: deletions.len(),
            },
        );

        let mut report = IndexReport {
            files_scanned: files.len(),
            ..IndexReport::default()
        };
        let mut orphaned: Vec<String> = Vec::new();
        let mut changed = false;

        for path in deletions {
            let removed = self.store.remove_file(&path)?;
            report.files_deleted += 1;
            report.deleted_chunks += removed.len();
            changed = true;
            debug!(file = %path, chunks = removed.len(), "removed file");
            emit(
                &events,
                IndexEvent::FileRemoved {
                    path,
                    chunks: removed.len(),
                },
            );
            orphaned.extend(removed.into_iter().map(|key| key.content_hash));
        }

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        for file in files {
            let permit = semaphore.clone().acquire_owned().await.map_err(|e| {
                CodescopeError::Processing {
                    path: file.path.clone(),
                    message: e.to_string(),
                }
            })?;
            let job = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let path = file.rel_path();
                let outcome = job.process(file).await;
                (path, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (path, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    warn!(error = %e, "indexing task failed");
                    let failure = CodescopeError::Processing {
                        path: PathBuf::new(),
                        message: e.to_string(),
                    }
                    .to_failure();
                    report.errors.push(FileFailure {
                        path: String::new(),
                        failure,
                    });
                    continue;
                }
            };

            match outcome {
                Ok(FileOutcome::Skipped) => {
                    report.files_skipped += 1;
                    emit(&events, IndexEvent::FileSkipped { path });
                }
                Ok(FileOutcome::Indexed {
                    embedded,
                    kept,
                    orphaned: gone,
                }) => {
                    report.processed_chunks += embedded;
                    report.kept_chunks += kept;
                    report.deleted_chunks += gone.len();
                    changed = true;
                    emit(
                        &events,
                        IndexEvent::FileIndexed {
                            path,
                            embedded,
                            kept,
                            deleted: gone.len(),
                        },
                    );
                    orphaned.extend(gone);
                }
                Err(e) => {
                    warn!(file = %path, error = %e, "failed to index file");
                    let failure = CodescopeError::Processing {
                        path: PathBuf::from(&path),
                        message: e.to_string(),
                    }
                    .to_failure();
                    emit(
                        &events,
                        IndexEvent::FileFailed {
                            path: path.clone(),
                            failure: failure.clone(),
                        },
                    );
                    report.errors.push(FileFailure { path, failure });
                }
            }
        }
        report.errors.sort_by(|a, b| a.path.cmp(&b.path));

        if changed {
            let graph = CallGraph::build(&self.store.call_sites()?);
            report.edges_updated = self.store.update_edges(&graph.edges())?;
            debug!(
                nodes = graph.node_count(),
                edges = graph.edge_count(),
                updated = report.edges_updated,
                "relinked call graph"
            );
            emit(
                &events,
                IndexEvent::GraphLinked {
                    updated: report.edges_updated,
                },
            );
        }

        self.prune_bodies(orphaned)?;
        self.store.mark_indexed()?;

        Codemap::from_store(&self.store)?.save(&self.root)?;
        let merkle = MerkleTree::from_entries(self.store.file_entries()?);
        merkle.save(&self.data_dir)?;
        report.root_hash = merkle.root_hash();
        report.total_chunks = self.store.stats()?.total_chunks;

        info!(
            embedded = report.processed_chunks,
            kept = report.kept_chunks,
            deleted = report.deleted_chunks,
            skipped = report.files_skipped,
            errors = report.errors.len(),
            total = report.total_chunks,
            "index pass finished"
        );
        emit(&events, IndexEvent::Finished(report.clone()));
        Ok(report)
    }

    /// Resolve the request into files to process and stored paths to remove.
    fn plan(&self, request: &IndexRequest) -> Result<(Vec<SourceFile>, Vec<String>), CodescopeError> {
        if request.is_full() {
            let files = walk_repo(&self.root, &self.walk)?;
            let present: HashSet<String> = files.iter().map(SourceFile::rel_path).collect();
            let deletions = self
                .store
                .indexed_files()?
                .into_iter()
                .filter(|path| !present.contains(path))
                .collect();
            return Ok((files, deletions));
        }

        let mut files = Vec::new();
        let mut loaded: HashSet<String> = HashSet::new();
        let mut deletions: BTreeSet<String> = BTreeSet::new();

        let changed: BTreeSet<PathBuf> = request
            .changed
            .iter()
            .flatten()
            .map(|p| self.relativize(p))
            .collect();
        for relative in changed {
            let rel = normalize_path(&relative);
            match read_source(&self.root, &relative, &self.walk) {
                Some(file) => {
                    loaded.insert(rel);
                    files.push(file);
                }
                // Gone, excluded, or no longer parseable.
                None => {
                    if self.store.file_entry(&rel)?.is_some() {
                        deletions.insert(rel);
                    }
                }
            }
        }

        for path in request.deleted.iter().flatten() {
            let rel = normalize_path(&self.relativize(path));
            if loaded.contains(&rel) {
                continue;
            }
            if self.store.file_entry(&rel)?.is_some() {
                deletions.insert(rel);
            }
        }

        Ok((files, deletions.into_iter().collect()))
    }

    fn relativize(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    async fn process(&self, file: SourceFile) -> Result<FileOutcome, CodescopeError> {
        let path = file.rel_path();
        let provider = self.embedder.provider().to_string();
        let dimensions = self.embedder.dimensions();

        if let Some(entry) = self.store.file_entry(&path)? {
            if entry.file_hash == content_hash(&file.content)
                && !self.store.has_foreign_vectors(&path, &provider, dimensions)?
            {
                return Ok(FileOutcome::Skipped);
            }
        }

        let chunks = chunk_file(&file)?;
        let stored = self.store.stored_chunk_keys(&path)?;
        let diff = diff_chunks(&stored, &chunks, &provider, dimensions);

        let texts: Vec<String> = diff
            .embed
            .iter()
            .map(|&i| chunks[i].embedding_text())
            .collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder
                .embed_batch(&texts, InputKind::Document)
                .await?
        };
        if vectors.len() != texts.len() {
            return Err(CodescopeError::Embedding(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        let mut embedded = Vec::with_capacity(vectors.len());
        for (&i, vector) in diff.embed.iter().zip(vectors) {
            let chunk = chunks[i].clone();
            if vector.len() != dimensions {
                return Err(CodescopeError::Embedding(format!(
                    "expected {dimensions} dimensions for {}, got {}",
                    chunk.id,
                    vector.len()
                )));
            }
            let encrypted = self
                .bodies
                .write(&chunk.content_hash, chunk.content.as_bytes())?;
            embedded.push(EmbeddedChunk {
                chunk,
                vector,
                encrypted,
            });
        }

        let kept: Vec<Chunk> = diff.keep.iter().map(|&i| chunks[i].clone()).collect();
        for chunk in &kept {
            if !self.bodies.exists(&chunk.content_hash) {
                self.bodies
                    .write(&chunk.content_hash, chunk.content.as_bytes())?;
            }
        }

        let commit = FileCommit {
            entry: FileEntry::new(&path, &file.content, &chunks),
            provider,
            dimensions,
            embedded,
            kept,
            deleted: diff.delete.iter().map(|key| key.id.clone()).collect(),
            lexical_bodies: !self.bodies.seals(),
        };
        self.store.commit_file(&commit)?;

        Ok(FileOutcome::Indexed {
            embedded: commit.embedded.len(),
            kept: commit.kept.len(),
            orphaned: diff.delete.into_iter().map(|key| key.content_hash).collect(),
        })
    }

    /// Delete bodies no stored chunk references any more.
    fn prune_bodies(&self, hashes: Vec<String>) -> Result<(), CodescopeError> {
        let unique: BTreeSet<String> = hashes.into_iter().collect();
        let mut pruned = 0usize;
        for hash in unique {
            if !self.store.hash_in_use(&hash)? {
                self.bodies.remove(&hash)?;
                pruned += 1;
            }
        }
        if pruned > 0 {
            debug!(pruned, "pruned chunk bodies");
        }
        Ok(())
    }
}

fn emit(events: &Option<UnboundedSender<IndexEvent>>, event: IndexEvent) {
    if let Some(tx) = events {
        // A dropped receiver only means nobody is listening.
        let _ = tx.send(event);
    }
}

//! SQLite storage for chunks, file hashes, embeddings and learning state.
//!
//! Vectors are stored as little-endian `f32` BLOBs and compared in Rust.
//! Lexical search uses a standalone FTS5 table (see [`crate::lexical`]).
//! The connection sits behind a mutex; every multi-statement write runs in
//! its own transaction.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use codescope_core::{scoring, ChunkType, CodescopeError, ScopeMatcher};
use codescope_syntax::CallSite;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chunker::Chunk;
use crate::lexical;
use crate::merkle::{FileEntry, StoredChunkKey};

/// Metadata key holding the RFC 3339 time of the last completed pass.
pub const LAST_INDEXED_KEY: &str = "last_indexed_at";

/// File name of the database inside the data directory.
pub const DB_FILE_NAME: &str = "index.db";

const CHUNK_COLUMNS: &str = "id, file_path, symbol, language, chunk_type, content_hash, \
     start_line, end_line, signature, tags, intent, description, call_names, call_targets, \
     callers, provider, dimensions, embedding, path_weight, success_rate, last_used_at, encrypted";

/// A stored chunk with its embedding and learning state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub id: String,
    pub file: String,
    pub symbol: String,
    pub language: String,
    pub chunk_type: ChunkType,
    pub content_hash: String,
    pub start_line: u32,
    pub end_line: u32,
    pub signature: String,
    pub tags: Vec<String>,
    pub intent: Option<String>,
    pub description: Option<String>,
    pub call_names: Vec<String>,
    pub call_targets: Vec<String>,
    pub callers: Vec<String>,
    pub provider: String,
    pub dimensions: usize,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub path_weight: f64,
    pub success_rate: f64,
    pub last_used_at: Option<String>,
    pub encrypted: bool,
}

/// A learned query → chunk mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentionRecord {
    pub normalized_query: String,
    pub original_query: String,
    pub target_chunk_id: String,
    pub confidence: f64,
    pub usage_count: u64,
    pub last_used: String,
}

/// A generalized query template and how often it was seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPattern {
    pub pattern: String,
    pub frequency: u64,
    pub last_seen: String,
}

/// Store statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_chunks: usize,
    pub total_files: usize,
    pub index_size_bytes: u64,
}

/// A chunk that was freshly embedded in this pass.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    /// Whether the body store sealed this chunk's body.
    pub encrypted: bool,
}

/// Everything written for one file, committed atomically.
#[derive(Debug, Clone)]
pub struct FileCommit {
    pub entry: FileEntry,
    pub provider: String,
    pub dimensions: usize,
    pub embedded: Vec<EmbeddedChunk>,
    /// Chunks whose vector is reused; positions and doc metadata are refreshed.
    pub kept: Vec<Chunk>,
    /// Ids of chunks that disappeared from the file.
    pub deleted: Vec<String>,
    /// Whether chunk bodies go into the lexical index.
    pub lexical_bodies: bool,
}

/// SQLite-backed index.
///
/// # Examples
///
/// ```
/// use codescope_index::store::IndexStore;
///
/// let store = IndexStore::in_memory().unwrap();
/// assert_eq!(store.stats().unwrap().total_chunks, 0);
/// assert!(store.last_indexed_at().unwrap().is_none());
/// ```
pub struct IndexStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl IndexStore {
    /// Open or create an index database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, CodescopeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CodescopeError::Database(format!("failed to create index directory: {e}"))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| CodescopeError::Database(format!("failed to open database: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory index (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] if schema creation fails.
    pub fn in_memory() -> Result<Self, CodescopeError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            CodescopeError::Database(format!("failed to create in-memory database: {e}"))
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>, CodescopeError> {
        self.conn
            .lock()
            .map_err(|_| CodescopeError::Database("index connection lock poisoned".into()))
    }

    fn init_schema(&self) -> Result<(), CodescopeError> {
        self.conn()?
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS metadata (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS files (
                    path TEXT PRIMARY KEY,
                    file_hash TEXT NOT NULL,
                    chunk_hashes TEXT NOT NULL,
                    indexed_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS chunks (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    file_path TEXT NOT NULL,
                    symbol TEXT NOT NULL,
                    language TEXT NOT NULL,
                    chunk_type TEXT NOT NULL,
                    content_hash TEXT NOT NULL,
                    start_line INTEGER NOT NULL,
                    end_line INTEGER NOT NULL,
                    signature TEXT NOT NULL,
                    tags TEXT NOT NULL DEFAULT '[]',
                    intent TEXT,
                    description TEXT,
                    call_names TEXT NOT NULL DEFAULT '[]',
                    call_targets TEXT NOT NULL DEFAULT '[]',
                    callers TEXT NOT NULL DEFAULT '[]',
                    provider TEXT NOT NULL,
                    dimensions INTEGER NOT NULL,
                    embedding BLOB NOT NULL,
                    path_weight REAL NOT NULL DEFAULT 1.0,
                    success_rate REAL NOT NULL DEFAULT 0.0,
                    last_used_at TEXT,
                    encrypted INTEGER NOT NULL DEFAULT 0
                );

                CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_path);
                CREATE INDEX IF NOT EXISTS idx_chunks_provider ON chunks(provider, dimensions);
                CREATE INDEX IF NOT EXISTS idx_chunks_hash ON chunks(content_hash);

                CREATE TABLE IF NOT EXISTS lexical_docs (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    chunk_id TEXT NOT NULL UNIQUE,
                    text TEXT NOT NULL
                );

                CREATE VIRTUAL TABLE IF NOT EXISTS lexical_fts USING fts5(
                    text,
                    content='lexical_docs', content_rowid='seq'
                );

                -- Triggers to keep FTS in sync
                CREATE TRIGGER IF NOT EXISTS lexical_docs_ai AFTER INSERT ON lexical_docs BEGIN
                    INSERT INTO lexical_fts(rowid, text) VALUES (new.seq, new.text);
                END;

                CREATE TRIGGER IF NOT EXISTS lexical_docs_ad AFTER DELETE ON lexical_docs BEGIN
                    INSERT INTO lexical_fts(lexical_fts, rowid, text) VALUES ('delete', old.seq, old.text);
                END;

                CREATE TRIGGER IF NOT EXISTS lexical_docs_au AFTER UPDATE ON lexical_docs BEGIN
                    INSERT INTO lexical_fts(lexical_fts, rowid, text) VALUES ('delete', old.seq, old.text);
                    INSERT INTO lexical_fts(rowid, text) VALUES (new.seq, new.text);
                END;

                CREATE TABLE IF NOT EXISTS intentions (
                    normalized_query TEXT PRIMARY KEY,
                    original_query TEXT NOT NULL,
                    target_chunk_id TEXT NOT NULL,
                    confidence REAL NOT NULL,
                    usage_count INTEGER NOT NULL DEFAULT 0,
                    last_used TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS query_patterns (
                    pattern TEXT PRIMARY KEY,
                    frequency INTEGER NOT NULL DEFAULT 0,
                    last_seen TEXT NOT NULL
                );
                ",
            )
            .map_err(|e| CodescopeError::Database(format!("failed to create schema: {e}")))?;

        self.migrate_legacy_fts()
    }

    /// Move text out of the pre-`lexical_docs` FTS table, which keyed rows by
    /// an unindexed id column.
    fn migrate_legacy_fts(&self) -> Result<(), CodescopeError> {
        let conn = self.conn()?;
        let legacy = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'chunks_fts'",
                [],
                |_| Ok(()),
            )
            .optional()
            .map_err(|e| db_error("failed to inspect schema", e))?
            .is_some();
        if !legacy {
            return Ok(());
        }

        conn.execute_batch(
            "INSERT OR IGNORE INTO lexical_docs (chunk_id, text)
                 SELECT chunk_id, text FROM chunks_fts;
             DROP TABLE chunks_fts;",
        )
        .map_err(|e| db_error("failed to migrate keyword index", e))?;
        info!("migrated keyword index to lexical_docs");
        Ok(())
    }

    /// Read a metadata value.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on query failure.
    pub fn get_metadata(&self, key: &str) -> Result<Option<String>, CodescopeError> {
        let result = self.conn()?.query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            params![key],
            |row| row.get(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CodescopeError::Database(format!(
                "failed to get metadata '{key}': {e}"
            ))),
        }
    }

    /// Write a metadata value.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on write failure.
    pub fn set_metadata(&self, key: &str, value: &str) -> Result<(), CodescopeError> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(|e| CodescopeError::Database(format!("failed to set metadata '{key}': {e}")))?;
        Ok(())
    }

    /// Time of the last completed indexing pass; `None` if never indexed.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on query failure.
    pub fn last_indexed_at(&self) -> Result<Option<String>, CodescopeError> {
        self.get_metadata(LAST_INDEXED_KEY)
    }

    /// Stamp a completed pass.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on write failure.
    pub fn mark_indexed(&self) -> Result<String, CodescopeError> {
        let now = timestamp();
        self.set_metadata(LAST_INDEXED_KEY, &now)?;
        Ok(now)
    }

    /// Fail with [`CodescopeError::StoreNotFound`] unless a pass completed.
    ///
    /// # Errors
    ///
    /// See above; also [`CodescopeError::Database`] on query failure.
    pub fn ensure_indexed(&self) -> Result<(), CodescopeError> {
        if self.last_indexed_at()?.is_none() {
            let location = self.path.clone().unwrap_or_else(|| PathBuf::from(":memory:"));
            return Err(CodescopeError::StoreNotFound(location));
        }
        Ok(())
    }

    /// Stored Merkle entry for a file.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on query failure.
    pub fn file_entry(&self, path: &str) -> Result<Option<FileEntry>, CodescopeError> {
        let row = self
            .conn()?
            .query_row(
                "SELECT file_hash, chunk_hashes FROM files WHERE path = ?1",
                params![path],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(|e| db_error("failed to read file entry", e))?;

        row.map(|(file_hash, hashes)| -> Result<FileEntry, CodescopeError> {
            Ok(FileEntry {
                path: path.to_string(),
                file_hash,
                chunk_hashes: serde_json::from_str(&hashes)?,
            })
        })
        .transpose()
    }

    /// All stored Merkle entries, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on query failure.
    pub fn file_entries(&self) -> Result<Vec<FileEntry>, CodescopeError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT path, file_hash, chunk_hashes FROM files ORDER BY path")
            .map_err(|e| db_error("failed to prepare file query", e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| db_error("failed to list files", e))?;

        let mut entries = Vec::new();
        for row in rows {
            let (path, file_hash, hashes) = row.map_err(|e| db_error("failed to read row", e))?;
            entries.push(FileEntry {
                path,
                file_hash,
                chunk_hashes: serde_json::from_str(&hashes)?,
            });
        }
        Ok(entries)
    }

    /// Paths of all indexed files, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on query failure.
    pub fn indexed_files(&self) -> Result<Vec<String>, CodescopeError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT path FROM files ORDER BY path")
            .map_err(|e| db_error("failed to prepare query", e))?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| db_error("failed to list files", e))?;
        rows.collect::<Result<Vec<String>, _>>()
            .map_err(|e| db_error("failed to read row", e))
    }

    /// Identity of every chunk currently stored for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on query failure.
    pub fn stored_chunk_keys(&self, path: &str) -> Result<Vec<StoredChunkKey>, CodescopeError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, content_hash, provider, dimensions FROM chunks
                 WHERE file_path = ?1 ORDER BY seq",
            )
            .map_err(|e| db_error("failed to prepare query", e))?;
        let rows = stmt
            .query_map(params![path], |row| {
                Ok(StoredChunkKey {
                    id: row.get(0)?,
                    content_hash: row.get(1)?,
                    provider: row.get(2)?,
                    dimensions: row.get::<_, i64>(3)? as usize,
                })
            })
            .map_err(|e| db_error("failed to list chunks", e))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| db_error("failed to read row", e))
    }

    /// Whether any chunk of `path` was embedded by a different provider.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on query failure.
    pub fn has_foreign_vectors(
        &self,
        path: &str,
        provider: &str,
        dimensions: usize,
    ) -> Result<bool, CodescopeError> {
        let count: i64 = self
            .conn()?
            .query_row(
                "SELECT COUNT(*) FROM chunks WHERE file_path = ?1
                 AND (provider != ?2 OR dimensions != ?3)",
                params![path, provider, dimensions as i64],
                |row| row.get(0),
            )
            .map_err(|e| db_error("failed to count chunks", e))?;
        Ok(count > 0)
    }

    /// Apply one file's changes in a single transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on failure; nothing is written.
    pub fn commit_file(&self, commit: &FileCommit) -> Result<(), CodescopeError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| db_error("failed to begin transaction", e))?;

        for id in &commit.deleted {
            delete_chunk(&tx, id)?;
        }

        for embedded in &commit.embedded {
            let chunk = &embedded.chunk;
            tx.execute(
                "INSERT INTO chunks (id, file_path, symbol, language, chunk_type, content_hash,
                     start_line, end_line, signature, tags, intent, description, call_names,
                     provider, dimensions, embedding, encrypted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                 ON CONFLICT(id) DO UPDATE SET
                     file_path = excluded.file_path, symbol = excluded.symbol,
                     language = excluded.language, chunk_type = excluded.chunk_type,
                     content_hash = excluded.content_hash, start_line = excluded.start_line,
                     end_line = excluded.end_line, signature = excluded.signature,
                     tags = excluded.tags, intent = excluded.intent,
                     description = excluded.description, call_names = excluded.call_names,
                     provider = excluded.provider, dimensions = excluded.dimensions,
                     embedding = excluded.embedding, encrypted = excluded.encrypted",
                params![
                    chunk.id,
                    chunk.file,
                    chunk.symbol,
                    chunk.language,
                    chunk.chunk_type.to_string(),
                    chunk.content_hash,
                    chunk.start_line,
                    chunk.end_line,
                    chunk.signature,
                    serde_json::to_string(&chunk.tags)?,
                    chunk.intent,
                    chunk.description,
                    serde_json::to_string(&chunk.call_names)?,
                    commit.provider,
                    commit.dimensions as i64,
                    floats_to_bytes(&embedded.vector),
                    embedded.encrypted,
                ],
            )
            .map_err(|e| db_error("failed to upsert chunk", e))?;
            lexical::index_with(&tx, &chunk.id, &chunk.lexical_text(commit.lexical_bodies))?;
        }

        for chunk in &commit.kept {
            tx.execute(
                "UPDATE chunks SET start_line = ?2, end_line = ?3, signature = ?4, tags = ?5,
                     intent = ?6, description = ?7, call_names = ?8
                 WHERE id = ?1",
                params![
                    chunk.id,
                    chunk.start_line,
                    chunk.end_line,
                    chunk.signature,
                    serde_json::to_string(&chunk.tags)?,
                    chunk.intent,
                    chunk.description,
                    serde_json::to_string(&chunk.call_names)?,
                ],
            )
            .map_err(|e| db_error("failed to refresh chunk", e))?;
            lexical::index_with(&tx, &chunk.id, &chunk.lexical_text(commit.lexical_bodies))?;
        }

        tx.execute(
            "INSERT OR REPLACE INTO files (path, file_hash, chunk_hashes, indexed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                commit.entry.path,
                commit.entry.file_hash,
                serde_json::to_string(&commit.entry.chunk_hashes)?,
                timestamp(),
            ],
        )
        .map_err(|e| db_error("failed to record file", e))?;

        tx.commit()
            .map_err(|e| db_error("failed to commit file", e))?;
        debug!(
            file = %commit.entry.path,
            embedded = commit.embedded.len(),
            kept = commit.kept.len(),
            deleted = commit.deleted.len(),
            "committed file"
        );
        Ok(())
    }

    /// Remove a file and all of its chunks; returns the removed chunks.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on failure.
    pub fn remove_file(&self, path: &str) -> Result<Vec<StoredChunkKey>, CodescopeError> {
        let removed = self.stored_chunk_keys(path)?;
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| db_error("failed to begin transaction", e))?;
        for key in &removed {
            delete_chunk(&tx, &key.id)?;
        }
        tx.execute("DELETE FROM files WHERE path = ?1", params![path])
            .map_err(|e| db_error("failed to remove file", e))?;
        tx.commit()
            .map_err(|e| db_error("failed to commit removal", e))?;
        Ok(removed)
    }

    /// Whether any stored chunk still references a body hash.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on query failure.
    pub fn hash_in_use(&self, content_hash: &str) -> Result<bool, CodescopeError> {
        let count: i64 = self
            .conn()?
            .query_row(
                "SELECT COUNT(*) FROM chunks WHERE content_hash = ?1",
                params![content_hash],
                |row| row.get(0),
            )
            .map_err(|e| db_error("failed to count chunks", e))?;
        Ok(count > 0)
    }

    /// Fetch one chunk by id.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on query failure.
    pub fn get_chunk(&self, id: &str) -> Result<Option<ChunkRecord>, CodescopeError> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE id = ?1"),
                params![id],
                RawChunk::from_row,
            )
            .optional()
            .map_err(|e| db_error("failed to read chunk", e))?;
        raw.map(RawChunk::into_record).transpose()
    }

    /// Whether a chunk id exists.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on query failure.
    pub fn chunk_exists(&self, id: &str) -> Result<bool, CodescopeError> {
        let conn = self.conn()?;
        chunk_exists_with(&conn, id)
    }

    /// Every stored chunk, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on query failure.
    pub fn all_chunks(&self) -> Result<Vec<ChunkRecord>, CodescopeError> {
        self.query_chunks(&format!("SELECT {CHUNK_COLUMNS} FROM chunks ORDER BY id"), &[])
    }

    /// Chunks embedded by `provider` at `dimensions` that pass `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on query failure.
    pub fn candidates(
        &self,
        provider: &str,
        dimensions: usize,
        scope: &ScopeMatcher,
    ) -> Result<Vec<ChunkRecord>, CodescopeError> {
        let dims = dimensions as i64;
        let records = self.query_chunks(
            &format!(
                "SELECT {CHUNK_COLUMNS} FROM chunks WHERE provider = ?1 AND dimensions = ?2
                 ORDER BY id"
            ),
            &[&provider as &dyn rusqlite::ToSql, &dims],
        )?;
        Ok(records
            .into_iter()
            .filter(|r| scope.matches(&r.file, &r.language, &r.tags))
            .collect())
    }

    fn query_chunks(
        &self,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<ChunkRecord>, CodescopeError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| db_error("failed to prepare chunk query", e))?;
        let rows = stmt
            .query_map(args, RawChunk::from_row)
            .map_err(|e| db_error("failed to query chunks", e))?;

        let mut records = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| db_error("failed to read chunk row", e))?;
            records.push(raw.into_record()?);
        }
        Ok(records)
    }

    /// `(provider, dimensions, chunk count)` for every provider in the index.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on query failure.
    pub fn provider_summary(&self) -> Result<Vec<(String, usize, usize)>, CodescopeError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT provider, dimensions, COUNT(*) FROM chunks
                 GROUP BY provider, dimensions ORDER BY provider, dimensions",
            )
            .map_err(|e| db_error("failed to prepare query", e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)? as usize,
                    row.get::<_, i64>(2)? as usize,
                ))
            })
            .map_err(|e| db_error("failed to summarize providers", e))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| db_error("failed to read row", e))
    }

    /// Every chunk as a call-graph node.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on query failure.
    pub fn call_sites(&self) -> Result<Vec<CallSite>, CodescopeError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, file_path, symbol, call_names FROM chunks ORDER BY id")
            .map_err(|e| db_error("failed to prepare query", e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(|e| db_error("failed to list call sites", e))?;

        let mut sites = Vec::new();
        for row in rows {
            let (id, file, symbol, calls) = row.map_err(|e| db_error("failed to read row", e))?;
            sites.push(CallSite {
                id,
                file,
                symbol,
                call_names: serde_json::from_str(&calls)?,
            });
        }
        Ok(sites)
    }

    /// Write graph edges, touching only rows whose lists changed.
    ///
    /// Returns the number of rows rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on failure.
    pub fn update_edges(
        &self,
        edges: &BTreeMap<String, (Vec<String>, Vec<String>)>,
    ) -> Result<usize, CodescopeError> {
        let mut conn = self.conn()?;
        let current: HashMap<String, (String, String)> = {
            let mut stmt = conn
                .prepare("SELECT id, call_targets, callers FROM chunks")
                .map_err(|e| db_error("failed to prepare query", e))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        (row.get::<_, String>(1)?, row.get::<_, String>(2)?),
                    ))
                })
                .map_err(|e| db_error("failed to read edges", e))?;
            rows.collect::<Result<_, _>>()
                .map_err(|e| db_error("failed to read row", e))?
        };

        let tx = conn
            .transaction()
            .map_err(|e| db_error("failed to begin transaction", e))?;
        let empty: &[String] = &[];
        let mut updated = 0;
        for (id, (stored_targets, stored_callers)) in &current {
            let (targets, callers) = edges
                .get(id)
                .map(|(t, c)| (t.as_slice(), c.as_slice()))
                .unwrap_or((empty, empty));
            let targets = serde_json::to_string(targets)?;
            let callers = serde_json::to_string(callers)?;
            if &targets != stored_targets || &callers != stored_callers {
                tx.execute(
                    "UPDATE chunks SET call_targets = ?2, callers = ?3 WHERE id = ?1",
                    params![id, targets, callers],
                )
                .map_err(|e| db_error("failed to update edges", e))?;
                updated += 1;
            }
        }
        tx.commit()
            .map_err(|e| db_error("failed to commit edges", e))?;
        Ok(updated)
    }

    /// Apply one round of success-rate feedback and stamp `last_used_at`.
    ///
    /// Returns the new success rate.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::ChunkNotFound`] for unknown ids.
    pub fn record_feedback(&self, id: &str, useful: bool) -> Result<f64, CodescopeError> {
        let conn = self.conn()?;
        let rate: Option<f64> = conn
            .query_row(
                "SELECT success_rate FROM chunks WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| db_error("failed to read success rate", e))?;
        let Some(rate) = rate else {
            return Err(CodescopeError::ChunkNotFound(id.to_string()));
        };

        let updated = scoring::update_success_rate(rate, useful);
        conn.execute(
            "UPDATE chunks SET success_rate = ?2, last_used_at = ?3 WHERE id = ?1",
            params![id, updated, timestamp()],
        )
        .map_err(|e| db_error("failed to record feedback", e))?;
        Ok(updated)
    }

    /// Look up an intention by normalized query.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on query failure.
    pub fn find_intention(&self, normalized: &str) -> Result<Option<IntentionRecord>, CodescopeError> {
        let conn = self.conn()?;
        find_intention_with(&conn, normalized)
    }

    /// Count a direct hit on an intention.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on failure.
    pub fn touch_intention(&self, normalized: &str) -> Result<(), CodescopeError> {
        self.conn()?
            .execute(
                "UPDATE intentions SET usage_count = usage_count + 1, last_used = ?2
                 WHERE normalized_query = ?1",
                params![normalized, timestamp()],
            )
            .map_err(|e| db_error("failed to update intention", e))?;
        Ok(())
    }

    /// Record that `normalized` led to `target` with `confidence`.
    ///
    /// Confidence never decreases. A different target replaces the stored one
    /// only when it is more confident or the stored target no longer exists.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on failure.
    pub fn upsert_intention(
        &self,
        normalized: &str,
        original: &str,
        target: &str,
        confidence: f64,
    ) -> Result<IntentionRecord, CodescopeError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| db_error("failed to begin transaction", e))?;
        let now = timestamp();

        let record = match find_intention_with(&tx, normalized)? {
            None => IntentionRecord {
                normalized_query: normalized.to_string(),
                original_query: original.to_string(),
                target_chunk_id: target.to_string(),
                confidence,
                usage_count: 1,
                last_used: now,
            },
            Some(existing) => {
                let stale = !chunk_exists_with(&tx, &existing.target_chunk_id)?;
                let (target_chunk_id, confidence) = if existing.target_chunk_id == target {
                    (existing.target_chunk_id, existing.confidence.max(confidence))
                } else if stale || confidence > existing.confidence {
                    (target.to_string(), confidence)
                } else {
                    (existing.target_chunk_id, existing.confidence)
                };
                IntentionRecord {
                    normalized_query: existing.normalized_query,
                    original_query: original.to_string(),
                    target_chunk_id,
                    confidence,
                    usage_count: existing.usage_count + 1,
                    last_used: now,
                }
            }
        };

        tx.execute(
            "INSERT OR REPLACE INTO intentions
                 (normalized_query, original_query, target_chunk_id, confidence, usage_count, last_used)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.normalized_query,
                record.original_query,
                record.target_chunk_id,
                record.confidence,
                record.usage_count as i64,
                record.last_used,
            ],
        )
        .map_err(|e| db_error("failed to write intention", e))?;
        tx.commit()
            .map_err(|e| db_error("failed to commit intention", e))?;
        Ok(record)
    }

    /// Normalized queries learned for each target chunk, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on query failure.
    pub fn intention_synonyms(&self) -> Result<HashMap<String, Vec<String>>, CodescopeError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT target_chunk_id, normalized_query FROM intentions
                 ORDER BY target_chunk_id, normalized_query",
            )
            .map_err(|e| db_error("failed to prepare query", e))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| db_error("failed to list intentions", e))?;

        let mut out: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            let (target, query) = row.map_err(|e| db_error("failed to read row", e))?;
            out.entry(target).or_default().push(query);
        }
        Ok(out)
    }

    /// Count one occurrence of a query pattern.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on failure.
    pub fn bump_pattern(&self, pattern: &str) -> Result<(), CodescopeError> {
        self.conn()?
            .execute(
                "INSERT INTO query_patterns (pattern, frequency, last_seen) VALUES (?1, 1, ?2)
                 ON CONFLICT(pattern) DO UPDATE SET
                     frequency = frequency + 1, last_seen = excluded.last_seen",
                params![pattern, timestamp()],
            )
            .map_err(|e| db_error("failed to record query pattern", e))?;
        Ok(())
    }

    /// Most frequent query patterns.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on query failure.
    pub fn top_patterns(&self, limit: usize) -> Result<Vec<QueryPattern>, CodescopeError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT pattern, frequency, last_seen FROM query_patterns
                 ORDER BY frequency DESC, last_seen DESC, pattern ASC LIMIT ?1",
            )
            .map_err(|e| db_error("failed to prepare query", e))?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(QueryPattern {
                    pattern: row.get(0)?,
                    frequency: row.get::<_, i64>(1)? as u64,
                    last_seen: row.get(2)?,
                })
            })
            .map_err(|e| db_error("failed to list query patterns", e))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| db_error("failed to read row", e))
    }

    /// Get index statistics.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] on query failure.
    pub fn stats(&self) -> Result<StoreStats, CodescopeError> {
        let conn = self.conn()?;
        let count = |sql: &str| -> Result<i64, CodescopeError> {
            conn.query_row(sql, [], |row| row.get(0))
                .map_err(|e| db_error("failed to read stats", e))
        };
        let total_chunks = count("SELECT COUNT(*) FROM chunks")?;
        let total_files = count("SELECT COUNT(*) FROM files")?;
        let page_count = count("PRAGMA page_count")?;
        let page_size = count("PRAGMA page_size")?;

        Ok(StoreStats {
            total_chunks: total_chunks as usize,
            total_files: total_files as usize,
            index_size_bytes: (page_count * page_size) as u64,
        })
    }
}

/// Current time as RFC 3339.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub(crate) fn db_error(context: &str, e: rusqlite::Error) -> CodescopeError {
    CodescopeError::Database(format!("{context}: {e}"))
}

fn delete_chunk(conn: &Connection, id: &str) -> Result<(), CodescopeError> {
    conn.execute("DELETE FROM chunks WHERE id = ?1", params![id])
        .map_err(|e| db_error("failed to delete chunk", e))?;
    lexical::remove_with(conn, id)
}

fn chunk_exists_with(conn: &Connection, id: &str) -> Result<bool, CodescopeError> {
    let found = conn
        .query_row("SELECT 1 FROM chunks WHERE id = ?1", params![id], |_| Ok(()))
        .optional()
        .map_err(|e| db_error("failed to look up chunk", e))?;
    Ok(found.is_some())
}

fn find_intention_with(
    conn: &Connection,
    normalized: &str,
) -> Result<Option<IntentionRecord>, CodescopeError> {
    conn.query_row(
        "SELECT normalized_query, original_query, target_chunk_id, confidence, usage_count, last_used
         FROM intentions WHERE normalized_query = ?1",
        params![normalized],
        |row| {
            Ok(IntentionRecord {
                normalized_query: row.get(0)?,
                original_query: row.get(1)?,
                target_chunk_id: row.get(2)?,
                confidence: row.get(3)?,
                usage_count: row.get::<_, i64>(4)? as u64,
                last_used: row.get(5)?,
            })
        },
    )
    .optional()
    .map_err(|e| db_error("failed to read intention", e))
}

/// Column values before JSON decoding, so decode errors surface as
/// [`CodescopeError`] rather than inside the row closure.
struct RawChunk {
    id: String,
    file: String,
    symbol: String,
    language: String,
    chunk_type: String,
    content_hash: String,
    start_line: u32,
    end_line: u32,
    signature: String,
    tags: String,
    intent: Option<String>,
    description: Option<String>,
    call_names: String,
    call_targets: String,
    callers: String,
    provider: String,
    dimensions: i64,
    embedding: Vec<u8>,
    path_weight: f64,
    success_rate: f64,
    last_used_at: Option<String>,
    encrypted: bool,
}

impl RawChunk {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            file: row.get(1)?,
            symbol: row.get(2)?,
            language: row.get(3)?,
            chunk_type: row.get(4)?,
            content_hash: row.get(5)?,
            start_line: row.get(6)?,
            end_line: row.get(7)?,
            signature: row.get(8)?,
            tags: row.get(9)?,
            intent: row.get(10)?,
            description: row.get(11)?,
            call_names: row.get(12)?,
            call_targets: row.get(13)?,
            callers: row.get(14)?,
            provider: row.get(15)?,
            dimensions: row.get(16)?,
            embedding: row.get(17)?,
            path_weight: row.get(18)?,
            success_rate: row.get(19)?,
            last_used_at: row.get(20)?,
            encrypted: row.get(21)?,
        })
    }

    fn into_record(self) -> Result<ChunkRecord, CodescopeError> {
        let chunk_type = self
            .chunk_type
            .parse()
            .map_err(CodescopeError::Database)?;
        Ok(ChunkRecord {
            id: self.id,
            file: self.file,
            symbol: self.symbol,
            language: self.language,
            chunk_type,
            content_hash: self.content_hash,
            start_line: self.start_line,
            end_line: self.end_line,
            signature: self.signature,
            tags: serde_json::from_str(&self.tags)?,
            intent: self.intent,
            description: self.description,
            call_names: serde_json::from_str(&self.call_names)?,
            call_targets: serde_json::from_str(&self.call_targets)?,
            callers: serde_json::from_str(&self.callers)?,
            provider: self.provider,
            dimensions: self.dimensions as usize,
            embedding: bytes_to_floats(&self.embedding),
            path_weight: self.path_weight,
            success_rate: self.success_rate,
            last_used_at: self.last_used_at,
            encrypted: self.encrypted,
        })
    }
}

fn floats_to_bytes(floats: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(floats.len() * 4);
    for f in floats {
        bytes.extend_from_slice(&f.to_le_bytes());
    }
    bytes
}

fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    let mut floats = Vec::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        let arr: [u8; 4] = [chunk[0], chunk[1], chunk[2], chunk[3]];
        floats.push(f32::from_le_bytes(arr));
    }
    floats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::{chunk_id, content_hash};
    use codescope_core::{CodescopeConfig, ScopeFilter, ScopeOverrides};

    fn chunk(file: &str, symbol: &str, body: &str) -> Chunk {
        let hash = content_hash(body);
        Chunk {
            id: chunk_id(file, symbol, &hash),
            file: file.into(),
            symbol: symbol.into(),
            language: "rust".into(),
            chunk_type: ChunkType::Function,
            content_hash: hash,
            start_line: 1,
            end_line: 3,
            signature: format!("fn {symbol}()"),
            tags: vec!["rust".into()],
            intent: None,
            description: None,
            call_names: vec![],
            content: body.into(),
        }
    }

    fn commit(store: &IndexStore, file: &str, chunks: Vec<Chunk>, deleted: Vec<String>) {
        let entry = FileEntry {
            path: file.into(),
            file_hash: format!("file_{file}"),
            chunk_hashes: chunks.iter().map(|c| c.content_hash.clone()).collect(),
        };
        let embedded = chunks
            .into_iter()
            .map(|chunk| EmbeddedChunk {
                chunk,
                vector: vec![1.0, 0.0, 0.0],
                encrypted: false,
            })
            .collect();
        store
            .commit_file(&FileCommit {
                entry,
                provider: "test".into(),
                dimensions: 3,
                embedded,
                kept: vec![],
                deleted,
                lexical_bodies: true,
            })
            .unwrap();
    }

    fn unrestricted() -> ScopeMatcher {
        let filter = ScopeFilter::resolve(&CodescopeConfig::default(), None, &ScopeOverrides::default());
        ScopeMatcher::new(&filter).unwrap()
    }

    #[test]
    fn commit_and_read_back() {
        let store = IndexStore::in_memory().unwrap();
        let c = chunk("src/a.rs", "alpha", "fn alpha() {}");
        commit(&store, "src/a.rs", vec![c.clone()], vec![]);

        let record = store.get_chunk(&c.id).unwrap().unwrap();
        assert_eq!(record.symbol, "alpha");
        assert_eq!(record.embedding, vec![1.0, 0.0, 0.0]);
        assert_eq!(record.path_weight, 1.0);
        assert_eq!(record.success_rate, 0.0);
        assert!(record.last_used_at.is_none());

        let entry = store.file_entry("src/a.rs").unwrap().unwrap();
        assert_eq!(entry.chunk_hashes, vec![c.content_hash.clone()]);
        assert_eq!(store.stats().unwrap().total_chunks, 1);
    }

    #[test]
    fn deleted_chunks_leave_store() {
        let store = IndexStore::in_memory().unwrap();
        let a = chunk("src/a.rs", "alpha", "fn alpha() {}");
        commit(&store, "src/a.rs", vec![a.clone()], vec![]);
        let b = chunk("src/a.rs", "beta", "fn beta() {}");
        commit(&store, "src/a.rs", vec![b.clone()], vec![a.id.clone()]);

        assert!(!store.chunk_exists(&a.id).unwrap());
        assert!(store.chunk_exists(&b.id).unwrap());
        assert!(!store.hash_in_use(&a.content_hash).unwrap());
    }

    #[test]
    fn remove_file_cleans_up() {
        let store = IndexStore::in_memory().unwrap();
        let a = chunk("src/a.rs", "alpha", "fn alpha() {}");
        commit(&store, "src/a.rs", vec![a.clone()], vec![]);

        let removed = store.remove_file("src/a.rs").unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, a.id);
        assert!(store.file_entry("src/a.rs").unwrap().is_none());
        assert_eq!(store.stats().unwrap().total_chunks, 0);
    }

    #[test]
    fn candidates_are_scoped_to_provider() {
        let store = IndexStore::in_memory().unwrap();
        commit(&store, "src/a.rs", vec![chunk("src/a.rs", "alpha", "fn alpha() {}")], vec![]);

        assert_eq!(store.candidates("test", 3, &unrestricted()).unwrap().len(), 1);
        assert!(store.candidates("test", 4, &unrestricted()).unwrap().is_empty());
        assert!(store.candidates("other", 3, &unrestricted()).unwrap().is_empty());
        assert_eq!(
            store.provider_summary().unwrap(),
            vec![("test".to_string(), 3, 1)]
        );
    }

    #[test]
    fn edges_only_rewrite_changed_rows() {
        let store = IndexStore::in_memory().unwrap();
        let a = chunk("src/a.rs", "alpha", "fn alpha() {}");
        let b = chunk("src/a.rs", "beta", "fn beta() {}");
        commit(&store, "src/a.rs", vec![a.clone(), b.clone()], vec![]);

        let mut edges = BTreeMap::new();
        edges.insert(a.id.clone(), (vec![b.id.clone()], vec![]));
        edges.insert(b.id.clone(), (vec![], vec![a.id.clone()]));
        assert_eq!(store.update_edges(&edges).unwrap(), 2);
        assert_eq!(store.update_edges(&edges).unwrap(), 0);

        let record = store.get_chunk(&b.id).unwrap().unwrap();
        assert_eq!(record.callers, vec![a.id.clone()]);
    }

    #[test]
    fn feedback_moves_success_rate() {
        let store = IndexStore::in_memory().unwrap();
        let a = chunk("src/a.rs", "alpha", "fn alpha() {}");
        commit(&store, "src/a.rs", vec![a.clone()], vec![]);

        let rate = store.record_feedback(&a.id, true).unwrap();
        assert!((rate - 0.3).abs() < 1e-9);
        let record = store.get_chunk(&a.id).unwrap().unwrap();
        assert!(record.last_used_at.is_some());

        let err = store.record_feedback("missing", true).unwrap_err();
        assert!(matches!(err, CodescopeError::ChunkNotFound(_)));
    }

    #[test]
    fn intention_confidence_is_monotonic() {
        let store = IndexStore::in_memory().unwrap();
        let a = chunk("src/a.rs", "alpha", "fn alpha() {}");
        let b = chunk("src/a.rs", "beta", "fn beta() {}");
        commit(&store, "src/a.rs", vec![a.clone(), b.clone()], vec![]);

        store.upsert_intention("find alpha", "Find alpha", &a.id, 0.9).unwrap();
        let lower = store.upsert_intention("find alpha", "find alpha", &a.id, 0.85).unwrap();
        assert_eq!(lower.confidence, 0.9);
        assert_eq!(lower.usage_count, 2);

        let other = store.upsert_intention("find alpha", "find alpha", &b.id, 0.88).unwrap();
        assert_eq!(other.target_chunk_id, a.id);

        let better = store.upsert_intention("find alpha", "find alpha", &b.id, 0.95).unwrap();
        assert_eq!(better.target_chunk_id, b.id);
        assert_eq!(better.confidence, 0.95);

        store.touch_intention("find alpha").unwrap();
        assert_eq!(store.find_intention("find alpha").unwrap().unwrap().usage_count, 5);
    }

    #[test]
    fn stale_intention_target_is_replaced() {
        let store = IndexStore::in_memory().unwrap();
        let b = chunk("src/b.rs", "beta", "fn beta() {}");
        commit(&store, "src/b.rs", vec![b.clone()], vec![]);

        store.upsert_intention("q", "q", "gone:id:00000000", 0.99).unwrap();
        let record = store.upsert_intention("q", "q", &b.id, 0.81).unwrap();
        assert_eq!(record.target_chunk_id, b.id);
        assert_eq!(record.confidence, 0.81);
    }

    #[test]
    fn patterns_are_counted() {
        let store = IndexStore::in_memory().unwrap();
        store.bump_pattern("find {entity}").unwrap();
        store.bump_pattern("find {entity}").unwrap();
        store.bump_pattern("delete {entity}").unwrap();

        let top = store.top_patterns(5).unwrap();
        assert_eq!(top[0].pattern, "find {entity}");
        assert_eq!(top[0].frequency, 2);
        assert_eq!(store.top_patterns(1).unwrap().len(), 1);
    }

    #[test]
    fn store_not_found_until_marked() {
        let store = IndexStore::in_memory().unwrap();
        assert!(matches!(
            store.ensure_indexed(),
            Err(CodescopeError::StoreNotFound(_))
        ));
        store.mark_indexed().unwrap();
        store.ensure_indexed().unwrap();
    }

    #[test]
    fn floats_bytes_roundtrip() {
        let floats = vec![1.5f32, -0.25, 0.0];
        assert_eq!(bytes_to_floats(&floats_to_bytes(&floats)), floats);
    }

    #[test]
    fn open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/.codescope/index.db");
        IndexStore::open(&path).unwrap();
        assert!(path.exists());
    }
}

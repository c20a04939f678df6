//! Per-file and per-chunk hash tree used to skip unchanged work.
//!
//! The `files` table in the store is authoritative; [`MerkleTree`] is its
//! projection to `.codescope/merkle.json`.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use codescope_core::CodescopeError;
use serde::{Deserialize, Serialize};

use crate::chunker::{content_hash, Chunk};

/// File name of the projection inside the data directory.
pub const MERKLE_FILE_NAME: &str = "merkle.json";

/// Stored hashes for one indexed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    /// SHA-256 of the whole file.
    pub file_hash: String,
    /// Content hashes of the file's chunks, in source order.
    pub chunk_hashes: Vec<String>,
}

impl FileEntry {
    /// Entry for a freshly chunked file.
    pub fn new(path: &str, content: &str, chunks: &[Chunk]) -> Self {
        Self {
            path: path.to_string(),
            file_hash: content_hash(content),
            chunk_hashes: chunks.iter().map(|c| c.content_hash.clone()).collect(),
        }
    }
}

/// Identity of an already stored chunk, as needed for diffing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChunkKey {
    pub id: String,
    pub content_hash: String,
    pub provider: String,
    pub dimensions: usize,
}

/// Outcome of diffing a file's stored chunks against a fresh extraction.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChunkDiff {
    /// Indices into the fresh chunks whose stored vector can be reused.
    pub keep: Vec<usize>,
    /// Indices into the fresh chunks that must be embedded.
    pub embed: Vec<usize>,
    /// Stored chunks that no longer exist.
    pub delete: Vec<StoredChunkKey>,
}

/// Decide which chunks to keep, embed and delete.
///
/// A chunk is kept only when a stored chunk has the same id and was embedded
/// by the same provider with the same dimensions.
///
/// # Examples
///
/// ```
/// use codescope_index::merkle::{diff_chunks, StoredChunkKey};
///
/// let stored = vec![StoredChunkKey {
///     id: "a.rs:gone:00000000".into(),
///     content_hash: "00000000".into(),
///     provider: "local:feature-hash".into(),
///     dimensions: 384,
/// }];
/// let diff = diff_chunks(&stored, &[], "local:feature-hash", 384);
/// assert_eq!(diff.delete.len(), 1);
/// assert!(diff.embed.is_empty());
/// ```
pub fn diff_chunks(
    stored: &[StoredChunkKey],
    fresh: &[Chunk],
    provider: &str,
    dimensions: usize,
) -> ChunkDiff {
    let reusable: HashSet<&str> = stored
        .iter()
        .filter(|s| s.provider == provider && s.dimensions == dimensions)
        .map(|s| s.id.as_str())
        .collect();
    let fresh_ids: HashSet<&str> = fresh.iter().map(|c| c.id.as_str()).collect();

    let mut diff = ChunkDiff::default();
    for (i, chunk) in fresh.iter().enumerate() {
        if reusable.contains(chunk.id.as_str()) {
            diff.keep.push(i);
        } else {
            diff.embed.push(i);
        }
    }
    diff.delete = stored
        .iter()
        .filter(|s| !fresh_ids.contains(s.id.as_str()))
        .cloned()
        .collect();
    diff
}

/// Hashes recorded for one file in `merkle.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHashes {
    pub file_hash: String,
    pub chunk_hashes: Vec<String>,
}

/// File path to hashes, serialized as a flat JSON object.
///
/// # Examples
///
/// ```
/// use codescope_index::merkle::{FileEntry, MerkleTree};
///
/// let tree = MerkleTree::from_entries(vec![FileEntry {
///     path: "src/a.rs".into(),
///     file_hash: "f1".into(),
///     chunk_hashes: vec!["c1".into()],
/// }]);
/// let json = serde_json::to_value(&tree).unwrap();
/// assert_eq!(json["src/a.rs"]["fileHash"], "f1");
/// assert_eq!(json["src/a.rs"]["chunkHashes"][0], "c1");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MerkleTree {
    files: BTreeMap<String, FileHashes>,
}

impl MerkleTree {
    pub fn from_entries(entries: impl IntoIterator<Item = FileEntry>) -> Self {
        let files = entries
            .into_iter()
            .map(|e| {
                (
                    e.path,
                    FileHashes {
                        file_hash: e.file_hash,
                        chunk_hashes: e.chunk_hashes,
                    },
                )
            })
            .collect();
        Self { files }
    }

    /// Location of the projection for a data directory.
    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(MERKLE_FILE_NAME)
    }

    /// Load the projection, or an empty tree if none was written yet.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Io`] or [`CodescopeError::Serialization`] on
    /// unreadable or malformed files.
    pub fn load(data_dir: &Path) -> Result<Self, CodescopeError> {
        let path = Self::path(data_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the projection.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Io`] if the file cannot be written.
    pub fn save(&self, data_dir: &Path) -> Result<(), CodescopeError> {
        std::fs::create_dir_all(data_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::path(data_dir), json)?;
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&FileHashes> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Hash over every file's path and hash; changes iff any file changed.
    pub fn root_hash(&self) -> String {
        let mut material = String::new();
        for (path, hashes) in &self.files {
            material.push_str(path);
            material.push('\0');
            material.push_str(&hashes.file_hash);
            material.push('\n');
        }
        content_hash(&material)
    }
}

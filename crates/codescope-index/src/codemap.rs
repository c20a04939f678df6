//! `codescope.codemap.json`: a human- and agent-readable projection of the
//! store, keyed by chunk id.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use codescope_core::{ChunkType, CodescopeError};
use serde::{Deserialize, Serialize};

use crate::store::{ChunkRecord, IndexStore};

/// File name of the codemap at the repository root.
pub const CODEMAP_FILE_NAME: &str = "codescope.codemap.json";

/// One chunk in the codemap.
///
/// Fields added after the first codemap version default when missing, so
/// older files still load.
///
/// # Examples
///
/// ```
/// use codescope_index::codemap::CodemapEntry;
///
/// let legacy = r#"{"file":"a.rs","symbol":"run","sha":"ab","lang":"rust","chunkType":"function"}"#;
/// let entry: CodemapEntry = serde_json::from_str(legacy).unwrap();
/// assert_eq!(entry.path_weight, 1.0);
/// assert_eq!(entry.success_rate, 0.0);
/// assert!(entry.synonyms.is_empty());
/// assert!(!entry.encrypted);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodemapEntry {
    pub file: String,
    pub symbol: String,
    /// Content hash; also the body's name in the chunk store.
    pub sha: String,
    pub lang: String,
    pub chunk_type: ChunkType,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub dimensions: usize,
    #[serde(default = "default_path_weight")]
    pub path_weight: f64,
    #[serde(default)]
    pub success_rate: f64,
    /// Normalized queries learned for this chunk.
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<String>,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub call_targets: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub callers: Vec<String>,
}

fn default_path_weight() -> f64 {
    1.0
}

impl CodemapEntry {
    fn from_record(record: ChunkRecord, synonyms: Vec<String>) -> Self {
        Self {
            file: record.file,
            symbol: record.symbol,
            sha: record.content_hash,
            lang: record.language,
            chunk_type: record.chunk_type,
            provider: record.provider,
            dimensions: record.dimensions,
            path_weight: record.path_weight,
            success_rate: record.success_rate,
            synonyms,
            last_used_at: record.last_used_at,
            encrypted: record.encrypted,
            signature: (!record.signature.is_empty()).then_some(record.signature),
            tags: record.tags,
            intent: record.intent,
            description: record.description,
            call_targets: record.call_targets,
            callers: record.callers,
        }
    }
}

/// Chunk id to [`CodemapEntry`], serialized as a flat, sorted JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Codemap {
    pub entries: BTreeMap<String, CodemapEntry>,
}

impl Codemap {
    /// Project the store.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Database`] if the store cannot be read.
    pub fn from_store(store: &IndexStore) -> Result<Self, CodescopeError> {
        let mut synonyms = store.intention_synonyms()?;
        let entries = store
            .all_chunks()?
            .into_iter()
            .map(|record| {
                let learned = synonyms.remove(&record.id).unwrap_or_default();
                (record.id.clone(), CodemapEntry::from_record(record, learned))
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn path(root: &Path) -> PathBuf {
        root.join(CODEMAP_FILE_NAME)
    }

    /// Load the codemap at `root`, or an empty one if none exists.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Io`] or [`CodescopeError::Serialization`] on
    /// unreadable or malformed files.
    pub fn load(root: &Path) -> Result<Self, CodescopeError> {
        let path = Self::path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the codemap to `root`.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Io`] if the file cannot be written.
    pub fn save(&self, root: &Path) -> Result<PathBuf, CodescopeError> {
        let path = Self::path(root);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    pub fn get(&self, id: &str) -> Option<&CodemapEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::{chunk_id, content_hash, Chunk};
    use crate::merkle::FileEntry;
    use crate::store::{EmbeddedChunk, FileCommit};

    fn populated_store() -> (IndexStore, String) {
        let store = IndexStore::in_memory().unwrap();
        let body = "fn alpha() { beta(); }";
        let hash = content_hash(body);
        let chunk = Chunk {
            id: chunk_id("src/a.rs", "alpha", &hash),
            file: "src/a.rs".into(),
            symbol: "alpha".into(),
            language: "rust".into(),
            chunk_type: ChunkType::Function,
            content_hash: hash.clone(),
            start_line: 1,
            end_line: 1,
            signature: "fn alpha()".into(),
            tags: vec!["alpha".into()],
            intent: Some("start things".into()),
            description: None,
            call_names: vec!["beta".into()],
            content: body.into(),
        };
        let id = chunk.id.clone();
        store
            .commit_file(&FileCommit {
                entry: FileEntry {
                    path: "src/a.rs".into(),
                    file_hash: "f".into(),
                    chunk_hashes: vec![hash],
                },
                provider: "local:feature-hash".into(),
                dimensions: 4,
                embedded: vec![EmbeddedChunk {
                    chunk,
                    vector: vec![0.5; 4],
                    encrypted: false,
                }],
                kept: vec![],
                deleted: vec![],
                lexical_bodies: true,
            })
            .unwrap();
        (store, id)
    }

    #[test]
    fn projection_carries_metadata_and_synonyms() {
        let (store, id) = populated_store();
        store.upsert_intention("start alpha", "start alpha", &id, 0.9).unwrap();

        let codemap = Codemap::from_store(&store).unwrap();
        let entry = codemap.get(&id).unwrap();
        assert_eq!(entry.symbol, "alpha");
        assert_eq!(entry.provider, "local:feature-hash");
        assert_eq!(entry.signature.as_deref(), Some("fn alpha()"));
        assert_eq!(entry.intent.as_deref(), Some("start things"));
        assert_eq!(entry.synonyms, vec!["start alpha"]);
    }

    #[test]
    fn save_then_load_is_identical() {
        let (store, _) = populated_store();
        let dir = tempfile::tempdir().unwrap();
        let codemap = Codemap::from_store(&store).unwrap();
        codemap.save(dir.path()).unwrap();
        assert_eq!(Codemap::load(dir.path()).unwrap(), codemap);
    }

    #[test]
    fn optional_fields_are_omitted_when_empty() {
        let (store, id) = populated_store();
        let codemap = Codemap::from_store(&store).unwrap();
        let json = serde_json::to_value(&codemap).unwrap();
        let entry = &json[id.as_str()];
        assert!(entry.get("description").is_none());
        assert!(entry.get("callers").is_none());
        assert!(entry.get("lastUsedAt").is_none());
        assert_eq!(entry["pathWeight"], 1.0);
        assert_eq!(entry["chunkType"], "function");
    }
}

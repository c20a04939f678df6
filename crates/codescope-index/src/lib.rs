//! Chunking, change detection, embedding and persistence.
//!
//! Turns source files into content-addressed chunks, decides which of them
//! need (re-)embedding by diffing against the stored Merkle entries, embeds
//! the rest through an [`embedding::Embedder`], and commits everything to a
//! SQLite store with an FTS5 lexical index. The store is the source of truth;
//! the codemap and `merkle.json` are projections regenerated after each pass.

pub mod chunker;
pub mod codec;
pub mod codemap;
pub mod embedding;
pub mod indexer;
pub mod lexical;
pub mod merkle;
pub mod store;
pub mod watch;

pub use chunker::{chunk_file, Chunk};
pub use codec::ChunkBodyStore;
pub use codemap::{Codemap, CodemapEntry, CODEMAP_FILE_NAME};
pub use embedding::{embedder_from_config, Embedder, Embedding, HashEmbedder, HttpEmbedder, InputKind};
pub use indexer::{IndexEvent, IndexReport, IndexRequest, Indexer};
pub use lexical::LexicalIndex;
pub use merkle::{FileEntry, MerkleTree};
pub use store::{ChunkRecord, IndexStore, IntentionRecord, QueryPattern};
pub use watch::{debounce_loop, spawn_watcher, WatchHandle};

//! Core types, configuration, and error handling for codescope.
//!
//! This crate provides the shared foundation used by all other codescope crates:
//! - [`CodescopeError`]: unified error type using `thiserror`, with `miette`
//!   diagnostics and a structured [`Failure`] projection
//! - [`CodescopeConfig`]: configuration loaded from `.codescope.toml`
//! - Shared types: [`ChunkType`], [`ContextPack`], [`ScopeFilter`],
//!   [`ScopeOverrides`], [`RerankMode`]
//! - [`scoring`]: the fixed constants used to blend and threshold scores

mod config;
mod error;
pub mod scoring;
mod types;

pub use config::{
    CodescopeConfig, EmbeddingConfig, EncryptionConfig, IndexConfig, RerankConfig, SearchConfig,
    WatchConfig, CONFIG_FILE_NAME,
};
pub use error::{CodescopeError, ErrorKind, Failure};
pub use types::{
    ChunkType, ContextPack, RerankMode, ScopeFilter, ScopeMatcher, ScopeOverrides, Toggle,
};

/// A convenience `Result` type for codescope operations.
pub type Result<T> = std::result::Result<T, CodescopeError>;

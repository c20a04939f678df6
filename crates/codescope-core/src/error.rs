use std::path::PathBuf;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};

/// Errors that can occur across codescope.
///
/// Each variant wraps a specific error domain and carries a stable diagnostic
/// code plus, where one exists, an actionable `help` suggestion. Callers that
/// need a wire-friendly shape use [`CodescopeError::to_failure`].
///
/// # Examples
///
/// ```
/// use codescope_core::{CodescopeError, ErrorKind};
///
/// let err = CodescopeError::Config("missing API key".into());
/// assert!(err.to_string().contains("missing API key"));
/// assert_eq!(err.kind(), ErrorKind::Config);
/// ```
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum CodescopeError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    #[diagnostic(code(codescope::io))]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(code(codescope::config), help("check .codescope.toml and the related environment variables"))]
    Config(String),

    /// Source code parsing failure.
    #[error("parse error: {0}")]
    #[diagnostic(code(codescope::parse))]
    Parse(String),

    /// Embedding provider error.
    #[error("embedding error: {0}")]
    #[diagnostic(code(codescope::embedding), help("verify the embedding provider is reachable and the API key is valid"))]
    Embedding(String),

    /// Index database failure.
    #[error("database error: {0}")]
    #[diagnostic(code(codescope::database))]
    Database(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    #[diagnostic(code(codescope::serialization))]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    #[diagnostic(code(codescope::config))]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    #[diagnostic(code(codescope::io))]
    FileNotFound(PathBuf),

    /// A query was attempted before the project was ever indexed.
    #[error("no index found under {}", .0.display())]
    #[diagnostic(
        code(codescope::store_not_found),
        help("index the project first, then retry the search")
    )]
    StoreNotFound(PathBuf),

    /// No chunk is indexed for the query's provider/dimension pair.
    #[error("no indexed chunks for provider '{provider}' with {dimensions} dimensions")]
    #[diagnostic(
        code(codescope::no_candidates),
        help("index the project with this provider, or widen the search scope")
    )]
    NoCandidates { provider: String, dimensions: usize },

    /// The index holds vectors, but only for other provider/dimension pairs.
    #[error(
        "query uses provider '{provider}' ({dimensions} dims) but the index was built with {indexed}"
    )]
    #[diagnostic(
        code(codescope::embedding_dimension_mismatch),
        help("re-index the project with the same embedding provider used for searching")
    )]
    DimensionMismatch {
        provider: String,
        dimensions: usize,
        indexed: String,
    },

    /// Candidates existed but none cleared the similarity floor.
    #[error("{candidates} candidates scored below the similarity floor of {floor}")]
    #[diagnostic(
        code(codescope::no_relevant_matches),
        help("rephrase the query with symbol names or domain terms from the codebase")
    )]
    NoRelevantMatches { candidates: usize, floor: f64 },

    /// The cross-encoder could not be loaded or invoked.
    #[error("reranker unavailable: {0}")]
    #[diagnostic(
        code(codescope::rerank_unavailable),
        help("results keep their fused order; check the rerank endpoint configuration")
    )]
    RerankUnavailable(String),

    /// A sealed chunk body was requested but no key is configured.
    #[error("chunk {0} is encrypted but no encryption key is configured")]
    #[diagnostic(
        code(codescope::chunk_key_missing),
        help("set encryption.key in .codescope.toml or CODESCOPE_ENCRYPTION_KEY")
    )]
    ChunkKeyMissing(String),

    /// A sealed chunk body failed authentication (wrong key or tampered bytes).
    #[error("chunk {0} failed authentication")]
    #[diagnostic(
        code(codescope::chunk_auth_failed),
        help("the stored body is corrupted or was sealed with a different key; re-index to rewrite it")
    )]
    ChunkAuthFailed(String),

    /// No stored body exists for the requested chunk hash.
    #[error("chunk not found: {0}")]
    #[diagnostic(code(codescope::chunk_not_found), help("re-index the project to restore chunk bodies"))]
    ChunkNotFound(String),

    /// A single file failed during indexing.
    #[error("failed to process {}: {message}", path.display())]
    #[diagnostic(code(codescope::processing_error))]
    Processing { path: PathBuf, message: String },
}

/// Stable, serializable classification of a [`CodescopeError`].
///
/// # Examples
///
/// ```
/// use codescope_core::ErrorKind;
///
/// let json = serde_json::to_string(&ErrorKind::StoreNotFound).unwrap();
/// assert_eq!(json, "\"store_not_found\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Io,
    Config,
    Parse,
    Embedding,
    Database,
    Serialization,
    StoreNotFound,
    NoCandidates,
    EmbeddingDimensionMismatch,
    NoRelevantMatches,
    RerankUnavailable,
    ChunkKeyMissing,
    ChunkAuthFailed,
    ChunkNotFound,
    ProcessingError,
}

/// A user- or agent-visible failure: kind, message and a suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl CodescopeError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CodescopeError::Io(_) | CodescopeError::FileNotFound(_) => ErrorKind::Io,
            CodescopeError::Config(_) | CodescopeError::Toml(_) => ErrorKind::Config,
            CodescopeError::Parse(_) => ErrorKind::Parse,
            CodescopeError::Embedding(_) => ErrorKind::Embedding,
            CodescopeError::Database(_) => ErrorKind::Database,
            CodescopeError::Serialization(_) => ErrorKind::Serialization,
            CodescopeError::StoreNotFound(_) => ErrorKind::StoreNotFound,
            CodescopeError::NoCandidates { .. } => ErrorKind::NoCandidates,
            CodescopeError::DimensionMismatch { .. } => ErrorKind::EmbeddingDimensionMismatch,
            CodescopeError::NoRelevantMatches { .. } => ErrorKind::NoRelevantMatches,
            CodescopeError::RerankUnavailable(_) => ErrorKind::RerankUnavailable,
            CodescopeError::ChunkKeyMissing(_) => ErrorKind::ChunkKeyMissing,
            CodescopeError::ChunkAuthFailed(_) => ErrorKind::ChunkAuthFailed,
            CodescopeError::ChunkNotFound(_) => ErrorKind::ChunkNotFound,
            CodescopeError::Processing { .. } => ErrorKind::ProcessingError,
        }
    }

    /// True for the kinds that mean "nothing to return" rather than a fault.
    pub fn is_empty_result(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NoCandidates
                | ErrorKind::EmbeddingDimensionMismatch
                | ErrorKind::NoRelevantMatches
        )
    }

    /// Project this error into its structured, serializable form.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::PathBuf;
    /// use codescope_core::{CodescopeError, ErrorKind};
    ///
    /// let failure = CodescopeError::StoreNotFound(PathBuf::from(".codescope")).to_failure();
    /// assert_eq!(failure.kind, ErrorKind::StoreNotFound);
    /// assert!(failure.suggestion.unwrap().contains("index"));
    /// ```
    pub fn to_failure(&self) -> Failure {
        Failure {
            kind: self.kind(),
            message: self.to_string(),
            suggestion: self.help().map(|h| h.to_string()),
        }
    }
}

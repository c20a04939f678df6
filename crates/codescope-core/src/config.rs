use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CodescopeError;
use crate::types::RerankMode;

/// File name of the per-project configuration, looked up at the project root.
pub const CONFIG_FILE_NAME: &str = ".codescope.toml";

/// Top-level configuration loaded from `.codescope.toml`.
///
/// Every section and every field has a default, so an empty or partial file
/// is valid.
///
/// # Examples
///
/// ```
/// use codescope_core::CodescopeConfig;
///
/// let config = CodescopeConfig::default();
/// assert_eq!(config.search.default_limit, 10);
/// assert_eq!(config.watch.debounce_ms, 500);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodescopeConfig {
    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Indexing behavior.
    #[serde(default)]
    pub index: IndexConfig,
    /// Query-time defaults (overridable per query and by context packs).
    #[serde(default)]
    pub search: SearchConfig,
    /// Cross-encoder re-ranking.
    #[serde(default)]
    pub rerank: RerankConfig,
    /// Watch mode.
    #[serde(default)]
    pub watch: WatchConfig,
    /// At-rest encryption of chunk bodies.
    #[serde(default)]
    pub encryption: EncryptionConfig,
}

impl CodescopeConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Io`] if the file cannot be read, or
    /// [`CodescopeError::Toml`] if the content is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, CodescopeError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use codescope_core::CodescopeConfig;
    ///
    /// let toml = r#"
    /// [search]
    /// default_limit = 25
    /// "#;
    /// let config = CodescopeConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.search.default_limit, 25);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, CodescopeError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load `.codescope.toml` from a project root, or defaults when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(root: &Path) -> Result<Self, CodescopeError> {
        let path = root.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Configuration for the embedding provider.
///
/// # Examples
///
/// ```
/// use codescope_core::EmbeddingConfig;
///
/// let config = EmbeddingConfig::default();
/// assert_eq!(config.provider, "local");
/// assert_eq!(config.dimensions, 384);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider: `"local"` (feature hashing, offline), `"voyage"`, or `"openai"`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// API key for remote providers.
    pub api_key: Option<String>,
    /// Model name. Defaults per provider when unset.
    pub model: Option<String>,
    /// Embedding dimensions (default: 384).
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
    /// Custom base URL for OpenAI-compatible endpoints.
    pub base_url: Option<String>,
}

fn default_embedding_provider() -> String {
    "local".into()
}

fn default_embedding_dimensions() -> usize {
    384
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            model: None,
            dimensions: default_embedding_dimensions(),
            base_url: None,
        }
    }
}

/// Indexing behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Maximum number of files processed concurrently (default: 4).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Files larger than this are skipped (default: 1 MiB).
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Glob patterns (relative to the root) excluded from indexing.
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_workers() -> usize {
    4
}

fn default_max_file_size() -> u64 {
    1_048_576
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_file_size: default_max_file_size(),
            exclude: Vec::new(),
        }
    }
}

/// Query-time defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of results when the caller does not pass a limit (default: 10).
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Fuse vector and lexical streams (default: true).
    #[serde(default = "default_true")]
    pub hybrid: bool,
    /// Include the BM25 stream when hybrid is on (default: true).
    #[serde(default = "default_true")]
    pub bm25: bool,
    /// Apply symbol-aware boosting (default: true).
    #[serde(default = "default_true")]
    pub symbol_boost: bool,
}

fn default_limit() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            hybrid: true,
            bm25: true,
            symbol_boost: true,
        }
    }
}

/// Cross-encoder re-ranking configuration.
///
/// # Examples
///
/// ```
/// use codescope_core::{RerankConfig, RerankMode};
///
/// let config = RerankConfig::default();
/// assert_eq!(config.mode, RerankMode::Off);
/// assert_eq!(config.top_n, 50);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    /// Default mode when neither a context pack nor the query picks one.
    #[serde(default)]
    pub mode: RerankMode,
    /// Base URL of a `/v1/rerank` compatible endpoint.
    pub base_url: Option<String>,
    /// Model identifier passed to the endpoint.
    pub model: Option<String>,
    /// Bearer token for the endpoint.
    pub api_key: Option<String>,
    /// Number of head candidates sent to the model (default: 50).
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Stage timeout in milliseconds; on expiry the fused order is kept (default: 5000).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_top_n() -> usize {
    crate::scoring::RERANK_TOP_N
}

fn default_timeout_ms() -> u64 {
    5000
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            mode: RerankMode::Off,
            base_url: None,
            model: None,
            api_key: None,
            top_n: default_top_n(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Watch mode configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce window for file-system events (default: 500 ms).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    500
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// At-rest encryption of chunk bodies.
///
/// The key is 32 bytes encoded as base64 or hex. When `key` is unset the
/// `CODESCOPE_ENCRYPTION_KEY` environment variable is consulted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Seal newly written chunk bodies (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Encoded 256-bit key.
    pub key: Option<String>,
}

impl EncryptionConfig {
    /// The configured key string, falling back to `CODESCOPE_ENCRYPTION_KEY`.
    pub fn key_material(&self) -> Option<String> {
        self.key
            .clone()
            .or_else(|| std::env::var("CODESCOPE_ENCRYPTION_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::CodescopeConfig;
use crate::error::CodescopeError;

/// Granularity of an indexed chunk.
///
/// Struct, enum, trait and interface declarations are all indexed as
/// [`ChunkType::Class`]; functions declared inside a class-like container are
/// [`ChunkType::Method`].
///
/// # Examples
///
/// ```
/// use codescope_core::ChunkType;
///
/// let ct: ChunkType = "method".parse().unwrap();
/// assert_eq!(ct, ChunkType::Method);
/// assert_eq!(ct.to_string(), "method");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    /// A free-standing function.
    Function,
    /// A function declared inside a class-like container.
    Method,
    /// A class, struct, enum, trait or interface.
    Class,
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkType::Function => write!(f, "function"),
            ChunkType::Method => write!(f, "method"),
            ChunkType::Class => write!(f, "class"),
        }
    }
}

impl FromStr for ChunkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "function" => Ok(ChunkType::Function),
            "method" => Ok(ChunkType::Method),
            "class" => Ok(ChunkType::Class),
            _ => Err(format!("unknown chunk type: {s}")),
        }
    }
}

/// Whether the cross-encoder stage runs for a query.
///
/// # Examples
///
/// ```
/// use codescope_core::RerankMode;
///
/// let mode: RerankMode = serde_json::from_str("\"cross-encoder\"").unwrap();
/// assert_eq!(mode, RerankMode::CrossEncoder);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RerankMode {
    /// Keep the fused (and boosted) order.
    #[default]
    Off,
    /// Re-order the head of the list with a pairwise relevance model.
    CrossEncoder,
}

impl fmt::Display for RerankMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RerankMode::Off => write!(f, "off"),
            RerankMode::CrossEncoder => write!(f, "cross-encoder"),
        }
    }
}

impl FromStr for RerankMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "none" => Ok(RerankMode::Off),
            "cross-encoder" | "cross_encoder" | "crossencoder" => Ok(RerankMode::CrossEncoder),
            _ => Err(format!("unknown rerank mode: {s}")),
        }
    }
}

/// An on/off switch as written in context pack files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    #[default]
    On,
    Off,
}

impl Toggle {
    pub fn is_on(self) -> bool {
        self == Toggle::On
    }
}

impl From<bool> for Toggle {
    fn from(on: bool) -> Self {
        if on {
            Toggle::On
        } else {
            Toggle::Off
        }
    }
}

/// A named, persisted bundle of scope settings.
///
/// Stored as `<data_dir>/contextpacks/<name>.json`. Packs written before the
/// optional fields existed load with those fields unset.
///
/// # Examples
///
/// ```
/// use codescope_core::{ContextPack, RerankMode, Toggle};
///
/// let pack = ContextPack {
///     name: "backend".into(),
///     path_globs: vec!["server/**".into()],
///     ..ContextPack::default()
/// };
/// let json = serde_json::to_value(&pack).unwrap();
/// assert_eq!(json["pathGlobs"][0], "server/**");
/// assert_eq!(json["rerankMode"], "off");
/// assert_eq!(json["hybridMode"], "on");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPack {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub path_globs: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub rerank_mode: RerankMode,
    #[serde(default)]
    pub hybrid_mode: Toggle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bm25_mode: Option<Toggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_boost: Option<bool>,
}

impl ContextPack {
    /// Directory holding context packs under a project data directory.
    pub fn dir(data_dir: &Path) -> PathBuf {
        data_dir.join("contextpacks")
    }

    /// Persist this pack, replacing any pack with the same name.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Config`] for an invalid name, or an I/O or
    /// serialization error if the file cannot be written.
    pub fn save(&self, data_dir: &Path) -> Result<PathBuf, CodescopeError> {
        validate_pack_name(&self.name)?;
        let dir = Self::dir(data_dir);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", self.name));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    /// Load the pack called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::FileNotFound`] when no such pack exists.
    pub fn load(data_dir: &Path, name: &str) -> Result<Self, CodescopeError> {
        validate_pack_name(name)?;
        let path = Self::dir(data_dir).join(format!("{name}.json"));
        if !path.exists() {
            return Err(CodescopeError::FileNotFound(path));
        }
        let content = std::fs::read_to_string(&path)?;
        let pack: Self = serde_json::from_str(&content)?;
        Ok(pack)
    }

    /// List all packs, sorted by name. A missing directory yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if a pack file exists but cannot be read or parsed.
    pub fn list(data_dir: &Path) -> Result<Vec<Self>, CodescopeError> {
        let dir = Self::dir(data_dir);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut packs = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            packs.push(serde_json::from_str::<Self>(&content)?);
        }
        packs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(packs)
    }
}

fn validate_pack_name(name: &str) -> Result<(), CodescopeError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CodescopeError::Config(format!(
            "invalid context pack name '{name}': use letters, digits, '-' or '_'"
        )))
    }
}

/// Explicit per-query scope settings. Any field left `None` falls through to
/// the context pack, then to configuration defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeOverrides {
    /// Name of a stored context pack to apply before these overrides.
    #[serde(default)]
    pub context_pack: Option<String>,
    #[serde(default)]
    pub path_globs: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub languages: Option<Vec<String>>,
    #[serde(default)]
    pub rerank_mode: Option<RerankMode>,
    #[serde(default)]
    pub hybrid: Option<bool>,
    #[serde(default)]
    pub bm25: Option<bool>,
    #[serde(default)]
    pub symbol_boost: Option<bool>,
}

/// The effective scope of one query.
///
/// Empty `path_globs`, `tags` or `languages` mean "no restriction".
///
/// # Examples
///
/// ```
/// use codescope_core::{CodescopeConfig, ContextPack, RerankMode, ScopeFilter, ScopeOverrides, Toggle};
///
/// let config = CodescopeConfig::default();
/// let pack = ContextPack {
///     name: "api".into(),
///     languages: vec!["java".into()],
///     hybrid_mode: Toggle::Off,
///     ..ContextPack::default()
/// };
/// let overrides = ScopeOverrides { hybrid: Some(true), ..ScopeOverrides::default() };
///
/// let filter = ScopeFilter::resolve(&config, Some(&pack), &overrides);
/// assert_eq!(filter.languages, vec!["java"]);
/// assert!(filter.hybrid_enabled);
/// assert_eq!(filter.rerank_mode, RerankMode::Off);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeFilter {
    pub path_globs: Vec<String>,
    pub tags: Vec<String>,
    pub languages: Vec<String>,
    pub rerank_mode: RerankMode,
    pub hybrid_enabled: bool,
    pub bm25_enabled: bool,
    pub symbol_boost_enabled: bool,
}

impl ScopeFilter {
    /// Configuration defaults only.
    pub fn from_config(config: &CodescopeConfig) -> Self {
        Self {
            path_globs: Vec::new(),
            tags: Vec::new(),
            languages: Vec::new(),
            rerank_mode: config.rerank.mode,
            hybrid_enabled: config.search.hybrid,
            bm25_enabled: config.search.bm25,
            symbol_boost_enabled: config.search.symbol_boost,
        }
    }

    /// Merge configuration defaults, then `pack`, then `overrides`.
    pub fn resolve(
        config: &CodescopeConfig,
        pack: Option<&ContextPack>,
        overrides: &ScopeOverrides,
    ) -> Self {
        let mut filter = Self::from_config(config);

        if let Some(pack) = pack {
            filter.path_globs = pack.path_globs.clone();
            filter.tags = pack.tags.clone();
            filter.languages = pack.languages.clone();
            filter.rerank_mode = pack.rerank_mode;
            filter.hybrid_enabled = pack.hybrid_mode.is_on();
            if let Some(bm25) = pack.bm25_mode {
                filter.bm25_enabled = bm25.is_on();
            }
            if let Some(boost) = pack.symbol_boost {
                filter.symbol_boost_enabled = boost;
            }
        }

        if let Some(globs) = &overrides.path_globs {
            filter.path_globs = globs.clone();
        }
        if let Some(tags) = &overrides.tags {
            filter.tags = tags.clone();
        }
        if let Some(languages) = &overrides.languages {
            filter.languages = languages.clone();
        }
        if let Some(mode) = overrides.rerank_mode {
            filter.rerank_mode = mode;
        }
        if let Some(hybrid) = overrides.hybrid {
            filter.hybrid_enabled = hybrid;
        }
        if let Some(bm25) = overrides.bm25 {
            filter.bm25_enabled = bm25;
        }
        if let Some(boost) = overrides.symbol_boost {
            filter.symbol_boost_enabled = boost;
        }

        filter
    }

    /// True when neither lexical stream nor fusion runs.
    pub fn vector_only(&self) -> bool {
        !self.hybrid_enabled || !self.bm25_enabled
    }
}

/// A [`ScopeFilter`]'s predicates compiled for repeated matching.
///
/// # Examples
///
/// ```
/// use codescope_core::{CodescopeConfig, ScopeFilter, ScopeMatcher, ScopeOverrides};
///
/// let overrides = ScopeOverrides {
///     path_globs: Some(vec!["src/auth/**".into()]),
///     ..ScopeOverrides::default()
/// };
/// let filter = ScopeFilter::resolve(&CodescopeConfig::default(), None, &overrides);
/// let matcher = ScopeMatcher::new(&filter).unwrap();
/// assert!(matcher.matches("src/auth/login.rs", "rust", &[]));
/// assert!(!matcher.matches("src/db/pool.rs", "rust", &[]));
/// ```
#[derive(Debug, Clone)]
pub struct ScopeMatcher {
    globs: Vec<glob::Pattern>,
    tags: Vec<String>,
    languages: Vec<String>,
}

impl ScopeMatcher {
    /// Compile the filter's path globs.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Config`] if a glob pattern is invalid.
    pub fn new(filter: &ScopeFilter) -> Result<Self, CodescopeError> {
        let globs = filter
            .path_globs
            .iter()
            .map(|g| {
                glob::Pattern::new(g)
                    .map_err(|e| CodescopeError::Config(format!("invalid path glob '{g}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            globs,
            tags: filter.tags.iter().map(|t| t.to_lowercase()).collect(),
            languages: filter.languages.iter().map(|l| l.to_lowercase()).collect(),
        })
    }

    /// Whether a chunk at `file` in `language` carrying `tags` is in scope.
    pub fn matches(&self, file: &str, language: &str, tags: &[String]) -> bool {
        if !self.globs.is_empty() && !self.globs.iter().any(|g| g.matches(file)) {
            return false;
        }
        if !self.languages.is_empty() && !self.languages.contains(&language.to_lowercase()) {
            return false;
        }
        if !self.tags.is_empty()
            && !tags
                .iter()
                .any(|t| self.tags.contains(&t.to_lowercase()))
        {
            return false;
        }
        true
    }

    /// True when the matcher accepts everything.
    pub fn is_unrestricted(&self) -> bool {
        self.globs.is_empty() && self.tags.is_empty() && self.languages.is_empty()
    }
}

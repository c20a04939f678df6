//! Symbol-level chunks with content-addressed identity.
//!
//! Wraps the declarations found by `codescope-syntax` into [`Chunk`] values:
//! each gets a SHA-256 content hash, an id of the form `file:symbol:hash8`,
//! and semantic metadata (tags, intent, description) taken from
//! `@codescope-*` annotations in its leading comment or derived from names.

use std::collections::HashSet;
use std::path::Path;

use codescope_core::{ChunkType, CodescopeError};
use codescope_syntax::{extract_declarations, Declaration, SourceFile};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const TAGS_ANNOTATION: &str = "@codescope-tags";
const INTENT_ANNOTATION: &str = "@codescope-intent";
const DESCRIPTION_ANNOTATION: &str = "@codescope-description";

/// Length of the hash suffix in a chunk id.
pub const SHORT_HASH_LEN: usize = 8;

/// A semantic code chunk extracted from a source file.
///
/// # Examples
///
/// ```
/// use codescope_core::ChunkType;
/// use codescope_index::chunker::{chunk_id, content_hash, Chunk};
///
/// let content = "fn main() {}";
/// let hash = content_hash(content);
/// let chunk = Chunk {
///     id: chunk_id("src/main.rs", "main", &hash),
///     file: "src/main.rs".into(),
///     symbol: "main".into(),
///     language: "rust".into(),
///     chunk_type: ChunkType::Function,
///     content_hash: hash,
///     start_line: 1,
///     end_line: 1,
///     signature: "fn main()".into(),
///     tags: vec!["main".into(), "rust".into()],
///     intent: None,
///     description: None,
///     call_names: vec![],
///     content: content.into(),
/// };
/// assert!(chunk.id.starts_with("src/main.rs:main:"));
/// assert_eq!(chunk.short_hash().len(), 8);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// `file:symbol:hash8`.
    pub id: String,
    /// Path relative to the repository root, `/`-separated.
    pub file: String,
    pub symbol: String,
    pub language: String,
    pub chunk_type: ChunkType,
    /// SHA-256 (hex) of [`Chunk::content`].
    pub content_hash: String,
    /// First line (1-indexed).
    pub start_line: u32,
    /// Last line (1-indexed, inclusive).
    pub end_line: u32,
    pub signature: String,
    pub tags: Vec<String>,
    pub intent: Option<String>,
    pub description: Option<String>,
    /// Raw callee names found in the body.
    pub call_names: Vec<String>,
    /// Exact source span.
    pub content: String,
}

impl Chunk {
    /// The hash suffix used in [`Chunk::id`].
    pub fn short_hash(&self) -> &str {
        short_hash(&self.content_hash)
    }

    /// Text sent to the embedder: a context header followed by the source.
    pub fn embedding_text(&self) -> String {
        let mut header = format!(
            "# File: {}\n# Type: {}\n# Name: {}",
            self.file, self.chunk_type, self.symbol
        );
        if !self.signature.is_empty() {
            header.push_str(&format!("\n# Signature: {}", self.signature));
        }
        if !self.tags.is_empty() {
            header.push_str(&format!("\n# Tags: {}", self.tags.join(", ")));
        }
        if let Some(intent) = &self.intent {
            header.push_str(&format!("\n# Intent: {intent}"));
        }
        if let Some(description) = &self.description {
            header.push_str(&format!("\n# Description: {description}"));
        }
        format!("{header}\n\n{}", self.content)
    }

    /// Text handed to the lexical index.
    ///
    /// Symbol tokens are spelled out so `createUser` also matches `create user`.
    /// The body is left out when bodies are sealed at rest.
    pub fn lexical_text(&self, include_body: bool) -> String {
        let mut parts = vec![self.symbol.clone(), symbol_tokens(&self.symbol).join(" ")];
        if !self.signature.is_empty() {
            parts.push(self.signature.clone());
        }
        if !self.tags.is_empty() {
            parts.push(self.tags.join(" "));
        }
        parts.extend(self.intent.iter().cloned());
        parts.extend(self.description.iter().cloned());
        if include_body {
            parts.push(self.content.clone());
        }
        parts.join("\n")
    }
}

/// SHA-256 hex digest of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// First [`SHORT_HASH_LEN`] characters of a hex hash.
pub fn short_hash(hash: &str) -> &str {
    hash.get(..SHORT_HASH_LEN).unwrap_or(hash)
}

/// Build a chunk id from its parts.
pub fn chunk_id(file: &str, symbol: &str, content_hash: &str) -> String {
    format!("{file}:{symbol}:{}", short_hash(content_hash))
}

/// Split an identifier into lowercase word tokens.
///
/// Handles `snake_case`, `kebab-case`, `camelCase`, `PascalCase` and
/// acronym runs such as `HTTPServer`.
///
/// # Examples
///
/// ```
/// use codescope_index::chunker::symbol_tokens;
///
/// assert_eq!(symbol_tokens("createUserSession"), vec!["create", "user", "session"]);
/// assert_eq!(symbol_tokens("HTTPServer"), vec!["http", "server"]);
/// assert_eq!(symbol_tokens("process_payment"), vec!["process", "payment"]);
/// ```
pub fn symbol_tokens(name: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for part in name.split(|c: char| !c.is_alphanumeric()) {
        let chars: Vec<char> = part.chars().collect();
        let mut current = String::new();
        for (i, &c) in chars.iter().enumerate() {
            if c.is_uppercase() && !current.is_empty() {
                let prev = chars[i - 1];
                let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                if prev.is_lowercase() || prev.is_ascii_digit() || next_is_lower {
                    tokens.push(current.to_lowercase());
                    current.clear();
                }
            }
            current.push(c);
        }
        if !current.is_empty() {
            tokens.push(current.to_lowercase());
        }
    }
    tokens
}

/// Extract the chunks of one source file.
///
/// Duplicate ids (identical spans under the same symbol) are collapsed to
/// their first occurrence.
///
/// # Errors
///
/// Returns [`CodescopeError::Parse`] if the file's grammar cannot be loaded.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use codescope_index::chunker::chunk_file;
/// use codescope_syntax::{Language, SourceFile};
///
/// let file = SourceFile {
///     path: PathBuf::from("src/auth.rs"),
///     language: Language::Rust,
///     content: "/// @codescope-tags auth, login\nfn check_token(t: &str) -> bool { !t.is_empty() }".into(),
/// };
/// let chunks = chunk_file(&file).unwrap();
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].symbol, "check_token");
/// assert_eq!(chunks[0].tags, vec!["auth", "login"]);
/// ```
pub fn chunk_file(file: &SourceFile) -> Result<Vec<Chunk>, CodescopeError> {
    let declarations = extract_declarations(file)?;
    let rel = file.rel_path();
    let language = file.language.as_str();

    let mut seen = HashSet::new();
    let mut chunks = Vec::with_capacity(declarations.len());
    for declaration in declarations {
        let chunk = build_chunk(&rel, language, declaration);
        if seen.insert(chunk.id.clone()) {
            chunks.push(chunk);
        }
    }
    Ok(chunks)
}

fn build_chunk(file: &str, language: &str, declaration: Declaration) -> Chunk {
    let hash = content_hash(&declaration.text);
    let annotations = Annotations::parse(&declaration.doc_lines);

    let tags = if annotations.tags.is_empty() {
        derive_tags(&declaration.symbol, file, language)
    } else {
        annotations.tags
    };
    let description = annotations.description.or_else(|| {
        declaration
            .doc_lines
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty() && !l.starts_with('@'))
            .map(str::to_string)
    });

    Chunk {
        id: chunk_id(file, &declaration.symbol, &hash),
        file: file.to_string(),
        symbol: declaration.symbol,
        language: language.to_string(),
        chunk_type: declaration.chunk_type,
        content_hash: hash,
        start_line: declaration.start_line,
        end_line: declaration.end_line,
        signature: declaration.signature,
        tags,
        intent: annotations.intent,
        description,
        call_names: declaration.call_names,
        content: declaration.text,
    }
}

#[derive(Debug, Default)]
struct Annotations {
    tags: Vec<String>,
    intent: Option<String>,
    description: Option<String>,
}

impl Annotations {
    fn parse(doc_lines: &[String]) -> Self {
        let mut out = Self::default();
        for line in doc_lines {
            let line = line.trim();
            if let Some(rest) = line.strip_prefix(TAGS_ANNOTATION) {
                for tag in rest.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                    if !out.tags.iter().any(|t| t == tag) {
                        out.tags.push(tag.to_string());
                    }
                }
            } else if let Some(rest) = line.strip_prefix(INTENT_ANNOTATION) {
                out.intent = non_empty(rest);
            } else if let Some(rest) = line.strip_prefix(DESCRIPTION_ANNOTATION) {
                out.description = non_empty(rest);
            }
        }
        out
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim().trim_start_matches(':').trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Symbol-name tokens, then file-stem tokens, then the language.
fn derive_tags(symbol: &str, file: &str, language: &str) -> Vec<String> {
    let stem = Path::new(file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut tags: Vec<String> = Vec::new();
    let candidates = symbol_tokens(symbol)
        .into_iter()
        .chain(symbol_tokens(&stem))
        .chain(std::iter::once(language.to_string()));
    for tag in candidates {
        if tag.len() > 1 && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

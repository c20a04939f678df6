use std::fmt;
use std::path::{Path, PathBuf};

use codescope_core::CodescopeError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default maximum file size to process (1 MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1_048_576;

/// Number of bytes to check for binary detection.
const BINARY_CHECK_SIZE: usize = 8192;

/// A source file discovered during repository walking.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use codescope_syntax::walker::{Language, SourceFile};
///
/// let file = SourceFile {
///     path: PathBuf::from("src/main.rs"),
///     language: Language::Rust,
///     content: "fn main() {}".to_string(),
/// };
/// assert_eq!(file.rel_path(), "src/main.rs");
/// ```
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the repository root.
    pub path: PathBuf,
    /// Detected programming language.
    pub language: Language,
    /// Full file content.
    pub content: String,
}

impl SourceFile {
    /// The relative path with `/` separators, as stored in the index.
    pub fn rel_path(&self) -> String {
        normalize_path(&self.path)
    }
}

/// Render a relative path with forward slashes on every platform.
pub fn normalize_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Programming language detected from file extension.
///
/// # Examples
///
/// ```
/// use codescope_syntax::walker::Language;
///
/// assert_eq!(Language::from_extension("rs"), Language::Rust);
/// assert_eq!(Language::from_extension("py"), Language::Python);
/// assert_eq!(Language::from_extension("kt"), Language::Kotlin);
/// assert_eq!(Language::from_extension("txt"), Language::Unknown);
/// assert_eq!(Language::Cpp.as_str(), "cpp");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Python,
    TypeScript,
    JavaScript,
    Go,
    Java,
    C,
    Cpp,
    Ruby,
    Php,
    Kotlin,
    Swift,
    Unknown,
}

impl Language {
    /// Detect language from a file extension string (without the dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "rs" => Language::Rust,
            "py" => Language::Python,
            "ts" | "tsx" => Language::TypeScript,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Language::Cpp,
            "rb" => Language::Ruby,
            "php" => Language::Php,
            "kt" | "kts" => Language::Kotlin,
            "swift" => Language::Swift,
            _ => Language::Unknown,
        }
    }

    /// Detect language from a path's extension.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Language::from_extension)
            .unwrap_or(Language::Unknown)
    }

    /// Parse the lowercase name produced by [`Language::as_str`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "rust" => Language::Rust,
            "python" => Language::Python,
            "typescript" => Language::TypeScript,
            "javascript" => Language::JavaScript,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" => Language::C,
            "cpp" => Language::Cpp,
            "ruby" => Language::Ruby,
            "php" => Language::Php,
            "kotlin" => Language::Kotlin,
            "swift" => Language::Swift,
            _ => Language::Unknown,
        }
    }

    /// Lowercase name used in chunk metadata and scope filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Kotlin => "kotlin",
            Language::Swift => "swift",
            Language::Unknown => "unknown",
        }
    }

    /// Get the tree-sitter language grammar for this language.
    ///
    /// Returns `None` for `Language::Unknown`.
    pub fn tree_sitter_language(&self) -> Option<tree_sitter::Language> {
        match self {
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
            Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
            Language::C => Some(tree_sitter_c::LANGUAGE.into()),
            Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
            Language::Ruby => Some(tree_sitter_ruby::LANGUAGE.into()),
            Language::Php => Some(tree_sitter_php::LANGUAGE_PHP.into()),
            Language::Kotlin => Some(tree_sitter_kotlin_ng::LANGUAGE.into()),
            Language::Swift => Some(tree_sitter_swift::LANGUAGE.into()),
            Language::Unknown => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits applied while discovering files.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Files larger than this are skipped.
    pub max_file_size: u64,
    /// Relative-path globs to skip.
    pub exclude: Vec<glob::Pattern>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            exclude: Vec::new(),
        }
    }
}

impl WalkOptions {
    /// Build options from a size limit and exclude globs.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Config`] if an exclude glob is invalid.
    pub fn new(max_file_size: u64, exclude: &[String]) -> Result<Self, CodescopeError> {
        let exclude = exclude
            .iter()
            .map(|g| {
                glob::Pattern::new(g)
                    .map_err(|e| CodescopeError::Config(format!("invalid exclude glob '{g}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            max_file_size,
            exclude,
        })
    }

    fn is_excluded(&self, rel: &str) -> bool {
        self.exclude.iter().any(|p| p.matches(rel))
    }
}

/// Walk a repository, respecting `.gitignore`, returning parseable source files.
///
/// Skips hidden entries, binary files, files over the size limit, excluded
/// paths, and files with unknown extensions. Returned paths are relative to
/// `root`, sorted.
///
/// # Errors
///
/// Returns [`CodescopeError::FileNotFound`] if the root does not exist.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use codescope_syntax::walker::{walk_repo, WalkOptions};
///
/// let files = walk_repo(Path::new("."), &WalkOptions::default()).unwrap();
/// for f in &files {
///     println!("{}: {}", f.path.display(), f.language);
/// }
/// ```
pub fn walk_repo(root: &Path, options: &WalkOptions) -> Result<Vec<SourceFile>, CodescopeError> {
    walk_subtree(root, Path::new(""), options)
}

/// Walk one directory of a repository with the same filters as
/// [`walk_repo`]. Returned paths stay relative to `root`, and ignore files
/// above `dir` still apply.
///
/// # Errors
///
/// Returns [`CodescopeError::FileNotFound`] if the directory does not exist.
pub fn walk_subtree(
    root: &Path,
    dir: &Path,
    options: &WalkOptions,
) -> Result<Vec<SourceFile>, CodescopeError> {
    let start = root.join(dir);
    if !start.exists() {
        return Err(CodescopeError::FileNotFound(start));
    }

    let walker = ignore::WalkBuilder::new(&start).build();
    let mut files = Vec::new();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };

        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        let relative = match entry.path().strip_prefix(root) {
            Ok(r) => r.to_path_buf(),
            Err(_) => continue,
        };

        if let Some(file) = load_file(root, &relative, options) {
            files.push(file);
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(root = %start.display(), files = files.len(), "walked repository");
    Ok(files)
}

/// Load a single file by its root-relative path, applying the same filters
/// as [`walk_repo`].
///
/// Returns `None` for files that would be skipped by a walk, including files
/// that no longer exist.
pub fn read_source(root: &Path, relative: &Path, options: &WalkOptions) -> Option<SourceFile> {
    load_file(root, relative, options)
}

fn load_file(root: &Path, relative: &Path, options: &WalkOptions) -> Option<SourceFile> {
    let rel = normalize_path(relative);
    if options.is_excluded(&rel) {
        return None;
    }

    let language = Language::from_path(relative);
    if language == Language::Unknown {
        return None;
    }

    let path = root.join(relative);
    let metadata = std::fs::metadata(&path).ok()?;
    if !metadata.is_file() || metadata.len() > options.max_file_size {
        return None;
    }

    let content = std::fs::read_to_string(&path).ok()?;

    // Null bytes in the first 8KB mean binary
    let check_len = content.len().min(BINARY_CHECK_SIZE);
    if content.as_bytes()[..check_len].contains(&0) {
        return None;
    }

    Some(SourceFile {
        path: relative.to_path_buf(),
        language,
        content,
    })
}

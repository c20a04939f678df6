//! Source walking, declaration extraction, and call-graph resolution.
//!
//! Uses tree-sitter grammars to find function, method and class-like
//! declarations, resolves each one's symbol name through an ordered list of
//! per-language [`naming::NameStrategy`] values, extracts callee names from
//! call expressions, and links declarations into a petgraph call graph.

pub mod extract;
pub mod graph;
pub mod naming;
pub mod rules;
pub mod walker;

pub use extract::{extract_declarations, Declaration};
pub use graph::{CallGraph, CallSite, MAX_AMBIGUOUS_TARGETS};
pub use naming::NameStrategy;
pub use walker::{read_source, walk_repo, walk_subtree, Language, SourceFile, WalkOptions};

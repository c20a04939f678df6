use codescope_core::{ChunkType, CodescopeError};
use tracing::debug;
use tree_sitter::{Node, Parser};

use crate::naming::{node_text, resolve_name, NameStrategy, IDENTIFIER_KINDS};
use crate::rules::{classify, DeclarationRole};
use crate::walker::{Language, SourceFile};

/// A function, method or class-like declaration found in a source file.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use codescope_core::ChunkType;
/// use codescope_syntax::{extract_declarations, Language, SourceFile};
///
/// let file = SourceFile {
///     path: PathBuf::from("lib.rs"),
///     language: Language::Rust,
///     content: "/// Adds numbers.\nfn add(a: i32, b: i32) -> i32 { sum(a, b) }".into(),
/// };
/// let decls = extract_declarations(&file).unwrap();
/// assert_eq!(decls[0].symbol, "add");
/// assert_eq!(decls[0].chunk_type, ChunkType::Function);
/// assert_eq!(decls[0].signature, "fn add(a: i32, b: i32) -> i32");
/// assert_eq!(decls[0].call_names, vec!["sum"]);
/// assert_eq!(decls[0].doc_lines, vec!["Adds numbers."]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// Resolved symbol name.
    pub symbol: String,
    /// Strategy that produced [`Declaration::symbol`].
    pub name_strategy: NameStrategy,
    pub chunk_type: ChunkType,
    /// tree-sitter node kind of the declaration.
    pub node_kind: String,
    /// Exact source span.
    pub text: String,
    pub start_byte: usize,
    pub end_byte: usize,
    /// 1-indexed, inclusive.
    pub start_line: u32,
    /// 1-indexed, inclusive.
    pub end_line: u32,
    /// Declaration head with whitespace collapsed.
    pub signature: String,
    /// Callee names found in the body, deduplicated in first-seen order.
    pub call_names: Vec<String>,
    /// Leading doc comment (or Python docstring), markers stripped.
    pub doc_lines: Vec<String>,
}

/// Extract all declarations from a source file using tree-sitter.
///
/// Returns an empty vec for files without a grammar. Tree-sitter is
/// error-tolerant, so partial results are returned for files with syntax
/// errors.
///
/// # Errors
///
/// Returns [`CodescopeError::Parse`] if the language grammar cannot be loaded.
pub fn extract_declarations(file: &SourceFile) -> Result<Vec<Declaration>, CodescopeError> {
    let Some(ts_language) = file.language.tree_sitter_language() else {
        return Ok(Vec::new());
    };

    let mut parser = Parser::new();
    parser
        .set_language(&ts_language)
        .map_err(|e| CodescopeError::Parse(format!("failed to set language: {e}")))?;

    let Some(tree) = parser.parse(&file.content, None) else {
        return Err(CodescopeError::Parse(format!(
            "parser produced no tree for {}",
            file.path.display()
        )));
    };

    let mut out = Vec::new();
    let ctx = WalkContext {
        source: file.content.as_bytes(),
        language: file.language,
    };
    collect(&ctx, tree.root_node(), false, false, &mut out);
    debug!(
        file = %file.path.display(),
        language = %file.language,
        declarations = out.len(),
        "extracted declarations"
    );
    Ok(out)
}

struct WalkContext<'a> {
    source: &'a [u8],
    language: Language,
}

fn collect(
    ctx: &WalkContext<'_>,
    node: Node,
    inside_container: bool,
    inside_callable: bool,
    out: &mut Vec<Declaration>,
) {
    let role = classify(ctx.language, &node, inside_callable);

    let (child_container, child_callable) = match role {
        Some(DeclarationRole::Callable) => {
            let chunk_type = if inside_container {
                ChunkType::Method
            } else {
                ChunkType::Function
            };
            out.push(build(ctx, &node, chunk_type));
            (false, true)
        }
        Some(DeclarationRole::Method) => {
            out.push(build(ctx, &node, ChunkType::Method));
            (false, true)
        }
        Some(DeclarationRole::Container) => {
            out.push(build(ctx, &node, ChunkType::Class));
            (true, false)
        }
        Some(DeclarationRole::Scope) => (true, false),
        None => (inside_container, inside_callable),
    };

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect(ctx, child, child_container, child_callable, out);
    }
}

fn build(ctx: &WalkContext<'_>, node: &Node, chunk_type: ChunkType) -> Declaration {
    let (symbol, name_strategy) = resolve_name(node, ctx.source, ctx.language);
    let text = node_text(node, ctx.source);
    let signature = extract_signature(&text, ctx.language);

    let mut call_names = Vec::new();
    collect_calls(node, ctx.source, &mut call_names);
    call_names.retain(|n| n != &symbol);

    Declaration {
        symbol,
        name_strategy,
        chunk_type,
        node_kind: node.kind().to_string(),
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
        signature,
        call_names,
        doc_lines: doc_comment(node, ctx.source, ctx.language),
        text,
    }
}

/// Extract a declaration head: text up to the opening `{`, or the first line
/// for indentation- and keyword-delimited languages.
///
/// # Examples
///
/// ```
/// use codescope_syntax::extract::extract_signature;
/// use codescope_syntax::Language;
///
/// assert_eq!(
///     extract_signature("pub fn run(\n    x: u8,\n) -> u8 {\n    x\n}", Language::Rust),
///     "pub fn run( x: u8, ) -> u8"
/// );
/// assert_eq!(
///     extract_signature("def login(user: str) -> bool:\n    return True", Language::Python),
///     "def login(user: str) -> bool"
/// );
/// ```
pub fn extract_signature(text: &str, language: Language) -> String {
    let head = match language {
        Language::Python | Language::Ruby => {
            let first = text.lines().next().unwrap_or_default();
            first.trim_end().trim_end_matches(':')
        }
        _ => match text.find('{') {
            Some(pos) => &text[..pos],
            None => text.lines().next().unwrap_or_default(),
        },
    };
    let collapsed: String = head.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(300).collect()
}

const CALL_KINDS: &[&str] = &[
    "call_expression",
    "call",
    "method_invocation",
    "function_call_expression",
    "member_call_expression",
    "scoped_call_expression",
    "nullsafe_member_call_expression",
];

const CALLEE_FIELDS: &[&str] = &["function", "method", "name"];

const NAME_FIELDS: &[&str] = &["name", "field", "property", "attribute"];

const IGNORED_CALLEES: &[&str] = &["self", "this", "super"];

fn collect_calls(node: &Node, source: &[u8], names: &mut Vec<String>) {
    if CALL_KINDS.contains(&node.kind()) {
        if let Some(name) = callee_name(node, source) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_calls(&child, source, names);
    }
}

fn callee_name(call: &Node, source: &[u8]) -> Option<String> {
    let callee = CALLEE_FIELDS
        .iter()
        .find_map(|f| call.child_by_field_name(f))
        .or_else(|| call.named_child(0))?;
    let name = rightmost_identifier(&callee, source)?;
    (!IGNORED_CALLEES.contains(&name.as_str())).then_some(name)
}

/// `a.b.c` resolves to `c`; `Foo::bar` to `bar`.
fn rightmost_identifier(node: &Node, source: &[u8]) -> Option<String> {
    if IDENTIFIER_KINDS.contains(&node.kind()) {
        let text = node_text(node, source);
        return (!text.is_empty()).then_some(text);
    }
    for field in NAME_FIELDS {
        if let Some(child) = node.child_by_field_name(field) {
            return rightmost_identifier(&child, source);
        }
    }
    if node.kind() == "generic_function" {
        if let Some(inner) = node.child_by_field_name("function") {
            return rightmost_identifier(&inner, source);
        }
    }
    let count = node.named_child_count();
    (0..count)
        .rev()
        .filter_map(|i| node.named_child(i))
        .find_map(|c| rightmost_identifier(&c, source))
}

fn is_comment(node: &Node) -> bool {
    node.kind().contains("comment")
}

/// Collect the comment block directly above a declaration. Wrappers such as
/// `export` statements and decorators are looked through.
fn doc_comment(node: &Node, source: &[u8], language: Language) -> Vec<String> {
    if language == Language::Python {
        if let Some(doc) = python_docstring(node, source) {
            return doc;
        }
    }

    let mut anchor = *node;
    while let Some(parent) = anchor.parent() {
        if matches!(
            parent.kind(),
            "export_statement" | "decorated_definition" | "template_declaration"
        ) {
            anchor = parent;
        } else {
            break;
        }
    }

    let mut blocks = Vec::new();
    let mut expected_row = anchor.start_position().row;
    let mut current = anchor.prev_sibling();
    while let Some(prev) = current {
        if !is_comment(&prev) || last_row(&prev) + 1 < expected_row {
            break;
        }
        blocks.push(node_text(&prev, source));
        expected_row = prev.start_position().row;
        current = prev.prev_sibling();
    }
    blocks.reverse();

    blocks
        .iter()
        .flat_map(|b| b.lines().map(strip_comment_markers).collect::<Vec<_>>())
        .filter(|l| !l.is_empty())
        .collect()
}

/// Last row holding comment text; some grammars end line comments after the newline.
fn last_row(node: &Node) -> usize {
    let end = node.end_position();
    if end.column == 0 && end.row > node.start_position().row {
        end.row - 1
    } else {
        end.row
    }
}

fn python_docstring(node: &Node, source: &[u8]) -> Option<Vec<String>> {
    let body = node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0)?;
    if string.kind() != "string" {
        return None;
    }
    let text = node_text(&string, source);
    let lines: Vec<String> = text
        .lines()
        .map(|l| {
            l.trim()
                .trim_start_matches("\"\"\"")
                .trim_end_matches("\"\"\"")
                .trim_start_matches("'''")
                .trim_end_matches("'''")
                .trim()
                .to_string()
        })
        .filter(|l| !l.is_empty())
        .collect();
    (!lines.is_empty()).then_some(lines)
}

fn strip_comment_markers(line: &str) -> String {
    let mut l = line.trim();
    for prefix in ["///", "//!", "//", "/**", "/*", "#", "*"] {
        if let Some(rest) = l.strip_prefix(prefix) {
            l = rest;
            break;
        }
    }
    l.trim_end_matches("*/").trim().to_string()
}

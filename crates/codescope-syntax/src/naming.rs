//! Symbol-name resolution for declaration nodes.
//!
//! Each language has an explicit, ordered list of [`NameStrategy`] values.
//! Strategies are tried in order and the first name produced wins. The list
//! always ends in [`NameStrategy::Synthetic`], so resolution never fails.

use std::sync::OnceLock;

use regex::Regex;
use tree_sitter::Node;

use crate::walker::Language;

/// Node kinds that hold a plain name across the supported grammars.
pub const IDENTIFIER_KINDS: &[&str] = &[
    "identifier",
    "simple_identifier",
    "type_identifier",
    "property_identifier",
    "field_identifier",
    "constant",
    "name",
];

const KEYWORDS: &[&str] = &[
    "abstract", "async", "class", "const", "def", "enum", "export", "final", "fn", "fun",
    "func", "function", "interface", "let", "open", "override", "private", "protected", "pub",
    "public", "self", "static", "struct", "super", "this", "trait", "val", "var", "void",
];

/// One way of naming a declaration node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameStrategy {
    /// The node's `name` field, or its first direct identifier-kind child.
    DirectIdentifier,
    /// Grammar-shaped search: C/C++ declarator chains, JS/TS variable
    /// declarators, Go type specs.
    StructuralSearch,
    /// First non-keyword identifier anywhere in the subtree.
    FirstIdentifier,
    /// A declaration-keyword regex over the raw node text.
    RegexMatch,
    /// `<nodeKind>_<byteOffset>`.
    Synthetic,
}

/// The ordered strategies used for `language`.
///
/// # Examples
///
/// ```
/// use codescope_syntax::naming::{strategies_for, NameStrategy};
/// use codescope_syntax::walker::Language;
///
/// let c = strategies_for(Language::C);
/// assert_eq!(c[0], NameStrategy::StructuralSearch);
/// assert_eq!(*c.last().unwrap(), NameStrategy::Synthetic);
/// ```
pub fn strategies_for(language: Language) -> &'static [NameStrategy] {
    use NameStrategy::*;

    match language {
        Language::C | Language::Cpp => &[
            StructuralSearch,
            DirectIdentifier,
            FirstIdentifier,
            RegexMatch,
            Synthetic,
        ],
        Language::JavaScript | Language::TypeScript | Language::Go => &[
            DirectIdentifier,
            StructuralSearch,
            FirstIdentifier,
            RegexMatch,
            Synthetic,
        ],
        Language::Rust
        | Language::Python
        | Language::Java
        | Language::Ruby
        | Language::Php
        | Language::Kotlin
        | Language::Swift => &[DirectIdentifier, FirstIdentifier, RegexMatch, Synthetic],
        Language::Unknown => &[RegexMatch, Synthetic],
    }
}

/// Resolve a name for `node`, returning it with the strategy that produced it.
///
/// # Examples
///
/// ```
/// use codescope_syntax::naming::{resolve_name, NameStrategy};
/// use codescope_syntax::walker::Language;
///
/// let source = "int add(int a, int b) { return a + b; }";
/// let mut parser = tree_sitter::Parser::new();
/// parser.set_language(&Language::C.tree_sitter_language().unwrap()).unwrap();
/// let tree = parser.parse(source, None).unwrap();
/// let func = tree.root_node().child(0).unwrap();
///
/// let (name, strategy) = resolve_name(&func, source.as_bytes(), Language::C);
/// assert_eq!(name, "add");
/// assert_eq!(strategy, NameStrategy::StructuralSearch);
/// ```
pub fn resolve_name(node: &Node, source: &[u8], language: Language) -> (String, NameStrategy) {
    for strategy in strategies_for(language) {
        if let Some(name) = strategy.apply(node, source) {
            return (name, *strategy);
        }
    }
    (synthetic_name(node), NameStrategy::Synthetic)
}

impl NameStrategy {
    /// Run this single strategy.
    pub fn apply(self, node: &Node, source: &[u8]) -> Option<String> {
        match self {
            NameStrategy::DirectIdentifier => direct_identifier(node, source),
            NameStrategy::StructuralSearch => structural_search(node, source),
            NameStrategy::FirstIdentifier => first_identifier(node, source),
            NameStrategy::RegexMatch => regex_match(node, source),
            NameStrategy::Synthetic => Some(synthetic_name(node)),
        }
    }
}

fn direct_identifier(node: &Node, source: &[u8]) -> Option<String> {
    if let Some(name) = node.child_by_field_name("name") {
        if let Some(text) = identifier_text(&name, source) {
            return Some(text);
        }
    }
    let mut cursor = node.walk();
    let found = node
        .named_children(&mut cursor)
        .filter(|c| IDENTIFIER_KINDS.contains(&c.kind()))
        .find_map(|c| identifier_text(&c, source));
    found
}

fn structural_search(node: &Node, source: &[u8]) -> Option<String> {
    if let Some(declarator) = node.child_by_field_name("declarator") {
        return declarator_name(&declarator, source);
    }
    let mut cursor = node.walk();
    let found = node
        .named_children(&mut cursor)
        .filter(|c| matches!(c.kind(), "variable_declarator" | "type_spec"))
        .find_map(|c| {
            c.child_by_field_name("name")
                .and_then(|n| identifier_text(&n, source))
        });
    found
}

/// Follow a C/C++ declarator chain down to the declared name.
fn declarator_name(node: &Node, source: &[u8]) -> Option<String> {
    match node.kind() {
        "identifier" | "field_identifier" | "type_identifier" => identifier_text(node, source),
        "destructor_name" | "operator_name" => {
            let text = node_text(node, source);
            (!text.is_empty()).then_some(text)
        }
        "qualified_identifier" => node
            .child_by_field_name("name")
            .and_then(|n| declarator_name(&n, source)),
        _ => node
            .child_by_field_name("declarator")
            .and_then(|d| declarator_name(&d, source)),
    }
}

fn first_identifier(node: &Node, source: &[u8]) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if IDENTIFIER_KINDS.contains(&child.kind()) {
            if let Some(text) = identifier_text(&child, source) {
                if !KEYWORDS.contains(&text.as_str()) {
                    return Some(text);
                }
            }
        }
        if let Some(found) = first_identifier(&child, source) {
            return Some(found);
        }
    }
    None
}

fn declaration_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(?:fn|def|function|func|fun|class|struct|enum|trait|interface|module|protocol|object)\s+([A-Za-z_$][A-Za-z0-9_$]*)",
        )
        .ok()
    })
    .as_ref()
}

fn regex_match(node: &Node, source: &[u8]) -> Option<String> {
    let text = node_text(node, source);
    let head: String = text.chars().take(400).collect();
    declaration_regex()?
        .captures(&head)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn synthetic_name(node: &Node) -> String {
    format!("{}_{}", node.kind(), node.start_byte())
}

fn identifier_text(node: &Node, source: &[u8]) -> Option<String> {
    let text = node_text(node, source);
    is_identifier_like(&text).then_some(text)
}

fn is_identifier_like(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '?' || c == '!')
}

pub(crate) fn node_text(node: &Node, source: &[u8]) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    if start >= source.len() || end > source.len() {
        return String::new();
    }
    String::from_utf8_lossy(&source[start..end]).to_string()
}

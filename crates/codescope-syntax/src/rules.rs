//! Per-language declaration rules: which tree-sitter node kinds become chunks.

use tree_sitter::Node;

use crate::walker::Language;

/// How a matched node participates in chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationRole {
    /// Function-like. Indexed as a method when nested in a container.
    Callable,
    /// Always indexed as a method.
    Method,
    /// Class-like. Indexed as a class; callables inside it become methods.
    Container,
    /// Makes nested callables methods without being indexed itself.
    Scope,
}

/// Classify `node` for `language`.
///
/// `inside_callable` suppresses rules that only make sense at declaration
/// level, such as JavaScript arrow functions bound to a local `const`.
///
/// # Examples
///
/// ```
/// use codescope_syntax::rules::{classify, DeclarationRole};
/// use codescope_syntax::walker::Language;
///
/// let mut parser = tree_sitter::Parser::new();
/// parser.set_language(&Language::Rust.tree_sitter_language().unwrap()).unwrap();
/// let tree = parser.parse("struct Point { x: i32 }", None).unwrap();
/// let item = tree.root_node().child(0).unwrap();
/// assert_eq!(classify(Language::Rust, &item, false), Some(DeclarationRole::Container));
/// ```
pub fn classify(language: Language, node: &Node, inside_callable: bool) -> Option<DeclarationRole> {
    use DeclarationRole::*;

    let kind = node.kind();
    match language {
        Language::Rust => match kind {
            "function_item" => Some(Callable),
            "struct_item" | "enum_item" | "union_item" | "trait_item" => Some(Container),
            "impl_item" => Some(Scope),
            _ => None,
        },
        Language::Python => match kind {
            "function_definition" => Some(Callable),
            "class_definition" => Some(Container),
            _ => None,
        },
        Language::JavaScript | Language::TypeScript => match kind {
            "function_declaration" | "generator_function_declaration" => Some(Callable),
            "method_definition" => Some(Method),
            "class_declaration"
            | "abstract_class_declaration"
            | "interface_declaration"
            | "enum_declaration" => Some(Container),
            "lexical_declaration" | "variable_declaration"
                if !inside_callable && binds_function(node) =>
            {
                Some(Callable)
            }
            _ => None,
        },
        Language::Go => match kind {
            "function_declaration" => Some(Callable),
            "method_declaration" => Some(Method),
            "type_declaration" if declares_struct_or_interface(node) => Some(Container),
            _ => None,
        },
        Language::Java => match kind {
            "method_declaration" | "constructor_declaration" => Some(Callable),
            "class_declaration"
            | "interface_declaration"
            | "enum_declaration"
            | "record_declaration" => Some(Container),
            _ => None,
        },
        Language::C => match kind {
            "function_definition" => Some(Callable),
            "struct_specifier" | "enum_specifier" | "union_specifier" if has_body(node) => {
                Some(Container)
            }
            _ => None,
        },
        Language::Cpp => match kind {
            "function_definition" => Some(Callable),
            "class_specifier" | "struct_specifier" | "enum_specifier" | "union_specifier"
                if has_body(node) =>
            {
                Some(Container)
            }
            _ => None,
        },
        Language::Ruby => match kind {
            "method" => Some(Callable),
            "singleton_method" => Some(Method),
            "class" | "module" => Some(Container),
            _ => None,
        },
        Language::Php => match kind {
            "function_definition" => Some(Callable),
            "method_declaration" => Some(Method),
            "class_declaration"
            | "interface_declaration"
            | "trait_declaration"
            | "enum_declaration" => Some(Container),
            _ => None,
        },
        Language::Kotlin => match kind {
            "function_declaration" => Some(Callable),
            "class_declaration" | "object_declaration" | "interface_declaration" => {
                Some(Container)
            }
            _ => None,
        },
        Language::Swift => match kind {
            "function_declaration" => Some(Callable),
            "class_declaration" | "protocol_declaration" => Some(Container),
            _ => None,
        },
        Language::Unknown => None,
    }
}

/// `const f = () => {}` or `var f = function () {}`.
fn binds_function(node: &Node) -> bool {
    let mut cursor = node.walk();
    let result = node.named_children(&mut cursor).any(|child| {
        child.kind() == "variable_declarator"
            && child
                .child_by_field_name("value")
                .map(|v| {
                    matches!(
                        v.kind(),
                        "arrow_function" | "function_expression" | "function"
                    )
                })
                .unwrap_or(false)
    });
    result
}

fn declares_struct_or_interface(node: &Node) -> bool {
    let mut cursor = node.walk();
    let result = node.named_children(&mut cursor).any(|spec| {
        spec.kind() == "type_spec"
            && spec
                .child_by_field_name("type")
                .map(|t| matches!(t.kind(), "struct_type" | "interface_type"))
                .unwrap_or(false)
    });
    result
}

/// Struct references like `struct foo *p;` carry no body and are not declarations.
fn has_body(node: &Node) -> bool {
    node.child_by_field_name("body").is_some()
}

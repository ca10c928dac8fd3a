//! Tree-sitter parsing for the supported languages.
//!
//! This module provides:
//! - `parse`: source text to a [`ParsedFile`] using the right grammar
//! - `function_spans`: named function extents, shared by the ignore resolver
//!   (function-scope directives) and by AST-based rules

use std::path::Path;

use tree_sitter::{Node, Parser as TsParser};

use crate::language::Language;

/// A parsed tree-sitter tree and the language it was parsed as.
pub struct ParsedFile {
    /// The tree-sitter parse tree.
    pub tree: tree_sitter::Tree,
    pub language: Language,
}

impl ParsedFile {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }
}

/// Extent of one function-like declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpan {
    /// Declared name, or `<anonymous>`.
    pub name: String,
    /// First line of the declaration including decorators (1-indexed).
    pub header_line: usize,
    /// Line of the `def` / `function` keyword (1-indexed).
    pub start_line: usize,
    /// Last line of the body (1-indexed).
    pub end_line: usize,
}

impl FunctionSpan {
    pub fn contains(&self, line: usize) -> bool {
        line >= self.header_line && line <= self.end_line
    }

    fn len(&self) -> usize {
        self.end_line - self.header_line
    }
}

/// Name used for functions without a resolvable name.
pub const ANONYMOUS: &str = "<anonymous>";

/// Tree-sitter grammar for a language. `.tsx` files need the TSX dialect.
pub fn grammar(language: Language, path: &Path) -> tree_sitter::Language {
    match language {
        Language::Python => tree_sitter_python::LANGUAGE.into(),
        Language::TypeScript => {
            let is_tsx = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("tsx"))
                .unwrap_or(false);
            if is_tsx {
                tree_sitter_typescript::LANGUAGE_TSX.into()
            } else {
                tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
            }
        }
        Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
    }
}

/// Parse source code into a tree.
///
/// Syntax errors do not fail the parse; they show up as ERROR nodes.
pub fn parse(language: Language, path: &Path, source: &str) -> anyhow::Result<ParsedFile> {
    let mut parser = TsParser::new();
    parser.set_language(&grammar(language, path))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| anyhow::anyhow!("failed to parse {}", path.display()))?;
    Ok(ParsedFile { tree, language })
}

/// Whether a node kind introduces a new function scope.
pub fn is_function_kind(language: Language, kind: &str) -> bool {
    match language {
        Language::Python => matches!(kind, "function_definition" | "lambda"),
        Language::TypeScript | Language::JavaScript => matches!(
            kind,
            "function_declaration"
                | "generator_function_declaration"
                | "function_expression"
                | "generator_function"
                | "arrow_function"
                | "method_definition"
        ),
    }
}

/// Resolve the name of a function node, looking at the binding it is
/// assigned to when the node itself is anonymous.
pub fn function_name(node: Node, source: &str) -> String {
    let text = |n: Node| n.utf8_text(source.as_bytes()).unwrap_or("").to_string();

    if let Some(name) = node.child_by_field_name("name") {
        return text(name);
    }

    if let Some(parent) = node.parent() {
        let binding = match parent.kind() {
            "variable_declarator" | "public_field_definition" | "field_definition" => {
                parent.child_by_field_name("name")
            }
            "pair" => parent.child_by_field_name("key"),
            "assignment_expression" | "assignment" => parent.child_by_field_name("left"),
            _ => None,
        };
        if let Some(b) = binding {
            return text(b);
        }
    }

    ANONYMOUS.to_string()
}

/// Collect every function span in the file, in source order.
pub fn function_spans(parsed: &ParsedFile, source: &str) -> Vec<FunctionSpan> {
    let mut spans = Vec::new();
    collect_functions(parsed.root(), parsed.language, source, &mut spans);
    spans.sort_by_key(|s| (s.header_line, s.start_line, s.end_line));
    spans
}

fn collect_functions(node: Node, language: Language, source: &str, out: &mut Vec<FunctionSpan>) {
    // Python lambdas are expressions; they never carry directives.
    if is_function_kind(language, node.kind()) && node.kind() != "lambda" {
        let start_line = node.start_position().row + 1;
        let header_line = node
            .parent()
            .filter(|p| p.kind() == "decorated_definition")
            .map(|p| p.start_position().row + 1)
            .unwrap_or(start_line);

        out.push(FunctionSpan {
            name: function_name(node, source),
            header_line,
            start_line,
            end_line: node.end_position().row + 1,
        });
    }

    for child in node.children(&mut node.walk()) {
        collect_functions(child, language, source, out);
    }
}

/// Innermost-first list of functions containing `line`.
pub fn enclosing_functions(spans: &[FunctionSpan], line: usize) -> Vec<&FunctionSpan> {
    let mut found: Vec<&FunctionSpan> = spans.iter().filter(|s| s.contains(line)).collect();
    found.sort_by_key(|s| s.len());
    found
}

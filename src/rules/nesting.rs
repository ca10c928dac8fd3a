//! Excessive control-flow nesting inside a function.

use tree_sitter::Node;

use super::{Rule, RuleDescriptor};
use crate::context::Context;
use crate::language::Language;
use crate::parser::{self, ParsedFile};
use crate::violation::Violation;

pub const RULE_ID: &str = "nesting.excessive-depth";

/// Deepest nesting allowed before a function is reported.
pub const DEFAULT_MAX_DEPTH: usize = 4;

pub const DESCRIPTOR: RuleDescriptor = RuleDescriptor::new(module_path!(), build);

fn build() -> Box<dyn Rule> {
    Box::new(ExcessiveNesting)
}

pub struct ExcessiveNesting;

/// Node kinds that open a nested block.
fn is_block_kind(language: Language, kind: &str) -> bool {
    match language {
        Language::Python => matches!(
            kind,
            "if_statement"
                | "for_statement"
                | "while_statement"
                | "try_statement"
                | "with_statement"
                | "match_statement"
        ),
        Language::TypeScript | Language::JavaScript => matches!(
            kind,
            "if_statement"
                | "for_statement"
                | "for_in_statement"
                | "while_statement"
                | "do_statement"
                | "try_statement"
                | "switch_statement"
                | "with_statement"
        ),
    }
}

/// `else if` chains read as one level, not a staircase.
fn is_else_if(node: Node) -> bool {
    node.kind() == "if_statement"
        && node
            .parent()
            .map(|p| p.kind() == "else_clause")
            .unwrap_or(false)
}

/// Deepest block nesting under `node`, not descending into nested
/// functions (they are measured on their own).
fn max_depth(node: Node, language: Language, depth: usize) -> usize {
    let mut deepest = depth;
    for child in node.children(&mut node.walk()) {
        if parser::is_function_kind(language, child.kind()) {
            continue;
        }
        let child_depth = if is_block_kind(language, child.kind()) && !is_else_if(child) {
            depth + 1
        } else {
            depth
        };
        deepest = deepest.max(max_depth(child, language, child_depth));
    }
    deepest
}

struct Finding {
    name: String,
    line: usize,
    column: usize,
    depth: usize,
}

fn collect(node: Node, parsed: &ParsedFile, source: &str, out: &mut Vec<Finding>) {
    if parser::is_function_kind(parsed.language, node.kind()) {
        out.push(Finding {
            name: parser::function_name(node, source),
            line: node.start_position().row + 1,
            column: node.start_position().column + 1,
            depth: max_depth(node, parsed.language, 0),
        });
    }
    for child in node.children(&mut node.walk()) {
        collect(child, parsed, source, out);
    }
}

impl Rule for ExcessiveNesting {
    fn rule_id(&self) -> &str {
        RULE_ID
    }

    fn applicable_languages(&self) -> &[Language] {
        Language::ALL
    }

    fn description(&self) -> &str {
        "Functions whose control flow nests deeper than max_depth"
    }

    fn check(&self, ctx: &Context) -> anyhow::Result<Vec<Violation>> {
        let max = ctx
            .config_for(RULE_ID)
            .get_usize("max_depth", DEFAULT_MAX_DEPTH);
        let parsed = ctx.ast()?;

        let mut findings = Vec::new();
        collect(parsed.root(), parsed, ctx.raw_content(), &mut findings);

        Ok(findings
            .into_iter()
            .filter(|f| f.depth > max)
            .map(|f| {
                Violation::new(
                    RULE_ID,
                    ctx.file_path(),
                    f.line,
                    format!(
                        "Function '{}' nests control flow {} levels deep (max {})",
                        f.name, f.depth, max
                    ),
                )
                .with_column(f.column)
                .with_suggestion("Extract inner blocks into helpers or return early")
            })
            .collect())
    }
}

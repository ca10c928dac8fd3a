//! Parsing of ignore directives.
//!
//! Inline comments:
//! - `# layerlint: ignore[rule, rule] -- reason` (this line, or the next
//!   line when the comment stands alone)
//! - `// layerlint: ignore-next-line[rule]`
//! - `// layerlint: ignore-file[rule]`
//! - `# layerlint: ignore-function[rule]` (the function declared next, or
//!   the innermost function containing the comment)
//!
//! Omitting the bracket list means every rule. `.layerlintignore` files hold
//! one rule pattern per line; a leading `!` re-enables the rule.

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::RulePattern;
use crate::error::DirectiveParseError;
use crate::language::Language;
use crate::rules::tokens;

/// Scope a directive governs, narrowest last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IgnoreScope {
    Repo,
    Directory,
    File,
    Function,
    Line,
}

impl std::fmt::Display for IgnoreScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IgnoreScope::Repo => "repo",
            IgnoreScope::Directory => "directory",
            IgnoreScope::File => "file",
            IgnoreScope::Function => "function",
            IgnoreScope::Line => "line",
        };
        write!(f, "{}", s)
    }
}

/// Outcome a directive asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Ignore,
    Enforce,
}

/// One pattern with its verdict, as held at a single scope location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedPattern {
    pub pattern: RulePattern,
    pub verdict: Verdict,
}

impl ScopedPattern {
    pub fn ignore(pattern: RulePattern) -> Self {
        Self {
            pattern,
            verdict: Verdict::Ignore,
        }
    }

    /// Parse `pattern` or `!pattern`.
    pub fn parse(text: &str) -> Result<Self, super::InvalidPattern> {
        let text = text.trim();
        match text.strip_prefix('!') {
            Some(rest) => Ok(Self {
                pattern: RulePattern::parse(rest)?,
                verdict: Verdict::Enforce,
            }),
            None => Ok(Self::ignore(RulePattern::parse(text)?)),
        }
    }
}

/// Kind of inline directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineKind {
    /// Applies to `target_line`.
    Line,
    File,
    Function,
}

/// A parsed inline directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineDirective {
    pub kind: InlineKind,
    pub patterns: Vec<RulePattern>,
    /// Line holding the comment (1-indexed).
    pub line: usize,
    /// Line the directive applies to (for `Line` directives).
    pub target_line: usize,
    pub reason: Option<String>,
}

lazy_static::lazy_static! {
    /// A comment that carries the directive marker.
    static ref PYTHON_MARKER: Regex = Regex::new(r"#\s*layerlint\s*:(.*)$").unwrap();
    static ref SLASH_MARKER: Regex =
        Regex::new(r"(?://|/\*)\s*layerlint\s*:(.*?)(?:\*/\s*)?$").unwrap();
    /// `kind[list] -- reason` after the marker.
    static ref DIRECTIVE_BODY: Regex = Regex::new(
        r"^\s*([A-Za-z][A-Za-z-]*)\s*(\[[^\]]*\]?)?\s*(?:--\s*(.*?))?\s*$"
    ).unwrap();
}

fn marker_for(language: Language) -> &'static Regex {
    match language {
        Language::Python => &*PYTHON_MARKER,
        Language::TypeScript | Language::JavaScript => &*SLASH_MARKER,
    }
}

/// Parse inline directives from file content.
///
/// Only real comments count: a marker inside a string literal or docstring
/// is plain text. Malformed directives are returned as errors and otherwise
/// ignored, so a typo never suppresses anything.
pub fn parse_inline(
    file_path: &str,
    content: &str,
    language: Language,
) -> (Vec<InlineDirective>, Vec<DirectiveParseError>) {
    let marker = marker_for(language);
    let mut directives = Vec::new();
    let mut errors = Vec::new();

    for comment in tokens::comments(content, language) {
        let line_number = comment.line;
        let Some(caps) = marker.captures(&comment.text) else {
            continue;
        };
        let body = caps.get(1).map(|m| m.as_str()).unwrap_or("");

        match parse_body(body) {
            Ok((kind, patterns, reason)) => {
                let (kind, target_line) = match kind.as_str() {
                    "ignore" if comment.trailing => (InlineKind::Line, line_number),
                    "ignore" => (InlineKind::Line, line_number + 1),
                    "ignore-next-line" => (InlineKind::Line, line_number + 1),
                    "ignore-file" => (InlineKind::File, line_number),
                    "ignore-function" => (InlineKind::Function, line_number),
                    other => {
                        errors.push(DirectiveParseError {
                            file_path: file_path.to_string(),
                            line: line_number,
                            message: format!("unknown layerlint directive {:?}", other),
                        });
                        continue;
                    }
                };
                directives.push(InlineDirective {
                    kind,
                    patterns,
                    line: line_number,
                    target_line,
                    reason,
                });
            }
            Err(message) => errors.push(DirectiveParseError {
                file_path: file_path.to_string(),
                line: line_number,
                message,
            }),
        }
    }

    (directives, errors)
}

type ParsedBody = (String, Vec<RulePattern>, Option<String>);

fn parse_body(body: &str) -> Result<ParsedBody, String> {
    let caps = DIRECTIVE_BODY
        .captures(body)
        .ok_or_else(|| format!("malformed layerlint directive {:?}", body.trim()))?;

    let kind = caps
        .get(1)
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_default();
    let reason = caps
        .get(3)
        .map(|m| m.as_str().trim().to_string())
        .filter(|r| !r.is_empty());

    let patterns = match caps.get(2).map(|m| m.as_str()) {
        None => vec![RulePattern::Any],
        Some(list) => {
            let inner = list
                .strip_prefix('[')
                .and_then(|l| l.strip_suffix(']'))
                .ok_or_else(|| format!("unclosed rule list in {:?}", body.trim()))?;
            let mut patterns = Vec::new();
            for item in inner.split(',') {
                let pattern = RulePattern::parse(item).map_err(|e| e.to_string())?;
                patterns.push(pattern);
            }
            patterns
        }
    };

    Ok((kind, patterns, reason))
}

/// Parse a `.layerlintignore` file.
pub fn parse_ignore_file(
    file_path: &str,
    content: &str,
) -> (Vec<ScopedPattern>, Vec<DirectiveParseError>) {
    let mut patterns = Vec::new();
    let mut errors = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        match ScopedPattern::parse(line) {
            Ok(p) => patterns.push(p),
            Err(e) => errors.push(DirectiveParseError {
                file_path: file_path.to_string(),
                line: idx + 1,
                message: e.to_string(),
            }),
        }
    }

    (patterns, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(s: &str) -> RulePattern {
        RulePattern::parse(s).unwrap()
    }

    #[test]
    fn test_parse_python_directives() {
        let content = r#"# layerlint: ignore-file[dry]
import os

def handler(x):  # layerlint: ignore[nesting.excessive-depth] -- legacy
    pass

# layerlint: ignore-next-line[magic, stringly-typed]
VALUE = 42
"#;
        let (directives, errors) = parse_inline("a.py", content, Language::Python);
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(directives.len(), 3);

        assert_eq!(directives[0].kind, InlineKind::File);
        assert_eq!(directives[0].patterns, vec![pat("dry")]);

        // Trailing comment applies to its own line.
        assert_eq!(directives[1].kind, InlineKind::Line);
        assert_eq!(directives[1].target_line, 4);
        assert_eq!(directives[1].reason.as_deref(), Some("legacy"));

        assert_eq!(directives[2].target_line, 8);
        assert_eq!(directives[2].patterns.len(), 2);
    }

    #[test]
    fn test_standalone_ignore_applies_to_next_line() {
        let content = "// layerlint: ignore[nesting]\nif (a) {}\n";
        let (directives, _) = parse_inline("a.ts", content, Language::TypeScript);
        assert_eq!(directives[0].target_line, 2);
    }

    #[test]
    fn test_bare_directive_means_all_rules() {
        let content = "x = 1  # layerlint: ignore\n";
        let (directives, _) = parse_inline("a.py", content, Language::Python);
        assert_eq!(directives[0].patterns, vec![RulePattern::Any]);
    }

    #[test]
    fn test_block_comment_directive() {
        let content = "/* layerlint: ignore-function[nesting] */\nfunction f() {}\n";
        let (directives, errors) = parse_inline("a.js", content, Language::JavaScript);
        assert!(errors.is_empty());
        assert_eq!(directives[0].kind, InlineKind::Function);
        assert_eq!(directives[0].patterns, vec![pat("nesting")]);
    }

    #[test]
    fn test_malformed_directives_fail_open() {
        let content = r#"a = 1  # layerlint: ignroe[nesting]
b = 2  # layerlint: ignore[nesting
c = 3  # layerlint: ignore[]
d = 4  # layerlint: ignore[nest ing]
"#;
        let (directives, errors) = parse_inline("a.py", content, Language::Python);
        assert!(directives.is_empty());
        assert_eq!(errors.len(), 4);
        assert_eq!(errors[0].line, 1);
        assert!(errors[0].message.contains("unknown"));
        assert!(errors[1].message.contains("unclosed"));
    }

    #[test]
    fn test_comment_style_follows_language() {
        // A `#` marker means nothing in TypeScript.
        let (directives, errors) =
            parse_inline("a.ts", "# layerlint: ignore\n", Language::TypeScript);
        assert!(directives.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_marker_in_docstring_is_not_a_directive() {
        let content = r##""""Usage:

    # layerlint: ignore-file
"""

def f():
    return "# layerlint: ignore[nesting]"
"##;
        let (directives, errors) = parse_inline("a.py", content, Language::Python);
        assert!(directives.is_empty(), "{:?}", directives);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_marker_in_template_literal_is_not_a_directive() {
        let content = "const doc = `\n// layerlint: ignore-file\n`;\nconst s = '/* layerlint: ignore */';\nlet x = 1; // layerlint: ignore[nesting]\n";
        let (directives, errors) = parse_inline("a.ts", content, Language::TypeScript);
        assert!(errors.is_empty());
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].line, 5);
        assert_eq!(directives[0].target_line, 5);
    }

    #[test]
    fn test_parse_ignore_file() {
        let content = "# legacy code\nnesting\n!nesting.excessive-depth  # keep this one\n\nbad pattern\n";
        let (patterns, errors) = parse_ignore_file("src/.layerlintignore", content);
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0].verdict, Verdict::Ignore);
        assert_eq!(patterns[1].verdict, Verdict::Enforce);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 5);
    }
}

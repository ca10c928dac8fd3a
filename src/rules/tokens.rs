//! A small lexical scanner shared by the text-based rules.
//!
//! Not a full lexer: it knows enough about comments and string literals to
//! tell code from non-code, which is all duplicate detection and directive
//! discovery need.

use std::collections::HashSet;

use crate::language::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Keyword,
    Number,
    Str,
    Punct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Line the token starts on (1-indexed).
    pub line: usize,
}

/// A comment as it appears in source, delimiters included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub text: String,
    /// Line the comment starts on (1-indexed).
    pub line: usize,
    /// Whether code precedes the comment on its first line.
    pub trailing: bool,
}

/// One line of code reduced to its normalized token sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedLine {
    pub line: usize,
    pub text: String,
    pub tokens: usize,
}

/// Stand-in for every identifier in normalized text.
pub const IDENT_PLACEHOLDER: &str = "$id";

lazy_static::lazy_static! {
    static ref PYTHON_KEYWORDS: HashSet<&'static str> = [
        "False", "None", "True", "and", "as", "assert", "async", "await", "break",
        "case", "class", "continue", "def", "del", "elif", "else", "except",
        "finally", "for", "from", "global", "if", "import", "in", "is", "lambda",
        "match", "nonlocal", "not", "or", "pass", "raise", "return", "try",
        "while", "with", "yield",
    ]
    .into_iter()
    .collect();

    static ref SCRIPT_KEYWORDS: HashSet<&'static str> = [
        "async", "await", "break", "case", "catch", "class", "const", "continue",
        "debugger", "default", "delete", "do", "else", "enum", "export", "extends",
        "false", "finally", "for", "function", "if", "implements", "import", "in",
        "instanceof", "interface", "let", "new", "null", "of", "private",
        "protected", "public", "readonly", "return", "static", "super", "switch",
        "this", "throw", "true", "try", "type", "typeof", "undefined", "var",
        "void", "while", "with", "yield",
    ]
    .into_iter()
    .collect();
}

pub fn is_keyword(language: Language, word: &str) -> bool {
    match language {
        Language::Python => PYTHON_KEYWORDS.contains(word),
        Language::TypeScript | Language::JavaScript => SCRIPT_KEYWORDS.contains(word),
    }
}

const PYTHON_STRING_PREFIXES: &[&str] = &["r", "b", "f", "u", "rb", "br", "fr", "rf"];

/// Scan source into tokens, dropping comments and whitespace.
pub fn tokenize(content: &str, language: Language) -> Vec<Token> {
    scan(content, language).0
}

/// Every real comment in source. Comment markers inside string literals,
/// docstrings and template literals are not comments.
pub fn comments(content: &str, language: Language) -> Vec<Comment> {
    scan(content, language).1
}

fn scan(content: &str, language: Language) -> (Vec<Token>, Vec<Comment>) {
    let chars: Vec<char> = content.chars().collect();
    let mut tokens = Vec::new();
    let mut comments = Vec::new();
    let mut line = 1;
    let mut code_on_line = false;
    let mut i = 0;

    let is_python = language == Language::Python;

    while i < chars.len() {
        let c = chars[i];

        if c == '\n' {
            line += 1;
            code_on_line = false;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Comments
        let line_comment =
            (is_python && c == '#') || (!is_python && c == '/' && chars.get(i + 1) == Some(&'/'));
        if line_comment {
            let start = i;
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            comments.push(Comment {
                text: chars[start..i].iter().collect(),
                line,
                trailing: code_on_line,
            });
            continue;
        }
        if !is_python && c == '/' && chars.get(i + 1) == Some(&'*') {
            let start = i;
            let start_line = line;
            let trailing = code_on_line;
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                if chars[i] == '\n' {
                    line += 1;
                    code_on_line = false;
                }
                i += 1;
            }
            i = (i + 2).min(chars.len());
            comments.push(Comment {
                text: chars[start..i].iter().collect(),
                line: start_line,
                trailing,
            });
            continue;
        }

        code_on_line = true;

        if is_quote(c, language) {
            let start_line = line;
            let (end, newlines) = scan_string(&chars, i, language);
            tokens.push(Token {
                kind: TokenKind::Str,
                text: chars[i..end].iter().collect(),
                line: start_line,
            });
            line += newlines;
            i = end;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.' || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Number,
                text: chars[start..i].iter().collect(),
                line,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();

            // Prefixed Python strings such as f"..." or rb'...'.
            let prefixed = is_python
                && i < chars.len()
                && is_quote(chars[i], language)
                && PYTHON_STRING_PREFIXES.contains(&word.to_ascii_lowercase().as_str());
            if prefixed {
                let start_line = line;
                let (end, newlines) = scan_string(&chars, i, language);
                tokens.push(Token {
                    kind: TokenKind::Str,
                    text: chars[start..end].iter().collect(),
                    line: start_line,
                });
                line += newlines;
                i = end;
                continue;
            }

            let kind = if is_keyword(language, &word) {
                TokenKind::Keyword
            } else {
                TokenKind::Identifier
            };
            tokens.push(Token {
                kind,
                text: word,
                line,
            });
            continue;
        }

        tokens.push(Token {
            kind: TokenKind::Punct,
            text: c.to_string(),
            line,
        });
        i += 1;
    }

    (tokens, comments)
}

fn is_quote(c: char, language: Language) -> bool {
    match language {
        Language::Python => c == '"' || c == '\'',
        Language::TypeScript | Language::JavaScript => c == '"' || c == '\'' || c == '`',
    }
}

/// Scan a string literal starting at `start` (the opening quote). Returns
/// the index just past the literal and the number of newlines inside it.
fn scan_string(chars: &[char], start: usize, language: Language) -> (usize, usize) {
    let quote = chars[start];
    let triple = language == Language::Python
        && chars.get(start + 1) == Some(&quote)
        && chars.get(start + 2) == Some(&quote);
    let multiline = triple || quote == '`';

    let mut i = if triple { start + 3 } else { start + 1 };
    let mut newlines = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            if chars.get(i + 1) == Some(&'\n') {
                newlines += 1;
            }
            i += 2;
            continue;
        }
        if c == '\n' {
            if !multiline {
                // Unterminated single-line string ends at the line break.
                return (i, newlines);
            }
            newlines += 1;
        }
        if c == quote {
            if !triple {
                return (i + 1, newlines);
            }
            if chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote) {
                return (i + 3, newlines);
            }
        }
        i += 1;
    }
    (chars.len(), newlines)
}

/// Whether a line's tokens form an import statement.
fn is_import_line(language: Language, tokens: &[&Token]) -> bool {
    let first = match tokens.first() {
        Some(t) => t.text.as_str(),
        None => return false,
    };
    match language {
        Language::Python => first == "import" || first == "from",
        Language::TypeScript | Language::JavaScript => {
            first == "import"
                || (first == "export" && tokens.iter().any(|t| t.text == "from"))
                || tokens.windows(2).any(|w| w[0].text == "require" && w[1].text == "(")
        }
    }
}

/// Normalize code for duplicate detection: comments, blank lines and import
/// lines are dropped; identifiers become a placeholder; keywords, literals
/// and punctuation are kept.
pub fn normalized_lines(content: &str, language: Language) -> Vec<NormalizedLine> {
    let tokens = tokenize(content, language);
    let mut lines = Vec::new();

    let mut start = 0;
    while start < tokens.len() {
        let line = tokens[start].line;
        let mut end = start;
        while end < tokens.len() && tokens[end].line == line {
            end += 1;
        }
        let group: Vec<&Token> = tokens[start..end].iter().collect();
        start = end;

        if is_import_line(language, &group) {
            continue;
        }
        let text = group
            .iter()
            .map(|t| match t.kind {
                TokenKind::Identifier => IDENT_PLACEHOLDER,
                _ => t.text.as_str(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        lines.push(NormalizedLine {
            line,
            text,
            tokens: group.len(),
        });
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_python_comments_and_strings() {
        let src = "x = 'a # not a comment'  # real comment\ny = f\"{x}\"\n";
        let tokens = tokenize(src, Language::Python);
        assert_eq!(texts(&tokens), vec!["x", "=", "'a # not a comment'", "y", "=", "f\"{x}\""]);
        assert_eq!(tokens[3].line, 2);
        assert_eq!(tokens[5].kind, TokenKind::Str);
    }

    #[test]
    fn test_triple_quoted_string_spans_lines() {
        let src = "def f():\n    \"\"\"Doc\n    more\n    \"\"\"\n    return 1\n";
        let tokens = tokenize(src, Language::Python);
        let ret = tokens.iter().find(|t| t.text == "return").unwrap();
        assert_eq!(ret.line, 5);
        assert_eq!(ret.kind, TokenKind::Keyword);
    }

    #[test]
    fn test_block_comments_in_typescript() {
        let src = "/* header\n spans */\nconst a = 1; // trailing\n";
        let tokens = tokenize(src, Language::TypeScript);
        assert_eq!(texts(&tokens), vec!["const", "a", "=", "1", ";"]);
        assert_eq!(tokens[0].line, 3);
    }

    #[test]
    fn test_comments_skip_string_contents() {
        let src = "\"\"\"Module doc.\n\n    # not a comment\n\"\"\"\nx = '# nor this'  # real\n# standalone\n";
        let found = comments(src, Language::Python);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].text, "# real");
        assert_eq!(found[0].line, 5);
        assert!(found[0].trailing);
        assert_eq!(found[1].line, 6);
        assert!(!found[1].trailing);
    }

    #[test]
    fn test_comments_in_script_languages() {
        let src = "const t = `\n// inside template\n`;\n/* block\n spans */ let a = 1; // tail\n";
        let found = comments(src, Language::TypeScript);
        let texts: Vec<&str> = found.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["/* block\n spans */", "// tail"]);
        assert_eq!(found[0].line, 4);
        assert!(!found[0].trailing);
        assert_eq!(found[1].line, 5);
        assert!(found[1].trailing);
    }

    #[test]
    fn test_normalization_replaces_identifiers_only() {
        let a = normalized_lines("total = price * 2\n", Language::Python);
        let b = normalized_lines("amount = cost * 2\n", Language::Python);
        let c = normalized_lines("amount = cost * 3\n", Language::Python);
        assert_eq!(a[0].text, b[0].text);
        assert_ne!(a[0].text, c[0].text);
        assert_eq!(a[0].text, "$id = $id * 2");
    }

    #[test]
    fn test_imports_and_blank_lines_are_dropped() {
        let src = "import os\nfrom x import y\n\n# comment\nvalue = 1\n";
        let lines = normalized_lines(src, Language::Python);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].line, 5);

        let src = "import { a } from './a';\nconst fs = require('fs');\nlet b = a;\n";
        let lines = normalized_lines(src, Language::JavaScript);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].line, 3);
    }
}

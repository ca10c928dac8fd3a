//! Language detection from file extension and shebang line.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Languages the engine can dispatch rules for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    TypeScript,
    JavaScript,
}

impl Language {
    /// All supported languages, in a stable order.
    pub const ALL: &'static [Language] = &[
        Language::Python,
        Language::TypeScript,
        Language::JavaScript,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
        }
    }

    /// Map a file extension (without dot) to a language.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "py" | "pyi" => Some(Language::Python),
            "ts" | "tsx" | "mts" | "cts" => Some(Language::TypeScript),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            _ => None,
        }
    }

    /// Line comment prefix used by inline directives.
    pub fn line_comment(&self) -> &'static str {
        match self {
            Language::Python => "#",
            Language::TypeScript | Language::JavaScript => "//",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Detect the language of a file.
///
/// The extension map is consulted first. When the extension is absent or
/// unmapped, the shebang in `first_line` is inspected. `None` means the file
/// is of an unknown language and should be skipped, not reported.
pub fn detect(path: &Path, first_line: Option<&str>) -> Option<Language> {
    let by_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(|e| Language::from_extension(&e.to_ascii_lowercase()));

    by_ext.or_else(|| first_line.and_then(from_shebang))
}

/// Classify a shebang line such as `#!/usr/bin/env python3`.
fn from_shebang(line: &str) -> Option<Language> {
    let rest = line.trim().strip_prefix("#!")?;
    let mut parts = rest.split_whitespace();
    let program = parts.next()?;
    let program_name = program.rsplit('/').next().unwrap_or(program);

    let interpreter = if program_name == "env" {
        // `env -S node --flag` style
        parts.find(|p| !p.starts_with('-'))?
    } else {
        program_name
    };

    interpreter_language(interpreter.rsplit('/').next().unwrap_or(interpreter))
}

fn interpreter_language(name: &str) -> Option<Language> {
    if name.starts_with("python") || name == "pypy" || name == "pypy3" {
        return Some(Language::Python);
    }
    match name {
        "node" | "nodejs" => Some(Language::JavaScript),
        "ts-node" | "deno" | "bun" | "tsx" => Some(Language::TypeScript),
        _ => None,
    }
}

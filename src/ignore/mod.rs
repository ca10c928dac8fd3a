//! Layered ignore resolution.
//!
//! Five scopes, narrowest first: line, function, file, directory, repo.
//! The first scope holding a directive that matches the rule decides; within
//! that scope the most specific pattern wins. Scopes are never voted, so an
//! unrelated narrower directive cannot undo a broader one.
//!
//! One resolver is built per project root per run and shared by the
//! orchestrator and every rule. Directory ignore files and inline file
//! directives are parsed on first use and cached for the rest of the run.

mod directive;
mod pattern;

pub use directive::{
    parse_ignore_file, parse_inline, IgnoreScope, InlineDirective, InlineKind, ScopedPattern,
    Verdict,
};
pub use pattern::{InvalidPattern, RulePattern};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::unsync::OnceCell;

use crate::config::LintConfig;
use crate::context::{relative_path, Context, SourceFile};
use crate::error::{ConfigError, DirectiveParseError};
use crate::language::{self, Language};
use crate::parser::{self, FunctionSpan};

/// Name of per-directory ignore files.
pub const IGNORE_FILE_NAME: &str = ".layerlintignore";

/// Directives attached to one function.
#[derive(Debug, Clone)]
pub struct FunctionDirectives {
    pub function: FunctionSpan,
    pub patterns: Vec<ScopedPattern>,
}

/// Inline directives of one file, resolved to their targets.
#[derive(Debug, Clone, Default)]
pub struct FileDirectives {
    pub file: Vec<ScopedPattern>,
    pub lines: HashMap<usize, Vec<ScopedPattern>>,
    pub functions: Vec<FunctionDirectives>,
    /// Malformed directives found while parsing (treated as absent).
    pub errors: Vec<DirectiveParseError>,
}

impl FileDirectives {
    /// Build from parsed inline directives. `functions` is only consulted
    /// when the file holds `ignore-function` directives.
    pub fn build<'f, F>(
        file_path: &str,
        inline: Vec<InlineDirective>,
        mut errors: Vec<DirectiveParseError>,
        functions: F,
    ) -> Self
    where
        F: FnOnce() -> &'f [FunctionSpan],
    {
        let mut result = FileDirectives::default();
        let needs_functions = inline.iter().any(|d| d.kind == InlineKind::Function);
        let spans: &[FunctionSpan] = if needs_functions { functions() } else { &[] };

        for directive in inline {
            let patterns: Vec<ScopedPattern> = directive
                .patterns
                .into_iter()
                .map(ScopedPattern::ignore)
                .collect();
            match directive.kind {
                InlineKind::Line => result
                    .lines
                    .entry(directive.target_line)
                    .or_default()
                    .extend(patterns),
                InlineKind::File => result.file.extend(patterns),
                InlineKind::Function => match attach_function(spans, directive.line) {
                    Some(function) => result.functions.push(FunctionDirectives {
                        function: function.clone(),
                        patterns,
                    }),
                    None => errors.push(DirectiveParseError {
                        file_path: file_path.to_string(),
                        line: directive.line,
                        message: "ignore-function directive is not attached to a function"
                            .to_string(),
                    }),
                },
            }
        }

        result.errors = errors;
        result
    }
}

/// The function declared right after `line`, else the innermost function
/// containing it.
fn attach_function(spans: &[FunctionSpan], line: usize) -> Option<&FunctionSpan> {
    spans
        .iter()
        .find(|s| s.header_line == line + 1)
        .or_else(|| parser::enclosing_functions(spans, line).into_iter().next())
}

#[derive(Debug, Default)]
struct DirectoryEntry {
    patterns: Vec<ScopedPattern>,
    errors: Vec<DirectiveParseError>,
}

/// Resolves suppression decisions for one project root.
pub struct IgnoreResolver {
    root: PathBuf,
    /// Config entries without a path plus the root ignore file.
    repo: Vec<ScopedPattern>,
    /// Config entries keyed by normalized relative path (file or directory).
    by_path: HashMap<String, Vec<ScopedPattern>>,
    root_errors: Vec<DirectiveParseError>,
    directories: RwLock<HashMap<String, Arc<DirectoryEntry>>>,
    files: RwLock<HashMap<String, Arc<FileDirectives>>>,
}

impl IgnoreResolver {
    /// Load config directives and the root ignore file.
    pub fn load(root: &Path, config: &LintConfig) -> Result<Self, ConfigError> {
        let mut resolver = Self::empty(root);

        for entry in &config.ignore {
            let pattern = ScopedPattern::parse(&entry.rule)?;
            match entry.path.as_deref().map(normalize_rel).filter(|p| !p.is_empty()) {
                None => resolver.repo.push(pattern),
                Some(path) => resolver.by_path.entry(path).or_default().push(pattern),
            }
        }

        let root_file = root.join(IGNORE_FILE_NAME);
        if let Ok(content) = std::fs::read_to_string(&root_file) {
            let (patterns, errors) = parse_ignore_file(IGNORE_FILE_NAME, &content);
            resolver.repo.extend(patterns);
            resolver.root_errors = errors;
        }

        tracing::debug!(
            root = %root.display(),
            repo_patterns = resolver.repo.len(),
            path_entries = resolver.by_path.len(),
            "loaded ignore directives"
        );
        Ok(resolver)
    }

    /// A resolver with no directives.
    pub fn empty(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            repo: Vec::new(),
            by_path: HashMap::new(),
            root_errors: Vec::new(),
            directories: RwLock::new(HashMap::new()),
            files: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Seed a file's inline directives from an already-built context,
    /// reusing its memoized syntax tree for function spans.
    pub fn load_file_directives(&self, ctx: &Context) -> Arc<FileDirectives> {
        if let Some(cached) = self.cached_file(ctx.file_path()) {
            return cached;
        }
        let (inline, errors) = parse_inline(ctx.file_path(), ctx.raw_content(), ctx.language());
        let directives = FileDirectives::build(ctx.file_path(), inline, errors, || ctx.functions());
        self.store_file(ctx.file_path(), directives)
    }

    /// Inline directives for a file, loading it from disk if needed.
    pub fn file_directives(&self, file_path: &str) -> Arc<FileDirectives> {
        if let Some(cached) = self.cached_file(file_path) {
            return cached;
        }
        let directives = self.load_from_disk(file_path).unwrap_or_default();
        self.store_file(file_path, directives)
    }

    fn load_from_disk(&self, file_path: &str) -> Option<FileDirectives> {
        let abs = self.root.join(file_path);
        let source = SourceFile::read(&self.root, &abs).ok()?;
        let language = language::detect(&abs, source.first_line())?;
        let (inline, errors) = parse_inline(file_path, &source.content, language);
        let spans = OnceCell::new();
        Some(FileDirectives::build(file_path, inline, errors, || {
            spans
                .get_or_init(|| function_spans_for(language, &abs, &source.content))
                .as_slice()
        }))
    }

    fn cached_file(&self, file_path: &str) -> Option<Arc<FileDirectives>> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(file_path)
            .cloned()
    }

    fn store_file(&self, file_path: &str, directives: FileDirectives) -> Arc<FileDirectives> {
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        files
            .entry(file_path.to_string())
            .or_insert_with(|| Arc::new(directives))
            .clone()
    }

    fn directory(&self, dir: &str) -> Arc<DirectoryEntry> {
        if let Some(entry) = self
            .directories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(dir)
        {
            return entry.clone();
        }

        let ignore_path = self.root.join(dir).join(IGNORE_FILE_NAME);
        let entry = match std::fs::read_to_string(&ignore_path) {
            Ok(content) => {
                let rel = relative_path(&self.root, &ignore_path);
                let (patterns, errors) = parse_ignore_file(&rel, &content);
                DirectoryEntry { patterns, errors }
            }
            Err(_) => DirectoryEntry::default(),
        };

        let mut dirs = self
            .directories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        dirs.entry(dir.to_string())
            .or_insert_with(|| Arc::new(entry))
            .clone()
    }

    /// Which scope, if any, silences `rule_id` at this location.
    ///
    /// `file_path` is project-root relative. With `function_name` the
    /// function scope is looked up by name; otherwise by the functions
    /// enclosing `line`, innermost first.
    pub fn resolve(
        &self,
        rule_id: &str,
        file_path: &str,
        line: Option<usize>,
        function_name: Option<&str>,
    ) -> Option<IgnoreScope> {
        let file_path = normalize_rel(file_path);
        let directives = self.file_directives(&file_path);

        if let Some(line) = line {
            if let Some(patterns) = directives.lines.get(&line) {
                if let Some(ignored) = decide(rule_id, patterns.iter()) {
                    return ignored.then_some(IgnoreScope::Line);
                }
            }
        }

        for level in function_levels(&directives, line, function_name) {
            if let Some(ignored) = decide(rule_id, level.into_iter()) {
                return ignored.then_some(IgnoreScope::Function);
            }
        }

        self.resolve_path(rule_id, &file_path, &directives)
    }

    /// Whether `rule_id` is ignored everywhere in `file_path`, i.e. at
    /// file, directory or repo scope.
    pub fn is_file_ignored(&self, rule_id: &str, file_path: &str) -> bool {
        let file_path = normalize_rel(file_path);
        let directives = self.file_directives(&file_path);
        self.resolve_path(rule_id, &file_path, &directives).is_some()
    }

    pub fn is_ignored(
        &self,
        rule_id: &str,
        file_path: &str,
        line: Option<usize>,
        function_name: Option<&str>,
    ) -> bool {
        self.resolve(rule_id, file_path, line, function_name).is_some()
    }

    fn resolve_path(
        &self,
        rule_id: &str,
        file_path: &str,
        directives: &FileDirectives,
    ) -> Option<IgnoreScope> {
        let configured = self.by_path.get(file_path).into_iter().flatten();
        if let Some(ignored) = decide(rule_id, directives.file.iter().chain(configured)) {
            return ignored.then_some(IgnoreScope::File);
        }

        for dir in ancestors(file_path) {
            let entry = self.directory(&dir);
            let configured = self.by_path.get(&dir).into_iter().flatten();
            if let Some(ignored) = decide(rule_id, configured.chain(entry.patterns.iter())) {
                return ignored.then_some(IgnoreScope::Directory);
            }
        }

        match decide(rule_id, self.repo.iter()) {
            Some(true) => Some(IgnoreScope::Repo),
            _ => None,
        }
    }

    /// Parse errors from ignore files and inline directives seen so far.
    pub fn parse_errors(&self) -> Vec<DirectiveParseError> {
        let mut errors = self.root_errors.clone();
        let dirs = self
            .directories
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for entry in dirs.values() {
            errors.extend(entry.errors.iter().cloned());
        }
        errors
    }
}

fn function_spans_for(language: Language, abs: &Path, content: &str) -> Vec<FunctionSpan> {
    match parser::parse(language, abs, content) {
        Ok(parsed) => parser::function_spans(&parsed, content),
        Err(e) => {
            tracing::debug!(file = %abs.display(), error = %e, "no function spans");
            Vec::new()
        }
    }
}

/// Pattern groups for the function scope, innermost first.
fn function_levels<'d>(
    directives: &'d FileDirectives,
    line: Option<usize>,
    function_name: Option<&str>,
) -> Vec<Vec<&'d ScopedPattern>> {
    if let Some(name) = function_name {
        let level: Vec<&ScopedPattern> = directives
            .functions
            .iter()
            .filter(|f| f.function.name == name)
            .flat_map(|f| f.patterns.iter())
            .collect();
        return vec![level];
    }

    let Some(line) = line else {
        return Vec::new();
    };
    let mut containing: Vec<&FunctionDirectives> = directives
        .functions
        .iter()
        .filter(|f| f.function.contains(line))
        .collect();
    containing.sort_by_key(|f| f.function.end_line - f.function.header_line);
    containing
        .into_iter()
        .map(|f| f.patterns.iter().collect())
        .collect()
}

/// Verdict of the most specific matching pattern at one scope level.
/// Ties go to the later pattern. `None` when nothing at this level matches.
fn decide<'p, I>(rule_id: &str, patterns: I) -> Option<bool>
where
    I: Iterator<Item = &'p ScopedPattern>,
{
    let mut best: Option<(usize, Verdict)> = None;
    for p in patterns.filter(|p| p.pattern.matches(rule_id)) {
        let specificity = p.pattern.specificity();
        if best.map(|(s, _)| specificity >= s).unwrap_or(true) {
            best = Some((specificity, p.verdict));
        }
    }
    best.map(|(_, verdict)| verdict == Verdict::Ignore)
}

/// Enclosing directories of a relative file path, nearest first, excluding
/// the project root itself.
fn ancestors(file_path: &str) -> Vec<String> {
    let mut dirs = Vec::new();
    let mut current = file_path;
    while let Some(idx) = current.rfind('/') {
        current = &current[..idx];
        if current.is_empty() {
            break;
        }
        dirs.push(current.to_string());
    }
    dirs
}

fn normalize_rel(path: &str) -> String {
    let path = path.replace('\\', "/");
    let path = path.trim_start_matches("./").trim_end_matches('/');
    if path == "." {
        String::new()
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IgnoreEntry;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn resolver(root: &Path, entries: Vec<IgnoreEntry>) -> IgnoreResolver {
        let config = LintConfig {
            ignore: entries,
            ..Default::default()
        };
        IgnoreResolver::load(root, &config).unwrap()
    }

    #[test]
    fn test_repo_ignore_not_undone_by_unrelated_line_directive() {
        let temp = TempDir::new().unwrap();
        let mut content = String::new();
        for i in 1..=12 {
            if i == 10 {
                content.push_str("value = compute()  # layerlint: ignore[y]\n");
            } else {
                content.push_str(&format!("line_{} = {}\n", i, i));
            }
        }
        write(temp.path(), "f.py", &content);

        let r = resolver(temp.path(), vec![IgnoreEntry::repo("x")]);
        assert_eq!(r.resolve("x", "f.py", Some(10), None), Some(IgnoreScope::Repo));
        assert_eq!(r.resolve("y", "f.py", Some(10), None), Some(IgnoreScope::Line));
        assert_eq!(r.resolve("y", "f.py", Some(11), None), None);
    }

    #[test]
    fn test_segment_prefix_matching() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.py", "x = 1\n");
        let r = resolver(temp.path(), vec![IgnoreEntry::repo("nest")]);
        assert!(!r.is_ignored("nesting.x", "a.py", None, None));

        let r = resolver(temp.path(), vec![IgnoreEntry::repo("nesting")]);
        assert!(r.is_ignored("nesting.x", "a.py", None, None));
    }

    #[test]
    fn test_narrower_scope_can_reenable() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "legacy/core/a.py", "x = 1\n");
        write(temp.path(), "legacy/other.py", "x = 1\n");
        write(temp.path(), "legacy/core/.layerlintignore", "!nesting\n");

        let r = resolver(temp.path(), vec![IgnoreEntry::at("nesting", "legacy")]);
        assert_eq!(
            r.resolve("nesting.excessive-depth", "legacy/other.py", None, None),
            Some(IgnoreScope::Directory)
        );
        // The nearer directory re-enables the rule; the outer one is never consulted.
        assert_eq!(r.resolve("nesting.excessive-depth", "legacy/core/a.py", None, None), None);
    }

    #[test]
    fn test_most_specific_pattern_wins_within_scope() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), ".layerlintignore", "nesting\n!nesting.excessive-depth\n");
        write(temp.path(), "a.py", "x = 1\n");

        let r = resolver(temp.path(), vec![]);
        assert!(!r.is_ignored("nesting.excessive-depth", "a.py", None, None));
        assert!(r.is_ignored("nesting.other", "a.py", None, None));
    }

    #[test]
    fn test_file_scope_from_config_and_inline() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "gen/out.ts", "// layerlint: ignore-file[dry]\nlet a = 1;\n");
        write(temp.path(), "src/b.ts", "let b = 1;\n");

        let r = resolver(temp.path(), vec![IgnoreEntry::at("*", "./src/b.ts")]);
        assert!(r.is_file_ignored("dry.duplicate-code", "gen/out.ts"));
        assert!(!r.is_file_ignored("nesting", "gen/out.ts"));
        assert_eq!(
            r.resolve("anything", "src/b.ts", Some(1), None),
            Some(IgnoreScope::File)
        );
    }

    #[test]
    fn test_function_scope_by_line_and_name() {
        let temp = TempDir::new().unwrap();
        let content = r#"def keep():
    return 1

# layerlint: ignore-function[nesting]
def legacy(x):
    if x:
        return 2
    return 3
"#;
        write(temp.path(), "m.py", content);
        let r = resolver(temp.path(), vec![]);

        assert_eq!(
            r.resolve("nesting.excessive-depth", "m.py", Some(6), None),
            Some(IgnoreScope::Function)
        );
        assert_eq!(r.resolve("nesting.excessive-depth", "m.py", Some(2), None), None);
        assert!(r.is_ignored("nesting.excessive-depth", "m.py", None, Some("legacy")));
        assert!(!r.is_ignored("nesting.excessive-depth", "m.py", None, Some("keep")));
    }

    #[test]
    fn test_dangling_function_directive_is_an_error() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "m.py", "# layerlint: ignore-function[nesting]\n\nx = 1\n");
        let r = resolver(temp.path(), vec![]);
        let directives = r.file_directives("m.py");
        assert!(directives.functions.is_empty());
        assert_eq!(directives.errors.len(), 1);
        assert!(!r.is_ignored("nesting", "m.py", Some(3), None));
    }

    #[test]
    fn test_ignore_file_errors_are_collected() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), ".layerlintignore", "ok.rule\nnot valid\n");
        write(temp.path(), "pkg/.layerlintignore", "..\n");
        write(temp.path(), "pkg/a.py", "x = 1\n");

        let r = resolver(temp.path(), vec![]);
        assert!(r.is_ignored("ok.rule", "pkg/a.py", None, None));
        let errors = r.parse_errors();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_unknown_file_has_no_directives() {
        let temp = TempDir::new().unwrap();
        let r = resolver(temp.path(), vec![]);
        assert!(!r.is_ignored("x", "missing.py", Some(1), None));
    }

    #[test]
    fn test_ancestors_nearest_first() {
        assert_eq!(ancestors("a/b/c.py"), vec!["a/b".to_string(), "a".to_string()]);
        assert!(ancestors("c.py").is_empty());
    }
}

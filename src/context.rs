//! Per-file and finalize-time views handed to rules.

use once_cell::unsync::OnceCell;
use std::cell::RefCell;
use std::path::{Path, PathBuf};

use crate::config::{LintConfig, RuleOptions};
use crate::ignore::IgnoreResolver;
use crate::language::Language;
use crate::parser::{self, FunctionSpan, ParsedFile};
use crate::store::{self, CrossFileRecord, CrossFileStore};

/// A file read from disk, identified relative to the project root.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Project-root relative path with `/` separators.
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub content: String,
    /// Hex xxh3 of the content.
    pub content_hash: String,
}

impl SourceFile {
    /// Read a file. Invalid UTF-8 is replaced rather than rejected.
    pub fn read(project_root: &Path, abs_path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(abs_path)?;
        let content = String::from_utf8_lossy(&bytes).into_owned();
        Ok(Self::from_content(project_root, abs_path, content))
    }

    pub fn from_content(project_root: &Path, abs_path: &Path, content: String) -> Self {
        Self {
            rel_path: relative_path(project_root, abs_path),
            abs_path: abs_path.to_path_buf(),
            content_hash: store::hash_hex(content.as_bytes()),
            content,
        }
    }

    pub fn first_line(&self) -> Option<&str> {
        self.content.lines().next()
    }
}

/// Render `path` relative to `root` with `/` separators.
pub fn relative_path(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.to_string_lossy().replace('\\', "/"),
    }
}

/// Read-only view of one file for the duration of its rule evaluations.
///
/// The AST is parsed on first access and shared by every rule that asks
/// for it, so a file is parsed at most once however many rules run.
pub struct Context<'a> {
    source: &'a SourceFile,
    language: Language,
    project_root: &'a Path,
    config: &'a LintConfig,
    ignores: &'a IgnoreResolver,
    ast: OnceCell<Result<ParsedFile, String>>,
    functions: OnceCell<Vec<FunctionSpan>>,
    records: RefCell<Vec<CrossFileRecord>>,
}

impl<'a> Context<'a> {
    pub fn new(
        source: &'a SourceFile,
        language: Language,
        project_root: &'a Path,
        config: &'a LintConfig,
        ignores: &'a IgnoreResolver,
    ) -> Self {
        Self {
            source,
            language,
            project_root,
            config,
            ignores,
            ast: OnceCell::new(),
            functions: OnceCell::new(),
            records: RefCell::new(Vec::new()),
        }
    }

    /// Project-root relative path of the file.
    pub fn file_path(&self) -> &str {
        &self.source.rel_path
    }

    pub fn abs_path(&self) -> &Path {
        &self.source.abs_path
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn raw_content(&self) -> &str {
        &self.source.content
    }

    pub fn content_hash(&self) -> &str {
        &self.source.content_hash
    }

    pub fn project_root(&self) -> &Path {
        self.project_root
    }

    pub fn config_for(&self, rule_id: &str) -> RuleOptions {
        self.config.config_for(rule_id)
    }

    /// The run's ignore resolver, for rules that want to consult it directly.
    pub fn ignores(&self) -> &IgnoreResolver {
        self.ignores
    }

    /// The parsed syntax tree, parsed lazily and memoized.
    pub fn ast(&self) -> anyhow::Result<&ParsedFile> {
        self.ast
            .get_or_init(|| {
                tracing::debug!(file = %self.source.rel_path, "parsing syntax tree");
                parser::parse(self.language, &self.source.abs_path, &self.source.content)
                    .map_err(|e| e.to_string())
            })
            .as_ref()
            .map_err(|e| anyhow::anyhow!("{}", e))
    }

    /// Whether the syntax tree has been parsed yet.
    pub fn is_ast_parsed(&self) -> bool {
        self.ast.get().is_some()
    }

    /// Function extents; empty when the file does not parse.
    pub fn functions(&self) -> &[FunctionSpan] {
        self.functions.get_or_init(|| match self.ast() {
            Ok(parsed) => parser::function_spans(parsed, &self.source.content),
            Err(_) => Vec::new(),
        })
    }

    /// Emit a cross-file record for the rule currently being checked.
    ///
    /// Records are flushed to the store once the rule's `check` succeeds and
    /// discarded if it fails.
    pub fn record(&self, key: impl Into<String>, line: usize, end_line: usize, payload: impl Into<String>) {
        self.records.borrow_mut().push(CrossFileRecord {
            key: key.into(),
            file_path: self.source.rel_path.clone(),
            line,
            end_line,
            payload: payload.into(),
        });
    }

    pub(crate) fn take_records(&self) -> Vec<CrossFileRecord> {
        std::mem::take(&mut *self.records.borrow_mut())
    }
}

/// What a stateful rule sees during its single `finalize` call.
pub struct FinalizeContext<'a> {
    store: &'a CrossFileStore,
    project_root: &'a Path,
    config: &'a LintConfig,
}

impl<'a> FinalizeContext<'a> {
    pub fn new(store: &'a CrossFileStore, project_root: &'a Path, config: &'a LintConfig) -> Self {
        Self {
            store,
            project_root,
            config,
        }
    }

    pub fn store(&self) -> &CrossFileStore {
        self.store
    }

    pub fn project_root(&self) -> &Path {
        self.project_root
    }

    pub fn config_for(&self, rule_id: &str) -> RuleOptions {
        self.config.config_for(rule_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LintConfig;

    #[test]
    fn test_relative_path_uses_forward_slashes() {
        let root = Path::new("/project");
        let file = Path::new("/project/src/pkg/mod.py");
        assert_eq!(relative_path(root, file), "src/pkg/mod.py");
        assert_eq!(relative_path(root, Path::new("/elsewhere/x.py")), "/elsewhere/x.py");
    }

    #[test]
    fn test_ast_is_memoized() {
        let root = Path::new("/project");
        let source = SourceFile::from_content(
            root,
            Path::new("/project/a.py"),
            "def f():\n    return 1\n".to_string(),
        );
        let config = LintConfig::default();
        let ignores = IgnoreResolver::empty(root);
        let ctx = Context::new(&source, Language::Python, root, &config, &ignores);

        assert!(!ctx.is_ast_parsed());
        let first = ctx.ast().unwrap() as *const ParsedFile;
        let second = ctx.ast().unwrap() as *const ParsedFile;
        assert!(ctx.is_ast_parsed());
        assert_eq!(first, second);
        assert_eq!(ctx.functions().len(), 1);
    }

    #[test]
    fn test_records_are_taken_once() {
        let root = Path::new("/project");
        let source =
            SourceFile::from_content(root, Path::new("/project/a.ts"), "let x = 1;\n".to_string());
        let config = LintConfig::default();
        let ignores = IgnoreResolver::empty(root);
        let ctx = Context::new(&source, Language::TypeScript, root, &config, &ignores);

        ctx.record("k1", 1, 1, "{}");
        ctx.record("k2", 1, 1, "{}");
        let taken = ctx.take_records();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].file_path, "a.ts");
        assert!(ctx.take_records().is_empty());
    }
}

//! Integration tests for the full lint pipeline.
//!
//! Each test builds a throwaway project with tempfile and runs the
//! orchestrator against it with a private cache directory.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;

use layerlint::error::{DiscoveryError, RulePhase};
use layerlint::orchestrator::Orchestrator;
use layerlint::rules::{duplicate_code, nesting, Rule, RuleDescriptor};
use layerlint::{Context, DiagnosticKind, FinalizeContext, Language, LintConfig, LintError, Violation};

const DISCOUNT: &str = "def apply_discount(order):
    total = order.price * order.quantity
    if total > 100:
        total = total - 10
    return total
";

const DEEP: &str = "def process(items):
    for item in items:
        if item:
            while item.pending:
                try:
                    if item.ready:
                        item.run()
                except Exception:
                    pass
";

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn project(files: &[(&str, &str)]) -> TempDir {
    let temp = TempDir::new().unwrap();
    for (rel, content) in files {
        write(temp.path(), rel, content);
    }
    temp
}

fn config_with_cache(cache: &TempDir) -> LintConfig {
    let mut config = LintConfig::default();
    config.cache.dir = Some(cache.path().to_path_buf());
    config
}

fn only(namespaces: &[&str], cache: &TempDir) -> LintConfig {
    let mut config = config_with_cache(cache);
    config.namespaces = namespaces.iter().map(|s| s.to_string()).collect();
    config
}

// =============================================================================
// Cross-file grouping
// =============================================================================

#[test]
fn test_three_identical_files_yield_one_duplicate() {
    let project = project(&[("a.py", DISCOUNT), ("b.py", DISCOUNT), ("c.py", DISCOUNT)]);
    let cache = TempDir::new().unwrap();

    let mut orchestrator = Orchestrator::new(project.path(), only(&["dry"], &cache)).unwrap();
    let report = orchestrator.lint_directory(project.path(), true).unwrap();

    assert_eq!(report.files_scanned, 3);
    assert_eq!(report.violations.len(), 1, "{:#?}", report.violations);
    let v = &report.violations[0];
    assert_eq!(v.rule_id, duplicate_code::RULE_ID);
    assert_eq!(v.file_path, "a.py");
    assert_eq!(v.line, 1);
    assert!(v.message.contains("5 lines (3 copies)"), "{}", v.message);
    assert!(v.message.contains("b.py:1-5"));
    assert!(v.message.contains("c.py:1-5"));
    assert!(report.diagnostics.is_empty(), "{:#?}", report.diagnostics);
}

#[test]
fn test_single_file_has_no_cross_file_findings() {
    let project = project(&[("a.py", DISCOUNT)]);
    let cache = TempDir::new().unwrap();

    let mut orchestrator = Orchestrator::new(project.path(), only(&["dry"], &cache)).unwrap();
    let report = orchestrator.lint_directory(project.path(), true).unwrap();

    assert_eq!(report.files_scanned, 1);
    assert!(report.violations.is_empty());
}

#[test]
fn test_repeated_string_set_across_languages() {
    let project = project(&[
        ("api/handlers.py", "def ok(status):\n    return status in (\"open\", \"closed\")\n"),
        ("web/filter.ts", "export const ok = (s: string) => [\"closed\", \"open\"].includes(s);\n"),
        ("web/other.ts", "export const bad = (s: string) => [\"a\", \"b\"].includes(s);\n"),
    ]);
    let cache = TempDir::new().unwrap();

    let mut orchestrator =
        Orchestrator::new(project.path(), only(&["stringly-typed"], &cache)).unwrap();
    let report = orchestrator.lint_directory(project.path(), true).unwrap();

    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].file_path, "api/handlers.py");
    assert!(report.violations[0].message.contains("web/filter.ts:1"));
}

// =============================================================================
// Incremental runs
// =============================================================================

static FIRST_LINE_CHECKS: AtomicUsize = AtomicUsize::new(0);

/// Groups files by their first line and counts how often it is checked.
struct SharedFirstLine;

impl Rule for SharedFirstLine {
    fn rule_id(&self) -> &str {
        "test.shared-first-line"
    }

    fn applicable_languages(&self) -> &[Language] {
        Language::ALL
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn check(&self, ctx: &Context) -> anyhow::Result<Vec<Violation>> {
        FIRST_LINE_CHECKS.fetch_add(1, Ordering::SeqCst);
        if let Some(first) = ctx.raw_content().lines().next() {
            ctx.record(first.trim(), 1, 1, "{}");
        }
        Ok(Vec::new())
    }

    fn finalize(&self, ctx: &FinalizeContext) -> anyhow::Result<Vec<Violation>> {
        let mut violations = Vec::new();
        for group in ctx.store().query(self.rule_id(), 2)? {
            let first = &group.records[0];
            violations.push(Violation::new(
                self.rule_id(),
                first.file_path.as_str(),
                first.line,
                format!("first line shared by {} files", group.distinct_files()),
            ));
        }
        Ok(violations)
    }
}

fn shared_first_line() -> Box<dyn Rule> {
    Box::new(SharedFirstLine)
}

const SHARED_FIRST_LINE: RuleDescriptor =
    RuleDescriptor::new("engine_integration::SharedFirstLine", shared_first_line);

#[test]
fn test_changed_file_is_rechecked_and_others_reused() {
    let project = project(&[("b.py", DISCOUNT), ("c.py", DISCOUNT), ("f.py", DISCOUNT)]);
    let cache = TempDir::new().unwrap();

    let run = || {
        let mut orchestrator = Orchestrator::new(project.path(), only(&["dry"], &cache)).unwrap();
        orchestrator.register(SHARED_FIRST_LINE).unwrap();
        orchestrator.lint_directory(project.path(), true).unwrap()
    };

    let before = FIRST_LINE_CHECKS.load(Ordering::SeqCst);
    let first = run();
    assert_eq!(FIRST_LINE_CHECKS.load(Ordering::SeqCst) - before, 3);
    let shared: Vec<_> = first
        .violations
        .iter()
        .filter(|v| v.rule_id == "test.shared-first-line")
        .collect();
    assert_eq!(shared.len(), 1);
    assert!(shared[0].message.contains("3 files"));

    write(project.path(), "f.py", "def describe(order):\n    return str(order)\n");

    let before = FIRST_LINE_CHECKS.load(Ordering::SeqCst);
    let second = run();
    assert_eq!(FIRST_LINE_CHECKS.load(Ordering::SeqCst) - before, 1);

    let shared: Vec<_> = second
        .violations
        .iter()
        .filter(|v| v.rule_id == "test.shared-first-line")
        .collect();
    assert_eq!(shared.len(), 1);
    assert!(shared[0].message.contains("2 files"));

    let dup: Vec<_> = second
        .violations
        .iter()
        .filter(|v| v.rule_id == duplicate_code::RULE_ID)
        .collect();
    assert_eq!(dup.len(), 1);
    assert!(dup[0].message.contains("(2 copies)"));
    assert!(!dup[0].message.contains("f.py"));
}

#[test]
fn test_deleted_file_stops_contributing() {
    let project = project(&[("a.py", DISCOUNT), ("b.py", DISCOUNT)]);
    let cache = TempDir::new().unwrap();

    let mut orchestrator = Orchestrator::new(project.path(), only(&["dry"], &cache)).unwrap();
    assert_eq!(orchestrator.lint_directory(project.path(), true).unwrap().violations.len(), 1);

    std::fs::remove_file(project.path().join("b.py")).unwrap();
    let report = orchestrator.lint_directory(project.path(), true).unwrap();
    assert!(report.violations.is_empty());
}

#[test]
fn test_runs_are_idempotent() {
    let project = project(&[
        ("a.py", DISCOUNT),
        ("b.py", DISCOUNT),
        ("deep.py", DEEP),
        ("web/x.ts", "if ([\"a\", \"b\"].includes(k)) {}\n"),
        ("web/y.js", "if (new Set([\"b\", \"a\"]).has(k)) {}\n"),
    ]);
    let cache = TempDir::new().unwrap();

    let mut orchestrator = Orchestrator::new(project.path(), config_with_cache(&cache)).unwrap();
    let cold = orchestrator.lint_directory(project.path(), true).unwrap();
    let warm = orchestrator.lint_directory(project.path(), true).unwrap();

    assert!(!cold.violations.is_empty());
    assert_eq!(
        serde_json::to_string(&cold.violations).unwrap(),
        serde_json::to_string(&warm.violations).unwrap()
    );
    assert_eq!(cold.diagnostics, warm.diagnostics);
}

// =============================================================================
// Dispatch
// =============================================================================

#[test]
fn test_parallel_matches_sequential() {
    let files: Vec<(String, &str)> = vec![
        ("a.py".to_string(), DISCOUNT),
        ("b.py".to_string(), DISCOUNT),
        ("pkg/c.py".to_string(), DISCOUNT),
        ("pkg/deep.py".to_string(), DEEP),
        (
            "pkg/quiet.py".to_string(),
            "def process(items):  # layerlint: ignore[nesting]\n    for item in items:\n        if item:\n            while item.pending:\n                try:\n                    if item.ready:\n                        item.run()\n                except Exception:\n                    pass\n",
        ),
        ("web/s.ts".to_string(), "if ([\"on\", \"off\"].includes(m)) {}\n"),
        ("web/t.js".to_string(), "if ([\"off\", \"on\"].includes(m)) {}\n"),
        ("README.md".to_string(), "# docs\n"),
    ];
    let refs: Vec<(&str, &str)> = files.iter().map(|(p, c)| (p.as_str(), *c)).collect();
    let project = project(&refs);

    let seq_cache = TempDir::new().unwrap();
    let mut sequential =
        Orchestrator::new(project.path(), config_with_cache(&seq_cache)).unwrap();
    let seq = sequential.lint_directory(project.path(), true).unwrap();

    let par_cache = TempDir::new().unwrap();
    let mut config = config_with_cache(&par_cache);
    config.parallel.enabled = true;
    config.parallel.workers = 3;
    let mut parallel = Orchestrator::new(project.path(), config).unwrap();
    let par = parallel.lint_directory(project.path(), true).unwrap();

    assert_eq!(seq.violations, par.violations);
    assert_eq!(seq.suppressed, par.suppressed);
    assert_eq!(seq.diagnostics, par.diagnostics);
    assert_eq!(seq.files_scanned, 7);
    assert_eq!(par.files_scanned, 7);
    assert_eq!(par.files_skipped, 1);
    assert!(seq.violations.iter().any(|v| v.rule_id == nesting::RULE_ID));
    assert_eq!(seq.suppressed.len(), 1);
}

#[test]
fn test_unknown_language_is_not_an_error() {
    let project = project(&[("Makefile", "all:\n\techo hi\n"), ("notes.txt", "hello\n")]);
    let cache = TempDir::new().unwrap();

    let mut orchestrator = Orchestrator::new(project.path(), config_with_cache(&cache)).unwrap();
    let report = orchestrator
        .lint_file(project.path().join("Makefile"))
        .unwrap();
    assert!(report.violations.is_empty());
    assert!(report.diagnostics.is_empty());
    assert_eq!(report.files_scanned, 0);
    assert_eq!(report.files_skipped, 1);
}

#[test]
fn test_shebang_script_is_linted() {
    let script = format!("#!/usr/bin/env python3\n{}", DEEP);
    let project = project(&[("bin/tool", script.as_str())]);
    let cache = TempDir::new().unwrap();

    let mut orchestrator = Orchestrator::new(project.path(), only(&["nesting"], &cache)).unwrap();
    let report = orchestrator.lint_directory(project.path(), true).unwrap();
    assert_eq!(report.files_scanned, 1);
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].file_path, "bin/tool");
    assert_eq!(report.violations[0].line, 2);
}

#[test]
fn test_excluded_paths_are_not_walked() {
    let project = project(&[("a.py", DEEP), ("generated/b.py", DEEP)]);
    let cache = TempDir::new().unwrap();
    let mut config = only(&["nesting"], &cache);
    config.exclude = vec!["generated/**".to_string()];

    let mut orchestrator = Orchestrator::new(project.path(), config).unwrap();
    let report = orchestrator.lint_directory(project.path(), true).unwrap();
    assert_eq!(report.files_scanned, 1);
    assert_eq!(report.violations.len(), 1);
}

#[test]
fn test_disabled_rule_does_not_run() {
    let project = project(&[("a.py", DEEP)]);
    let cache = TempDir::new().unwrap();
    let mut config = config_with_cache(&cache);
    config.rules.insert(
        "nesting".to_string(),
        serde_json::json!({ "enabled": false }),
    );

    let mut orchestrator = Orchestrator::new(project.path(), config).unwrap();
    let report = orchestrator.lint_directory(project.path(), true).unwrap();
    assert!(report.violations.iter().all(|v| v.rule_id != nesting::RULE_ID));
}

// =============================================================================
// Isolation and registration
// =============================================================================

struct AlwaysPanics;

impl Rule for AlwaysPanics {
    fn rule_id(&self) -> &str {
        "test.always-panics"
    }

    fn applicable_languages(&self) -> &[Language] {
        Language::ALL
    }

    fn check(&self, _ctx: &Context) -> anyhow::Result<Vec<Violation>> {
        panic!("rule bug");
    }
}

struct BrokenFinalize;

impl Rule for BrokenFinalize {
    fn rule_id(&self) -> &str {
        "test.broken-finalize"
    }

    fn applicable_languages(&self) -> &[Language] {
        Language::ALL
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn check(&self, ctx: &Context) -> anyhow::Result<Vec<Violation>> {
        ctx.record("k", 1, 1, "{}");
        Ok(Vec::new())
    }

    fn finalize(&self, _ctx: &FinalizeContext) -> anyhow::Result<Vec<Violation>> {
        anyhow::bail!("aggregation failed")
    }
}

fn always_panics() -> Box<dyn Rule> {
    Box::new(AlwaysPanics)
}

fn broken_finalize() -> Box<dyn Rule> {
    Box::new(BrokenFinalize)
}

#[test]
fn test_failing_rules_are_isolated() {
    let project = project(&[("a.py", DISCOUNT), ("b.py", DISCOUNT), ("deep.py", DEEP)]);
    let cache = TempDir::new().unwrap();

    for parallel in [false, true] {
        let mut config = config_with_cache(&cache);
        config.parallel.enabled = parallel;
        config.parallel.workers = 2;

        let mut orchestrator = Orchestrator::new(project.path(), config).unwrap();
        orchestrator
            .register(RuleDescriptor::new("engine_integration::AlwaysPanics", always_panics))
            .unwrap();
        orchestrator
            .register(RuleDescriptor::new("engine_integration::BrokenFinalize", broken_finalize))
            .unwrap();
        let report = orchestrator.lint_directory(project.path(), true).unwrap();

        assert!(report.violations.iter().any(|v| v.rule_id == duplicate_code::RULE_ID));
        assert!(report.violations.iter().any(|v| v.rule_id == nesting::RULE_ID));

        let panicked = report
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::RuleExecution)
            .filter(|d| d.rule_id.as_deref() == Some("test.always-panics"))
            .count();
        assert_eq!(panicked, 3);

        let finalize = report
            .diagnostics
            .iter()
            .find(|d| d.rule_id.as_deref() == Some("test.broken-finalize"))
            .expect("finalize failure is reported");
        assert!(finalize.file_path.is_none());
        assert!(finalize.message.contains(&RulePhase::Finalize.to_string()));
        assert!(finalize.message.contains("aggregation failed"));
    }
}

fn impostor() -> Box<dyn Rule> {
    Box::new(Impostor)
}

struct Impostor;

impl Rule for Impostor {
    fn rule_id(&self) -> &str {
        duplicate_code::RULE_ID
    }

    fn applicable_languages(&self) -> &[Language] {
        Language::ALL
    }

    fn check(&self, _ctx: &Context) -> anyhow::Result<Vec<Violation>> {
        Ok(Vec::new())
    }
}

#[test]
fn test_duplicate_rule_id_is_fatal() {
    let project = project(&[("a.py", DISCOUNT)]);
    let cache = TempDir::new().unwrap();
    let mut orchestrator = Orchestrator::new(project.path(), config_with_cache(&cache)).unwrap();

    // The same implementation again is harmless.
    orchestrator.register(duplicate_code::DESCRIPTOR).unwrap();

    let err = orchestrator
        .register(RuleDescriptor::new("engine_integration::Impostor", impostor))
        .unwrap_err();
    match err {
        LintError::Discovery(DiscoveryError::DuplicateRuleId { rule_id, .. }) => {
            assert_eq!(rule_id, duplicate_code::RULE_ID)
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_disabled_cache_uses_ephemeral_store() {
    let project = project(&[("a.py", DISCOUNT), ("b.py", DISCOUNT)]);
    let cache = TempDir::new().unwrap();
    let mut config = only(&["dry"], &cache);
    config.cache.enabled = false;

    let mut orchestrator = Orchestrator::new(project.path(), config).unwrap();
    let report = orchestrator.lint_directory(project.path(), true).unwrap();
    assert_eq!(report.violations.len(), 1);
    assert!(!cache.path().join("crossfile").exists());
}

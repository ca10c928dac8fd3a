//! Run orchestration: target collection, dispatch, finalize and ordering.

mod files;
mod lifecycle;
mod worker;

pub use files::collect_files;
pub use lifecycle::{RuleLifecycle, RuleState};
pub use worker::{apply_ignores, invoke_check, invoke_finalize, CheckOutput, FileOutcome, Worker};

use std::path::{Path, PathBuf};

use globset::GlobSet;
use rayon::prelude::*;

use crate::config::LintConfig;
use crate::context::{relative_path, FinalizeContext};
use crate::error::{LintError, StoreError};
use crate::ignore::IgnoreResolver;
use crate::rules::{RuleDescriptor, RuleRegistry};
use crate::store::CrossFileStore;
use crate::violation::{Diagnostic, DiagnosticKind, LintReport};

/// Drives a lint run over one project root.
///
/// Everything that can fail fatally (config, discovery, the store) fails in
/// [`Orchestrator::new`]; a run itself only degrades, reporting what went
/// wrong as diagnostics.
pub struct Orchestrator {
    project_root: PathBuf,
    config: LintConfig,
    registry: RuleRegistry,
    store: CrossFileStore,
    exclude: GlobSet,
    /// Store fallbacks from opening, reported with the first run.
    pending: Vec<Diagnostic>,
}

/// What one parallel shard hands back to the coordinator.
struct ShardResult {
    outcomes: Vec<(usize, FileOutcome)>,
    diagnostics: Vec<Diagnostic>,
}

impl Orchestrator {
    pub fn new<P: AsRef<Path>>(project_root: P, config: LintConfig) -> Result<Self, LintError> {
        config.validate()?;

        let root = project_root.as_ref();
        let project_root = root.canonicalize().map_err(|source| LintError::Io {
            path: root.to_path_buf(),
            source,
        })?;

        let mut registry = RuleRegistry::new();
        let discovered = registry.discover(&config.namespaces)?;

        let (store, pending) = CrossFileStore::open(&project_root, &config.cache)?;
        let exclude = config.exclude_matcher()?;

        tracing::info!(
            root = %project_root.display(),
            rules = discovered,
            store = %store.location(),
            "orchestrator ready"
        );

        Ok(Self {
            project_root,
            config,
            registry,
            store,
            exclude,
            pending,
        })
    }

    /// Register an additional rule. Must happen before linting.
    pub fn register(&mut self, descriptor: RuleDescriptor) -> Result<(), LintError> {
        self.registry.register(descriptor)?;
        Ok(())
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn config(&self) -> &LintConfig {
        &self.config
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn store(&self) -> &CrossFileStore {
        &self.store
    }

    /// Lint a single file. Cross-file rules only see this file.
    pub fn lint_file<P: AsRef<Path>>(&mut self, path: P) -> Result<LintReport, LintError> {
        self.lint_files(&[path.as_ref().to_path_buf()])
    }

    /// Lint every file under `dir` in lexical order.
    pub fn lint_directory<P: AsRef<Path>>(
        &mut self,
        dir: P,
        recursive: bool,
    ) -> Result<LintReport, LintError> {
        let dir = self.absolute(dir.as_ref());
        let dir = dir.canonicalize().map_err(|source| LintError::Io {
            path: dir.clone(),
            source,
        })?;
        let files = collect_files(&self.project_root, &dir, recursive, &self.exclude)?;
        self.lint_files(&files)
    }

    /// Lint an explicit set of files as one run.
    pub fn lint_files(&mut self, paths: &[PathBuf]) -> Result<LintReport, LintError> {
        let mut report = LintReport::new();
        report.diagnostics.append(&mut self.pending);

        let targets = self.normalize_targets(paths);
        let rel_targets: Vec<String> = targets
            .iter()
            .map(|p| relative_path(&self.project_root, p))
            .collect();

        match self.store.begin_run(&rel_targets) {
            Ok(pruned) if pruned > 0 => {
                tracing::debug!(pruned, "pruned records of files outside this run")
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "pruning cross-file store failed");
                report.diagnostics.push(e.to_diagnostic());
            }
        }

        let mut lifecycle = RuleLifecycle::new(
            self.registry
                .all()
                .filter(|r| r.is_stateful() && self.config.is_rule_enabled(r.rule_id()))
                .map(|r| r.rule_id()),
        );
        lifecycle.start_collecting();

        // Fresh per run so edits to ignore files and inline directives
        // between runs are picked up.
        let ignores = IgnoreResolver::load(&self.project_root, &self.config)?;

        tracing::info!(
            files = targets.len(),
            parallel = self.config.parallel.enabled,
            "starting lint run"
        );
        let outcomes = self.dispatch(&targets, &ignores, &mut report)?;
        for outcome in outcomes {
            report.violations.extend(outcome.violations);
            report.suppressed.extend(outcome.suppressed);
            report.diagnostics.extend(outcome.diagnostics);
            report.files_scanned += usize::from(outcome.scanned);
            report.files_skipped += usize::from(outcome.skipped);
        }

        self.finalize(&mut lifecycle, &ignores, &mut report);

        report
            .diagnostics
            .extend(ignores.parse_errors().iter().map(|e| e.to_diagnostic()));
        report.sort();

        tracing::info!(
            violations = report.violations.len(),
            suppressed = report.suppressed.len(),
            diagnostics = report.diagnostics.len(),
            "lint run finished"
        );
        Ok(report)
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    /// Absolute, de-duplicated targets ordered by relative path.
    fn normalize_targets(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        let mut targets: Vec<(String, PathBuf)> = paths
            .iter()
            .map(|p| {
                let abs = self.absolute(p);
                // Missing files keep their path and fail to read later.
                let abs = abs.canonicalize().unwrap_or(abs);
                (relative_path(&self.project_root, &abs), abs)
            })
            .collect();
        targets.sort_by(|a, b| a.0.cmp(&b.0));
        targets.dedup_by(|a, b| a.0 == b.0);
        targets.into_iter().map(|(_, abs)| abs).collect()
    }

    /// Run every target, returning outcomes in target order.
    fn dispatch(
        &self,
        targets: &[PathBuf],
        ignores: &IgnoreResolver,
        report: &mut LintReport,
    ) -> Result<Vec<FileOutcome>, LintError> {
        let workers = self.config.parallel.workers.min(targets.len());
        if self.config.parallel.enabled && workers > 1 {
            match self.shard_stores(workers) {
                Ok(stores) => {
                    let (outcomes, diagnostics) = self.dispatch_parallel(targets, stores)?;
                    report.diagnostics.extend(diagnostics);
                    return Ok(outcomes);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "store cannot be shared, running sequentially");
                    report.diagnostics.push(Diagnostic::new(
                        DiagnosticKind::Store,
                        format!("parallel run fell back to sequential: {}", e),
                    ));
                }
            }
        }

        let worker = Worker::new(
            &self.project_root,
            &self.config,
            &self.registry,
            ignores,
            &self.store,
        );
        Ok(targets.iter().map(|path| worker.process(path)).collect())
    }

    fn shard_stores(&self, workers: usize) -> Result<Vec<CrossFileStore>, StoreError> {
        (0..workers).map(|_| self.store.reopen()).collect()
    }

    fn dispatch_parallel(
        &self,
        targets: &[PathBuf],
        stores: Vec<CrossFileStore>,
    ) -> Result<(Vec<FileOutcome>, Vec<Diagnostic>), LintError> {
        let workers = stores.len();
        let mut shards: Vec<Vec<(usize, PathBuf)>> = vec![Vec::new(); workers];
        for (idx, path) in targets.iter().enumerate() {
            shards[idx % workers].push((idx, path.clone()));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("layerlint-worker-{}", i))
            .build()?;

        // The coordinator's connection stays on this thread.
        let root = self.project_root.as_path();
        let config = &self.config;
        let descriptors = self.registry.descriptors();
        let descriptors = descriptors.as_slice();

        tracing::debug!(workers, "dispatching shards");
        let results: Result<Vec<ShardResult>, LintError> = pool.install(|| {
            shards
                .into_par_iter()
                .zip(stores)
                .map(|(shard, store)| run_shard(root, config, descriptors, &store, shard))
                .collect()
        });

        let mut outcomes = Vec::with_capacity(targets.len());
        let mut diagnostics = Vec::new();
        for result in results? {
            outcomes.extend(result.outcomes);
            diagnostics.extend(result.diagnostics);
        }
        outcomes.sort_by_key(|(idx, _)| *idx);
        Ok((outcomes.into_iter().map(|(_, o)| o).collect(), diagnostics))
    }

    /// Call `finalize` once for every enabled stateful rule.
    fn finalize(
        &self,
        lifecycle: &mut RuleLifecycle,
        ignores: &IgnoreResolver,
        report: &mut LintReport,
    ) {
        let ctx = FinalizeContext::new(&self.store, &self.project_root, &self.config);
        for rule in self.registry.all() {
            let rule_id = rule.rule_id();
            if !lifecycle.begin_finalize(rule_id) {
                continue;
            }
            tracing::debug!(rule = %rule_id, "finalizing");
            match invoke_finalize(rule, &ctx) {
                Ok(violations) => apply_ignores(
                    ignores,
                    violations,
                    &mut report.violations,
                    &mut report.suppressed,
                ),
                Err(e) => {
                    tracing::warn!(error = %e, "finalize failed");
                    report.diagnostics.push(e.to_diagnostic());
                }
            }
            lifecycle.finish(rule_id);
        }
    }
}

/// Process one shard on a pool thread with a private registry, resolver
/// and store connection.
fn run_shard(
    root: &Path,
    config: &LintConfig,
    descriptors: &[RuleDescriptor],
    store: &CrossFileStore,
    shard: Vec<(usize, PathBuf)>,
) -> Result<ShardResult, LintError> {
    let registry = RuleRegistry::from_descriptors(descriptors)?;
    let ignores = IgnoreResolver::load(root, config)?;
    let worker = Worker::new(root, config, &registry, &ignores, store);

    let outcomes = shard
        .into_iter()
        .map(|(idx, path)| (idx, worker.process(&path)))
        .collect();
    let diagnostics = ignores
        .parse_errors()
        .iter()
        .map(|e| e.to_diagnostic())
        .collect();
    Ok(ShardResult {
        outcomes,
        diagnostics,
    })
}

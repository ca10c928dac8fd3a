//! Per-file rule dispatch.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use crate::config::LintConfig;
use crate::context::{relative_path, Context, FinalizeContext, SourceFile};
use crate::error::{RuleExecutionError, RuleFailure, RulePhase};
use crate::ignore::IgnoreResolver;
use crate::language;
use crate::rules::{Rule, RuleRegistry};
use crate::store::{CrossFileRecord, CrossFileStore};
use crate::violation::{Diagnostic, DiagnosticKind, SuppressedViolation, Violation};

/// What processing one target produced.
#[derive(Debug, Clone, Default)]
pub struct FileOutcome {
    pub file_path: String,
    pub violations: Vec<Violation>,
    pub suppressed: Vec<SuppressedViolation>,
    pub diagnostics: Vec<Diagnostic>,
    /// The file's language was recognised and its rules ran.
    pub scanned: bool,
    /// The file was readable but its language is unknown.
    pub skipped: bool,
}

impl FileOutcome {
    fn new(file_path: String) -> Self {
        Self {
            file_path,
            ..Default::default()
        }
    }
}

/// Output of one successful `check`.
#[derive(Debug, Default)]
pub struct CheckOutput {
    pub violations: Vec<Violation>,
    /// Cross-file records the rule emitted while checking.
    pub records: Vec<CrossFileRecord>,
}

/// Run `rule.check`, turning an error or a panic into a
/// [`RuleExecutionError`].
pub fn invoke_check(rule: &dyn Rule, ctx: &Context) -> Result<CheckOutput, RuleExecutionError> {
    // Leftovers from a rule that failed before us.
    ctx.take_records();

    let result = panic::catch_unwind(AssertUnwindSafe(|| rule.check(ctx)));
    let records = ctx.take_records();

    let failure = match result {
        Ok(Ok(violations)) => return Ok(CheckOutput { violations, records }),
        Ok(Err(e)) => RuleFailure::Failed(format!("{:#}", e)),
        Err(payload) => RuleFailure::Panicked(panic_message(payload)),
    };
    Err(RuleExecutionError {
        rule_id: rule.rule_id().to_string(),
        phase: RulePhase::Check,
        file_path: Some(ctx.file_path().to_string()),
        failure,
    })
}

/// Run `rule.finalize` with the same isolation as [`invoke_check`].
pub fn invoke_finalize(
    rule: &dyn Rule,
    ctx: &FinalizeContext,
) -> Result<Vec<Violation>, RuleExecutionError> {
    let failure = match panic::catch_unwind(AssertUnwindSafe(|| rule.finalize(ctx))) {
        Ok(Ok(violations)) => return Ok(violations),
        Ok(Err(e)) => RuleFailure::Failed(format!("{:#}", e)),
        Err(payload) => RuleFailure::Panicked(panic_message(payload)),
    };
    Err(RuleExecutionError {
        rule_id: rule.rule_id().to_string(),
        phase: RulePhase::Finalize,
        file_path: None,
        failure,
    })
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Split `violations` into reported and suppressed, consulting line and
/// function scopes (and everything broader) at each violation's location.
pub fn apply_ignores(
    ignores: &IgnoreResolver,
    violations: Vec<Violation>,
    reported: &mut Vec<Violation>,
    suppressed: &mut Vec<SuppressedViolation>,
) {
    for violation in violations {
        match ignores.resolve(
            &violation.rule_id,
            &violation.file_path,
            Some(violation.line),
            None,
        ) {
            Some(scope) => suppressed.push(SuppressedViolation { violation, scope }),
            None => reported.push(violation),
        }
    }
}

/// Processes files against one registry, resolver and store handle.
///
/// The sequential path uses the orchestrator's own; every parallel shard
/// builds a private set.
pub struct Worker<'a> {
    project_root: &'a Path,
    config: &'a LintConfig,
    registry: &'a RuleRegistry,
    ignores: &'a IgnoreResolver,
    store: &'a CrossFileStore,
}

impl<'a> Worker<'a> {
    pub fn new(
        project_root: &'a Path,
        config: &'a LintConfig,
        registry: &'a RuleRegistry,
        ignores: &'a IgnoreResolver,
        store: &'a CrossFileStore,
    ) -> Self {
        Self {
            project_root,
            config,
            registry,
            ignores,
            store,
        }
    }

    /// Lint one file with every enabled rule for its language.
    pub fn process(&self, path: &Path) -> FileOutcome {
        let rel = relative_path(self.project_root, path);
        let mut outcome = FileOutcome::new(rel.clone());

        let source = match SourceFile::read(self.project_root, path) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(file = %rel, error = %e, "cannot read file");
                outcome.diagnostics.push(
                    Diagnostic::new(DiagnosticKind::FileRead, format!("cannot read file: {}", e))
                        .in_file(&rel),
                );
                for rule in self.registry.all().filter(|r| r.is_stateful()) {
                    self.forget(rule.rule_id(), &rel, &mut outcome);
                }
                return outcome;
            }
        };

        let Some(language) = language::detect(path, source.first_line()) else {
            tracing::debug!(file = %rel, "unknown language, skipping");
            outcome.skipped = true;
            return outcome;
        };
        outcome.scanned = true;

        let ctx = Context::new(&source, language, self.project_root, self.config, self.ignores);
        let directives = self.ignores.load_file_directives(&ctx);
        outcome
            .diagnostics
            .extend(directives.errors.iter().map(|e| e.to_diagnostic()));

        let rules = self
            .registry
            .list(language, |id| self.config.is_rule_enabled(id));
        tracing::debug!(file = %rel, language = %language.as_str(), rules = rules.len(), "dispatching");
        for rule in rules {
            self.run_rule(rule, &ctx, &mut outcome);
        }
        outcome
    }

    fn run_rule(&self, rule: &dyn Rule, ctx: &Context, outcome: &mut FileOutcome) {
        let rule_id = rule.rule_id();
        if self.ignores.is_file_ignored(rule_id, ctx.file_path()) {
            tracing::debug!(file = %ctx.file_path(), rule = %rule_id, "rule ignored for file");
            if rule.is_stateful() {
                self.forget(rule_id, ctx.file_path(), outcome);
            }
            return;
        }

        let violations = if rule.is_stateful() {
            self.check_stateful(rule, ctx, outcome)
        } else {
            match invoke_check(rule, ctx) {
                Ok(output) => Some(output.violations),
                Err(e) => {
                    self.report_failure(e, outcome);
                    None
                }
            }
        };

        if let Some(violations) = violations {
            apply_ignores(
                self.ignores,
                violations,
                &mut outcome.violations,
                &mut outcome.suppressed,
            );
        }
    }

    /// Check a stateful rule, reusing the cached output of an unchanged
    /// file and otherwise replacing the file's records with fresh ones.
    fn check_stateful(
        &self,
        rule: &dyn Rule,
        ctx: &Context,
        outcome: &mut FileOutcome,
    ) -> Option<Vec<Violation>> {
        let rule_id = rule.rule_id();
        let file_path = ctx.file_path();
        let fingerprint = self.config.config_for(rule_id).fingerprint();

        match self
            .store
            .cached_check(rule_id, file_path, ctx.content_hash(), &fingerprint)
        {
            Ok(Some(violations)) => {
                tracing::debug!(file = %file_path, rule = %rule_id, "reusing cached records");
                return Some(violations);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(file = %file_path, rule = %rule_id, error = %e, "cache lookup failed");
                outcome
                    .diagnostics
                    .push(e.to_diagnostic().for_rule(rule_id).in_file(file_path));
            }
        }

        match invoke_check(rule, ctx) {
            Ok(output) => {
                if let Err(e) = self.store.replace_file_records(
                    rule_id,
                    file_path,
                    ctx.content_hash(),
                    &fingerprint,
                    &output.records,
                    &output.violations,
                ) {
                    tracing::warn!(file = %file_path, rule = %rule_id, error = %e, "storing records failed");
                    outcome
                        .diagnostics
                        .push(e.to_diagnostic().for_rule(rule_id).in_file(file_path));
                }
                Some(output.violations)
            }
            Err(e) => {
                self.report_failure(e, outcome);
                self.forget(rule_id, file_path, outcome);
                None
            }
        }
    }

    fn forget(&self, rule_id: &str, file_path: &str, outcome: &mut FileOutcome) {
        if let Err(e) = self.store.forget_file(rule_id, file_path) {
            tracing::warn!(file = %file_path, rule = %rule_id, error = %e, "dropping stale records failed");
            outcome
                .diagnostics
                .push(e.to_diagnostic().for_rule(rule_id).in_file(file_path));
        }
    }

    fn report_failure(&self, error: RuleExecutionError, outcome: &mut FileOutcome) {
        tracing::warn!(error = %error, "rule failed");
        outcome.diagnostics.push(error.to_diagnostic());
    }
}

//! Error kinds for the lint engine.
//!
//! Fatal kinds (`ConfigError`, `DiscoveryError`) abort a run before any file
//! is processed. Recoverable kinds (`RuleExecutionError`,
//! `DirectiveParseError`, `StoreError`) are converted into
//! [`Diagnostic`](crate::violation::Diagnostic)s and never abort a run.

use std::path::PathBuf;
use thiserror::Error;

use crate::violation::{Diagnostic, DiagnosticKind};

/// Malformed or unusable configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("parsing JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid rule pattern {pattern:?}: {reason}")]
    InvalidRulePattern { pattern: String, reason: String },
    #[error("invalid exclude glob {pattern:?}: {reason}")]
    InvalidGlob { pattern: String, reason: String },
    #[error("options for {key:?} must be a mapping")]
    InvalidRuleOptions { key: String },
    #[error("parallel.workers must be at least 1")]
    InvalidWorkerCount,
}

/// Problems registering or discovering rules.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("duplicate rule id {rule_id:?} registered by {existing} and {duplicate}")]
    DuplicateRuleId {
        rule_id: String,
        existing: String,
        duplicate: String,
    },
    #[error("invalid rule id {rule_id:?}: {reason}")]
    InvalidRuleId { rule_id: String, reason: String },
}

/// Failure of the cross-file store. Always recovered by the caller.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store I/O at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encoding cached violations: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("schema version {found} does not match {expected}")]
    SchemaMismatch { found: i64, expected: i64 },
    #[error("database failed integrity check: {0}")]
    Corrupt(String),
    #[error("in-memory store cannot be shared with workers")]
    NotShareable,
}

impl StoreError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::Store, self.to_string())
    }
}

/// How a rule invocation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleFailure {
    /// The rule returned an error.
    Failed(String),
    /// The rule panicked; the payload message if it was a string.
    Panicked(String),
}

/// A rule failed while analysing one file or while finalizing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("rule {rule_id} {phase} failed{}: {}", file_suffix(.file_path), failure_text(.failure))]
pub struct RuleExecutionError {
    pub rule_id: String,
    pub phase: RulePhase,
    pub file_path: Option<String>,
    pub failure: RuleFailure,
}

/// Lifecycle phase a rule was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulePhase {
    Check,
    Finalize,
}

impl std::fmt::Display for RulePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RulePhase::Check => write!(f, "check"),
            RulePhase::Finalize => write!(f, "finalize"),
        }
    }
}

fn file_suffix(file: &Option<String>) -> String {
    file.as_ref()
        .map(|f| format!(" on {}", f))
        .unwrap_or_default()
}

fn failure_text(failure: &RuleFailure) -> String {
    match failure {
        RuleFailure::Failed(msg) => msg.clone(),
        RuleFailure::Panicked(msg) => format!("panicked: {}", msg),
    }
}

impl RuleExecutionError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag =
            Diagnostic::new(DiagnosticKind::RuleExecution, self.to_string()).for_rule(&self.rule_id);
        if let Some(file) = &self.file_path {
            diag = diag.in_file(file);
        }
        diag
    }
}

/// A malformed ignore directive, treated as absent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{file_path}:{line}: {message}")]
pub struct DirectiveParseError {
    pub file_path: String,
    pub line: usize,
    pub message: String,
}

impl DirectiveParseError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::IgnoreDirectiveParse, self.message.clone())
            .in_file(&self.file_path)
            .at_line(self.line)
    }
}

/// Fatal errors returned by the orchestrator.
#[derive(Error, Debug)]
pub enum LintError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error("accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("walking {path}: {message}")]
    Walk { path: PathBuf, message: String },
    #[error("building worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error("no usable cross-file store: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_execution_error_message() {
        let err = RuleExecutionError {
            rule_id: "nesting.excessive-depth".to_string(),
            phase: RulePhase::Check,
            file_path: Some("src/app.py".to_string()),
            failure: RuleFailure::Panicked("index out of bounds".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "rule nesting.excessive-depth check failed on src/app.py: panicked: index out of bounds"
        );

        let diag = err.to_diagnostic();
        assert_eq!(diag.kind, DiagnosticKind::RuleExecution);
        assert_eq!(diag.rule_id.as_deref(), Some("nesting.excessive-depth"));
        assert_eq!(diag.file_path.as_deref(), Some("src/app.py"));
    }

    #[test]
    fn test_finalize_error_without_file() {
        let err = RuleExecutionError {
            rule_id: "dry.duplicate-code".to_string(),
            phase: RulePhase::Finalize,
            file_path: None,
            failure: RuleFailure::Failed("query failed".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "rule dry.duplicate-code finalize failed: query failed"
        );
    }
}

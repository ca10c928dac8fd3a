//! Core result types: violations, diagnostics and the run report.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::ignore::IgnoreScope;

/// Severity levels for violations.
///
/// Every built-in rule reports errors; the enum stays open so new levels can
/// be added without touching the rule contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Severity {
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Severity::Error),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

/// A single reported issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    /// Project-root relative path with `/` separators.
    pub file_path: String,
    /// 1-indexed line.
    pub line: usize,
    /// 1-indexed column, 0 when unknown.
    pub column: usize,
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Violation {
    pub fn new(
        rule_id: impl Into<String>,
        file_path: impl Into<String>,
        line: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            file_path: file_path.into(),
            line,
            column: 0,
            message: message.into(),
            severity: Severity::Error,
            suggestion: None,
        }
    }

    pub fn with_column(mut self, column: usize) -> Self {
        self.column = column;
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Total order used for final output: path, line, rule, then the rest.
    pub fn report_order(&self, other: &Self) -> Ordering {
        self.file_path
            .cmp(&other.file_path)
            .then(self.line.cmp(&other.line))
            .then_with(|| self.rule_id.cmp(&other.rule_id))
            .then(self.column.cmp(&other.column))
            .then_with(|| self.message.cmp(&other.message))
    }
}

/// A violation that an ignore directive silenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressedViolation {
    pub violation: Violation,
    pub scope: IgnoreScope,
}

/// Category of a non-fatal internal diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A rule failed or panicked on one file (or in finalize).
    RuleExecution,
    /// An inline or file-based ignore directive could not be parsed.
    IgnoreDirectiveParse,
    /// The cross-file store degraded to a cold or non-shared state.
    Store,
    /// A target file could not be read.
    FileRead,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DiagnosticKind::RuleExecution => "rule_execution",
            DiagnosticKind::IgnoreDirectiveParse => "ignore_directive_parse",
            DiagnosticKind::Store => "store",
            DiagnosticKind::FileRead => "file_read",
        };
        write!(f, "{}", s)
    }
}

/// Degraded-analysis signal surfaced next to the violations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            rule_id: None,
            file_path: None,
            line: None,
            message: message.into(),
        }
    }

    pub fn for_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn in_file(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    fn sort_key(&self) -> (&str, usize, DiagnosticKind, &str, &str) {
        (
            self.file_path.as_deref().unwrap_or(""),
            self.line.unwrap_or(0),
            self.kind,
            self.rule_id.as_deref().unwrap_or(""),
            &self.message,
        )
    }
}

/// Results of one lint run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LintReport {
    pub violations: Vec<Violation>,
    /// Violations silenced by ignore directives.
    #[serde(default)]
    pub suppressed: Vec<SuppressedViolation>,
    /// Non-fatal problems encountered during the run.
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    /// Files whose language was recognised and linted.
    pub files_scanned: usize,
    /// Files skipped because their language is unknown.
    pub files_skipped: usize,
}

impl LintReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort everything into the deterministic output order.
    pub fn sort(&mut self) {
        self.violations.sort_by(|a, b| a.report_order(b));
        self.suppressed
            .sort_by(|a, b| a.violation.report_order(&b.violation));
        self.diagnostics.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        self.diagnostics.dedup();
    }

    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    /// True when some part of the analysis ran degraded.
    pub fn is_degraded(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn suppressed_count(&self) -> usize {
        self.suppressed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_order_is_path_line_rule() {
        let mut report = LintReport::new();
        report.violations = vec![
            Violation::new("z.rule", "b.py", 1, "m"),
            Violation::new("b.rule", "a.py", 10, "m"),
            Violation::new("a.rule", "a.py", 10, "m"),
            Violation::new("a.rule", "a.py", 2, "m"),
        ];
        report.sort();

        let order: Vec<_> = report
            .violations
            .iter()
            .map(|v| format!("{}:{}:{}", v.file_path, v.line, v.rule_id))
            .collect();
        assert_eq!(
            order,
            vec!["a.py:2:a.rule", "a.py:10:a.rule", "a.py:10:b.rule", "b.py:1:z.rule"]
        );
    }

    #[test]
    fn test_severity_round_trip_text() {
        assert_eq!("ERROR".parse::<Severity>().unwrap(), Severity::Error);
        assert!("fatal".parse::<Severity>().is_err());
        assert_eq!(Severity::Error.to_string(), "error");
    }

    #[test]
    fn test_diagnostics_mark_report_degraded() {
        let mut report = LintReport::new();
        assert!(!report.is_degraded());
        report
            .diagnostics
            .push(Diagnostic::new(DiagnosticKind::Store, "cold start"));
        assert!(report.is_degraded());
    }
}

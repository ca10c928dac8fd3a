//! Output formatting for lint reports.
//!
//! Two formats:
//! - Pretty: colored terminal output for humans
//! - JSON: structured output for tooling

use colored::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::violation::{Diagnostic, LintReport, Severity, SuppressedViolation, Violation};

// =============================================================================
// JSON Format
// =============================================================================

/// Top-level JSON document.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonReport {
    pub version: String,
    pub path: String,
    pub passed: bool,
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub violations: Vec<JsonViolation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suppressed: Vec<JsonSuppressedViolation>,
    pub suppressed_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
    /// Violation counts per rule id.
    pub breakdown: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonViolation {
    pub rule: String,
    pub severity: String,
    pub file: String,
    pub line: usize,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub column: usize,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonSuppressedViolation {
    pub violation: JsonViolation,
    /// Scope of the directive that silenced it.
    pub scope: String,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

fn violation_to_json(v: &Violation) -> JsonViolation {
    JsonViolation {
        rule: v.rule_id.clone(),
        severity: v.severity.to_string(),
        file: v.file_path.clone(),
        line: v.line,
        column: v.column,
        message: v.message.clone(),
        suggestion: v.suggestion.clone(),
    }
}

/// Build the JSON document. Suppressed details are included only when
/// asked for; the count is always present.
pub fn to_json_report(path: &str, report: &LintReport, show_suppressed: bool) -> JsonReport {
    let suppressed = if show_suppressed {
        report
            .suppressed
            .iter()
            .map(|sv| JsonSuppressedViolation {
                violation: violation_to_json(&sv.violation),
                scope: sv.scope.to_string(),
            })
            .collect()
    } else {
        Vec::new()
    };

    JsonReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        path: path.to_string(),
        passed: !report.has_violations(),
        files_scanned: report.files_scanned,
        files_skipped: report.files_skipped,
        violations: report.violations.iter().map(violation_to_json).collect(),
        suppressed,
        suppressed_count: report.suppressed_count(),
        diagnostics: report.diagnostics.clone(),
        breakdown: breakdown(&report.violations),
    }
}

/// Write the report as pretty-printed JSON to stdout.
pub fn write_json(path: &str, report: &LintReport, show_suppressed: bool) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&to_json_report(path, report, show_suppressed))?;
    println!("{}", json);
    Ok(())
}

fn breakdown(violations: &[Violation]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for v in violations {
        *counts.entry(v.rule_id.clone()).or_insert(0) += 1;
    }
    counts
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write the report in human-readable form to stdout.
pub fn write_pretty(path: &str, report: &LintReport, show_suppressed: bool) {
    println!();
    print!("  ");
    print!("{}", "layerlint".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();

    print!("  {}", "Scanning: ".dimmed());
    println!("{}", path);
    println!();

    write_result_summary(report);
    println!();

    if !report.violations.is_empty() {
        write_violations(&report.violations);
        println!();
    }

    if !report.suppressed.is_empty() {
        write_suppressed_summary(&report.suppressed, show_suppressed);
        println!();
    }

    if !report.diagnostics.is_empty() {
        write_diagnostics(&report.diagnostics);
        println!();
    }

    let counts = breakdown(&report.violations);
    if !counts.is_empty() {
        write_breakdown(&counts);
        println!();
    }
}

fn write_result_summary(report: &LintReport) {
    if report.has_violations() {
        print!("  {}", "✗ FAIL".red());
    } else {
        print!("  {}", "✓ PASS".green());
    }

    print!(
        "  {} files scanned, {} skipped",
        report.files_scanned, report.files_skipped
    );

    if report.suppressed_count() > 0 {
        print!(
            "  {}",
            format!("({} suppressed)", report.suppressed_count()).dimmed()
        );
    }
    if report.is_degraded() {
        print!("  {}", "(degraded)".yellow());
    }

    println!();
}

fn write_violations(violations: &[Violation]) {
    println!("  {} ({}):", "Violations".bold(), violations.len());
    println!();

    for v in violations {
        write_severity_tag(&v.severity);
        print!("   ");
        print!("{:<36}", v.rule_id.as_str().dimmed());
        print!("{}", v.file_path.blue());
        if v.line > 0 {
            print!("{}", format!(":{}", v.line).dimmed());
        }
        if v.column > 0 {
            print!("{}", format!(":{}", v.column).dimmed());
        }
        println!();

        println!("            {}", v.message);
        if let Some(suggestion) = &v.suggestion {
            println!("            {}", format!("hint: {}", suggestion).dimmed());
        }
        println!();
    }
}

fn write_severity_tag(severity: &Severity) {
    match severity {
        Severity::Error => print!("    {} ", "ERROR".red()),
    }
}

fn write_suppressed_summary(suppressed: &[SuppressedViolation], show_details: bool) {
    println!("  {} ({}):", "Suppressed".dimmed(), suppressed.len());

    if !show_details {
        println!("    {}", "(use --show-suppressed to see details)".dimmed());
        return;
    }

    println!();
    for sv in suppressed {
        let v = &sv.violation;
        print!("    {:<36}", v.rule_id.as_str().dimmed());
        print!("{}", v.file_path.blue());
        if v.line > 0 {
            print!("{}", format!(":{}", v.line).dimmed());
        }
        println!("  {}", format!("({} scope)", sv.scope).dimmed());
    }
}

fn write_diagnostics(diagnostics: &[Diagnostic]) {
    println!("  {} ({}):", "Diagnostics".yellow(), diagnostics.len());
    for d in diagnostics {
        print!("    {:<24}", d.kind.to_string().dimmed());
        if let Some(file) = &d.file_path {
            print!("{}", file.blue());
            if let Some(line) = d.line {
                print!("{}", format!(":{}", line).dimmed());
            }
            print!("  ");
        }
        println!("{}", d.message);
    }
}

fn write_breakdown(counts: &BTreeMap<String, usize>) {
    println!("  {}", "Breakdown:".bold());

    let mut rules: Vec<(&String, &usize)> = counts.iter().collect();
    rules.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    for (rule, count) in rules {
        let plural = if *count != 1 { "s" } else { "" };
        println!("    {:<36} {} violation{}", rule, count, plural);
    }
}

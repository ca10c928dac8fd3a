//! Command-line interface for layerlint.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::LintConfig;
use crate::orchestrator::Orchestrator;
use crate::report;
use crate::rules::RuleRegistry;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Pluggable multi-language linter with layered ignores and cross-file rules.
#[derive(Parser)]
#[command(name = "layerlint")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Lint a file or directory
    #[command(visible_alias = "check")]
    Lint(LintArgs),
    /// List the rules a configuration enables
    Rules(RulesArgs),
}

/// Arguments for the lint command.
#[derive(Args)]
pub struct LintArgs {
    /// Path to lint (file or directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Config file (default: auto-discover in the project root)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Dispatch files to a worker pool
    #[arg(long)]
    pub parallel: bool,

    /// Worker count for --parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Do not persist the cross-file store between runs
    #[arg(long)]
    pub no_cache: bool,

    /// Only discover rules matching these patterns (repeatable)
    #[arg(short, long = "rule")]
    pub rules: Vec<String>,

    /// Do not descend into subdirectories
    #[arg(long)]
    pub no_recursive: bool,

    /// Show suppressed violations in output
    #[arg(long)]
    pub show_suppressed: bool,
}

/// Arguments for the rules command.
#[derive(Args)]
pub struct RulesArgs {
    /// Config file (default: auto-discover in the current directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Load an explicit config or discover one in `dir`.
fn load_config(explicit: Option<&Path>, dir: &Path) -> anyhow::Result<LintConfig> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => LintConfig::discover(dir),
    };
    match path {
        Some(path) => {
            tracing::debug!(config = %path.display(), "loading config");
            Ok(LintConfig::from_file(&path)?)
        }
        None => Ok(LintConfig::default()),
    }
}

/// Run the lint command.
pub fn run_lint(args: &LintArgs) -> anyhow::Result<i32> {
    if args.format != "pretty" && args.format != "json" {
        eprintln!(
            "Error: invalid format {:?}, must be 'pretty' or 'json'",
            args.format
        );
        return Ok(EXIT_ERROR);
    }

    let abs_path = match args.path.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: cannot access path {:?}: {}", args.path, e);
            return Ok(EXIT_ERROR);
        }
    };
    let is_dir = abs_path.is_dir();
    let project_root = if is_dir {
        abs_path.clone()
    } else {
        match abs_path.parent() {
            Some(parent) => parent.to_path_buf(),
            None => abs_path.clone(),
        }
    };

    let mut config = match load_config(args.config.as_deref(), &project_root) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            return Ok(EXIT_ERROR);
        }
    };
    if args.parallel {
        config.parallel.enabled = true;
    }
    if let Some(jobs) = args.jobs {
        config.parallel.workers = jobs;
    }
    if args.no_cache {
        config.cache.enabled = false;
    }
    if !args.rules.is_empty() {
        config.namespaces = args.rules.clone();
    }

    let mut orchestrator = match Orchestrator::new(&project_root, config) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let result = if is_dir {
        orchestrator.lint_directory(&abs_path, !args.no_recursive)
    } else {
        orchestrator.lint_file(&abs_path)
    };
    let lint_report = match result {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let path_str = args.path.to_string_lossy().to_string();
    match args.format.as_str() {
        "json" => report::write_json(&path_str, &lint_report, args.show_suppressed)?,
        _ => report::write_pretty(&path_str, &lint_report, args.show_suppressed),
    }

    if lint_report.has_violations() {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

/// Run the rules command.
pub fn run_rules(args: &RulesArgs) -> anyhow::Result<i32> {
    let cwd = std::env::current_dir()?;
    let config = match load_config(args.config.as_deref(), &cwd) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let mut registry = RuleRegistry::new();
    if let Err(e) = registry.discover(&config.namespaces) {
        eprintln!("Error: {}", e);
        return Ok(EXIT_ERROR);
    }

    println!("Registered rules:");
    println!();
    for rule in registry.all() {
        let languages: Vec<&str> = rule
            .applicable_languages()
            .iter()
            .map(|l| l.as_str())
            .collect();
        let mut flags = Vec::new();
        if rule.is_stateful() {
            flags.push("cross-file");
        }
        if !config.is_rule_enabled(rule.rule_id()) {
            flags.push("disabled");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        println!("  {:<38} {}{}", rule.rule_id(), languages.join(", "), flags);
        if !rule.description().is_empty() {
            println!("  {:<38} {}", "", rule.description());
        }
    }

    Ok(EXIT_SUCCESS)
}

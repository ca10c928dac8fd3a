//! layerlint - pluggable multi-language linter.
//!
//! Runs a registry of independent rules over Python, TypeScript and
//! JavaScript sources, filters their findings through a five-scope ignore
//! model and supports cross-file rules through a persistent record store.
//!
//! # Architecture
//!
//! - `language`: extension and shebang based language detection
//! - `rules`: the `Rule` contract, the registry and the built-in rules
//! - `ignore`: repo, directory, file, function and line suppressions
//! - `store`: SQLite-backed cross-file record store
//! - `orchestrator`: dispatch (sequential or parallel), finalize, ordering
//! - `report`: output formatting (pretty, JSON)
//!
//! # Adding a Rule
//!
//! See `src/rules/`. Implement `Rule`, expose a `RuleDescriptor` and list it
//! in `BUILTIN_RULES`, or hand it to `Orchestrator::register`.

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod ignore;
pub mod language;
pub mod orchestrator;
pub mod parser;
pub mod report;
pub mod rules;
pub mod store;
pub mod violation;

pub use config::LintConfig;
pub use context::{Context, FinalizeContext};
pub use error::{ConfigError, DiscoveryError, LintError, StoreError};
pub use ignore::{IgnoreResolver, IgnoreScope};
pub use language::Language;
pub use orchestrator::Orchestrator;
pub use rules::{Rule, RuleDescriptor, RuleRegistry};
pub use store::CrossFileStore;
pub use violation::{Diagnostic, DiagnosticKind, LintReport, Severity, Violation};

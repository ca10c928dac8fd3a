//! The rule contract and the built-in rules.
//!
//! A rule inspects one file at a time through a [`Context`]. Stateful rules
//! additionally emit keyed records during `check` (via [`Context::record`])
//! and read them back once per run in `finalize`, which is where cross-file
//! findings are produced.
//!
//! # Adding a rule
//!
//! 1. Create a module here implementing [`Rule`]
//! 2. Give it a `DESCRIPTOR` constant built with [`RuleDescriptor::new`]
//! 3. List the descriptor in [`BUILTIN_RULES`]

pub mod duplicate_code;
pub mod nesting;
mod registry;
pub mod stringly_typed;
pub mod tokens;

pub use registry::RuleRegistry;

use crate::context::{Context, FinalizeContext};
use crate::language::Language;
use crate::violation::Violation;

/// A lint rule.
///
/// Instances are created per registry from a [`RuleDescriptor`] factory, so
/// a rule may keep private caches; it must not rely on state shared with
/// other instances of itself.
pub trait Rule: Send {
    /// Dot-namespaced, globally unique id (`family.name`).
    fn rule_id(&self) -> &str;

    /// Languages the rule is dispatched for.
    fn applicable_languages(&self) -> &[Language];

    /// Whether the rule takes part in the cross-file protocol.
    fn is_stateful(&self) -> bool {
        false
    }

    /// Short human description, shown by `layerlint rules`.
    fn description(&self) -> &str {
        ""
    }

    /// Analyse one file.
    fn check(&self, ctx: &Context) -> anyhow::Result<Vec<Violation>>;

    /// Produce cross-file findings. Called exactly once per run, after every
    /// `check`, for stateful rules only.
    fn finalize(&self, _ctx: &FinalizeContext) -> anyhow::Result<Vec<Violation>> {
        Ok(Vec::new())
    }
}

/// How to build a rule, plus where its implementation lives.
#[derive(Clone, Copy)]
pub struct RuleDescriptor {
    /// Module path of the implementation; tells duplicate registrations of
    /// the same rule apart from two different rules claiming one id.
    pub origin: &'static str,
    pub factory: fn() -> Box<dyn Rule>,
}

impl RuleDescriptor {
    pub const fn new(origin: &'static str, factory: fn() -> Box<dyn Rule>) -> Self {
        Self { origin, factory }
    }

    pub fn build(&self) -> Box<dyn Rule> {
        (self.factory)()
    }
}

impl std::fmt::Debug for RuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleDescriptor")
            .field("origin", &self.origin)
            .finish()
    }
}

/// Every rule shipped with layerlint, in registration order.
pub const BUILTIN_RULES: &[RuleDescriptor] = &[
    nesting::DESCRIPTOR,
    duplicate_code::DESCRIPTOR,
    stringly_typed::DESCRIPTOR,
];

/// Validate a rule id: non-empty dot-separated segments of
/// `[A-Za-z0-9_-]`.
pub fn validate_rule_id(rule_id: &str) -> Result<(), String> {
    if rule_id.is_empty() {
        return Err("rule id is empty".to_string());
    }
    for segment in rule_id.split('.') {
        if segment.is_empty() {
            return Err("empty segment".to_string());
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(format!("invalid segment {:?}", segment));
        }
    }
    Ok(())
}

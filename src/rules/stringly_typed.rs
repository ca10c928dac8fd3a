//! The same literal string set validated in several places.
//!
//! `status in ("open", "closed")` written in three modules is an enum
//! waiting to happen. Each membership test is recorded under a hash of its
//! sorted string set; finalize reports sets that show up in enough files.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{Rule, RuleDescriptor};
use crate::context::{Context, FinalizeContext};
use crate::language::Language;
use crate::store;
use crate::violation::Violation;

pub const RULE_ID: &str = "stringly-typed.repeated-validation";

pub const DEFAULT_MIN_FILES: usize = 2;
pub const DEFAULT_MIN_OCCURRENCES: usize = 2;

pub const DESCRIPTOR: RuleDescriptor = RuleDescriptor::new(module_path!(), build);

fn build() -> Box<dyn Rule> {
    Box::new(RepeatedValidation)
}

pub struct RepeatedValidation;

lazy_static::lazy_static! {
    /// `x in ("a", "b")`, `x not in ["a", "b"]`, `x in {"a", "b"}`
    static ref PYTHON_MEMBERSHIP: Regex = Regex::new(
        r#"\bin\s*[\(\[\{]\s*((?:(?:"[^"\\]*"|'[^'\\]*')\s*,\s*)+(?:"[^"\\]*"|'[^'\\]*')\s*,?)\s*[\)\]\}]"#
    ).unwrap();

    /// `["a", "b"].includes(x)`
    static ref INCLUDES: Regex = Regex::new(
        r#"\[\s*((?:(?:"[^"\\]*"|'[^'\\]*')\s*,\s*)+(?:"[^"\\]*"|'[^'\\]*')\s*,?)\s*\]\s*\.\s*includes\s*\("#
    ).unwrap();

    /// `new Set(["a", "b"]).has(x)`
    static ref SET_HAS: Regex = Regex::new(
        r#"new\s+Set\s*\(\s*\[\s*((?:(?:"[^"\\]*"|'[^'\\]*')\s*,\s*)+(?:"[^"\\]*"|'[^'\\]*')\s*,?)\s*\]\s*\)\s*\.\s*has\s*\("#
    ).unwrap();

    static ref STRING_LITERAL: Regex = Regex::new(r#""([^"\\]*)"|'([^'\\]*)'"#).unwrap();
}

#[derive(Debug, Serialize, Deserialize)]
struct SetPayload {
    values: Vec<String>,
}

/// A literal string set found in a membership test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipTest {
    pub line: usize,
    pub column: usize,
    /// Sorted, de-duplicated.
    pub values: Vec<String>,
}

fn patterns_for(language: Language) -> Vec<&'static Regex> {
    match language {
        Language::Python => vec![&*PYTHON_MEMBERSHIP],
        Language::TypeScript | Language::JavaScript => vec![&*INCLUDES, &*SET_HAS],
    }
}

/// Find membership tests against literal sets of two or more strings.
pub fn find_membership_tests(content: &str, language: Language) -> Vec<MembershipTest> {
    let comment = language.line_comment();
    let mut found = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        if line.trim_start().starts_with(comment) {
            continue;
        }
        for pattern in patterns_for(language) {
            for caps in pattern.captures_iter(line) {
                let Some(list) = caps.get(1) else {
                    continue;
                };
                let values: BTreeSet<String> = STRING_LITERAL
                    .captures_iter(list.as_str())
                    .filter_map(|c| c.get(1).or_else(|| c.get(2)))
                    .map(|m| m.as_str().to_string())
                    .collect();
                if values.len() < 2 {
                    continue;
                }
                let column = caps.get(0).map(|m| m.start() + 1).unwrap_or(0);
                found.push(MembershipTest {
                    line: idx + 1,
                    column,
                    values: values.into_iter().collect(),
                });
            }
        }
    }

    found.sort_by_key(|t| (t.line, t.column));
    found
}

fn set_key(values: &[String]) -> String {
    // Unit separator keeps ["a,b"] and ["a", "b"] apart.
    store::hash_hex(values.join("\u{1f}").as_bytes())
}

impl Rule for RepeatedValidation {
    fn rule_id(&self) -> &str {
        RULE_ID
    }

    fn applicable_languages(&self) -> &[Language] {
        Language::ALL
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn description(&self) -> &str {
        "The same literal string set validated in several files"
    }

    fn check(&self, ctx: &Context) -> anyhow::Result<Vec<Violation>> {
        for test in find_membership_tests(ctx.raw_content(), ctx.language()) {
            let payload = serde_json::to_string(&SetPayload {
                values: test.values.clone(),
            })?;
            ctx.record(set_key(&test.values), test.line, test.line, payload);
        }
        Ok(Vec::new())
    }

    fn finalize(&self, ctx: &FinalizeContext) -> anyhow::Result<Vec<Violation>> {
        let options = ctx.config_for(RULE_ID);
        let min_files = options.get_usize("min_files", DEFAULT_MIN_FILES);
        let min_occurrences = options.get_usize("min_occurrences", DEFAULT_MIN_OCCURRENCES);

        let mut violations = Vec::new();
        for group in ctx.store().query(RULE_ID, min_occurrences)? {
            if group.distinct_files() < min_files {
                continue;
            }
            let Some(first) = group.records.first() else {
                continue;
            };
            let payload: SetPayload = serde_json::from_str(&first.payload)?;
            let quoted: Vec<String> = payload.values.iter().map(|v| format!("{:?}", v)).collect();
            let elsewhere: Vec<String> = group
                .records
                .iter()
                .skip(1)
                .map(|r| format!("{}:{}", r.file_path, r.line))
                .collect();
            violations.push(
                Violation::new(
                    RULE_ID,
                    first.file_path.as_str(),
                    first.line,
                    format!(
                        "String set {{{}}} is validated in {} places across {} files: also at {}",
                        quoted.join(", "),
                        group.records.len(),
                        group.distinct_files(),
                        elsewhere.join(", ")
                    ),
                )
                .with_suggestion("Define the allowed values once as an enum or constant"),
            );
        }
        Ok(violations)
    }
}

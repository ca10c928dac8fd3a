//! Duplicated code blocks across (and within) files.
//!
//! `check` hashes every window of `min_lines` normalized lines and records
//! each window under its hash. `finalize` reads the groups back, drops
//! self-overlapping windows, merges runs of consecutive windows into one
//! block and reports each block once, citing every copy.

use serde::{Deserialize, Serialize};

use super::tokens::{self, NormalizedLine};
use super::{Rule, RuleDescriptor};
use crate::context::{Context, FinalizeContext};
use crate::language::Language;
use crate::store::{self, CrossFileRecord};
use crate::violation::Violation;

pub const RULE_ID: &str = "dry.duplicate-code";

pub const DEFAULT_MIN_LINES: usize = 4;
pub const DEFAULT_MIN_TOKENS: usize = 12;
pub const DEFAULT_MIN_OCCURRENCES: usize = 2;

pub const DESCRIPTOR: RuleDescriptor = RuleDescriptor::new(module_path!(), build);

fn build() -> Box<dyn Rule> {
    Box::new(DuplicateCode)
}

pub struct DuplicateCode;

#[derive(Debug, Serialize, Deserialize)]
struct WindowPayload {
    tokens: usize,
}

/// One copy of a duplicated block.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Location {
    file_path: String,
    line: usize,
    end_line: usize,
}

impl Location {
    fn from_record(record: &CrossFileRecord) -> Self {
        Self {
            file_path: record.file_path.clone(),
            line: record.line,
            end_line: record.end_line,
        }
    }

    fn overlaps(&self, other: &Location) -> bool {
        self.file_path == other.file_path
            && self.line <= other.end_line
            && other.line <= self.end_line
    }

    /// Whether `next` continues this copy (starts inside it or right after).
    fn continued_by(&self, next: &Location) -> bool {
        self.file_path == next.file_path
            && next.line >= self.line
            && next.line <= self.end_line + 1
    }
}

/// Windows of `min_lines` consecutive significant lines worth recording.
fn windows(lines: &[NormalizedLine], min_lines: usize, min_tokens: usize) -> Vec<(String, usize, usize, usize)> {
    if min_lines == 0 || lines.len() < min_lines {
        return Vec::new();
    }
    lines
        .windows(min_lines)
        .filter_map(|window| {
            let token_count: usize = window.iter().map(|l| l.tokens).sum();
            if token_count < min_tokens {
                return None;
            }
            let text = window
                .iter()
                .map(|l| l.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            let first = window.first()?;
            let last = window.last()?;
            Some((store::hash_hex(text.as_bytes()), first.line, last.line, token_count))
        })
        .collect()
}

/// Keep the first of any same-file overlapping members.
fn distinct_members(records: &[CrossFileRecord]) -> Vec<Location> {
    let mut kept: Vec<Location> = Vec::new();
    for record in records {
        let location = Location::from_record(record);
        if kept.iter().any(|k| k.overlaps(&location)) {
            continue;
        }
        kept.push(location);
    }
    kept
}

/// Merge groups whose copies continue one another into single blocks.
fn merge_blocks(groups: Vec<Vec<Location>>) -> Vec<Vec<Location>> {
    let mut blocks: Vec<Vec<Location>> = Vec::new();
    for group in groups {
        let target = blocks.iter_mut().find(|block| {
            block.len() == group.len()
                && block
                    .iter()
                    .zip(group.iter())
                    .all(|(have, next)| have.continued_by(next))
        });
        match target {
            Some(block) => {
                for (have, next) in block.iter_mut().zip(group) {
                    have.end_line = have.end_line.max(next.end_line);
                }
            }
            None => blocks.push(group),
        }
    }
    blocks
}

fn describe(location: &Location) -> String {
    format!("{}:{}-{}", location.file_path, location.line, location.end_line)
}

impl Rule for DuplicateCode {
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
        "Blocks of code repeated across the project"
    }

    fn check(&self, ctx: &Context) -> anyhow::Result<Vec<Violation>> {
        let options = ctx.config_for(RULE_ID);
        let min_lines = options.get_usize("min_lines", DEFAULT_MIN_LINES);
        let min_tokens = options.get_usize("min_tokens", DEFAULT_MIN_TOKENS);

        let lines = tokens::normalized_lines(ctx.raw_content(), ctx.language());
        for (key, line, end_line, token_count) in windows(&lines, min_lines, min_tokens) {
            let payload = serde_json::to_string(&WindowPayload { tokens: token_count })?;
            ctx.record(key, line, end_line, payload);
        }
        Ok(Vec::new())
    }

    fn finalize(&self, ctx: &FinalizeContext) -> anyhow::Result<Vec<Violation>> {
        let min_occurrences = ctx
            .config_for(RULE_ID)
            .get_usize("min_occurrences", DEFAULT_MIN_OCCURRENCES)
            .max(2);

        let groups: Vec<Vec<Location>> = ctx
            .store()
            .query(RULE_ID, min_occurrences)?
            .iter()
            .map(|group| distinct_members(&group.records))
            .filter(|members| members.len() >= min_occurrences)
            .collect();

        let mut violations = Vec::new();
        for block in merge_blocks(groups) {
            let Some(first) = block.first() else {
                continue;
            };
            let others: Vec<String> = block.iter().skip(1).map(describe).collect();
            let length = first.end_line - first.line + 1;
            violations.push(
                Violation::new(
                    RULE_ID,
                    first.file_path.as_str(),
                    first.line,
                    format!(
                        "Duplicated block of {} lines ({} copies): also at {}",
                        length,
                        block.len(),
                        others.join(", ")
                    ),
                )
                .with_suggestion("Extract the shared code into a function"),
            );
        }
        Ok(violations)
    }
}

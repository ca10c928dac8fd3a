//! Rule-id patterns with dot-segment prefix semantics.

use std::fmt;
use thiserror::Error;

use crate::error::ConfigError;

/// A pattern that failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid rule pattern {pattern:?}: {reason}")]
pub struct InvalidPattern {
    pub pattern: String,
    pub reason: String,
}

impl From<InvalidPattern> for ConfigError {
    fn from(e: InvalidPattern) -> Self {
        ConfigError::InvalidRulePattern {
            pattern: e.pattern,
            reason: e.reason,
        }
    }
}

/// A rule pattern: `*`, an exact rule id, or a dot-aligned prefix.
///
/// `nesting` matches `nesting` and `nesting.excessive-depth` but not
/// `nesting2` or `nest`. `nesting.*` is the same as `nesting`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RulePattern {
    Any,
    Prefix(String),
}

impl RulePattern {
    pub fn parse(text: &str) -> Result<Self, InvalidPattern> {
        let trimmed = text.trim();
        let invalid = |reason: &str| InvalidPattern {
            pattern: text.to_string(),
            reason: reason.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid("pattern is empty"));
        }
        if trimmed == "*" {
            return Ok(RulePattern::Any);
        }

        let body = trimmed.strip_suffix(".*").unwrap_or(trimmed);
        for segment in body.split('.') {
            if segment.is_empty() {
                return Err(invalid("empty segment"));
            }
            if !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return Err(invalid(
                    "segments may only contain letters, digits, '-' and '_'",
                ));
            }
        }
        Ok(RulePattern::Prefix(body.to_string()))
    }

    /// Whether this pattern selects `rule_id`.
    pub fn matches(&self, rule_id: &str) -> bool {
        match self {
            RulePattern::Any => true,
            RulePattern::Prefix(prefix) => match rule_id.strip_prefix(prefix.as_str()) {
                Some("") => true,
                Some(rest) => rest.starts_with('.'),
                None => false,
            },
        }
    }

    /// Higher is narrower: `*` is 0, otherwise the number of segments.
    pub fn specificity(&self) -> usize {
        match self {
            RulePattern::Any => 0,
            RulePattern::Prefix(prefix) => prefix.split('.').count(),
        }
    }
}

impl fmt::Display for RulePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RulePattern::Any => write!(f, "*"),
            RulePattern::Prefix(p) => write!(f, "{}", p),
        }
    }
}

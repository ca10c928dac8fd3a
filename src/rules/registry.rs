//! Rule registration and discovery.

use std::collections::{HashMap, HashSet};

use super::{validate_rule_id, Rule, RuleDescriptor, BUILTIN_RULES};
use crate::error::DiscoveryError;
use crate::ignore::RulePattern;
use crate::language::Language;

struct Registered {
    descriptor: RuleDescriptor,
    rule: Box<dyn Rule>,
}

/// Rules known to a run, keyed by `rule_id`, in registration order.
///
/// Read-only once discovery is done. Parallel workers each build their own
/// registry from [`RuleRegistry::descriptors`].
#[derive(Default)]
pub struct RuleRegistry {
    rules: Vec<Registered>,
    index: HashMap<String, usize>,
    discovered: HashSet<String>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry holding exactly `descriptors`, in order.
    pub fn from_descriptors(descriptors: &[RuleDescriptor]) -> Result<Self, DiscoveryError> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(*descriptor)?;
        }
        Ok(registry)
    }

    /// Register a rule. Registering the same implementation twice is a
    /// no-op; a second implementation claiming a taken id is an error.
    pub fn register(&mut self, descriptor: RuleDescriptor) -> Result<(), DiscoveryError> {
        let rule = descriptor.build();
        let rule_id = rule.rule_id().to_string();
        validate_rule_id(&rule_id).map_err(|reason| DiscoveryError::InvalidRuleId {
            rule_id: rule_id.clone(),
            reason,
        })?;

        if let Some(&idx) = self.index.get(&rule_id) {
            let existing = self.rules[idx].descriptor.origin;
            if existing == descriptor.origin {
                return Ok(());
            }
            return Err(DiscoveryError::DuplicateRuleId {
                rule_id,
                existing: existing.to_string(),
                duplicate: descriptor.origin.to_string(),
            });
        }

        tracing::debug!(rule = %rule_id, origin = descriptor.origin, "registered rule");
        self.index.insert(rule_id, self.rules.len());
        self.rules.push(Registered { descriptor, rule });
        Ok(())
    }

    /// Register the built-in rules under each namespace. An empty list
    /// means every built-in. Each namespace is only searched once per
    /// registry.
    pub fn discover(&mut self, namespaces: &[String]) -> Result<usize, DiscoveryError> {
        let all = ["*".to_string()];
        let namespaces = if namespaces.is_empty() { &all[..] } else { namespaces };

        let before = self.rules.len();
        for namespace in namespaces {
            if !self.discovered.insert(namespace.clone()) {
                continue;
            }
            let pattern = RulePattern::parse(namespace).map_err(|e| DiscoveryError::InvalidRuleId {
                rule_id: namespace.clone(),
                reason: e.reason,
            })?;
            for descriptor in BUILTIN_RULES {
                let matches = pattern.matches(descriptor.build().rule_id());
                if matches {
                    self.register(*descriptor)?;
                }
            }
        }
        Ok(self.rules.len() - before)
    }

    pub fn get(&self, rule_id: &str) -> Option<&dyn Rule> {
        self.index.get(rule_id).map(|&idx| self.rules[idx].rule.as_ref())
    }

    /// Rules applicable to `language` that pass `filter`, in registration
    /// order.
    pub fn list<F>(&self, language: Language, filter: F) -> Vec<&dyn Rule>
    where
        F: Fn(&str) -> bool,
    {
        self.rules
            .iter()
            .map(|r| r.rule.as_ref())
            .filter(|rule| rule.applicable_languages().contains(&language))
            .filter(|rule| filter(rule.rule_id()))
            .collect()
    }

    /// Every registered rule, in registration order.
    pub fn all(&self) -> impl Iterator<Item = &dyn Rule> + '_ {
        self.rules.iter().map(|r| r.rule.as_ref())
    }

    pub fn descriptors(&self) -> Vec<RuleDescriptor> {
        self.rules.iter().map(|r| r.descriptor).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

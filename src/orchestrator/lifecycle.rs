//! Per-run lifecycle of stateful rules.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    Init,
    Collecting,
    Finalizing,
    Done,
}

/// Tracks each stateful rule through INIT -> COLLECTING -> FINALIZING ->
/// DONE so finalize runs at most once per rule per run.
#[derive(Debug, Default)]
pub struct RuleLifecycle {
    states: HashMap<String, RuleState>,
}

impl RuleLifecycle {
    pub fn new<'a>(rule_ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            states: rule_ids
                .into_iter()
                .map(|id| (id.to_string(), RuleState::Init))
                .collect(),
        }
    }

    /// Checks are about to be dispatched.
    pub fn start_collecting(&mut self) {
        for state in self.states.values_mut() {
            if *state == RuleState::Init {
                *state = RuleState::Collecting;
            }
        }
    }

    /// Move a rule into FINALIZING. False when it is unknown or has already
    /// been finalized this run.
    pub fn begin_finalize(&mut self, rule_id: &str) -> bool {
        match self.states.get_mut(rule_id) {
            Some(state) if *state == RuleState::Collecting => {
                *state = RuleState::Finalizing;
                true
            }
            _ => false,
        }
    }

    pub fn finish(&mut self, rule_id: &str) {
        if let Some(state) = self.states.get_mut(rule_id) {
            *state = RuleState::Done;
        }
    }

    pub fn state(&self, rule_id: &str) -> Option<RuleState> {
        self.states.get(rule_id).copied()
    }
}

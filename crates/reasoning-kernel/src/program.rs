//! Patterns, rules, and the pluggable value functions used during resolution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::{ProgramConfig, RuleConfig};

/// An atomic pattern key. The kernel only needs equality and hashing.
pub type Pattern = i64;

/// A rule `head <- when[0], when[1], ...`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RuleDefinition {
    pub head: Pattern,
    pub when: Vec<Pattern>,
    pub head_constraints: Vec<String>,
}

impl RuleDefinition {
    pub fn new(head: Pattern, when: Vec<Pattern>) -> Self {
        Self {
            head,
            when,
            head_constraints: Vec::new(),
        }
    }

    pub fn with_head_constraints(mut self, constraints: Vec<String>) -> Self {
        self.head_constraints = constraints;
        self
    }

    /// Stable label used to name the rule's actors.
    pub fn label(&self) -> String {
        let body: Vec<String> = self.when.iter().map(|p| p.to_string()).collect();
        format!("{}<-{}", self.head, body.join(","))
    }
}

impl From<&RuleConfig> for RuleDefinition {
    fn from(config: &RuleConfig) -> Self {
        Self {
            head: config.head,
            when: config.when.clone(),
            head_constraints: config.head_constraints.clone(),
        }
    }
}

/// Rules indexed by head pattern.
#[derive(Debug, Clone, Default)]
pub struct Program {
    rules: HashMap<Pattern, Vec<RuleDefinition>>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ProgramConfig) -> Self {
        let mut program = Self::new();
        for rule in &config.rules {
            program.add_rule(RuleDefinition::from(rule));
        }
        program
    }

    pub fn with_rule(mut self, rule: RuleDefinition) -> Self {
        self.add_rule(rule);
        self
    }

    /// Adding the same rule twice is a no-op.
    pub fn add_rule(&mut self, rule: RuleDefinition) {
        let rules = self.rules.entry(rule.head).or_default();
        if !rules.contains(&rule) {
            rules.push(rule);
        }
    }

    pub fn rules_for(&self, pattern: Pattern) -> &[RuleDefinition] {
        self.rules.get(&pattern).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn rule_count(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }
}

/// Folds an accumulated partial answer into the single value the next step
/// is seeded with. Sum by default.
#[derive(Clone)]
pub struct Merge(Arc<dyn Fn(&[i64]) -> i64 + Send + Sync>);

impl Merge {
    pub fn new(f: impl Fn(&[i64]) -> i64 + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn apply(&self, partial_answer: &[i64]) -> i64 {
        (self.0)(partial_answer)
    }
}

impl Default for Merge {
    fn default() -> Self {
        Self::new(|values| values.iter().sum())
    }
}

impl fmt::Debug for Merge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Merge(..)")
    }
}

/// Turns a rule body's answer into an answer for the rule head, or rejects
/// it. Passes answers through unchanged by default.
#[derive(Clone)]
pub struct Materializer(Arc<dyn Fn(&[i64], &[String]) -> Option<Vec<i64>> + Send + Sync>);

impl Materializer {
    pub fn new(f: impl Fn(&[i64], &[String]) -> Option<Vec<i64>> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn apply(&self, body_answer: &[i64], head_constraints: &[String]) -> Option<Vec<i64>> {
        (self.0)(body_answer, head_constraints)
    }
}

impl Default for Materializer {
    fn default() -> Self {
        Self::new(|answer, _| Some(answer.to_vec()))
    }
}

impl fmt::Debug for Materializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Materializer(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_are_indexed_by_head() {
        let program = Program::new()
            .with_rule(RuleDefinition::new(5, vec![7]))
            .with_rule(RuleDefinition::new(5, vec![8, 9]))
            .with_rule(RuleDefinition::new(6, vec![5]));

        assert_eq!(program.rules_for(5).len(), 2);
        assert_eq!(program.rules_for(6)[0].when, vec![5]);
        assert!(program.rules_for(42).is_empty());
        assert_eq!(program.rule_count(), 3);
    }

    #[test]
    fn test_duplicate_rules_collapse() {
        let mut program = Program::new();
        program.add_rule(RuleDefinition::new(1, vec![2]));
        program.add_rule(RuleDefinition::new(1, vec![2]));
        assert_eq!(program.rule_count(), 1);
    }

    #[test]
    fn test_default_merge_sums() {
        assert_eq!(Merge::default().apply(&[0, 3, 4]), 7);
        assert_eq!(Merge::default().apply(&[]), 0);
    }

    #[test]
    fn test_default_materializer_is_identity() {
        let materializer = Materializer::default();
        assert_eq!(materializer.apply(&[1, 2], &[]), Some(vec![1, 2]));
    }

    #[test]
    fn test_rule_label() {
        assert_eq!(RuleDefinition::new(5, vec![7, -8]).label(), "5<-7,-8");
    }
}

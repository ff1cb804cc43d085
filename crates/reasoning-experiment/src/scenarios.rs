//! Built-in demo scenarios.
//!
//! Each scenario is a small experiment that exercises one resolution
//! behaviour: pipelined conjunctions, OR over rules, and recursive rules
//! with and without trigger deduplication.

use std::collections::HashMap;

use reasoning_kernel::{ProgramConfig, ResolutionConfig, RuleConfig};

use crate::experiment::{ExperimentFile, QuerySpec};

fn rule(head: i64, when: Vec<i64>) -> RuleConfig {
    RuleConfig {
        head,
        when,
        head_constraints: Vec::new(),
    }
}

/// Two patterns, no rules, mock retrieval.
pub fn pipeline() -> ExperimentFile {
    ExperimentFile {
        resolution: ResolutionConfig {
            traversal_size: 2,
            ..ResolutionConfig::default()
        },
        queries: vec![QuerySpec::new(vec![2, 3]).named("pipeline")],
        ..ExperimentFile::default()
    }
}

/// A pattern answered both directly and through two rules.
pub fn disjunction() -> ExperimentFile {
    ExperimentFile {
        program: ProgramConfig {
            rules: vec![rule(5, vec![7]), rule(5, vec![8, 9])],
        },
        facts: Some(HashMap::from([
            (5, vec![1, 2]),
            (7, vec![10]),
            (8, vec![20, 30]),
            (9, vec![100]),
        ])),
        queries: vec![QuerySpec::new(vec![5]).named("disjunction")],
        ..ExperimentFile::default()
    }
}

/// `5 <- 5`, which only terminates when rule triggers are deduplicated.
pub fn recursion(deduplicate: bool) -> ExperimentFile {
    let name = if deduplicate {
        "recursion-dedup"
    } else {
        "recursion-bounded"
    };
    let mut query = QuerySpec::new(vec![5]).named(name);
    if !deduplicate {
        query = query.with_max_answers(8);
    }
    ExperimentFile {
        resolution: ResolutionConfig {
            deduplicate_rule_triggers: deduplicate,
            ..ResolutionConfig::default()
        },
        program: ProgramConfig {
            rules: vec![rule(5, vec![5])],
        },
        facts: Some(HashMap::from([(5, vec![1])])),
        queries: vec![query],
    }
}

/// Every built-in scenario, by name.
pub fn all() -> Vec<(&'static str, ExperimentFile)> {
    vec![
        ("pipeline", pipeline()),
        ("disjunction", disjunction()),
        ("recursion-dedup", recursion(true)),
        ("recursion-bounded", recursion(false)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_scenario_has_a_query() {
        for (name, scenario) in all() {
            assert!(!scenario.queries.is_empty(), "{name} has no queries");
        }
    }

    #[test]
    fn test_unbounded_recursion_is_capped() {
        assert_eq!(recursion(false).queries[0].max_answers, Some(8));
        assert_eq!(recursion(true).queries[0].max_answers, None);
    }
}

//! Configuration types for the kernel.

use serde::{Deserialize, Serialize};

use crate::program::Pattern;

/// Resolution tuning shared by every actor a `Reasoner` spawns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Values produced per pattern by the default mock retrieval
    pub traversal_size: usize,

    /// Spacing between consecutive mock retrieval values
    pub answer_interval: i64,

    /// Trigger rule alternatives at most once per distinct
    /// (partial answer, constraints) seen by an atomic resolver
    pub deduplicate_rule_triggers: bool,

    /// Buffered outputs per query channel
    pub output_capacity: usize,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            traversal_size: 5,
            answer_interval: 1,
            deduplicate_rule_triggers: false,
            output_capacity: 16,
        }
    }
}

/// The rule base, as written in an experiment file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramConfig {
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// `head <- when` with optional opaque head constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub head: Pattern,

    /// Body patterns, in declaration order
    pub when: Vec<Pattern>,

    #[serde(default)]
    pub head_constraints: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_config_fills_missing_fields() {
        let config: ResolutionConfig =
            serde_json::from_str(r#"{ "traversal_size": 3 }"#).unwrap();
        assert_eq!(config.traversal_size, 3);
        assert_eq!(config.answer_interval, 1);
        assert!(!config.deduplicate_rule_triggers);
        assert_eq!(config.output_capacity, 16);
    }

    #[test]
    fn test_program_config_parses_rules() {
        let json = r#"{
            "rules": [
                { "head": 5, "when": [7, 8] },
                { "head": 6, "when": [5], "head_constraints": ["x > 1"] }
            ]
        }"#;
        let config: ProgramConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].when, vec![7, 8]);
        assert!(config.rules[0].head_constraints.is_empty());
        assert_eq!(config.rules[1].head_constraints, vec!["x > 1".to_string()]);
    }

    #[test]
    fn test_empty_program_config() {
        let config: ProgramConfig = serde_json::from_str("{}").unwrap();
        assert!(config.rules.is_empty());
    }
}

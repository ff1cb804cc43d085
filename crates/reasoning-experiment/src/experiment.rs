//! Experiment runner: builds a reasoner from an experiment file and runs each
//! configured query to completion (or to its answer limit).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use acton_reactive::prelude::*;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use reasoning_kernel::{
    MockRetrieval, Pattern, Program, ProgramConfig, Reasoner, ResolutionConfig, Retrieval,
    Traversal,
};

use crate::results::{QueryReport, RunSummary};

/// One query to run: a conjunction of patterns seeded with `initial`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Label used in reports; defaults to the pattern list
    #[serde(default)]
    pub name: Option<String>,

    pub patterns: Vec<Pattern>,

    #[serde(default)]
    pub initial: i64,

    /// Stop after this many answers even if more are available
    #[serde(default)]
    pub max_answers: Option<usize>,
}

impl QuerySpec {
    pub fn new(patterns: Vec<Pattern>) -> Self {
        Self {
            name: None,
            patterns,
            initial: 0,
            max_answers: None,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_max_answers(mut self, max_answers: usize) -> Self {
        self.max_answers = Some(max_answers);
        self
    }

    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            let patterns: Vec<String> = self.patterns.iter().map(|p| p.to_string()).collect();
            format!("[{}]", patterns.join(", "))
        })
    }
}

/// A complete experiment: tuning, rules, an optional fact table, and queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentFile {
    #[serde(default)]
    pub resolution: ResolutionConfig,

    #[serde(default)]
    pub program: ProgramConfig,

    /// Fixed values per pattern. When absent, the mock retrieval sized by
    /// `resolution` is used.
    #[serde(default)]
    pub facts: Option<HashMap<Pattern, Vec<i64>>>,

    #[serde(default)]
    pub queries: Vec<QuerySpec>,
}

impl ExperimentFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading experiment file {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file = serde_json::from_str(json)?;
        Ok(file)
    }

    fn retrieval(&self) -> Arc<dyn Retrieval> {
        match &self.facts {
            Some(facts) => Arc::new(FactTable::new(facts.clone())),
            None => Arc::new(MockRetrieval::new(
                self.resolution.traversal_size,
                self.resolution.answer_interval,
            )),
        }
    }
}

/// Retrieval over a fixed table; the seed is ignored.
#[derive(Debug, Clone, Default)]
pub struct FactTable {
    facts: HashMap<Pattern, Vec<i64>>,
}

impl FactTable {
    pub fn new(facts: HashMap<Pattern, Vec<i64>>) -> Self {
        Self { facts }
    }
}

impl Retrieval for FactTable {
    fn query(&self, pattern: Pattern, _seed: i64) -> Traversal {
        Traversal::from_values(self.facts.get(&pattern).cloned().unwrap_or_default())
    }
}

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct ExperimentRunnerConfig {
    /// Longest a single pull may take before the query is abandoned
    pub pull_timeout: Duration,
}

impl Default for ExperimentRunnerConfig {
    fn default() -> Self {
        Self {
            pull_timeout: Duration::from_secs(10),
        }
    }
}

pub struct ExperimentRunner {
    config: ExperimentRunnerConfig,
}

impl ExperimentRunner {
    pub fn new(config: ExperimentRunnerConfig) -> Self {
        Self { config }
    }

    /// Run every query in `experiment` against one shared reasoner.
    pub async fn run(&self, experiment: &ExperimentFile) -> Result<RunSummary> {
        let started_at = Utc::now();
        let mut runtime = ActonApp::launch_async().await;

        let reasoner = Reasoner::builder()
            .config(experiment.resolution.clone())
            .program(Program::from_config(&experiment.program))
            .shared_retrieval(experiment.retrieval())
            .build();

        info!(
            rules = reasoner.program().rule_count(),
            queries = experiment.queries.len(),
            "Starting experiment"
        );

        let mut reports = Vec::with_capacity(experiment.queries.len());
        for spec in &experiment.queries {
            let report = self.run_query(&reasoner, &mut runtime, spec).await?;
            info!(
                query = %report.query,
                answers = report.answers.len(),
                exhausted = report.exhausted,
                "Query finished"
            );
            reports.push(report);
        }

        let summary = RunSummary {
            started_at,
            ended_at: Utc::now(),
            atomic_resolvers: reasoner.registry().atomic_count(),
            rule_actors: reasoner.registry().rule_count(),
            queries: reports,
        };

        if let Err(e) = runtime.shutdown_all().await {
            warn!(error = ?e, "Runtime shutdown reported an error");
        }

        Ok(summary)
    }

    async fn run_query(
        &self,
        reasoner: &Reasoner,
        runtime: &mut ActorRuntime,
        spec: &QuerySpec,
    ) -> Result<QueryReport> {
        let started_at = Utc::now();
        let mut query = reasoner
            .query(runtime, spec.patterns.clone(), spec.initial)
            .await
            .with_context(|| format!("starting query {}", spec.label()))?;

        let mut answers = Vec::new();
        let mut timed_out = false;
        while spec.max_answers.map_or(true, |max| answers.len() < max) {
            match tokio::time::timeout(self.config.pull_timeout, query.next_answer()).await {
                Ok(Some(answer)) => answers.push(answer),
                Ok(None) => break,
                Err(_) => {
                    warn!(query = %spec.label(), "Pull timed out");
                    timed_out = true;
                    break;
                }
            }
        }

        Ok(QueryReport {
            query: spec.label(),
            patterns: spec.patterns.clone(),
            initial: spec.initial,
            answers,
            exhausted: query.is_exhausted(),
            timed_out,
            started_at,
            ended_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_experiment_file_parses_with_defaults() {
        let json = r#"{
            "program": { "rules": [ { "head": 5, "when": [7] } ] },
            "facts": { "5": [1, 2], "7": [10] },
            "queries": [ { "patterns": [5] }, { "name": "pair", "patterns": [2, 3], "initial": 1 } ]
        }"#;
        let file = ExperimentFile::from_json(json).unwrap();

        assert_eq!(file.resolution.traversal_size, 5);
        assert_eq!(file.program.rules.len(), 1);
        assert_eq!(file.facts.as_ref().unwrap()[&5], vec![1, 2]);
        assert_eq!(file.queries[0].label(), "[5]");
        assert_eq!(file.queries[0].initial, 0);
        assert_eq!(file.queries[1].label(), "pair");
        assert_eq!(file.queries[1].initial, 1);
    }

    #[test]
    fn test_fact_table_ignores_seed() {
        let table = FactTable::new(HashMap::from([(5, vec![1, 2])]));
        let traversal = table.query(5, 99);
        assert_eq!(traversal.next_value(), Some(1));
        assert_eq!(traversal.next_value(), Some(2));
        assert!(table.query(6, 0).is_exhausted());
    }

    #[tokio::test]
    async fn test_runner_reports_every_query() {
        let experiment = ExperimentFile {
            facts: Some(HashMap::from([(2, vec![3]), (3, vec![4])])),
            queries: vec![
                QuerySpec::new(vec![2, 3]),
                QuerySpec::new(vec![2]).with_max_answers(0),
            ],
            ..ExperimentFile::default()
        };

        let summary = ExperimentRunner::new(ExperimentRunnerConfig::default())
            .run(&experiment)
            .await
            .unwrap();

        assert_eq!(summary.queries.len(), 2);
        assert_eq!(summary.queries[0].answers, vec![7]);
        assert!(summary.queries[0].exhausted);
        assert!(summary.queries[1].answers.is_empty());
        assert!(!summary.queries[1].exhausted);
        assert_eq!(summary.atomic_resolvers, 2);
    }
}

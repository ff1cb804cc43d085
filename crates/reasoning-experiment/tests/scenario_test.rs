//! Integration tests running the built-in scenarios end to end.

use reasoning_experiment::experiment::{ExperimentFile, ExperimentRunner, ExperimentRunnerConfig};
use reasoning_experiment::results::RunSummary;
use reasoning_experiment::scenarios;

async fn run(experiment: ExperimentFile) -> RunSummary {
    ExperimentRunner::new(ExperimentRunnerConfig::default())
        .run(&experiment)
        .await
        .unwrap()
}

fn sorted(mut values: Vec<i64>) -> Vec<i64> {
    values.sort_unstable();
    values
}

#[tokio::test]
async fn test_pipeline_scenario() {
    let summary = run(scenarios::pipeline()).await;
    let report = &summary.queries[0];

    // 2 -> {3, 4}; 3 seeded with each -> {7, 8} and {8, 9}
    assert_eq!(sorted(report.answers.clone()), vec![10, 11, 12, 13]);
    assert!(report.exhausted);
    assert!(!report.timed_out);
    assert_eq!(summary.atomic_resolvers, 2);
}

#[tokio::test]
async fn test_disjunction_scenario() {
    let summary = run(scenarios::disjunction()).await;
    let report = &summary.queries[0];

    assert_eq!(sorted(report.answers.clone()), vec![1, 2, 10, 120, 130]);
    assert!(report.exhausted);
    assert_eq!(summary.rule_actors, 2);
    assert_eq!(summary.atomic_resolvers, 4);
}

#[tokio::test]
async fn test_recursion_scenarios() {
    let deduplicated = run(scenarios::recursion(true)).await;
    assert_eq!(deduplicated.queries[0].answers, vec![1, 1]);
    assert!(deduplicated.queries[0].exhausted);

    let bounded = run(scenarios::recursion(false)).await;
    assert_eq!(bounded.queries[0].answers, vec![1; 8]);
    assert!(!bounded.queries[0].exhausted);
}

#[tokio::test]
async fn test_experiment_file_from_json() {
    let json = r#"{
        "resolution": { "traversal_size": 1 },
        "program": { "rules": [ { "head": 4, "when": [6] } ] },
        "queries": [ { "name": "rule", "patterns": [4] } ]
    }"#;
    let experiment = ExperimentFile::from_json(json).unwrap();
    let summary = run(experiment).await;
    let report = &summary.queries[0];

    // Mock retrieval: 4 seeded with 0 -> 5; rule body 6 seeded with 0 -> 7
    assert_eq!(report.query, "rule");
    assert_eq!(sorted(report.answers.clone()), vec![5, 7]);
    assert!(report.exhausted);
}

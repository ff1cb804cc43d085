//! Results collection and output for reasoning experiments.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reasoning_kernel::Pattern;

/// Outcome of a single query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryReport {
    /// Query label
    pub query: String,
    pub patterns: Vec<Pattern>,
    pub initial: i64,
    /// Answers in the order they were pulled
    pub answers: Vec<i64>,
    /// Whether the completion sentinel was reached
    pub exhausted: bool,
    /// Whether a pull was abandoned after the runner's timeout
    #[serde(default)]
    pub timed_out: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl QueryReport {
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

/// Every query of one experiment run, plus the size of the actor graph the
/// run built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub atomic_resolvers: usize,
    pub rule_actors: usize,
    pub queries: Vec<QueryReport>,
}

impl RunSummary {
    pub fn total_answers(&self) -> usize {
        self.queries.iter().map(|q| q.answers.len()).sum()
    }

    /// Save results to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Load results from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let results = serde_json::from_str(&json)?;
        Ok(results)
    }

    /// Print a human-readable table to stdout.
    pub fn print(&self) {
        println!("\n=== Reasoning Run ===");
        println!("Atomic resolvers: {}", self.atomic_resolvers);
        println!("Rule actors: {}", self.rule_actors);
        println!("Total answers: {}", self.total_answers());
        println!(
            "\n  {:<24} {:>8} {:>10} {:>8}  Answers",
            "Query", "Count", "Exhausted", "ms"
        );
        for report in &self.queries {
            let answers: Vec<String> = report.answers.iter().map(|a| a.to_string()).collect();
            let status = if report.timed_out {
                "timeout".to_string()
            } else {
                report.exhausted.to_string()
            };
            println!(
                "  {:<24} {:>8} {:>10} {:>8}  {}",
                report.query,
                report.answers.len(),
                status,
                report.duration_ms(),
                answers.join(", ")
            );
        }
    }
}

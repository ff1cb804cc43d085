//! Reasoning Experiment: runs queries against the actor-based reasoning kernel.
//!
//! Experiments are JSON files combining resolution tuning, a rule program,
//! an optional fact table, and the queries to run. Results are reported per
//! query with timestamps and can be written out as JSON.

pub mod experiment;
pub mod results;
pub mod scenarios;

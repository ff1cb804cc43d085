//! Reasoning Kernel: backward-chaining resolution over a network of actors
//!
//! A query is a conjunction of atomic patterns. Each pattern is resolved by a
//! long-lived actor that ORs a retrieval source with the rules for that
//! pattern; each rule resolves its body as another conjunction. Answers are
//! produced lazily, one per pull, and every request carries the path it
//! should reply along instead of relying on a call stack.

pub mod actors;
pub mod config;
pub mod error;
pub mod kernel;
pub mod messages;
pub mod path;
pub mod producer;
pub mod program;
pub mod registry;
pub mod retrieval;

pub use config::{ProgramConfig, ResolutionConfig, RuleConfig};
pub use error::ResolutionError;
pub use kernel::{QueryHandle, Reasoner, ReasonerBuilder};
pub use messages::{Answer, Exhausted, QueryOutput, Request, RequestId};
pub use path::{Path, Step, StepKind};
pub use producer::{ResponseProducer, TraversalProducer};
pub use program::{Materializer, Merge, Pattern, Program, RuleDefinition};
pub use registry::Registry;
pub use retrieval::{MockRetrieval, Retrieval, Traversal};

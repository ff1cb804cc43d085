//! Messages exchanged between resolution actors.

use std::fmt;

use mti::prelude::*;

use crate::path::{Path, Step};

/// Identity of a request lineage. Two requests with identical contents are
/// still different lineages unless they share an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate() -> Self {
        Self("req".create_type_id::<V7>().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ask the actor under the path cursor for one more answer.
///
/// Sending the same request again (same id) pulls the next answer of the same
/// lineage; it never restarts resolution.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    /// Id of the top-level request this lineage was derived from.
    pub root: RequestId,
    pub path: Path,
    /// Values accumulated by the steps resolved so far.
    pub partial_answer: Vec<i64>,
    pub constraints: Vec<String>,
    pub unifiers: Vec<String>,
}

impl Request {
    pub fn new(
        path: Path,
        partial_answer: Vec<i64>,
        constraints: Vec<String>,
        unifiers: Vec<String>,
    ) -> Self {
        let id = RequestId::generate();
        Self {
            root: id.clone(),
            id,
            path,
            partial_answer,
            constraints,
            unifiers,
        }
    }

    /// A fresh downstream lineage that carries this request's constraints and
    /// unifiers.
    pub fn derive(&self, path: Path, partial_answer: Vec<i64>) -> Self {
        self.derive_constrained(path, partial_answer, self.constraints.clone())
    }

    /// Like [`Request::derive`], with the given constraints instead.
    pub fn derive_constrained(
        &self,
        path: Path,
        partial_answer: Vec<i64>,
        constraints: Vec<String>,
    ) -> Self {
        Self {
            root: self.root.clone(),
            ..Self::new(path, partial_answer, constraints, self.unifiers.clone())
        }
    }

    pub fn receiver(&self) -> &Step {
        self.path.current()
    }
}

/// One answer for `source`, travelling back along `path`.
#[derive(Debug, Clone)]
pub struct Answer {
    pub source: Request,
    pub path: Path,
    pub partial_answer: Vec<i64>,
    pub constraints: Vec<String>,
    pub unifiers: Vec<String>,
}

/// No further answers will ever arrive for `source`.
#[derive(Debug, Clone)]
pub struct Exhausted {
    pub source: Request,
    pub path: Path,
}

/// What a query's top-level conjunction writes into the output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutput {
    Answer(i64),
    /// Completion sentinel; nothing follows it.
    Exhausted,
}

//! Paths: the explicit return-address list that replaces a call stack.
//!
//! A request travels *down* a path, the cursor pointing at the actor that is
//! meant to receive it. Answers and completions travel back *up* to the step
//! before the cursor. Paths are never mutated in place: every extension or
//! cursor move returns a new copy, so branches dispatched concurrently cannot
//! corrupt each other's return route.

use std::fmt;

use acton_reactive::prelude::*;

use crate::error::{ResolutionError, Result};

/// What sort of resolution actor a step addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Atomic,
    Conjunction,
    Rule,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKind::Atomic => "atomic resolver",
            StepKind::Conjunction => "conjunction",
            StepKind::Rule => "rule",
        };
        f.write_str(name)
    }
}

/// One actor on a path, tagged with its kind so receivers can classify the
/// source of an answer without inspecting the actor itself.
#[derive(Debug, Clone)]
pub struct Step {
    kind: StepKind,
    handle: ActorHandle,
}

impl Step {
    pub fn atomic(handle: ActorHandle) -> Self {
        Self {
            kind: StepKind::Atomic,
            handle,
        }
    }

    pub fn conjunction(handle: ActorHandle) -> Self {
        Self {
            kind: StepKind::Conjunction,
            handle,
        }
    }

    pub fn rule(handle: ActorHandle) -> Self {
        Self {
            kind: StepKind::Rule,
            handle,
        }
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn handle(&self) -> &ActorHandle {
        &self.handle
    }
}

/// Ordered steps plus a cursor.
///
/// Invariant: `steps` is never empty and `cursor < steps.len()`.
#[derive(Debug, Clone)]
pub struct Path<S = Step> {
    steps: Vec<S>,
    cursor: usize,
}

impl<S: Clone> Path<S> {
    /// A path whose only step is the origin of a query.
    pub fn new(origin: S) -> Self {
        Self {
            steps: vec![origin],
            cursor: 0,
        }
    }

    /// The step the cursor points at: the receiver of a request on this path.
    pub fn current(&self) -> &S {
        &self.steps[self.cursor]
    }

    pub fn next_step(&self) -> Option<&S> {
        self.steps.get(self.cursor + 1)
    }

    /// The step an answer or completion for the current receiver goes to.
    pub fn previous_step(&self) -> Option<&S> {
        self.cursor.checked_sub(1).map(|i| &self.steps[i])
    }

    /// True when no step follows the cursor.
    pub fn at_end(&self) -> bool {
        self.cursor + 1 == self.steps.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[S] {
        &self.steps
    }

    pub fn append(&self, step: S) -> Self {
        self.append_all(std::iter::once(step))
    }

    pub fn append_all(&self, steps: impl IntoIterator<Item = S>) -> Self {
        let mut extended = self.clone();
        extended.steps.extend(steps);
        extended
    }

    /// Move the cursor onto the next step.
    pub fn advance(&self) -> Result<Self> {
        if self.at_end() {
            return Err(self.overrun());
        }
        Ok(Self {
            steps: self.steps.clone(),
            cursor: self.cursor + 1,
        })
    }

    /// Drop every step after the cursor.
    pub fn truncate(&self) -> Self {
        Self {
            steps: self.steps[..=self.cursor].to_vec(),
            cursor: self.cursor,
        }
    }

    /// The path a response travels on: the current step is completed and
    /// removed, and the cursor lands on the step that receives the response.
    pub fn retreat(&self) -> Result<Self> {
        if self.cursor == 0 {
            return Err(self.overrun());
        }
        Ok(Self {
            steps: self.steps[..self.cursor].to_vec(),
            cursor: self.cursor - 1,
        })
    }

    fn overrun(&self) -> ResolutionError {
        ResolutionError::PathOverrun {
            cursor: self.cursor,
            len: self.steps.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_path_is_at_end_with_no_neighbours() {
        let path = Path::new("query");
        assert!(path.at_end());
        assert_eq!(*path.current(), "query");
        assert!(path.next_step().is_none());
        assert!(path.previous_step().is_none());
    }

    #[test]
    fn test_append_and_advance_walks_the_plan() {
        let path = Path::new("conj").append_all(["a", "b"]);
        assert_eq!(*path.current(), "conj");
        assert_eq!(path.next_step(), Some(&"a"));

        let at_a = path.advance().unwrap();
        assert_eq!(*at_a.current(), "a");
        assert_eq!(at_a.previous_step(), Some(&"conj"));
        assert!(!at_a.at_end());

        let at_b = at_a.advance().unwrap();
        assert!(at_b.at_end());
        assert!(matches!(
            at_b.advance(),
            Err(ResolutionError::PathOverrun { cursor: 2, len: 3 })
        ));
    }

    #[test]
    fn test_extension_never_mutates_the_original() {
        let base = Path::new("conj").append("a").advance().unwrap();
        let to_rule = base.truncate().append("rule");
        let to_other = base.truncate().append("other");

        assert_eq!(base.len(), 2);
        assert_eq!(to_rule.steps(), &["conj", "a", "rule"]);
        assert_eq!(to_other.steps(), &["conj", "a", "other"]);
    }

    #[test]
    fn test_truncate_drops_planned_steps_after_cursor() {
        let path = Path::new("conj")
            .append_all(["a", "b", "c"])
            .advance()
            .unwrap();
        let truncated = path.truncate();
        assert_eq!(truncated.steps(), &["conj", "a"]);
        assert!(truncated.at_end());
        assert_eq!(truncated.cursor(), 1);
    }

    #[test]
    fn test_retreat_lands_on_the_reply_target() {
        let path = Path::new("conj")
            .append_all(["a", "b"])
            .advance()
            .unwrap()
            .advance()
            .unwrap();
        let reply = path.retreat().unwrap();
        assert_eq!(*reply.current(), "a");
        assert!(reply.at_end());

        let origin = Path::new("conj");
        assert!(origin.retreat().is_err());
    }
}

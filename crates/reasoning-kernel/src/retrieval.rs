//! The retrieval primitive: the only source of ground values.
//!
//! A [`Retrieval`] answers "which values does `pattern` produce when seeded
//! with `seed`" as a finite, one-shot [`Traversal`]. Traversals are pulled one
//! value at a time by the actor that owns them, so an expensive source is
//! only consumed as far as answers are demanded.

use std::fmt;
use std::iter::Peekable;
use std::sync::{Arc, Mutex, PoisonError};

use crate::program::Pattern;

type Values = Peekable<Box<dyn Iterator<Item = i64> + Send>>;

/// A lazy, one-shot sequence of values. Cloning shares the cursor.
#[derive(Clone)]
pub struct Traversal {
    values: Arc<Mutex<Values>>,
}

impl Traversal {
    pub fn new(values: impl Iterator<Item = i64> + Send + 'static) -> Self {
        let boxed: Box<dyn Iterator<Item = i64> + Send> = Box::new(values);
        Self {
            values: Arc::new(Mutex::new(boxed.peekable())),
        }
    }

    pub fn from_values(values: Vec<i64>) -> Self {
        Self::new(values.into_iter())
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    pub fn next_value(&self) -> Option<i64> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next()
    }

    pub fn is_exhausted(&self) -> bool {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .peek()
            .is_none()
    }
}

impl fmt::Debug for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Traversal")
            .field("exhausted", &self.is_exhausted())
            .finish()
    }
}

/// Query interface to the underlying data source.
///
/// Implementations must be deterministic and must not block: `query` runs
/// inside an actor handler.
pub trait Retrieval: Send + Sync {
    fn query(&self, pattern: Pattern, seed: i64) -> Traversal;
}

impl<F> Retrieval for F
where
    F: Fn(Pattern, i64) -> Vec<i64> + Send + Sync,
{
    fn query(&self, pattern: Pattern, seed: i64) -> Traversal {
        Traversal::from_values(self(pattern, seed))
    }
}

/// Synthetic source yielding `size` values `pattern + seed + k * answer_interval`
/// for `k` in `1..=size`.
#[derive(Debug, Clone, Copy)]
pub struct MockRetrieval {
    pub size: usize,
    pub answer_interval: i64,
}

impl MockRetrieval {
    pub fn new(size: usize, answer_interval: i64) -> Self {
        Self {
            size,
            answer_interval,
        }
    }
}

impl Retrieval for MockRetrieval {
    fn query(&self, pattern: Pattern, seed: i64) -> Traversal {
        let interval = self.answer_interval;
        let base = pattern + seed;
        Traversal::new((1..=self.size as i64).map(move |k| base + k * interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_retrieval_values() {
        let traversal = MockRetrieval::new(3, 2).query(10, 5);
        let values: Vec<i64> = std::iter::from_fn(|| traversal.next_value()).collect();
        assert_eq!(values, vec![17, 19, 21]);
        assert!(traversal.is_exhausted());
    }

    #[test]
    fn test_empty_mock_retrieval_is_exhausted() {
        assert!(MockRetrieval::new(0, 1).query(1, 0).is_exhausted());
    }

    #[test]
    fn test_closure_retrieval() {
        let retrieval = |pattern: Pattern, _seed: i64| vec![pattern + 1];
        let traversal = retrieval.query(2, 0);
        assert!(!traversal.is_exhausted());
        assert_eq!(traversal.next_value(), Some(3));
        assert_eq!(traversal.next_value(), None);
    }

    #[test]
    fn test_clones_share_the_cursor() {
        let traversal = Traversal::from_values(vec![1, 2]);
        let clone = traversal.clone();
        assert_eq!(traversal.next_value(), Some(1));
        assert_eq!(clone.next_value(), Some(2));
        assert!(traversal.is_exhausted());
    }
}

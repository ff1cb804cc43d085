//! Pattern registry: one resolver actor per atomic pattern and per rule.
//!
//! Handles are looked up through `DashMap::entry`, which holds the shard lock
//! while the factory runs, so concurrent lookups of the same key create at
//! most one actor.

use acton_reactive::prelude::*;
use dashmap::DashMap;

use crate::program::{Pattern, RuleDefinition};

#[derive(Debug)]
pub struct Registry<H = ActorHandle> {
    atomics: DashMap<Pattern, H>,
    rules: DashMap<RuleDefinition, H>,
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self {
            atomics: DashMap::new(),
            rules: DashMap::new(),
        }
    }
}

impl<H: Clone> Registry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing handle for `pattern`, or the one `factory` creates.
    pub fn register_atomic(&self, pattern: Pattern, factory: impl FnOnce(Pattern) -> H) -> H {
        let entry = self
            .atomics
            .entry(pattern)
            .or_insert_with(|| factory(pattern));
        entry.value().clone()
    }

    pub fn register_rule(
        &self,
        rule: &RuleDefinition,
        factory: impl FnOnce(&RuleDefinition) -> H,
    ) -> H {
        let entry = self
            .rules
            .entry(rule.clone())
            .or_insert_with(|| factory(rule));
        entry.value().clone()
    }

    /// Lookup without creating; takes only a read lock on the shard.
    pub fn atomic(&self, pattern: Pattern) -> Option<H> {
        self.atomics.get(&pattern).map(|entry| entry.value().clone())
    }

    pub fn rule(&self, rule: &RuleDefinition) -> Option<H> {
        self.rules.get(rule).map(|entry| entry.value().clone())
    }

    pub fn atomic_count(&self) -> usize {
        self.atomics.len()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_factory_runs_once_per_pattern() {
        let registry: Registry<usize> = Registry::new();
        let calls = AtomicUsize::new(0);

        let first = registry.register_atomic(5, |_| calls.fetch_add(1, Ordering::SeqCst) + 100);
        let second = registry.register_atomic(5, |_| calls.fetch_add(1, Ordering::SeqCst) + 200);

        assert_eq!(first, 100);
        assert_eq!(second, 100);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.atomic(5), Some(100));
        assert_eq!(registry.atomic(6), None);
    }

    #[test]
    fn test_rules_are_keyed_by_definition() {
        let registry: Registry<&str> = Registry::new();
        let a = RuleDefinition::new(5, vec![7]);
        let b = RuleDefinition::new(5, vec![8]);

        assert_eq!(registry.register_rule(&a, |_| "a"), "a");
        assert_eq!(registry.register_rule(&b, |_| "b"), "b");
        assert_eq!(registry.register_rule(&a, |_| "again"), "a");
        assert_eq!(registry.rule_count(), 2);
        assert_eq!(registry.rule(&b), Some("b"));
        assert_eq!(registry.rule(&RuleDefinition::new(5, vec![9])), None);
    }

    #[test]
    fn test_concurrent_registration_yields_one_handle() {
        let registry: Arc<Registry<usize>> = Arc::new(Registry::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    registry.register_atomic(42, |_| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        i
                    })
                })
            })
            .collect();

        let handles: Vec<usize> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        assert!(handles.iter().all(|h| *h == handles[0]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.atomic_count(), 1);
    }
}

//! Named counter registry.
//!
//! Counters are keyed by [`CounterKey`], so label sets with the same pairs
//! resolve to the same counter regardless of the order they were given in.

use crate::application::ports::Storage;
use crate::domain::counter_key::CounterKey;
use crate::domain::metric::CounterMetric;
use std::collections::BTreeMap;

/// Registry of monotonic counters.
///
/// Generic over the storage implementation. In production, use
/// `Arc<ShardedStorage>`, whose per-shard locks let unrelated counters be
/// updated without contending on a single mutex.
#[derive(Clone)]
pub struct CounterRegistry<S>
where
    S: Storage<CounterKey, CounterMetric> + Clone,
{
    storage: S,
}

impl<S> CounterRegistry<S>
where
    S: Storage<CounterKey, CounterMetric> + Clone,
{
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Access or create the counter for `key` with a callback.
    pub fn with_counter<F, R>(&self, key: CounterKey, f: F) -> R
    where
        F: FnOnce(&mut CounterMetric) -> R,
    {
        let name = key.name().to_string();
        let labels = key.labels().clone();
        self.storage
            .with_entry_mut(key, || CounterMetric::new(name, labels), f)
    }

    /// Get the counter for `key`, creating it at zero if needed.
    pub fn get_or_create(&self, key: CounterKey) -> CounterMetric {
        self.with_counter(key, |counter| counter.clone())
    }

    /// Add `amount` and return the updated counter.
    pub fn increment(&self, key: CounterKey, amount: u64) -> CounterMetric {
        self.with_counter(key, |counter| {
            counter.increment(amount);
            counter.clone()
        })
    }

    /// All counters, keyed by their rendered identity (`name{a=1,b=2}`).
    pub fn snapshot(&self) -> BTreeMap<String, CounterMetric> {
        let mut counters = BTreeMap::new();
        self.storage.for_each(|key, counter| {
            counters.insert(key.to_string(), counter.clone());
        });
        counters
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn clear(&self) {
        self.storage.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::ShardedStorage;
    use std::sync::Arc;

    fn registry() -> CounterRegistry<Arc<ShardedStorage<CounterKey, CounterMetric>>> {
        CounterRegistry::new(Arc::new(ShardedStorage::new()))
    }

    #[test]
    fn test_label_order_resolves_to_one_counter() {
        let registry = registry();

        registry.increment(CounterKey::new("x", [("a", "1"), ("b", "2")]), 1);
        let counter = registry.increment(CounterKey::new("x", [("b", "2"), ("a", "1")]), 1);

        assert_eq!(counter.value, 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_different_labels_are_distinct() {
        let registry = registry();

        registry.increment(CounterKey::new("calls", [("entity", "Account")]), 1);
        registry.increment(CounterKey::new("calls", [("entity", "Lead")]), 5);
        registry.increment(CounterKey::unlabeled("calls"), 2);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot["calls{entity=Lead}"].value, 5);
        assert_eq!(snapshot["calls"].value, 2);
    }

    #[test]
    fn test_get_or_create_starts_at_zero() {
        let registry = registry();
        let counter = registry.get_or_create(CounterKey::new("errors", [("kind", "timeout")]));

        assert_eq!(counter.value, 0);
        assert_eq!(counter.name, "errors");
        assert_eq!(counter.labels["kind"], "timeout");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_clear() {
        let registry = registry();
        for i in 0..10 {
            registry.increment(CounterKey::new("c", [("i", i.to_string())]), 1);
        }
        assert_eq!(registry.len(), 10);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_increments() {
        use std::thread;

        let registry = registry();
        let mut handles = vec![];

        for _ in 0..10 {
            let registry = registry.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    registry.increment(CounterKey::new("hits", [("path", "/")]), 1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let counter = registry.get_or_create(CounterKey::new("hits", [("path", "/")]));
        assert_eq!(counter.value, 1000);
    }
}

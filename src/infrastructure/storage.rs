//! DashMap-backed storage for labeled counters.
//!
//! Counters with different name/label sets land in different shards, so
//! `increment_counter` calls from many request threads rarely meet on a lock.

use crate::application::ports::Storage;
use ahash::RandomState;
use dashmap::DashMap;
use std::borrow::Borrow;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// Sharded map keyed with aHash.
#[derive(Debug)]
pub struct ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    shards: DashMap<K, V, RandomState>,
}

impl<K, V> ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            shards: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Copy of the value stored under `key`, without creating it.
    pub fn value_of<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.shards.get(key).map(|entry| entry.value().clone())
    }
}

impl<K, V> Default for ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Storage<K, V> for ShardedStorage<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + Debug,
    V: Send + Sync + Debug,
{
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R,
    {
        // The shard stays write-locked until the accessor returns
        let mut slot = self.shards.entry(key).or_insert_with(factory);
        accessor(slot.value_mut())
    }

    fn len(&self) -> usize {
        self.shards.len()
    }

    fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    fn clear(&self) {
        self.shards.clear()
    }

    fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V),
    {
        self.shards
            .iter()
            .for_each(|entry| f(entry.key(), entry.value()));
    }
}

impl<K, V> Storage<K, V> for Arc<ShardedStorage<K, V>>
where
    K: Hash + Eq + Clone + Send + Sync + Debug,
    V: Send + Sync + Debug,
{
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R,
    {
        self.as_ref().with_entry_mut(key, factory, accessor)
    }

    fn len(&self) -> usize {
        Storage::len(self.as_ref())
    }

    fn is_empty(&self) -> bool {
        Storage::is_empty(self.as_ref())
    }

    fn clear(&self) {
        Storage::clear(self.as_ref())
    }

    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V),
    {
        self.as_ref().for_each(f)
    }
}

//! Secondary indexes over the in-memory tables

use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

/// One key to an ordered set of values.
///
/// Buckets are dropped as soon as they empty, so `len()` counts live keys.
#[derive(Debug, Clone)]
pub struct MultiIndex<K, V> {
    buckets: HashMap<K, BTreeSet<V>>,
}

impl<K, V> Default for MultiIndex<K, V> {
    fn default() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }
}

impl<K: Hash + Eq, V: Ord + Copy> MultiIndex<K, V> {
    pub fn insert(&mut self, key: K, value: V) -> bool {
        self.buckets.entry(key).or_default().insert(value)
    }

    pub fn remove<Q>(&mut self, key: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(bucket) = self.buckets.get_mut(key) else {
            return false;
        };
        let removed = bucket.remove(value);
        if bucket.is_empty() {
            self.buckets.remove(key);
        }
        removed
    }

    /// Values under `key` in ascending order; empty if the key is absent.
    pub fn get<'a, Q>(&'a self, key: &Q) -> impl Iterator<Item = V> + 'a
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.buckets
            .get(key)
            .into_iter()
            .flat_map(|bucket| bucket.iter().copied())
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.buckets.contains_key(key)
    }

    /// Remove and return the whole bucket.
    pub fn take<Q>(&mut self, key: &Q) -> BTreeSet<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.buckets.remove(key).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

//! Reference-counted interning of shared, value-keyed rows
//!
//! Classes and contexts are immutable values shared by many topics and
//! links. An [`Interner`] keeps one row per distinct key in an ID-addressed
//! arena, counts how many owners point at it, and frees the row (and its
//! ID) when the last owner lets go.
//!
//! # Thread Safety
//!
//! Not synchronized. The interner is owned by the `SymbolStore`, which is
//! only mutated under the single-writer discipline of `SharedStore`.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use crate::error::{EntityKind, StoreError, StoreResult};
use crate::ids::NumberSet;

/// One interned row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternedRow<K, V> {
    pub key: K,
    pub payload: V,
    pub reference_count: u32,
}

/// Result of [`Interner::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquired {
    pub id: u32,
    /// True when this call created the row.
    pub created: bool,
}

/// Result of [`Interner::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    /// Row still referenced; carries the remaining count.
    Kept(u32),
    /// Last reference dropped; row deleted and ID returned to the pool.
    Removed,
}

#[derive(Debug, Clone)]
pub struct Interner<K, V> {
    kind: EntityKind,
    rows: BTreeMap<u32, InternedRow<K, V>>,
    index: HashMap<K, u32>,
    used_ids: NumberSet,
}

impl<K: Hash + Eq + Clone, V> Interner<K, V> {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            rows: BTreeMap::new(),
            index: HashMap::new(),
            used_ids: NumberSet::new(),
        }
    }

    /// Look up `key`, bumping its count, or create it with `payload`.
    ///
    /// `payload` is only evaluated when the row is created; later acquirers
    /// share whatever the first one recorded.
    pub fn acquire(&mut self, key: K, payload: impl FnOnce() -> V) -> StoreResult<Acquired> {
        if let Some(&id) = self.index.get(&key) {
            let row = self.rows.get_mut(&id).ok_or_else(|| {
                StoreError::Consistency(format!("{} index points at missing row {}", self.kind, id))
            })?;
            row.reference_count = row.reference_count.checked_add(1).ok_or_else(|| {
                StoreError::Consistency(format!("{} {} reference count overflow", self.kind, id))
            })?;
            return Ok(Acquired { id, created: false });
        }

        let id = self.used_ids.allocate().ok_or_else(|| {
            StoreError::Consistency(format!("{} ID space exhausted", self.kind))
        })?;
        self.index.insert(key.clone(), id);
        self.rows.insert(
            id,
            InternedRow {
                key,
                payload: payload(),
                reference_count: 1,
            },
        );
        Ok(Acquired { id, created: true })
    }

    /// Drop one reference to `id`.
    ///
    /// # Errors
    /// `Consistency` if `id` is not live, which means the caller released
    /// more often than it acquired.
    pub fn release(&mut self, id: u32) -> StoreResult<Released> {
        let row = self.rows.get_mut(&id).ok_or_else(|| {
            StoreError::Consistency(format!("release of {} {} which is not live", self.kind, id))
        })?;

        if row.reference_count > 1 {
            row.reference_count -= 1;
            return Ok(Released::Kept(row.reference_count));
        }

        if let Some(row) = self.rows.remove(&id) {
            self.index.remove(&row.key);
        }
        if !self.used_ids.remove(id) {
            return Err(StoreError::Consistency(format!(
                "{} {} was live but not in the used ID set",
                self.kind, id
            )));
        }
        Ok(Released::Removed)
    }

    pub fn get(&self, id: u32) -> Option<&InternedRow<K, V>> {
        self.rows.get(&id)
    }

    pub fn id_of<Q>(&self, key: &Q) -> Option<u32>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(key).copied()
    }

    pub fn reference_count(&self, id: u32) -> Option<u32> {
        self.rows.get(&id).map(|row| row.reference_count)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.rows.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in ascending ID order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &InternedRow<K, V>)> + '_ {
        self.rows.iter().map(|(&id, row)| (id, row))
    }

    pub fn used_ids(&self) -> &NumberSet {
        &self.used_ids
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Re-insert a persisted row verbatim.
    ///
    /// # Errors
    /// `Format` if the ID or key is already present or the count is zero;
    /// persisted data that breaks these rules cannot be trusted.
    pub fn restore(&mut self, id: u32, key: K, payload: V, reference_count: u32) -> StoreResult<()> {
        if reference_count == 0 {
            return Err(StoreError::format(
                self.kind.as_str(),
                format!("row {} persisted with zero references", id),
            ));
        }
        if self.rows.contains_key(&id) || self.index.contains_key(&key) || !self.used_ids.add(id) {
            return Err(StoreError::format(
                self.kind.as_str(),
                format!("row {} duplicated in persisted data", id),
            ));
        }
        self.index.insert(key.clone(), id);
        self.rows.insert(
            id,
            InternedRow {
                key,
                payload,
                reference_count,
            },
        );
        Ok(())
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.index.clear();
        self.used_ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contexts() -> Interner<String, ()> {
        Interner::new(EntityKind::Context)
    }

    #[test]
    fn test_acquire_twice_shares_row() {
        let mut interner = contexts();
        let first = interner.acquire("scope:Foo".to_string(), || ()).unwrap();
        let second = interner.acquire("scope:Foo".to_string(), || ()).unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
        assert_eq!(interner.reference_count(first.id), Some(2));
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn test_double_release_is_consistency_error() {
        let mut interner = contexts();
        let id = interner.acquire("k".to_string(), || ()).unwrap().id;
        assert_eq!(interner.release(id).unwrap(), Released::Removed);
        assert!(interner.get(id).is_none());
        assert!(!interner.used_ids().contains(id));

        let err = interner.release(id).unwrap_err();
        assert!(matches!(err, StoreError::Consistency(_)));
        assert!(interner.used_ids().is_empty());
    }

    #[test]
    fn test_release_keeps_row_until_zero() {
        let mut interner = contexts();
        let id = interner.acquire("k".to_string(), || ()).unwrap().id;
        interner.acquire("k".to_string(), || ()).unwrap();
        assert_eq!(interner.release(id).unwrap(), Released::Kept(1));
        assert_eq!(interner.id_of("k"), Some(id));
        assert_eq!(interner.release(id).unwrap(), Released::Removed);
        assert_eq!(interner.id_of("k"), None);
    }

    #[test]
    fn test_freed_id_is_reused() {
        let mut interner = contexts();
        let a = interner.acquire("a".to_string(), || ()).unwrap().id;
        let b = interner.acquire("b".to_string(), || ()).unwrap().id;
        assert_eq!((a, b), (1, 2));
        interner.release(a).unwrap();
        let c = interner.acquire("c".to_string(), || ()).unwrap().id;
        assert_eq!(c, 1);
    }

    #[test]
    fn test_payload_recorded_by_first_acquirer() {
        let mut classes: Interner<(u8, String), u32> = Interner::new(EntityKind::Class);
        let id = classes.acquire((0, "Foo".to_string()), || 3).unwrap().id;
        classes.acquire((0, "Foo".to_string()), || 9).unwrap();
        assert_eq!(classes.get(id).unwrap().payload, 3);
    }

    #[test]
    fn test_restore_rejects_duplicates() {
        let mut interner = contexts();
        interner.restore(4, "x".to_string(), (), 2).unwrap();
        assert_eq!(interner.reference_count(4), Some(2));
        assert!(interner.restore(4, "y".to_string(), (), 1).is_err());
        assert!(interner.restore(5, "x".to_string(), (), 1).is_err());
        assert!(interner.restore(6, "z".to_string(), (), 0).is_err());
        assert_eq!(interner.used_ids().to_string(), "4");
    }
}

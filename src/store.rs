// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-task key/value storage.
//!
//! Each task identity owns at most one [`LocalDataSet`]; the store maps
//! identity → set in the same bounded ring as the address cache. Values are
//! boxed behind the [`TaskLocal`] capability trait, whose deep clone gives
//! snapshots value semantics across task boundaries.
//!
//! # Caller contract
//!
//! Identities can be recycled once a task's descriptor is reclaimed, so a
//! task must [`LocalStore::clear`] or [`LocalStore::restore`] (or take a
//! [`LocalScope`]) before relying on reads; otherwise it may observe stale
//! data left by an unrelated task that held the same identity. Tasks
//! launched through [`crate::spawn`] get this for free: the spawner restores
//! the parent snapshot (or clears) before the body runs. The store cannot
//! enforce this from inside; it is a documented obligation.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use crate::cache::RingCache;

/// Capability contract for stored values: cloneable, sendable, downcastable.
///
/// Blanket-implemented for every `T: Clone + Send + Sync + 'static`, so the
/// explicit capability a value needs is `Clone`. There is no reflective
/// deep copy, a value's own `Clone` defines what "deep" means for it.
pub trait TaskLocal: Any + Send + Sync {
    /// Clone the value behind the box.
    fn clone_value(&self) -> Box<dyn TaskLocal>;

    /// Expose the value for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<T> TaskLocal for T
where
    T: Any + Clone + Send + Sync,
{
    fn clone_value(&self) -> Box<dyn TaskLocal> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Key/value data owned by exactly one task identity at a time.
///
/// `Clone` is a deep copy: every value is cloned through its
/// [`TaskLocal::clone_value`], so the copy is independently mutable.
#[derive(Default)]
pub struct LocalDataSet {
    entries: HashMap<String, Box<dyn TaskLocal>>,
}

impl LocalDataSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `key`.
    pub fn insert<T>(&mut self, key: impl Into<String>, value: T)
    where
        T: Any + Clone + Send + Sync,
    {
        self.entries.insert(key.into(), Box::new(value));
    }

    /// Typed read: clone the value out when present and of type `T`.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + 'static,
    {
        self.entries
            .get(key)
            .and_then(|value| (**value).as_any().downcast_ref::<T>().cloned())
    }

    /// Remove `key`, reporting whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// True when `key` is present (regardless of its type).
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Clone for LocalDataSet {
    fn clone(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|(key, value)| (key.clone(), (**value).clone_value()))
                .collect(),
        }
    }
}

impl fmt::Debug for LocalDataSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalDataSet")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Identity-keyed store of [`LocalDataSet`]s with ring eviction.
pub struct LocalStore {
    sets: RingCache<LocalDataSet>,
}

impl LocalStore {
    /// Create a store holding data for at most `capacity` identities.
    pub fn new(capacity: usize) -> Self {
        Self {
            sets: RingCache::new(capacity),
        }
    }

    /// Write `key` into the set owned by `id`, creating the set on first
    /// write. Only set creation consumes a ring slot.
    pub fn set_val<T>(&self, id: u64, key: impl Into<String>, value: T)
    where
        T: Any + Clone + Send + Sync,
    {
        let key = key.into();
        self.sets.update_or_insert(id, LocalDataSet::new, |set| {
            set.insert(key, value);
        });
    }

    /// Typed read from the set owned by `id`.
    pub fn get_val<T>(&self, id: u64, key: &str) -> Option<T>
    where
        T: Clone + 'static,
    {
        self.sets.read_with(id, |set| set.get::<T>(key)).flatten()
    }

    /// Deep copy of the full set owned by `id`, if any.
    pub fn snapshot(&self, id: u64) -> Option<LocalDataSet> {
        self.sets.get(id)
    }

    /// Replace the set owned by `id` wholesale.
    pub fn restore(&self, id: u64, set: LocalDataSet) {
        self.sets.replace(id, set);
    }

    /// Remove the set owned by `id` entirely.
    pub fn clear(&self, id: u64) {
        self.sets.remove(id);
    }

    /// True when `id` currently owns a set.
    pub fn has_data(&self, id: u64) -> bool {
        self.sets.contains(id)
    }

    /// Capacity of the backing ring.
    pub fn capacity(&self) -> usize {
        self.sets.capacity()
    }

    /// Drop all sets and resize the backing ring.
    pub fn reset(&self, capacity: usize) {
        self.sets.reset(capacity);
    }
}

/// Typed handle proving the identity's data was cleared before use.
///
/// Obtainable only through a reset ([`crate::scope`] or
/// [`crate::Registry::scope`]), which clears whatever a previous holder of
/// the (possibly recycled) identity left behind. Intended for tasks that
/// were not launched through this crate's spawners.
pub struct LocalScope<'a> {
    store: &'a LocalStore,
    id: u64,
}

impl<'a> LocalScope<'a> {
    pub(crate) fn adopt(store: &'a LocalStore, id: u64) -> Self {
        store.clear(id);
        Self { store, id }
    }

    /// Identity this scope writes under.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Write `key` for this scope's identity.
    pub fn set<T>(&self, key: impl Into<String>, value: T)
    where
        T: Any + Clone + Send + Sync,
    {
        self.store.set_val(self.id, key, value);
    }

    /// Typed read for this scope's identity.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + 'static,
    {
        self.store.get_val(self.id, key)
    }

    /// Remove this scope's data set entirely.
    pub fn clear(&self) {
        self.store.clear(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get_returns_last_write() {
        let store = LocalStore::new(8);
        store.set_val(1, "x", 5u64);
        assert_eq!(store.get_val::<u64>(1, "x"), Some(5));
        store.set_val(1, "x", 6u64);
        assert_eq!(store.get_val::<u64>(1, "x"), Some(6));
    }

    #[test]
    fn test_get_absent_key_and_absent_set() {
        let store = LocalStore::new(8);
        assert_eq!(store.get_val::<u64>(1, "x"), None);
        store.set_val(1, "x", 5u64);
        assert_eq!(store.get_val::<u64>(1, "y"), None);
    }

    #[test]
    fn test_typed_read_rejects_wrong_type() {
        let store = LocalStore::new(8);
        store.set_val(1, "x", 5u64);
        assert_eq!(store.get_val::<String>(1, "x"), None);
        assert_eq!(store.get_val::<u64>(1, "x"), Some(5));
    }

    #[test]
    fn test_snapshot_is_deep_copy() {
        let store = LocalStore::new(8);
        store.set_val(1, "items", vec![1u64, 2, 3]);

        let snapshot = store.snapshot(1).unwrap();

        // Mutate the original after the snapshot was taken.
        store.set_val(1, "items", vec![9u64]);
        assert_eq!(snapshot.get::<Vec<u64>>("items"), Some(vec![1, 2, 3]));

        // Restore the snapshot under a different identity and mutate there.
        store.restore(2, snapshot);
        store.set_val(2, "items", vec![7u64]);
        assert_eq!(store.get_val::<Vec<u64>>(1, "items"), Some(vec![9]));
        assert_eq!(store.get_val::<Vec<u64>>(2, "items"), Some(vec![7]));
    }

    #[test]
    fn test_clear_removes_set() {
        let store = LocalStore::new(8);
        store.set_val(1, "x", 5u64);
        store.clear(1);
        assert_eq!(store.get_val::<u64>(1, "x"), None);
        assert!(!store.has_data(1));
    }

    #[test]
    fn test_restore_overwrites_stale_data() {
        let store = LocalStore::new(8);
        // A previous task under the same (recycled) identity left data.
        store.set_val(1, "stale", true);

        let mut set = LocalDataSet::new();
        set.insert("fresh", 1u64);
        store.restore(1, set);

        assert_eq!(store.get_val::<bool>(1, "stale"), None);
        assert_eq!(store.get_val::<u64>(1, "fresh"), Some(1));
    }

    #[test]
    fn test_ring_eviction_drops_oldest_identity() {
        let store = LocalStore::new(2);
        store.set_val(1, "k", 1u64);
        store.set_val(2, "k", 2u64);
        store.set_val(3, "k", 3u64);
        assert_eq!(store.get_val::<u64>(1, "k"), None);
        assert_eq!(store.get_val::<u64>(2, "k"), Some(2));
        assert_eq!(store.get_val::<u64>(3, "k"), Some(3));
    }

    #[test]
    fn test_repeated_writes_consume_one_slot() {
        let store = LocalStore::new(2);
        store.set_val(1, "a", 1u64);
        store.set_val(1, "b", 2u64);
        store.set_val(1, "c", 3u64);
        store.set_val(2, "k", 0u64);
        // Identity 1 burned a single slot; both sets are live.
        assert_eq!(store.get_val::<u64>(1, "a"), Some(1));
        assert_eq!(store.get_val::<u64>(2, "k"), Some(0));
    }

    #[test]
    fn test_scope_clears_before_use() {
        let store = LocalStore::new(8);
        store.set_val(7, "stale", true);

        let scope = LocalScope::adopt(&store, 7);
        assert_eq!(scope.get::<bool>("stale"), None);
        scope.set("fresh", 42u64);
        assert_eq!(scope.get::<u64>("fresh"), Some(42));
        assert_eq!(scope.id(), 7);
    }

    #[test]
    fn test_data_set_debug_lists_keys() {
        let mut set = LocalDataSet::new();
        set.insert("x", 1u64);
        let debug = format!("{set:?}");
        assert!(debug.contains("x"));
    }

    #[test]
    fn test_data_set_remove_and_len() {
        let mut set = LocalDataSet::new();
        assert!(set.is_empty());
        set.insert("x", 1u64);
        set.insert("y", "s".to_string());
        assert_eq!(set.len(), 2);
        assert!(set.remove("x"));
        assert!(!set.remove("x"));
        assert!(set.contains_key("y"));
    }
}

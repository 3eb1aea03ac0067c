// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Fixed-capacity ring cache with FIFO eviction.
//!
//! Backing store shared by the address cache and the local store: a slot ring
//! of keys plus a key→value map. Inserting always succeeds; once the ring is
//! full the slot being advanced onto is evicted first, so the oldest-inserted
//! entry goes away regardless of how recently it was read. The bound keeps
//! memory finite while tasks churn; eviction timing is by insertion order,
//! deliberately not LRU.

use std::collections::HashMap;
use std::sync::RwLock;

/// Bounded key→value cache with FIFO slot eviction.
///
/// Keys are `u64` (descriptor addresses or task identities). All operations
/// are short critical sections under one read/write lock: reads run
/// concurrently, writes are exclusive.
pub struct RingCache<V> {
    inner: RwLock<RingInner<V>>,
}

struct RingInner<V> {
    /// Insertion-ordered ring of occupant keys; slot 0 is unused until the
    /// cursor wraps.
    slots: Vec<u64>,
    cursor: usize,
    map: HashMap<u64, V>,
}

impl<V> RingCache<V> {
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(RingInner {
                slots: vec![0; capacity.max(1)],
                cursor: 0,
                map: HashMap::new(),
            }),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().map.len()
    }

    /// True when no entries are present.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured slot count.
    pub fn capacity(&self) -> usize {
        self.inner.read().unwrap().slots.len()
    }

    /// Drop every entry and resize the ring to `capacity`.
    pub fn reset(&self, capacity: usize) {
        let mut inner = self.inner.write().unwrap();
        inner.slots = vec![0; capacity.max(1)];
        inner.cursor = 0;
        inner.map = HashMap::new();
    }

    /// Insert `value` under `key`, evicting the occupant of the next slot.
    ///
    /// Always consumes a slot, even when `key` is already present; use
    /// [`RingCache::replace`] to overwrite in place.
    pub fn insert(&self, key: u64, value: V) {
        let mut inner = self.inner.write().unwrap();
        inner.advance_and_store(key, value);
    }

    /// Overwrite the value under `key` in place when present, otherwise
    /// insert it (consuming a slot).
    pub fn replace(&self, key: u64, value: V) {
        let mut inner = self.inner.write().unwrap();
        if let Some(existing) = inner.map.get_mut(&key) {
            *existing = value;
        } else {
            inner.advance_and_store(key, value);
        }
    }

    /// Run `apply` on the value under `key`, inserting `init()` first when
    /// absent. Only the insert consumes a slot.
    pub fn update_or_insert<R>(
        &self,
        key: u64,
        init: impl FnOnce() -> V,
        apply: impl FnOnce(&mut V) -> R,
    ) -> R {
        let mut inner = self.inner.write().unwrap();
        if !inner.map.contains_key(&key) {
            inner.advance_and_store(key, init());
        }
        // Present by construction at this point.
        apply(inner.map.get_mut(&key).unwrap())
    }

    /// Remove the entry under `key`. Its slot stays consumed until the
    /// cursor wraps over it.
    pub fn remove(&self, key: u64) {
        let mut inner = self.inner.write().unwrap();
        inner.map.remove(&key);
    }

    /// Clone the value under `key` out of the cache.
    pub fn get(&self, key: u64) -> Option<V>
    where
        V: Clone,
    {
        self.inner.read().unwrap().map.get(&key).cloned()
    }

    /// Read the value under `key` without cloning it.
    pub fn read_with<R>(&self, key: u64, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.inner.read().unwrap().map.get(&key).map(f)
    }

    /// True when `key` has a live entry.
    pub fn contains(&self, key: u64) -> bool {
        self.inner.read().unwrap().map.contains_key(&key)
    }
}

impl<V> RingInner<V> {
    fn advance_and_store(&mut self, key: u64, value: V) {
        let mut next = self.cursor + 1;
        if next >= self.slots.len() {
            next = 0;
        }

        // Evict whatever occupied the slot we are advancing onto.
        let evicted = self.slots[next];
        self.map.remove(&evicted);

        self.slots[next] = key;
        self.map.insert(key, value);
        self.cursor = next;
    }
}

impl<V> std::fmt::Debug for RingCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().unwrap();
        f.debug_struct("RingCache")
            .field("capacity", &inner.slots.len())
            .field("len", &inner.map.len())
            .field("cursor", &inner.cursor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let cache = RingCache::new(8);
        cache.insert(1, "a");
        cache.insert(2, "b");
        assert_eq!(cache.get(1), Some("a"));
        assert_eq!(cache.get(2), Some("b"));
        assert_eq!(cache.get(3), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_fifo_eviction_oldest_goes_first() {
        // Capacity 2: the third insert pushes out the first.
        let cache = RingCache::new(2);
        cache.insert(1, 10u64);
        cache.insert(2, 20);
        cache.insert(3, 30);
        assert_eq!(cache.get(1), None);
        assert_eq!(cache.get(2), Some(20));
        assert_eq!(cache.get(3), Some(30));
    }

    #[test]
    fn test_eviction_is_insertion_order_not_access_order() {
        let cache = RingCache::new(2);
        cache.insert(1, 10u64);
        cache.insert(2, 20);
        // Reading key 1 does not protect it; it is still the oldest insert.
        assert_eq!(cache.get(1), Some(10));
        cache.insert(3, 30);
        assert_eq!(cache.get(1), None);
        assert_eq!(cache.get(2), Some(20));
    }

    #[test]
    fn test_capacity_n_plus_one_inserts() {
        let n = 16;
        let cache = RingCache::new(n);
        for key in 1..=(n as u64 + 1) {
            cache.insert(key, key);
        }
        // Exactly the oldest key is gone; all others are retrievable.
        assert_eq!(cache.get(1), None);
        for key in 2..=(n as u64 + 1) {
            assert_eq!(cache.get(key), Some(key), "key {key} missing");
        }
        assert_eq!(cache.len(), n);
    }

    #[test]
    fn test_replace_does_not_consume_slot() {
        let cache = RingCache::new(2);
        cache.insert(1, 10u64);
        cache.insert(2, 20);
        cache.replace(1, 11);
        cache.replace(2, 22);
        // Both still live: replacing in place advanced no slots.
        assert_eq!(cache.get(1), Some(11));
        assert_eq!(cache.get(2), Some(22));
    }

    #[test]
    fn test_update_or_insert() {
        let cache: RingCache<Vec<u64>> = RingCache::new(4);
        cache.update_or_insert(7, Vec::new, |v| v.push(1));
        cache.update_or_insert(7, Vec::new, |v| v.push(2));
        assert_eq!(cache.get(7), Some(vec![1, 2]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove() {
        let cache = RingCache::new(4);
        cache.insert(1, "a");
        cache.remove(1);
        assert_eq!(cache.get(1), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reset_resizes_and_clears() {
        let cache = RingCache::new(2);
        cache.insert(1, "a");
        cache.reset(8);
        assert_eq!(cache.capacity(), 8);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let cache = RingCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.insert(1, "a");
        assert_eq!(cache.get(1), Some("a"));
        cache.insert(2, "b");
        assert_eq!(cache.get(1), None);
    }

    #[test]
    fn test_read_with() {
        let cache = RingCache::new(4);
        cache.insert(5, String::from("hello"));
        assert_eq!(cache.read_with(5, |s| s.len()), Some(5));
        assert_eq!(cache.read_with(6, |s: &String| s.len()), None);
    }
}

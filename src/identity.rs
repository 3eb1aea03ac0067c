// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tiered task-identity resolution.
//!
//! Produces a `u64` identity for the calling task and never fails: the fast
//! direct read, then the textual parse, then a synthetic counter. Successful
//! resolutions are cached against the task's descriptor address so the slow
//! paths run at most once per live task.
//!
//! The identity is unique only while the originating descriptor address is
//! not reclaimed and reused; after a task ends, both its address and its
//! runtime id can be handed to an unrelated task. Consumers of per-identity
//! state must clear or overwrite before trusting reads (see
//! [`crate::store`]).

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cache::RingCache;
use crate::logger;
use crate::rt;

thread_local! {
    /// Synthetic identity pinned to a plain (non-runtime) thread, so that
    /// repeated resolutions on the same thread stay stable.
    static THREAD_PINNED_ID: Cell<u64> = const { Cell::new(0) };
}

/// Resolver plus its descriptor-address cache.
pub struct IdentityResolver {
    addresses: RingCache<u64>,
    synthetic: AtomicU64,
}

impl IdentityResolver {
    /// Create a resolver whose address cache holds `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            addresses: RingCache::new(capacity),
            synthetic: AtomicU64::new(0),
        }
    }

    /// Identity of the calling task. Never fails.
    ///
    /// Tasks launched through this crate's spawners resolve through the
    /// address cache; foreign tasks resolve per call; plain threads get a
    /// thread-pinned synthetic identity.
    pub fn current(&self) -> u64 {
        let addr = rt::descriptor_addr();
        if addr == 0 {
            if let Some(id) = rt::native_id() {
                return id;
            }
            if let Some(id) = rt::textual_id() {
                return id;
            }
            return self.thread_pinned();
        }

        if let Some(id) = self.cached(addr) {
            return id;
        }

        if let Some(id) = rt::native_id() {
            logger::info(format_args!(
                "resolved new id by native read, addr:{addr:#x}, id:{id}"
            ));
            self.cache(addr, id);
            return id;
        }

        if let Some(id) = rt::textual_id() {
            logger::warn(format_args!(
                "resolved new id by textual parse, addr:{addr:#x}, id:{id}"
            ));
            self.cache(addr, id);
            return id;
        }

        let id = self.next_synthetic();
        logger::warn(format_args!(
            "resolved new id from synthetic counter, addr:{addr:#x}, id:{id}"
        ));
        self.cache(addr, id);
        id
    }

    /// Identity previously cached for a descriptor address, if still held.
    pub fn cached(&self, addr: u64) -> Option<u64> {
        self.addresses.get(addr)
    }

    /// Cache a resolved identity for a descriptor address.
    pub fn cache(&self, addr: u64, id: u64) {
        self.addresses.insert(addr, id);
    }

    /// Resolve without consulting or filling the cache.
    ///
    /// 0 when neither the direct read nor the textual parse can produce an
    /// id (e.g. outside any tokio task).
    pub fn resolve_uncached(&self) -> u64 {
        if let Some(id) = rt::native_id() {
            return id;
        }
        rt::textual_id().unwrap_or(0)
    }

    /// Capacity of the descriptor-address cache.
    pub fn capacity(&self) -> usize {
        self.addresses.capacity()
    }

    /// Drop all cached resolutions and resize the address cache.
    pub fn reset(&self, capacity: usize) {
        self.addresses.reset(capacity);
    }

    fn next_synthetic(&self) -> u64 {
        self.synthetic.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn thread_pinned(&self) -> u64 {
        THREAD_PINNED_ID.with(|cell| {
            let mut id = cell.get();
            if id == 0 {
                id = self.next_synthetic();
                cell.set(id);
            }
            id
        })
    }
}

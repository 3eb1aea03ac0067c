// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Registry tying resolver, store, and configuration together.
//!
//! A [`Registry`] owns the two bounded caches (descriptor address →
//! identity, identity → data set) and the synthetic-id counter. It is an
//! explicitly constructed object so tests can isolate instances; the
//! process-wide default lives in [`GLOBAL_REGISTRY`] and backs the
//! module-level convenience functions used by most callers.

use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::{Lazy, OnceCell};

use crate::config::{Config, DEFAULT_CAPACITY, DEFAULT_MONITOR_INTERVAL_SECS};
use crate::error::ConfigError;
use crate::identity::IdentityResolver;
use crate::logger;
use crate::monitor;
use crate::rt;
use crate::store::{LocalDataSet, LocalScope, LocalStore};
use crate::trace;

/// Resolver, store, and runtime-adjustable settings for one storage domain.
pub struct Registry {
    resolver: IdentityResolver,
    store: LocalStore,
    monitor_interval_secs: AtomicU64,
}

impl Registry {
    /// Create a registry whose caches hold `capacity` entries each.
    pub fn new(capacity: usize) -> Self {
        Self {
            resolver: IdentityResolver::new(capacity),
            store: LocalStore::new(capacity),
            monitor_interval_secs: AtomicU64::new(DEFAULT_MONITOR_INTERVAL_SECS),
        }
    }

    /// Create a registry from a configuration block.
    pub fn with_config(config: &Config) -> Self {
        let registry = Self::new(config.capacity);
        registry.set_monitor_interval(config.monitor_interval_secs);
        registry
    }

    /// Identity of the calling task (cached, tiered resolution).
    pub fn current_id(&self) -> u64 {
        self.resolver.current()
    }

    /// Identity of the calling task bypassing the cache; 0 when no direct
    /// or textual resolution is possible.
    pub fn resolve_uncached(&self) -> u64 {
        self.resolver.resolve_uncached()
    }

    /// Write `key` into the calling task's data set.
    pub fn set_val<T>(&self, key: impl Into<String>, value: T)
    where
        T: std::any::Any + Clone + Send + Sync,
    {
        let id = self.current_id();
        self.store.set_val(id, key, value);
    }

    /// Typed read from the calling task's data set.
    pub fn get_val<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + 'static,
    {
        let id = self.current_id();
        self.store.get_val(id, key)
    }

    /// Deep copy of the calling task's full data set.
    pub fn snapshot(&self) -> Option<LocalDataSet> {
        let id = self.current_id();
        self.store.snapshot(id)
    }

    /// Replace the calling task's data set wholesale.
    pub fn restore(&self, set: LocalDataSet) {
        let id = self.current_id();
        self.store.restore(id, set);
    }

    /// Remove the calling task's data set entirely.
    pub fn clear(&self) {
        let id = self.current_id();
        self.store.clear(id);
    }

    /// Clear the calling task's data and hand back a typed scope.
    ///
    /// The reset-before-use step for tasks not launched through
    /// [`crate::spawn`]; see the store module's caller contract.
    pub fn scope(&self) -> LocalScope<'_> {
        let id = self.current_id();
        LocalScope::adopt(&self.store, id)
    }

    /// Identity and composed trace chain of the calling task.
    pub fn current_trace(&self) -> (u64, String) {
        let id = self.current_id();
        (id, trace::current_trace_for(&self.store, id))
    }

    /// Record `trace` as the calling task's inherited parent trace.
    pub fn adopt_parent_trace(&self, trace_str: impl Into<String>) {
        let id = self.current_id();
        trace::adopt_parent_trace_for(&self.store, id, trace_str);
    }

    /// Configured capacity of the caches.
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    /// Drop all cached identities and data sets and resize both caches.
    pub fn resize(&self, capacity: usize) {
        self.resolver.reset(capacity);
        self.store.reset(capacity);
    }

    /// Seconds between capacity-monitor checks.
    pub fn monitor_interval_secs(&self) -> u64 {
        self.monitor_interval_secs.load(Ordering::Relaxed)
    }

    /// Adjust the capacity-monitor interval.
    pub fn set_monitor_interval(&self, secs: u64) {
        self.monitor_interval_secs.store(secs, Ordering::Relaxed);
    }

    pub(crate) fn store(&self) -> &LocalStore {
        &self.store
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Process-wide default registry backing the module-level functions.
pub static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(Registry::default);

static INIT: OnceCell<()> = OnceCell::new();

/// Apply configuration to the global registry and start the capacity
/// monitor. Invalid values are replaced with their defaults and logged; a
/// repeated call is logged and ignored.
pub fn init(config: Config) {
    let mut config = config;
    if config.capacity == 0 {
        logger::warn(format_args!(
            "configured capacity 0 is invalid, using default {DEFAULT_CAPACITY}"
        ));
        config.capacity = DEFAULT_CAPACITY;
    }
    if config.monitor_interval_secs == 0 {
        logger::warn(format_args!(
            "configured monitor interval 0 is invalid, using default {DEFAULT_MONITOR_INTERVAL_SECS}s"
        ));
        config.monitor_interval_secs = DEFAULT_MONITOR_INTERVAL_SECS;
    }
    if let Err(err) = try_init(config) {
        logger::warn(format_args!("init skipped: {err}"));
    }
}

/// Apply configuration to the global registry and start the capacity
/// monitor, failing on invalid values or repeated initialization.
pub fn try_init(config: Config) -> Result<(), ConfigError> {
    config.validate()?;
    INIT.set(()).map_err(|_| ConfigError::AlreadyInitialized)?;

    GLOBAL_REGISTRY.resize(config.capacity);
    GLOBAL_REGISTRY.set_monitor_interval(config.monitor_interval_secs);
    trace::set_trace_filter(config.trace_filter);

    logger::info(format_args!(
        "concurrency-local storage ready, capacity {}, {}",
        config.capacity,
        rt::resolution_mode()
    ));
    monitor::start(config.monitor_interval_secs);
    Ok(())
}

/// Identity of the calling task. See [`Registry::current_id`].
pub fn current_id() -> u64 {
    GLOBAL_REGISTRY.current_id()
}

/// Write `key` into the calling task's data set. See [`Registry::set_val`].
pub fn set_val<T>(key: impl Into<String>, value: T)
where
    T: std::any::Any + Clone + Send + Sync,
{
    GLOBAL_REGISTRY.set_val(key, value);
}

/// Typed read from the calling task's data set. See [`Registry::get_val`].
pub fn get_val<T>(key: &str) -> Option<T>
where
    T: Clone + 'static,
{
    GLOBAL_REGISTRY.get_val(key)
}

/// Deep copy of the calling task's data set. See [`Registry::snapshot`].
pub fn snapshot() -> Option<LocalDataSet> {
    GLOBAL_REGISTRY.snapshot()
}

/// Replace the calling task's data set. See [`Registry::restore`].
pub fn restore(set: LocalDataSet) {
    GLOBAL_REGISTRY.restore(set);
}

/// Remove the calling task's data set. See [`Registry::clear`].
pub fn clear() {
    GLOBAL_REGISTRY.clear();
}

/// Clear the calling task's data and hand back a typed scope.
pub fn scope() -> LocalScope<'static> {
    GLOBAL_REGISTRY.scope()
}

/// Identity and composed trace chain of the calling task.
pub fn current_trace() -> (u64, String) {
    GLOBAL_REGISTRY.current_trace()
}

/// Record the calling task's inherited parent trace.
pub fn adopt_parent_trace(trace_str: impl Into<String>) {
    GLOBAL_REGISTRY.adopt_parent_trace(trace_str);
}

/// Resize the global caches, dropping their contents.
pub fn resize(capacity: usize) {
    GLOBAL_REGISTRY.resize(capacity);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_round_trip_on_plain_thread() {
        let registry = Registry::new(16);
        registry.set_val("x", 5u64);
        assert_eq!(registry.get_val::<u64>("x"), Some(5));
        registry.set_val("x", 10u64);
        assert_eq!(registry.get_val::<u64>("x"), Some(10));
    }

    #[test]
    fn test_clear_removes_data() {
        let registry = Registry::new(16);
        registry.set_val("x", 5u64);
        registry.clear();
        assert_eq!(registry.get_val::<u64>("x"), None);
    }

    #[test]
    fn test_scope_wipes_stale_data() {
        let registry = Registry::new(16);
        registry.set_val("stale", true);
        let scope = registry.scope();
        assert_eq!(scope.get::<bool>("stale"), None);
        scope.set("fresh", 3u64);
        assert_eq!(registry.get_val::<u64>("fresh"), Some(3));
    }

    #[test]
    fn test_snapshot_restore_between_identities() {
        let registry = Registry::new(16);
        registry.set_val("x", 5u64);
        let snapshot = registry.snapshot().unwrap();

        // Hand the snapshot to another thread (a different identity).
        let registry = std::sync::Arc::new(registry);
        let r = std::sync::Arc::clone(&registry);
        std::thread::spawn(move || {
            r.restore(snapshot);
            assert_eq!(r.get_val::<u64>("x"), Some(5));
            r.set_val("x", 9u64);
            assert_eq!(r.get_val::<u64>("x"), Some(9));
        })
        .join()
        .unwrap();

        // The spawning thread's copy is untouched.
        assert_eq!(registry.get_val::<u64>("x"), Some(5));
    }

    #[test]
    fn test_current_trace_contains_identity() {
        let registry = Registry::new(16);
        let (id, trace) = registry.current_trace();
        assert!(trace.contains(&format!("coid:{id}")));
    }

    #[test]
    fn test_adopted_trace_prefixes_current() {
        let registry = Registry::new(16);
        registry.adopt_parent_trace("elder:1-coid:77-frames:9");
        let (_, trace) = registry.current_trace();
        assert!(trace.starts_with("elder:1-coid:77-frames:9"));
    }

    #[test]
    fn test_resize_drops_state() {
        let registry = Registry::new(16);
        registry.set_val("x", 5u64);
        registry.resize(32);
        assert_eq!(registry.capacity(), 32);
        assert_eq!(registry.get_val::<u64>("x"), None);
    }

    #[test]
    fn test_monitor_interval_setter() {
        let registry = Registry::new(16);
        assert_eq!(registry.monitor_interval_secs(), DEFAULT_MONITOR_INTERVAL_SECS);
        registry.set_monitor_interval(30);
        assert_eq!(registry.monitor_interval_secs(), 30);
    }

    #[test]
    fn test_with_config() {
        let config = Config::default().with_capacity(64).with_monitor_interval(5);
        let registry = Registry::with_config(&config);
        assert_eq!(registry.capacity(), 64);
        assert_eq!(registry.monitor_interval_secs(), 5);
    }
}

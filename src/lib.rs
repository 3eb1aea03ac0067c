// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Colocal - concurrency-local storage and cross-task tracing for tokio.
//!
//! Tokio tasks have no ambient task-local storage and no cheap public
//! identity: `task_local!` needs every future instrumented at spawn time,
//! and the opaque `tokio::task::Id` is only observable through slow string
//! formatting. Colocal derives a usable `u64` identity for "the currently
//! running task" anyway, keys bounded caches with it, and uses that to offer
//! per-task key/value storage plus trace chains that survive spawn
//! boundaries.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`rt`] - Runtime introspection seam (descriptor anchors, id reads, dump scanning)
//! - [`identity`] - Tiered identity resolution with address caching
//! - [`cache`] - Bounded FIFO ring cache backing both stores
//! - [`store`] - Per-task key/value data sets and their lifecycle
//! - [`trace`] - Call-stack capture, filtering, and cross-task trace chains
//! - [`spawn`] - Spawn wrappers propagating data and traces to children
//! - [`monitor`] - Background capacity monitor
//! - [`registry`] - The owning registry, global instance, and init
//! - [`config`] - Configuration types
//! - [`logger`] - Pluggable degradation-report sink
//! - [`error`] - Error types
//!
//! # Identity caveats
//!
//! Identities are stable for a task's lifetime but can be recycled once the
//! task ends. Tasks launched through [`Spawner`] or [`go`] start from a
//! clean (or parent-copied) state automatically; any other task should take
//! a [`scope`] before trusting reads. See the store module docs.
//!
//! # Example
//!
//! ```rust,ignore
//! use colocal::{go, Config, Spawner};
//!
//! colocal::init(Config::default());
//!
//! colocal::set_val("request_id", 1234_u64);
//!
//! let spawner = Spawner::new();
//! spawner.spawn(async {
//!     // The child sees a deep copy of the parent's data.
//!     let request_id: Option<u64> = colocal::get_val("request_id");
//!     let (_, trace) = colocal::current_trace();
//!     println!("handling {request_id:?} via {trace}");
//! });
//! spawner.wait().await;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod identity;
pub mod logger;
pub mod monitor;
pub mod registry;
pub mod rt;
pub mod spawn;
pub mod store;
pub mod trace;

// Re-export the working surface at the crate root
pub use config::{Config, TraceFilter, DEFAULT_CAPACITY, DEFAULT_MONITOR_INTERVAL_SECS};
pub use error::{ConfigError, Result};
pub use logger::{set_sink, LogSink};
pub use registry::{
    adopt_parent_trace, clear, current_id, current_trace, get_val, init, restore, resize, scope,
    set_val, snapshot, try_init, Registry, GLOBAL_REGISTRY,
};
pub use spawn::{go, go_with, Spawner};
pub use store::{LocalDataSet, LocalScope, LocalStore, TaskLocal};
pub use trace::{call_stack, capture_frames, set_trace_filter};

/// Colocal version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Background capacity monitor.
//!
//! Periodically compares the runtime's live task count against 80% of the
//! configured cache capacity. Above the threshold, ring eviction is likely
//! to discard entries for tasks that are still alive: resolution gets
//! repeated and, in rare races, two live tasks can transiently share a
//! formerly cached identity. The monitor only reports the condition; the
//! caches keep accepting entries either way.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::logger;
use crate::registry::{Registry, GLOBAL_REGISTRY};
use crate::rt;

/// Outcome of one capacity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityStatus {
    /// Live tasks are comfortably below the eviction-risk threshold.
    Safe,
    /// Live tasks are at or above 80% of capacity; data loss is likely.
    AtRisk,
}

/// Start the monitor loop on the current runtime.
///
/// Returns `None` (with a warning) when called outside a tokio runtime.
/// The interval is re-read from the global registry on every cycle, so
/// [`Registry::set_monitor_interval`] takes effect on the next tick.
pub(crate) fn start(interval_secs: u64) -> Option<JoinHandle<()>> {
    if tokio::runtime::Handle::try_current().is_err() {
        logger::warn(format_args!(
            "no tokio runtime active, capacity monitor not started"
        ));
        return None;
    }
    GLOBAL_REGISTRY.set_monitor_interval(interval_secs);
    Some(tokio::spawn(run()))
}

async fn run() {
    loop {
        let secs = GLOBAL_REGISTRY.monitor_interval_secs().max(1);
        tokio::time::sleep(Duration::from_secs(secs)).await;
        check(&GLOBAL_REGISTRY);
    }
}

/// Compare live tasks to the registry's capacity and report the result.
pub(crate) fn check(registry: &Registry) -> CapacityStatus {
    let live = rt::live_task_count();
    let capacity = registry.capacity();
    let mode = rt::resolution_mode();

    if live < capacity * 8 / 10 {
        logger::info(format_args!(
            "live tasks {live} < capacity {capacity} * 0.8, caches safe ({mode})"
        ));
        CapacityStatus::Safe
    } else {
        logger::error(format_args!(
            "live tasks {live} >= capacity {capacity} * 0.8, evictions may discard \
             data for live tasks, raise capacity via resize ({mode})"
        ));
        CapacityStatus::AtRisk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_outside_runtime_is_skipped() {
        assert!(start(10).is_none());
    }

    #[tokio::test]
    async fn test_start_inside_runtime() {
        let handle = start(1).expect("runtime is active");
        handle.abort();
    }

    #[tokio::test]
    async fn test_check_reports_safe_with_headroom() {
        let registry = Registry::new(1_000_000);
        assert_eq!(check(&registry), CapacityStatus::Safe);
    }

    #[tokio::test]
    async fn test_check_reports_risk_at_tiny_capacity() {
        let registry = Registry::new(1);
        // Threshold is zero tasks; the running test task alone exceeds it.
        assert_eq!(check(&registry), CapacityStatus::AtRisk);
    }
}

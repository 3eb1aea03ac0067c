// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration types for caches, the capacity monitor, and trace filtering.
//!
//! A [`Config`] is applied once through [`crate::init`] or
//! [`crate::try_init`]; the individual values can also be adjusted later
//! through their dedicated setters. Fields are serde-friendly so hosts can
//! embed the block in their own configuration files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ConfigError;

/// Default upper bound on tracked tasks for both ring caches.
pub const DEFAULT_CAPACITY: usize = 100_000;

/// Default capacity-monitor interval in seconds.
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 10;

/// Top-level configuration block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Task-count upper bound for the address cache and the local store.
    pub capacity: usize,

    /// Seconds between capacity-monitor checks.
    pub monitor_interval_secs: u64,

    /// Call-stack filtering for trace strings.
    pub trace_filter: TraceFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            monitor_interval_secs: DEFAULT_MONITOR_INTERVAL_SECS,
            trace_filter: TraceFilter::default(),
        }
    }
}

impl Config {
    /// Set the cache capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the monitor interval in seconds.
    pub fn with_monitor_interval(mut self, secs: u64) -> Self {
        self.monitor_interval_secs = secs;
        self
    }

    /// Set the trace filter.
    pub fn with_trace_filter(mut self, filter: TraceFilter) -> Self {
        self.trace_filter = filter;
        self
    }

    /// Check the values before applying them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.monitor_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}

/// Call-stack filtering applied when rendering trace frames.
///
/// The default is empty: every frame renders with its full path. Fields are
/// process-wide and last-writer-wins; there is no atomicity guarantee across
/// the three of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TraceFilter {
    /// Path prefixes: a frame whose full path contains one of these is
    /// shortened to start at the prefix.
    pub whitelist: Vec<String>,

    /// File names (with or without `.rs`) suppressed from output, rendered
    /// as a bare `-`. Intended for framework/infrastructure frames.
    pub blacklist: Vec<String>,

    /// Literal substring replacements applied to rendered frame names.
    pub rename: HashMap<String, String>,
}

impl TraceFilter {
    /// True when no filtering is configured.
    pub fn is_empty(&self) -> bool {
        self.whitelist.is_empty() && self.blacklist.is_empty() && self.rename.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.monitor_interval_secs, DEFAULT_MONITOR_INTERVAL_SECS);
        assert!(config.trace_filter.is_empty());
    }

    #[test]
    fn test_config_builder() {
        let config = Config::default()
            .with_capacity(2_000)
            .with_monitor_interval(30);
        assert_eq!(config.capacity, 2_000);
        assert_eq!(config.monitor_interval_secs, 30);
    }

    #[test]
    fn test_config_validate() {
        assert!(Config::default().validate().is_ok());
        assert_eq!(
            Config::default().with_capacity(0).validate(),
            Err(ConfigError::ZeroCapacity)
        );
        assert_eq!(
            Config::default().with_monitor_interval(0).validate(),
            Err(ConfigError::ZeroInterval)
        );
    }

    #[test]
    fn test_config_serde_round_trip() {
        let mut filter = TraceFilter::default();
        filter.whitelist.push("myapp/src".to_string());
        filter.blacklist.push("runtime.rs".to_string());
        filter
            .rename
            .insert("very/long/path".to_string(), "vlp".to_string());

        let config = Config::default()
            .with_capacity(500)
            .with_trace_filter(filter);

        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.capacity, 500);
        assert_eq!(parsed.trace_filter.whitelist, vec!["myapp/src"]);
        assert_eq!(parsed.trace_filter.rename["very/long/path"], "vlp");
    }

    #[test]
    fn test_config_defaults_for_missing_fields() {
        let parsed: Config = serde_json::from_str(r#"{"capacity": 42}"#).unwrap();
        assert_eq!(parsed.capacity, 42);
        assert_eq!(parsed.monitor_interval_secs, DEFAULT_MONITOR_INTERVAL_SECS);
        assert!(parsed.trace_filter.is_empty());
    }
}

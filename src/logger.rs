// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pluggable logging sink for degradation reports.
//!
//! The core only logs to report degraded performance and capacity risk, never
//! for control flow. By default messages go to the `tracing` macros; hosts
//! with their own logging stack can install a [`LogSink`] once at startup.

use std::fmt;

use once_cell::sync::OnceCell;

/// Three-level sink the core reports through.
///
/// Methods receive the fully formatted message.
pub trait LogSink: Send + Sync {
    /// Routine report (e.g. capacity within bounds).
    fn info(&self, message: &str);

    /// Degraded-performance report (e.g. slow identity resolution in use).
    fn warn(&self, message: &str);

    /// Data-loss-risk report (e.g. live tasks approaching cache capacity).
    fn error(&self, message: &str);
}

/// Default sink forwarding to the `tracing` macros.
struct TracingSink;

impl LogSink for TracingSink {
    fn info(&self, message: &str) {
        tracing::info!(target: "colocal", "{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "colocal", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "colocal", "{message}");
    }
}

static SINK: OnceCell<Box<dyn LogSink>> = OnceCell::new();

static DEFAULT_SINK: TracingSink = TracingSink;

/// Install a process-wide sink. The first caller wins; later calls are
/// ignored and return `false`.
pub fn set_sink(sink: Box<dyn LogSink>) -> bool {
    SINK.set(sink).is_ok()
}

fn sink() -> &'static dyn LogSink {
    match SINK.get() {
        Some(custom) => custom.as_ref(),
        None => &DEFAULT_SINK,
    }
}

pub(crate) fn info(args: fmt::Arguments<'_>) {
    sink().info(&args.to_string());
}

pub(crate) fn warn(args: fmt::Arguments<'_>) {
    sink().warn(&args.to_string());
}

pub(crate) fn error(args: fmt::Arguments<'_>) {
    sink().error(&args.to_string());
}

// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Cross-task trace chains.
//!
//! A trace string is a dash-joined list of `file:line` frames, prefixed by
//! the ancestor chain inherited at spawn time:
//! `<ancestorTrace>-coid:<identity>-<selfFrames>`. Spawning through
//! [`crate::spawn`] hands the parent's composed trace to the child, so the
//! chain follows the logical call path across task boundaries where a plain
//! stack capture would end.
//!
//! Frame rendering is filtered by the process-wide [`TraceFilter`]:
//! blacklisted frames collapse to a bare `-`, whitelisted path prefixes
//! shorten long paths, and the rename map abbreviates what remains. The
//! default is full paths with no filtering.

use std::collections::HashSet;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use uuid::Uuid;

use crate::config::TraceFilter;
use crate::store::LocalStore;

/// Frames captured per trace segment.
const TRACE_DEPTH: usize = 5;

/// Frames skipped before a trace segment capture (crate-internal callers).
const TRACE_BASE_LEVEL: usize = 5;

/// Frames skipped before a direct [`call_stack`] capture.
const CALL_STACK_BASE_LEVEL: usize = 3;

/// Reserved storage key holding the inherited parent trace.
///
/// Salted with a per-process UUID so user keys cannot collide with it.
static PARENT_TRACE_KEY: Lazy<String> =
    Lazy::new(|| format!("__colocal:parent-trace:{}", Uuid::new_v4()));

static FILTER: Lazy<RwLock<TraceFilter>> = Lazy::new(|| RwLock::new(TraceFilter::default()));

/// Install the process-wide trace filter. Last writer wins; there is no
/// atomicity guarantee across the three filter fields.
pub fn set_trace_filter(filter: TraceFilter) {
    *FILTER.write().unwrap() = filter;
}

pub(crate) fn active_filter() -> TraceFilter {
    FILTER.read().unwrap().clone()
}

pub(crate) fn parent_trace_key() -> &'static str {
    &PARENT_TRACE_KEY
}

/// One resolved stack frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Frame {
    pub(crate) file: String,
    pub(crate) line: u32,
}

/// Extract `file:line` frames from a std backtrace rendering.
///
/// Keeps the capture's most-recent-first order. Frames without a resolvable
/// `at <path>:<line>:<col>` location are skipped.
pub(crate) fn parse_backtrace(text: &str) -> Vec<Frame> {
    let mut frames = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        let Some(location) = trimmed.strip_prefix("at ") else {
            continue;
        };
        let mut parts = location.rsplitn(3, ':');
        let _column = parts.next();
        let line_no = parts.next().and_then(|s| s.parse::<u32>().ok());
        let path = parts.next();
        if let (Some(line), Some(path)) = (line_no, path) {
            frames.push(Frame {
                file: path.to_string(),
                line,
            });
        }
    }
    frames
}

fn base_name(path: &str) -> String {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    name.replace(".rs", "")
}

/// Render a window of frames as a dash-joined trace segment.
///
/// Frames `base_level .. base_level + max_frames` are emitted oldest first.
/// In full-path mode every frame renders as-is; otherwise the filter is
/// applied per frame: blacklist, then whitelist, then repeated-filename
/// fallback, then renames.
pub(crate) fn render_frames(
    frames: &[Frame],
    max_frames: usize,
    base_level: usize,
    full_path: bool,
    filter: &TraceFilter,
) -> String {
    let mut out = String::new();
    let mut seen: HashSet<String> = HashSet::new();

    for i in (base_level..base_level + max_frames).rev() {
        let Some(frame) = frames.get(i) else {
            continue;
        };
        let mut name = frame.file.clone();

        if !full_path {
            name = base_name(&frame.file);

            if filter.blacklist.iter().any(|b| base_name(b) == name) {
                out.push('-');
                continue;
            }

            for prefix in &filter.whitelist {
                if let Some(idx) = frame.file.find(prefix.as_str()) {
                    if idx > 0 {
                        name = frame.file[idx..].to_string();
                        break;
                    }
                }
            }

            // A path repeated within one capture falls back to its bare
            // file name.
            if seen.contains(&name) {
                name = base_name(&frame.file);
            }

            for (from, to) in &filter.rename {
                name = name.replace(from.as_str(), to.as_str());
            }

            seen.insert(name.clone());
        }

        if out.is_empty() {
            out = format!("{name}:{}", frame.line);
        } else {
            out.push_str(&format!("-{name}:{}", frame.line));
        }
    }
    out
}

/// Capture the caller's stack and render it as a trace segment.
///
/// Walks frames from `base_level` up to `base_level + max_frames`, oldest
/// first. `full_path` bypasses all filtering.
pub fn capture_frames(max_frames: usize, base_level: usize, full_path: bool) -> String {
    let backtrace = std::backtrace::Backtrace::force_capture();
    let frames = parse_backtrace(&backtrace.to_string());
    render_frames(&frames, max_frames, base_level, full_path, &active_filter())
}

/// Direct call stack of the caller, full paths, no chaining.
pub fn call_stack(max_frames: usize) -> String {
    capture_frames(max_frames, CALL_STACK_BASE_LEVEL, true)
}

/// Compose the chained trace: ancestor, own identity, own frames; then
/// collapse the dash runs that blacklisted or empty frames leave behind.
pub(crate) fn compose(parent: &str, id: u64, own_frames: &str) -> String {
    let mut trace = format!("{parent}-coid:{id}-{own_frames}");
    for run in ["-----", "----", "---"] {
        trace = trace.replace(run, "--");
    }
    trace
}

/// Composed trace for `id`: inherited parent trace plus a fresh capture.
pub(crate) fn current_trace_for(store: &LocalStore, id: u64) -> String {
    let parent: String = store
        .get_val(id, parent_trace_key())
        .unwrap_or_default();
    let own = capture_frames(TRACE_DEPTH, TRACE_BASE_LEVEL, false);
    compose(&parent, id, &own)
}

/// Record `trace` as the inherited parent trace for `id`.
pub(crate) fn adopt_parent_trace_for(store: &LocalStore, id: u64, trace: impl Into<String>) {
    store.set_val(id, parent_trace_key(), trace.into());
}

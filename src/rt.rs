// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Runtime introspection seam.
//!
//! Everything tokio-specific lives here: the per-task descriptor anchor
//! published around each poll, the validated fast read of the opaque
//! [`tokio::task::Id`], the safe-but-slow textual read, and the dump scanner
//! used by diagnostics. The rest of the crate only sees `u64` addresses and
//! identities.
//!
//! tokio gives a task no ambient storage and no cheap public identity: the
//! one official way to observe a task id's value is `Display` formatting.
//! The fast path therefore reads the id's backing integer directly, guarded
//! by a one-time layout probe: tokio does not promise the `Id` layout, so
//! the probe checks size and agreement with the formatted value before the
//! read is ever trusted, and rejection permanently falls back to the textual
//! path for the life of the process.

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll};

use crate::logger;

/// Anchor line prefix introducing a task id in a combined textual dump.
pub const ID_ANCHOR: &str = "task ";

thread_local! {
    /// Descriptor address of the tracked task currently polled on this
    /// worker thread; 0 when none.
    static CURRENT_ANCHOR: Cell<u64> = const { Cell::new(0) };
}

/// Heap allocation whose address doubles as the task's descriptor address.
///
/// Lives exactly as long as the wrapping [`TrackedTask`]; once dropped, the
/// allocator may hand the address to a new task. Callers must treat the
/// address as an unstable cache key, never as a dereferenceable pointer.
struct Anchor {
    _slot: u8,
}

/// Future wrapper that publishes its anchor address for every poll.
///
/// The inner future (and any storage or trace call it makes) observes a
/// nonzero [`descriptor_addr`] while running.
pub(crate) struct TrackedTask<F> {
    anchor: Box<Anchor>,
    inner: Pin<Box<F>>,
}

impl<F: Future> TrackedTask<F> {
    pub(crate) fn new(inner: F) -> Self {
        Self {
            anchor: Box::new(Anchor { _slot: 0 }),
            inner: Box::pin(inner),
        }
    }
}

impl<F: Future> Future for TrackedTask<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let addr = &*this.anchor as *const Anchor as usize as u64;
        let _entered = AnchorEntered::enter(addr);
        this.inner.as_mut().poll(cx)
    }
}

/// Guard restoring the previous anchor when a poll finishes.
struct AnchorEntered {
    prev: u64,
}

impl AnchorEntered {
    fn enter(addr: u64) -> Self {
        let prev = CURRENT_ANCHOR.replace(addr);
        Self { prev }
    }
}

impl Drop for AnchorEntered {
    fn drop(&mut self) {
        CURRENT_ANCHOR.set(self.prev);
    }
}

/// Descriptor address of the task currently running on this thread.
///
/// 0 for tasks not launched through this crate's spawners and for plain
/// threads.
pub fn descriptor_addr() -> u64 {
    CURRENT_ANCHOR.get()
}

const PROBE_UNKNOWN: u8 = 0;
const PROBE_VALIDATED: u8 = 1;
const PROBE_REJECTED: u8 = 2;

static PROBE_STATE: AtomicU8 = AtomicU8::new(PROBE_UNKNOWN);

/// Read the current task's id through the validated direct read.
///
/// `None` outside a tokio task, or once the layout probe has rejected the
/// direct read for this process.
pub(crate) fn native_id() -> Option<u64> {
    let id = tokio::task::try_id()?;
    match PROBE_STATE.load(Ordering::Acquire) {
        PROBE_VALIDATED => Some(raw_id_value(&id)),
        PROBE_REJECTED => None,
        _ => probe_layout(&id),
    }
}

/// Read the current task's id by formatting it and folding the digits.
///
/// Always safe; orders of magnitude slower than the direct read (allocates
/// and formats on every call). `None` outside a tokio task or when the
/// formatted text is not a digit run.
pub(crate) fn textual_id() -> Option<u64> {
    let id = tokio::task::try_id()?;
    let text = id.to_string();
    match fold_digits(text.as_bytes()) {
        Some(value) => Some(value),
        None => {
            logger::warn(format_args!(
                "unexpected task id text {text:?}, falling through to synthetic id"
            ));
            None
        }
    }
}

fn raw_id_value(id: &tokio::task::Id) -> u64 {
    // SAFETY: probe_layout verified, before PROBE_VALIDATED was ever
    // published, that Id is u64-sized and that these bytes agree with the
    // Display-formatted value. Any bit pattern is a valid u64.
    unsafe { std::mem::transmute_copy::<tokio::task::Id, u64>(id) }
}

/// One-time layout check for the direct read.
///
/// Validates against the probing task's own id: the byte read must agree
/// with the formatted value. A mismatch (changed tokio internals) disables
/// the direct read for the whole process.
fn probe_layout(id: &tokio::task::Id) -> Option<u64> {
    if std::mem::size_of::<tokio::task::Id>() != std::mem::size_of::<u64>() {
        reject_probe();
        return None;
    }

    // SAFETY: sizes match and u64 accepts any bit pattern; the value is
    // only trusted after the comparison below.
    let raw = unsafe { std::mem::transmute_copy::<tokio::task::Id, u64>(id) };
    let formatted = fold_digits(id.to_string().as_bytes());
    match formatted {
        Some(value) if value == raw && value != 0 => {
            PROBE_STATE.store(PROBE_VALIDATED, Ordering::Release);
            Some(raw)
        }
        _ => {
            reject_probe();
            None
        }
    }
}

fn reject_probe() {
    if PROBE_STATE.swap(PROBE_REJECTED, Ordering::AcqRel) != PROBE_REJECTED {
        logger::warn(format_args!(
            "task id layout probe failed; using textual id resolution, low performance"
        ));
    }
}

/// Human-readable tag for the active resolution mode, used in reports.
pub(crate) fn resolution_mode() -> &'static str {
    match PROBE_STATE.load(Ordering::Acquire) {
        PROBE_VALIDATED => "native id read, high performance",
        PROBE_REJECTED => "textual id parse, low performance",
        _ => "resolution mode not yet probed",
    }
}

/// Fold ASCII digits into a `u64`.
///
/// Accumulate-and-multiply-by-10; a space or end of input terminates the
/// run, anything else aborts the attempt. `None` when no digits were
/// consumed or the run was malformed.
pub(crate) fn fold_digits(bytes: &[u8]) -> Option<u64> {
    let mut value: u64 = 0;
    let mut consumed = 0usize;
    for &b in bytes {
        match b {
            b'0'..=b'9' => {
                value = value.wrapping_mul(10).wrapping_add(u64::from(b - b'0'));
                consumed += 1;
            }
            b' ' => break,
            _ => return None,
        }
    }
    if consumed == 0 {
        return None;
    }
    Some(value)
}

/// Enumerate every task id found in a combined multi-task textual dump.
///
/// Scans for lines starting with [`ID_ANCHOR`] and parses the digits after
/// each occurrence. Malformed or zero ids are skipped. This is the sole
/// mechanism for recovering ids from externally captured dumps; live-count
/// checks use [`live_task_count`] instead.
pub fn scan_ids(dump: &str) -> Vec<u64> {
    let mut ids = Vec::new();
    for line in dump.lines() {
        let Some(rest) = line.strip_prefix(ID_ANCHOR) else {
            continue;
        };
        match fold_digits(rest.as_bytes()) {
            Some(id) if id > 0 => ids.push(id),
            Some(_) | None => {
                logger::warn(format_args!("unparsable id line in dump: {line:?}"));
            }
        }
    }
    ids
}

/// Number of live tasks in the current runtime; 0 outside a runtime.
pub fn live_task_count() -> usize {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle.metrics().num_alive_tasks(),
        Err(_) => 0,
    }
}

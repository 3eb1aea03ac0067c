// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Spawn wrappers that carry local data and trace chains to child tasks.
//!
//! Every form snapshots the caller's data set and composed trace before
//! launching, then (inside the new task, before the body runs) restores
//! the snapshot (or clears leftover state when the parent had none) and
//! adopts the parent trace. The child therefore starts with an independent
//! deep copy of the parent's data and a trace chain that continues where the
//! parent's stack ends.
//!
//! [`Spawner`] is the joinable form: a counting join barrier tracks every
//! task it launches, and [`Spawner::wait`] blocks the calling task until all
//! of them finish. [`go`] and [`go_with`] are fire-and-forget.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::registry;
use crate::rt::TrackedTask;
use crate::store::LocalDataSet;

/// Counting join barrier: increment before launch, decrement on completion,
/// wake waiters when the count returns to zero.
struct WaitGroup {
    count: AtomicUsize,
    notify: Notify,
}

impl WaitGroup {
    fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    fn add(&self, n: usize) {
        self.count.fetch_add(n, Ordering::AcqRel);
    }

    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.notify.notify_waiters();
        }
    }

    async fn wait(&self) {
        loop {
            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before the re-check so a decrement in between still
            // wakes us.
            notified.as_mut().enable();
            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Decrements the group even when the task body panics.
struct DoneGuard(Arc<WaitGroup>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.done();
    }
}

/// Joinable spawner: tracks every task launched through it.
#[derive(Clone)]
pub struct Spawner {
    wg: Arc<WaitGroup>,
}

impl Spawner {
    /// Create an empty spawner.
    pub fn new() -> Self {
        Self {
            wg: Arc::new(WaitGroup::new()),
        }
    }

    /// Launch `body` as a tracked task carrying the caller's data and trace.
    pub fn spawn<F>(&self, body: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let snapshot = registry::snapshot();
        let (_, trace) = registry::current_trace();
        self.wg.add(1);
        let guard = DoneGuard(Arc::clone(&self.wg));
        tokio::spawn(TrackedTask::new(async move {
            let _done = guard;
            adopt_inherited(snapshot, trace);
            body.await
        }))
    }

    /// Launch `f(arg)` as a tracked task; `f` runs inside the new task.
    pub fn spawn_with<A, F, Fut>(&self, f: F, arg: A) -> JoinHandle<Fut::Output>
    where
        A: Send + 'static,
        F: FnOnce(A) -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        self.spawn(async move { f(arg).await })
    }

    /// Block the calling task until every task spawned through this spawner
    /// has completed. Observes completion only; nothing is cancelled.
    pub async fn wait(&self) {
        self.wg.wait().await;
    }
}

impl Default for Spawner {
    fn default() -> Self {
        Self::new()
    }
}

/// Fire-and-forget spawn carrying the caller's data and trace.
pub fn go<F>(body: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let snapshot = registry::snapshot();
    let (_, trace) = registry::current_trace();
    tokio::spawn(TrackedTask::new(async move {
        adopt_inherited(snapshot, trace);
        body.await
    }))
}

/// Fire-and-forget spawn of `f(arg)`; `f` runs inside the new task.
pub fn go_with<A, F, Fut>(f: F, arg: A) -> JoinHandle<Fut::Output>
where
    A: Send + 'static,
    F: FnOnce(A) -> Fut + Send + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    go(async move { f(arg).await })
}

/// Runs in the child before its body: adopt the parent's data set (or clear
/// leftovers under a recycled identity) and inherit the parent trace.
fn adopt_inherited(snapshot: Option<LocalDataSet>, trace: String) {
    match snapshot {
        Some(set) => registry::restore(set),
        None => registry::clear(),
    }
    if !trace.is_empty() {
        registry::adopt_parent_trace(trace);
    }
}

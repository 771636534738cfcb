// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graceful-termination tracker.
//!
//! Stopped wrappers are parked here with a deadline; a 100 ms tick SIGKILLs
//! whatever is still alive past its deadline. Entries hold process identity
//! only, never the wrapper itself, so a reaped process cannot be
//! resurrected.

use gaffer_core::process::ProcessId;
use nix::sys::signal::Signal;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::signals::kill_os_pid;

/// Tick cadence for deadline checks.
pub const CHECK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    deadline: Instant,
    /// Insertion tiebreaker: equal deadlines pop in insertion order.
    seq: u64,
    pid: ProcessId,
}

#[derive(Default)]
struct TrackerState {
    heap: BinaryHeap<Reverse<Entry>>,
    /// pid → os_pid for entries not yet uncancelled by a natural exit.
    live: HashMap<ProcessId, u32>,
    seq: u64,
}

/// Shared tracker handle.
#[derive(Clone)]
pub struct GraceTracker {
    state: Arc<Mutex<TrackerState>>,
    drained: Arc<Notify>,
    cancel: CancellationToken,
}

impl GraceTracker {
    pub fn new() -> Self {
        let tracker = Self {
            state: Arc::new(Mutex::new(TrackerState::default())),
            drained: Arc::new(Notify::new()),
            cancel: CancellationToken::new(),
        };
        tokio::spawn(tick_loop(tracker.clone()));
        tracker
    }

    /// Track a stopped process; SIGKILL fires at `now + timeout` unless the
    /// process exits first.
    pub fn check(&self, pid: ProcessId, os_pid: u32, timeout: Duration) {
        let mut state = self.state.lock();
        state.seq += 1;
        let entry = Entry { deadline: Instant::now() + timeout, seq: state.seq, pid };
        state.heap.push(Reverse(entry));
        state.live.insert(pid, os_pid);
    }

    /// Forget a process that exited on its own.
    pub fn uncheck(&self, pid: ProcessId) {
        let mut state = self.state.lock();
        state.live.remove(&pid);
        if state.live.is_empty() {
            self.drained.notify_waiters();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().live.is_empty()
    }

    /// Wait until no tracked process remains.
    pub async fn drained(&self) {
        loop {
            let waiter = self.drained.notified();
            if self.is_empty() {
                return;
            }
            waiter.await;
        }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Pop expired entries and SIGKILL the ones still tracked.
    fn sweep(&self, now: Instant) {
        let mut expired = Vec::new();
        {
            let mut state = self.state.lock();
            while let Some(Reverse(entry)) = state.heap.peek() {
                if entry.deadline > now {
                    break;
                }
                let pid = entry.pid;
                state.heap.pop();
                if let Some(os_pid) = state.live.remove(&pid) {
                    expired.push((pid, os_pid));
                }
            }
            if state.live.is_empty() && !expired.is_empty() {
                self.drained.notify_waiters();
            }
        }
        for (pid, os_pid) in expired {
            debug!(%pid, os_pid, "graceful timeout elapsed, sending SIGKILL");
            kill_os_pid(os_pid, Signal::SIGKILL);
        }
    }
}

impl Default for GraceTracker {
    fn default() -> Self {
        Self::new()
    }
}

async fn tick_loop(tracker: GraceTracker) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = tracker.cancel.cancelled() => break,
            _ = interval.tick() => tracker.sweep(Instant::now()),
        }
    }
}

#[cfg(test)]
#[path = "grace_tests.rs"]
mod tests;

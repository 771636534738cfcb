// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reference-counted stat sampler for one OS child.
//!
//! The sampler task wakes every 100 ms while at least one listener is
//! subscribed and publishes `"stat"` events on the wrapper's emitter; the
//! last unsubscribe stops it.

use gaffer_core::emitter::{EventEmitter, Listener, SubscriptionId};
use gaffer_core::process::{ProcessId, ProcessStats};
use gaffer_core::session::JobName;
use parking_lot::Mutex;
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System, Users};
use tokio_util::sync::CancellationToken;

/// Sampling cadence; also the smallest interval that yields a meaningful
/// cpu percentage.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Stat topic on the wrapper's emitter.
pub const STAT_TOPIC: &str = "stat";

pub struct StatWatcher {
    os_pid: u32,
    emitter: EventEmitter,
    state: Mutex<WatcherState>,
}

#[derive(Default)]
struct WatcherState {
    refs: usize,
    cancel: Option<CancellationToken>,
}

impl StatWatcher {
    pub fn new(os_pid: u32, emitter: EventEmitter) -> Self {
        Self { os_pid, emitter, state: Mutex::new(WatcherState::default()) }
    }

    /// Add a listener; the sampler starts on the 0→1 transition.
    pub fn subscribe(&self, name: &JobName, pid: ProcessId, listener: Listener) -> SubscriptionId {
        let id = self.emitter.subscribe(STAT_TOPIC, listener);
        let mut state = self.state.lock();
        state.refs += 1;
        if state.refs == 1 {
            let cancel = CancellationToken::new();
            state.cancel = Some(cancel.clone());
            tokio::spawn(sample_loop(
                self.os_pid,
                name.to_string(),
                pid,
                self.emitter.clone(),
                cancel,
            ));
        }
        id
    }

    /// Remove a listener; the sampler stops on the 1→0 transition.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.emitter.unsubscribe(STAT_TOPIC, id);
        let mut state = self.state.lock();
        state.refs = state.refs.saturating_sub(1);
        if state.refs == 0 {
            if let Some(cancel) = state.cancel.take() {
                cancel.cancel();
            }
        }
    }

    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.refs = 0;
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }
    }
}

async fn sample_loop(
    os_pid: u32,
    name: String,
    pid: ProcessId,
    emitter: EventEmitter,
    cancel: CancellationToken,
) {
    let mut sys = System::new();
    let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let Some(stats) = sample(&mut sys, os_pid) else {
                    break;
                };
                let mut payload = match serde_json::to_value(&stats) {
                    Ok(payload) => payload,
                    Err(_) => break,
                };
                if let Some(map) = payload.as_object_mut() {
                    map.insert("event".into(), "stat".into());
                    map.insert("name".into(), name.clone().into());
                    map.insert("pid".into(), pid.0.into());
                }
                emitter.publish(STAT_TOPIC, payload);
            }
        }
    }
}

/// Refresh and snapshot one process tree. Returns `None` once the process
/// is gone.
pub fn sample(sys: &mut System, os_pid: u32) -> Option<ProcessStats> {
    sys.refresh_memory();
    sys.refresh_processes(ProcessesToUpdate::All, true);
    let users = Users::new_with_refreshed_list();
    build_stats(sys, &users, Pid::from_u32(os_pid))
}

/// One-shot snapshot for an unmonitored process: two refreshes spaced a
/// sampling interval apart so the cpu percentage is real.
pub async fn snapshot(os_pid: u32) -> Option<ProcessStats> {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(os_pid)]), true);
    tokio::time::sleep(SAMPLE_INTERVAL).await;
    sample(&mut sys, os_pid)
}

fn build_stats(sys: &System, users: &Users, pid: Pid) -> Option<ProcessStats> {
    let process = sys.process(pid)?;
    let total_memory = sys.total_memory().max(1);

    let username = process
        .user_id()
        .and_then(|uid| users.get_user_by_id(uid))
        .map(|user| user.name().to_string())
        .unwrap_or_else(|| "N/A".to_string());

    let cmdline = process
        .cmd()
        .first()
        .map(|arg| arg.to_string_lossy().into_owned())
        .unwrap_or_else(|| process.name().to_string_lossy().into_owned());

    let children = sys
        .processes()
        .iter()
        .filter(|(_, p)| p.parent() == Some(pid))
        .filter_map(|(child_pid, _)| build_stats(sys, users, *child_pid))
        .collect();

    Some(ProcessStats {
        cpu: process.cpu_usage(),
        mem: (process.memory() as f32 / total_memory as f32) * 100.0,
        mem_rss: process.memory(),
        mem_vms: process.virtual_memory(),
        ctime: format_ctime(process.accumulated_cpu_time()),
        os_pid: pid.as_u32(),
        username,
        nice: process_nice(pid.as_u32()),
        cmdline,
        children,
    })
}

/// Accumulated cpu time in `M:SS.cc` form.
fn format_ctime(cpu_ms: u64) -> String {
    let minutes = (cpu_ms / 60_000) % 60;
    let seconds = (cpu_ms / 1000) % 60;
    let centis = (cpu_ms % 1000) / 10;
    format!("{minutes}:{seconds:02}.{centis:02}")
}

/// Nice value from `/proc/<pid>/stat`; zero when unreadable.
#[cfg(target_os = "linux")]
fn process_nice(os_pid: u32) -> i32 {
    let raw = match std::fs::read_to_string(format!("/proc/{os_pid}/stat")) {
        Ok(raw) => raw,
        Err(_) => return 0,
    };
    // fields after the parenthesised comm; nice is overall field 19
    let Some(rest) = raw.rsplit_once(')').map(|(_, rest)| rest) else {
        return 0;
    };
    rest.split_whitespace()
        .nth(16)
        .and_then(|field| field.parse().ok())
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
fn process_nice(_os_pid: u32) -> i32 {
    0
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supervisor core.
//!
//! One `Manager` owns every session, job state and process wrapper. All
//! mutations run under a single state lock with no awaits inside, so the
//! supervisor behaves as a single logical writer; cross-task callers just
//! clone the handle. Lifecycle events go out through the emitter as a flat
//! name plus `job.<fq>.<event>` and `proc.<pid>.<event>` specializations.

mod grace;
mod reconcile;

pub use grace::GraceTracker;

use gaffer_core::clock::SystemClock;
use gaffer_core::config::JobConfig;
use gaffer_core::emitter::{EventEmitter, Listener, SubscriptionId};
use gaffer_core::error::ProcessError;
use gaffer_core::job::{JobState, ScaleOp};
use gaffer_core::process::{ProcessId, ProcessInfo, ProcessStats};
use gaffer_core::session::JobName;
use nix::sys::signal::Signal;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::app::App;
use crate::process::{watcher, ProcessHandle};

pub(crate) struct ManagerState {
    /// session → job name → state, iteration-ordered for stable listings.
    pub sessions: BTreeMap<String, BTreeMap<String, JobState>>,

    /// Every live wrapper exactly once, keyed by supervisor pid.
    pub running: HashMap<ProcessId, Arc<ProcessHandle>>,

    pub max_process_id: ProcessId,

    /// Set for the whole shutdown sequence; suppresses respawns.
    pub stopping: bool,

    /// Per-job generation counter; a pending flapping retry is only honored
    /// when its epoch still matches.
    pub flap_epochs: HashMap<String, u64>,
}

impl ManagerState {
    fn job(&self, name: &JobName) -> Result<&JobState, ProcessError> {
        self.sessions
            .get(name.session())
            .and_then(|session| session.get(name.name()))
            .ok_or_else(ProcessError::not_found)
    }

    fn job_mut(&mut self, name: &JobName) -> Result<&mut JobState, ProcessError> {
        self.sessions
            .get_mut(name.session())
            .and_then(|session| session.get_mut(name.name()))
            .ok_or_else(ProcessError::not_found)
    }

    fn handle(&self, pid: ProcessId) -> Result<Arc<ProcessHandle>, ProcessError> {
        self.running.get(&pid).cloned().ok_or_else(ProcessError::not_found)
    }

    fn bump_epoch(&mut self, name: &JobName) -> u64 {
        let epoch = self.flap_epochs.entry(name.to_string()).or_insert(0);
        *epoch += 1;
        *epoch
    }
}

struct ManagerInner {
    state: Mutex<ManagerState>,
    events: EventEmitter,
    tracker: GraceTracker,
    clock: SystemClock,
    apps: Mutex<Vec<Arc<dyn App>>>,
}

/// Cloneable supervisor handle.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl Manager {
    /// Build a manager on the current runtime.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                state: Mutex::new(ManagerState {
                    sessions: BTreeMap::new(),
                    running: HashMap::new(),
                    max_process_id: ProcessId(0),
                    stopping: false,
                    flap_epochs: HashMap::new(),
                }),
                events: EventEmitter::new(),
                tracker: GraceTracker::new(),
                clock: SystemClock,
                apps: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The manager-wide event emitter; the hub and the lookup client
    /// subscribe here.
    pub fn events(&self) -> &EventEmitter {
        &self.inner.events
    }

    pub(crate) fn tracker(&self) -> &GraceTracker {
        &self.inner.tracker
    }

    pub(crate) fn clock(&self) -> &SystemClock {
        &self.inner.clock
    }

    pub(crate) fn locked<T>(&self, f: impl FnOnce(&mut ManagerState) -> T) -> T {
        f(&mut self.inner.state.lock())
    }

    pub(crate) fn publish(&self, evtype: &str, mut fields: Value) {
        if let Some(map) = fields.as_object_mut() {
            map.insert("event".into(), evtype.into());
        }
        self.inner.events.publish(evtype, fields);
    }

    // ------------- lifecycle

    /// Register apps and start them in declaration order.
    pub async fn start(&self, apps: Vec<Arc<dyn App>>) -> Result<(), crate::env::SetupError> {
        for app in &apps {
            app.start(self.clone()).await?;
        }
        self.inner.apps.lock().extend(apps);
        info!("manager started");
        Ok(())
    }

    /// Stop every job, wait for the grace tracker to drain, then stop apps.
    pub async fn stop(&self) {
        info!("manager stopping");
        self.locked(|st| {
            st.stopping = true;
            let names: Vec<JobName> = st
                .sessions
                .iter()
                .flat_map(|(session, jobs)| {
                    jobs.keys().map(|name| JobName::new(session, name)).collect::<Vec<_>>()
                })
                .collect();
            for name in names {
                st.bump_epoch(&name);
                if let Ok(job) = st.job_mut(&name) {
                    job.stopped = true;
                }
                self.stopall_locked(st, &name);
            }
        });

        self.inner.tracker.drained().await;

        let apps: Vec<Arc<dyn App>> = self.inner.apps.lock().clone();
        for app in apps {
            app.stop().await;
        }
        self.inner.tracker.shutdown();
        self.inner.events.close();
        info!("manager stopped");
    }

    /// Restart hosted apps, then respawn every job from scratch.
    pub async fn restart(&self) {
        let apps: Vec<Arc<dyn App>> = self.inner.apps.lock().clone();
        for app in apps {
            app.restart().await;
        }

        self.locked(|st| {
            let mut names: Vec<(i32, JobName)> = st
                .sessions
                .iter()
                .flat_map(|(session, jobs)| {
                    jobs.iter()
                        .map(|(name, job)| {
                            (job.config().priority, JobName::new(session, name))
                        })
                        .collect::<Vec<_>>()
                })
                .collect();
            names.sort_by_key(|(priority, _)| *priority);
            for (_, name) in names {
                self.restart_processes_locked(st, &name);
            }
        });
    }

    // ------------- job config management

    /// Load a config into a session. 409 when the `(session, name)` pair is
    /// already taken.
    pub fn load(
        &self,
        config: JobConfig,
        sessionid: Option<&str>,
        env: Option<HashMap<String, String>>,
        start: bool,
    ) -> Result<JobName, ProcessError> {
        let session = sessionid.unwrap_or(gaffer_core::session::DEFAULT_SESSION);
        let name = JobName::new(session, &config.name);

        self.locked(|st| {
            let jobs = st.sessions.entry(session.to_string()).or_default();
            if jobs.contains_key(&config.name) {
                return Err(ProcessError::conflict());
            }
            let job_name = config.name.clone();
            jobs.insert(job_name, JobState::new(config, session, env));
            Ok(())
        })?;

        self.publish("load", json!({ "name": name.to_string() }));
        if start {
            self.start_job(&name)?;
        }
        Ok(name)
    }

    /// Unload a job: mark stopped, kill everything, drop it from the
    /// session. Empty sessions vanish with their last job.
    pub fn unload(&self, name: &JobName) -> Result<(), ProcessError> {
        self.locked(|st| {
            let session = st.sessions.get_mut(name.session()).ok_or_else(ProcessError::not_found)?;
            let mut job = session.remove(name.name()).ok_or_else(ProcessError::not_found)?;
            if session.is_empty() {
                st.sessions.remove(name.session());
            }

            self.publish("unload", json!({ "name": name.to_string() }));
            self.publish("stop", json!({ "name": name.to_string() }));
            self.publish(&format!("job.{name}.stop"), json!({ "name": name.to_string() }));

            job.stopped = true;
            st.bump_epoch(name);
            // job is already out of the map; stop its processes directly
            let pids = job.pids();
            self.stop_pids_locked(st, &pids, job.graceful_timeout());
            st.flap_epochs.remove(&name.to_string());
            Ok(())
        })
    }

    /// Reset numprocesses to the config value and bounce every process.
    pub fn reload(&self, name: &JobName) -> Result<(), ProcessError> {
        self.locked(|st| {
            st.job_mut(name)?.reset();
            self.stopall_locked(st, name);
            self.manage_processes_locked(st, name);
            Ok(())
        })
    }

    /// Replace a job's config and bounce every process; reconciliation
    /// respawns to the new count as the old children exit.
    pub fn update(
        &self,
        config: JobConfig,
        sessionid: Option<&str>,
        env: Option<HashMap<String, String>>,
        start: bool,
    ) -> Result<(), ProcessError> {
        let session = sessionid.unwrap_or(gaffer_core::session::DEFAULT_SESSION);
        let name = JobName::new(session, &config.name);
        self.locked(|st| {
            let job = st.job_mut(&name)?;
            job.update(config, env);
            if start {
                job.stopped = false;
            }
            self.stopall_locked(st, &name);
            Ok::<(), ProcessError>(())
        })?;
        self.publish("update", json!({ "name": name.to_string() }));
        Ok(())
    }

    pub fn get_config(&self, name: &JobName) -> Result<JobConfig, ProcessError> {
        self.locked(|st| st.job(name).map(|job| job.config().clone()))
    }

    // ------------- job commands

    /// Clear the stopped flag and reconcile up to the declared count.
    pub fn start_job(&self, name: &JobName) -> Result<(), ProcessError> {
        self.locked(|st| {
            st.bump_epoch(name);
            let job = st.job_mut(name)?;
            job.stopped = false;
            job.reset();
            self.publish("start", json!({ "name": name.to_string() }));
            self.publish(&format!("job.{name}.start"), json!({ "name": name.to_string() }));
            self.manage_processes_locked(st, name);
            Ok(())
        })
    }

    /// Stop a job; its processes are killed and never respawned until
    /// `start_job`.
    pub fn stop_job(&self, name: &JobName) -> Result<(), ProcessError> {
        self.locked(|st| {
            st.bump_epoch(name);
            let job = st.job_mut(name)?;
            job.scale(ScaleOp::Set(0));
            job.stopped = true;
            self.publish("stop", json!({ "name": name.to_string() }));
            self.publish(&format!("job.{name}.stop"), json!({ "name": name.to_string() }));
            self.stopall_locked(st, name);
            Ok(())
        })
    }

    /// Adjust the target pool size and reconcile. Returns the new target.
    pub fn scale(&self, name: &JobName, op: &str) -> Result<u32, ProcessError> {
        let op = ScaleOp::parse(op)?;
        self.locked(|st| {
            let job = st.job_mut(name)?;
            let target = job.scale(op);
            self.publish("update", json!({ "name": name.to_string() }));
            self.manage_processes_locked(st, name);
            Ok(target)
        })
    }

    /// Spawn one extra one-shot process outside the reconciled pool.
    pub fn commit(
        &self,
        name: &JobName,
        graceful_timeout: Option<f64>,
        env: Option<HashMap<String, String>>,
    ) -> Result<ProcessId, ProcessError> {
        self.locked(|st| self.commit_locked(st, name, graceful_timeout, env))
    }

    /// SIGTERM every process of a job; reconciliation respawns them unless
    /// the job is stopped.
    pub fn stopall(&self, name: &JobName) -> Result<(), ProcessError> {
        self.locked(|st| {
            st.job(name)?;
            self.stopall_locked(st, name);
            Ok(())
        })
    }

    /// Signal every process of a job, then reconcile.
    pub fn killall(&self, name: &JobName, sig: Signal) -> Result<(), ProcessError> {
        self.locked(|st| {
            let pids = st.job(name)?.pids();
            self.publish(
                &format!("job.{name}.kill"),
                json!({ "name": name.to_string(), "signum": sig as i32 }),
            );
            for pid in pids {
                if let Ok(handle) = st.handle(pid) {
                    self.publish(
                        &format!("proc.{pid}.kill"),
                        json!({ "pid": pid, "name": name.to_string() }),
                    );
                    handle.kill(sig);
                }
            }
            self.manage_processes_locked(st, name);
            Ok(())
        })
    }

    // ------------- process commands

    /// SIGTERM one process and arm the grace tracker for it.
    pub fn stop_process(&self, pid: ProcessId) -> Result<(), ProcessError> {
        self.locked(|st| {
            let handle = st.running.remove(&pid).ok_or_else(ProcessError::not_found)?;
            if let Ok(job) = st.job_mut(&handle.name.clone()) {
                job.remove(pid);
            }
            self.publish(
                "stop_process",
                json!({ "pid": pid, "name": handle.name.to_string() }),
            );
            handle.stop();
            self.inner.tracker.check(pid, handle.os_pid, handle.graceful_timeout);
            Ok(())
        })
    }

    /// Send a signal to one process.
    pub fn kill(&self, pid: ProcessId, sig: Signal) -> Result<(), ProcessError> {
        self.locked(|st| {
            let handle = st.handle(pid)?;
            self.publish(
                &format!("proc.{pid}.kill"),
                json!({ "pid": pid, "name": handle.name.to_string() }),
            );
            handle.kill(sig);
            Ok(())
        })
    }

    /// Write to a process stream: stdin by default, or a named custom
    /// stream.
    pub fn send(&self, pid: ProcessId, data: Vec<u8>, stream: Option<&str>) -> Result<(), ProcessError> {
        let handle = self.locked(|st| st.handle(pid))?;
        match stream {
            None | Some("stdin") => handle.write(data)?,
            Some(label) => handle.write_stream(label, data)?,
        }
        Ok(())
    }

    /// Attach a stat listener to every current process of a job. Returns
    /// the subscriptions needed to detach.
    pub fn monitor(
        &self,
        name: &JobName,
        listener: Listener,
    ) -> Result<Vec<(ProcessId, SubscriptionId)>, ProcessError> {
        self.locked(|st| {
            let pids: Vec<ProcessId> = st.job(name)?.running.iter().copied().collect();
            let mut subs = Vec::new();
            for pid in pids {
                if let Ok(handle) = st.handle(pid) {
                    subs.push((pid, handle.monitor(Arc::clone(&listener))));
                }
            }
            Ok(subs)
        })
    }

    pub fn unmonitor(&self, subs: &[(ProcessId, SubscriptionId)]) {
        self.locked(|st| {
            for (pid, id) in subs {
                if let Ok(handle) = st.handle(*pid) {
                    handle.unmonitor(*id);
                }
            }
        });
    }

    // ------------- queries

    pub fn sessions(&self) -> Vec<String> {
        self.locked(|st| st.sessions.keys().cloned().collect())
    }

    /// All fully-qualified job names, optionally restricted to a session.
    pub fn jobs(&self, sessionid: Option<&str>) -> Result<Vec<String>, ProcessError> {
        self.locked(|st| match sessionid {
            None => Ok(st
                .sessions
                .iter()
                .flat_map(|(session, jobs)| {
                    jobs.keys().map(|name| format!("{session}.{name}")).collect::<Vec<_>>()
                })
                .collect()),
            Some(sessionid) => {
                let session = st.sessions.get(sessionid).ok_or_else(ProcessError::not_found)?;
                Ok(session.keys().map(|name| format!("{sessionid}.{name}")).collect())
            }
        })
    }

    /// Live pids: all of them, or one job's (pool plus committed
    /// one-shots).
    pub fn pids(&self, name: Option<&JobName>) -> Result<Vec<ProcessId>, ProcessError> {
        self.locked(|st| match name {
            None => {
                let mut pids: Vec<ProcessId> = st.running.keys().copied().collect();
                pids.sort_unstable();
                Ok(pids)
            }
            Some(name) => Ok(st.job(name)?.pids()),
        })
    }

    pub fn job_info(&self, name: &JobName) -> Result<Value, ProcessError> {
        self.locked(|st| {
            let job = st.job(name)?;
            let pids = job.pids();
            Ok(json!({
                "name": name.to_string(),
                "active": job.active(),
                "running": pids.len(),
                "running_out": job.running_out.len(),
                "max_processes": job.numprocesses(),
                "processes": pids,
                "config": job.config(),
            }))
        })
    }

    /// Aggregate and per-process stats for one job.
    pub async fn job_stats(&self, name: &JobName) -> Result<Value, ProcessError> {
        let handles: Vec<Arc<ProcessHandle>> = self.locked(|st| {
            let job = st.job(name)?;
            Ok::<_, ProcessError>(
                job.pids().into_iter().filter_map(|pid| st.running.get(&pid).cloned()).collect(),
            )
        })?;

        let mut stats = Vec::new();
        for handle in handles {
            if let Some(mut snapshot) = watcher::snapshot(handle.os_pid).await {
                snapshot.os_pid = handle.os_pid;
                let mut entry = serde_json::to_value(&snapshot)
                    .map_err(|e| ProcessError::internal(e.to_string()))?;
                if let Some(map) = entry.as_object_mut() {
                    map.insert("pid".into(), json!(handle.pid));
                }
                stats.push((snapshot, entry));
            }
        }

        let mem: Vec<f32> = stats.iter().map(|(s, _)| s.mem).collect();
        let cpu: Vec<f32> = stats.iter().map(|(s, _)| s.cpu).collect();
        let fold = |values: &[f32]| -> Value {
            if values.is_empty() {
                return json!("N/A");
            }
            json!({
                "sum": values.iter().sum::<f32>(),
                "max": values.iter().cloned().fold(f32::MIN, f32::max),
                "min": values.iter().cloned().fold(f32::MAX, f32::min),
            })
        };

        Ok(json!({
            "name": name.to_string(),
            "stats": stats.into_iter().map(|(_, entry)| entry).collect::<Vec<_>>(),
            "mem": fold(&mem),
            "cpu": fold(&cpu),
        }))
    }

    pub fn process_info(&self, pid: ProcessId) -> Result<ProcessInfo, ProcessError> {
        self.locked(|st| st.handle(pid).map(|handle| handle.info()))
    }

    pub async fn process_stats(&self, pid: ProcessId) -> Result<ProcessStats, ProcessError> {
        let handle = self.locked(|st| st.handle(pid))?;
        watcher::snapshot(handle.os_pid).await.ok_or_else(ProcessError::not_found)
    }

    /// Fetch one live wrapper; used by the hub for stream and stat taps.
    pub fn get_process(&self, pid: ProcessId) -> Result<Arc<ProcessHandle>, ProcessError> {
        self.locked(|st| st.handle(pid))
    }

    // ------------- internals shared with reconcile.rs

    pub(crate) fn stop_pids_locked(
        &self,
        st: &mut ManagerState,
        pids: &[ProcessId],
        graceful_timeout: std::time::Duration,
    ) {
        for pid in pids {
            let Some(handle) = st.running.remove(pid) else {
                continue;
            };
            self.publish(
                "stop_process",
                json!({ "pid": pid, "name": handle.name.to_string() }),
            );
            handle.stop();
            let timeout = if handle.graceful_timeout.is_zero() {
                graceful_timeout
            } else {
                handle.graceful_timeout
            };
            self.inner.tracker.check(*pid, handle.os_pid, timeout);
        }
        debug!(count = pids.len(), "stopped process group");
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

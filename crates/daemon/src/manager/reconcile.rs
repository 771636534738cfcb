// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pool reconciliation: spawn-up, reap-down, flapping cool-down and the
//! process exit path.

use gaffer_core::error::ProcessError;
use gaffer_core::job::FlappingVerdict;
use gaffer_core::process::ProcessId;
use gaffer_core::session::JobName;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Manager, ManagerState};
use crate::process::ProcessHandle;

impl Manager {
    /// Drive `|running|` toward `numprocesses`: spawn the deficit, reap the
    /// surplus from the oldest end. No-op while the job is stopped.
    pub(crate) fn manage_processes_locked(&self, st: &mut ManagerState, name: &JobName) {
        loop {
            let deficit = {
                let Ok(job) = st.job(name) else { return };
                if job.stopped || st.stopping {
                    return;
                }
                job.numprocesses().saturating_sub(job.running.len() as u32)
            };
            if deficit == 0 {
                break;
            }
            if self.spawn_one_locked(st, name, false, None, None).is_err() {
                // Spawn failures already surfaced as exit events; let the
                // flapping decision (or the operator) drive the retry.
                break;
            }
        }

        self.reap_processes_locked(st, name);
    }

    fn reap_processes_locked(&self, st: &mut ManagerState, name: &JobName) {
        loop {
            let (pid, graceful_timeout) = {
                let Ok(job) = st.job_mut(name) else { return };
                if job.stopped || (job.running.len() as u32) <= job.numprocesses() {
                    return;
                }
                let Some(pid) = job.dequeue() else { return };
                (pid, job.graceful_timeout())
            };

            let Some(handle) = st.running.remove(&pid) else {
                continue;
            };
            handle.stop();
            self.tracker().check(pid, handle.os_pid, graceful_timeout);

            let fields = json!({
                "name": name.to_string(),
                "pid": pid,
                "os_pid": handle.os_pid,
            });
            self.publish("reap", fields.clone());
            self.publish(&format!("job.{name}.reap"), fields.clone());
            self.publish(&format!("proc.{pid}.reap"), fields);
        }
    }

    /// Spawn one pool process and queue it on the job.
    pub(crate) fn spawn_one_locked(
        &self,
        st: &mut ManagerState,
        name: &JobName,
        once: bool,
        graceful_override: Option<f64>,
        env_override: Option<HashMap<String, String>>,
    ) -> Result<ProcessId, ProcessError> {
        let (config, mut env, graceful_timeout) = {
            let job = st.job(name)?;
            (job.config().clone(), job.spawn_env(), job.graceful_timeout())
        };
        if let Some(extra) = env_override {
            env.extend(extra);
        }
        let graceful_timeout =
            graceful_override.map(Duration::from_secs_f64).unwrap_or(graceful_timeout);

        let pid = st.max_process_id.next();
        st.max_process_id = pid;

        match ProcessHandle::spawn(pid, name.clone(), &config, env, once, graceful_timeout) {
            Ok((handle, exit)) => {
                let os_pid = handle.os_pid;
                if once {
                    if let Ok(job) = st.job_mut(name) {
                        job.running_out.insert(pid);
                    }
                } else if let Ok(job) = st.job_mut(name) {
                    job.queue(pid);
                }
                st.running.insert(pid, Arc::clone(&handle));

                let manager = self.clone();
                let exited = Arc::clone(&handle);
                tokio::spawn(async move {
                    if let Ok((exit_status, term_signal)) = exit.await {
                        manager.handle_process_exit(exited, exit_status, term_signal);
                    }
                });

                let fields = json!({ "name": name.to_string(), "pid": pid, "os_pid": os_pid });
                self.publish("spawn", fields.clone());
                if !once {
                    self.publish(&format!("job.{name}.spawn"), fields);
                }
                Ok(pid)
            }
            Err(err) => {
                warn!(job = %name, "spawn failed: {err}");
                // Report the failure as an immediate exit so remote
                // subscribers and the flapping logic see it.
                let fields = json!({
                    "name": name.to_string(),
                    "pid": pid,
                    "os_pid": 0,
                    "exit_status": 127,
                    "term_signal": 0,
                    "once": once,
                });
                self.publish("exit", fields.clone());
                self.publish(&format!("job.{name}.exit"), fields);
                if !once {
                    self.flapping_check_locked(st, name);
                }
                Err(err)
            }
        }
    }

    /// Spawn a committed one-shot process and return its pid immediately.
    pub(crate) fn commit_locked(
        &self,
        st: &mut ManagerState,
        name: &JobName,
        graceful_timeout: Option<f64>,
        env: Option<HashMap<String, String>>,
    ) -> Result<ProcessId, ProcessError> {
        self.spawn_one_locked(st, name, true, graceful_timeout, env)
    }

    /// Kill the whole pool plus committed one-shots, arming the grace
    /// tracker for each. A pending flapping retry is invalidated when the
    /// job is stopped, so the sweep's own exits cannot count as flaps.
    pub(crate) fn stopall_locked(&self, st: &mut ManagerState, name: &JobName) {
        let (pids, graceful_timeout, stopped) = {
            let Ok(job) = st.job_mut(name) else { return };
            let pids = job.pids();
            job.running.clear();
            job.running_out.clear();
            (pids, job.graceful_timeout(), job.stopped)
        };
        if stopped {
            st.bump_epoch(name);
        }
        self.stop_pids_locked(st, &pids, graceful_timeout);
    }

    /// Spawn a full new generation, then reap the old one.
    pub(crate) fn restart_processes_locked(&self, st: &mut ManagerState, name: &JobName) {
        let target = match st.job(name) {
            Ok(job) => job.numprocesses(),
            Err(_) => return,
        };
        for _ in 0..target {
            if self.spawn_one_locked(st, name, false, None, None).is_err() {
                break;
            }
        }
        self.manage_processes_locked(st, name);
    }

    /// Exit path: runs for every OS exit, spawn-failure synthesized exits
    /// excepted.
    pub(crate) fn handle_process_exit(
        &self,
        handle: Arc<ProcessHandle>,
        exit_status: i32,
        term_signal: i32,
    ) {
        let pid = handle.pid;
        let name = handle.name.clone();

        self.locked(|st| {
            st.running.remove(&pid);
            if let Ok(job) = st.job_mut(&name) {
                job.remove(pid);
            }

            let fields = json!({
                "name": name.to_string(),
                "pid": pid,
                "exit_status": exit_status,
                "term_signal": term_signal,
                "os_pid": handle.os_pid,
                "once": handle.once,
            });
            self.publish("exit", fields.clone());
            self.publish(&format!("job.{name}.exit"), fields);

            if handle.once || st.stopping {
                return;
            }
            let stopped = match st.job(&name) {
                Ok(job) => job.stopped,
                Err(_) => return,
            };
            if stopped {
                return;
            }
            if self.flapping_check_locked(st, &name) {
                self.manage_processes_locked(st, &name);
            }
        });
        // uncheck last so shutdown's drain-wait only resolves after the
        // state cleanup above is visible
        self.tracker().uncheck(pid);
        debug!(%pid, exit_status, term_signal, job = %name, "process exited");
    }

    /// Returns true when reconciliation may continue; false when the job
    /// entered flapping cool-down.
    pub(crate) fn flapping_check_locked(&self, st: &mut ManagerState, name: &JobName) -> bool {
        let verdict = {
            let Ok(job) = st.job_mut(name) else { return false };
            job.check_flapping(self.clock())
        };
        match verdict {
            FlappingVerdict::Ok => true,
            FlappingVerdict::Retry(delay) => {
                self.publish("flap", json!({ "name": name.to_string() }));
                if let Ok(job) = st.job_mut(name) {
                    job.stopped = true;
                }
                self.stopall_locked(st, name);
                let epoch = st.bump_epoch(name);

                let manager = self.clone();
                let name = name.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    manager.flapping_retry(&name, epoch);
                });
                false
            }
            FlappingVerdict::GiveUp => {
                self.publish("flap", json!({ "name": name.to_string() }));
                if let Ok(job) = st.job_mut(name) {
                    job.stopped = true;
                }
                self.stopall_locked(st, name);
                st.bump_epoch(name);
                false
            }
        }
    }

    /// Cool-down elapsed: re-enable and restart unless something else
    /// touched the job in the meantime.
    fn flapping_retry(&self, name: &JobName, epoch: u64) {
        self.locked(|st| {
            if st.flap_epochs.get(&name.to_string()).copied() != Some(epoch) {
                return;
            }
            let Ok(job) = st.job_mut(name) else { return };
            job.stopped = false;
            self.restart_processes_locked(st, name);
        });
    }
}

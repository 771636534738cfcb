// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime twin of a job configuration.
//!
//! The manager owns one `JobState` per loaded `(session, name)` pair. The
//! state tracks the live pool by process id only; wrappers themselves are
//! owned by the manager's process table, which keeps the ownership graph
//! acyclic.

use crate::clock::Clock;
use crate::config::{FlappingPolicy, JobConfig};
use crate::error::ProcessError;
use crate::process::ProcessId;
use crate::session::JobName;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

/// A scaling operation parsed from forms like `"+2"`, `"-1"`, `"=3"`.
///
/// Bare digits mean increment, matching what remote clients have always
/// sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleOp {
    Set(u32),
    Add(u32),
    Sub(u32),
}

impl ScaleOp {
    pub fn parse(raw: &str) -> Result<Self, ProcessError> {
        let raw = raw.trim();
        let bad = || ProcessError::bad_request("bad_operation");
        if raw.is_empty() {
            return Err(bad());
        }
        if let Some(rest) = raw.strip_prefix('=') {
            return rest.parse().map(Self::Set).map_err(|_| bad());
        }
        if let Some(rest) = raw.strip_prefix('-') {
            return rest.parse().map(Self::Sub).map_err(|_| bad());
        }
        let rest = raw.strip_prefix('+').unwrap_or(raw);
        rest.parse().map(Self::Add).map_err(|_| bad())
    }
}

/// Outcome of a flapping check after a process exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlappingVerdict {
    /// Not flapping; reconcile as usual.
    Ok,
    /// Flapped but retries remain: stop everything, re-enable after the
    /// delay.
    Retry(Duration),
    /// Flapped with retries exhausted: stay stopped until an operator acts.
    GiveUp,
}

#[derive(Debug, Clone)]
struct FlappingState {
    policy: FlappingPolicy,
    history: VecDeque<Instant>,
    retries: usize,
}

impl FlappingState {
    fn new(policy: FlappingPolicy) -> Self {
        Self { policy, history: VecDeque::new(), retries: 0 }
    }

    fn reset(&mut self) {
        self.history.clear();
        self.retries = 0;
    }

    fn record_exit(&mut self, now: Instant) -> FlappingVerdict {
        if self.history.len() == self.policy.max_retry.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(now);

        if self.history.len() < self.policy.attempts {
            return FlappingVerdict::Ok;
        }

        let first = match self.history.front() {
            Some(first) => *first,
            None => return FlappingVerdict::Ok,
        };
        let burst = now.duration_since(first);
        if burst > self.policy.window() {
            // Exits spread out again; forget the burst.
            self.reset();
            FlappingVerdict::Ok
        } else if self.retries < self.policy.max_retry {
            // Keep the incremented counter and the ring so consecutive
            // bursts walk toward max_retry.
            self.retries += 1;
            FlappingVerdict::Retry(self.policy.retry_in())
        } else {
            self.reset();
            FlappingVerdict::GiveUp
        }
    }
}

/// Runtime state for one declared job.
#[derive(Debug, Clone)]
pub struct JobState {
    config: JobConfig,
    name: JobName,
    extra_env: HashMap<String, String>,

    /// Supervised pool, oldest first; reconciliation reaps from the front.
    pub running: VecDeque<ProcessId>,

    /// Committed one-shot processes, never restarted.
    pub running_out: HashSet<ProcessId>,

    /// A stopped job is never reconciled.
    pub stopped: bool,

    numprocesses: u32,
    flapping: Option<FlappingState>,
}

impl JobState {
    pub fn new(config: JobConfig, session: &str, env: Option<HashMap<String, String>>) -> Self {
        let name = JobName::new(session, &config.name);
        let numprocesses = config.numprocesses;
        let flapping = config.flapping.clone().map(FlappingState::new);
        Self {
            config,
            name,
            extra_env: env.unwrap_or_default(),
            running: VecDeque::new(),
            running_out: HashSet::new(),
            stopped: false,
            numprocesses,
            flapping,
        }
    }

    pub fn name(&self) -> &JobName {
        &self.name
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Config env merged with the env override given at load/update time.
    pub fn spawn_env(&self) -> HashMap<String, String> {
        let mut env = self.config.env.clone();
        env.extend(self.extra_env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    pub fn active(&self) -> bool {
        !self.running.is_empty() || !self.running_out.is_empty()
    }

    /// Current reconciliation target. Zero while stopped.
    pub fn numprocesses(&self) -> u32 {
        if self.stopped {
            0
        } else {
            self.numprocesses
        }
    }

    pub fn graceful_timeout(&self) -> Duration {
        self.config.graceful_timeout()
    }

    /// Adjust the target pool size, saturating at zero, and return it.
    pub fn scale(&mut self, op: ScaleOp) -> u32 {
        self.numprocesses = match op {
            ScaleOp::Set(n) => n,
            ScaleOp::Add(n) => self.numprocesses.saturating_add(n),
            ScaleOp::Sub(n) => self.numprocesses.saturating_sub(n),
        };
        self.numprocesses
    }

    /// Re-read the target from config and forget flapping history.
    pub fn reset(&mut self) {
        self.numprocesses = self.config.numprocesses;
        if let Some(flapping) = &mut self.flapping {
            flapping.reset();
        }
    }

    /// Replace the config. The new target is `max(new, current)` so an
    /// update can not silently shrink a manually scaled-up pool.
    pub fn update(&mut self, config: JobConfig, env: Option<HashMap<String, String>>) {
        self.numprocesses = config.numprocesses.max(self.numprocesses);
        self.flapping = config.flapping.clone().map(FlappingState::new);
        self.config = config;
        if let Some(env) = env {
            self.extra_env = env;
        }
    }

    pub fn queue(&mut self, pid: ProcessId) {
        self.running.push_back(pid);
    }

    /// Pop the oldest supervised process, if any.
    pub fn dequeue(&mut self) -> Option<ProcessId> {
        self.running.pop_front()
    }

    /// Drop a specific process from whichever collection holds it.
    pub fn remove(&mut self, pid: ProcessId) {
        if !self.running_out.remove(&pid) {
            self.running.retain(|p| *p != pid);
        }
    }

    pub fn contains(&self, pid: ProcessId) -> bool {
        self.running.contains(&pid) || self.running_out.contains(&pid)
    }

    /// All live process ids, supervised pool first.
    pub fn pids(&self) -> Vec<ProcessId> {
        let mut pids: Vec<ProcessId> = self.running.iter().copied().collect();
        let mut once: Vec<ProcessId> = self.running_out.iter().copied().collect();
        once.sort_unstable();
        pids.extend(once);
        pids
    }

    /// Record a non-commit exit and decide whether the job is flapping.
    pub fn check_flapping(&mut self, clock: &impl Clock) -> FlappingVerdict {
        match &mut self.flapping {
            Some(flapping) => flapping.record_exit(clock.now()),
            None => FlappingVerdict::Ok,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;

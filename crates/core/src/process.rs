// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process identity and stat snapshot shapes.

use crate::session::JobName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supervisor-assigned process id.
///
/// Monotonically increasing, never reused within one manager lifetime, and
/// distinct from the OS pid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ProcessId(pub u64);

impl ProcessId {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One sampled stat snapshot for a live child (and, recursively, its
/// descendants).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProcessStats {
    /// CPU usage in percent since the previous sample.
    pub cpu: f32,

    /// Resident memory as a percentage of total system memory.
    pub mem: f32,

    pub mem_rss: u64,
    pub mem_vms: u64,

    /// Accumulated CPU time formatted `M:SS.cc`.
    pub ctime: String,

    pub os_pid: u32,
    pub username: String,
    pub nice: i32,
    pub cmdline: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ProcessStats>,
}

/// Identity snapshot returned by process-info queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: ProcessId,
    pub os_pid: u32,
    pub name: JobName,
    pub cmd: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Set for one-shot processes spawned via `commit`.
    pub once: bool,

    /// True while the OS child is alive.
    pub active: bool,
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;

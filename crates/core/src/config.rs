// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative job configuration.
//!
//! A `JobConfig` is immutable once a process is spawned from it; the running
//! wrapper keeps its own snapshot so an `update` never mutates a live child.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

fn default_numprocesses() -> u32 {
    1
}

fn default_graceful_timeout() -> f64 {
    10.0
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Back-off policy applied when a job's processes exit in quick bursts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlappingPolicy {
    /// Number of exits inside `window` that count as a flap.
    #[serde(default = "FlappingPolicy::default_attempts")]
    pub attempts: usize,

    /// Window in seconds over which `attempts` exits flag a flap.
    #[serde(default = "FlappingPolicy::default_window")]
    pub window: f64,

    /// Cool-down in seconds before the job is retried.
    #[serde(default = "FlappingPolicy::default_retry_in")]
    pub retry_in: f64,

    /// Retries before the job is left stopped for good.
    #[serde(default = "FlappingPolicy::default_max_retry")]
    pub max_retry: usize,
}

impl FlappingPolicy {
    fn default_attempts() -> usize {
        2
    }

    fn default_window() -> f64 {
        1.0
    }

    fn default_retry_in() -> f64 {
        7.0
    }

    fn default_max_retry() -> usize {
        5
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs_f64(self.window)
    }

    pub fn retry_in(&self) -> Duration {
        Duration::from_secs_f64(self.retry_in)
    }
}

impl Default for FlappingPolicy {
    fn default() -> Self {
        Self {
            attempts: Self::default_attempts(),
            window: Self::default_window(),
            retry_in: Self::default_retry_in(),
            max_retry: Self::default_max_retry(),
        }
    }
}

/// Declaration of one job: the command to run and how many copies to keep
/// alive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    /// Job name inside its session.
    pub name: String,

    /// Program path, or a shell command line when `shell` is set.
    pub cmd: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    /// Detached children get their own process group and outlive the
    /// supervisor.
    #[serde(default, skip_serializing_if = "is_false")]
    pub detach: bool,

    /// Wrap `cmd` in a `sh -c` invocation.
    #[serde(default, skip_serializing_if = "is_false")]
    pub shell: bool,

    /// Target pool size; reconciliation drives the live count to this.
    #[serde(default = "default_numprocesses")]
    pub numprocesses: u32,

    /// Labels for the child's stdout and stderr, in order. Empty means both
    /// are discarded; one label captures stdout only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_output: Vec<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub redirect_input: bool,

    /// Extra named full-duplex pipes handed to the child on fds 3, 4, …
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_streams: Vec<String>,

    /// Seconds between SIGTERM and the fallback SIGKILL.
    #[serde(default = "default_graceful_timeout")]
    pub graceful_timeout: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flapping: Option<FlappingPolicy>,

    /// Jobs start in ascending priority order on restart.
    #[serde(default)]
    pub priority: i32,
}

impl JobConfig {
    pub fn builder(name: impl Into<String>, cmd: impl Into<String>) -> JobConfigBuilder {
        JobConfigBuilder::new(name, cmd)
    }

    pub fn graceful_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.graceful_timeout)
    }

    /// The label bytes read from stdout go out under, if redirected.
    pub fn stdout_label(&self) -> Option<&str> {
        self.redirect_output.first().map(String::as_str)
    }

    /// The label for stderr, if a second redirection label was given.
    pub fn stderr_label(&self) -> Option<&str> {
        self.redirect_output.get(1).map(String::as_str)
    }

    pub fn has_output_label(&self, label: &str) -> bool {
        self.redirect_output.iter().any(|l| l == label)
    }

    pub fn has_custom_stream(&self, label: &str) -> bool {
        self.custom_streams.iter().any(|l| l == label)
    }
}

/// Builder used by tests and by callers assembling configs in code.
#[derive(Debug, Clone)]
pub struct JobConfigBuilder {
    config: JobConfig,
}

impl JobConfigBuilder {
    pub fn new(name: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            config: JobConfig {
                name: name.into(),
                cmd: cmd.into(),
                args: Vec::new(),
                env: HashMap::new(),
                uid: None,
                gid: None,
                cwd: None,
                detach: false,
                shell: false,
                numprocesses: default_numprocesses(),
                redirect_output: Vec::new(),
                redirect_input: false,
                custom_streams: Vec::new(),
                graceful_timeout: default_graceful_timeout(),
                flapping: None,
                priority: 0,
            },
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.env.insert(key.into(), value.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.config.cwd = Some(cwd.into());
        self
    }

    pub fn shell(mut self, shell: bool) -> Self {
        self.config.shell = shell;
        self
    }

    pub fn detach(mut self, detach: bool) -> Self {
        self.config.detach = detach;
        self
    }

    pub fn numprocesses(mut self, n: u32) -> Self {
        self.config.numprocesses = n;
        self
    }

    pub fn redirect_output(mut self, labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.redirect_output = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn redirect_input(mut self, redirect: bool) -> Self {
        self.config.redirect_input = redirect;
        self
    }

    pub fn custom_streams(mut self, labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.custom_streams = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn graceful_timeout(mut self, seconds: f64) -> Self {
        self.config.graceful_timeout = seconds;
        self
    }

    pub fn flapping(mut self, policy: FlappingPolicy) -> Self {
        self.config.flapping = Some(policy);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.config.priority = priority;
        self
    }

    pub fn build(self) -> JobConfig {
        self.config
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One supervised OS child: spawn, signal, stream plumbing, exit tracking.
//!
//! Output bytes are framed as `{event, name, pid, data}` messages on the
//! wrapper's local emitter under the stream label, so stream taps and the
//! topic hub share one subscription surface. `data` carries the raw chunk
//! base64-encoded: streams are arbitrary bytes and must survive the JSON
//! hop untouched. Custom streams ride on child descriptors 3, 4, … in
//! declaration order.

pub mod watcher;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use gaffer_core::config::JobConfig;
use gaffer_core::emitter::{EventEmitter, Listener, SubscriptionId};
use gaffer_core::error::{ProcessError, StreamError};
use gaffer_core::process::{ProcessId, ProcessInfo};
use gaffer_core::session::JobName;
use nix::sys::signal::Signal;
use serde_json::json;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::signals::kill_os_pid;
use watcher::StatWatcher;

/// Encode a stream chunk for the `data` field of a framed message.
pub fn encode_stream_data(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Recover the raw bytes from a framed message's `data` field. Invalid
/// input decodes to empty rather than corrupted output.
pub fn decode_stream_data(data: &str) -> Vec<u8> {
    BASE64.decode(data).unwrap_or_default()
}

/// Exit details reported to the manager: `(exit_status, term_signal)`.
pub type ExitDetails = (i32, i32);

/// Receiver resolved exactly once when the OS child exits.
pub type ExitWatch = oneshot::Receiver<ExitDetails>;

/// A live supervised child.
pub struct ProcessHandle {
    pub pid: ProcessId,
    pub name: JobName,
    pub config: JobConfig,
    pub os_pid: u32,
    /// One-shot commit process, never restarted.
    pub once: bool,
    /// SIGTERM → SIGKILL window for this wrapper.
    pub graceful_timeout: Duration,

    emitter: EventEmitter,
    stdin_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    stream_tx: HashMap<String, mpsc::UnboundedSender<Vec<u8>>>,
    alive: AtomicBool,
    cancel: CancellationToken,
    watcher: StatWatcher,
}

impl ProcessHandle {
    /// Fork/exec a child for `config` and wire up its streams.
    ///
    /// Returns the shared handle and a watch resolved on OS exit. The
    /// caller decides what exit means (restart, flapping, nothing).
    pub fn spawn(
        pid: ProcessId,
        name: JobName,
        config: &JobConfig,
        env: HashMap<String, String>,
        once: bool,
        graceful_timeout: Duration,
    ) -> Result<(Arc<Self>, ExitWatch), ProcessError> {
        let mut cmd = if config.shell {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(&config.cmd).args(&config.args);
            cmd
        } else {
            let mut cmd = Command::new(&config.cmd);
            cmd.args(&config.args);
            cmd
        };

        cmd.envs(env);
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }
        if let Some(uid) = config.uid {
            cmd.uid(uid);
        }
        if let Some(gid) = config.gid {
            cmd.gid(gid);
        }
        if config.detach {
            // own process group; survives supervisor shutdown
            cmd.process_group(0);
        }

        cmd.stdin(if config.redirect_input { Stdio::piped() } else { Stdio::null() });
        cmd.stdout(if config.stdout_label().is_some() { Stdio::piped() } else { Stdio::null() });
        cmd.stderr(if config.stderr_label().is_some() { Stdio::piped() } else { Stdio::null() });
        cmd.kill_on_drop(false);

        // Custom streams: socketpairs handed to the child on fds 3, 4, …
        let mut parent_ends = Vec::new();
        let mut child_ends = Vec::new();
        for label in &config.custom_streams {
            let (parent, child) = std::os::unix::net::UnixStream::pair()
                .map_err(|e| ProcessError::internal(format!("socketpair: {e}")))?;
            parent
                .set_nonblocking(true)
                .map_err(|e| ProcessError::internal(format!("socketpair: {e}")))?;
            parent_ends.push((label.clone(), parent));
            child_ends.push(child);
        }
        if !child_ends.is_empty() {
            wire_child_fds(&mut cmd, &child_ends);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ProcessError::internal(format!("spawn {}: {e}", config.cmd)))?;
        // child copies exist now; parent-side duplicates of the child ends
        // close when this vec drops
        drop(child_ends);

        let os_pid = child
            .id()
            .ok_or_else(|| ProcessError::internal("child exited before it was tracked"))?;

        let emitter = EventEmitter::new();
        let cancel = CancellationToken::new();
        let mut readers = Vec::new();

        // Output readers; they run to EOF so the last bytes of a dying
        // child are not lost
        if let (Some(stdout), Some(label)) = (child.stdout.take(), config.stdout_label()) {
            readers.push(spawn_reader(stdout, label.to_string(), &name, pid, &emitter));
        }
        if let (Some(stderr), Some(label)) = (child.stderr.take(), config.stderr_label()) {
            readers.push(spawn_reader(stderr, label.to_string(), &name, pid, &emitter));
        }

        // Stdin writer
        let stdin_tx = child.stdin.take().map(|stdin| spawn_writer(stdin, &cancel));

        // Custom stream readers and writers
        let mut stream_tx = HashMap::new();
        for (label, parent) in parent_ends {
            let stream = tokio::net::UnixStream::from_std(parent)
                .map_err(|e| ProcessError::internal(format!("socketpair: {e}")))?;
            let (read_half, write_half) = stream.into_split();
            readers.push(spawn_reader(read_half, label.clone(), &name, pid, &emitter));
            stream_tx.insert(label, spawn_writer(write_half, &cancel));
        }

        let handle = Arc::new(Self {
            pid,
            name,
            config: config.clone(),
            os_pid,
            once,
            graceful_timeout,
            emitter: emitter.clone(),
            stdin_tx,
            stream_tx,
            alive: AtomicBool::new(true),
            cancel: cancel.clone(),
            watcher: StatWatcher::new(os_pid, emitter),
        });

        // Exit watch: resolve once, after the readers drained their pipes.
        let (exit_tx, exit_rx) = oneshot::channel();
        let watched = Arc::clone(&handle);
        tokio::spawn(async move {
            let details = match child.wait().await {
                Ok(status) => exit_details(status),
                Err(e) => {
                    warn!(pid = %watched.pid, "wait failed: {e}");
                    (255, 0)
                }
            };
            watched.alive.store(false, Ordering::SeqCst);
            // readers hit EOF once the child is gone; the timeout covers
            // grandchildren that inherited the pipes
            let _ = tokio::time::timeout(
                Duration::from_secs(1),
                futures_util::future::join_all(readers),
            )
            .await;
            watched.shutdown_io();
            let _ = exit_tx.send(details);
        });

        debug!(pid = %handle.pid, os_pid, job = %handle.name, "spawned");
        Ok((handle, exit_rx))
    }

    pub fn active(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Send SIGTERM; the caller is responsible for grace tracking.
    pub fn stop(&self) {
        self.kill(Signal::SIGTERM);
    }

    pub fn kill(&self, sig: Signal) {
        if self.active() {
            kill_os_pid(self.os_pid, sig);
        }
    }

    /// Queue bytes for the child's stdin in arrival order.
    pub fn write(&self, data: Vec<u8>) -> Result<(), StreamError> {
        let tx = self.stdin_tx.as_ref().ok_or(StreamError::NotWritable)?;
        tx.send(data).map_err(|_| StreamError::NotWritable)
    }

    pub fn writelines(&self, lines: Vec<Vec<u8>>) -> Result<(), StreamError> {
        for line in lines {
            self.write(line)?;
        }
        Ok(())
    }

    /// Write to a named custom stream.
    pub fn write_stream(&self, label: &str, data: Vec<u8>) -> Result<(), StreamError> {
        let tx = self.stream_tx.get(label).ok_or(StreamError::StreamNotFound)?;
        tx.send(data).map_err(|_| StreamError::NotWritable)
    }

    /// Subscribe to framed output messages for one readable stream label.
    pub fn monitor_io(&self, label: &str, listener: Listener) -> Result<SubscriptionId, StreamError> {
        if !self.config.has_output_label(label) && !self.config.has_custom_stream(label) {
            return Err(StreamError::StreamNotFound);
        }
        Ok(self.emitter.subscribe(label, listener))
    }

    pub fn unmonitor_io(&self, label: &str, id: SubscriptionId) {
        self.emitter.unsubscribe(label, id);
    }

    /// Subscribe to 100 ms stat samples; the sampler runs while anyone
    /// listens.
    pub fn monitor(&self, listener: Listener) -> SubscriptionId {
        self.watcher.subscribe(&self.name, self.pid, listener)
    }

    pub fn unmonitor(&self, id: SubscriptionId) {
        self.watcher.unsubscribe(id);
    }

    /// Identity snapshot for info queries.
    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            pid: self.pid,
            os_pid: self.os_pid,
            name: self.name.clone(),
            cmd: self.config.cmd.clone(),
            args: self.config.args.clone(),
            once: self.once,
            active: self.active(),
        }
    }

    /// Stop writer and sampler tasks. Called once the OS child is gone.
    ///
    /// The emitter is left open so already-published stream events still
    /// drain to subscribers; it dies with the handle.
    pub fn shutdown_io(&self) {
        self.cancel.cancel();
        self.watcher.shutdown();
    }
}

fn exit_details(status: std::process::ExitStatus) -> ExitDetails {
    use std::os::unix::process::ExitStatusExt;
    (status.code().unwrap_or(0), status.signal().unwrap_or(0))
}

/// Route the child ends of custom-stream socketpairs onto fds 3, 4, …
///
/// `dup2` into a fixed descriptor clears `FD_CLOEXEC` on the copy, which is
/// exactly what lets the child inherit the stream across exec.
#[allow(unsafe_code)]
fn wire_child_fds(cmd: &mut Command, child_ends: &[std::os::unix::net::UnixStream]) {
    use std::os::fd::AsRawFd;
    let fds: Vec<i32> = child_ends.iter().map(|s| s.as_raw_fd()).collect();
    // SAFETY: only async-signal-safe dup2 calls run between fork and exec.
    unsafe {
        cmd.pre_exec(move || {
            for (idx, fd) in fds.iter().enumerate() {
                let target = 3 + idx as i32;
                if *fd != target && nix::libc::dup2(*fd, target) < 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            Ok(())
        });
    }
}

fn spawn_reader(
    mut source: impl AsyncRead + Unpin + Send + 'static,
    label: String,
    name: &JobName,
    pid: ProcessId,
    emitter: &EventEmitter,
) -> tokio::task::JoinHandle<()> {
    let name = name.to_string();
    let emitter = emitter.clone();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        loop {
            match source.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    emitter.publish(
                        label.clone(),
                        json!({
                            "event": label,
                            "name": name,
                            "pid": pid,
                            "data": encode_stream_data(&buf[..n]),
                        }),
                    );
                }
            }
        }
    })
}

fn spawn_writer(
    mut sink: impl AsyncWrite + Unpin + Send + 'static,
    cancel: &CancellationToken,
) -> mpsc::UnboundedSender<Vec<u8>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                data = rx.recv() => match data {
                    None => break,
                    Some(data) => {
                        if sink.write_all(&data).await.is_err() {
                            break;
                        }
                        let _ = sink.flush().await;
                    }
                },
            }
        }
    });
    tx
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment and filesystem resolution for the daemon.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while preparing the daemon's environment.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("could not determine a config directory")]
    NoConfigDir,

    #[error("failed to lock pidfile at {0}: is gafferd already running?")]
    PidfileLocked(PathBuf),

    #[error("failed to bind {0}: {1}")]
    BindFailed(String, std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolve the config directory: `--config` flag > `GAFFERD_CONFIG` >
/// `/etc/gaffer` for root > `~/.gaffer`.
pub fn config_dir(flag: Option<PathBuf>) -> Result<PathBuf, SetupError> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    if let Ok(dir) = std::env::var("GAFFERD_CONFIG") {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    if nix::unistd::geteuid().is_root() {
        return Ok(PathBuf::from("/etc/gaffer"));
    }
    dirs::home_dir()
        .map(|home| home.join(".gaffer"))
        .ok_or(SetupError::NoConfigDir)
}

/// Log filter, from `GAFFER_LOG` (default `info`).
pub fn log_filter() -> String {
    std::env::var("GAFFER_LOG").unwrap_or_else(|_| "info".to_string())
}

/// HTTP bind address, from `GAFFERD_BIND` when the flag is absent.
pub fn default_bind() -> String {
    std::env::var("GAFFERD_BIND").unwrap_or_else(|_| "0.0.0.0:5000".to_string())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal-name parsing and delivery.

use gaffer_core::error::ProcessError;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

/// Parse a signal given by name or number.
///
/// Names are case-insensitive and the `SIG` prefix is optional, so `"hup"`,
/// `"HUP"`, `"SIGHUP"` and `"1"` all resolve to SIGHUP.
pub fn parse_signal(raw: &str) -> Result<Signal, ProcessError> {
    let raw = raw.trim();
    let bad = || ProcessError::bad_request("signal_not_supported");

    if raw.is_empty() {
        return Err(bad());
    }
    if raw.bytes().all(|b| b.is_ascii_digit()) {
        let num: i32 = raw.parse().map_err(|_| bad())?;
        return Signal::try_from(num).map_err(|_| bad());
    }

    let mut name = raw.to_ascii_uppercase();
    if !name.starts_with("SIG") {
        name = format!("SIG{name}");
    }
    name.parse().map_err(|_| bad())
}

/// Parse a signal from a JSON value, which clients send as either a name
/// string or a raw number.
pub fn parse_signal_value(value: &serde_json::Value) -> Result<Signal, ProcessError> {
    match value {
        serde_json::Value::String(name) => parse_signal(name),
        serde_json::Value::Number(num) => {
            let num = num
                .as_i64()
                .ok_or_else(|| ProcessError::bad_request("signal_not_supported"))?;
            Signal::try_from(num as i32)
                .map_err(|_| ProcessError::bad_request("signal_not_supported"))
        }
        _ => Err(ProcessError::bad_request("signal_not_supported")),
    }
}

/// Send a signal to one OS process.
pub fn kill_os_pid(os_pid: u32, sig: Signal) {
    let _ = signal::kill(Pid::from_raw(os_pid as i32), sig);
}

#[cfg(test)]
#[path = "signals_tests.rs"]
mod tests;

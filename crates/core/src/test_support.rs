// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builders and helpers shared by other crates' tests.

use crate::config::{FlappingPolicy, JobConfig};
use crate::emitter::Listener;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A short-lived shell job used across daemon and spec tests.
pub fn sleeper_config(name: &str, numprocesses: u32) -> JobConfig {
    JobConfig::builder(name, "sleep 60")
        .shell(true)
        .numprocesses(numprocesses)
        .graceful_timeout(1.0)
        .build()
}

/// A job whose processes exit immediately, for flapping scenarios.
pub fn crasher_config(name: &str, policy: FlappingPolicy) -> JobConfig {
    JobConfig::builder(name, "true")
        .shell(true)
        .numprocesses(1)
        .graceful_timeout(0.5)
        .flapping(policy)
        .build()
}

/// Listener that forwards every `(topic, payload)` pair into a channel.
pub fn channel_listener() -> (Listener, mpsc::UnboundedReceiver<(String, Value)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener: Listener = Arc::new(move |topic: &str, payload: &Value| {
        let _ = tx.send((topic.to_string(), payload.clone()));
        Ok(())
    });
    (listener, rx)
}

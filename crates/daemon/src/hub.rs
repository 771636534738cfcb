// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Topic hub: ref-counted fan-out of manager events, stats and stream data
//! to remote channels.
//!
//! Each distinct topic holds one underlying monitor. The first subscriber
//! activates it, the last one deactivates it, and a connection that dies
//! mid-subscription decrements each of its topics exactly once. Delivery
//! uses a bounded broadcast ring, so slow subscribers lose the oldest
//! events rather than stalling the supervisor.

use gaffer_core::emitter::{Listener, SubscriptionId};
use gaffer_core::error::TopicError;
use gaffer_core::process::ProcessId;
use gaffer_core::session::JobName;
use gaffer_core::topic::Topic;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::manager::Manager;

/// Event ring kept per topic for remote fan-out.
pub const CHANNEL_CAPACITY: usize = 200;

/// `(canonical topic, payload)` pairs delivered to channel subscribers.
pub type ChannelEvent = (String, Value);

/// Capability checks consulted before a topic activates.
///
/// The authentication database itself is an external collaborator; the hub
/// only asks these three questions.
pub trait Authorizer: Send + Sync {
    fn can_read(&self, job: &JobName) -> bool;
    fn can_manage(&self, job: &JobName) -> bool;
    fn can_manage_all(&self) -> bool;
}

/// Default authorizer: every capability granted.
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn can_read(&self, _job: &JobName) -> bool {
        true
    }

    fn can_manage(&self, _job: &JobName) -> bool {
        true
    }

    fn can_manage_all(&self) -> bool {
        true
    }
}

enum Activation {
    Emitter { topic: String, id: SubscriptionId },
    ProcessStats { pid: ProcessId, id: SubscriptionId },
    JobStats { subs: Vec<(ProcessId, SubscriptionId)> },
    Stream { pid: ProcessId, label: String, id: SubscriptionId },
}

struct TopicEntry {
    refs: usize,
    tx: broadcast::Sender<ChannelEvent>,
    activation: Activation,
}

pub struct Hub {
    manager: Manager,
    authorizer: Arc<dyn Authorizer>,
    topics: Mutex<HashMap<String, TopicEntry>>,
}

fn forbidden() -> TopicError {
    TopicError::forbidden()
}

impl Hub {
    pub fn new(manager: Manager, authorizer: Arc<dyn Authorizer>) -> Arc<Self> {
        Arc::new(Self { manager, authorizer, topics: Mutex::new(HashMap::new()) })
    }

    /// Subscribe one remote channel to a topic, activating the underlying
    /// monitor on the 0→1 transition.
    pub fn subscribe(&self, raw: &str) -> Result<broadcast::Receiver<ChannelEvent>, TopicError> {
        let topic = Topic::parse(raw)?;
        let key = topic.to_string();

        // fast path: the topic is already live
        {
            let mut topics = self.topics.lock();
            if let Some(entry) = topics.get_mut(&key) {
                entry.refs += 1;
                return Ok(entry.tx.subscribe());
            }
        }

        let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
        let listener = forwarding_listener(key.clone(), tx.clone());
        let activation = self.activate(&topic, listener)?;

        let mut topics = self.topics.lock();
        match topics.get_mut(&key) {
            Some(entry) => {
                // another channel raced us; keep its activation
                self.deactivate(activation);
                entry.refs += 1;
                Ok(entry.tx.subscribe())
            }
            None => {
                debug!(topic = %key, "topic activated");
                topics.insert(key, TopicEntry { refs: 1, tx, activation });
                Ok(rx)
            }
        }
    }

    /// Drop one subscription; the monitor stops on the 1→0 transition.
    pub fn unsubscribe(&self, raw: &str) {
        let Ok(topic) = Topic::parse(raw) else {
            return;
        };
        let key = topic.to_string();
        let entry = {
            let mut topics = self.topics.lock();
            let Some(entry) = topics.get_mut(&key) else {
                return;
            };
            entry.refs -= 1;
            if entry.refs > 0 {
                return;
            }
            topics.remove(&key)
        };
        if let Some(entry) = entry {
            debug!(topic = %key, "topic deactivated");
            self.deactivate(entry.activation);
        }
    }

    fn activate(&self, topic: &Topic, listener: Listener) -> Result<Activation, TopicError> {
        match topic {
            Topic::Events { prefix } => {
                if !self.authorizer.can_manage_all() {
                    return Err(forbidden());
                }
                let id = self.manager.events().subscribe(prefix.clone(), listener);
                Ok(Activation::Emitter { topic: prefix.clone(), id })
            }
            Topic::Job { name } => {
                if !self.authorizer.can_manage(name) {
                    return Err(forbidden());
                }
                let topic = format!("job.{name}");
                let id = self.manager.events().subscribe(topic.clone(), listener);
                Ok(Activation::Emitter { topic, id })
            }
            Topic::Process { pid } => {
                let handle = self.manager.get_process(*pid)?;
                if !self.authorizer.can_manage(&handle.name) {
                    return Err(forbidden());
                }
                let topic = format!("proc.{pid}");
                let id = self.manager.events().subscribe(topic.clone(), listener);
                Ok(Activation::Emitter { topic, id })
            }
            Topic::ProcessStats { pid } => {
                let handle = self.manager.get_process(*pid)?;
                if !self.authorizer.can_read(&handle.name) {
                    return Err(forbidden());
                }
                let id = handle.monitor(listener);
                Ok(Activation::ProcessStats { pid: *pid, id })
            }
            Topic::JobStats { name } => {
                if !self.authorizer.can_read(name) {
                    return Err(forbidden());
                }
                let subs = self.manager.monitor(name, listener)?;
                Ok(Activation::JobStats { subs })
            }
            Topic::Stream { pid, label } => {
                let handle = self.manager.get_process(*pid)?;
                if !self.authorizer.can_read(&handle.name) {
                    return Err(forbidden());
                }
                let label = match label {
                    Some(label) => label.clone(),
                    None => handle
                        .config
                        .stdout_label()
                        .map(str::to_string)
                        .ok_or(TopicError { errno: 404, reason: "stream_not_found".into() })?,
                };
                let id = handle
                    .monitor_io(&label, listener)
                    .map_err(|e| TopicError { errno: 404, reason: e.to_string() })?;
                Ok(Activation::Stream { pid: *pid, label, id })
            }
        }
    }

    fn deactivate(&self, activation: Activation) {
        match activation {
            Activation::Emitter { topic, id } => {
                self.manager.events().unsubscribe(&topic, id);
            }
            Activation::ProcessStats { pid, id } => {
                if let Ok(handle) = self.manager.get_process(pid) {
                    handle.unmonitor(id);
                }
            }
            Activation::JobStats { subs } => {
                self.manager.unmonitor(&subs);
            }
            Activation::Stream { pid, label, id } => {
                if let Ok(handle) = self.manager.get_process(pid) {
                    handle.unmonitor_io(&label, id);
                }
            }
        }
    }

    /// Live ref-count for one topic, for tests and introspection.
    pub fn refs(&self, raw: &str) -> usize {
        let Ok(topic) = Topic::parse(raw) else {
            return 0;
        };
        self.topics.lock().get(&topic.to_string()).map_or(0, |entry| entry.refs)
    }
}

fn forwarding_listener(key: String, tx: broadcast::Sender<ChannelEvent>) -> Listener {
    Arc::new(move |_topic: &str, payload: &Value| {
        let _ = tx.send((key.clone(), payload.clone()));
        Ok(())
    })
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;

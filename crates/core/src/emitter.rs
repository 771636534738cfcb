// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Asynchronous pub/sub dispatcher with dotted-hierarchy topics.
//!
//! Publication never blocks: events land in a bounded pending queue (oldest
//! dropped on overflow) and a dedicated drain task invokes listeners, so
//! publishers and listeners never share a stack. Publishing `"a.b.c"`
//! delivers, in order, to subscribers of `"a"`, `"a.b"`, `"a.b.c"` and then
//! to the `"."` wildcard.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

/// Pending events kept per emitter before the drain task catches up.
pub const PENDING_CAPACITY: usize = 200;

/// Wildcard topic receiving every publication.
pub const WILDCARD: &str = ".";

/// Returned by a listener to ask for its own removal; also the fate of
/// listeners whose callback fails. The publisher never sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerError;

/// Listener callbacks receive the concrete published topic and its payload.
pub type Listener = Arc<dyn Fn(&str, &Value) -> Result<(), ListenerError> + Send + Sync>;

/// Identity handle for one subscription; closures are not comparable, so
/// unsubscribing takes the id `subscribe` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    once: bool,
    listener: Listener,
}

#[derive(Default)]
struct Inner {
    subscriptions: HashMap<String, Vec<Subscription>>,
    pending: VecDeque<(String, Value)>,
    next_id: u64,
    closed: bool,
}

/// Ordered asynchronous fan-out of named events.
#[derive(Clone)]
pub struct EventEmitter {
    inner: Arc<Mutex<Inner>>,
    wake: Arc<Notify>,
}

impl EventEmitter {
    /// Create the emitter and spawn its drain task on the current runtime.
    pub fn new() -> Self {
        let inner = Arc::new(Mutex::new(Inner::default()));
        let wake = Arc::new(Notify::new());
        tokio::spawn(drain_loop(Arc::downgrade(&inner), Arc::clone(&wake)));
        Self { inner, wake }
    }

    /// Register a listener for `topic`. `"."` subscribes to everything.
    pub fn subscribe(
        &self,
        topic: impl Into<String>,
        listener: Listener,
    ) -> SubscriptionId {
        self.register(topic.into(), listener, false)
    }

    /// Register a listener removed after its first delivery.
    pub fn subscribe_once(
        &self,
        topic: impl Into<String>,
        listener: Listener,
    ) -> SubscriptionId {
        self.register(topic.into(), listener, true)
    }

    fn register(&self, topic: String, listener: Listener, once: bool) -> SubscriptionId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner
            .subscriptions
            .entry(topic)
            .or_default()
            .push(Subscription { id, once, listener });
        id
    }

    /// Remove one subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) {
        let mut inner = self.inner.lock();
        if let Some(subs) = inner.subscriptions.get_mut(topic) {
            subs.retain(|sub| sub.id != id);
            if subs.is_empty() {
                inner.subscriptions.remove(topic);
            }
        }
    }

    /// Enqueue an event for asynchronous delivery. Non-blocking; when the
    /// pending queue is full the oldest event is dropped.
    pub fn publish(&self, topic: impl Into<String>, payload: Value) {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            if inner.pending.len() >= PENDING_CAPACITY {
                inner.pending.pop_front();
            }
            inner.pending.push_back((topic.into(), payload));
        }
        self.wake.notify_one();
    }

    /// Drop every subscription and pending event.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.subscriptions.clear();
        inner.pending.clear();
        drop(inner);
        self.wake.notify_one();
    }

    /// Number of live subscriptions for a topic, used by tests and by the
    /// hub's ref-count assertions.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .lock()
            .subscriptions
            .get(topic)
            .map_or(0, Vec::len)
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// The delivery keys for a published topic: every dotted prefix in order,
/// then the wildcard.
fn delivery_keys(topic: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if topic != WILDCARD {
        for (idx, ch) in topic.char_indices() {
            if ch == '.' {
                keys.push(topic[..idx].to_string());
            }
        }
        keys.push(topic.to_string());
    }
    keys.push(WILDCARD.to_string());
    keys
}

async fn drain_loop(inner: Weak<Mutex<Inner>>, wake: Arc<Notify>) {
    loop {
        let notified = wake.notified();

        loop {
            let Some(strong) = inner.upgrade() else {
                return;
            };
            let Some((topic, payload)) = strong.lock().pending.pop_front() else {
                break;
            };
            dispatch(&strong, &topic, &payload);
        }

        match inner.upgrade() {
            Some(strong) if !strong.lock().closed => {}
            _ => return,
        }
        notified.await;
    }
}

fn dispatch(inner: &Arc<Mutex<Inner>>, topic: &str, payload: &Value) {
    for key in delivery_keys(topic) {
        // Snapshot listeners, then invoke without holding the lock so a
        // callback may publish or subscribe re-entrantly.
        let snapshot: Vec<(SubscriptionId, bool, Listener)> = {
            let inner = inner.lock();
            match inner.subscriptions.get(&key) {
                Some(subs) => subs
                    .iter()
                    .map(|sub| (sub.id, sub.once, Arc::clone(&sub.listener)))
                    .collect(),
                None => continue,
            }
        };

        let mut evict = Vec::new();
        for (id, once, listener) in snapshot {
            let result = listener(topic, payload);
            if once || result.is_err() {
                evict.push(id);
            }
        }

        if !evict.is_empty() {
            let mut inner = inner.lock();
            if let Some(subs) = inner.subscriptions.get_mut(&key) {
                subs.retain(|sub| !evict.contains(&sub.id));
                if subs.is_empty() {
                    inner.subscriptions.remove(&key);
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "emitter_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lookup client: keeps one registration WebSocket per configured lookupd.
//!
//! After IDENTIFY the client replays current membership, then mirrors
//! manager events (`load`/`unload`/`spawn`/`exit`) into REGISTER/UNREGISTER
//! messages and heartbeats every 15 s. A dropped connection reconnects with
//! capped exponential backoff and replays everything again.

use futures_util::{SinkExt, StreamExt};
use gaffer_core::emitter::{Listener, SubscriptionId};
use gaffer_core::lookup::{LookupMessage, LookupReply};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::App;
use crate::env::SetupError;
use crate::manager::Manager;

/// Default heartbeat interval.
pub const HEARTBEAT: Duration = Duration::from_secs(15);

const BACKOFF_START: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Connection settings for the lookup client.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    /// `ws://` or `wss://` addresses of every lookupd to register with.
    pub addresses: Vec<String>,
    /// Node name; `(name, origin)` must be unique cluster-wide.
    pub name: String,
    /// Broadcast URL clients should use to reach this node.
    pub origin: String,
    pub heartbeat: Duration,
}

impl LookupConfig {
    pub fn new(addresses: Vec<String>, name: impl Into<String>, origin: impl Into<String>) -> Self {
        Self { addresses, name: name.into(), origin: origin.into(), heartbeat: HEARTBEAT }
    }
}

/// The lookup client as a pluggable app.
pub struct LookupApp {
    config: LookupConfig,
    running: parking_lot::Mutex<Option<Running>>,
}

struct Running {
    cancel: CancellationToken,
    manager: Manager,
}

impl LookupApp {
    pub fn new(config: LookupConfig) -> Self {
        Self { config, running: parking_lot::Mutex::new(None) }
    }

    fn spawn_clients(&self, manager: &Manager) -> CancellationToken {
        let cancel = CancellationToken::new();
        for address in &self.config.addresses {
            tokio::spawn(client_loop(
                manager.clone(),
                address.clone(),
                self.config.clone(),
                cancel.clone(),
            ));
        }
        cancel
    }
}

#[async_trait::async_trait]
impl App for LookupApp {
    async fn start(&self, manager: Manager) -> Result<(), SetupError> {
        let cancel = self.spawn_clients(&manager);
        *self.running.lock() = Some(Running { cancel, manager });
        Ok(())
    }

    async fn stop(&self) {
        if let Some(running) = self.running.lock().take() {
            running.cancel.cancel();
        }
    }

    async fn restart(&self) {
        let mut running = self.running.lock();
        if let Some(old) = running.take() {
            old.cancel.cancel();
            let cancel = self.spawn_clients(&old.manager);
            *running = Some(Running { cancel, manager: old.manager });
        }
    }
}

async fn client_loop(manager: Manager, address: String, config: LookupConfig, cancel: CancellationToken) {
    let mut backoff = BACKOFF_START;
    loop {
        if cancel.is_cancelled() {
            return;
        }
        match connect_async(&address).await {
            Ok((ws, _)) => {
                info!(lookupd = %address, "registration connected");
                backoff = BACKOFF_START;
                if let Err(e) = run_connection(&manager, ws, &config, &cancel).await {
                    warn!(lookupd = %address, "registration dropped: {e}");
                }
            }
            Err(e) => {
                debug!(lookupd = %address, "connect failed: {e}");
            }
        }
        if cancel.is_cancelled() {
            return;
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(BACKOFF_CAP);
    }
}

/// Subscriptions to the manager events this client mirrors upstream.
struct EventTap {
    manager: Manager,
    subs: Vec<(&'static str, SubscriptionId)>,
}

impl EventTap {
    fn install(manager: &Manager) -> (Self, mpsc::UnboundedReceiver<(String, Value)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subs = Vec::new();
        for topic in ["load", "unload", "spawn", "exit"] {
            let tx = tx.clone();
            let listener: Listener = Arc::new(move |topic: &str, payload: &Value| {
                let _ = tx.send((topic.to_string(), payload.clone()));
                Ok(())
            });
            subs.push((topic, manager.events().subscribe(topic, listener)));
        }
        (Self { manager: manager.clone(), subs }, rx)
    }
}

impl Drop for EventTap {
    fn drop(&mut self) {
        for (topic, id) in &self.subs {
            self.manager.events().unsubscribe(topic, *id);
        }
    }
}

fn msgid() -> String {
    nanoid::nanoid!(12)
}

/// Map one manager event to its registration message, if any.
fn registration_for(topic: &str, payload: &Value) -> Option<LookupMessage> {
    let job_name = payload.get("name")?.as_str()?.to_string();
    match topic {
        "load" => Some(LookupMessage::RegisterJob { msgid: msgid(), job_name }),
        "unload" => Some(LookupMessage::UnregisterJob { msgid: msgid(), job_name }),
        "spawn" => Some(LookupMessage::RegisterProcess {
            msgid: msgid(),
            job_name,
            pid: payload.get("pid")?.as_u64()?,
        }),
        "exit" => Some(LookupMessage::UnregisterProcess {
            msgid: msgid(),
            job_name,
            pid: payload.get("pid")?.as_u64()?,
        }),
        _ => None,
    }
}

async fn run_connection<S>(
    manager: &Manager,
    ws: tokio_tungstenite::WebSocketStream<S>,
    config: &LookupConfig,
    cancel: &CancellationToken,
) -> Result<(), tokio_tungstenite::tungstenite::Error>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();

    let send = |msg: LookupMessage| {
        serde_json::to_string(&msg).unwrap_or_default()
    };

    sink.send(Message::text(send(LookupMessage::Identify {
        msgid: msgid(),
        name: config.name.clone(),
        origin: config.origin.clone(),
        version: crate::VERSION.to_string(),
    })))
    .await?;

    // install the tap before snapshotting so nothing falls between
    let (_tap, mut events) = EventTap::install(manager);

    // replay current membership
    for job in manager.jobs(None).unwrap_or_default() {
        sink.send(Message::text(send(LookupMessage::RegisterJob {
            msgid: msgid(),
            job_name: job.clone(),
        })))
        .await?;
        let name = gaffer_core::session::JobName::parse(&job);
        for pid in manager.pids(Some(&name)).unwrap_or_default() {
            sink.send(Message::text(send(LookupMessage::RegisterProcess {
                msgid: msgid(),
                job_name: job.clone(),
                pid: pid.0,
            })))
            .await?;
        }
    }

    let mut heartbeat = tokio::time::interval(config.heartbeat);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    heartbeat.reset();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
            _ = heartbeat.tick() => {
                sink.send(Message::text(send(LookupMessage::Ping { msgid: msgid() }))).await?;
            }
            event = events.recv() => {
                let Some((topic, payload)) = event else { return Ok(()) };
                if let Some(msg) = registration_for(&topic, &payload) {
                    sink.send(Message::text(send(msg))).await?;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    None => return Ok(()),
                    Some(Err(e)) => return Err(e),
                    Some(Ok(Message::Text(raw))) => {
                        match serde_json::from_str::<LookupReply>(raw.as_str()) {
                            Ok(reply) if !reply.is_ok() => {
                                // replays race live events; duplicates are benign
                                debug!(?reply, "lookupd rejected a message");
                            }
                            Ok(_) => {}
                            Err(e) => debug!("unparseable lookupd reply: {e}"),
                        }
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "lookup_tests.rs"]
mod tests;

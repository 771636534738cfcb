// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/channel`: topic subscriptions and control commands over one socket.
//!
//! Client frames are JSON `{event: SUB|UNSUB|CMD|NOP, data: {...}}`.
//! Commands carry a client-chosen `identity` echoed back in the reply so
//! the client can multiplex. Subscribed events arrive as
//! `{event: "gaffer:event", topic, data}` frames.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use gaffer_core::config::JobConfig;
use gaffer_core::error::CommandError;
use gaffer_core::process::ProcessId;
use gaffer_core::session::JobName;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::AppState;
use crate::signals::parse_signal_value;

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[derive(Deserialize)]
struct InFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

struct SubEntry {
    count: usize,
    forward: JoinHandle<()>,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    // subscription events funnel through a bounded queue; command replies
    // go straight out so a full event queue can never wedge the loop
    let (event_tx, mut event_rx) = mpsc::channel::<Value>(256);
    let mut subs: HashMap<String, SubEntry> = HashMap::new();

    loop {
        tokio::select! {
            frame = event_rx.recv() => {
                // senders live as long as this loop, so recv never yields None here
                let Some(frame) = frame else { break };
                if sink.send(Message::Text(frame.to_string())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                let Some(Ok(message)) = incoming else { break };
                match message {
                    Message::Text(raw) => {
                        let reply = handle_frame(&state, &raw, &event_tx, &mut subs).await;
                        if let Some(reply) = reply {
                            if sink.send(Message::Text(reply.to_string())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    // decrement each held topic exactly once
    for (topic, entry) in subs {
        entry.forward.abort();
        state.hub.unsubscribe(&topic);
        debug!(%topic, "channel subscription released on close");
    }
}

async fn handle_frame(
    state: &AppState,
    raw: &str,
    event_tx: &mpsc::Sender<Value>,
    subs: &mut HashMap<String, SubEntry>,
) -> Option<Value> {
    let frame: InFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(_) => return Some(json!({ "event": "gaffer:error", "reason": "invalid_json" })),
    };

    match frame.event.as_str() {
        "NOP" => None,
        "SUB" => {
            let Some(topic) = frame.data.get("topic").and_then(Value::as_str) else {
                return Some(json!({ "event": "gaffer:error", "reason": "topic_missing" }));
            };
            Some(subscribe(state, topic, event_tx, subs))
        }
        "UNSUB" => {
            let Some(topic) = frame.data.get("topic").and_then(Value::as_str) else {
                return Some(json!({ "event": "gaffer:error", "reason": "topic_missing" }));
            };
            if let Some(entry) = subs.get_mut(topic) {
                entry.count -= 1;
                if entry.count == 0 {
                    if let Some(entry) = subs.remove(topic) {
                        entry.forward.abort();
                        state.hub.unsubscribe(topic);
                    }
                }
            }
            Some(json!({ "event": "gaffer:subscription_success", "topic": topic }))
        }
        "CMD" => {
            let identity = frame.data.get("identity").cloned().unwrap_or(Value::Null);
            let name = frame.data.get("name").and_then(Value::as_str).unwrap_or_default();
            let args = frame
                .data
                .get("args")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let kwargs = frame
                .data
                .get("kwargs")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();

            Some(match dispatch_command(state, name, &args, &kwargs).await {
                Ok(result) => json!({
                    "event": "gaffer:command_success",
                    "data": { "id": identity, "result": result },
                }),
                Err(err) => json!({
                    "event": "gaffer:command_error",
                    "data": { "id": identity, "error": err.body() },
                }),
            })
        }
        _ => Some(json!({ "event": "gaffer:error", "reason": "unknown_cmd" })),
    }
}

fn subscribe(
    state: &AppState,
    topic: &str,
    event_tx: &mpsc::Sender<Value>,
    subs: &mut HashMap<String, SubEntry>,
) -> Value {
    if let Some(entry) = subs.get_mut(topic) {
        entry.count += 1;
        return json!({ "event": "gaffer:subscription_success", "topic": topic });
    }

    match state.hub.subscribe(topic) {
        Ok(mut rx) => {
            let forward_out = event_tx.clone();
            let forward = tokio::spawn(async move {
                // Lagged receivers drop the oldest events and keep going.
                loop {
                    match rx.recv().await {
                        Ok((topic, payload)) => {
                            let frame = json!({
                                "event": "gaffer:event",
                                "topic": topic,
                                "data": payload,
                            });
                            if forward_out.send(frame).await.is_err() {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
            subs.insert(topic.to_string(), SubEntry { count: 1, forward });
            json!({ "event": "gaffer:subscription_success", "topic": topic })
        }
        Err(err) => json!({
            "event": "gaffer:subscription_error",
            "topic": topic,
            "error": { "errno": err.errno, "reason": err.reason },
        }),
    }
}

fn arg_str<'a>(args: &'a [Value], idx: usize) -> Result<&'a str, CommandError> {
    args.get(idx).and_then(Value::as_str).ok_or_else(|| CommandError::invalid("arg_missing"))
}

fn arg_pid(args: &[Value], idx: usize) -> Result<ProcessId, CommandError> {
    args.get(idx)
        .and_then(Value::as_u64)
        .map(ProcessId)
        .ok_or_else(|| CommandError::invalid("arg_missing"))
}

fn kwarg_session(kwargs: &Map<String, Value>) -> Option<&str> {
    kwargs.get("sessionid").and_then(Value::as_str)
}

fn kwarg_env(kwargs: &Map<String, Value>) -> Option<HashMap<String, String>> {
    let env = kwargs.get("env")?.as_object()?;
    Some(
        env.iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
            .collect(),
    )
}

fn parse_config(args: &[Value]) -> Result<JobConfig, CommandError> {
    let raw = args.first().ok_or_else(|| CommandError::invalid("config_missing"))?;
    serde_json::from_value(raw.clone()).map_err(|_| CommandError::invalid("invalid_config"))
}

fn scoped(raw: &str, kwargs: &Map<String, Value>) -> JobName {
    JobName::scoped(raw, kwarg_session(kwargs))
}

/// The permitted command set: the manager operations plus the read-side
/// queries.
pub(crate) async fn dispatch_command(
    state: &AppState,
    name: &str,
    args: &[Value],
    kwargs: &Map<String, Value>,
) -> Result<Value, CommandError> {
    let manager = &state.manager;
    match name {
        "sessions" => Ok(json!({ "sessions": manager.sessions() })),
        "jobs" => match args.first().and_then(Value::as_str) {
            None => Ok(json!({ "jobs": manager.jobs(None)? })),
            Some(sessionid) => Ok(json!({
                "sessionid": sessionid,
                "jobs": manager.jobs(Some(sessionid))?,
            })),
        },
        "pids" => match args.first().and_then(Value::as_str) {
            None => Ok(json!({ "pids": manager.pids(None)? })),
            Some(job) => {
                let name = scoped(job, kwargs);
                Ok(json!({ "name": name.to_string(), "pids": manager.pids(Some(&name))? }))
            }
        },
        "load" => {
            let config = parse_config(args)?;
            let start = kwargs.get("start").and_then(Value::as_bool).unwrap_or(true);
            manager.load(config, kwarg_session(kwargs), kwarg_env(kwargs), start)?;
            Ok(json!({ "ok": true }))
        }
        "unload" => {
            let name = scoped(arg_str(args, 0)?, kwargs);
            manager.unload(&name)?;
            Ok(json!({ "ok": true }))
        }
        "reload" => {
            let name = scoped(arg_str(args, 0)?, kwargs);
            manager.reload(&name)?;
            Ok(json!({ "ok": true }))
        }
        "update" => {
            let config = parse_config(args)?;
            let start = kwargs.get("start").and_then(Value::as_bool).unwrap_or(false);
            manager.update(config, kwarg_session(kwargs), kwarg_env(kwargs), start)?;
            Ok(json!({ "ok": true }))
        }
        "start_job" => {
            let name = scoped(arg_str(args, 0)?, kwargs);
            manager.start_job(&name)?;
            Ok(json!({ "ok": true }))
        }
        "stop_job" => {
            let name = scoped(arg_str(args, 0)?, kwargs);
            manager.stop_job(&name)?;
            Ok(json!({ "ok": true }))
        }
        "scale" => {
            let name = scoped(arg_str(args, 0)?, kwargs);
            let op = arg_str(args, 1)?;
            let numprocesses = manager.scale(&name, op)?;
            Ok(json!({ "numprocesses": numprocesses }))
        }
        "info" => {
            let name = scoped(arg_str(args, 0)?, kwargs);
            Ok(manager.job_info(&name)?)
        }
        "stats" => {
            let name = scoped(arg_str(args, 0)?, kwargs);
            Ok(manager.job_stats(&name).await?)
        }
        "stopall" => {
            let name = scoped(arg_str(args, 0)?, kwargs);
            manager.stopall(&name)?;
            Ok(json!({ "ok": true }))
        }
        "killall" => {
            let name = scoped(arg_str(args, 0)?, kwargs);
            let sig = args.get(1).map(parse_signal_value).transpose()?.unwrap_or(
                nix::sys::signal::Signal::SIGTERM,
            );
            manager.killall(&name, sig)?;
            Ok(json!({ "ok": true }))
        }
        "commit" => {
            let name = scoped(arg_str(args, 0)?, kwargs);
            let graceful = kwargs.get("graceful_timeout").and_then(Value::as_f64);
            let pid = manager.commit(&name, graceful, kwarg_env(kwargs))?;
            Ok(json!({ "pid": pid }))
        }
        "process_info" => {
            let pid = arg_pid(args, 0)?;
            let info = manager.process_info(pid)?;
            serde_json::to_value(info).map_err(|e| CommandError::new(500, e.to_string()))
        }
        "process_stats" => {
            let pid = arg_pid(args, 0)?;
            let stats = manager.process_stats(pid).await?;
            serde_json::to_value(stats).map_err(|e| CommandError::new(500, e.to_string()))
        }
        "stop_process" => {
            let pid = arg_pid(args, 0)?;
            manager.stop_process(pid)?;
            Ok(json!({ "ok": true }))
        }
        "send" => {
            let pid = arg_pid(args, 0)?;
            let data = arg_str(args, 1)?.as_bytes().to_vec();
            let stream = kwargs.get("stream").and_then(Value::as_str);
            manager.send(pid, data, stream)?;
            Ok(json!({ "ok": true }))
        }
        "kill" => {
            let pid = arg_pid(args, 0)?;
            let sig = args
                .get(1)
                .map(parse_signal_value)
                .transpose()?
                .ok_or_else(|| CommandError::invalid("signal_missing"))?;
            manager.kill(pid, sig)?;
            Ok(json!({ "ok": true }))
        }
        _ => Err(CommandError::not_found()),
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;

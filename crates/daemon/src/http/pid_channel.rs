// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/<pid>/channel[/<stream>]`: a dedicated byte channel to one process
//! stream, framed `V1 <type> <msgid>\0<body>`.
//!
//! `mode` gates direction: `r` taps the stream, `w` writes into it, `rw`
//! both. Without an explicit stream the channel reads the first redirected
//! output and writes to stdin.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use gaffer_core::error::ProcessError;
use gaffer_core::process::ProcessId;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{ApiError, AppState};
use crate::process::ProcessHandle;

#[derive(Deserialize)]
pub struct ModeQuery {
    #[serde(default = "default_mode")]
    mode: String,
}

fn default_mode() -> String {
    "rw".to_string()
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Path(pid): Path<u64>,
    Query(query): Query<ModeQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    upgrade(state, pid, None, query.mode, ws)
}

pub async fn ws_stream_handler(
    State(state): State<AppState>,
    Path((pid, stream)): Path<(u64, String)>,
    Query(query): Query<ModeQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    upgrade(state, pid, Some(stream), query.mode, ws)
}

fn upgrade(
    state: AppState,
    pid: u64,
    stream: Option<String>,
    mode: String,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let (readable, writable) = match mode.as_str() {
        "r" => (true, false),
        "w" => (false, true),
        "rw" => (true, true),
        _ => return Err(ProcessError::bad_request("invalid_mode").into()),
    };
    let handle = state.manager.get_process(ProcessId(pid))?;

    // resolve and validate direction targets before upgrading
    let read_label = if readable {
        let label = match &stream {
            Some(label) => label.clone(),
            None => handle
                .config
                .stdout_label()
                .map(str::to_string)
                .ok_or_else(|| ProcessError::bad_request("io_not_redirected"))?,
        };
        if !handle.config.has_output_label(&label) && !handle.config.has_custom_stream(&label) {
            return Err(ProcessError::new(404, "stream_not_found").into());
        }
        Some(label)
    } else {
        None
    };

    let write_target = match &stream {
        None => WriteTarget::Stdin,
        Some(label) if label == "stdin" => WriteTarget::Stdin,
        Some(label) => WriteTarget::Stream(label.clone()),
    };

    Ok(ws.on_upgrade(move |socket| run(socket, handle, read_label, write_target, writable)))
}

enum WriteTarget {
    Stdin,
    Stream(String),
}

async fn run(
    socket: WebSocket,
    handle: Arc<ProcessHandle>,
    read_label: Option<String>,
    write_target: WriteTarget,
    writable: bool,
) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(256);

    // tap the readable side into message frames, recovering the raw bytes
    let tap = read_label.as_ref().map(|label| {
        let tap_tx = out_tx.clone();
        let listener: gaffer_core::emitter::Listener =
            Arc::new(move |_topic: &str, payload: &Value| {
                let data = payload
                    .get("data")
                    .and_then(Value::as_str)
                    .map(crate::process::decode_stream_data)
                    .unwrap_or_default();
                let frame = super::Frame::message(nanoid::nanoid!(), data);
                let _ = tap_tx.try_send(frame.encode());
                Ok(())
            });
        handle.monitor_io(label, listener).map(|id| (label.clone(), id))
    });

    loop {
        tokio::select! {
            frame = out_rx.recv() => {
                let Some(frame) = frame else { break };
                if sink.send(Message::Binary(frame)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                let Some(Ok(message)) = incoming else { break };
                let raw = match message {
                    Message::Binary(raw) => raw,
                    Message::Text(raw) => raw.into_bytes(),
                    Message::Close(_) => break,
                    _ => continue,
                };
                // replies bypass the tap queue so a full queue cannot
                // wedge the loop
                let reply = handle_frame(&handle, &write_target, writable, &raw);
                if sink.send(Message::Binary(reply.encode())).await.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(Ok((label, id))) = tap {
        handle.unmonitor_io(&label, id);
    }
}

fn handle_frame(
    handle: &ProcessHandle,
    write_target: &WriteTarget,
    writable: bool,
    raw: &[u8],
) -> super::Frame {
    let frame = match super::Frame::decode(raw) {
        Ok(frame) => frame,
        Err(err) => {
            return super::Frame::error(nanoid::nanoid!(), error_body(&err));
        }
    };
    if frame.frame_type != super::FrameType::Message {
        return super::Frame::error(frame.msgid, error_body(&ProcessError::bad_request("invalid_frame")));
    }
    if !writable {
        return super::Frame::error(frame.msgid, error_body(&ProcessError::forbidden("not_writable")));
    }

    let result = match write_target {
        WriteTarget::Stdin => handle.write(frame.body),
        WriteTarget::Stream(label) => handle.write_stream(label, frame.body),
    };
    match result {
        Ok(()) => super::Frame::response(frame.msgid, b"ok".to_vec()),
        Err(err) => super::Frame::error(frame.msgid, error_body(&ProcessError::from(err))),
    }
}

fn error_body(err: &ProcessError) -> Vec<u8> {
    serde_json::to_vec(&err.body()).unwrap_or_default()
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-process routes, addressed by supervisor pid.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use gaffer_core::process::{ProcessId, ProcessInfo, ProcessStats};
use serde_json::{json, Value};

use super::{ApiError, AppState};
use crate::signals::parse_signal_value;

pub async fn info(
    State(state): State<AppState>,
    Path(pid): Path<u64>,
) -> Result<Json<ProcessInfo>, ApiError> {
    Ok(Json(state.manager.process_info(ProcessId(pid))?))
}

pub async fn stop(
    State(state): State<AppState>,
    Path(pid): Path<u64>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    state.manager.stop_process(ProcessId(pid))?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "ok": true }))))
}

#[derive(serde::Deserialize)]
pub struct SignalBody {
    signal: Value,
}

pub async fn signal(
    State(state): State<AppState>,
    Path(pid): Path<u64>,
    Json(body): Json<SignalBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let sig = parse_signal_value(&body.signal)?;
    state.manager.kill(ProcessId(pid), sig)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "ok": true }))))
}

pub async fn stats(
    State(state): State<AppState>,
    Path(pid): Path<u64>,
) -> Result<Json<ProcessStats>, ApiError> {
    Ok(Json(state.manager.process_stats(ProcessId(pid)).await?))
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session and job routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use gaffer_core::config::JobConfig;
use gaffer_core::error::ProcessError;
use gaffer_core::session::JobName;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiError, AppState};
use crate::signals::parse_signal_value;

fn job_name(session: &str, name: &str) -> JobName {
    JobName::new(session, name)
}

pub async fn sessions(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.manager.sessions())
}

pub async fn all_jobs(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.manager.jobs(None)?))
}

pub async fn session_jobs(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let jobs = state.manager.jobs(Some(&session))?;
    Ok(Json(json!({ "sessionid": session, "jobs": jobs })))
}

#[derive(Deserialize)]
pub struct LoadQuery {
    #[serde(default = "default_start")]
    start: bool,
}

fn default_start() -> bool {
    true
}

pub async fn create_job(
    State(state): State<AppState>,
    Path(session): Path<String>,
    Query(query): Query<LoadQuery>,
    Json(config): Json<JobConfig>,
) -> Result<Json<Value>, ApiError> {
    let name = state.manager.load(config, Some(&session), None, query.start)?;
    Ok(Json(json!({ "ok": true, "name": name.to_string() })))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path((session, name)): Path<(String, String)>,
) -> Result<Json<JobConfig>, ApiError> {
    Ok(Json(state.manager.get_config(&job_name(&session, &name))?))
}

#[derive(Deserialize)]
pub struct UpdateQuery {
    #[serde(default)]
    start: bool,
}

pub async fn update_job(
    State(state): State<AppState>,
    Path((session, name)): Path<(String, String)>,
    Query(query): Query<UpdateQuery>,
    Json(config): Json<JobConfig>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if config.name != name {
        return Err(ProcessError::bad_request("name_mismatch").into());
    }
    state.manager.update(config, Some(&session), None, query.start)?;
    Ok((StatusCode::CREATED, Json(json!({ "ok": true }))))
}

pub async fn delete_job(
    State(state): State<AppState>,
    Path((session, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    state.manager.unload(&job_name(&session, &name))?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn job_info(
    State(state): State<AppState>,
    Path((session, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.manager.job_info(&job_name(&session, &name))?))
}

pub async fn job_stats(
    State(state): State<AppState>,
    Path((session, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.manager.job_stats(&job_name(&session, &name)).await?))
}

pub async fn numprocesses(
    State(state): State<AppState>,
    Path((session, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let info = state.manager.job_info(&job_name(&session, &name))?;
    Ok(Json(json!({ "numprocesses": info["max_processes"] })))
}

#[derive(Deserialize)]
pub struct ScaleBody {
    scale: Value,
}

pub async fn scale(
    State(state): State<AppState>,
    Path((session, name)): Path<(String, String)>,
    Json(body): Json<ScaleBody>,
) -> Result<Json<Value>, ApiError> {
    let op = match &body.scale {
        Value::String(op) => op.clone(),
        Value::Number(n) => n.to_string(),
        _ => return Err(ProcessError::bad_request("bad_operation").into()),
    };
    let numprocesses = state.manager.scale(&job_name(&session, &name), &op)?;
    Ok(Json(json!({ "numprocesses": numprocesses })))
}

pub async fn get_state(
    State(state): State<AppState>,
    Path((session, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let info = state.manager.job_info(&job_name(&session, &name))?;
    let active = info["active"].as_bool().unwrap_or(false);
    Ok(Json(json!(if active { 1 } else { 0 })))
}

/// `1` starts, `0` stops, `2` reloads. Accepts a bare number or
/// `{"state": n}`.
pub async fn set_state(
    State(state): State<AppState>,
    Path((session, name)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let requested = match &body {
        Value::Number(n) => n.as_i64(),
        Value::Object(map) => map.get("state").and_then(Value::as_i64),
        _ => None,
    };
    let name = job_name(&session, &name);
    match requested {
        Some(0) => state.manager.stop_job(&name)?,
        Some(1) => state.manager.start_job(&name)?,
        Some(2) => state.manager.reload(&name)?,
        _ => return Err(ProcessError::bad_request("invalid_state").into()),
    }
    Ok((StatusCode::ACCEPTED, Json(json!({ "ok": true }))))
}

#[derive(Deserialize)]
pub struct SignalBody {
    signal: Value,
}

pub async fn signal(
    State(state): State<AppState>,
    Path((session, name)): Path<(String, String)>,
    Json(body): Json<SignalBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let sig = parse_signal_value(&body.signal)?;
    state.manager.killall(&job_name(&session, &name), sig)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "ok": true }))))
}

pub async fn pids(
    State(state): State<AppState>,
    Path((session, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let pids = state.manager.pids(Some(&job_name(&session, &name)))?;
    Ok(Json(json!({ "pids": pids })))
}

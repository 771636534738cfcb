// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lookupd HTTP query surface and the `/ws` registration endpoint.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use gaffer_core::error::ErrorBody;
use gaffer_core::lookup::{LookupMessage, LookupReply};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::registry::Registry;

pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/ping", get(ping))
        .route("/nodes", get(nodes))
        .route("/sessions", get(all_sessions))
        .route("/sessions/:nodeid", get(node_sessions))
        .route("/jobs", get(jobs))
        .route("/findJob", get(find_job))
        .route("/findSession", get(find_session))
        .route("/ws", get(ws_handler))
        .with_state(registry)
}

async fn welcome() -> Json<serde_json::Value> {
    Json(json!({ "welcome": "gaffer-lookupd", "version": crate::VERSION }))
}

async fn ping() -> &'static str {
    "OK"
}

async fn nodes(State(registry): State<Arc<Registry>>) -> Json<serde_json::Value> {
    Json(json!({ "nodes": registry.nodes() }))
}

async fn all_sessions(State(registry): State<Arc<Registry>>) -> Json<serde_json::Value> {
    Json(json!({ "sessions": registry.sessions(None) }))
}

async fn node_sessions(
    State(registry): State<Arc<Registry>>,
    Path(nodeid): Path<String>,
) -> Json<serde_json::Value> {
    Json(json!({ "nodeid": nodeid, "sessions": registry.sessions(Some(&nodeid)) }))
}

async fn jobs(State(registry): State<Arc<Registry>>) -> Json<serde_json::Value> {
    Json(json!({ "jobs": registry.jobs() }))
}

#[derive(Deserialize)]
struct FindJobQuery {
    name: String,
}

async fn find_job(
    State(registry): State<Arc<Registry>>,
    Query(query): Query<FindJobQuery>,
) -> Response {
    match registry.find_job(&query.name) {
        Ok(sources) => {
            Json(json!({ "name": query.name, "sources": sources })).into_response()
        }
        Err(err) => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody { errno: err.errno(), reason: "not_found".into() }),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
struct FindSessionQuery {
    sessionid: String,
}

async fn find_session(
    State(registry): State<Arc<Registry>>,
    Query(query): Query<FindSessionQuery>,
) -> Json<serde_json::Value> {
    Json(json!({
        "sessionid": query.sessionid,
        "jobs": registry.find_session(&query.sessionid),
    }))
}

async fn ws_handler(State(registry): State<Arc<Registry>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_node(socket, registry))
}

/// One node connection: register on open, dispatch every frame, drop the
/// node's state on close.
async fn handle_node(mut socket: WebSocket, registry: Arc<Registry>) {
    let id = registry.add_node();

    while let Some(Ok(message)) = socket.recv().await {
        let raw = match message {
            Message::Text(raw) => raw,
            Message::Close(_) => break,
            _ => continue,
        };
        let reply = match serde_json::from_str::<LookupMessage>(&raw) {
            Ok(msg) => registry.dispatch(id, &msg),
            Err(e) => {
                debug!("invalid registration message: {e}");
                LookupReply::err(None, 400, "invalid_message")
            }
        };
        let Ok(encoded) = serde_json::to_string(&reply) else {
            break;
        };
        if socket.send(Message::Text(encoded)).await.is_err() {
            break;
        }
    }

    registry.remove_node(id);
}

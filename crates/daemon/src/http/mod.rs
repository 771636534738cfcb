// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket control surface.
//!
//! Thin handlers over the manager: parse, call, serialize. Errors travel
//! as `{errno, reason}` with the status taken from the errno.

mod channel;
mod frame;
mod jobs;
mod pid_channel;
mod processes;

pub use frame::{Frame, FrameType};

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use gaffer_core::error::ProcessError;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::App;
use crate::env::SetupError;
use crate::hub::{AllowAll, Authorizer, Hub};
use crate::manager::Manager;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Manager,
    pub hub: Arc<Hub>,
}

/// `ProcessError` carried through axum.
pub struct ApiError(pub ProcessError);

impl From<ProcessError> for ApiError {
    fn from(err: ProcessError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.errno).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.body())).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/ping", get(ping))
        .route("/pid", get(daemon_pid))
        .route("/sessions", get(jobs::sessions))
        .route("/jobs", get(jobs::all_jobs))
        .route("/jobs/:session", get(jobs::session_jobs).post(jobs::create_job))
        .route(
            "/jobs/:session/:name",
            get(jobs::get_job).put(jobs::update_job).delete(jobs::delete_job),
        )
        .route("/jobs/:session/:name/info", get(jobs::job_info))
        .route("/jobs/:session/:name/stats", get(jobs::job_stats))
        .route(
            "/jobs/:session/:name/numprocesses",
            get(jobs::numprocesses).post(jobs::scale),
        )
        .route("/jobs/:session/:name/state", get(jobs::get_state).post(jobs::set_state))
        .route("/jobs/:session/:name/signal", post(jobs::signal))
        .route("/jobs/:session/:name/pids", get(jobs::pids))
        .route("/channel", get(channel::ws_handler))
        .route("/:pid", get(processes::info).delete(processes::stop))
        .route("/:pid/signal", post(processes::signal))
        .route("/:pid/stats", get(processes::stats))
        .route("/:pid/channel", get(pid_channel::ws_handler))
        .route("/:pid/channel/:stream", get(pid_channel::ws_stream_handler))
        .with_state(state)
}

async fn welcome() -> Json<serde_json::Value> {
    Json(json!({ "welcome": "gaffer", "version": crate::VERSION }))
}

async fn ping() -> &'static str {
    "OK"
}

async fn daemon_pid(State(_state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "pid": std::process::id() }))
}

struct Running {
    cancel: CancellationToken,
    manager: Manager,
}

/// The HTTP server as a pluggable app.
pub struct HttpApp {
    bind: String,
    authorizer: Arc<dyn Authorizer>,
    running: Mutex<Option<Running>>,
}

impl HttpApp {
    pub fn new(bind: impl Into<String>) -> Self {
        Self {
            bind: bind.into(),
            authorizer: Arc::new(AllowAll),
            running: Mutex::new(None),
        }
    }

    pub fn with_authorizer(bind: impl Into<String>, authorizer: Arc<dyn Authorizer>) -> Self {
        Self { bind: bind.into(), authorizer, running: Mutex::new(None) }
    }

    async fn bind_and_serve(&self, manager: Manager) -> Result<CancellationToken, SetupError> {
        let hub = Hub::new(manager.clone(), Arc::clone(&self.authorizer));
        let state = AppState { manager, hub };

        let listener = tokio::net::TcpListener::bind(&self.bind)
            .await
            .map_err(|e| SetupError::BindFailed(self.bind.clone(), e))?;
        info!(bind = %self.bind, "http listening");

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let app = router(state);
        tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(e) = serve.await {
                warn!("http server error: {e}");
            }
        });
        Ok(cancel)
    }
}

#[async_trait]
impl App for HttpApp {
    async fn start(&self, manager: Manager) -> Result<(), SetupError> {
        let cancel = self.bind_and_serve(manager.clone()).await?;
        *self.running.lock() = Some(Running { cancel, manager });
        Ok(())
    }

    async fn stop(&self) {
        if let Some(running) = self.running.lock().take() {
            running.cancel.cancel();
        }
    }

    async fn restart(&self) {
        let manager = {
            let mut running = self.running.lock();
            let Some(running) = running.take() else {
                return;
            };
            running.cancel.cancel();
            running.manager
        };
        match self.bind_and_serve(manager.clone()).await {
            Ok(cancel) => *self.running.lock() = Some(Running { cancel, manager }),
            Err(e) => warn!("http restart failed: {e}"),
        }
    }
}

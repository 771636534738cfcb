// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable daemon applications.
//!
//! Optional behavior (the HTTP server, the lookup client) shares one
//! start/stop/restart contract. Apps are registered at manager start and
//! iterated in declaration order.

use async_trait::async_trait;

use crate::env::SetupError;
use crate::manager::Manager;

#[async_trait]
pub trait App: Send + Sync {
    /// Bring the app up against a started manager.
    async fn start(&self, manager: Manager) -> Result<(), SetupError>;

    /// Tear the app down. Called after every supervised process has been
    /// reaped.
    async fn stop(&self);

    /// Bounce the app without touching manager state.
    async fn restart(&self);
}

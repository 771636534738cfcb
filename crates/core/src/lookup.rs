// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire messages for the node ↔ lookupd registration protocol.
//!
//! JSON text frames over WebSocket. Every client message carries a
//! client-chosen `msgid` which the server echoes on its reply, so replies
//! can be matched to requests on a multiplexed connection.

use serde::{Deserialize, Serialize};

/// Client → lookupd registration messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LookupMessage {
    /// First message after connect; claims `(name, origin)` cluster-wide.
    #[serde(rename = "IDENTIFY")]
    Identify {
        msgid: String,
        name: String,
        /// Broadcast URL clients should use to reach this node.
        origin: String,
        version: String,
    },

    /// Keepalive; sent every heartbeat interval.
    #[serde(rename = "PING")]
    Ping { msgid: String },

    #[serde(rename = "REGISTER_JOB")]
    RegisterJob { msgid: String, job_name: String },

    #[serde(rename = "UNREGISTER_JOB")]
    UnregisterJob { msgid: String, job_name: String },

    #[serde(rename = "REGISTER_PROCESS")]
    RegisterProcess { msgid: String, job_name: String, pid: u64 },

    #[serde(rename = "UNREGISTER_PROCESS")]
    UnregisterProcess { msgid: String, job_name: String, pid: u64 },
}

impl LookupMessage {
    pub fn msgid(&self) -> &str {
        match self {
            Self::Identify { msgid, .. }
            | Self::Ping { msgid }
            | Self::RegisterJob { msgid, .. }
            | Self::UnregisterJob { msgid, .. }
            | Self::RegisterProcess { msgid, .. }
            | Self::UnregisterProcess { msgid, .. } => msgid,
        }
    }
}

/// Lookupd → client reply frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LookupReply {
    Ok {
        msgid: String,
        ok: bool,
    },
    Err {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msgid: Option<String>,
        errno: u16,
        reason: String,
    },
}

impl LookupReply {
    pub fn ok(msgid: impl Into<String>) -> Self {
        Self::Ok { msgid: msgid.into(), ok: true }
    }

    pub fn err(msgid: Option<String>, errno: u16, reason: impl Into<String>) -> Self {
        Self::Err { msgid, errno, reason: reason.into() }
    }

    pub fn msgid(&self) -> Option<&str> {
        match self {
            Self::Ok { msgid, .. } => Some(msgid),
            Self::Err { msgid, .. } => msgid.as_deref(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { ok: true, .. })
    }
}

#[cfg(test)]
#[path = "lookup_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared by the supervisor, the wire protocols and the
//! lookup directory.
//!
//! Every control-path failure reduces to an `{errno, reason}` pair so it can
//! be serialized to remote clients unchanged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire shape for control-path errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub errno: u16,
    pub reason: String,
}

/// Error raised on a process or job operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{errno}: {reason}")]
pub struct ProcessError {
    pub errno: u16,
    pub reason: String,
}

impl ProcessError {
    pub fn new(errno: u16, reason: impl Into<String>) -> Self {
        Self { errno, reason: reason.into() }
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(400, reason)
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::new(403, reason)
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::new(500, reason)
    }

    /// The job or process addressed by an operation does not exist.
    pub fn not_found() -> Self {
        Self::new(404, "not_found")
    }

    /// A job with the same name already exists in the session.
    pub fn conflict() -> Self {
        Self::new(409, "conflict")
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody { errno: self.errno, reason: self.reason.clone() }
    }
}

impl From<StreamError> for ProcessError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::StreamNotFound => Self::new(404, "stream_not_found"),
            StreamError::NotWritable => Self::new(403, "not_writable"),
            StreamError::AlreadyReading => Self::new(409, "already_reading"),
        }
    }
}

/// Error raised while dispatching a remote command frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{errno}: {reason}")]
pub struct CommandError {
    pub errno: u16,
    pub reason: String,
}

impl CommandError {
    pub fn new(errno: u16, reason: impl Into<String>) -> Self {
        Self { errno, reason: reason.into() }
    }

    pub fn not_found() -> Self {
        Self::new(404, "command_not_found")
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::new(400, reason)
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody { errno: self.errno, reason: self.reason.clone() }
    }
}

impl From<ProcessError> for CommandError {
    fn from(err: ProcessError) -> Self {
        Self { errno: err.errno, reason: err.reason }
    }
}

/// Error raised when a topic cannot be parsed or activated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{errno}: {reason}")]
pub struct TopicError {
    pub errno: u16,
    pub reason: String,
}

impl TopicError {
    pub fn invalid() -> Self {
        Self { errno: 400, reason: "invalid_topic".into() }
    }

    pub fn forbidden() -> Self {
        Self { errno: 403, reason: "forbidden".into() }
    }
}

impl From<ProcessError> for TopicError {
    fn from(err: ProcessError) -> Self {
        Self { errno: err.errno, reason: err.reason }
    }
}

/// Per-stream capability failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("stream_not_found")]
    StreamNotFound,

    #[error("not_writable")]
    NotWritable,

    #[error("already_reading")]
    AlreadyReading,
}

/// Lookup directory failures, shared by the registry and the node client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// A non-IDENTIFY message arrived before IDENTIFY.
    #[error("need to send IDENTIFY first")]
    NoIdent,

    #[error("job is not registered")]
    JobNotFound,

    #[error("connection already identified")]
    AlreadyIdentified,

    /// Another connection already claimed this `(name, origin)` pair.
    #[error("identity exists")]
    IdentExists,

    #[error("job is already registered")]
    AlreadyRegistered,

    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl LookupError {
    pub fn errno(&self) -> u16 {
        match self {
            Self::NoIdent | Self::JobNotFound => 404,
            Self::AlreadyIdentified | Self::IdentExists | Self::AlreadyRegistered => 409,
            Self::InvalidMessage(_) => 400,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody { errno: self.errno(), reason: self.to_string() }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

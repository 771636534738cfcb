// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fully-qualified job names.
//!
//! A job lives in a session namespace; its fully-qualified name is
//! `"<session>.<jobname>"`. A bare name means the `default` session and `/`
//! is accepted as a separator alias for URL-friendly callers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The session every unqualified job name falls into.
pub const DEFAULT_SESSION: &str = "default";

/// A fully-qualified job name, split into its session and job parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct JobName {
    session: String,
    name: String,
}

impl JobName {
    pub fn new(session: impl Into<String>, name: impl Into<String>) -> Self {
        Self { session: session.into(), name: name.into() }
    }

    /// Parse a possibly-qualified name. Only the first separator splits, so
    /// job names may themselves contain dots.
    pub fn parse(raw: &str) -> Self {
        let split = raw
            .split_once('.')
            .or_else(|| raw.split_once('/'));
        match split {
            Some((session, name)) => Self::new(session, name),
            None => Self::new(DEFAULT_SESSION, raw),
        }
    }

    /// Qualify a bare name into the given session, or parse it when it is
    /// already qualified.
    pub fn scoped(raw: &str, session: Option<&str>) -> Self {
        match session {
            Some(session) => Self::new(session, raw),
            None => Self::parse(raw),
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.session, self.name)
    }
}

impl From<String> for JobName {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&str> for JobName {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<JobName> for String {
    fn from(name: JobName) -> Self {
        name.to_string()
    }
}

/// Append a monotonic numeric suffix until `taken` no longer matches.
///
/// Used when loading a config whose name is already claimed and the caller
/// asked for a fresh one.
pub fn unique_job_name(base: &str, mut taken: impl FnMut(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 1u32;
    loop {
        let candidate = format!("{base}.{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Topic grammar for remote subscriptions.
//!
//! Remote clients address `SOURCE[:<target>]`: `EVENTS` with an optional
//! dotted prefix, `JOB:<session>.<name>`, `PROCESS:<pid>`, `STATS:<pid>` or
//! `STATS:<session>.<name>`, and `STREAM:<pid>[.<label>]`.

use crate::error::TopicError;
use crate::process::ProcessId;
use crate::session::JobName;
use std::fmt;

/// A parsed subscription topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Manager events matching a dotted prefix; `"."` means everything.
    Events { prefix: String },

    /// Lifecycle events of one job.
    Job { name: JobName },

    /// Lifecycle events of one process wrapper.
    Process { pid: ProcessId },

    /// Stat samples for every current process of a job.
    JobStats { name: JobName },

    /// Stat samples for one process.
    ProcessStats { pid: ProcessId },

    /// Raw bytes from one output stream. Without a label the first
    /// redirected output is used.
    Stream { pid: ProcessId, label: Option<String> },
}

fn parse_pid(raw: &str) -> Option<ProcessId> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok().map(ProcessId)
}

impl Topic {
    pub fn parse(raw: &str) -> Result<Self, TopicError> {
        let (source, target) = match raw.split_once(':') {
            Some((source, target)) => (source, Some(target)),
            None => (raw, None),
        };

        match source.to_ascii_uppercase().as_str() {
            "EVENTS" => {
                let prefix = match target {
                    None | Some("") | Some(".") => ".".to_string(),
                    Some(prefix) => prefix.to_string(),
                };
                Ok(Self::Events { prefix })
            }
            "JOB" => match target {
                Some(name) if !name.is_empty() => {
                    Ok(Self::Job { name: JobName::parse(name) })
                }
                _ => Err(TopicError::invalid()),
            },
            "PROCESS" => match target.and_then(parse_pid) {
                Some(pid) => Ok(Self::Process { pid }),
                None => Err(TopicError::invalid()),
            },
            "STATS" => match target {
                Some(target) if !target.is_empty() => Ok(match parse_pid(target) {
                    Some(pid) => Self::ProcessStats { pid },
                    None => Self::JobStats { name: JobName::parse(target) },
                }),
                _ => Err(TopicError::invalid()),
            },
            "STREAM" => {
                let target = target.filter(|t| !t.is_empty()).ok_or_else(TopicError::invalid)?;
                if let Some(pid) = parse_pid(target) {
                    return Ok(Self::Stream { pid, label: None });
                }
                let (pid, label) = target.split_once('.').ok_or_else(TopicError::invalid)?;
                match parse_pid(pid) {
                    Some(pid) => Ok(Self::Stream { pid, label: Some(label.to_string()) }),
                    None => Err(TopicError::invalid()),
                }
            }
            _ => Err(TopicError::invalid()),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Events { prefix } if prefix == "." => write!(f, "EVENTS"),
            Self::Events { prefix } => write!(f, "EVENTS:{prefix}"),
            Self::Job { name } => write!(f, "JOB:{name}"),
            Self::Process { pid } => write!(f, "PROCESS:{pid}"),
            Self::JobStats { name } => write!(f, "STATS:{name}"),
            Self::ProcessStats { pid } => write!(f, "STATS:{pid}"),
            Self::Stream { pid, label: None } => write!(f, "STREAM:{pid}"),
            Self::Stream { pid, label: Some(label) } => write!(f, "STREAM:{pid}.{label}"),
        }
    }
}

#[cfg(test)]
#[path = "topic_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node registry: which supervisor runs which jobs and processes.
//!
//! Indexed by connection. A node stays anonymous until its IDENTIFY
//! arrives; every other message is rejected with `NoIdent` until then.
//! Disconnect drops the node and everything it registered.

use gaffer_core::error::LookupError;
use gaffer_core::lookup::{LookupMessage, LookupReply};
use gaffer_core::session::JobName;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Registry-local handle for one node connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

/// One job advertised by a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteJob {
    pub pids: BTreeSet<u64>,
}

/// One registered supervisor node.
#[derive(Debug, Clone)]
pub struct GafferNode {
    pub name: Option<String>,
    pub origin: Option<String>,
    pub version: Option<String>,
    /// Last message wall time, for liveness inspection.
    pub updated_ms: u64,
    sessions: BTreeMap<String, BTreeMap<String, RemoteJob>>,
}

fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

impl GafferNode {
    fn new() -> Self {
        Self {
            name: None,
            origin: None,
            version: None,
            updated_ms: epoch_ms(),
            sessions: BTreeMap::new(),
        }
    }

    fn touch(&mut self) {
        self.updated_ms = epoch_ms();
    }

    fn identified(&self) -> bool {
        self.name.is_some()
    }

    fn add_job(&mut self, job_name: &str) -> Result<(), LookupError> {
        let name = JobName::parse(job_name);
        let session = self.sessions.entry(name.session().to_string()).or_default();
        if session.contains_key(name.name()) {
            return Err(LookupError::AlreadyRegistered);
        }
        session.insert(name.name().to_string(), RemoteJob::default());
        self.touch();
        Ok(())
    }

    fn remove_job(&mut self, job_name: &str) {
        let name = JobName::parse(job_name);
        if let Some(session) = self.sessions.get_mut(name.session()) {
            session.remove(name.name());
            if session.is_empty() {
                self.sessions.remove(name.session());
            }
        }
        self.touch();
    }

    fn job_mut(&mut self, job_name: &str) -> Result<&mut RemoteJob, LookupError> {
        let name = JobName::parse(job_name);
        self.sessions
            .get_mut(name.session())
            .and_then(|session| session.get_mut(name.name()))
            .ok_or(LookupError::JobNotFound)
    }

    fn info(&self) -> Value {
        json!({
            "name": self.name,
            "origin": self.origin,
            "version": self.version,
        })
    }

    fn to_json(&self) -> Value {
        let sessions: BTreeMap<&String, Value> = self
            .sessions
            .iter()
            .map(|(session, jobs)| {
                let jobs: BTreeMap<&String, Value> = jobs
                    .iter()
                    .map(|(job, remote)| (job, json!({ "pids": remote.pids })))
                    .collect();
                (session, json!(jobs))
            })
            .collect();
        let mut info = self.info();
        if let Some(map) = info.as_object_mut() {
            map.insert("sessions".into(), json!(sessions));
        }
        info
    }
}

#[derive(Default)]
struct RegistryInner {
    nodes: BTreeMap<NodeId, GafferNode>,
    next_id: u64,
}

/// Shared registry state.
#[derive(Default)]
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh, unidentified connection.
    pub fn add_node(&self) -> NodeId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = NodeId(inner.next_id);
        inner.nodes.insert(id, GafferNode::new());
        debug!(?id, "node connected");
        id
    }

    /// Drop a connection and everything it registered.
    pub fn remove_node(&self, id: NodeId) {
        let mut inner = self.inner.lock();
        if inner.nodes.remove(&id).is_some() {
            debug!(?id, "node removed");
        }
    }

    pub fn identify(
        &self,
        id: NodeId,
        name: &str,
        origin: &str,
        version: &str,
    ) -> Result<(), LookupError> {
        let mut inner = self.inner.lock();
        let taken = inner.nodes.values().any(|node| {
            node.name.as_deref() == Some(name) && node.origin.as_deref() == Some(origin)
        });
        let node = inner.nodes.get_mut(&id).ok_or(LookupError::NoIdent)?;
        if node.identified() {
            return Err(LookupError::AlreadyIdentified);
        }
        if taken {
            return Err(LookupError::IdentExists);
        }
        node.name = Some(name.to_string());
        node.origin = Some(origin.to_string());
        node.version = Some(version.to_string());
        node.touch();
        Ok(())
    }

    /// Keepalive; valid even before IDENTIFY.
    pub fn update(&self, id: NodeId) {
        let mut inner = self.inner.lock();
        if let Some(node) = inner.nodes.get_mut(&id) {
            node.touch();
        }
    }

    fn with_identified<T>(
        &self,
        id: NodeId,
        f: impl FnOnce(&mut GafferNode) -> Result<T, LookupError>,
    ) -> Result<T, LookupError> {
        let mut inner = self.inner.lock();
        let node = inner.nodes.get_mut(&id).ok_or(LookupError::NoIdent)?;
        if !node.identified() {
            return Err(LookupError::NoIdent);
        }
        f(node)
    }

    pub fn add_job(&self, id: NodeId, job_name: &str) -> Result<(), LookupError> {
        self.with_identified(id, |node| node.add_job(job_name))
    }

    pub fn remove_job(&self, id: NodeId, job_name: &str) -> Result<(), LookupError> {
        self.with_identified(id, |node| {
            node.remove_job(job_name);
            Ok(())
        })
    }

    pub fn add_process(&self, id: NodeId, job_name: &str, pid: u64) -> Result<(), LookupError> {
        self.with_identified(id, |node| {
            node.job_mut(job_name)?.pids.insert(pid);
            node.touch();
            Ok(())
        })
    }

    pub fn remove_process(&self, id: NodeId, job_name: &str, pid: u64) -> Result<(), LookupError> {
        self.with_identified(id, |node| {
            node.job_mut(job_name)?.pids.remove(&pid);
            node.touch();
            Ok(())
        })
    }

    /// Apply one protocol message for a connection and build its reply.
    pub fn dispatch(&self, id: NodeId, msg: &LookupMessage) -> LookupReply {
        let msgid = msg.msgid().to_string();
        let result = match msg {
            LookupMessage::Ping { .. } => {
                self.update(id);
                Ok(())
            }
            LookupMessage::Identify { name, origin, version, .. } => {
                self.identify(id, name, origin, version)
            }
            LookupMessage::RegisterJob { job_name, .. } => self.add_job(id, job_name),
            LookupMessage::UnregisterJob { job_name, .. } => self.remove_job(id, job_name),
            LookupMessage::RegisterProcess { job_name, pid, .. } => {
                self.add_process(id, job_name, *pid)
            }
            LookupMessage::UnregisterProcess { job_name, pid, .. } => {
                self.remove_process(id, job_name, *pid)
            }
        };
        match result {
            Ok(()) => LookupReply::ok(msgid),
            Err(err) => LookupReply::err(Some(msgid), err.errno(), err.to_string()),
        }
    }

    // ------------- queries

    /// All identified nodes with their full session trees.
    pub fn nodes(&self) -> Vec<Value> {
        let inner = self.inner.lock();
        inner
            .nodes
            .values()
            .filter(|node| node.identified())
            .map(GafferNode::to_json)
            .collect()
    }

    /// session → job → sources, optionally filtered to one node name.
    pub fn sessions(&self, node_name: Option<&str>) -> Value {
        let inner = self.inner.lock();
        let mut sessions: BTreeMap<String, BTreeMap<String, Vec<Value>>> = BTreeMap::new();
        for node in inner.nodes.values() {
            if !node.identified() {
                continue;
            }
            if let Some(filter) = node_name {
                if node.name.as_deref() != Some(filter) {
                    continue;
                }
            }
            for (session, jobs) in &node.sessions {
                let entry = sessions.entry(session.clone()).or_default();
                for (job, remote) in jobs {
                    entry
                        .entry(format!("{session}.{job}"))
                        .or_default()
                        .push(source_json(node, session, job, remote));
                }
            }
        }
        json!(sessions)
    }

    /// job fq-name → sources across every node.
    pub fn jobs(&self) -> Value {
        let inner = self.inner.lock();
        let mut jobs: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for node in inner.nodes.values() {
            if !node.identified() {
                continue;
            }
            for (session, session_jobs) in &node.sessions {
                for (job, remote) in session_jobs {
                    jobs.entry(format!("{session}.{job}"))
                        .or_default()
                        .push(source_json(node, session, job, remote));
                }
            }
        }
        json!(jobs)
    }

    /// Every source for one fully-qualified job. 404 when nothing matches.
    pub fn find_job(&self, job_name: &str) -> Result<Vec<Value>, LookupError> {
        let name = JobName::parse(job_name);
        let inner = self.inner.lock();
        let sources: Vec<Value> = inner
            .nodes
            .values()
            .filter(|node| node.identified())
            .filter_map(|node| {
                let remote = node.sessions.get(name.session())?.get(name.name())?;
                Some(source_json(node, name.session(), name.name(), remote))
            })
            .collect();
        if sources.is_empty() {
            return Err(LookupError::JobNotFound);
        }
        Ok(sources)
    }

    /// Every job source inside one session, across all nodes.
    pub fn find_session(&self, sessionid: &str) -> Vec<Value> {
        let inner = self.inner.lock();
        let mut sources = Vec::new();
        for node in inner.nodes.values() {
            if !node.identified() {
                continue;
            }
            if let Some(jobs) = node.sessions.get(sessionid) {
                for (job, remote) in jobs {
                    sources.push(source_json(node, sessionid, job, remote));
                }
            }
        }
        sources
    }
}

fn source_json(node: &GafferNode, session: &str, job: &str, remote: &RemoteJob) -> Value {
    json!({
        "name": format!("{session}.{job}"),
        "node": node.info(),
        "pids": remote.pids,
    })
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

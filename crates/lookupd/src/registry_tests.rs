// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn identified(registry: &Registry, name: &str, origin: &str) -> NodeId {
    let id = registry.add_node();
    registry.identify(id, name, origin, "0.1.0").unwrap();
    id
}

#[test]
fn messages_before_identify_are_no_ident() {
    let registry = Registry::new();
    let id = registry.add_node();
    let err = registry.add_job(id, "default.dummy").unwrap_err();
    assert_eq!(err, LookupError::NoIdent);
    assert_eq!(err.errno(), 404);
}

#[test]
fn ping_is_allowed_before_identify() {
    let registry = Registry::new();
    let id = registry.add_node();
    let reply = registry.dispatch(id, &LookupMessage::Ping { msgid: "m1".into() });
    assert!(reply.is_ok());
}

#[test]
fn double_identify_conflicts() {
    let registry = Registry::new();
    let id = identified(&registry, "a", "http://a:5000");
    let err = registry.identify(id, "a", "http://a:5000", "0.1.0").unwrap_err();
    assert_eq!(err, LookupError::AlreadyIdentified);
}

#[test]
fn identity_collision_conflicts() {
    let registry = Registry::new();
    identified(&registry, "a", "http://a:5000");
    let other = registry.add_node();
    let err = registry.identify(other, "a", "http://a:5000", "0.1.0").unwrap_err();
    assert_eq!(err, LookupError::IdentExists);
    assert_eq!(err.errno(), 409);

    // same name from a different origin is a different node
    registry.identify(other, "a", "http://b:5000", "0.1.0").unwrap();
}

#[test]
fn double_register_job_conflicts() {
    let registry = Registry::new();
    let id = identified(&registry, "a", "http://a:5000");
    registry.add_job(id, "default.dummy").unwrap();
    let err = registry.add_job(id, "default.dummy").unwrap_err();
    assert_eq!(err, LookupError::AlreadyRegistered);
    assert_eq!(err.errno(), 409);
}

#[test]
fn find_job_round_trip() {
    let registry = Registry::new();
    let id = identified(&registry, "node-a", "http://a:5000");
    registry.add_job(id, "default.dummy").unwrap();
    registry.add_process(id, "default.dummy", 1).unwrap();

    let sources = registry.find_job("default.dummy").unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0]["node"]["origin"], "http://a:5000");
    assert_eq!(sources[0]["pids"], serde_json::json!([1]));

    registry.remove_job(id, "default.dummy").unwrap();
    assert_eq!(registry.find_job("default.dummy").unwrap_err(), LookupError::JobNotFound);
}

#[test]
fn process_registration_needs_the_job() {
    let registry = Registry::new();
    let id = identified(&registry, "a", "http://a:5000");
    let err = registry.add_process(id, "default.ghost", 1).unwrap_err();
    assert_eq!(err, LookupError::JobNotFound);
}

#[test]
fn disconnect_drops_everything() {
    let registry = Registry::new();
    let id = identified(&registry, "a", "http://a:5000");
    registry.add_job(id, "default.dummy").unwrap();

    registry.remove_node(id);
    assert!(registry.find_job("default.dummy").is_err());
    assert!(registry.nodes().is_empty());
}

#[test]
fn queries_span_nodes() {
    let registry = Registry::new();
    let a = identified(&registry, "a", "http://a:5000");
    let b = identified(&registry, "b", "http://b:5000");
    registry.add_job(a, "default.web").unwrap();
    registry.add_job(b, "default.web").unwrap();
    registry.add_job(b, "batch.worker").unwrap();

    assert_eq!(registry.nodes().len(), 2);
    assert_eq!(registry.find_job("default.web").unwrap().len(), 2);

    let jobs = registry.jobs();
    assert_eq!(jobs["default.web"].as_array().unwrap().len(), 2);
    assert_eq!(jobs["batch.worker"].as_array().unwrap().len(), 1);

    let sessions = registry.sessions(Some("b"));
    assert!(sessions["batch"]["batch.worker"].is_array());
    assert!(sessions["default"]["default.web"].is_array());
    let sessions_a = registry.sessions(Some("a"));
    assert!(sessions_a["batch"].is_null());

    assert_eq!(registry.find_session("batch").len(), 1);
}

#[test]
fn dispatch_echoes_msgid() {
    let registry = Registry::new();
    let id = registry.add_node();
    let reply = registry.dispatch(
        id,
        &LookupMessage::Identify {
            msgid: "m7".into(),
            name: "a".into(),
            origin: "http://a:5000".into(),
            version: "0.1.0".into(),
        },
    );
    assert!(reply.is_ok());
    assert_eq!(reply.msgid(), Some("m7"));

    let reply = registry.dispatch(
        id,
        &LookupMessage::RegisterProcess {
            msgid: "m8".into(),
            job_name: "default.ghost".into(),
            pid: 1,
        },
    );
    assert!(!reply.is_ok());
    assert_eq!(reply.msgid(), Some("m8"));
}

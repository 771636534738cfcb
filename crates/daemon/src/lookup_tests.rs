// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn load_event_becomes_register_job() {
    let msg = registration_for("load", &json!({"name": "default.dummy"})).unwrap();
    match msg {
        LookupMessage::RegisterJob { job_name, .. } => assert_eq!(job_name, "default.dummy"),
        other => panic!("unexpected message: {other:?}"),
    }
}

#[test]
fn spawn_and_exit_carry_the_pid() {
    let msg = registration_for("spawn", &json!({"name": "default.dummy", "pid": 4})).unwrap();
    match msg {
        LookupMessage::RegisterProcess { job_name, pid, .. } => {
            assert_eq!(job_name, "default.dummy");
            assert_eq!(pid, 4);
        }
        other => panic!("unexpected message: {other:?}"),
    }

    let msg = registration_for("exit", &json!({"name": "default.dummy", "pid": 4})).unwrap();
    assert!(matches!(msg, LookupMessage::UnregisterProcess { pid: 4, .. }));
}

#[test]
fn unrelated_events_map_to_nothing() {
    assert!(registration_for("reap", &json!({"name": "default.dummy", "pid": 1})).is_none());
    assert!(registration_for("spawn", &json!({"pid": 1})).is_none());
}

#[test]
fn msgids_are_unique() {
    let a = msgid();
    let b = msgid();
    assert_ne!(a, b);
    assert_eq!(a.len(), 12);
}

#[tokio::test]
async fn event_tap_unsubscribes_on_drop() {
    let manager = Manager::new();
    {
        let (_tap, _rx) = EventTap::install(&manager);
        assert_eq!(manager.events().subscriber_count("load"), 1);
        assert_eq!(manager.events().subscriber_count("exit"), 1);
    }
    assert_eq!(manager.events().subscriber_count("load"), 0);
    assert_eq!(manager.events().subscriber_count("exit"), 0);
    manager.stop().await;
}

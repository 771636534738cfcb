// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn process_id_is_ordered_and_monotonic() {
    let first = ProcessId(1);
    let second = first.next();
    assert_eq!(second, ProcessId(2));
    assert!(first < second);
}

#[test]
fn process_id_serializes_as_bare_number() {
    let json = serde_json::to_string(&ProcessId(42)).unwrap();
    assert_eq!(json, "42");

    let parsed: ProcessId = serde_json::from_str("42").unwrap();
    assert_eq!(parsed, ProcessId(42));
}

#[test]
fn stats_skip_empty_children() {
    let stats = ProcessStats { os_pid: 7, ..Default::default() };
    let json = serde_json::to_value(&stats).unwrap();
    assert!(json.get("children").is_none());
}

#[test]
fn info_round_trips() {
    let info = ProcessInfo {
        pid: ProcessId(3),
        os_pid: 1234,
        name: JobName::new("default", "dummy"),
        cmd: "./dummy.py".into(),
        args: vec!["-v".into()],
        once: false,
        active: true,
    };
    let json = serde_json::to_string(&info).unwrap();
    let parsed: ProcessInfo = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, info);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gaffer_core::config::JobConfig;
use gaffer_core::test_support::channel_listener;
use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout;

fn name() -> JobName {
    JobName::new("default", "dummy")
}

fn data_bytes(payload: &Value) -> Vec<u8> {
    decode_stream_data(payload["data"].as_str().expect("data field missing"))
}

fn data_text(payload: &Value) -> String {
    String::from_utf8(data_bytes(payload)).expect("non-utf8 stream data")
}

fn spawn_config(config: &JobConfig) -> (Arc<ProcessHandle>, ExitWatch) {
    ProcessHandle::spawn(
        ProcessId(1),
        name(),
        config,
        config.env.clone(),
        false,
        Duration::from_secs(1),
    )
    .expect("spawn failed")
}

#[tokio::test]
async fn captures_stdout_under_its_label() {
    let config = JobConfig::builder("dummy", "echo hello")
        .shell(true)
        .redirect_output(["stdout"])
        .build();
    let (handle, exit) = spawn_config(&config);

    let (listener, mut rx) = channel_listener();
    handle.monitor_io("stdout", listener).unwrap();

    let (topic, payload) = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no output")
        .expect("emitter closed");
    assert_eq!(topic, "stdout");
    assert_eq!(payload["event"], "stdout");
    assert_eq!(payload["pid"], 1);
    assert!(data_text(&payload).contains("hello"));

    let (status, signal) = timeout(Duration::from_secs(5), exit).await.unwrap().unwrap();
    assert_eq!((status, signal), (0, 0));
}

#[tokio::test]
async fn exit_code_is_reported() {
    let config = JobConfig::builder("dummy", "exit 3").shell(true).build();
    let (_handle, exit) = spawn_config(&config);
    let (status, signal) = timeout(Duration::from_secs(5), exit).await.unwrap().unwrap();
    assert_eq!(status, 3);
    assert_eq!(signal, 0);
}

#[tokio::test]
async fn sigkill_is_reported_as_signal() {
    let config = JobConfig::builder("dummy", "sleep 60").shell(true).build();
    let (handle, exit) = spawn_config(&config);
    handle.kill(Signal::SIGKILL);
    let (_, signal) = timeout(Duration::from_secs(5), exit).await.unwrap().unwrap();
    assert_eq!(signal, 9);
}

#[tokio::test]
async fn stdin_round_trip() {
    let config = JobConfig::builder("dummy", "cat")
        .shell(true)
        .redirect_input(true)
        .redirect_output(["stdout"])
        .build();
    let (handle, _exit) = spawn_config(&config);

    let (listener, mut rx) = channel_listener();
    handle.monitor_io("stdout", listener).unwrap();
    handle.write(b"ping\n".to_vec()).unwrap();

    let (_, payload) = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no echo")
        .expect("emitter closed");
    assert_eq!(data_text(&payload), "ping\n");
    handle.stop();
}

#[tokio::test]
async fn binary_output_survives_framing() {
    // bytes that are not valid utf-8 must come through untouched
    let config = JobConfig::builder("dummy", r"printf '\377\000\001\376'")
        .shell(true)
        .redirect_output(["stdout"])
        .build();
    let (handle, _exit) = spawn_config(&config);

    let (listener, mut rx) = channel_listener();
    handle.monitor_io("stdout", listener).unwrap();

    let (_, payload) = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no output")
        .expect("emitter closed");
    assert_eq!(data_bytes(&payload), vec![0xff, 0x00, 0x01, 0xfe]);
}

#[test]
fn stream_data_codec_round_trips() {
    let raw: Vec<u8> = (0..=255).collect();
    assert_eq!(decode_stream_data(&encode_stream_data(&raw)), raw);
    assert!(decode_stream_data("not base64!").is_empty());
}

#[tokio::test]
async fn write_without_redirect_input_fails() {
    let config = JobConfig::builder("dummy", "sleep 60").shell(true).build();
    let (handle, _exit) = spawn_config(&config);
    assert_eq!(handle.write(b"x".to_vec()), Err(StreamError::NotWritable));
    handle.kill(Signal::SIGKILL);
}

#[tokio::test]
async fn custom_stream_round_trip_on_fd3() {
    // child reads a line from fd 3 and echoes it back on fd 3
    let config = JobConfig::builder("dummy", "read -r line <&3; printf '%s' \"got:$line\" >&3")
        .shell(true)
        .custom_streams(["ctl"])
        .build();
    let (handle, exit) = spawn_config(&config);

    let (listener, mut rx) = channel_listener();
    handle.monitor_io("ctl", listener).unwrap();
    handle.write_stream("ctl", b"hello\n".to_vec()).unwrap();

    let (topic, payload) = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no custom stream data")
        .expect("emitter closed");
    assert_eq!(topic, "ctl");
    assert_eq!(data_text(&payload), "got:hello");

    let (status, _) = timeout(Duration::from_secs(5), exit).await.unwrap().unwrap();
    assert_eq!(status, 0);
}

#[tokio::test]
async fn unknown_stream_labels_fail() {
    let config = JobConfig::builder("dummy", "sleep 60")
        .shell(true)
        .redirect_output(["stdout"])
        .build();
    let (handle, _exit) = spawn_config(&config);

    let (listener, _rx) = channel_listener();
    assert!(matches!(
        handle.monitor_io("nope", listener),
        Err(StreamError::StreamNotFound)
    ));
    assert_eq!(
        handle.write_stream("nope", b"x".to_vec()),
        Err(StreamError::StreamNotFound)
    );
    handle.kill(Signal::SIGKILL);
}

#[tokio::test]
async fn info_reflects_liveness() {
    let config = JobConfig::builder("dummy", "sleep 60").shell(true).build();
    let (handle, exit) = spawn_config(&config);

    let info = handle.info();
    assert_eq!(info.pid, ProcessId(1));
    assert!(info.active);
    assert_eq!(info.os_pid, handle.os_pid);

    handle.kill(Signal::SIGKILL);
    let _ = timeout(Duration::from_secs(5), exit).await.unwrap();
    assert!(!handle.info().active);
}

#[tokio::test]
async fn stat_monitor_emits_samples() {
    let config = JobConfig::builder("dummy", "sleep 60").shell(true).build();
    let (handle, _exit) = spawn_config(&config);

    let (listener, mut rx) = channel_listener();
    let id = handle.monitor(listener);

    let (topic, payload) = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no stat sample")
        .expect("emitter closed");
    assert_eq!(topic, "stat");
    assert_eq!(payload["event"], "stat");
    assert_eq!(payload["os_pid"], handle.os_pid);

    handle.unmonitor(id);
    handle.kill(Signal::SIGKILL);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::process::decode_stream_data;
use gaffer_core::test_support::sleeper_config;
use serde_json::json;
use std::time::Duration;
use tokio::time::timeout;

struct DenyAll;

impl Authorizer for DenyAll {
    fn can_read(&self, _job: &JobName) -> bool {
        false
    }

    fn can_manage(&self, _job: &JobName) -> bool {
        false
    }

    fn can_manage_all(&self) -> bool {
        false
    }
}

fn hub(manager: &Manager) -> Arc<Hub> {
    Hub::new(manager.clone(), Arc::new(AllowAll))
}

#[tokio::test]
async fn events_topic_forwards_manager_events() {
    let manager = Manager::new();
    let hub = hub(&manager);

    let mut rx = hub.subscribe("EVENTS").unwrap();
    manager.publish("spawn", json!({ "name": "default.dummy" }));

    let (topic, payload) = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(topic, "EVENTS");
    assert_eq!(payload["event"], "spawn");
    manager.stop().await;
}

#[tokio::test]
async fn refcount_activates_once_and_deactivates_last() {
    let manager = Manager::new();
    let hub = hub(&manager);

    let _a = hub.subscribe("EVENTS:job").unwrap();
    let _b = hub.subscribe("EVENTS:job").unwrap();
    assert_eq!(hub.refs("EVENTS:job"), 2);
    assert_eq!(manager.events().subscriber_count("job"), 1);

    hub.unsubscribe("EVENTS:job");
    assert_eq!(hub.refs("EVENTS:job"), 1);
    assert_eq!(manager.events().subscriber_count("job"), 1);

    hub.unsubscribe("EVENTS:job");
    assert_eq!(hub.refs("EVENTS:job"), 0);
    assert_eq!(manager.events().subscriber_count("job"), 0);
    manager.stop().await;
}

#[tokio::test]
async fn job_topic_sees_lifecycle_events() {
    let manager = Manager::new();
    let hub = hub(&manager);

    manager.load(sleeper_config("dummy", 0), None, None, false).unwrap();
    let mut rx = hub.subscribe("JOB:default.dummy").unwrap();

    manager.scale(&JobName::new("default", "dummy"), "+1").unwrap();
    // spawn publishes job.default.dummy.spawn
    let (topic, payload) = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(topic, "JOB:default.dummy");
    assert_eq!(payload["event"], "job.default.dummy.spawn");
    manager.stop().await;
}

#[tokio::test]
async fn stream_topic_defaults_to_first_redirected_output() {
    let manager = Manager::new();
    let hub = hub(&manager);

    let config = gaffer_core::config::JobConfig::builder("echoer", "echo streamed; sleep 60")
        .shell(true)
        .numprocesses(1)
        .redirect_output(["stdout", "stderr"])
        .graceful_timeout(1.0)
        .build();
    manager.load(config, None, None, true).unwrap();
    let pid = manager.pids(None).unwrap()[0];

    let mut rx = hub.subscribe(&format!("STREAM:{pid}")).unwrap();
    let (_, payload) = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(payload["event"], "stdout");
    let data = decode_stream_data(payload["data"].as_str().unwrap());
    assert!(String::from_utf8_lossy(&data).contains("streamed"));
    manager.stop().await;
}

#[tokio::test]
async fn stats_topic_requires_live_process() {
    let manager = Manager::new();
    let hub = hub(&manager);
    let err = hub.subscribe("STATS:99").unwrap_err();
    assert_eq!(err.errno, 404);
    manager.stop().await;
}

#[tokio::test]
async fn denied_topics_are_forbidden() {
    let manager = Manager::new();
    let hub = Hub::new(manager.clone(), Arc::new(DenyAll));
    manager.load(sleeper_config("dummy", 0), None, None, false).unwrap();

    for raw in ["EVENTS", "JOB:default.dummy", "STATS:default.dummy"] {
        let err = hub.subscribe(raw).unwrap_err();
        assert_eq!(err.errno, 403, "{raw} should be forbidden");
    }
    manager.stop().await;
}

#[tokio::test]
async fn invalid_topics_are_bad_requests() {
    let manager = Manager::new();
    let hub = hub(&manager);
    assert_eq!(hub.subscribe("NOISE:1").unwrap_err().errno, 400);
    manager.stop().await;
}

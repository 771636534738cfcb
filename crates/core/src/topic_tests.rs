// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn bare_events_is_wildcard() {
    assert_eq!(Topic::parse("EVENTS").unwrap(), Topic::Events { prefix: ".".into() });
    assert_eq!(Topic::parse("events").unwrap(), Topic::Events { prefix: ".".into() });
}

#[test]
fn events_with_prefix() {
    assert_eq!(
        Topic::parse("EVENTS:job.default").unwrap(),
        Topic::Events { prefix: "job.default".into() }
    );
}

#[test]
fn job_topic_parses_fq_name() {
    let topic = Topic::parse("JOB:default.dummy").unwrap();
    assert_eq!(topic, Topic::Job { name: JobName::new("default", "dummy") });
}

#[test]
fn process_topic_requires_digits() {
    assert_eq!(Topic::parse("PROCESS:42").unwrap(), Topic::Process { pid: ProcessId(42) });
    assert!(Topic::parse("PROCESS:web.worker").is_err());
    assert!(Topic::parse("PROCESS:").is_err());
}

#[test]
fn stats_target_discriminates_pid_from_job() {
    assert_eq!(Topic::parse("STATS:7").unwrap(), Topic::ProcessStats { pid: ProcessId(7) });
    assert_eq!(
        Topic::parse("STATS:default.dummy").unwrap(),
        Topic::JobStats { name: JobName::new("default", "dummy") }
    );
}

#[parameterized(
    bare_pid = { "STREAM:3", 3, None },
    labeled = { "STREAM:3.stderr", 3, Some("stderr") },
)]
fn stream_topics(raw: &str, pid: u64, label: Option<&str>) {
    assert_eq!(
        Topic::parse(raw).unwrap(),
        Topic::Stream { pid: ProcessId(pid), label: label.map(Into::into) }
    );
}

#[parameterized(
    unknown_source = { "NOISE:1" },
    stream_without_target = { "STREAM" },
    stream_bad_pid = { "STREAM:web.stdout" },
    job_without_target = { "JOB" },
    stats_without_target = { "STATS:" },
)]
fn invalid_topics_are_rejected(raw: &str) {
    let err = Topic::parse(raw).unwrap_err();
    assert_eq!(err.errno, 400);
}

#[parameterized(
    events = { "EVENTS" },
    events_prefix = { "EVENTS:job.default" },
    job = { "JOB:default.dummy" },
    process = { "PROCESS:9" },
    stats_pid = { "STATS:9" },
    stats_job = { "STATS:default.dummy" },
    stream = { "STREAM:9" },
    stream_label = { "STREAM:9.stderr" },
)]
fn display_round_trips(raw: &str) {
    let topic = Topic::parse(raw).unwrap();
    assert_eq!(Topic::parse(&topic.to_string()).unwrap(), topic);
}

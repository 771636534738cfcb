// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    qualified = { "web.worker", "web", "worker" },
    bare = { "worker", "default", "worker" },
    slash_alias = { "web/worker", "web", "worker" },
    inner_dots = { "web.worker.http", "web", "worker.http" },
)]
fn parse_splits_on_first_separator(raw: &str, session: &str, name: &str) {
    let parsed = JobName::parse(raw);
    assert_eq!(parsed.session(), session);
    assert_eq!(parsed.name(), name);
}

#[test]
fn display_is_fully_qualified() {
    assert_eq!(JobName::new("web", "worker").to_string(), "web.worker");
}

#[test]
fn scoped_prefers_explicit_session() {
    let name = JobName::scoped("worker", Some("web"));
    assert_eq!(name.to_string(), "web.worker");

    let name = JobName::scoped("web.worker", None);
    assert_eq!(name.to_string(), "web.worker");
}

#[test]
fn serde_round_trips_as_string() {
    let name = JobName::new("web", "worker");
    let json = serde_json::to_string(&name).unwrap();
    assert_eq!(json, "\"web.worker\"");

    let parsed: JobName = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, name);
}

#[test]
fn unique_job_name_appends_monotonic_suffix() {
    let taken = ["dummy", "dummy.1", "dummy.2"];
    let name = unique_job_name("dummy", |candidate| taken.contains(&candidate));
    assert_eq!(name, "dummy.3");
}

#[test]
fn unique_job_name_keeps_free_names() {
    assert_eq!(unique_job_name("dummy", |_| false), "dummy");
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use yare::parameterized;

#[parameterized(
    lower = { "hup" },
    upper = { "HUP" },
    prefixed = { "SIGHUP" },
    mixed = { "SigHup" },
    numeric = { "1" },
)]
fn sighup_spellings(raw: &str) {
    assert_eq!(parse_signal(raw).unwrap(), Signal::SIGHUP);
}

#[parameterized(
    term = { "term", Signal::SIGTERM },
    kill = { "KILL", Signal::SIGKILL },
    usr1 = { "SIGUSR1", Signal::SIGUSR1 },
    quit = { "3", Signal::SIGQUIT },
)]
fn common_signals(raw: &str, expected: Signal) {
    assert_eq!(parse_signal(raw).unwrap(), expected);
}

#[parameterized(
    empty = { "" },
    unknown = { "SIGBOGUS" },
    out_of_range = { "4096" },
)]
fn unknown_signals_are_bad_requests(raw: &str) {
    let err = parse_signal(raw).unwrap_err();
    assert_eq!(err.errno, 400);
    assert_eq!(err.reason, "signal_not_supported");
}

#[test]
fn json_value_forms() {
    assert_eq!(parse_signal_value(&json!("usr2")).unwrap(), Signal::SIGUSR2);
    assert_eq!(parse_signal_value(&json!(15)).unwrap(), Signal::SIGTERM);
    assert!(parse_signal_value(&json!(["no"])).is_err());
    assert!(parse_signal_value(&json!(1.5)).is_err());
}

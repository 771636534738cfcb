// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    zero = { 0, "0:00.00" },
    sub_second = { 340, "0:00.34" },
    seconds = { 12_500, "0:12.50" },
    minutes = { 83_000, "1:23.00" },
    wraps_hours = { 3_600_000, "0:00.00" },
)]
fn ctime_formatting(cpu_ms: u64, expected: &str) {
    assert_eq!(format_ctime(cpu_ms), expected);
}

#[test]
fn sample_sees_own_process() {
    let mut sys = System::new();
    let me = std::process::id();
    let stats = sample(&mut sys, me).expect("own process must exist");
    assert_eq!(stats.os_pid, me);
    assert!(stats.mem_rss > 0);
    assert!(!stats.cmdline.is_empty());
}

#[test]
fn sample_returns_none_for_dead_pid() {
    let mut sys = System::new();
    // pid_max on Linux defaults well below this
    assert!(sample(&mut sys, 4_000_000).is_none());
}

#[test]
fn own_nice_is_readable() {
    // default niceness of a test runner is 0 unless the harness was reniced
    let nice = process_nice(std::process::id());
    assert!((-20..=19).contains(&nice));
}

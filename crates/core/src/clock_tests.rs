// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_is_monotonic() {
    let clock = SystemClock;
    let a = clock.now();
    let b = clock.now();
    assert!(b >= a);
}

#[test]
fn fake_clock_only_moves_on_advance() {
    let clock = FakeClock::new();
    let a = clock.now();
    assert_eq!(clock.now(), a);

    clock.advance(Duration::from_secs(3));
    assert_eq!(clock.now(), a + Duration::from_secs(3));
}

#[test]
fn fake_clock_advances_epoch_ms() {
    let clock = FakeClock::new();
    let before = clock.epoch_ms();
    clock.advance(Duration::from_millis(1500));
    assert_eq!(clock.epoch_ms(), before + 1500);
}

#[test]
fn fake_clock_clones_share_state() {
    let clock = FakeClock::new();
    let other = clock.clone();
    clock.advance(Duration::from_secs(1));
    assert_eq!(clock.now(), other.now());
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

use airboot_common::heartbeat::{Heartbeat, BOOTLOADER_BLINK_MS};

#[test]
fn test_first_poll_turns_led_on() {
    let mut hb = Heartbeat::new(BOOTLOADER_BLINK_MS);
    assert_eq!(hb.poll(0), Some(true));
}

#[test]
fn test_toggles_once_per_period() {
    let mut hb = Heartbeat::new(500);
    assert_eq!(hb.poll(10), Some(true));
    assert_eq!(hb.poll(11), None);
    assert_eq!(hb.poll(509), None);
    assert_eq!(hb.poll(510), Some(false));
    assert_eq!(hb.poll(1010), Some(true));
}

#[test]
fn test_late_poll_does_not_burst() {
    let mut hb = Heartbeat::new(500);
    hb.poll(0);
    assert_eq!(hb.poll(5000), Some(false));
    assert_eq!(hb.poll(5001), None);
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Non-blocking LED pacing for the control loop.

/// Toggle period of the status LED while in bootloader mode.
pub const BOOTLOADER_BLINK_MS: u64 = 500;

/// Toggle period of the permanent failure indication.
pub const FAILURE_BLINK_MS: u32 = 100;

pub struct Heartbeat {
    period_ms: u64,
    next_toggle_ms: u64,
    on: bool,
}

impl Heartbeat {
    pub const fn new(period_ms: u64) -> Self {
        Self {
            period_ms,
            next_toggle_ms: 0,
            on: false,
        }
    }

    /// Returns the new LED state when it is time to toggle.
    pub fn poll(&mut self, now_ms: u64) -> Option<bool> {
        if now_ms < self.next_toggle_ms {
            return None;
        }
        self.next_toggle_ms = now_ms + self.period_ms;
        self.on = !self.on;
        Some(self.on)
    }
}

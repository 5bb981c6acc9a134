// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Shared core of the airboot OTA bootloader.
//!
//! This crate supports both `no_std` (embedded) and `std` (host) environments:
//! - Default: `no_std` mode, hardware-free logic only
//! - `std` feature: Enables `std` support for host tools
//! - `embedded` feature: RP2040 flash driver, reboot controller and USB link

#![cfg_attr(not(feature = "std"), no_std)]

pub mod boot_fsm;
pub mod config_store;
pub mod crc32;
pub mod heartbeat;
pub mod layout;
pub mod link;
pub mod protocol;
pub mod sector;
pub mod server;
pub mod session;

#[cfg(feature = "embedded")]
pub mod flash;
#[cfg(feature = "embedded")]
pub mod reboot;
#[cfg(feature = "embedded")]
pub mod usb_link;

// Re-export commonly used types
pub use boot_fsm::{decide_boot, BootDecision, RebootKind, RunMode, ScratchRegisters};
pub use config_store::{ConfigError, ConfigStore, WifiCredentials};
pub use layout::FlashLayout;
pub use link::{ConnId, Link, LinkError, NetEvent};
pub use protocol::{ResponseCode, TransferHeader, TransferResponse};
pub use protocol::{APP_ADDR, APP_MAX_SIZE, APP_OFFSET, CONFIG_OFFSET, FLASH_BASE, OTA_PORT};
pub use sector::{FlashError, RetryPolicy, SectorFlash};
pub use server::{Dispatch, OtaServer, ServerConfig};
pub use session::{Progress, SessionError, TransferSession};

#[cfg(feature = "embedded")]
use embedded_hal::delay::DelayNs;
#[cfg(feature = "embedded")]
use embedded_hal::digital::OutputPin;
#[cfg(feature = "embedded")]
use rp2040_hal as hal;

#[cfg(feature = "embedded")]
pub type LedPin =
    hal::gpio::Pin<hal::gpio::bank0::Gpio25, hal::gpio::FunctionSioOutput, hal::gpio::PullDown>;

/// Blink an LED a specified number of times.
#[cfg(feature = "embedded")]
pub fn blink(led: &mut impl OutputPin, timer: &mut impl DelayNs, count: u32, period_ms: u32) {
    for _ in 0..count {
        led.set_high().ok();
        timer.delay_ms(period_ms);
        led.set_low().ok();
        timer.delay_ms(period_ms);
    }
}

/// Permanent failure indication. Never returns.
#[cfg(feature = "embedded")]
pub fn blink_forever(led: &mut impl OutputPin, timer: &mut impl DelayNs, period_ms: u32) -> ! {
    loop {
        blink(led, timer, 1, period_ms);
    }
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! airboot bootloader for RP2040: boot arbitration and OTA update mode.

#![no_std]
#![no_main]

mod boot;
mod peripherals;
mod update;

use airboot_common::boot_fsm::{decide_boot, BootDecision};
use airboot_common::heartbeat::FAILURE_BLINK_MS;
use airboot_common::layout::FlashLayout;
use airboot_common::reboot::{self, WatchdogScratch};
use defmt_rtt as _;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::InputPin;
use panic_probe as _;

defmt::timestamp!("{=u64:us}", { 0 });

use cortex_m_rt::entry;

#[unsafe(link_section = ".boot2")]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_GENERIC_03H;

/// Settling time for the override pin pull-up.
const OVERRIDE_SETTLE_MS: u32 = 1;

#[entry]
fn main() -> ! {
    defmt::println!("Bootloader init");

    let mut p = peripherals::init();
    p.timer.delay_ms(OVERRIDE_SETTLE_MS);

    let layout = FlashLayout::DEFAULT;
    let image_end = reboot::image_end();
    let override_asserted = p.override_pin.is_low().unwrap_or(false);

    let decision = decide_boot(&layout, image_end, override_asserted, &mut WatchdogScratch);
    defmt::println!(
        "Image ends at 0x{:08x}, override={}, decision={}",
        image_end,
        override_asserted,
        decision
    );

    match decision {
        BootDecision::Halt => {
            defmt::println!(
                "Bootloader image exceeds its {}KB region, halting",
                layout.bootloader_size / 1024
            );
            airboot_common::blink_forever(&mut p.led_pin, &mut p.timer, FAILURE_BLINK_MS)
        }
        BootDecision::EnterBootloader => update::enter_update_mode(&mut p),
        BootDecision::JumpToApplication => unsafe { boot::jump_to_application(&layout) },
    }
}

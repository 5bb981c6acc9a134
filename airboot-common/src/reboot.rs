// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Reboot controller and running-mode detection for RP2040.
//!
//! The boot signal lives in watchdog scratch registers 0 and 1, which keep
//! their content across a system reset.

use crate::boot_fsm::{RebootKind, RunMode, ScratchRegisters};
use crate::layout::FlashLayout;

const WATCHDOG_BASE: u32 = 0x4005_8000;
const WATCHDOG_SCRATCH0: *mut u32 = (WATCHDOG_BASE + 0x0C) as *mut u32;
const WATCHDOG_SCRATCH1: *mut u32 = (WATCHDOG_BASE + 0x10) as *mut u32;

unsafe extern "C" {
    static __sidata: u32;
    static __sdata: u32;
    static __edata: u32;
}

macro_rules! linker_addr {
    ($sym:ident) => {
        unsafe { &$sym as *const u32 as u32 }
    };
}

/// Watchdog scratch words 0 and 1.
pub struct WatchdogScratch;

impl ScratchRegisters for WatchdogScratch {
    fn read(&self) -> [u32; 2] {
        unsafe {
            [
                WATCHDOG_SCRATCH0.read_volatile(),
                WATCHDOG_SCRATCH1.read_volatile(),
            ]
        }
    }

    fn write(&mut self, words: [u32; 2]) {
        unsafe {
            WATCHDOG_SCRATCH0.write_volatile(words[0]);
            WATCHDOG_SCRATCH1.write_volatile(words[1]);
        }
    }
}

/// Absolute address one past the last byte of the running image in flash:
/// the load address of `.data` plus its size.
pub fn image_end() -> u32 {
    let data_len = linker_addr!(__edata) - linker_addr!(__sdata);
    linker_addr!(__sidata) + data_len
}

pub fn running_mode() -> RunMode {
    RunMode::detect(&FlashLayout::DEFAULT, image_end())
}

pub fn running_in_bootloader() -> bool {
    running_mode() == RunMode::Bootloader
}

/// Leave `kind`'s scratch pattern behind and reset the chip.
pub fn reboot(kind: RebootKind) -> ! {
    WatchdogScratch.write(kind.scratch_words());
    cortex_m::asm::dsb();
    cortex_m::peripheral::SCB::sys_reset();
}

/// Unconditional reset with the boot signal cleared.
pub fn reboot_now() -> ! {
    reboot(RebootKind::Plain)
}

/// Arm the boot signal, then reset.
pub fn reboot_into_bootloader() -> ! {
    reboot(RebootKind::IntoBootloader)
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! RP2040 flash driver built on the boot ROM routines.
//!
//! Both the bootloader and the application execute in place from the same
//! flash chip, so erase/program must run with XIP disabled:
//!   1. connect_internal_flash()
//!   2. flash_exit_xip()
//!   3. flash_range_erase() then flash_range_program()
//!   4. flash_flush_cache()
//!   5. flash_enter_cmd_xip()
//!
//! All code executing during steps 1-5 must run from RAM, not flash.
//! We use `#[link_section = ".data"]` to place the critical function in RAM,
//! and pre-resolve all ROM function pointers at init time. Interrupts are
//! masked for the window and, when the second core has opted in through a
//! [`CoreLockout`], it is paused as well.

use crate::protocol::{FLASH_BASE, FLASH_SECTOR_SIZE, FLASH_SIZE};
use crate::sector::{Sector, SectorFlash};

// ROM function pointer types
type RomFnVoid = unsafe extern "C" fn();
type RomFnErase = unsafe extern "C" fn(u32, usize, u32, u8);
type RomFnProgram = unsafe extern "C" fn(u32, *const u8, usize);

const SECTOR_ERASE_CMD: u8 = 0x20;

static mut ROM_CONNECT_INTERNAL_FLASH: RomFnVoid = dummy_void;
static mut ROM_FLASH_EXIT_XIP: RomFnVoid = dummy_void;
static mut ROM_FLASH_RANGE_ERASE: RomFnErase = dummy_erase;
static mut ROM_FLASH_RANGE_PROGRAM: RomFnProgram = dummy_program;
static mut ROM_FLASH_FLUSH_CACHE: RomFnVoid = dummy_void;
static mut ROM_FLASH_ENTER_CMD_XIP: RomFnVoid = dummy_void;

unsafe extern "C" fn dummy_void() {}
unsafe extern "C" fn dummy_erase(_: u32, _: usize, _: u32, _: u8) {}
unsafe extern "C" fn dummy_program(_: u32, _: *const u8, _: usize) {}

/// Look up a ROM function by its two-character tag.
/// ROM table pointer at 0x14 and lookup function at 0x18 are 16-bit halfword pointers.
unsafe fn rom_func_lookup(tag: &[u8; 2]) -> usize {
    let fn_table = *(0x14 as *const u16) as *const u16;
    let lookup: unsafe extern "C" fn(*const u16, u32) -> usize =
        core::mem::transmute::<usize, unsafe extern "C" fn(*const u16, u32) -> usize>(
            *(0x18 as *const u16) as usize,
        );
    let code = u16::from_le_bytes(*tag) as u32;
    lookup(fn_table, code)
}

/// Resolve the ROM flash routines. Requires XIP to be active.
fn resolve_rom_functions() {
    unsafe {
        ROM_CONNECT_INTERNAL_FLASH =
            core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"IF"));
        ROM_FLASH_EXIT_XIP = core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"EX"));
        ROM_FLASH_RANGE_ERASE =
            core::mem::transmute::<usize, RomFnErase>(rom_func_lookup(b"RE"));
        ROM_FLASH_RANGE_PROGRAM =
            core::mem::transmute::<usize, RomFnProgram>(rom_func_lookup(b"RP"));
        ROM_FLASH_FLUSH_CACHE = core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"FC"));
        ROM_FLASH_ENTER_CMD_XIP =
            core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"CX"));
    }
}

/// Erase one sector and program it, entirely from RAM.
///
/// # Safety
/// ROM pointers must be resolved, interrupts must already be masked and no
/// other core may be fetching from flash.
#[link_section = ".data"]
#[inline(never)]
unsafe fn erase_and_program_sector(offset: u32, data: *const u8) {
    ROM_CONNECT_INTERNAL_FLASH();
    ROM_FLASH_EXIT_XIP();
    ROM_FLASH_RANGE_ERASE(
        offset,
        FLASH_SECTOR_SIZE as usize,
        FLASH_SECTOR_SIZE,
        SECTOR_ERASE_CMD,
    );
    ROM_FLASH_RANGE_PROGRAM(offset, data, FLASH_SECTOR_SIZE as usize);
    ROM_FLASH_FLUSH_CACHE();
    ROM_FLASH_ENTER_CMD_XIP();
}

/// Coordination with a second execution unit for the erase/program window.
pub trait CoreLockout {
    /// Park the other core somewhere that does not fetch from flash.
    fn pause_other(&mut self);
    fn resume_other(&mut self);
}

/// Single-core operation: nothing to coordinate.
pub struct NoLockout;

impl CoreLockout for NoLockout {
    fn pause_other(&mut self) {}
    fn resume_other(&mut self) {}
}

/// The on-board QSPI flash, addressed by flash-relative offsets.
pub struct Rp2040Flash<L: CoreLockout = NoLockout> {
    lockout: L,
}

impl Rp2040Flash<NoLockout> {
    pub fn new() -> Self {
        Self::with_lockout(NoLockout)
    }
}

impl Default for Rp2040Flash<NoLockout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: CoreLockout> Rp2040Flash<L> {
    pub fn with_lockout(lockout: L) -> Self {
        resolve_rom_functions();
        Self { lockout }
    }
}

impl<L: CoreLockout> SectorFlash for Rp2040Flash<L> {
    fn capacity(&self) -> u32 {
        FLASH_SIZE
    }

    fn read(&self, offset: u32, buf: &mut [u8]) {
        let base = FLASH_BASE + offset;
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = unsafe { ((base + i as u32) as *const u8).read_volatile() };
        }
    }

    fn erase_and_program(&mut self, offset: u32, data: &Sector) {
        self.lockout.pause_other();
        cortex_m::interrupt::free(|_| unsafe {
            erase_and_program_sector(offset, data.as_ptr());
        });
        self.lockout.resume_other();
    }
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Partition of the flash address space into bootloader, application and
//! config regions.
//!
//! All offsets are relative to the start of flash (not XIP addresses) and
//! must be sector aligned.

use crate::protocol::{
    APP_MAX_SIZE, APP_OFFSET, BOOTLOADER_RESERVED_SIZE, CONFIG_OFFSET, FLASH_BASE,
    FLASH_SECTOR_SIZE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashLayout {
    /// Size of the region reserved for the bootloader, starting at offset 0.
    pub bootloader_size: u32,
    pub app_offset: u32,
    pub app_max_size: u32,
    pub config_offset: u32,
}

impl FlashLayout {
    /// Layout the bootloader and application images are linked against.
    pub const DEFAULT: Self = Self {
        bootloader_size: BOOTLOADER_RESERVED_SIZE,
        app_offset: APP_OFFSET,
        app_max_size: APP_MAX_SIZE,
        config_offset: CONFIG_OFFSET,
    };

    /// Checks alignment and that the three regions are disjoint and ordered.
    pub const fn is_valid(&self) -> bool {
        let aligned = self.bootloader_size % FLASH_SECTOR_SIZE == 0
            && self.app_offset % FLASH_SECTOR_SIZE == 0
            && self.app_max_size % FLASH_SECTOR_SIZE == 0
            && self.config_offset % FLASH_SECTOR_SIZE == 0;
        aligned
            && self.bootloader_size <= self.app_offset
            && self.app_offset + self.app_max_size <= self.config_offset
    }

    /// Absolute XIP address of the application vector table.
    pub const fn app_addr(&self) -> u32 {
        FLASH_BASE + self.app_offset
    }

    pub const fn payload_fits(&self, size: u32) -> bool {
        size <= self.app_max_size
    }

    /// True when an image ending at `image_end` (absolute XIP address) stays
    /// inside the reserved bootloader region.
    pub const fn bootloader_fits(&self, image_end: u32) -> bool {
        image_end >= FLASH_BASE && image_end - FLASH_BASE <= self.bootloader_size
    }

    /// True when the image ending at `image_end` was linked below the
    /// application base, i.e. it is the bootloader rather than the app.
    pub const fn is_bootloader_image(&self, image_end: u32) -> bool {
        image_end <= self.app_addr()
    }
}

impl Default for FlashLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

const _: () = assert!(FlashLayout::DEFAULT.is_valid());

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Shared protocol types and flash layout constants for bootloader <-> host
//! communication.
//!
//! Every wire structure is encoded explicitly, field by field, in
//! little-endian order. Nothing here depends on the in-memory layout of a
//! Rust type.
//!
//! Transfer header (12 bytes):
//!
//! | offset | size | field                    |
//! |--------|------|--------------------------|
//! | 0      | 4    | magic `"OTA\n"`          |
//! | 4      | 4    | payload size (u32 LE)    |
//! | 8      | 4    | expected CRC-32 (u32 LE) |
//!
//! Transfer response (5 bytes): magic `"OTA\n"` followed by a one byte
//! [`ResponseCode`].

// --- Flash layout constants ---

pub const FLASH_BASE: u32 = 0x1000_0000;
pub const FLASH_SIZE: u32 = 2 * 1024 * 1024;

pub const FLASH_SECTOR_SIZE: u32 = 4096;
pub const FLASH_PAGE_SIZE: u32 = 256;

/// Flash reserved for the bootloader image, starting at `FLASH_BASE`.
/// Must match `linker_scripts/bootloader_rp2040.x` and `app_rp2040.x`.
pub const BOOTLOADER_RESERVED_SIZE: u32 = 352 * 1024;

pub const CONFIG_SIZE: u32 = FLASH_SECTOR_SIZE;
pub const CONFIG_OFFSET: u32 = FLASH_SIZE - CONFIG_SIZE;

pub const APP_OFFSET: u32 = BOOTLOADER_RESERVED_SIZE;
pub const APP_ADDR: u32 = FLASH_BASE + APP_OFFSET;
pub const APP_MAX_SIZE: u32 = FLASH_SIZE - BOOTLOADER_RESERVED_SIZE - CONFIG_SIZE;

const _: () = assert!(BOOTLOADER_RESERVED_SIZE % FLASH_SECTOR_SIZE == 0);
const _: () = assert!(CONFIG_OFFSET % FLASH_SECTOR_SIZE == 0);
const _: () = assert!(APP_OFFSET + APP_MAX_SIZE <= CONFIG_OFFSET);

// --- Reset-surviving signal ---

/// Watchdog scratch words 0 and 1 carry the "enter bootloader" request.
pub const BOOT_SIGNAL_MAGIC: u32 = 0x307A_6EB0;

/// GPIO sampled at reset; pulled up, asserted when low.
pub const BOOT_OVERRIDE_PIN: u8 = 15;

/// Delay between queueing a terminal response and resetting.
pub const REBOOT_DRAIN_DELAY_MS: u32 = 100;

// --- Transfer protocol ---

pub const OTA_PORT: u16 = 2222;
pub const OTA_MAGIC: [u8; 4] = *b"OTA\n";

pub const HEADER_LEN: usize = 12;
pub const RESPONSE_LEN: usize = 5;

/// Result code carried by a [`TransferResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResponseCode {
    Success = 0,
    StorageFull = 1,
    ChecksumFailed = 2,
    Rebooting = 3,
}

impl ResponseCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Success),
            1 => Some(Self::StorageFull),
            2 => Some(Self::ChecksumFailed),
            3 => Some(Self::Rebooting),
            _ => None,
        }
    }
}

/// Request sent by the host before the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferHeader {
    pub payload_size: u32,
    pub checksum: u32,
}

impl TransferHeader {
    pub fn new(payload_size: u32, checksum: u32) -> Self {
        Self {
            payload_size,
            checksum,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&OTA_MAGIC);
        buf[4..8].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Returns `None` when the magic does not match.
    pub fn decode(buf: &[u8; HEADER_LEN]) -> Option<Self> {
        if buf[0..4] != OTA_MAGIC {
            return None;
        }
        Some(Self {
            payload_size: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            checksum: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }
}

/// Answer sent by the device after the header and after verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferResponse {
    pub code: ResponseCode,
}

/// Why a response could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResponseDecodeError {
    #[error("bad response magic")]
    BadMagic,
    #[error("unknown response code {0}")]
    UnknownCode(u8),
}

impl TransferResponse {
    pub fn new(code: ResponseCode) -> Self {
        Self { code }
    }

    pub fn encode(&self) -> [u8; RESPONSE_LEN] {
        let mut buf = [0u8; RESPONSE_LEN];
        buf[0..4].copy_from_slice(&OTA_MAGIC);
        buf[4] = self.code as u8;
        buf
    }

    pub fn decode(buf: &[u8; RESPONSE_LEN]) -> Result<Self, ResponseDecodeError> {
        if buf[0..4] != OTA_MAGIC {
            return Err(ResponseDecodeError::BadMagic);
        }
        ResponseCode::from_u8(buf[4])
            .map(Self::new)
            .ok_or(ResponseDecodeError::UnknownCode(buf[4]))
    }
}

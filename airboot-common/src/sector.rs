// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Sector-granular flash access with verify-and-retry.
//!
//! Every write in this crate goes through [`write_sector`]: erase one
//! sector, program it, read it back and compare. A mismatch repeats the
//! whole erase+program cycle. With [`RetryPolicy::UNBOUNDED`] this loops
//! until the readback matches, which can hang on a worn-out sector.

use core::num::NonZeroU32;

use crate::protocol::FLASH_SECTOR_SIZE;

pub const SECTOR_LEN: usize = FLASH_SECTOR_SIZE as usize;

/// One erase unit worth of data.
pub type Sector = [u8; SECTOR_LEN];

const VERIFY_CHUNK: usize = 256;

/// Raw flash device seen through flash-relative offsets.
pub trait SectorFlash {
    /// Total addressable size in bytes.
    fn capacity(&self) -> u32;

    /// Read `buf.len()` bytes starting at `offset`.
    fn read(&self, offset: u32, buf: &mut [u8]);

    /// Erase the sector at `offset`, then program `data` into it.
    /// `offset` is sector aligned. Programming is not verified here.
    fn erase_and_program(&mut self, offset: u32, data: &Sector);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    #[error("offset {offset:#x} is not sector aligned")]
    Unaligned { offset: u32 },
    #[error("sector at {offset:#x} is outside the flash device")]
    OutOfBounds { offset: u32 },
    #[error("readback still mismatched after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

/// How many erase+program cycles [`write_sector`] may spend on one sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RetryPolicy {
    max_attempts: Option<NonZeroU32>,
}

impl RetryPolicy {
    /// Retry until the readback matches.
    pub const UNBOUNDED: Self = Self { max_attempts: None };

    /// Give up with [`FlashError::RetriesExhausted`] after `attempts` cycles.
    /// Zero is treated as one.
    pub const fn bounded(attempts: u32) -> Self {
        let max_attempts = match NonZeroU32::new(attempts) {
            Some(n) => n,
            None => NonZeroU32::MIN,
        };
        Self {
            max_attempts: Some(max_attempts),
        }
    }

    pub const fn max_attempts(&self) -> Option<u32> {
        match self.max_attempts {
            Some(n) => Some(n.get()),
            None => None,
        }
    }

    fn exhausted(&self, attempts: u32) -> bool {
        matches!(self.max_attempts, Some(max) if attempts >= max.get())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

/// Erase, program and verify one sector.
///
/// Returns the number of erase+program cycles it took.
pub fn write_sector<F: SectorFlash + ?Sized>(
    flash: &mut F,
    offset: u32,
    data: &Sector,
    policy: RetryPolicy,
) -> Result<u32, FlashError> {
    if offset % FLASH_SECTOR_SIZE != 0 {
        return Err(FlashError::Unaligned { offset });
    }
    if offset
        .checked_add(FLASH_SECTOR_SIZE)
        .map_or(true, |end| end > flash.capacity())
    {
        return Err(FlashError::OutOfBounds { offset });
    }

    let mut attempts = 0u32;
    loop {
        flash.erase_and_program(offset, data);
        attempts = attempts.saturating_add(1);

        if readback_matches(flash, offset, data) {
            return Ok(attempts);
        }
        if policy.exhausted(attempts) {
            return Err(FlashError::RetriesExhausted { attempts });
        }
    }
}

fn readback_matches<F: SectorFlash + ?Sized>(flash: &F, offset: u32, data: &Sector) -> bool {
    let mut chunk = [0u8; VERIFY_CHUNK];
    data.chunks(VERIFY_CHUNK).enumerate().all(|(i, expected)| {
        let got = &mut chunk[..expected.len()];
        flash.read(offset + (i * VERIFY_CHUNK) as u32, got);
        got == expected
    })
}

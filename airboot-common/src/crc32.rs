// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! CRC-32 (ISO HDLC): reflected polynomial 0xEDB88320, init 0xFFFFFFFF,
//! final XOR 0xFFFFFFFF, folded one 32-bit word at a time.
//!
//! Input is consumed as whole words, so a trailing partial word is padded
//! with zero bytes before it is folded in. For lengths that are a multiple
//! of four the result is the plain zlib CRC-32; otherwise it equals the
//! zlib CRC-32 of the data followed by `(4 - len % 4)` zero bytes. The
//! RP2040 DMA sniffer produces the same values.

use crc::{Crc, Digest, CRC_32_ISO_HDLC};

use crate::sector::SectorFlash;

pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

const WORD: usize = 4;
const FLASH_CHUNK: usize = 256;

/// Zero bytes needed to complete the last word of a `len`-byte input.
pub const fn tail_padding(len: usize) -> usize {
    (WORD - len % WORD) % WORD
}

/// Incremental word-padded CRC-32.
pub struct Checksum {
    digest: Digest<'static, u32>,
    len: usize,
}

impl Checksum {
    pub fn new() -> Self {
        Self {
            digest: CRC32.digest(),
            len: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
        self.len += data.len();
    }

    pub fn finalize(mut self) -> u32 {
        let pad = tail_padding(self.len);
        self.digest.update(&[0u8; WORD][..pad]);
        self.digest.finalize()
    }
}

impl Default for Checksum {
    fn default() -> Self {
        Self::new()
    }
}

/// CRC-32 of a byte slice.
pub fn checksum(data: &[u8]) -> u32 {
    let mut digest = Checksum::new();
    digest.update(data);
    digest.finalize()
}

/// Incremental CRC-32 for data that arrives in pieces.
pub fn digest() -> Checksum {
    Checksum::new()
}

/// Table-free variant, bit-for-bit identical to [`checksum`].
pub fn checksum_bitwise(data: &[u8]) -> u32 {
    let pad = [0u8; WORD];
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data.iter().chain(&pad[..tail_padding(data.len())]) {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

/// CRC-32 of `len` bytes of flash starting at `offset`.
pub fn checksum_flash<F: SectorFlash + ?Sized>(flash: &F, offset: u32, len: u32) -> u32 {
    let mut digest = Checksum::new();
    let mut chunk = [0u8; FLASH_CHUNK];
    let mut remaining = len as usize;
    let mut addr = offset;

    while remaining > 0 {
        let n = remaining.min(chunk.len());
        flash.read(addr, &mut chunk[..n]);
        digest.update(&chunk[..n]);
        addr += n as u32;
        remaining -= n;
    }

    digest.finalize()
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! In-memory fakes shared by the integration tests.

#![allow(dead_code)]

use airboot_common::boot_fsm::ScratchRegisters;
use airboot_common::link::{ConnId, Link, LinkError};
use airboot_common::sector::{Sector, SectorFlash, SECTOR_LEN};
use airboot_common::session::ResponseSink;

/// Flash model: erased bytes read as 0xFF, every erase+program is recorded.
pub struct MemFlash {
    pub data: Vec<u8>,
    /// Offsets passed to `erase_and_program`, in call order.
    pub writes: Vec<u32>,
    /// Number of upcoming programs that leave a corrupted byte behind.
    pub failing_programs: u32,
}

impl MemFlash {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0xFF; capacity],
            writes: Vec::new(),
            failing_programs: 0,
        }
    }

    /// Same size as the real device.
    pub fn full_size() -> Self {
        Self::new(airboot_common::protocol::FLASH_SIZE as usize)
    }

    pub fn bytes(&self, offset: u32, len: usize) -> &[u8] {
        &self.data[offset as usize..offset as usize + len]
    }

    pub fn program_count(&self) -> usize {
        self.writes.len()
    }
}

impl SectorFlash for MemFlash {
    fn capacity(&self) -> u32 {
        self.data.len() as u32
    }

    fn read(&self, offset: u32, buf: &mut [u8]) {
        let start = offset as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
    }

    fn erase_and_program(&mut self, offset: u32, data: &Sector) {
        self.writes.push(offset);
        let start = offset as usize;
        let sector = &mut self.data[start..start + SECTOR_LEN];
        sector.copy_from_slice(data);

        if self.failing_programs > 0 {
            self.failing_programs -= 1;
            sector[SECTOR_LEN / 2] ^= 0x5A;
        }
    }
}

/// Collects every response the session sends.
#[derive(Default)]
pub struct RecordingSink {
    pub sent: Vec<Vec<u8>>,
    pub fail: bool,
}

impl ResponseSink for RecordingSink {
    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        if self.fail {
            return Err(LinkError::BufferFull);
        }
        self.sent.push(bytes.to_vec());
        Ok(())
    }
}

/// Link fake: records sends and aborts per connection.
pub struct RecordingLink {
    pub up: bool,
    pub sent: Vec<(ConnId, Vec<u8>)>,
    pub aborted: Vec<ConnId>,
}

impl RecordingLink {
    pub fn new() -> Self {
        Self {
            up: true,
            sent: Vec::new(),
            aborted: Vec::new(),
        }
    }

    pub fn sent_to(&self, conn: ConnId) -> Vec<&[u8]> {
        self.sent
            .iter()
            .filter(|(c, _)| *c == conn)
            .map(|(_, bytes)| bytes.as_slice())
            .collect()
    }
}

impl Link for RecordingLink {
    fn link_up(&self) -> bool {
        self.up
    }

    fn send(&mut self, conn: ConnId, bytes: &[u8]) -> Result<(), LinkError> {
        self.sent.push((conn, bytes.to_vec()));
        Ok(())
    }

    fn abort(&mut self, conn: ConnId) {
        self.aborted.push(conn);
    }
}

/// Two words that survive "resets" for as long as the test holds them.
#[derive(Default)]
pub struct FakeScratch {
    pub words: [u32; 2],
}

impl ScratchRegisters for FakeScratch {
    fn read(&self) -> [u32; 2] {
        self.words
    }

    fn write(&mut self, words: [u32; 2]) {
        self.words = words;
    }
}

/// Deterministic, non-repeating test image.
pub fn test_image(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u32).wrapping_mul(2_654_435_761).rotate_right(13) as u8)
        .collect()
}

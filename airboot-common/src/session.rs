// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Per-connection image transfer state machine.
//!
//! ```text
//! AwaitingHeader --SUCCESS--> Transferring --all bytes--> Verifying --ok--> Succeeded
//!       |                          ^                          |
//!       |                          +------ CHECKSUM_FAILED ---+
//!       +--STORAGE_FULL / REBOOTING--> Refused
//! ```
//!
//! Any [`SessionError`] aborts the connection. The session never blocks:
//! every transition runs synchronously inside [`TransferSession::on_receive`].
//!
//! The payload is staged one sector at a time and written to
//! `app_offset + committed` whenever the staging buffer fills or the last
//! declared byte arrives. A failed checksum rewinds to the start of the
//! application region so the same connection can resend the payload without
//! a new header. Bytes already committed by an aborted transfer stay in
//! flash.

use crate::boot_fsm::{RebootKind, RunMode};
use crate::crc32;
use crate::layout::FlashLayout;
use crate::link::LinkError;
use crate::protocol::{ResponseCode, TransferHeader, TransferResponse, HEADER_LEN};
use crate::sector::{write_sector, FlashError, RetryPolicy, Sector, SectorFlash, SECTOR_LEN};

/// Outbound half of the connection owning a session.
pub trait ResponseSink {
    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    AwaitingHeader,
    Transferring,
    /// Transient: entered and left within the call that commits the last byte.
    Verifying,
    Succeeded,
    /// A non-success answer was sent to the header; the peer must close.
    Refused(ResponseCode),
}

/// What a call to [`TransferSession::on_receive`] achieved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Progress {
    /// Header still incomplete.
    AwaitingHeader,
    /// Header complete, answered with the given code.
    HeaderAnswered(ResponseCode),
    /// Payload bytes accepted; `received` counts staged plus committed bytes.
    Receiving { received: u32, total: u32 },
    /// Whole payload committed and checked, answered with the given code.
    Verified(ResponseCode),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionError {
    #[error("bad header magic")]
    BadMagic,
    #[error("more bytes than a header before the header was answered")]
    HeaderOverrun,
    #[error("more payload bytes than declared")]
    PayloadOverrun,
    #[error("payload sent after a refusal")]
    PayloadRefused,
    #[error("response could not be queued: {0}")]
    Link(#[from] LinkError),
    #[error("flash write failed: {0}")]
    Flash(#[from] FlashError),
}

pub struct TransferSession {
    mode: RunMode,
    layout: FlashLayout,
    retry: RetryPolicy,
    phase: Phase,
    header_buf: [u8; HEADER_LEN],
    header_fill: usize,
    header: Option<TransferHeader>,
    staging: Sector,
    staged: usize,
    committed: u32,
    ready_to_reboot: bool,
}

impl TransferSession {
    pub fn new(mode: RunMode, layout: FlashLayout, retry: RetryPolicy) -> Self {
        Self {
            mode,
            layout,
            retry,
            phase: Phase::AwaitingHeader,
            header_buf: [0u8; HEADER_LEN],
            header_fill: 0,
            header: None,
            staging: [0u8; SECTOR_LEN],
            staged: 0,
            committed: 0,
            ready_to_reboot: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn header(&self) -> Option<TransferHeader> {
        self.header
    }

    /// Payload bytes written to flash so far.
    pub fn committed(&self) -> u32 {
        self.committed
    }

    pub fn ready_to_reboot(&self) -> bool {
        self.ready_to_reboot
    }

    /// Feed one inbound segment of any size.
    pub fn on_receive<F, S>(
        &mut self,
        flash: &mut F,
        data: &[u8],
        sink: &mut S,
    ) -> Result<Progress, SessionError>
    where
        F: SectorFlash + ?Sized,
        S: ResponseSink + ?Sized,
    {
        if data.is_empty() {
            return Ok(self.progress());
        }

        match self.phase {
            Phase::AwaitingHeader => self.receive_header(data, sink),
            Phase::Refused(_) => Err(SessionError::PayloadRefused),
            Phase::Transferring | Phase::Verifying => self.receive_payload(flash, data, sink),
            Phase::Succeeded => Err(SessionError::PayloadOverrun),
        }
    }

    /// Consume the session on disconnect or transport error.
    ///
    /// Returns the reset to perform, if the session earned one.
    pub fn teardown(self) -> Option<RebootKind> {
        self.ready_to_reboot.then(|| self.mode.teardown_reboot())
    }

    fn progress(&self) -> Progress {
        match self.phase {
            Phase::AwaitingHeader => Progress::AwaitingHeader,
            Phase::Refused(code) => Progress::HeaderAnswered(code),
            Phase::Transferring | Phase::Verifying => Progress::Receiving {
                received: self.committed + self.staged as u32,
                total: self.payload_size(),
            },
            Phase::Succeeded => Progress::Verified(ResponseCode::Success),
        }
    }

    fn receive_header<S>(&mut self, data: &[u8], sink: &mut S) -> Result<Progress, SessionError>
    where
        S: ResponseSink + ?Sized,
    {
        let end = self.header_fill + data.len();
        if end > HEADER_LEN {
            return Err(SessionError::HeaderOverrun);
        }
        self.header_buf[self.header_fill..end].copy_from_slice(data);
        self.header_fill = end;

        if self.header_fill < HEADER_LEN {
            return Ok(Progress::AwaitingHeader);
        }

        let header = TransferHeader::decode(&self.header_buf).ok_or(SessionError::BadMagic)?;
        self.header = Some(header);

        let code = if !self.layout.payload_fits(header.payload_size) {
            ResponseCode::StorageFull
        } else if self.mode != RunMode::Bootloader {
            ResponseCode::Rebooting
        } else {
            ResponseCode::Success
        };

        sink.send(&TransferResponse::new(code).encode())?;

        match code {
            // A zero-size transfer has nothing to verify: it stays in
            // `Transferring` until the peer leaves and never earns a reboot.
            ResponseCode::Success => {
                self.phase = Phase::Transferring;
                self.reset_transfer();
            }
            ResponseCode::Rebooting => {
                self.ready_to_reboot = true;
                self.phase = Phase::Refused(code);
            }
            _ => self.phase = Phase::Refused(code),
        }

        Ok(Progress::HeaderAnswered(code))
    }

    fn receive_payload<F, S>(
        &mut self,
        flash: &mut F,
        data: &[u8],
        sink: &mut S,
    ) -> Result<Progress, SessionError>
    where
        F: SectorFlash + ?Sized,
        S: ResponseSink + ?Sized,
    {
        let total = self.payload_size();
        let mut rest = data;

        while !rest.is_empty() {
            let n = rest.len().min(SECTOR_LEN - self.staged);
            let received = self.committed as u64 + (self.staged + n) as u64;
            if received > total as u64 {
                return Err(SessionError::PayloadOverrun);
            }

            self.staging[self.staged..self.staged + n].copy_from_slice(&rest[..n]);
            self.staged += n;
            rest = &rest[n..];

            if self.staged == SECTOR_LEN || self.committed + self.staged as u32 == total {
                self.commit_staged(flash)?;
            }
        }

        if self.committed == total {
            return self.verify(flash, sink);
        }

        Ok(Progress::Receiving {
            received: self.committed + self.staged as u32,
            total,
        })
    }

    /// Always writes a full sector: the tail past the payload is zero.
    fn commit_staged<F: SectorFlash + ?Sized>(&mut self, flash: &mut F) -> Result<(), SessionError> {
        let offset = self.layout.app_offset + self.committed;
        write_sector(flash, offset, &self.staging, self.retry)?;

        self.committed += self.staged as u32;
        self.staged = 0;
        self.staging.fill(0);
        Ok(())
    }

    fn verify<F, S>(&mut self, flash: &mut F, sink: &mut S) -> Result<Progress, SessionError>
    where
        F: SectorFlash + ?Sized,
        S: ResponseSink + ?Sized,
    {
        self.phase = Phase::Verifying;

        let (size, expected) = match self.header {
            Some(h) => (h.payload_size, h.checksum),
            None => (0, 0),
        };
        let actual = crc32::checksum_flash(flash, self.layout.app_offset, size);
        let code = if actual == expected {
            ResponseCode::Success
        } else {
            ResponseCode::ChecksumFailed
        };

        sink.send(&TransferResponse::new(code).encode())?;

        if code == ResponseCode::Success {
            self.ready_to_reboot = true;
            self.phase = Phase::Succeeded;
        } else {
            self.reset_transfer();
            self.phase = Phase::Transferring;
        }

        Ok(Progress::Verified(code))
    }

    fn reset_transfer(&mut self) {
        self.committed = 0;
        self.staged = 0;
        self.staging.fill(0);
    }

    fn payload_size(&self) -> u32 {
        self.header.map_or(0, |h| h.payload_size)
    }
}

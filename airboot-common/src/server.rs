// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Single-slot OTA server: routes connection events to the one
//! [`TransferSession`] allowed to exist at a time.
//!
//! A second connection while the slot is taken is aborted at accept time.
//! There is no idle timeout; a stalled peer keeps the slot until it closes.

use crate::boot_fsm::{RebootKind, RunMode};
use crate::layout::FlashLayout;
use crate::link::{ConnId, Link, LinkError, NetEvent};
use crate::sector::{RetryPolicy, SectorFlash};
use crate::session::{Progress, ResponseSink, SessionError, TransferSession};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServerConfig {
    pub layout: FlashLayout,
    pub mode: RunMode,
    pub retry: RetryPolicy,
}

impl ServerConfig {
    pub fn new(mode: RunMode) -> Self {
        Self {
            layout: FlashLayout::DEFAULT,
            mode,
            retry: RetryPolicy::UNBOUNDED,
        }
    }
}

/// Result of dispatching one [`NetEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dispatch {
    Accepted(ConnId),
    /// Slot busy or link down; the new connection was aborted.
    Rejected(ConnId),
    Progress(Progress),
    /// Protocol or transport failure; the connection was aborted and the
    /// session dropped without a reboot.
    Aborted(SessionError),
    /// Session ended by the peer with nothing left to do.
    Released,
    /// Session ended by the peer and asked for a reset. The caller waits
    /// [`crate::protocol::REBOOT_DRAIN_DELAY_MS`] before performing it.
    Reboot(RebootKind),
    /// Event for a connection that owns no session.
    Ignored,
}

struct Slot {
    conn: ConnId,
    session: TransferSession,
}

pub struct OtaServer {
    config: ServerConfig,
    slot: Option<Slot>,
}

struct ConnSink<'l, L: Link + ?Sized> {
    link: &'l mut L,
    conn: ConnId,
}

impl<L: Link + ?Sized> ResponseSink for ConnSink<'_, L> {
    fn send(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.link.send(self.conn, bytes)
    }
}

impl OtaServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config, slot: None }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn is_busy(&self) -> bool {
        self.slot.is_some()
    }

    pub fn session(&self) -> Option<&TransferSession> {
        self.slot.as_ref().map(|slot| &slot.session)
    }

    pub fn handle<F, L>(&mut self, event: NetEvent<'_>, flash: &mut F, link: &mut L) -> Dispatch
    where
        F: SectorFlash + ?Sized,
        L: Link + ?Sized,
    {
        match event {
            NetEvent::Accepted(conn) => self.accept(conn, link),
            NetEvent::Received(conn, data) => self.receive(conn, data, flash, link),
            NetEvent::Closed(conn) | NetEvent::Failed(conn) => self.teardown(conn),
        }
    }

    fn accept<L: Link + ?Sized>(&mut self, conn: ConnId, link: &mut L) -> Dispatch {
        if self.slot.is_some() || !link.link_up() {
            link.abort(conn);
            return Dispatch::Rejected(conn);
        }

        let session = TransferSession::new(self.config.mode, self.config.layout, self.config.retry);
        self.slot = Some(Slot { conn, session });
        Dispatch::Accepted(conn)
    }

    fn receive<F, L>(&mut self, conn: ConnId, data: &[u8], flash: &mut F, link: &mut L) -> Dispatch
    where
        F: SectorFlash + ?Sized,
        L: Link + ?Sized,
    {
        let Some(slot) = self.slot.as_mut().filter(|slot| slot.conn == conn) else {
            return Dispatch::Ignored;
        };

        let mut sink = ConnSink {
            link: &mut *link,
            conn,
        };
        match slot.session.on_receive(flash, data, &mut sink) {
            Ok(progress) => Dispatch::Progress(progress),
            Err(err) => {
                self.slot = None;
                link.abort(conn);
                Dispatch::Aborted(err)
            }
        }
    }

    fn teardown(&mut self, conn: ConnId) -> Dispatch {
        match self.slot.take() {
            Some(slot) if slot.conn == conn => match slot.session.teardown() {
                Some(kind) => Dispatch::Reboot(kind),
                None => Dispatch::Released,
            },
            other => {
                self.slot = other;
                Dispatch::Ignored
            }
        }
    }
}

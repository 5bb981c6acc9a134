// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Boundary to the connectivity layer.
//!
//! The connectivity layer (radio driver and TCP stack, or the USB CDC link)
//! turns segment delivery into [`NetEvent`]s for the control loop and
//! queues outbound bytes through [`Link`]. Sends are fire-and-forget: they
//! are queued, not flushed, before `send` returns.

/// Identifies one connection for its whole lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnId(pub u32);

/// Connection lifecycle and data events, dequeued by the control loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetEvent<'a> {
    Accepted(ConnId),
    Received(ConnId, &'a [u8]),
    /// Orderly close by the peer.
    Closed(ConnId),
    /// Transport error; the connection is already gone.
    Failed(ConnId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    #[error("connection is closed")]
    Closed,
    #[error("transmit buffer full")]
    BufferFull,
}

pub trait Link {
    /// Whether it is meaningful to accept connections right now
    /// (an IP address is bound, or the USB host configured the device).
    fn link_up(&self) -> bool;

    /// Queue `bytes` for transmission on `conn`.
    fn send(&mut self, conn: ConnId, bytes: &[u8]) -> Result<(), LinkError>;

    /// Drop `conn` without a graceful close.
    fn abort(&mut self, conn: ConnId);
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Byte-stream transport to an OTA listener: TCP or USB CDC serial.

use std::fmt;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use airboot_common::protocol::OTA_PORT;

/// Default timeout for transport operations in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Where a device's OTA listener can be reached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// `host` or `host:port`; the port defaults to [`OTA_PORT`].
    Tcp(String),
    /// Serial device path of the USB CDC link.
    Serial(String),
}

impl Target {
    pub fn parse(spec: &str) -> Self {
        let looks_like_device = spec.starts_with('/') || spec.starts_with("COM");
        if looks_like_device {
            Self::Serial(spec.to_string())
        } else if spec.contains(':') {
            Self::Tcp(spec.to_string())
        } else {
            Self::Tcp(format!("{spec}:{OTA_PORT}"))
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "{addr}"),
            Self::Serial(path) => write!(f, "{path}"),
        }
    }
}

pub trait Stream: Read + Write + Send {}

impl<T: Read + Write + Send> Stream for T {}

/// An open connection to one OTA listener.
pub struct Transport {
    stream: Box<dyn Stream>,
}

impl Transport {
    /// Open a connection. For serial targets, asserting DTR is what the
    /// device treats as an accepted connection.
    pub fn connect(target: &Target, timeout_ms: u64) -> Result<Self> {
        let timeout = Duration::from_millis(timeout_ms);
        let stream: Box<dyn Stream> = match target {
            Target::Tcp(addr) => {
                let sock_addr = addr
                    .to_socket_addrs()
                    .with_context(|| format!("Failed to resolve {addr}"))?
                    .next()
                    .ok_or_else(|| anyhow!("No address for {addr}"))?;
                let stream = TcpStream::connect_timeout(&sock_addr, timeout)
                    .with_context(|| format!("Failed to connect to {addr}"))?;
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                stream.set_nodelay(true)?;
                Box::new(stream)
            }
            Target::Serial(path) => {
                let mut port = serialport::new(path, 115200)
                    .timeout(timeout)
                    .open()
                    .with_context(|| format!("Failed to open serial port {path}"))?;
                port.write_data_terminal_ready(true)
                    .with_context(|| format!("Failed to assert DTR on {path}"))?;
                Box::new(port)
            }
        };

        Ok(Self { stream })
    }

    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream
            .write_all(bytes)
            .context("Failed to write to device")?;
        self.stream.flush()?;
        Ok(())
    }

    /// Read exactly `buf.len()` bytes.
    pub fn receive(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stream.read_exact(buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                anyhow!("Timeout waiting for response")
            }
            std::io::ErrorKind::UnexpectedEof => anyhow!("Device closed the connection"),
            _ => anyhow!("Read error: {e}"),
        })
    }
}

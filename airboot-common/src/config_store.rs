// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Persistent configuration in a single flash sector: Wi-Fi credentials and
//! an opaque, checksummed "extra" blob owned by the application.
//!
//! Sector layout (little-endian):
//!
//! | offset | size            | field                         |
//! |--------|-----------------|-------------------------------|
//! | 0      | 4               | magic `"CNF\n"`               |
//! | 4      | 32              | ssid, NUL padded              |
//! | 36     | 64              | password, NUL padded          |
//! | 100    | 2               | extra length (u16)            |
//! | 102    | 4               | CRC-32 of the extra bytes     |
//! | 106    | up to 3990      | extra bytes                   |
//!
//! A field that is exactly full width carries no terminating NUL.
//!
//! Every write is a read-modify-write of the whole sector: fields not
//! touched by the call are carried over from what is currently stored.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::crc32;
use crate::layout::FlashLayout;
use crate::sector::{write_sector, FlashError, RetryPolicy, Sector, SectorFlash, SECTOR_LEN};

pub const CONFIG_MAGIC: [u8; 4] = *b"CNF\n";

pub const SSID_LEN: usize = 32;
pub const PASSWORD_LEN: usize = 64;

const MAGIC_AT: usize = 0;
const SSID_AT: usize = MAGIC_AT + CONFIG_MAGIC.len();
const PASSWORD_AT: usize = SSID_AT + SSID_LEN;
const EXTRA_LEN_AT: usize = PASSWORD_AT + PASSWORD_LEN;
const EXTRA_CRC_AT: usize = EXTRA_LEN_AT + 2;
const EXTRA_AT: usize = EXTRA_CRC_AT + 4;

/// Size of everything in the sector before the extra blob.
pub const CONFIG_HEADER_LEN: usize = EXTRA_AT;

/// Largest extra blob that fits next to the fixed fields.
pub const EXTRA_MAX_SIZE: usize = SECTOR_LEN - CONFIG_HEADER_LEN;

const _: () = assert!(EXTRA_MAX_SIZE <= u16::MAX as usize);

/// Credentials as stored: each field up to its first NUL. An SSID is an
/// arbitrary octet string, so no encoding is assumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: heapless::Vec<u8, SSID_LEN>,
    pub password: heapless::Vec<u8, PASSWORD_LEN>,
}

impl WifiCredentials {
    /// An empty ssid means provisioning never completed.
    pub fn is_configured(&self) -> bool {
        !self.ssid.is_empty()
    }

    /// The ssid as text, if it is valid UTF-8.
    pub fn ssid_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.ssid).ok()
    }

    pub fn password_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.password).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    #[error("config sector has never been written")]
    NotConfigured,
    #[error("config sector content failed validation")]
    Corrupted,
    #[error("extra blob of {size} bytes exceeds the {max} byte maximum")]
    TooLarge { size: usize, max: usize },
    #[error("buffer too small, {needed} bytes required")]
    BufferTooSmall { needed: usize },
    #[error("extra blob could not be (de)serialized")]
    Encoding,
    #[error(transparent)]
    Flash(#[from] FlashError),
}

/// Read/write access to the config sector.
pub struct ConfigStore<'f, F: SectorFlash + ?Sized> {
    flash: &'f mut F,
    offset: u32,
    retry: RetryPolicy,
}

impl<'f, F: SectorFlash + ?Sized> ConfigStore<'f, F> {
    pub fn new(flash: &'f mut F, layout: &FlashLayout) -> Self {
        Self {
            flash,
            offset: layout.config_offset,
            retry: RetryPolicy::UNBOUNDED,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fails only with [`ConfigError::NotConfigured`]; field contents are
    /// returned as stored.
    pub fn read_wifi_config(&self) -> Result<WifiCredentials, ConfigError> {
        let mut head = [0u8; EXTRA_LEN_AT];
        self.flash.read(self.offset, &mut head);

        if head[MAGIC_AT..SSID_AT] != CONFIG_MAGIC {
            return Err(ConfigError::NotConfigured);
        }

        Ok(WifiCredentials {
            ssid: field_bytes(&head[SSID_AT..PASSWORD_AT]),
            password: field_bytes(&head[PASSWORD_AT..EXTRA_LEN_AT]),
        })
    }

    /// Store new credentials, keeping the extra blob.
    ///
    /// Each value is truncated to its field width (on a character
    /// boundary).
    pub fn write_wifi_config(&mut self, ssid: &str, password: &str) -> Result<(), ConfigError> {
        let mut sector = self.load_or_init();

        put_field(&mut sector[SSID_AT..PASSWORD_AT], ssid);
        put_field(&mut sector[PASSWORD_AT..EXTRA_LEN_AT], password);

        self.commit(&sector)
    }

    /// Store a new extra blob, keeping the credentials.
    pub fn write_extra_config(&mut self, extra: &[u8]) -> Result<(), ConfigError> {
        if extra.len() > EXTRA_MAX_SIZE {
            return Err(ConfigError::TooLarge {
                size: extra.len(),
                max: EXTRA_MAX_SIZE,
            });
        }

        let mut sector = self.load_or_init();

        sector[EXTRA_LEN_AT..EXTRA_CRC_AT].copy_from_slice(&(extra.len() as u16).to_le_bytes());
        sector[EXTRA_CRC_AT..EXTRA_AT].copy_from_slice(&crc32::checksum(extra).to_le_bytes());
        sector[EXTRA_AT..EXTRA_AT + extra.len()].copy_from_slice(extra);
        sector[EXTRA_AT + extra.len()..].fill(0);

        self.commit(&sector)
    }

    /// Copy the extra blob into `buf` and return its length.
    ///
    /// Fails with [`ConfigError::NotConfigured`] when the sector was never
    /// written and [`ConfigError::Corrupted`] when the stored checksum does
    /// not match the stored bytes.
    pub fn read_extra_config(&self, buf: &mut [u8]) -> Result<usize, ConfigError> {
        let mut head = [0u8; CONFIG_HEADER_LEN];
        self.flash.read(self.offset, &mut head);

        if head[MAGIC_AT..SSID_AT] != CONFIG_MAGIC {
            return Err(ConfigError::NotConfigured);
        }

        let len = u16::from_le_bytes([head[EXTRA_LEN_AT], head[EXTRA_LEN_AT + 1]]) as usize;
        if len > EXTRA_MAX_SIZE {
            return Err(ConfigError::Corrupted);
        }
        if len > buf.len() {
            return Err(ConfigError::BufferTooSmall { needed: len });
        }

        let stored_crc = u32::from_le_bytes([
            head[EXTRA_CRC_AT],
            head[EXTRA_CRC_AT + 1],
            head[EXTRA_CRC_AT + 2],
            head[EXTRA_CRC_AT + 3],
        ]);

        let extra = &mut buf[..len];
        self.flash.read(self.offset + EXTRA_AT as u32, extra);
        if crc32::checksum(extra) != stored_crc {
            return Err(ConfigError::Corrupted);
        }

        Ok(len)
    }

    /// Serialize `value` with postcard into the extra blob.
    pub fn write_extra_as<T: Serialize>(&mut self, value: &T) -> Result<(), ConfigError> {
        let mut buf = [0u8; EXTRA_MAX_SIZE];
        let used = postcard::to_slice(value, &mut buf).map_err(|_| ConfigError::Encoding)?;
        let len = used.len();
        self.write_extra_config(&buf[..len])
    }

    /// Read back a value stored with [`ConfigStore::write_extra_as`].
    pub fn read_extra_as<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        let mut buf = [0u8; EXTRA_MAX_SIZE];
        let len = self.read_extra_config(&mut buf)?;
        postcard::from_bytes(&buf[..len]).map_err(|_| ConfigError::Encoding)
    }

    /// Current sector content, or a zeroed sector carrying only the magic
    /// when nothing valid is stored yet.
    fn load_or_init(&self) -> Sector {
        let mut sector = [0u8; SECTOR_LEN];
        self.flash.read(self.offset, &mut sector);

        if sector[MAGIC_AT..SSID_AT] != CONFIG_MAGIC {
            sector.fill(0);
            sector[MAGIC_AT..SSID_AT].copy_from_slice(&CONFIG_MAGIC);
        }

        sector
    }

    fn commit(&mut self, sector: &Sector) -> Result<(), ConfigError> {
        write_sector(&mut *self.flash, self.offset, sector, self.retry)?;
        Ok(())
    }
}

/// Longest prefix of `value` that fits in `width` bytes without splitting
/// a character.
fn truncate_to(value: &str, width: usize) -> &str {
    if value.len() <= width {
        return value;
    }
    let mut end = width;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

fn put_field(field: &mut [u8], value: &str) {
    let value = truncate_to(value, field.len());
    field.fill(0);
    field[..value.len()].copy_from_slice(value.as_bytes());
}

/// Field content up to the first NUL. `N` is the field width, so the
/// whole field always fits.
fn field_bytes<const N: usize>(field: &[u8]) -> heapless::Vec<u8, N> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    field[..end.min(N)].iter().copied().collect()
}

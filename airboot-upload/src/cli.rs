// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use crate::commands::{self, UploadOptions};
use crate::transport::{Target, DEFAULT_TIMEOUT_MS};

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "airboot-upload")]
#[command(about = "Firmware upload tool for the airboot OTA bootloader")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Upload an application image to one or more devices
    Upload {
        /// Application binary file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Device address (host or host:port) or serial port path
        #[arg(value_name = "TARGET")]
        targets: Vec<String>,

        /// Serial port (e.g., /dev/ttyACM0), in addition to TARGET
        #[arg(short, long)]
        port: Option<String>,

        /// Payload resends after a checksum failure
        #[arg(short, long, default_value = "3")]
        retries: u32,

        /// Reconnect attempts after the device reboots into the bootloader
        #[arg(long, default_value = "10")]
        reconnect_attempts: u32,

        /// Delay before each reconnect attempt
        #[arg(long, default_value = "1000")]
        reconnect_delay_ms: u64,

        /// Connect and response timeout
        #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
        timeout_ms: u64,
    },

    /// Print size and CRC-32 of an image
    Checksum {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Upload {
            file,
            targets,
            port,
            retries,
            reconnect_attempts,
            reconnect_delay_ms,
            timeout_ms,
        } => {
            let mut parsed: Vec<Target> = targets.iter().map(|t| Target::parse(t)).collect();
            if let Some(port) = port {
                parsed.push(Target::Serial(port));
            }
            if parsed.is_empty() {
                bail!("No target given");
            }

            let opts = UploadOptions {
                retries,
                reconnect_attempts,
                reconnect_delay: Duration::from_millis(reconnect_delay_ms),
                timeout_ms,
            };
            commands::upload(&file, &parsed, opts)
        }
        Commands::Checksum { file } => commands::checksum(&file),
    }
}

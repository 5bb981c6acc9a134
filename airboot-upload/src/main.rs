// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Firmware upload tool for the airboot bootloader, over TCP or USB CDC.
//!
//! Usage:
//!   airboot-upload upload app.bin 192.168.1.40 192.168.1.41
//!   airboot-upload upload app.bin --port /dev/ttyACM0
//!   airboot-upload checksum app.bin

mod cli;
mod commands;
mod transport;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    cli::run(args)
}

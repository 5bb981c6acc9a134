// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Bootloader mode: serve OTA uploads over the USB link until one succeeds
//! and its connection closes.
//!
//! Each loop iteration services the link, dispatches at most one event to
//! the server, then paces the heartbeat LED.

use crate::peripherals::{self, Peripherals};
use airboot_common::boot_fsm::{RebootKind, RunMode};
use airboot_common::flash::Rp2040Flash;
use airboot_common::heartbeat::{Heartbeat, BOOTLOADER_BLINK_MS, FAILURE_BLINK_MS};
use airboot_common::protocol::REBOOT_DRAIN_DELAY_MS;
use airboot_common::reboot;
use airboot_common::server::{Dispatch, OtaServer, ServerConfig};
use airboot_common::session::Progress;
use airboot_common::usb_link::UsbLink;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use rp2040_hal as hal;
use usb_device::class_prelude::UsbBusAllocator;

const RX_BUF_LEN: usize = 64;

/// Enter bootloader mode: initialize USB and run the OTA loop.
pub fn enter_update_mode(p: &mut Peripherals) -> ! {
    defmt::println!("Bootloader mode");

    let Some(mut usb) = p.usb.take() else {
        defmt::println!("USB peripherals unavailable");
        airboot_common::blink_forever(&mut p.led_pin, &mut p.timer, FAILURE_BLINK_MS)
    };

    let usb_bus = peripherals::store_usb_bus(UsbBusAllocator::new(hal::usb::UsbBus::new(
        usb.regs,
        usb.dpram,
        usb.clock,
        true,
        &mut usb.resets,
    )));
    let mut link = UsbLink::new(usb_bus, "airboot bootloader");
    let mut flash = Rp2040Flash::new();
    let mut server = OtaServer::new(ServerConfig::new(RunMode::Bootloader));

    defmt::println!("USB link initialized, waiting for uploads");

    let mut heartbeat = Heartbeat::new(BOOTLOADER_BLINK_MS);
    let mut rx_buf = [0u8; RX_BUF_LEN];

    loop {
        if let Some(event) = link.poll_event(&mut rx_buf) {
            match server.handle(event, &mut flash, &mut link) {
                Dispatch::Reboot(kind) => finish(p, &mut link, kind),
                dispatch => log_dispatch(dispatch),
            }
        }

        let now_ms = p.timer.get_counter().ticks() / 1000;
        if let Some(on) = heartbeat.poll(now_ms) {
            if on {
                p.led_pin.set_high().ok();
            } else {
                p.led_pin.set_low().ok();
            }
        }
    }
}

fn log_dispatch(dispatch: Dispatch) {
    match dispatch {
        Dispatch::Accepted(conn) => defmt::println!("Connection {} accepted", conn.0),
        Dispatch::Rejected(conn) => defmt::println!("Connection {} rejected", conn.0),
        Dispatch::Progress(Progress::HeaderAnswered(code)) => {
            defmt::println!("Header answered: {}", code)
        }
        Dispatch::Progress(Progress::Verified(code)) => {
            defmt::println!("Image verification: {}", code)
        }
        Dispatch::Progress(_) | Dispatch::Ignored | Dispatch::Reboot(_) => {}
        Dispatch::Aborted(err) => defmt::println!("Session aborted: {}", err),
        Dispatch::Released => defmt::println!("Connection released"),
    }
}

/// Give the last response time to leave, then reset.
fn finish(p: &mut Peripherals, link: &mut UsbLink, kind: RebootKind) -> ! {
    defmt::println!("Rebooting ({})", kind);
    p.led_pin.set_low().ok();
    for _ in 0..REBOOT_DRAIN_DELAY_MS {
        link.flush(10);
        p.timer.delay_ms(1);
    }
    reboot::reboot(kind)
}

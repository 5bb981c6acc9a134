// Copyright (c) 2026 ADNT Sarl <info@adnt.io>
// SPDX-License-Identifier: MIT

//! Sample application for the airboot bootloader.
//!
//! Runs its own OTA listener so a new image can be pushed at any time: the
//! header is answered with REBOOTING, and once the host closes the
//! connection the board resets into the bootloader to take the upload.

#![no_std]
#![no_main]

use airboot_common::boot_fsm::RunMode;
use airboot_common::config_store::{ConfigError, ConfigStore};
use airboot_common::flash::Rp2040Flash;
use airboot_common::heartbeat::Heartbeat;
use airboot_common::layout::FlashLayout;
use airboot_common::protocol::REBOOT_DRAIN_DELAY_MS;
use airboot_common::reboot;
use airboot_common::server::{Dispatch, OtaServer, ServerConfig};
use airboot_common::usb_link::UsbLink;
use defmt_rtt as _;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use panic_probe as _;
use rp2040_hal as hal;
use rp2040_hal::usb::UsbBus;
use usb_device::class_prelude::UsbBusAllocator;

defmt::timestamp!("{=u64:us}", { 0 });

use cortex_m_rt::entry;

const APP_BLINK_MS: u64 = 1000;

/// Static storage for UsbBusAllocator (required by usb-device for 'static lifetime).
static mut USB_BUS: Option<UsbBusAllocator<UsbBus>> = None;

fn log_wifi_config(flash: &mut Rp2040Flash) {
    let store = ConfigStore::new(flash, &FlashLayout::DEFAULT);
    match store.read_wifi_config() {
        Ok(creds) if creds.is_configured() => {
            defmt::println!("Wi-Fi configured for \"{=[u8]:a}\"", &creds.ssid[..])
        }
        Ok(_) | Err(ConfigError::NotConfigured) => defmt::println!("Wi-Fi not configured"),
        Err(err) => defmt::println!("Wi-Fi config unreadable: {}", err),
    }
}

#[entry]
fn main() -> ! {
    defmt::println!("Application started ({})", reboot::running_mode());

    let mut pac = unsafe { hal::pac::Peripherals::steal() };

    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);
    let clocks = hal::clocks::init_clocks_and_plls(
        12_000_000u32,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .unwrap();

    let mut timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);
    let sio = hal::Sio::new(pac.SIO);
    let pins = hal::gpio::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    let mut led_pin = pins.gpio25.into_push_pull_output();

    // Blink to signal firmware alive
    airboot_common::blink(&mut led_pin, &mut timer, 5, 100);

    let mut flash = Rp2040Flash::new();
    log_wifi_config(&mut flash);

    let usb_bus = UsbBusAllocator::new(hal::usb::UsbBus::new(
        pac.USBCTRL_REGS,
        pac.USBCTRL_DPRAM,
        clocks.usb_clock,
        true,
        &mut pac.RESETS,
    ));
    let usb_bus = unsafe { (*core::ptr::addr_of_mut!(USB_BUS)).insert(usb_bus) };

    let mut link = UsbLink::new(usb_bus, "airboot application");
    let mut server = OtaServer::new(ServerConfig::new(RunMode::Application));
    let mut heartbeat = Heartbeat::new(APP_BLINK_MS);
    let mut rx_buf = [0u8; 64];

    defmt::println!("OTA listener ready");

    loop {
        if let Some(event) = link.poll_event(&mut rx_buf) {
            match server.handle(event, &mut flash, &mut link) {
                Dispatch::Reboot(kind) => {
                    defmt::println!("Handing over to the bootloader");
                    for _ in 0..REBOOT_DRAIN_DELAY_MS {
                        link.flush(10);
                        timer.delay_ms(1);
                    }
                    reboot::reboot(kind);
                }
                Dispatch::Aborted(err) => defmt::println!("OTA session aborted: {}", err),
                _ => {}
            }
        }

        let now_ms = timer.get_counter().ticks() / 1000;
        if let Some(on) = heartbeat.poll(now_ms) {
            if on {
                led_pin.set_high().ok();
            } else {
                led_pin.set_low().ok();
            }
        }
    }
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! USB CDC implementation of [`Link`].
//!
//! The host opening the serial port (asserting DTR) is a connection; DTR
//! dropping is an orderly close. Bytes flow unframed, exactly as they would
//! on a TCP stream.

use rp2040_hal::usb::UsbBus;
use usb_device::class_prelude::UsbBusAllocator;
use usb_device::prelude::*;
use usbd_serial::SerialPort;

use crate::link::{ConnId, Link, LinkError, NetEvent};

/// Polls spent waiting for room in the CDC transmit buffer.
const SEND_POLL_LIMIT: u32 = 10_000;

pub struct UsbLink {
    serial: SerialPort<'static, UsbBus>,
    usb_dev: UsbDevice<'static, UsbBus>,
    conn: Option<ConnId>,
    next_id: u32,
    /// Set after `abort`: discard input until the host closes the port.
    draining: bool,
}

impl UsbLink {
    pub fn new(usb_bus: &'static UsbBusAllocator<UsbBus>, product: &'static str) -> Self {
        let serial = SerialPort::new(usb_bus);
        let usb_dev = UsbDeviceBuilder::new(usb_bus, UsbVidPid(0x2E8A, 0x000A))
            .strings(&[StringDescriptors::default()
                .manufacturer("ADNT")
                .product(product)
                .serial_number("0001")])
            .unwrap()
            .device_class(usbd_serial::USB_CLASS_CDC)
            .build();

        Self {
            serial,
            usb_dev,
            conn: None,
            next_id: 0,
            draining: false,
        }
    }

    /// Poll the USB device and report at most one event.
    /// Must be called frequently. Received bytes are copied into `buf`.
    pub fn poll_event<'b>(&mut self, buf: &'b mut [u8]) -> Option<NetEvent<'b>> {
        self.usb_dev.poll(&mut [&mut self.serial]);

        let port_open = self.link_up() && self.serial.dtr();

        match (self.conn, port_open) {
            (Some(conn), false) => {
                self.conn = None;
                Some(NetEvent::Closed(conn))
            }
            (None, false) => {
                self.draining = false;
                None
            }
            (None, true) if self.draining => {
                let _ = self.serial.read(buf);
                None
            }
            (None, true) => {
                let conn = ConnId(self.next_id);
                self.next_id = self.next_id.wrapping_add(1);
                self.conn = Some(conn);
                Some(NetEvent::Accepted(conn))
            }
            (Some(conn), true) => match self.serial.read(buf) {
                Ok(count) if count > 0 => Some(NetEvent::Received(conn, &buf[..count])),
                Ok(_) | Err(UsbError::WouldBlock) => None,
                Err(_) => {
                    self.conn = None;
                    self.draining = true;
                    Some(NetEvent::Failed(conn))
                }
            },
        }
    }

    /// Keep the device serviced for roughly `iterations` polls so queued
    /// bytes reach the host before a reset.
    pub fn flush(&mut self, iterations: u32) {
        for _ in 0..iterations {
            self.usb_dev.poll(&mut [&mut self.serial]);
            let _ = self.serial.flush();
        }
    }
}

impl Link for UsbLink {
    fn link_up(&self) -> bool {
        self.usb_dev.state() == UsbDeviceState::Configured
    }

    fn send(&mut self, conn: ConnId, bytes: &[u8]) -> Result<(), LinkError> {
        if self.conn != Some(conn) {
            return Err(LinkError::Closed);
        }

        let mut offset = 0;
        let mut polls = 0;
        while offset < bytes.len() {
            match self.serial.write(&bytes[offset..]) {
                Ok(n) => offset += n,
                Err(UsbError::WouldBlock) => {
                    polls += 1;
                    if polls > SEND_POLL_LIMIT {
                        return Err(LinkError::BufferFull);
                    }
                    self.usb_dev.poll(&mut [&mut self.serial]);
                }
                Err(_) => return Err(LinkError::Closed),
            }
        }
        Ok(())
    }

    fn abort(&mut self, conn: ConnId) {
        if self.conn == Some(conn) {
            self.conn = None;
        }
        self.draining = true;
    }
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations: image checksum and OTA upload.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use airboot_common::crc32;
use airboot_common::protocol::{
    ResponseCode, TransferHeader, TransferResponse, APP_MAX_SIZE, RESPONSE_LEN,
};

use crate::transport::{Target, Transport};

const CHUNK_SIZE: usize = 1024;

#[derive(Clone, Copy, Debug)]
pub struct UploadOptions {
    /// Extra payload sends after CHECKSUM_FAILED.
    pub retries: u32,
    /// Connection attempts after the device answered REBOOTING.
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub timeout_ms: u64,
}

/// Print size and CRC-32 of an image, as sent in the transfer header.
pub fn checksum(file: &Path) -> Result<()> {
    let image = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    println!("File:     {}", file.display());
    println!("Size:     {} bytes", image.len());
    println!("CRC32:    0x{:08x}", crc32::checksum(&image));
    Ok(())
}

/// Upload an image to every target in parallel and print one result line
/// per device. Fails if any device failed.
pub fn upload(file: &Path, targets: &[Target], opts: UploadOptions) -> Result<()> {
    let image = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let header = pack_request(&image)?;

    println!(
        "Firmware: {} ({} bytes, CRC32: 0x{:08x})",
        file.display(),
        header.payload_size,
        header.checksum
    );
    println!("Targets:  {}", targets.len());
    println!();

    let multi = MultiProgress::new();
    let results: Vec<(String, Result<()>)> = thread::scope(|scope| {
        let handles: Vec<_> = targets
            .iter()
            .map(|target| {
                let pb = multi.add(progress_bar(target, image.len()));
                let image = &image;
                scope.spawn(move || {
                    let result = upload_to(target, image, &opts, &pb);
                    match &result {
                        Ok(()) => pb.finish_with_message(format!("{target}: done")),
                        Err(_) => pb.abandon_with_message(format!("{target}: failed")),
                    }
                    (target.to_string(), result)
                })
            })
            .collect();

        handles
            .into_iter()
            .zip(targets)
            .map(|(handle, target)| {
                handle.join().unwrap_or_else(|_| {
                    let err = anyhow::anyhow!("upload thread panicked");
                    (target.to_string(), Err(err))
                })
            })
            .collect()
    });

    println!();
    println!("Results:");
    let mut failures = 0;
    for (target, result) in &results {
        match result {
            Ok(()) => println!("  {target:<24} OK"),
            Err(e) => {
                failures += 1;
                println!("  {target:<24} FAILED: {e:#}");
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} uploads failed", failures, results.len());
    }
    Ok(())
}

fn progress_bar(target: &Target, len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} {prefix:<24} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_prefix(target.to_string());
    pb
}

/// Header announcing `image`.
pub fn pack_request(image: &[u8]) -> Result<TransferHeader> {
    let size = u32::try_from(image.len()).context("Image larger than 4 GiB")?;
    if size > APP_MAX_SIZE {
        bail!(
            "Image is {} bytes, the application region holds {} bytes",
            size,
            APP_MAX_SIZE
        );
    }
    Ok(TransferHeader::new(size, crc32::checksum(image)))
}

fn read_response(transport: &mut Transport) -> Result<ResponseCode> {
    let mut buf = [0u8; RESPONSE_LEN];
    transport.receive(&mut buf)?;
    let response =
        TransferResponse::decode(&buf).map_err(|e| anyhow::anyhow!("Bad response: {e}"))?;
    Ok(response.code)
}

/// Drive one device from first connection to verified image.
pub fn upload_to(
    target: &Target,
    image: &[u8],
    opts: &UploadOptions,
    pb: &ProgressBar,
) -> Result<()> {
    let header = pack_request(image)?;
    let mut transport = Transport::connect(target, opts.timeout_ms)?;
    let mut reboots = 0;

    loop {
        transport.send(&header.encode())?;

        match read_response(&mut transport)? {
            ResponseCode::Success => break,
            ResponseCode::Rebooting => {
                reboots += 1;
                if reboots > opts.reconnect_attempts {
                    bail!("Device kept rebooting after {} reconnects", reboots - 1);
                }
                drop(transport);
                pb.set_message("rebooting into bootloader");
                transport = reconnect(target, opts)?;
            }
            ResponseCode::StorageFull => bail!("Device storage full"),
            ResponseCode::ChecksumFailed => bail!("Unexpected CHECKSUM_FAILED before payload"),
        }
    }

    let mut attempt = 0;
    loop {
        pb.set_position(0);
        pb.set_message("sending");
        send_payload(&mut transport, image, pb)?;

        match read_response(&mut transport)? {
            ResponseCode::Success => return Ok(()),
            ResponseCode::ChecksumFailed if attempt < opts.retries => {
                attempt += 1;
                pb.set_message(format!("checksum failed, retry {attempt}"));
            }
            ResponseCode::ChecksumFailed => {
                bail!("Checksum failed after {} attempts", attempt + 1)
            }
            code => bail!("Unexpected response after payload: {:?}", code),
        }
    }
}

/// Wait for the device to come back after REBOOTING. The serial device
/// disappears while the board re-enumerates, so each attempt may fail.
fn reconnect(target: &Target, opts: &UploadOptions) -> Result<Transport> {
    let mut last_err = None;
    for _ in 0..opts.reconnect_attempts {
        thread::sleep(opts.reconnect_delay);
        match Transport::connect(target, opts.timeout_ms) {
            Ok(transport) => return Ok(transport),
            Err(e) => last_err = Some(e),
        }
    }
    match last_err {
        Some(e) => Err(e.context(format!("Could not reconnect to {target}"))),
        None => bail!("Reconnecting to {target} is disabled"),
    }
}

fn send_payload(transport: &mut Transport, image: &[u8], pb: &ProgressBar) -> Result<()> {
    for chunk in image.chunks(CHUNK_SIZE) {
        transport.send(chunk)?;
        pb.inc(chunk.len() as u64);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use airboot_common::protocol::HEADER_LEN;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};

    fn opts() -> UploadOptions {
        UploadOptions {
            retries: 2,
            reconnect_attempts: 3,
            reconnect_delay: Duration::from_millis(10),
            timeout_ms: 2000,
        }
    }

    fn image() -> Vec<u8> {
        (0..5000u32).map(|i| (i * 7) as u8).collect()
    }

    fn respond(stream: &mut TcpStream, code: ResponseCode) {
        stream
            .write_all(&TransferResponse::new(code).encode())
            .unwrap();
    }

    fn read_header(stream: &mut TcpStream) -> TransferHeader {
        let mut buf = [0u8; HEADER_LEN];
        stream.read_exact(&mut buf).unwrap();
        TransferHeader::decode(&buf).unwrap()
    }

    fn read_payload(stream: &mut TcpStream, len: u32) -> Vec<u8> {
        let mut payload = vec![0u8; len as usize];
        stream.read_exact(&mut payload).unwrap();
        payload
    }

    /// Loopback device running `script` on each accepted connection in turn.
    fn fake_device<F>(connections: usize, script: F) -> (Target, thread::JoinHandle<()>)
    where
        F: Fn(usize, TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let target = Target::Tcp(listener.local_addr().unwrap().to_string());
        let handle = thread::spawn(move || {
            for index in 0..connections {
                let (stream, _) = listener.accept().unwrap();
                script(index, stream);
            }
        });
        (target, handle)
    }

    #[test]
    fn header_is_little_endian_with_image_crc() {
        let header = pack_request(b"hello").unwrap();
        let bytes = header.encode();
        assert_eq!(&bytes[0..4], b"OTA\n");
        assert_eq!(&bytes[4..8], &5u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &0xFF13_B51Du32.to_le_bytes());
    }

    #[test]
    fn oversized_image_is_refused_locally() {
        let image = vec![0u8; APP_MAX_SIZE as usize + 1];
        assert!(pack_request(&image).is_err());
    }

    #[test]
    fn uploads_to_bootloader() {
        let data = image();
        let expected = data.clone();
        let (target, device) = fake_device(1, move |_, mut stream| {
            let header = read_header(&mut stream);
            assert_eq!(header.payload_size, expected.len() as u32);
            assert_eq!(header.checksum, crc32::checksum(&expected));
            respond(&mut stream, ResponseCode::Success);
            assert_eq!(read_payload(&mut stream, header.payload_size), expected);
            respond(&mut stream, ResponseCode::Success);
        });

        upload_to(&target, &data, &opts(), &ProgressBar::hidden()).unwrap();
        device.join().unwrap();
    }

    #[test]
    fn follows_rebooting_with_a_new_connection() {
        let data = image();
        let (target, device) = fake_device(2, |index, mut stream| {
            let header = read_header(&mut stream);
            if index == 0 {
                respond(&mut stream, ResponseCode::Rebooting);
                return;
            }
            respond(&mut stream, ResponseCode::Success);
            read_payload(&mut stream, header.payload_size);
            respond(&mut stream, ResponseCode::Success);
        });

        upload_to(&target, &data, &opts(), &ProgressBar::hidden()).unwrap();
        device.join().unwrap();
    }

    #[test]
    fn resends_payload_on_same_connection_after_checksum_failure() {
        let data = image();
        let (target, device) = fake_device(1, |_, mut stream| {
            let header = read_header(&mut stream);
            respond(&mut stream, ResponseCode::Success);
            read_payload(&mut stream, header.payload_size);
            respond(&mut stream, ResponseCode::ChecksumFailed);
            read_payload(&mut stream, header.payload_size);
            respond(&mut stream, ResponseCode::Success);
        });

        upload_to(&target, &data, &opts(), &ProgressBar::hidden()).unwrap();
        device.join().unwrap();
    }

    #[test]
    fn gives_up_when_retries_are_spent() {
        let data = image();
        let mut options = opts();
        options.retries = 0;
        let (target, device) = fake_device(1, |_, mut stream| {
            let header = read_header(&mut stream);
            respond(&mut stream, ResponseCode::Success);
            read_payload(&mut stream, header.payload_size);
            respond(&mut stream, ResponseCode::ChecksumFailed);
        });

        let err = upload_to(&target, &data, &options, &ProgressBar::hidden()).unwrap_err();
        assert!(err.to_string().contains("Checksum failed"));
        device.join().unwrap();
    }

    #[test]
    fn storage_full_is_fatal() {
        let data = image();
        let (target, device) = fake_device(1, |_, mut stream| {
            read_header(&mut stream);
            respond(&mut stream, ResponseCode::StorageFull);
        });

        let err = upload_to(&target, &data, &opts(), &ProgressBar::hidden()).unwrap_err();
        assert!(err.to_string().contains("storage full"));
        device.join().unwrap();
    }

    #[test]
    fn endless_rebooting_is_bounded() {
        let data = image();
        let mut options = opts();
        options.reconnect_attempts = 1;
        let (target, device) = fake_device(2, |_, mut stream| {
            read_header(&mut stream);
            respond(&mut stream, ResponseCode::Rebooting);
        });

        let err = upload_to(&target, &data, &options, &ProgressBar::hidden()).unwrap_err();
        assert!(err.to_string().contains("kept rebooting"));
        device.join().unwrap();
    }
}

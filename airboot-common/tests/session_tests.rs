// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Transfer session state machine against an in-memory flash.

mod common;

use airboot_common::boot_fsm::{RebootKind, RunMode};
use airboot_common::crc32;
use airboot_common::layout::FlashLayout;
use airboot_common::protocol::{
    ResponseCode, TransferHeader, TransferResponse, APP_MAX_SIZE, APP_OFFSET,
};
use airboot_common::sector::{FlashError, RetryPolicy};
use airboot_common::session::{Phase, Progress, SessionError, TransferSession};
use common::{test_image, MemFlash, RecordingSink};

fn bootloader_session() -> TransferSession {
    TransferSession::new(
        RunMode::Bootloader,
        FlashLayout::DEFAULT,
        RetryPolicy::UNBOUNDED,
    )
}

fn header_for(image: &[u8]) -> [u8; 12] {
    TransferHeader::new(image.len() as u32, crc32::checksum(image)).encode()
}

fn response(code: ResponseCode) -> Vec<u8> {
    TransferResponse::new(code).encode().to_vec()
}

/// Feed `data` split at `cuts` (ascending offsets).
fn feed_split(
    session: &mut TransferSession,
    flash: &mut MemFlash,
    sink: &mut RecordingSink,
    data: &[u8],
    cuts: &[usize],
) -> Progress {
    let mut last = Progress::AwaitingHeader;
    let mut start = 0;
    for end in cuts.iter().copied().chain([data.len()]) {
        last = session.on_receive(flash, &data[start..end], sink).unwrap();
        start = end;
    }
    last
}

// =============================================================================
// Happy path
// =============================================================================

#[test]
fn test_two_sector_image_in_uneven_chunks() {
    let image = test_image(8192);
    let mut flash = MemFlash::full_size();
    let mut sink = RecordingSink::default();
    let mut session = bootloader_session();

    let progress = session
        .on_receive(&mut flash, &header_for(&image), &mut sink)
        .unwrap();
    assert_eq!(progress, Progress::HeaderAnswered(ResponseCode::Success));
    assert_eq!(session.phase(), Phase::Transferring);

    let progress = feed_split(&mut session, &mut flash, &mut sink, &image, &[1000, 5000]);

    assert_eq!(progress, Progress::Verified(ResponseCode::Success));
    assert_eq!(
        sink.sent,
        vec![response(ResponseCode::Success), response(ResponseCode::Success)]
    );
    assert_eq!(flash.writes, vec![APP_OFFSET, APP_OFFSET + 4096]);
    assert_eq!(flash.bytes(APP_OFFSET, 8192), &image[..]);
    assert_eq!(session.phase(), Phase::Succeeded);
    assert!(session.ready_to_reboot());
    assert_eq!(session.teardown(), Some(RebootKind::Plain));
}

#[test]
fn test_partial_last_sector_is_zero_filled() {
    let image = test_image(5000);
    let mut flash = MemFlash::full_size();
    let mut sink = RecordingSink::default();
    let mut session = bootloader_session();

    session
        .on_receive(&mut flash, &header_for(&image), &mut sink)
        .unwrap();
    let progress = session.on_receive(&mut flash, &image, &mut sink).unwrap();

    assert_eq!(progress, Progress::Verified(ResponseCode::Success));
    assert_eq!(flash.writes, vec![APP_OFFSET, APP_OFFSET + 4096]);
    assert!(flash
        .bytes(APP_OFFSET + 5000, 8192 - 5000)
        .iter()
        .all(|&b| b == 0));
    assert_eq!(session.committed(), 5000);
}

#[test]
fn test_header_split_across_segments() {
    let image = test_image(300);
    let header = header_for(&image);
    let mut flash = MemFlash::full_size();
    let mut sink = RecordingSink::default();
    let mut session = bootloader_session();

    for byte in &header[..11] {
        let progress = session
            .on_receive(&mut flash, core::slice::from_ref(byte), &mut sink)
            .unwrap();
        assert_eq!(progress, Progress::AwaitingHeader);
    }
    assert!(sink.sent.is_empty());

    let progress = session
        .on_receive(&mut flash, &header[11..], &mut sink)
        .unwrap();
    assert_eq!(progress, Progress::HeaderAnswered(ResponseCode::Success));
    assert_eq!(
        session.header(),
        Some(TransferHeader::new(300, crc32::checksum(&image)))
    );
}

#[test]
fn test_receiving_progress_counts_staged_bytes() {
    let image = test_image(10_000);
    let mut flash = MemFlash::full_size();
    let mut sink = RecordingSink::default();
    let mut session = bootloader_session();

    session
        .on_receive(&mut flash, &header_for(&image), &mut sink)
        .unwrap();
    let progress = session
        .on_receive(&mut flash, &image[..4500], &mut sink)
        .unwrap();

    assert_eq!(
        progress,
        Progress::Receiving {
            received: 4500,
            total: 10_000
        }
    );
    assert_eq!(session.committed(), 4096);
    assert_eq!(flash.writes, vec![APP_OFFSET]);
}

#[test]
fn test_arbitrary_segmentation_lands_identical_bytes() {
    let image = test_image(3 * 4096 + 123);
    let splits: [&[usize]; 4] = [
        &[],
        &[1, 2, 3],
        &[4095, 4096, 4097],
        &[700, 1400, 2100, 9000, 12_000],
    ];

    for cuts in splits {
        let mut flash = MemFlash::full_size();
        let mut sink = RecordingSink::default();
        let mut session = bootloader_session();

        session
            .on_receive(&mut flash, &header_for(&image), &mut sink)
            .unwrap();
        let progress = feed_split(&mut session, &mut flash, &mut sink, &image, cuts);

        assert_eq!(progress, Progress::Verified(ResponseCode::Success), "{cuts:?}");
        assert_eq!(flash.bytes(APP_OFFSET, image.len()), &image[..], "{cuts:?}");
        assert_eq!(flash.program_count(), 4, "{cuts:?}");
    }
}

#[test]
fn test_zero_size_payload_is_never_verified() {
    let mut flash = MemFlash::full_size();
    let mut sink = RecordingSink::default();
    let mut session = bootloader_session();

    let progress = session
        .on_receive(&mut flash, &header_for(&[]), &mut sink)
        .unwrap();

    assert_eq!(progress, Progress::HeaderAnswered(ResponseCode::Success));
    assert_eq!(session.phase(), Phase::Transferring);
    assert_eq!(sink.sent, vec![response(ResponseCode::Success)]);
    assert_eq!(
        session.on_receive(&mut flash, &[0xAA], &mut sink),
        Err(SessionError::PayloadOverrun)
    );
    assert!(flash.writes.is_empty());
    assert!(!session.ready_to_reboot());
    assert_eq!(session.teardown(), None);
}

#[test]
fn test_unaligned_image_verifies_against_padded_checksum() {
    let mut flash = MemFlash::full_size();
    let mut sink = RecordingSink::default();
    let mut session = bootloader_session();

    // Header as a host computes it for a 5-byte image.
    let header = TransferHeader::new(5, 0xFF13_B51D).encode();
    session.on_receive(&mut flash, &header, &mut sink).unwrap();
    let progress = session.on_receive(&mut flash, b"hello", &mut sink).unwrap();

    assert_eq!(progress, Progress::Verified(ResponseCode::Success));
    assert_eq!(flash.bytes(APP_OFFSET, 5), b"hello");
    assert_eq!(session.teardown(), Some(RebootKind::Plain));
}

#[test]
fn test_empty_segment_is_a_no_op() {
    let mut flash = MemFlash::full_size();
    let mut sink = RecordingSink::default();
    let mut session = bootloader_session();

    assert_eq!(
        session.on_receive(&mut flash, &[], &mut sink),
        Ok(Progress::AwaitingHeader)
    );
    assert!(sink.sent.is_empty());
}

// =============================================================================
// Checksum failure and resend
// =============================================================================

#[test]
fn test_checksum_failure_rewinds_for_resend() {
    let image = test_image(6000);
    let mut corrupted = image.clone();
    corrupted[4321] ^= 0xFF;

    let mut flash = MemFlash::full_size();
    let mut sink = RecordingSink::default();
    let mut session = bootloader_session();

    session
        .on_receive(&mut flash, &header_for(&image), &mut sink)
        .unwrap();
    let progress = session
        .on_receive(&mut flash, &corrupted, &mut sink)
        .unwrap();

    assert_eq!(progress, Progress::Verified(ResponseCode::ChecksumFailed));
    assert_eq!(session.phase(), Phase::Transferring);
    assert_eq!(session.committed(), 0);
    assert!(!session.ready_to_reboot());

    let progress = session.on_receive(&mut flash, &image, &mut sink).unwrap();

    assert_eq!(progress, Progress::Verified(ResponseCode::Success));
    assert_eq!(
        flash.writes,
        vec![APP_OFFSET, APP_OFFSET + 4096, APP_OFFSET, APP_OFFSET + 4096]
    );
    assert_eq!(flash.bytes(APP_OFFSET, image.len()), &image[..]);
    assert_eq!(
        sink.sent,
        vec![
            response(ResponseCode::Success),
            response(ResponseCode::ChecksumFailed),
            response(ResponseCode::Success),
        ]
    );
}

#[test]
fn test_failed_verify_without_resend_does_not_reboot() {
    let image = test_image(100);
    let mut flash = MemFlash::full_size();
    let mut sink = RecordingSink::default();
    let mut session = bootloader_session();

    session
        .on_receive(&mut flash, &header_for(&image), &mut sink)
        .unwrap();
    session
        .on_receive(&mut flash, &[0u8; 100], &mut sink)
        .unwrap();

    assert_eq!(session.teardown(), None);
}

// =============================================================================
// Refusals
// =============================================================================

#[test]
fn test_bad_magic_aborts_without_writing() {
    let mut header = header_for(&test_image(64));
    header[0] = b'X';
    let mut flash = MemFlash::full_size();
    let mut sink = RecordingSink::default();
    let mut session = bootloader_session();

    assert_eq!(
        session.on_receive(&mut flash, &header, &mut sink),
        Err(SessionError::BadMagic)
    );
    assert!(sink.sent.is_empty());
    assert!(flash.writes.is_empty());
}

#[test]
fn test_oversized_payload_gets_storage_full() {
    let header = TransferHeader::new(APP_MAX_SIZE + 1, 0).encode();
    let mut flash = MemFlash::full_size();
    let mut sink = RecordingSink::default();
    let mut session = bootloader_session();

    let progress = session.on_receive(&mut flash, &header, &mut sink).unwrap();
    assert_eq!(progress, Progress::HeaderAnswered(ResponseCode::StorageFull));
    assert_eq!(sink.sent, vec![response(ResponseCode::StorageFull)]);

    assert_eq!(
        session.on_receive(&mut flash, &[1, 2, 3], &mut sink),
        Err(SessionError::PayloadRefused)
    );
    assert!(flash.writes.is_empty());
    assert_eq!(session.teardown(), None);
}

#[test]
fn test_largest_payload_is_accepted() {
    let header = TransferHeader::new(APP_MAX_SIZE, 0).encode();
    let mut flash = MemFlash::full_size();
    let mut sink = RecordingSink::default();
    let mut session = bootloader_session();

    let progress = session.on_receive(&mut flash, &header, &mut sink).unwrap();
    assert_eq!(progress, Progress::HeaderAnswered(ResponseCode::Success));
}

#[test]
fn test_application_answers_rebooting_and_never_writes() {
    let image = test_image(4096);
    let mut flash = MemFlash::full_size();
    let mut sink = RecordingSink::default();
    let mut session = TransferSession::new(
        RunMode::Application,
        FlashLayout::DEFAULT,
        RetryPolicy::UNBOUNDED,
    );

    let progress = session
        .on_receive(&mut flash, &header_for(&image), &mut sink)
        .unwrap();

    assert_eq!(progress, Progress::HeaderAnswered(ResponseCode::Rebooting));
    assert_eq!(sink.sent, vec![response(ResponseCode::Rebooting)]);
    assert!(session.ready_to_reboot());
    assert!(flash.writes.is_empty());
    assert_eq!(session.teardown(), Some(RebootKind::IntoBootloader));
}

#[test]
fn test_storage_full_wins_over_rebooting() {
    let header = TransferHeader::new(APP_MAX_SIZE + 1, 0).encode();
    let mut flash = MemFlash::full_size();
    let mut sink = RecordingSink::default();
    let mut session = TransferSession::new(
        RunMode::Application,
        FlashLayout::DEFAULT,
        RetryPolicy::UNBOUNDED,
    );

    let progress = session.on_receive(&mut flash, &header, &mut sink).unwrap();
    assert_eq!(progress, Progress::HeaderAnswered(ResponseCode::StorageFull));
    assert_eq!(session.teardown(), None);
}

// =============================================================================
// Protocol violations and failures
// =============================================================================

#[test]
fn test_payload_glued_to_header_is_rejected() {
    let image = test_image(64);
    let mut segment = header_for(&image).to_vec();
    segment.extend_from_slice(&image);

    let mut flash = MemFlash::full_size();
    let mut sink = RecordingSink::default();
    let mut session = bootloader_session();

    assert_eq!(
        session.on_receive(&mut flash, &segment, &mut sink),
        Err(SessionError::HeaderOverrun)
    );
    assert!(sink.sent.is_empty());
}

#[test]
fn test_extra_payload_bytes_are_an_overrun() {
    let image = test_image(100);
    let mut flash = MemFlash::full_size();
    let mut sink = RecordingSink::default();
    let mut session = bootloader_session();

    session
        .on_receive(&mut flash, &header_for(&image), &mut sink)
        .unwrap();
    let mut too_long = image.clone();
    too_long.push(0);

    assert_eq!(
        session.on_receive(&mut flash, &too_long, &mut sink),
        Err(SessionError::PayloadOverrun)
    );
    assert!(flash.writes.is_empty());
}

#[test]
fn test_bytes_after_success_are_an_overrun() {
    let image = test_image(10);
    let mut flash = MemFlash::full_size();
    let mut sink = RecordingSink::default();
    let mut session = bootloader_session();

    session
        .on_receive(&mut flash, &header_for(&image), &mut sink)
        .unwrap();
    session.on_receive(&mut flash, &image, &mut sink).unwrap();

    assert_eq!(
        session.on_receive(&mut flash, &[0], &mut sink),
        Err(SessionError::PayloadOverrun)
    );
}

#[test]
fn test_send_failure_is_reported() {
    let image = test_image(10);
    let mut flash = MemFlash::full_size();
    let mut sink = RecordingSink {
        fail: true,
        ..Default::default()
    };
    let mut session = bootloader_session();

    assert!(matches!(
        session.on_receive(&mut flash, &header_for(&image), &mut sink),
        Err(SessionError::Link(_))
    ));
}

#[test]
fn test_flash_failure_with_bounded_retry() {
    let image = test_image(4096);
    let mut flash = MemFlash::full_size();
    flash.failing_programs = 3;
    let mut sink = RecordingSink::default();
    let mut session = TransferSession::new(
        RunMode::Bootloader,
        FlashLayout::DEFAULT,
        RetryPolicy::bounded(2),
    );

    session
        .on_receive(&mut flash, &header_for(&image), &mut sink)
        .unwrap();
    assert_eq!(
        session.on_receive(&mut flash, &image, &mut sink),
        Err(SessionError::Flash(FlashError::RetriesExhausted {
            attempts: 2
        }))
    );
}

#[test]
fn test_marginal_programming_is_retried_transparently() {
    let image = test_image(4096);
    let mut flash = MemFlash::full_size();
    flash.failing_programs = 2;
    let mut sink = RecordingSink::default();
    let mut session = bootloader_session();

    session
        .on_receive(&mut flash, &header_for(&image), &mut sink)
        .unwrap();
    let progress = session.on_receive(&mut flash, &image, &mut sink).unwrap();

    assert_eq!(progress, Progress::Verified(ResponseCode::Success));
    assert_eq!(flash.writes, vec![APP_OFFSET; 3]);
}

#[test]
fn test_declared_checksum_mismatch_on_one_mib_layout() {
    let layout = FlashLayout {
        app_max_size: 1024 * 1024,
        ..FlashLayout::DEFAULT
    };
    assert!(layout.is_valid());

    let image = test_image(8192);
    assert_ne!(crc32::checksum(&image), 0xDEAD_BEEF);

    let mut flash = MemFlash::full_size();
    let mut sink = RecordingSink::default();
    let mut session = TransferSession::new(RunMode::Bootloader, layout, RetryPolicy::UNBOUNDED);

    let header = TransferHeader::new(8192, 0xDEAD_BEEF).encode();
    assert_eq!(
        session.on_receive(&mut flash, &header, &mut sink),
        Ok(Progress::HeaderAnswered(ResponseCode::Success))
    );

    let progress = feed_split(&mut session, &mut flash, &mut sink, &image, &[10, 6000]);

    assert_eq!(progress, Progress::Verified(ResponseCode::ChecksumFailed));
    assert_eq!(flash.writes, vec![APP_OFFSET, APP_OFFSET + 4096]);
    assert_eq!(session.committed(), 0);
}

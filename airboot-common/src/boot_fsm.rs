// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Boot arbitration - pure logic without hardware dependencies.
//!
//! At every reset the bootloader decides between three outcomes: halt
//! (its own image overflows the reserved region), stay in bootloader mode,
//! or jump into the installed application. The inputs are sampled by the
//! caller; the reset-surviving [`BootSignal`] is accessed through
//! [`ScratchRegisters`] so the one-shot semantics can be tested on a host.

use crate::layout::FlashLayout;
use crate::protocol::BOOT_SIGNAL_MAGIC;

/// Two words of storage that survive a reset.
pub trait ScratchRegisters {
    fn read(&self) -> [u32; 2];
    fn write(&mut self, words: [u32; 2]);
}

/// "Enter the bootloader on next boot": a magic value and its complement.
///
/// The complement keeps random power-on content from reading as a live
/// request.
pub struct BootSignal;

impl BootSignal {
    pub const ARMED: [u32; 2] = [BOOT_SIGNAL_MAGIC, !BOOT_SIGNAL_MAGIC];
    pub const CLEAR: [u32; 2] = [0, 0];

    pub fn is_armed(words: [u32; 2]) -> bool {
        words == Self::ARMED
    }

    pub fn arm<S: ScratchRegisters + ?Sized>(scratch: &mut S) {
        scratch.write(Self::ARMED);
    }

    pub fn clear<S: ScratchRegisters + ?Sized>(scratch: &mut S) {
        scratch.write(Self::CLEAR);
    }
}

/// True if the override input is asserted or the boot signal is armed.
///
/// The scratch pair is cleared unconditionally, so a request is consumed by
/// the first boot that looks at it.
pub fn bootloader_requested<S: ScratchRegisters + ?Sized>(
    override_asserted: bool,
    scratch: &mut S,
) -> bool {
    let armed = BootSignal::is_armed(scratch.read());
    BootSignal::clear(scratch);
    override_asserted || armed
}

/// Outcome of the reset-time arbitration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootDecision {
    /// Bootloader image overlaps the application region; never touch flash.
    Halt,
    EnterBootloader,
    JumpToApplication,
}

/// Top-level boot policy.
///
/// The boot signal is only consumed once the footprint check has passed.
pub fn decide_boot<S: ScratchRegisters + ?Sized>(
    layout: &FlashLayout,
    image_end: u32,
    override_asserted: bool,
    scratch: &mut S,
) -> BootDecision {
    if !layout.bootloader_fits(image_end) {
        return BootDecision::Halt;
    }
    if bootloader_requested(override_asserted, scratch) {
        BootDecision::EnterBootloader
    } else {
        BootDecision::JumpToApplication
    }
}

/// Which of the two programs sharing the flash is currently executing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunMode {
    Bootloader,
    Application,
}

impl RunMode {
    /// Classify the running image by where its flash footprint ends.
    pub fn detect(layout: &FlashLayout, image_end: u32) -> Self {
        if layout.is_bootloader_image(image_end) {
            Self::Bootloader
        } else {
            Self::Application
        }
    }

    /// Reset to perform once a session that asked for one is torn down.
    ///
    /// The application hands over to the bootloader so the retry lands on a
    /// fresh connection; the bootloader resets plainly so the next
    /// arbitration boots the freshly verified image.
    pub fn teardown_reboot(self) -> RebootKind {
        match self {
            Self::Bootloader => RebootKind::Plain,
            Self::Application => RebootKind::IntoBootloader,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RebootKind {
    /// Reset with the boot signal cleared.
    Plain,
    /// Arm the boot signal, then reset.
    IntoBootloader,
}

impl RebootKind {
    /// Scratch content to leave behind right before resetting.
    pub fn scratch_words(self) -> [u32; 2] {
        match self {
            Self::Plain => BootSignal::CLEAR,
            Self::IntoBootloader => BootSignal::ARMED,
        }
    }
}

//! Fail-safe firmware update and boot orchestration for bootloaders without an OS.
//!
//! The crate decides, once per power-on, which image to run: the installed firmware,
//! a freshly staged update, or the recovery firmware. Every decision is driven by a
//! handful of bits in retained registers, so that a reset at any point leaves the
//! device able to boot something.
#![no_std]

use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind};

pub mod boot;
pub mod bootbits;
pub mod checksum;
pub mod copy;
pub mod descriptor;
pub mod layout;
pub mod reset_loop;
pub mod retained;
pub mod selftest;
pub mod sequencer;
pub mod strikes;
pub mod update;

pub use bootbits::{BootBit, BootBits};
pub use descriptor::FirmwareDescriptor;
pub use layout::{FlashRegion, Layout, Region};
pub use retained::{Protection, RetainedRegisters};
pub use sequencer::{BootSequencer, Decision, ErrorCode};
pub use update::UpdateState;

#[cfg(test)]
extern crate std;

#[cfg(test)]
mod mock;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Error {
    /// The flash driver rejected an operation.
    Flash(NorFlashErrorKind),
    /// An address range falls outside of the region it was meant for.
    OutOfBounds,
    /// The transfer buffer cannot hold a single write unit.
    BufferTooSmall,
    /// Descriptor bytes could not be decoded.
    Descriptor,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Flash(kind) => defmt::write!(f, "Flash({})", defmt::Debug2Format(kind)),
            Error::OutOfBounds => defmt::write!(f, "OutOfBounds"),
            Error::BufferTooSmall => defmt::write!(f, "BufferTooSmall"),
            Error::Descriptor => defmt::write!(f, "Descriptor"),
        }
    }
}

impl Error {
    pub(crate) fn flash(error: impl NorFlashError) -> Self {
        Error::Flash(error.kind())
    }
}

/// Flash part holding every region of the [`Layout`].
///
/// `ERASE_SIZE` is the smallest erase unit (sub-sector). Reads must be byte granular.
pub trait BootFlash: NorFlash {
    /// Largest erase unit, a multiple of `ERASE_SIZE`.
    const SECTOR_SIZE: usize;

    /// Check that the part responds and identifies as expected.
    fn sanity_check(&mut self) -> bool;
}

/// Hardware watchdog that must be serviced during long blocking operations.
pub trait Watchdog {
    fn feed(&mut self);
}

/// Why the processor came out of reset.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetCause {
    PowerOn,
    Pin,
    Software,
    Watchdog,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Button {
    Back = 0,
    Up = 1,
    Select = 2,
    Down = 3,
}

impl Button {
    pub const ALL: [Button; 4] = [Button::Back, Button::Up, Button::Select, Button::Down];
}

/// Everything the boot sequence needs from a concrete board.
///
/// Implemented once per hardware variant.
pub trait Board: Watchdog {
    const LAYOUT: Layout;

    fn reset_cause(&self) -> ResetCause;

    fn is_pressed(&self, button: Button) -> bool;

    fn delay_ms(&mut self, ms: u32);

    /// Update indicator, `percent` in `0..=100`.
    fn show_progress(&mut self, percent: u8);

    fn show_error(&mut self, code: ErrorCode);

    fn system_reset(&mut self) -> !;

    fn enter_standby(&mut self) -> !;

    fn shutdown(&mut self) -> !;
}

//! Flash region table of a hardware variant.

use crate::{Error, retained::Protection};

/// `[begin, end)` byte range in flash.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashRegion {
    pub begin: u32,
    pub end: u32,
}

impl FlashRegion {
    pub const fn new(begin: u32, end: u32) -> Self {
        Self { begin, end }
    }

    pub const fn len(&self) -> u32 {
        self.end - self.begin
    }

    /// Sub-range of `len` bytes starting `offset` bytes into the region.
    pub fn subrange(&self, offset: u32, len: u32) -> Result<FlashRegion, Error> {
        let begin = self.begin.checked_add(offset).ok_or(Error::OutOfBounds)?;
        let end = begin.checked_add(len).ok_or(Error::OutOfBounds)?;

        if end > self.end {
            return Err(Error::OutOfBounds);
        }

        Ok(FlashRegion { begin, end })
    }
}

/// Named regions the boot sequence knows about.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Region {
    /// Staging area for a candidate image, written by the external updater.
    Scratch,
    /// The firmware the device normally boots.
    Firmware,
    /// Rarely changed known-good fallback image.
    SafeFirmware,
}

/// Build-time description of a board's flash and retained memory.
///
/// Regions must not overlap and must be aligned to the largest erase unit of the part.
#[derive(Clone, Copy, Debug)]
pub struct Layout {
    pub scratch: FlashRegion,
    pub firmware: FlashRegion,
    pub safe_firmware: FlashRegion,
    /// Address at which the firmware region is mapped for execution.
    pub firmware_vector_table: usize,
    pub retained: Protection,
}

impl Layout {
    pub const fn region(&self, region: Region) -> FlashRegion {
        match region {
            Region::Scratch => self.scratch,
            Region::Firmware => self.firmware,
            Region::SafeFirmware => self.safe_firmware,
        }
    }
}

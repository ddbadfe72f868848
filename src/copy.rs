//! Erase a destination range and copy a source range into it, chunk by chunk.
//!
//! The engine does not retry: a failed driver call ends the operation and leaves the
//! destination in whatever state the flash part was left in. Deciding what to do about
//! a half written destination is up to the caller.

use embedded_storage::nor_flash::NorFlashErrorKind;

use crate::{BootFlash, Error, Watchdog};

/// Upper bound on the bytes moved per read/write pair.
pub const MAX_CHUNK: usize = 64 * 1024;

/// A single erase command, either a sub-sector or a full sector.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EraseUnit {
    pub addr: u32,
    pub size: u32,
}

/// Plan the erase commands covering `len` bytes from `begin`, rounded up to whole sub-sectors.
///
/// Full sectors are used wherever a sector boundary allows it.
pub fn erase_plan(
    begin: u32,
    len: u32,
    subsector: u32,
    sector: u32,
) -> impl Iterator<Item = EraseUnit> {
    let end = begin + len.div_ceil(subsector) * subsector;
    let mut addr = begin;

    core::iter::from_fn(move || {
        if addr >= end {
            return None;
        }

        let size = if addr % sector == 0 && end - addr >= sector {
            sector
        } else {
            subsector
        };

        let unit = EraseUnit { addr, size };
        addr += size;
        Some(unit)
    })
}

/// Observer of a long running flash operation.
///
/// Fed after every driver call, so it doubles as the watchdog service.
pub trait Progress: Watchdog {
    /// `done` never decreases and equals `total` only once the operation completed.
    fn report(&mut self, _done: u32, _total: u32) {}
}

pub struct FlashCopy<'a, F> {
    flash: &'a mut F,
    /// Transfer buffer, expected to live in static memory rather than on the stack.
    buffer: &'a mut [u8],
}

impl<'a, F: BootFlash> FlashCopy<'a, F> {
    pub fn new(flash: &'a mut F, buffer: &'a mut [u8]) -> Self {
        Self { flash, buffer }
    }

    /// Erase at least `len` bytes starting at the sub-sector aligned `begin`.
    ///
    /// Progress is reported once before the first erase and after every command.
    pub fn erase(
        &mut self,
        begin: u32,
        len: u32,
        progress: &mut impl Progress,
    ) -> Result<(), Error> {
        let subsector = F::ERASE_SIZE as u32;
        let sector = F::SECTOR_SIZE as u32;

        if begin % subsector != 0 {
            return Err(Error::Flash(NorFlashErrorKind::NotAligned));
        }

        let total = len.div_ceil(subsector) * subsector;
        let mut done = 0;
        progress.report(done, total);

        for unit in erase_plan(begin, len, subsector, sector) {
            self.flash
                .erase(unit.addr, unit.addr + unit.size)
                .map_err(Error::flash)?;
            progress.feed();

            done += unit.size;
            progress.report(done, total);
        }

        Ok(())
    }

    /// Copy `len` bytes from `from` to the already erased `to`.
    ///
    /// A trailing partial write unit is padded with the erased value.
    pub fn copy(
        &mut self,
        from: u32,
        to: u32,
        len: u32,
        progress: &mut impl Progress,
    ) -> Result<(), Error> {
        let write_size = F::WRITE_SIZE;
        let usable = usize::min(self.buffer.len(), MAX_CHUNK);
        let chunk = usable - usable % write_size;

        if chunk == 0 {
            return Err(Error::BufferTooSmall);
        }

        let mut done = 0;
        progress.report(done, len);

        while done < len {
            let n = usize::min(chunk, (len - done) as usize);
            let padded = n.next_multiple_of(write_size);
            let buf = &mut self.buffer[..padded];

            self.flash
                .read(from + done, &mut buf[..n])
                .map_err(Error::flash)?;
            buf[n..].fill(0xff);
            self.flash.write(to + done, buf).map_err(Error::flash)?;
            progress.feed();

            done += n as u32;
            progress.report(done, len);
        }

        Ok(())
    }
}

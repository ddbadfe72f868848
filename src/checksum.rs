//! CRC-32 over flash, streamed through a small stack buffer.

use crc::{CRC_32_ISO_HDLC, Crc};
use embedded_storage::nor_flash::ReadNorFlash;

use crate::{Error, Watchdog, layout::FlashRegion};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

const READ_CHUNK: usize = 1024;

/// Checksum of bytes already in memory.
pub fn checksum_bytes(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// Checksum of a flash range, identical to [`checksum_bytes`] over the same content.
pub fn checksum_flash<F: ReadNorFlash>(
    flash: &mut F,
    range: FlashRegion,
    watchdog: &mut impl Watchdog,
) -> Result<u32, Error> {
    let mut buffer = [0u8; READ_CHUNK];
    let mut digest = CRC32.digest();
    let mut addr = range.begin;

    while addr < range.end {
        let len = usize::min(READ_CHUNK, (range.end - addr) as usize);
        let chunk = &mut buffer[..len];

        flash.read(addr, chunk).map_err(Error::flash)?;
        digest.update(chunk);

        addr += len as u32;
        watchdog.feed();
    }

    Ok(digest.finalize())
}

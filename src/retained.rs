//! Words that survive a warm reset.
//!
//! Backed by battery retained SRAM or a backup register block. On variants where the
//! block can come up scrambled, the last word holds a CRC over the others and a
//! mismatch at [`Retained::init`] zeroes the whole block.

use crc::{CRC_32_ISO_HDLC, Crc};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Raw retained register block, addressed by index.
///
/// Every access is a single 32-bit bus transaction.
pub trait RetainedRegisters {
    /// Number of words in the block.
    fn len(&self) -> usize;

    fn read(&self, index: usize) -> u32;

    fn write(&mut self, index: usize, value: u32);
}

impl<T: RetainedRegisters + ?Sized> RetainedRegisters for &mut T {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn read(&self, index: usize) -> u32 {
        (**self).read(index)
    }

    fn write(&mut self, index: usize, value: u32) {
        (**self).write(index, value)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Protection {
    None,
    /// Last word of the block holds a CRC-32 over all preceding words.
    Crc,
}

/// Slots in the retained block used by the bootloader.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Register {
    BootBits = 0,
    StuckButtons = 1,
    BootloaderVersion = 2,
    LastError = 3,
}

impl Register {
    const COUNT: usize = 4;
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Integrity {
    Intact,
    /// The block failed its CRC and was zeroed.
    Scrambled,
}

pub struct Retained<R> {
    inner: R,
    protection: Protection,
}

impl<R: RetainedRegisters> Retained<R> {
    pub fn new(inner: R, protection: Protection) -> Self {
        let crc_slot = usize::from(protection == Protection::Crc);
        debug_assert!(inner.len() >= Register::COUNT + crc_slot);

        Self { inner, protection }
    }

    /// Validate the block; must run before any value is trusted.
    pub fn init(&mut self) -> Integrity {
        if self.protection == Protection::None {
            return Integrity::Intact;
        }

        if self.inner.read(self.crc_index()) == self.compute_crc() {
            return Integrity::Intact;
        }

        log::warn!("retained registers failed CRC, clearing");
        for index in 0..self.crc_index() {
            self.inner.write(index, 0);
        }
        self.update_crc();

        Integrity::Scrambled
    }

    pub(crate) fn read(&self, register: Register) -> u32 {
        self.inner.read(register as usize)
    }

    pub(crate) fn write(&mut self, register: Register, value: u32) {
        self.inner.write(register as usize, value);
        self.update_crc();
    }

    fn crc_index(&self) -> usize {
        self.inner.len() - 1
    }

    fn compute_crc(&self) -> u32 {
        let mut digest = CRC32.digest();
        for index in 0..self.crc_index() {
            digest.update(&self.inner.read(index).to_le_bytes());
        }
        digest.finalize()
    }

    fn update_crc(&mut self) {
        if self.protection == Protection::Crc {
            let crc = self.compute_crc();
            self.inner.write(self.crc_index(), crc);
        }
    }
}

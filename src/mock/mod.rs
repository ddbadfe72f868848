//! In-memory stand-ins for the flash part, retained registers and board.

use std::{vec, vec::Vec};

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash, check_erase, check_read, check_write,
};

use crate::{
    Board, BootFlash, Button, ResetCause, Watchdog,
    bootbits::BootBits,
    checksum::checksum_bytes,
    descriptor::FirmwareDescriptor,
    layout::{FlashRegion, Layout},
    retained::{Protection, RetainedRegisters},
    sequencer::ErrorCode,
};

pub const SUBSECTOR_SIZE: u32 = 256;
pub const SECTOR_SIZE: u32 = 1024;

const CAPACITY: usize = 0x3000;

/// NOR flash semantics: erase sets bytes to `0xff`, programming can only clear bits.
pub struct MockFlash {
    pub data: Vec<u8>,
    pub present: bool,
    pub reads: usize,
    pub writes: usize,
    pub erases: usize,
    /// Fail every write once this many writes have succeeded.
    pub fail_write_after: Option<usize>,
    /// Flip a bit at this address whenever a write covers it.
    pub corrupt_write_at: Option<u32>,
    /// Panic, as a reset would cut the boot short, once this many writes have succeeded.
    pub lose_power_after: Option<usize>,
}

impl MockFlash {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0xff; capacity],
            present: true,
            reads: 0,
            writes: 0,
            erases: 0,
            fail_write_after: None,
            corrupt_write_at: None,
            lose_power_after: None,
        }
    }

    /// Flash of the mock board with `firmware` installed.
    pub fn with_firmware(firmware: &[u8]) -> Self {
        let mut flash = Self::new(CAPACITY);
        flash.load(<MockBoard as Board>::LAYOUT.firmware.begin, firmware);
        flash
    }

    /// Place bytes directly, bypassing the counters.
    pub fn load(&mut self, addr: u32, bytes: &[u8]) {
        let start = addr as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
    }
}

impl ErrorType for MockFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for MockFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_read(self, offset, bytes.len())?;
        self.reads += 1;

        let start = offset as usize;
        bytes.copy_from_slice(&self.data[start..start + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl NorFlash for MockFlash {
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = SUBSECTOR_SIZE as usize;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        check_erase(self, from, to)?;
        self.erases += 1;

        self.data[from as usize..to as usize].fill(0xff);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        check_write(self, offset, bytes.len())?;
        if self.lose_power_after.is_some_and(|n| self.writes >= n) {
            panic!("power lost");
        }
        if self.fail_write_after.is_some_and(|n| self.writes >= n) {
            return Err(NorFlashErrorKind::Other);
        }
        self.writes += 1;

        let start = offset as usize;
        for (cell, byte) in self.data[start..start + bytes.len()].iter_mut().zip(bytes) {
            *cell &= *byte;
        }

        if let Some(addr) = self.corrupt_write_at {
            if (offset..offset + bytes.len() as u32).contains(&addr) {
                self.data[addr as usize] ^= 0x01;
            }
        }

        Ok(())
    }
}

impl BootFlash for MockFlash {
    const SECTOR_SIZE: usize = SECTOR_SIZE as usize;

    fn sanity_check(&mut self) -> bool {
        self.present
    }
}

pub struct MockRegisters {
    pub words: [u32; 8],
}

impl MockRegisters {
    pub const fn new() -> Self {
        Self { words: [0; 8] }
    }
}

impl RetainedRegisters for MockRegisters {
    fn len(&self) -> usize {
        self.words.len()
    }

    fn read(&self, index: usize) -> u32 {
        self.words[index]
    }

    fn write(&mut self, index: usize, value: u32) {
        self.words[index] = value;
    }
}

pub struct NoWatchdog;

impl Watchdog for NoWatchdog {
    fn feed(&mut self) {}
}

/// Board with a virtual clock; buttons can be scheduled to release at a given time.
pub struct MockBoard {
    pub reset_cause: ResetCause,
    pressed: [bool; 4],
    release_at: [Option<u32>; 4],
    pub elapsed_ms: u32,
    pub feeds: usize,
    pub progress: Vec<u8>,
    pub errors: Vec<ErrorCode>,
    pub resets: usize,
    pub standby: bool,
    pub shut_down: bool,
}

impl MockBoard {
    pub fn new() -> Self {
        Self {
            reset_cause: ResetCause::PowerOn,
            pressed: [false; 4],
            release_at: [None; 4],
            elapsed_ms: 0,
            feeds: 0,
            progress: Vec::new(),
            errors: Vec::new(),
            resets: 0,
            standby: false,
            shut_down: false,
        }
    }

    pub fn press(&mut self, button: Button) {
        self.pressed[button as usize] = true;
        self.release_at[button as usize] = None;
    }

    pub fn release(&mut self, button: Button) {
        self.pressed[button as usize] = false;
    }

    pub fn release_after(&mut self, button: Button, ms: u32) {
        self.release_at[button as usize] = Some(self.elapsed_ms + ms);
    }
}

impl Watchdog for MockBoard {
    fn feed(&mut self) {
        self.feeds += 1;
    }
}

impl Board for MockBoard {
    const LAYOUT: Layout = Layout {
        firmware: FlashRegion::new(0x0000, 0x1000),
        safe_firmware: FlashRegion::new(0x1000, 0x2000),
        scratch: FlashRegion::new(0x2000, 0x3000),
        firmware_vector_table: 0x0800_0000,
        retained: Protection::None,
    };

    fn reset_cause(&self) -> ResetCause {
        self.reset_cause
    }

    fn is_pressed(&self, button: Button) -> bool {
        let index = button as usize;
        self.pressed[index] && self.release_at[index].is_none_or(|at| self.elapsed_ms < at)
    }

    fn delay_ms(&mut self, ms: u32) {
        self.elapsed_ms += ms;
    }

    fn show_progress(&mut self, percent: u8) {
        self.progress.push(percent);
    }

    fn show_error(&mut self, code: ErrorCode) {
        self.errors.push(code);
    }

    // Terminal actions record themselves and unwind out of the boot sequence.

    fn system_reset(&mut self) -> ! {
        self.resets += 1;
        panic!("system reset");
    }

    fn enter_standby(&mut self) -> ! {
        self.standby = true;
        panic!("standby");
    }

    fn shutdown(&mut self) -> ! {
        self.shut_down = true;
        panic!("shutdown");
    }
}

/// Deterministic image content; `seed` keeps images distinguishable.
pub fn image(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u32).wrapping_mul(31).wrapping_add(u32::from(seed) * 17 + 1) as u8)
        .collect()
}

/// Write a descriptor followed by `image` at the start of `region`.
pub fn stage(flash: &mut MockFlash, region: FlashRegion, image: &[u8]) {
    let descriptor = FirmwareDescriptor::new(image.len() as u32, checksum_bytes(image));
    flash.load(region.begin, &descriptor.to_bytes().unwrap());
    flash.load(region.begin + FirmwareDescriptor::SIZE, image);
}

pub fn test_bits() -> BootBits<MockRegisters> {
    let mut bits = BootBits::with_layout(MockRegisters::new(), &<MockBoard as Board>::LAYOUT);
    bits.init();
    bits
}

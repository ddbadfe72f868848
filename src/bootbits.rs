//! Named boolean flags kept in one retained register.
//!
//! The raw register is only ever touched here; every other module goes through
//! [`BootBits::test`], [`BootBits::set`] and [`BootBits::clear`].

use crate::{
    layout::Layout,
    retained::{Integrity, Register, Retained, RetainedRegisters},
};

/// A flag in the boot bit register; the discriminant is its bit position.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootBit {
    Initialized = 0,
    NewFwAvailable = 1,
    NewFwUpdateInProgress = 2,
    FwStartFailStrikeOne = 3,
    FwStartFailStrikeTwo = 4,
    RecoveryLoadFailStrikeOne = 5,
    RecoveryLoadFailStrikeTwo = 6,
    RecoveryStartInProgress = 7,
    StandbyModeRequested = 8,
    SoftwareFailureOccurred = 9,
    ResetLoopDetectOne = 10,
    ResetLoopDetectTwo = 11,
    ResetLoopDetectThree = 12,
    FwStable = 13,
    NewFwInstalled = 14,
    StandbyModeEntered = 15,
    ForcePrf = 16,
    ShutdownRequested = 17,
}

impl BootBit {
    const fn mask(self) -> u32 {
        1 << self as u32
    }
}

/// Boot bits plus the other retained slots the bootloader owns.
pub struct BootBits<R> {
    store: Retained<R>,
}

impl<R: RetainedRegisters> BootBits<R> {
    pub fn new(store: Retained<R>) -> Self {
        Self { store }
    }

    /// Boot bits over `registers`, protected as the board layout requires.
    pub fn with_layout(registers: R, layout: &Layout) -> Self {
        Self::new(Retained::new(registers, layout.retained))
    }

    /// Validate the retained block and make sure the register is initialized.
    ///
    /// On a cold or scrambled block every bit except [`BootBit::Initialized`] reads as clear.
    pub fn init(&mut self) -> Integrity {
        let integrity = self.store.init();

        if !self.test(BootBit::Initialized) {
            log::info!("boot bits not initialized, resetting");
            self.store
                .write(Register::BootBits, BootBit::Initialized.mask());
        }

        integrity
    }

    pub fn test(&self, bit: BootBit) -> bool {
        self.store.read(Register::BootBits) & bit.mask() != 0
    }

    pub fn set(&mut self, bit: BootBit) {
        let value = self.store.read(Register::BootBits);
        self.store.write(Register::BootBits, value | bit.mask());
    }

    pub fn clear(&mut self, bit: BootBit) {
        let value = self.store.read(Register::BootBits);
        self.store.write(Register::BootBits, value & !bit.mask());
    }

    pub fn assign(&mut self, bit: BootBit, on: bool) {
        if on {
            self.set(bit);
        } else {
            self.clear(bit);
        }
    }

    /// Test and clear a one-shot signal.
    pub fn take(&mut self, bit: BootBit) -> bool {
        let was_set = self.test(bit);
        if was_set {
            self.clear(bit);
        }
        was_set
    }

    pub(crate) fn stuck_buttons(&self) -> u32 {
        self.store.read(Register::StuckButtons)
    }

    pub(crate) fn set_stuck_buttons(&mut self, value: u32) {
        self.store.write(Register::StuckButtons, value);
    }

    pub fn bootloader_version(&self) -> u32 {
        self.store.read(Register::BootloaderVersion)
    }

    pub(crate) fn set_bootloader_version(&mut self, version: u32) {
        self.store.write(Register::BootloaderVersion, version);
    }

    /// Error code of the most recent diagnostic halt, 0 if none.
    pub fn last_error(&self) -> u32 {
        self.store.read(Register::LastError)
    }

    pub(crate) fn set_last_error(&mut self, code: u32) {
        self.store.write(Register::LastError, code);
    }
}

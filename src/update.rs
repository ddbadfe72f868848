//! Install an image described by a [`FirmwareDescriptor`] into another region.
//!
//! The same sequence serves two purposes: applying a pending update from scratch into
//! the firmware region, and loading the safe firmware into the firmware region.
//! Nothing in the destination is touched until both the descriptor and the source
//! checksum have been validated.

use crate::{
    Board, BootFlash, Watchdog,
    bootbits::{BootBit, BootBits},
    checksum::checksum_flash,
    copy::{FlashCopy, Progress},
    descriptor::FirmwareDescriptor,
    layout::FlashRegion,
    retained::RetainedRegisters,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateState {
    NotChecked,
    /// Header malformed or out of bounds. Destination untouched.
    DescriptorInvalid,
    /// Image bytes do not match the header checksum. Destination untouched.
    SourceCrcInvalid,
    Erasing(FirmwareDescriptor),
    Copying(FirmwareDescriptor),
    /// The destination was modified and does not hold the image.
    DestCrcMismatch,
    Done,
}

impl UpdateState {
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            UpdateState::DescriptorInvalid
                | UpdateState::SourceCrcInvalid
                | UpdateState::DestCrcMismatch
                | UpdateState::Done
        )
    }

    /// Whether the destination may have been modified by this attempt.
    pub const fn destination_mangled(&self) -> bool {
        matches!(
            self,
            UpdateState::Erasing(_) | UpdateState::Copying(_) | UpdateState::DestCrcMismatch
        )
    }
}

/// Result of [`apply_pending_update`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PendingUpdate {
    /// No update was staged.
    None,
    /// A previous attempt died half way; it was abandoned without touching flash.
    Interrupted,
    Finished(UpdateState),
}

/// Maps erase and copy onto the two halves of one 0–100 % indicator.
struct Indicator<'a, B> {
    board: &'a mut B,
    base: u8,
}

impl<B: Board> Watchdog for Indicator<'_, B> {
    fn feed(&mut self) {
        self.board.feed();
    }
}

impl<B: Board> Progress for Indicator<'_, B> {
    fn report(&mut self, done: u32, total: u32) {
        let half = match total {
            0 => 50,
            total => (u64::from(done) * 50 / u64::from(total)) as u8,
        };
        self.board.show_progress(self.base + half);
    }
}

pub struct Installer<'a, F, B> {
    flash: &'a mut F,
    board: &'a mut B,
    buffer: &'a mut [u8],
    source: FlashRegion,
    destination: FlashRegion,
}

impl<'a, F: BootFlash, B: Board> Installer<'a, F, B> {
    /// `source` starts with a descriptor, the image lands at the start of `destination`.
    pub fn new(
        flash: &'a mut F,
        board: &'a mut B,
        buffer: &'a mut [u8],
        source: FlashRegion,
        destination: FlashRegion,
    ) -> Self {
        Self {
            flash,
            board,
            buffer,
            source,
            destination,
        }
    }

    pub fn run(&mut self) -> UpdateState {
        let mut state = UpdateState::NotChecked;

        while !state.is_terminal() {
            state = self.step(state);
        }

        state
    }

    /// Advance the installation by one state.
    pub fn step(&mut self, state: UpdateState) -> UpdateState {
        match state {
            UpdateState::NotChecked => self.validate(),
            UpdateState::Erasing(descriptor) => self.erase(descriptor),
            UpdateState::Copying(descriptor) => self.copy(descriptor),
            terminal => terminal,
        }
    }

    fn validate(&mut self) -> UpdateState {
        let descriptor = match FirmwareDescriptor::read(&mut *self.flash, self.source) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                log::error!("failed to read descriptor: {:?}", e);
                return UpdateState::DescriptorInvalid;
            }
        };

        if !descriptor.is_valid(self.source, self.destination) {
            log::warn!("invalid descriptor {:?}", descriptor);
            return UpdateState::DescriptorInvalid;
        }

        let crc = descriptor
            .image(self.source)
            .and_then(|image| checksum_flash(&mut *self.flash, image, &mut *self.board));

        match crc {
            Ok(crc) if crc == descriptor.checksum => UpdateState::Erasing(descriptor),
            Ok(crc) => {
                log::warn!(
                    "source checksum {:#010x} does not match {:#010x}",
                    crc,
                    descriptor.checksum
                );
                UpdateState::SourceCrcInvalid
            }
            Err(e) => {
                log::error!("failed to checksum source: {:?}", e);
                UpdateState::SourceCrcInvalid
            }
        }
    }

    fn erase(&mut self, descriptor: FirmwareDescriptor) -> UpdateState {
        log::info!("erasing {} bytes", descriptor.firmware_length);

        let mut indicator = Indicator {
            board: &mut *self.board,
            base: 0,
        };

        match FlashCopy::new(&mut *self.flash, &mut *self.buffer).erase(
            self.destination.begin,
            descriptor.firmware_length,
            &mut indicator,
        ) {
            Ok(()) => UpdateState::Copying(descriptor),
            Err(e) => {
                log::error!("erase failed: {:?}", e);
                UpdateState::DestCrcMismatch
            }
        }
    }

    fn copy(&mut self, descriptor: FirmwareDescriptor) -> UpdateState {
        log::info!("copying {} bytes", descriptor.firmware_length);

        let copied = descriptor.image(self.source).and_then(|image| {
            let mut indicator = Indicator {
                board: &mut *self.board,
                base: 50,
            };
            FlashCopy::new(&mut *self.flash, &mut *self.buffer).copy(
                image.begin,
                self.destination.begin,
                descriptor.firmware_length,
                &mut indicator,
            )
        });

        if let Err(e) = copied {
            log::error!("copy failed: {:?}", e);
            return UpdateState::DestCrcMismatch;
        }

        let crc = self
            .destination
            .subrange(0, descriptor.firmware_length)
            .and_then(|installed| checksum_flash(&mut *self.flash, installed, &mut *self.board));

        match crc {
            Ok(crc) if crc == descriptor.checksum => UpdateState::Done,
            Ok(crc) => {
                log::error!(
                    "installed checksum {:#010x} does not match {:#010x}",
                    crc,
                    descriptor.checksum
                );
                UpdateState::DestCrcMismatch
            }
            Err(e) => {
                log::error!("failed to checksum destination: {:?}", e);
                UpdateState::DestCrcMismatch
            }
        }
    }
}

/// Apply a staged update if [`BootBit::NewFwAvailable`] is set, tracking it in the boot bits.
pub fn apply_pending_update<F: BootFlash, B: Board, R: RetainedRegisters>(
    bits: &mut BootBits<R>,
    installer: &mut Installer<'_, F, B>,
) -> PendingUpdate {
    if !bits.test(BootBit::NewFwAvailable) {
        return PendingUpdate::None;
    }

    if bits.test(BootBit::NewFwUpdateInProgress) {
        log::warn!("previous update did not complete, abandoning it");
        bits.clear(BootBit::NewFwAvailable);
        bits.clear(BootBit::NewFwUpdateInProgress);
        bits.clear(BootBit::NewFwInstalled);
        return PendingUpdate::Interrupted;
    }

    log::info!("applying firmware update");
    bits.set(BootBit::NewFwUpdateInProgress);
    bits.clear(BootBit::NewFwInstalled);

    let state = installer.run();

    bits.clear(BootBit::NewFwUpdateInProgress);
    bits.clear(BootBit::NewFwAvailable);
    if state == UpdateState::Done {
        log::info!("firmware update installed");
        bits.set(BootBit::NewFwInstalled);
    }

    PendingUpdate::Finished(state)
}

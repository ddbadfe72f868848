//! The decision procedure run once per power-on.
//!
//! [`BootSequencer::run`] inspects the boot bits, applies pending work and returns a
//! [`Decision`]; [`BootSequencer::execute`] carries it out and never returns.

use crate::{
    Board, BootFlash, Button, Error, ResetCause,
    boot::Boot,
    bootbits::{BootBit, BootBits},
    layout::Region,
    reset_loop::{self, LoopVerdict},
    retained::RetainedRegisters,
    selftest::{self, SelfTestFailure},
    strikes::{StrikeTracker, StrikeVerdict},
    update::{Installer, PendingUpdate, UpdateState, apply_pending_update},
};

/// Published in the `BootloaderVersion` retained register, `major << 16 | minor << 8 | patch`.
pub const BOOTLOADER_VERSION: u32 = 0x0001_0000;

/// How long Select must be held to leave the diagnostic halt.
pub const HALT_DISMISS_HOLD_MS: u32 = 2000;
const HALT_POLL_MS: u32 = 10;

/// Cortex-M vector table entry holding the reset handler.
const RESET_VECTOR_OFFSET: u32 = 4;
const ERASED_WORD: u32 = 0xffff_ffff;

/// Reason for a diagnostic halt, shown to the user as a number.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorCode {
    StuckButton(u8),
    BadFlash,
    /// The safe firmware was started but never reported that it came up.
    RecoveryCrashed,
    CantLoadRecovery,
    ResetLoop,
}

impl ErrorCode {
    pub const fn code(self) -> u32 {
        match self {
            ErrorCode::StuckButton(mask) => 0xfe50_4500 | mask as u32,
            ErrorCode::BadFlash => 0xfe50_4510,
            ErrorCode::RecoveryCrashed => 0xfe50_4520,
            ErrorCode::CantLoadRecovery => 0xfe50_4530,
            ErrorCode::ResetLoop => 0xfe50_4540,
        }
    }
}

impl From<SelfTestFailure> for ErrorCode {
    fn from(failure: SelfTestFailure) -> Self {
        match failure {
            SelfTestFailure::BadFlash => ErrorCode::BadFlash,
            SelfTestFailure::StuckButtons(mask) => ErrorCode::StuckButton(mask),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Decision {
    /// Start the image in the firmware region.
    Jump,
    /// Show the error and wait for the user; never retried silently.
    Halt(ErrorCode),
    /// Reset and run the sequence again.
    Reset,
    /// Enter standby as requested by the firmware.
    Standby,
    /// Power off as requested by the firmware.
    Shutdown,
}

pub struct BootSequencer<'a, B, F, R> {
    board: &'a mut B,
    flash: &'a mut F,
    bits: &'a mut BootBits<R>,
    buffer: &'a mut [u8],
}

impl<'a, B: Board, F: BootFlash, R: RetainedRegisters> BootSequencer<'a, B, F, R> {
    /// `buffer` is the flash transfer buffer; place it in static memory, not on the stack.
    pub fn new(
        board: &'a mut B,
        flash: &'a mut F,
        bits: &'a mut BootBits<R>,
        buffer: &'a mut [u8],
    ) -> Self {
        Self {
            board,
            flash,
            bits,
            buffer,
        }
    }

    pub fn run(&mut self) -> Decision {
        log::info!("bootloader {:#010x}", BOOTLOADER_VERSION);

        self.bits.init();
        self.bits.set_bootloader_version(BOOTLOADER_VERSION);

        if let Err(failure) = self.self_test() {
            return self.halt(failure.into());
        }

        if self.bits.take(BootBit::ShutdownRequested) {
            log::info!("shutting down");
            return Decision::Shutdown;
        }

        if self.bits.take(BootBit::StandbyModeRequested) {
            log::info!("entering standby");
            self.bits.set(BootBit::StandbyModeEntered);
            return Decision::Standby;
        }
        self.bits.clear(BootBit::StandbyModeEntered);

        if self.bits.take(BootBit::FwStable) {
            log::info!("last firmware boot was stable, clearing strikes");
            StrikeTracker::Firmware.clear(self.bits);
            StrikeTracker::Recovery.clear(self.bits);
            reset_loop::reset(self.bits);
        }

        if self.bits.take(BootBit::RecoveryStartInProgress) {
            log::error!("recovery firmware failed to start");
            return self.halt(ErrorCode::RecoveryCrashed);
        }

        let force_recovery = self.force_recovery();
        let give_up = self.firmware_start_failed() == Some(StrikeVerdict::GiveUp);

        let booting_recovery = if force_recovery || give_up {
            if let Err(decision) = self.load_recovery() {
                return decision;
            }
            true
        } else {
            match self.apply_update() {
                Ok(booting_recovery) => booting_recovery,
                Err(decision) => return decision,
            }
        };

        if reset_loop::check_and_increment(self.bits) == LoopVerdict::Detected {
            return self.halt(ErrorCode::ResetLoop);
        }

        if booting_recovery {
            self.bits.set(BootBit::RecoveryStartInProgress);
        }

        Decision::Jump
    }

    /// Carry out `decision`.
    pub fn execute<J: Boot>(self, decision: Decision) -> ! {
        match decision {
            Decision::Jump => {
                log::info!("booting firmware");
                // SAFETY: the firmware region holds a programmed image, either checked by
                // checksum when installed or confirmed to run by earlier boots.
                unsafe { J::boot(B::LAYOUT.firmware_vector_table as *const u32) }
            }
            Decision::Halt(code) => {
                self.board.show_error(code);
                wait_for_dismiss(self.board);
                self.board.system_reset()
            }
            Decision::Reset => self.board.system_reset(),
            Decision::Standby => self.board.enter_standby(),
            Decision::Shutdown => self.board.shutdown(),
        }
    }

    fn self_test(&mut self) -> Result<(), SelfTestFailure> {
        selftest::flash_present(self.flash)?;
        selftest::stuck_buttons(self.board, self.bits)
    }

    fn halt(&mut self, code: ErrorCode) -> Decision {
        log::error!("halting with {:?} ({:#010x})", code, code.code());
        self.bits.set_last_error(code.code());
        Decision::Halt(code)
    }

    fn force_recovery(&mut self) -> bool {
        if self.bits.take(BootBit::ForcePrf) {
            log::info!("recovery requested by firmware");
            return true;
        }

        if selftest::force_recovery_combo_held(self.board) {
            return true;
        }

        if !self.firmware_programmed() {
            log::warn!("firmware region is not programmed");
            return true;
        }

        false
    }

    /// Whether the reset vector of the firmware region has been written.
    fn firmware_programmed(&mut self) -> bool {
        let mut word = [0u8; 4];
        let addr = B::LAYOUT.region(Region::Firmware).begin + RESET_VECTOR_OFFSET;

        match self.flash.read(addr, &mut word) {
            Ok(()) => u32::from_le_bytes(word) != ERASED_WORD,
            Err(e) => {
                log::error!("failed to read reset vector: {:?}", Error::flash(e));
                false
            }
        }
    }

    /// Record a strike when the previous firmware run ended in a failure.
    ///
    /// Returns `None` for a normal start, which also clears the firmware strikes.
    fn firmware_start_failed(&mut self) -> Option<StrikeVerdict> {
        let watchdog = self.board.reset_cause() == ResetCause::Watchdog;
        let software = self.bits.take(BootBit::SoftwareFailureOccurred);

        if !watchdog && !software {
            StrikeTracker::Firmware.clear(self.bits);
            return None;
        }

        if watchdog {
            log::warn!("watchdog caused a reset");
        }
        if software {
            log::warn!("software failure caused a reset");
        }

        Some(StrikeTracker::Firmware.record_failure(self.bits))
    }

    /// Apply a staged update. `Ok(true)` when the safe firmware had to be loaded instead.
    fn apply_update(&mut self) -> Result<bool, Decision> {
        let mut installer = Installer::new(
            &mut *self.flash,
            &mut *self.board,
            &mut *self.buffer,
            B::LAYOUT.region(Region::Scratch),
            B::LAYOUT.region(Region::Firmware),
        );

        match apply_pending_update(self.bits, &mut installer) {
            PendingUpdate::Finished(UpdateState::Done) => {
                StrikeTracker::Firmware.clear(self.bits);
                Ok(false)
            }
            PendingUpdate::Finished(state) if state.destination_mangled() => {
                log::error!("firmware region mangled by update");
                self.load_recovery().map(|()| true)
            }
            PendingUpdate::Interrupted if !self.firmware_programmed() => {
                self.load_recovery().map(|()| true)
            }
            _ => Ok(false),
        }
    }

    /// Install the safe firmware into the firmware region.
    ///
    /// [`BootBit::ForcePrf`] stays set until the load completes, so a load cut short by a
    /// reset is started over on the next boot.
    fn load_recovery(&mut self) -> Result<(), Decision> {
        log::warn!("loading recovery firmware");
        self.bits.set(BootBit::ForcePrf);

        let state = Installer::new(
            &mut *self.flash,
            &mut *self.board,
            &mut *self.buffer,
            B::LAYOUT.region(Region::SafeFirmware),
            B::LAYOUT.region(Region::Firmware),
        )
        .run();

        if state == UpdateState::Done {
            self.bits.clear(BootBit::ForcePrf);
            StrikeTracker::Recovery.clear(self.bits);
            return Ok(());
        }

        log::error!("failed to load recovery firmware: {:?}", state);
        match StrikeTracker::Recovery.record_failure(self.bits) {
            StrikeVerdict::GiveUp => {
                self.bits.clear(BootBit::ForcePrf);
                Err(self.halt(ErrorCode::CantLoadRecovery))
            }
            StrikeVerdict::Retry => Err(Decision::Reset),
        }
    }
}

/// Block until Select has been held for [`HALT_DISMISS_HOLD_MS`], keeping the watchdog fed.
pub fn wait_for_dismiss<B: Board>(board: &mut B) {
    let mut held = 0;

    while held < HALT_DISMISS_HOLD_MS {
        board.feed();
        board.delay_ms(HALT_POLL_MS);

        if board.is_pressed(Button::Select) {
            held += HALT_POLL_MS;
        } else {
            held = 0;
        }
    }
}

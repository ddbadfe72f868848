//! Checks run before any image is considered, and the force-recovery button combination.

use crate::{
    Board, BootFlash, Button,
    bootbits::BootBits,
    retained::RetainedRegisters,
};

/// Consecutive boots a button may be seen pressed before it counts as stuck.
pub const STUCK_BUTTON_THRESHOLD: u8 = 5;

/// How long the force-recovery combination must be held.
pub const FORCE_RECOVERY_HOLD_MS: u32 = 5000;
const FORCE_RECOVERY_POLL_MS: u32 = 100;

const FORCE_RECOVERY_COMBO: [Button; 2] = [Button::Up, Button::Back];

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SelfTestFailure {
    BadFlash,
    /// Bitmask of stuck buttons, bit `n` is `Button as u8 == n`.
    StuckButtons(u8),
}

pub fn flash_present<F: BootFlash>(flash: &mut F) -> Result<(), SelfTestFailure> {
    if flash.sanity_check() {
        Ok(())
    } else {
        log::error!("flash failed sanity check");
        Err(SelfTestFailure::BadFlash)
    }
}

/// Update the per-button press counters and report buttons held for too many boots.
///
/// Each counter is one byte of the `StuckButtons` retained register.
pub fn stuck_buttons<B: Board, R: RetainedRegisters>(
    board: &B,
    bits: &mut BootBits<R>,
) -> Result<(), SelfTestFailure> {
    let mut counters = bits.stuck_buttons().to_le_bytes();
    let mut stuck = 0u8;

    for button in Button::ALL {
        let counter = &mut counters[button as usize];

        if !board.is_pressed(button) {
            *counter = 0;
        } else if *counter >= STUCK_BUTTON_THRESHOLD {
            log::error!("button {:?} stuck", button);
            stuck |= 1 << button as u8;
            *counter = 0;
        } else {
            *counter += 1;
        }
    }

    bits.set_stuck_buttons(u32::from_le_bytes(counters));

    match stuck {
        0 => Ok(()),
        mask => Err(SelfTestFailure::StuckButtons(mask)),
    }
}

/// Whether the force-recovery combination is held for the whole hold window.
///
/// Returns immediately when the combination is not pressed at all.
pub fn force_recovery_combo_held<B: Board>(board: &mut B) -> bool {
    let pressed = |board: &B| FORCE_RECOVERY_COMBO.iter().all(|b| board.is_pressed(*b));

    let mut held = 0;
    while pressed(board) {
        if held >= FORCE_RECOVERY_HOLD_MS {
            log::info!("force recovery combination held");
            return true;
        }

        board.feed();
        board.delay_ms(FORCE_RECOVERY_POLL_MS);
        held += FORCE_RECOVERY_POLL_MS;
    }

    false
}

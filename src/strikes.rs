//! Three strikes failure escalation, one tracker per image kind.
//!
//! Each tracker keeps its count in two boot bits: `00` clean, `10` one strike,
//! `11` two strikes. The third recorded failure resets the count and tells the
//! caller to give up on that image.

use crate::{
    bootbits::{BootBit, BootBits},
    retained::RetainedRegisters,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StrikeState {
    Clean,
    One,
    Two,
}

impl StrikeState {
    /// A lone second bit is never written; count it as two.
    pub const fn decode(one: bool, two: bool) -> Self {
        match (one, two) {
            (false, false) => StrikeState::Clean,
            (true, false) => StrikeState::One,
            (_, true) => StrikeState::Two,
        }
    }

    pub const fn encode(self) -> (bool, bool) {
        match self {
            StrikeState::Clean => (false, false),
            StrikeState::One => (true, false),
            StrikeState::Two => (true, true),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StrikeVerdict {
    /// Try the same image once more.
    Retry,
    /// Third strike: escalate to the next fallback.
    GiveUp,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StrikeTracker {
    /// The main firmware failed to start.
    Firmware,
    /// The safe firmware could not be loaded into place.
    Recovery,
}

impl StrikeTracker {
    const fn bits(self) -> (BootBit, BootBit) {
        match self {
            StrikeTracker::Firmware => (
                BootBit::FwStartFailStrikeOne,
                BootBit::FwStartFailStrikeTwo,
            ),
            StrikeTracker::Recovery => (
                BootBit::RecoveryLoadFailStrikeOne,
                BootBit::RecoveryLoadFailStrikeTwo,
            ),
        }
    }

    pub fn state<R: RetainedRegisters>(self, bits: &BootBits<R>) -> StrikeState {
        let (one, two) = self.bits();
        StrikeState::decode(bits.test(one), bits.test(two))
    }

    fn store<R: RetainedRegisters>(self, bits: &mut BootBits<R>, state: StrikeState) {
        let (one, two) = self.bits();
        let (on_one, on_two) = state.encode();

        // Ordered so a reset between the two writes never leaves a lone second bit.
        if on_two {
            bits.assign(one, on_one);
            bits.assign(two, on_two);
        } else {
            bits.assign(two, on_two);
            bits.assign(one, on_one);
        }
    }

    pub fn record_failure<R: RetainedRegisters>(self, bits: &mut BootBits<R>) -> StrikeVerdict {
        match self.state(bits) {
            StrikeState::Clean => {
                log::warn!("{:?}: strike one", self);
                self.store(bits, StrikeState::One);
                StrikeVerdict::Retry
            }
            StrikeState::One => {
                log::warn!("{:?}: strike two", self);
                self.store(bits, StrikeState::Two);
                StrikeVerdict::Retry
            }
            StrikeState::Two => {
                log::error!("{:?}: strike three", self);
                self.store(bits, StrikeState::Clean);
                StrikeVerdict::GiveUp
            }
        }
    }

    pub fn clear<R: RetainedRegisters>(self, bits: &mut BootBits<R>) {
        self.store(bits, StrikeState::Clean);
    }
}

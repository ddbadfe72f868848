//! Detects a device that keeps rebooting without the firmware ever reporting a stable boot.

use crate::{
    bootbits::{BootBit, BootBits},
    retained::RetainedRegisters,
};

const COUNTER_BITS: [BootBit; 3] = [
    BootBit::ResetLoopDetectOne,
    BootBit::ResetLoopDetectTwo,
    BootBit::ResetLoopDetectThree,
];

/// Boots seen since the counter was last reset, `0..=7`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoopCount(u8);

impl LoopCount {
    pub const MAX: LoopCount = LoopCount(7);

    pub const fn new(count: u8) -> Option<Self> {
        if count <= Self::MAX.0 {
            Some(LoopCount(count))
        } else {
            None
        }
    }

    pub fn load<R: RetainedRegisters>(bits: &BootBits<R>) -> Self {
        let count = COUNTER_BITS
            .iter()
            .enumerate()
            .filter(|(_, bit)| bits.test(**bit))
            .fold(0, |count, (i, _)| count | (1 << i));

        LoopCount(count)
    }

    pub fn store<R: RetainedRegisters>(self, bits: &mut BootBits<R>) {
        for (i, bit) in COUNTER_BITS.iter().enumerate() {
            bits.assign(*bit, self.0 & (1 << i) != 0);
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoopVerdict {
    Counted(LoopCount),
    Detected,
}

/// Count this boot; the boot after the counter reached its maximum is a loop.
pub fn check_and_increment<R: RetainedRegisters>(bits: &mut BootBits<R>) -> LoopVerdict {
    let count = LoopCount::load(bits);

    if count == LoopCount::MAX {
        log::error!("reset loop detected");
        LoopCount(0).store(bits);
        return LoopVerdict::Detected;
    }

    let next = LoopCount(count.0 + 1);
    next.store(bits);
    LoopVerdict::Counted(next)
}

/// Forget earlier boots, once the firmware has reported itself stable.
pub fn reset<R: RetainedRegisters>(bits: &mut BootBits<R>) {
    LoopCount(0).store(bits);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::test_bits;

    #[test]
    fn bits_follow_binary_value() {
        let mut bits = test_bits();

        LoopCount(5).store(&mut bits);
        assert!(bits.test(BootBit::ResetLoopDetectOne));
        assert!(!bits.test(BootBit::ResetLoopDetectTwo));
        assert!(bits.test(BootBit::ResetLoopDetectThree));
        assert_eq!(LoopCount::load(&bits), LoopCount(5));

        LoopCount(2).store(&mut bits);
        assert!(!bits.test(BootBit::ResetLoopDetectOne));
        assert!(bits.test(BootBit::ResetLoopDetectTwo));
        assert!(!bits.test(BootBit::ResetLoopDetectThree));
    }

    #[test]
    fn eighth_boot_is_a_loop() {
        let mut bits = test_bits();

        for boot in 1..=7 {
            assert_eq!(
                check_and_increment(&mut bits),
                LoopVerdict::Counted(LoopCount(boot))
            );
        }

        assert_eq!(check_and_increment(&mut bits), LoopVerdict::Detected);
        assert_eq!(LoopCount::load(&bits), LoopCount(0));
        assert_eq!(
            check_and_increment(&mut bits),
            LoopVerdict::Counted(LoopCount(1))
        );
    }

    #[test]
    fn reset_restarts_count() {
        let mut bits = test_bits();

        for _ in 0..6 {
            check_and_increment(&mut bits);
        }
        reset(&mut bits);

        for _ in 0..7 {
            assert_ne!(check_and_increment(&mut bits), LoopVerdict::Detected);
        }
    }

    #[test]
    fn count_is_bounded() {
        assert_eq!(LoopCount::new(7), Some(LoopCount::MAX));
        assert_eq!(LoopCount::new(8), None);
    }
}

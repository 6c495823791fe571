//! Odd parity encoding for ARINC-429 words

use crate::core::Word;
use rand::RngCore;

/// Bit 31, reserved for parity
pub const PARITY_MASK: u32 = 0x8000_0000;

/// Odd parity codec for 32-bit ARINC-429 words
pub struct OddParity;

impl OddParity {
    /// Check that the population count of all 32 bits is odd
    pub fn is_valid(word: u32) -> bool {
        word.count_ones() % 2 == 1
    }

    /// Parity bit that makes bits 30-0 plus bit 31 odd
    pub fn parity_bit(word: u32) -> bool {
        (word & !PARITY_MASK).count_ones() % 2 == 0
    }

    /// Return `word` with bit 31 flipped when the word has even parity
    pub fn apply(word: u32) -> u32 {
        if Self::is_valid(word) {
            word
        } else {
            word ^ PARITY_MASK
        }
    }

    /// Draw one value from `rng` and force it to odd parity
    ///
    /// Consumes exactly one `u32` from the random source.
    pub fn random_message<R: RngCore + ?Sized>(rng: &mut R) -> Word {
        Word::new_unchecked(Self::apply(rng.next_u32()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_is_valid() {
        assert!(OddParity::is_valid(0x0000_0001));
        assert!(OddParity::is_valid(0xFFFF_FFFE));
        assert!(!OddParity::is_valid(0x0000_0000));
        assert!(!OddParity::is_valid(0xFFFF_FFFF));
    }

    #[test]
    fn test_parity_bit() {
        // 0 ones in bits 30-0 (even) -> parity=1 to make total odd
        assert!(OddParity::parity_bit(0x0000_0000));
        // 1 one -> parity=0
        assert!(!OddParity::parity_bit(0x0000_0001));
        // bit 31 itself is ignored
        assert!(!OddParity::parity_bit(0x8000_0001));
    }

    #[test]
    fn test_apply_toggles_msb_only() {
        assert_eq!(OddParity::apply(0x0000_0000), 0x8000_0000);
        assert_eq!(OddParity::apply(0x8000_0001), 0x0000_0001);
        assert_eq!(OddParity::apply(0x0000_0001), 0x0000_0001);
    }

    #[test]
    fn test_random_message_is_deterministic_per_seed() {
        let mut a = StdRng::seed_from_u64(429);
        let mut b = StdRng::seed_from_u64(429);
        for _ in 0..16 {
            assert_eq!(
                OddParity::random_message(&mut a),
                OddParity::random_message(&mut b)
            );
        }
    }

    proptest! {
        #[test]
        fn test_random_message_has_odd_parity(seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let word = OddParity::random_message(&mut rng);
            prop_assert_eq!(word.raw().count_ones() % 2, 1);
        }

        #[test]
        fn test_apply_agrees_with_parity_bit(word in any::<u32>()) {
            let fixed = OddParity::apply(word);
            prop_assert!(OddParity::is_valid(fixed));
            prop_assert_eq!(fixed & !PARITY_MASK, word & !PARITY_MASK);
            prop_assert_eq!(fixed & PARITY_MASK != 0, OddParity::parity_bit(word));
        }
    }
}

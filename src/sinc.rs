//! First decimation stage: weighted bit count over a PDM window.
//!
//! Each set bit in the window adds the weight at its position; the weights
//! approximate a sinc-shaped window so bits near the centre of the window
//! count most.

use crate::{
    config::WORD_BITS,
    error::ConfigError,
};

/// Number of weights, one per PDM bit in the window.
pub const SINC_TAPS: usize = 64;

/// Symmetric decimation weights.
pub const SINC_WEIGHTS: [u16; SINC_TAPS] = [
    0, 2, 9, 21, 39, 63, 94, 132, 179, 236, 302, 379, 467, 565, 674, 792, //
    920, 1055, 1196, 1341, 1487, 1633, 1776, 1913, 2042, 2159, 2263, 2352, 2422, 2474, 2506, 2516,
    2516, 2506, 2474, 2422, 2352, 2263, 2159, 2042, 1913, 1776, 1633, 1487, 1341, 1196, 1055, 920,
    792, 674, 565, 467, 379, 302, 236, 179, 132, 94, 63, 39, 21, 9, 2, 0,
];

/// Decimator output for a window of all ones.
pub const SINC_GAIN: u32 = weight_sum();

const fn weight_sum() -> u32 {
    let mut sum = 0;
    let mut i = 0;
    while i < SINC_TAPS {
        sum += SINC_WEIGHTS[i] as u32;
        i += 1;
    }
    sum
}

/// Sinc decimator over the first `window_words` words of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SincDecimator {
    window_words: usize,
}

impl SincDecimator {
    /// The window must consume the weight table exactly.
    pub const fn new(window_words: usize) -> Result<Self, ConfigError> {
        match window_words.checked_mul(WORD_BITS) {
            Some(SINC_TAPS) => Ok(Self { window_words }),
            _ => Err(ConfigError::WindowMismatch {
                window_words,
                table_len: SINC_TAPS,
            }),
        }
    }

    pub const fn window_words(&self) -> usize {
        self.window_words
    }

    /// Sum the weights of the set bits in the window.
    ///
    /// Bits are tested least significant first and shifted out of the words
    /// in place, so the window reads as zero afterwards. Words past the
    /// window are left alone.
    pub fn decimate(&self, block: &mut [u16]) -> u32 {
        let mut sum = 0u32;
        for (word, weights) in block
            .iter_mut()
            .take(self.window_words)
            .zip(SINC_WEIGHTS.chunks_exact(WORD_BITS))
        {
            for &weight in weights {
                if *word & 0x1 != 0 {
                    sum += u32::from(weight);
                }
                *word >>= 1;
            }
        }
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        HALF_WORDS,
        WINDOW_WORDS,
    };

    fn decimator() -> SincDecimator {
        SincDecimator::new(WINDOW_WORDS).unwrap()
    }

    #[test]
    fn test_table_is_symmetric() {
        for i in 0..SINC_TAPS {
            assert_eq!(SINC_WEIGHTS[i], SINC_WEIGHTS[SINC_TAPS - 1 - i]);
        }
        assert_eq!(SINC_WEIGHTS.iter().copied().max(), Some(2516));
    }

    #[test]
    fn test_all_zero_window() {
        let mut block = [0u16; HALF_WORDS];
        assert_eq!(decimator().decimate(&mut block), 0);
    }

    #[test]
    fn test_all_one_window_gives_table_sum() {
        let mut block = [0xFFFF; HALF_WORDS];
        assert_eq!(SINC_GAIN, 68_018);
        assert_eq!(decimator().decimate(&mut block), SINC_GAIN);
    }

    #[test]
    fn test_bits_are_weighted_lsb_first() {
        let mut block = [0u16; HALF_WORDS];
        // Bit 15 of word 1 is position 31, the table peak.
        block[1] = 0x8000;
        // Bit 1 of word 0 is position 1.
        block[0] = 0x0002;
        assert_eq!(decimator().decimate(&mut block), 2516 + 2);
    }

    #[test]
    fn test_window_is_shifted_out_in_place() {
        let mut block = [0xA5A5; HALF_WORDS];
        decimator().decimate(&mut block);
        assert!(block[..WINDOW_WORDS].iter().all(|&w| w == 0));
        assert!(block[WINDOW_WORDS..].iter().all(|&w| w == 0xA5A5));
    }

    #[test]
    fn test_half_density_is_roughly_half_gain() {
        let mut block = [0x5555; HALF_WORDS];
        let sum = decimator().decimate(&mut block);
        let diff = sum.abs_diff(SINC_GAIN / 2);
        assert!(diff < SINC_GAIN / 20, "sum {sum}");
    }

    #[test]
    fn test_window_mismatch_rejected() {
        assert!(SincDecimator::new(5).is_err());
        assert!(SincDecimator::new(0).is_err());
        assert!(SincDecimator::new(usize::MAX).is_err());
        assert_eq!(decimator().window_words(), 4);
    }
}

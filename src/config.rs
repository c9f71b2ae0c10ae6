//! Capture configuration and the fixed buffer geometry.

use fugit::HertzU32;

use crate::{
    error::ConfigError,
    sinc::SINC_TAPS,
};

/// PDM bits carried by one bus word.
pub const WORD_BITS: usize = 16;

/// Words in one buffer half. One half yields one PCM sample.
pub const HALF_WORDS: usize = 17;

/// Words in the whole circular DMA buffer.
pub const RING_WORDS: usize = HALF_WORDS * 2;

/// Leading words of each half fed to the sinc decimator.
pub const WINDOW_WORDS: usize = 4;

/// PDM bits consumed per PCM sample.
pub const DECIMATION: u32 = (HALF_WORDS * WORD_BITS) as u32;

/// Default PCM output rate.
pub const DEFAULT_SAMPLE_RATE: HertzU32 = HertzU32::from_raw(8_000);

/// MP45DT02 clock input range.
pub const MIN_PDM_CLOCK: HertzU32 = HertzU32::from_raw(1_000_000);
pub const MAX_PDM_CLOCK: HertzU32 = HertzU32::from_raw(3_250_000);

/// Bus bits per I2S frame (two 16-bit slots, Philips framing).
const FRAME_BITS: u32 = 32;

/// Capture configuration.
///
/// ```
/// use mp45dt02::Config;
///
/// let config = Config::new().with_sample_rate(fugit::HertzU32::from_raw(8_000));
/// assert_eq!(config.pdm_clock().to_Hz(), 2_176_000);
/// assert_eq!(config.word_select_rate().to_Hz(), 68_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    sample_rate: HertzU32,
    window_words: usize,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            window_words: WINDOW_WORDS,
        }
    }

    /// PCM output rate.
    #[must_use]
    pub const fn with_sample_rate(mut self, sample_rate: HertzU32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Number of leading words per half run through the sinc decimator.
    #[must_use]
    pub const fn with_window_words(mut self, window_words: usize) -> Self {
        self.window_words = window_words;
        self
    }

    pub const fn sample_rate(&self) -> HertzU32 {
        self.sample_rate
    }

    pub const fn window_words(&self) -> usize {
        self.window_words
    }

    /// Bit clock driven into the microphone.
    pub const fn pdm_clock(&self) -> HertzU32 {
        HertzU32::from_raw(self.sample_rate.to_Hz().saturating_mul(DECIMATION))
    }

    /// Word-select rate to program into the audio bus.
    pub const fn word_select_rate(&self) -> HertzU32 {
        HertzU32::from_raw(self.pdm_clock().to_Hz() / FRAME_BITS)
    }

    /// Check the rate against the microphone clock range and the window
    /// against the sinc table.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let clock = self.pdm_clock();
        if self.sample_rate.to_Hz() == 0 || clock < MIN_PDM_CLOCK || clock > MAX_PDM_CLOCK {
            return Err(ConfigError::UnsupportedSampleRate(self.sample_rate.to_Hz()));
        }

        if self.window_words.checked_mul(WORD_BITS) != Some(SINC_TAPS)
            || self.window_words > HALF_WORDS
        {
            return Err(ConfigError::WindowMismatch {
                window_words: self.window_words,
                table_len: SINC_TAPS,
            });
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

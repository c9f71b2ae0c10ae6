//! Second stage: direct-form FIR low-pass over the decimator output.

/// Filter length.
pub const FIR_TAPS: usize = 39;

/// Low-pass taps, 20 Hz–1 kHz passband with the stop band from 1.5 kHz.
pub const FIR_COEFFS: [f32; FIR_TAPS] = [
    0.006_526_294,
    0.003_695_454_6,
    0.002_758_132_8,
    -0.000_148_098_22,
    -0.005_263_184,
    -0.012_356_629,
    -0.020_643_675,
    -0.028_757_958,
    -0.034_944_79,
    -0.037_251_078,
    -0.033_930_487,
    -0.023_804_874,
    -0.006_560_524,
    0.017_032_05,
    0.045_105_686,
    0.074_875_35,
    0.103_018_21,
    0.126_146_78,
    0.141_340_64,
    0.146_636_28,
    0.141_340_64,
    0.126_146_78,
    0.103_018_21,
    0.074_875_35,
    0.045_105_686,
    0.017_032_05,
    -0.006_560_524,
    -0.023_804_874,
    -0.033_930_487,
    -0.037_251_078,
    -0.034_944_79,
    -0.028_757_958,
    -0.020_643_675,
    -0.012_356_629,
    -0.005_263_184,
    -0.000_148_098_22,
    0.002_758_132_8,
    0.003_695_454_6,
    0.006_526_294,
];

/// FIR filter state: the taps plus a delay line of the same length.
///
/// `delay[0]` is the newest input.
#[derive(Debug, Clone)]
pub struct FirSmoother {
    delay: [f32; FIR_TAPS],
}

impl FirSmoother {
    pub const fn new() -> Self {
        Self {
            delay: [0.0; FIR_TAPS],
        }
    }

    /// Zero the delay line.
    pub fn reset(&mut self) {
        self.delay = [0.0; FIR_TAPS];
    }

    /// Push one input and return the filtered value.
    pub fn process(&mut self, input: f32) -> f32 {
        self.delay.copy_within(..FIR_TAPS - 1, 1);
        self.delay[0] = input;

        FIR_COEFFS
            .iter()
            .zip(self.delay.iter())
            .map(|(h, x)| h * x)
            .sum()
    }

    /// Sum of the taps, the filter's response to a constant input.
    pub fn dc_gain() -> f32 {
        FIR_COEFFS.iter().sum()
    }

    pub fn delay_line(&self) -> &[f32; FIR_TAPS] {
        &self.delay
    }
}

impl Default for FirSmoother {
    fn default() -> Self {
        Self::new()
    }
}

/// Narrow a filter output to an unsigned 16-bit PCM sample.
///
/// Saturates: negative transients clamp to 0 and overshoot to `u16::MAX`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn to_pcm(y: f32) -> u16 {
    y as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinc::SINC_GAIN;

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() <= b.abs() * 1e-4 + 1e-3, "{a} != {b}");
    }

    #[test]
    fn test_taps_are_symmetric() {
        for i in 0..FIR_TAPS {
            assert_eq!(FIR_COEFFS[i], FIR_COEFFS[FIR_TAPS - 1 - i]);
        }
        assert_close(FirSmoother::dc_gain(), 0.780_310_9);
    }

    #[test]
    fn test_impulse_response_is_the_taps() {
        let mut fir = FirSmoother::new();
        assert_close(fir.process(1.0), FIR_COEFFS[0]);
        for &h in &FIR_COEFFS[1..] {
            assert_close(fir.process(0.0), h);
        }
        assert_eq!(fir.process(0.0), 0.0);
    }

    #[test]
    fn test_constant_input_converges_to_dc_gain() {
        let input = 34_009.0;
        let mut fir = FirSmoother::new();
        let mut y = 0.0;
        for _ in 0..FIR_TAPS {
            y = fir.process(input);
        }
        assert_close(y, input * FirSmoother::dc_gain());
    }

    #[test]
    fn test_convergence_ignores_initial_state() {
        let mut fir = FirSmoother::new();
        for i in 0..FIR_TAPS {
            fir.process(if i % 2 == 0 { 60_000.0 } else { -5_000.0 });
        }
        let mut y = 0.0;
        for _ in 0..FIR_TAPS {
            y = fir.process(100.0);
        }
        assert_close(y, 100.0 * FirSmoother::dc_gain());
    }

    #[test]
    fn test_delay_line_shifts_newest_first() {
        let mut fir = FirSmoother::new();
        fir.process(1.0);
        fir.process(2.0);
        fir.process(3.0);
        assert_eq!(&fir.delay_line()[..4], &[3.0, 2.0, 1.0, 0.0]);
        assert_eq!(fir.delay_line().len(), FIR_TAPS);

        fir.reset();
        assert!(fir.delay_line().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_full_scale_fits_pcm() {
        let peak = SINC_GAIN as f32 * FirSmoother::dc_gain();
        assert!(peak < f32::from(u16::MAX));
        assert_eq!(to_pcm(-12.5), 0);
        assert_eq!(to_pcm(70_000.0), u16::MAX);
        assert_eq!(to_pcm(1234.9), 1234);
    }
}

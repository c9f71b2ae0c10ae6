//! Timing probes for a logic analyser.
//!
//! The capture core reports two things from the notification handler: which
//! half it is about to process, and whether that half produced a sample for
//! an active capture. [`PinProbe`] puts these on two GPIOs so handler
//! latency and capture windows can be measured on a scope.

use embedded_hal::digital::OutputPin;

use crate::ring::Half;

/// Hooks called from the notification handler. Must not block.
pub trait Probe {
    fn block_ready(&mut self, _half: Half) {}

    fn sample_taken(&mut self, _capturing: bool) {}
}

/// Probe that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProbe;

impl Probe for NoProbe {}

/// Probe driving two output pins.
///
/// `half` is low while the first half is processed and high for the second.
/// `active` goes high when a sample lands in a destination and low when the
/// handler runs with no capture armed.
pub struct PinProbe<H, A> {
    half: H,
    active: A,
}

impl<H: OutputPin, A: OutputPin> PinProbe<H, A> {
    pub fn new(mut half: H, mut active: A) -> Self {
        let _ = half.set_low();
        let _ = active.set_low();
        Self { half, active }
    }

    pub fn release(self) -> (H, A) {
        (self.half, self.active)
    }
}

// Pin errors are dropped; a probe must never fail the capture path.
impl<H: OutputPin, A: OutputPin> Probe for PinProbe<H, A> {
    fn block_ready(&mut self, half: Half) {
        let _ = match half {
            Half::First => self.half.set_low(),
            Half::Second => self.half.set_high(),
        };
    }

    fn sample_taken(&mut self, capturing: bool) {
        let _ = self.active.set_state(capturing.into());
    }
}

#[cfg(test)]
mod tests {
    use core::convert::Infallible;

    use embedded_hal::digital::ErrorType;

    use super::*;

    #[derive(Default)]
    struct RecordingPin {
        levels: Vec<bool>,
    }

    impl ErrorType for RecordingPin {
        type Error = Infallible;
    }

    impl OutputPin for RecordingPin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.levels.push(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.levels.push(true);
            Ok(())
        }
    }

    #[test]
    fn test_pin_probe_levels() {
        let mut probe = PinProbe::new(RecordingPin::default(), RecordingPin::default());
        probe.block_ready(Half::First);
        probe.sample_taken(true);
        probe.block_ready(Half::Second);
        probe.sample_taken(false);

        let (half, active) = probe.release();
        assert_eq!(half.levels, [false, false, true]);
        assert_eq!(active.levels, [false, true, false]);
    }
}

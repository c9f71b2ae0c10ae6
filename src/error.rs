//! Driver error types.
//!
//! Configuration and capture errors are returned synchronously to the caller.
//! Acquisition faults are raised from the notification context and park the
//! device in [`DeviceState::Stopped`](crate::DeviceState::Stopped).

use core::fmt;

use crate::{
    DeviceState,
    ring::Half,
};

/// Failure reported by a [`PdmBus`](crate::PdmBus) binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BindError {
    /// The bus clock could not be derived for the requested rate.
    Clock,
    /// The audio bus peripheral refused its configuration.
    Peripheral,
    /// The circular DMA transfer could not be started.
    Dma,
    /// `begin_continuous_capture` was called on an unbound bus.
    NotBound,
}

/// Errors returned by [`Microphone::configure`](crate::Microphone::configure).
///
/// All of them leave the device in [`DeviceState::Uninitialized`], except
/// [`ConfigError::Faulted`] which leaves it untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// The PDM bit clock needed for this PCM rate is outside the
    /// microphone's operating range.
    UnsupportedSampleRate(u32),
    /// The sinc window does not consume exactly the weight table, or does
    /// not fit in one buffer half.
    WindowMismatch { window_words: usize, table_len: usize },
    /// The device stopped on an acquisition fault and must be deinitialised
    /// before it can be configured again.
    Faulted,
    /// The bus could not be bound.
    Bind(BindError),
    /// The bus was bound but continuous capture could not be armed.
    Arm(BindError),
}

/// Errors returned by [`Microphone::start`](crate::Microphone::start) and
/// [`Microphone::register_callback`](crate::Microphone::register_callback).
///
/// None of them change the device state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureError {
    /// A capture is still filling its destination.
    AlreadyInProgress,
    /// No completion handler was given and none is registered.
    InvalidCallback,
    /// The device is not configured.
    InvalidState(DeviceState),
}

/// Fatal fault raised by the acquisition path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcquisitionFault {
    /// The bus reported a half out of turn, so one half was never processed.
    Overrun { expected: Half },
    /// The bus reported a peripheral or DMA error code.
    Peripheral(u32),
    /// The completion queue was full when a capture finished.
    CompletionOverflow,
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clock => f.write_str("bus clock unavailable"),
            Self::Peripheral => f.write_str("bus peripheral init failed"),
            Self::Dma => f.write_str("DMA init failed"),
            Self::NotBound => f.write_str("bus not bound"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedSampleRate(hz) => write!(f, "unsupported sample rate {hz} Hz"),
            Self::WindowMismatch {
                window_words,
                table_len,
            } => write!(
                f,
                "sinc window of {window_words} words does not match {table_len} weights"
            ),
            Self::Faulted => f.write_str("device faulted, deinit required"),
            Self::Bind(e) => write!(f, "bind failed: {e}"),
            Self::Arm(e) => write!(f, "capture arm failed: {e}"),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInProgress => f.write_str("capture already in progress"),
            Self::InvalidCallback => f.write_str("invalid callback"),
            Self::InvalidState(state) => write!(f, "device is {state}"),
        }
    }
}

impl fmt::Display for AcquisitionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overrun { expected } => write!(f, "overrun, {expected} half skipped"),
            Self::Peripheral(code) => write!(f, "peripheral error {code}"),
            Self::CompletionOverflow => f.write_str("completion queue overflow"),
        }
    }
}

impl core::error::Error for BindError {}
impl core::error::Error for ConfigError {}
impl core::error::Error for CaptureError {}
impl core::error::Error for AcquisitionFault {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            ConfigError::UnsupportedSampleRate(48_000).to_string(),
            "unsupported sample rate 48000 Hz"
        );
        assert_eq!(
            ConfigError::Bind(BindError::Dma).to_string(),
            "bind failed: DMA init failed"
        );
        assert_eq!(
            CaptureError::InvalidState(DeviceState::Stopped).to_string(),
            "device is stopped"
        );
        assert_eq!(
            AcquisitionFault::Overrun {
                expected: Half::Second
            }
            .to_string(),
            "overrun, second half skipped"
        );
    }
}

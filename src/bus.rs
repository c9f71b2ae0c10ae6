//! Seam between the capture core and the audio bus hardware.

use crate::{
    Config,
    error::BindError,
    ring::DmaRing,
};

/// What the bus reports from its transfer interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferEvent {
    /// The first half of the ring is complete; the bus is filling the second.
    HalfComplete,
    /// The second half is complete; the bus wrapped to the first.
    FullComplete,
    /// The transfer failed with a bus-specific code.
    Error(u32),
}

/// Receiver of transfer events, registered with the bus at configure time.
///
/// Called from interrupt context: implementations must not block.
pub trait TransferSink: Sync {
    fn on_transfer_event(&self, event: TransferEvent);
}

/// A continuous PDM source filling a [`DmaRing`].
pub trait PdmBus {
    /// Claim and clock the bus for `config`.
    fn bind(&mut self, config: &Config) -> Result<(), BindError>;

    /// Start filling `ring` in a loop, reporting each half to `sink`.
    fn begin_continuous_capture(
        &mut self,
        ring: &'static DmaRing,
        sink: &'static dyn TransferSink,
    ) -> Result<(), BindError>;

    /// Stop the transfer and release the bus. Must be safe to call on an
    /// unbound bus.
    fn unbind(&mut self);
}

//! In-memory audio bus for host tests.
//!
//! [`MockBus`] plays the DMA engine: `feed` writes PDM words into the ring
//! half that is due and raises the matching transfer event, synchronously.

use crate::{
    Config,
    bus::{
        PdmBus,
        TransferEvent,
        TransferSink,
    },
    config::HALF_WORDS,
    error::BindError,
    ring::{
        DmaRing,
        Half,
    },
};

/// Scripted [`PdmBus`].
///
/// ```
/// use mp45dt02::{CaptureCore, Config, DeviceState, Microphone, mock::MockBus};
///
/// let core: &'static CaptureCore = Box::leak(Box::new(CaptureCore::new()));
/// let mut mic = Microphone::new(MockBus::new(), core);
/// mic.configure(Config::new()).unwrap();
///
/// assert_eq!(mic.bus_mut().feed_word(0xFFFF), Some(mp45dt02::Half::First));
/// assert_eq!(mic.state(), DeviceState::Configured);
/// ```
#[derive(Default)]
pub struct MockBus {
    link: Option<(&'static DmaRing, &'static dyn TransferSink)>,
    config: Option<Config>,
    bind_error: Option<BindError>,
    arm_error: Option<BindError>,
    next: Option<Half>,
    binds: usize,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus whose `bind` always fails with `error`.
    pub fn failing_bind(error: BindError) -> Self {
        Self {
            bind_error: Some(error),
            ..Self::default()
        }
    }

    /// A bus that binds but cannot start its transfer.
    pub fn failing_arm(error: BindError) -> Self {
        Self {
            arm_error: Some(error),
            ..Self::default()
        }
    }

    pub fn is_bound(&self) -> bool {
        self.config.is_some()
    }

    pub fn is_capturing(&self) -> bool {
        self.link.is_some()
    }

    /// Configuration of the current binding.
    pub fn config(&self) -> Option<&Config> {
        self.config.as_ref()
    }

    /// Successful binds so far.
    pub fn bind_count(&self) -> usize {
        self.binds
    }

    /// Write `words` into the half being filled and report it complete.
    ///
    /// Short input leaves the rest of the half as it was. Returns the half
    /// reported, or `None` when no transfer is running.
    pub fn feed(&mut self, words: &[u16]) -> Option<Half> {
        let (ring, sink) = self.link?;
        let half = self.next?;

        // SAFETY: the mock is the DMA engine here and owns the half it fills.
        let block = unsafe { ring.half_mut(half) };
        let n = words.len().min(block.len());
        block[..n].copy_from_slice(&words[..n]);

        self.next = Some(half.other());
        sink.on_transfer_event(match half {
            Half::First => TransferEvent::HalfComplete,
            Half::Second => TransferEvent::FullComplete,
        });
        Some(half)
    }

    /// Fill the due half with copies of `word`.
    pub fn feed_word(&mut self, word: u16) -> Option<Half> {
        self.feed(&[word; HALF_WORDS])
    }

    /// Raise an arbitrary event without touching the ring.
    pub fn notify(&self, event: TransferEvent) {
        if let Some((_, sink)) = self.link {
            sink.on_transfer_event(event);
        }
    }

    /// Report a transfer error.
    pub fn raise_error(&self, code: u32) {
        self.notify(TransferEvent::Error(code));
    }
}

impl PdmBus for MockBus {
    fn bind(&mut self, config: &Config) -> Result<(), BindError> {
        if let Some(error) = self.bind_error {
            return Err(error);
        }
        self.config = Some(*config);
        self.binds += 1;
        Ok(())
    }

    fn begin_continuous_capture(
        &mut self,
        ring: &'static DmaRing,
        sink: &'static dyn TransferSink,
    ) -> Result<(), BindError> {
        if self.config.is_none() {
            return Err(BindError::NotBound);
        }
        if let Some(error) = self.arm_error {
            return Err(error);
        }
        self.link = Some((ring, sink));
        self.next = Some(Half::First);
        Ok(())
    }

    fn unbind(&mut self) {
        self.link = None;
        self.next = None;
        self.config = None;
    }
}

//! Stream descriptor: where produced PCM samples go.

use crate::{
    deferred::Job,
    error::CaptureError,
};

/// Completion handler. Runs from the completion queue, never from the
/// notification context.
pub type Callback = fn(Completion);

/// A filled destination, handed back to its owner.
#[derive(Debug)]
pub struct Completion {
    samples: &'static mut [u16],
}

impl Completion {
    pub(crate) fn new(samples: &'static mut [u16]) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[u16] {
        self.samples
    }

    pub fn into_samples(self) -> &'static mut [u16] {
        self.samples
    }
}

/// Destination, write cursor and in-progress flag for one capture.
///
/// `Idle --arm--> Filling --full--> Idle` with the completion handed out as
/// a [`Job`]. `cancel` returns to `Idle` without one.
#[derive(Debug, Default)]
pub struct StreamDescriptor {
    destination: Option<&'static mut [u16]>,
    on_done: Option<Callback>,
    cursor: usize,
    in_progress: bool,
}

impl StreamDescriptor {
    pub const fn new() -> Self {
        Self {
            destination: None,
            on_done: None,
            cursor: 0,
            in_progress: false,
        }
    }

    /// Start filling `destination`.
    ///
    /// An empty destination is accepted and ignored: nothing is armed and
    /// `on_done` never runs.
    pub fn arm(
        &mut self,
        destination: &'static mut [u16],
        on_done: Callback,
    ) -> Result<(), CaptureError> {
        if self.in_progress {
            return Err(CaptureError::AlreadyInProgress);
        }
        if destination.is_empty() {
            return Ok(());
        }

        self.destination = Some(destination);
        self.on_done = Some(on_done);
        self.cursor = 0;
        self.in_progress = true;
        Ok(())
    }

    /// Store one sample. Returns the completion job once the destination is
    /// full; the caller is responsible for deferring it.
    pub fn on_sample_produced(&mut self, sample: u16) -> Option<Job> {
        if !self.in_progress {
            return None;
        }
        let destination = self.destination.as_deref_mut()?;
        destination[self.cursor] = sample;
        self.cursor += 1;

        if self.cursor < destination.len() {
            return None;
        }

        self.in_progress = false;
        self.cursor = 0;
        let samples = self.destination.take()?;
        let handler = self.on_done.take()?;
        Some(Job::new(handler, Completion::new(samples)))
    }

    /// Stop filling without running the handler, returning the destination.
    pub fn cancel(&mut self) -> Option<&'static mut [u16]> {
        self.halt();
        self.cursor = 0;
        self.on_done = None;
        self.destination.take()
    }

    /// Hold a destination that could not be handed out, halted, so a later
    /// `cancel` returns it.
    pub fn park(&mut self, destination: &'static mut [u16]) {
        self.halt();
        self.cursor = 0;
        self.on_done = None;
        self.destination = Some(destination);
    }

    /// Stop filling but keep the destination for a later `cancel`.
    pub fn halt(&mut self) {
        self.in_progress = false;
    }

    pub const fn is_in_progress(&self) -> bool {
        self.in_progress
    }

    /// Samples written so far.
    pub const fn cursor(&self) -> usize {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destination(len: usize) -> &'static mut [u16] {
        Box::leak(vec![0u16; len].into_boxed_slice())
    }

    fn noop(_: Completion) {}

    #[test]
    fn test_fills_in_order_and_completes_once() {
        let mut stream = StreamDescriptor::new();
        stream.arm(destination(5), noop).unwrap();
        assert!(stream.is_in_progress());

        for sample in 10..14 {
            assert!(stream.on_sample_produced(sample).is_none());
        }
        assert_eq!(stream.cursor(), 4);

        let job = stream.on_sample_produced(14).expect("full");
        assert!(!stream.is_in_progress());
        assert_eq!(job.completion().samples(), &[10, 11, 12, 13, 14]);

        // Nothing more is written or completed.
        assert!(stream.on_sample_produced(99).is_none());
        assert_eq!(stream.cursor(), 0);
    }

    #[test]
    fn test_arm_while_filling_is_rejected() {
        let mut stream = StreamDescriptor::new();
        stream.arm(destination(3), noop).unwrap();
        stream.on_sample_produced(7);

        assert_eq!(
            stream.arm(destination(8), noop),
            Err(CaptureError::AlreadyInProgress)
        );
        assert_eq!(stream.cursor(), 1);

        stream.on_sample_produced(8);
        let job = stream.on_sample_produced(9).unwrap();
        assert_eq!(job.completion().samples(), &[7, 8, 9]);
    }

    #[test]
    fn test_empty_destination_is_a_noop() {
        let mut stream = StreamDescriptor::new();
        stream.arm(destination(0), noop).unwrap();
        assert!(!stream.is_in_progress());
        assert!(stream.on_sample_produced(1).is_none());
        assert!(stream.cancel().is_none());
    }

    #[test]
    fn test_cancel_returns_destination_without_job() {
        let mut stream = StreamDescriptor::new();
        stream.arm(destination(4), noop).unwrap();
        stream.on_sample_produced(1);
        stream.on_sample_produced(2);

        let abandoned = stream.cancel().unwrap();
        assert_eq!(abandoned, &[1, 2, 0, 0]);
        assert!(!stream.is_in_progress());
        assert!(stream.on_sample_produced(3).is_none());

        // Re-armable after cancel.
        stream.arm(destination(1), noop).unwrap();
        assert!(stream.on_sample_produced(4).is_some());
    }

    #[test]
    fn test_parked_destination_comes_back_on_cancel() {
        let mut stream = StreamDescriptor::new();
        stream.arm(destination(2), noop).unwrap();
        stream.on_sample_produced(3);
        let job = stream.on_sample_produced(4).unwrap();

        stream.park(job.into_completion().into_samples());
        assert!(!stream.is_in_progress());
        assert!(stream.on_sample_produced(5).is_none());
        assert_eq!(stream.cancel().unwrap(), &[3, 4]);
        assert!(stream.cancel().is_none());
    }

    #[test]
    fn test_halt_keeps_destination() {
        let mut stream = StreamDescriptor::new();
        stream.arm(destination(2), noop).unwrap();
        stream.on_sample_produced(5);
        stream.halt();
        assert!(stream.on_sample_produced(6).is_none());
        assert_eq!(stream.cancel().unwrap(), &[5, 0]);
    }
}

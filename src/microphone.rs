//! MP45DT02 PDM microphone: capture lifecycle and the notification handler.
//!
//! The microphone clock runs from `configure` until `deinit` and the bus
//! keeps refilling the DMA ring the whole time. `start` only decides
//! whether the PCM samples coming out of the pipeline land anywhere.
//!
//! ```text
//! Uninitialized --configure--> Configured --start--> Capturing
//!       ^                        ^                      |
//!       |                        +------- full ---------+
//!       +------ deinit --------- Stopped <--- fault ----+
//! ```

use core::{
    cell::RefCell,
    fmt,
};

use embassy_sync::blocking_mutex::{
    Mutex,
    raw::CriticalSectionRawMutex,
};

use crate::{
    Config,
    bus::{
        PdmBus,
        TransferEvent,
        TransferSink,
    },
    deferred::{
        CompletionQueue,
        Job,
    },
    error::{
        AcquisitionFault,
        CaptureError,
        ConfigError,
    },
    log_debug,
    log_error,
    log_info,
    log_warn,
    probe::{
        NoProbe,
        Probe,
    },
    ring::{
        AcquisitionBuffer,
        DmaRing,
        Half,
    },
    sinc::SincDecimator,
    stream::{
        Callback,
        StreamDescriptor,
    },
};

/// Lifecycle state of a [`Microphone`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceState {
    Uninitialized,
    /// Bus running, no destination armed.
    Configured,
    /// Bus running, samples going into a destination.
    Capturing,
    /// An acquisition fault stopped the pipeline. Needs `deinit`.
    Stopped,
}

impl DeviceState {
    const fn is_running(self) -> bool {
        matches!(self, Self::Configured | Self::Capturing)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Configured => "configured",
            Self::Capturing => "capturing",
            Self::Stopped => "stopped",
        })
    }
}

/// State touched by the notification handler.
struct Pipeline<P> {
    state: DeviceState,
    acquisition: Option<AcquisitionBuffer>,
    stream: StreamDescriptor,
    handler: Option<Callback>,
    fault: Option<AcquisitionFault>,
    probe: P,
}

impl<P: Probe> Pipeline<P> {
    const fn new(probe: P) -> Self {
        Self {
            state: DeviceState::Uninitialized,
            acquisition: None,
            stream: StreamDescriptor::new(),
            handler: None,
            fault: None,
            probe,
        }
    }

    fn stop(&mut self, fault: AcquisitionFault) {
        self.state = DeviceState::Stopped;
        self.fault = Some(fault);
        self.stream.halt();
    }

    /// Run one block and store its sample. Returns the completion job when
    /// the destination just filled up.
    fn process(
        &mut self,
        half: Half,
        block: &mut [u16],
    ) -> Result<Option<Job>, AcquisitionFault> {
        let Some(acquisition) = self.acquisition.as_mut() else {
            return Ok(None);
        };
        self.probe.block_ready(half);

        let sample = acquisition.process(half, block)?;
        self.probe.sample_taken(self.stream.is_in_progress());

        let job = self.stream.on_sample_produced(sample);
        if job.is_some() {
            self.state = DeviceState::Configured;
        }
        Ok(job)
    }
}

/// Everything shared between the normal-priority [`Microphone`] and the
/// bus notification handler.
///
/// Lives in `'static` storage (see [`mk_static!`](crate::mk_static)) and is
/// registered with the bus as its [`TransferSink`].
pub struct CaptureCore<P = NoProbe> {
    ring: DmaRing,
    pipeline: Mutex<CriticalSectionRawMutex, RefCell<Pipeline<P>>>,
    completions: CompletionQueue,
}

impl CaptureCore<NoProbe> {
    pub const fn new() -> Self {
        Self::with_probe(NoProbe)
    }
}

impl Default for CaptureCore<NoProbe> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Probe> CaptureCore<P> {
    pub const fn with_probe(probe: P) -> Self {
        Self {
            ring: DmaRing::new(),
            pipeline: Mutex::new(RefCell::new(Pipeline::new(probe))),
            completions: CompletionQueue::new(),
        }
    }

    /// Queue of completed captures waiting for their handlers.
    pub fn completions(&self) -> &CompletionQueue {
        &self.completions
    }

    pub fn state(&self) -> DeviceState {
        self.pipeline.lock(|p| p.borrow().state)
    }

    pub fn fault(&self) -> Option<AcquisitionFault> {
        self.pipeline.lock(|p| p.borrow().fault)
    }

    fn on_block(&self, half: Half) {
        let stopped = self.pipeline.lock(|cell| {
            let mut pipeline = cell.borrow_mut();
            if !pipeline.state.is_running() {
                return None;
            }

            // SAFETY: the bus reported `half` complete and is now filling
            // the other one; nothing else touches the ring inside this lock.
            let block = unsafe { self.ring.half_mut(half) };
            match pipeline.process(half, block) {
                Ok(Some(job)) => match self.completions.submit(job) {
                    Ok(()) => None,
                    Err(job) => {
                        let samples = job.into_completion().into_samples();
                        pipeline.stream.park(samples);
                        pipeline.stop(AcquisitionFault::CompletionOverflow);
                        Some(AcquisitionFault::CompletionOverflow)
                    }
                },
                Ok(None) => None,
                Err(fault) => {
                    pipeline.stop(fault);
                    Some(fault)
                }
            }
        });

        if let Some(fault) = stopped {
            log_error!("capture stopped: {}", fault);
        }
    }

    fn on_error(&self, code: u32) {
        let stopped = self.pipeline.lock(|cell| {
            let mut pipeline = cell.borrow_mut();
            if !pipeline.state.is_running() {
                return false;
            }
            pipeline.stop(AcquisitionFault::Peripheral(code));
            true
        });

        if stopped {
            log_error!("bus error {}, capture stopped", code);
        }
    }
}

impl<P: Probe + Send> TransferSink for CaptureCore<P> {
    fn on_transfer_event(&self, event: TransferEvent) {
        match event {
            TransferEvent::HalfComplete => self.on_block(Half::First),
            TransferEvent::FullComplete => self.on_block(Half::Second),
            TransferEvent::Error(code) => self.on_error(code),
        }
    }
}

/// MP45DT02 microphone on a PDM bus `B`.
///
/// Owned by normal-priority code. All lifecycle calls are synchronous; the
/// only asynchronous outputs are completed captures, which come back through
/// [`CaptureCore::completions`].
pub struct Microphone<B, P: 'static = NoProbe> {
    bus: B,
    core: &'static CaptureCore<P>,
}

impl<B, P> Microphone<B, P>
where
    B: PdmBus,
    P: Probe + Send + 'static,
{
    /// Wrap a bus. Nothing is touched until [`configure`](Self::configure).
    pub const fn new(bus: B, core: &'static CaptureCore<P>) -> Self {
        Self { bus, core }
    }

    pub fn state(&self) -> DeviceState {
        self.core.state()
    }

    /// The fault that stopped the device, if any.
    pub fn fault(&self) -> Option<AcquisitionFault> {
        self.core.fault()
    }

    pub fn core(&self) -> &'static CaptureCore<P> {
        self.core
    }

    pub fn completions(&self) -> &'static CompletionQueue {
        &self.core.completions
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Bind the bus and start the continuous transfer.
    ///
    /// A configured device is torn down first, dropping any capture in
    /// progress without running its handler. A stopped device must be
    /// [`deinit`](Self::deinit)ed first. On error the device is left
    /// uninitialised.
    pub fn configure(&mut self, config: Config) -> Result<(), ConfigError> {
        match self.state() {
            DeviceState::Stopped => return Err(ConfigError::Faulted),
            DeviceState::Configured | DeviceState::Capturing => {
                if self.deinit().is_some() {
                    log_warn!("reconfigure dropped a capture in progress");
                }
            }
            DeviceState::Uninitialized => {}
        }

        config.validate()?;
        let decimator = SincDecimator::new(config.window_words())?;

        self.bus.bind(&config).map_err(|e| {
            log_error!("bus bind failed: {}", e);
            ConfigError::Bind(e)
        })?;

        self.core.pipeline.lock(|cell| {
            let mut pipeline = cell.borrow_mut();
            pipeline.acquisition = Some(AcquisitionBuffer::new(decimator));
            pipeline.stream.cancel();
            pipeline.handler = None;
            pipeline.fault = None;
            pipeline.state = DeviceState::Configured;
        });

        if let Err(e) = self
            .bus
            .begin_continuous_capture(&self.core.ring, self.core)
        {
            log_error!("DMA arm failed: {}", e);
            self.release();
            return Err(ConfigError::Arm(e));
        }

        log_info!(
            "microphone configured: {} Hz PCM, {} Hz PDM clock",
            config.sample_rate().to_Hz(),
            config.pdm_clock().to_Hz()
        );
        Ok(())
    }

    /// Arm a capture into `destination`.
    ///
    /// `on_done` runs from the completion queue once the destination is
    /// full; `None` falls back to the handler from
    /// [`register_callback`](Self::register_callback). An empty destination
    /// succeeds without arming anything and its handler never runs.
    pub fn start(
        &mut self,
        destination: &'static mut [u16],
        on_done: Option<Callback>,
    ) -> Result<(), CaptureError> {
        let len = destination.len();
        self.core.pipeline.lock(|cell| {
            let mut pipeline = cell.borrow_mut();
            if !pipeline.state.is_running() {
                return Err(CaptureError::InvalidState(pipeline.state));
            }
            if pipeline.stream.is_in_progress() {
                return Err(CaptureError::AlreadyInProgress);
            }
            if destination.is_empty() {
                return Ok(());
            }
            let handler = on_done
                .or(pipeline.handler)
                .ok_or(CaptureError::InvalidCallback)?;

            pipeline.stream.arm(destination, handler)?;
            if pipeline.stream.is_in_progress() {
                pipeline.state = DeviceState::Capturing;
            }
            Ok(())
        })?;

        log_debug!("capture armed for {} samples", len);
        Ok(())
    }

    /// Set or clear the default completion handler.
    pub fn register_callback(&mut self, handler: Option<Callback>) -> Result<(), CaptureError> {
        self.core.pipeline.lock(|cell| {
            let mut pipeline = cell.borrow_mut();
            if pipeline.state == DeviceState::Uninitialized {
                return Err(CaptureError::InvalidState(pipeline.state));
            }
            pipeline.handler = handler;
            Ok(())
        })
    }

    /// Abandon the capture in progress without running its handler and
    /// return its destination.
    pub fn cancel(&mut self) -> Option<&'static mut [u16]> {
        self.core.pipeline.lock(|cell| {
            let mut pipeline = cell.borrow_mut();
            if pipeline.state == DeviceState::Capturing {
                pipeline.state = DeviceState::Configured;
            }
            pipeline.stream.cancel()
        })
    }

    /// Stop the bus and return to [`DeviceState::Uninitialized`].
    ///
    /// Any destination still held, whether mid-capture or left behind by a
    /// fault, is returned without running its handler. Completions already
    /// queued are kept.
    pub fn deinit(&mut self) -> Option<&'static mut [u16]> {
        let abandoned = self.release();
        log_info!("microphone released");
        abandoned
    }

    fn release(&mut self) -> Option<&'static mut [u16]> {
        let abandoned = self.core.pipeline.lock(|cell| {
            let mut pipeline = cell.borrow_mut();
            pipeline.state = DeviceState::Uninitialized;
            pipeline.acquisition = None;
            pipeline.fault = None;
            pipeline.stream.cancel()
        });
        self.bus.unbind();
        abandoned
    }
}

impl<B, P> fmt::Debug for Microphone<B, P>
where
    B: PdmBus,
    P: Probe + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Microphone")
            .field("state", &self.state())
            .field("fault", &self.fault())
            .finish_non_exhaustive()
    }
}

//! ESP32-S3 binding.
//!
//! I2S0 runs as a receive master in 16-bit stereo Philips framing, so its
//! bit clock (`word_select_rate × 32`) is the microphone's PDM clock and
//! every bus word carries 16 raw PDM bits. The microphone pins:
//! - CLK on GPIO46 (I2S BCLK)
//! - DOUT on GPIO3 (I2S DIN)
//! - GPIO8 carries WS and is left unconnected
//!
//! esp-hal exposes circular DMA as a byte stream rather than half/full
//! interrupts, so [`pdm_pump_task`] drains it in half-sized blocks into the
//! ring and raises the transfer events itself. [`I2sPdmBus`] is the handle
//! the [`Microphone`](crate::Microphone) drives; it talks to the pump over a
//! [`PumpLink`].

use embassy_futures::select::{
    Either,
    select,
};
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    signal::Signal,
};
use embassy_time::{
    Duration,
    Timer,
};
use esp_hal::{
    dma::DmaDescriptor,
    gpio::{
        Level,
        Output,
        OutputConfig,
    },
    i2s::master::{
        Channels,
        Config as I2sConfig,
        DataFormat,
        I2s,
    },
    time::Rate,
};

use crate::{
    Config,
    MicResources,
    ProbeResources,
    bus::{
        PdmBus,
        TransferEvent,
        TransferSink,
    },
    config::HALF_WORDS,
    error::BindError,
    log_error,
    log_info,
    probe::PinProbe,
    ring::{
        DmaRing,
        Half,
    },
};

/// Bytes in one ring half.
const BLOCK_BYTES: usize = HALF_WORDS * 2;

/// Suggested size of the circular DMA buffer: eight halves of slack.
pub const DMA_BUFFER_BYTES: usize = BLOCK_BYTES * 8;

/// Error codes reported through [`TransferEvent::Error`].
pub const ERR_I2S_CONFIG: u32 = 1;
pub const ERR_DMA_START: u32 = 2;
pub const ERR_DMA: u32 = 3;

/// How long the pump sleeps when the DMA has less than a block ready.
/// One block lasts 125 µs at 8 kHz.
const POLL_INTERVAL: Duration = Duration::from_micros(50);

enum PumpCommand {
    Start {
        config: Config,
        ring: &'static DmaRing,
        sink: &'static dyn TransferSink,
    },
    Stop,
}

/// Command channel between [`I2sPdmBus`] and [`pdm_pump_task`].
pub struct PumpLink {
    command: Signal<CriticalSectionRawMutex, PumpCommand>,
}

impl PumpLink {
    pub const fn new() -> Self {
        Self {
            command: Signal::new(),
        }
    }
}

impl Default for PumpLink {
    fn default() -> Self {
        Self::new()
    }
}

/// [`PdmBus`] backed by I2S0 and the pump task.
pub struct I2sPdmBus {
    link: &'static PumpLink,
    config: Option<Config>,
}

impl I2sPdmBus {
    pub const fn new(link: &'static PumpLink) -> Self {
        Self { link, config: None }
    }
}

impl PdmBus for I2sPdmBus {
    fn bind(&mut self, config: &Config) -> Result<(), BindError> {
        if config.word_select_rate().to_Hz() == 0 {
            return Err(BindError::Clock);
        }
        self.config = Some(*config);
        Ok(())
    }

    fn begin_continuous_capture(
        &mut self,
        ring: &'static DmaRing,
        sink: &'static dyn TransferSink,
    ) -> Result<(), BindError> {
        let config = self.config.ok_or(BindError::NotBound)?;
        self.link.command.signal(PumpCommand::Start { config, ring, sink });
        Ok(())
    }

    fn unbind(&mut self) {
        if self.config.take().is_some() {
            self.link.command.signal(PumpCommand::Stop);
        }
    }
}

/// Runs the I2S receiver whenever the bus is bound.
///
/// `descriptors` and `dma_buffer` must outlive the executor; allocate them
/// with [`mk_static!`](crate::mk_static).
#[embassy_executor::task]
pub async fn pdm_pump_task(
    mut res: MicResources<'static>,
    descriptors: &'static mut [DmaDescriptor],
    dma_buffer: &'static mut [u8; DMA_BUFFER_BYTES],
    link: &'static PumpLink,
) -> ! {
    loop {
        let mut command = link.command.wait().await;
        while let PumpCommand::Start { config, ring, sink } = command {
            match pump(&mut res, descriptors, dma_buffer, link, &config, ring, sink).await {
                Some(next) => command = next,
                None => break,
            }
        }
    }
}

/// Capture until the link carries a new command, which is returned. `None`
/// means the transfer failed and the pump should idle.
async fn pump(
    res: &mut MicResources<'static>,
    descriptors: &mut [DmaDescriptor],
    dma_buffer: &mut [u8; DMA_BUFFER_BYTES],
    link: &PumpLink,
    config: &Config,
    ring: &'static DmaRing,
    sink: &'static dyn TransferSink,
) -> Option<PumpCommand> {
    let i2s_config = I2sConfig::new_tdm_philips()
        .with_sample_rate(Rate::from_hz(config.word_select_rate().to_Hz()))
        .with_data_format(DataFormat::Data16Channel16)
        .with_channels(Channels::STEREO);

    let Ok(i2s) = I2s::new(res.i2s.reborrow(), res.dma.reborrow(), i2s_config) else {
        log_error!("I2S rejected {} Hz word clock", config.word_select_rate().to_Hz());
        sink.on_transfer_event(TransferEvent::Error(ERR_I2S_CONFIG));
        return None;
    };

    let mut rx = i2s
        .i2s_rx
        .with_bclk(res.dio.reborrow())
        .with_ws(res.ws.reborrow())
        .with_din(res.sd.reborrow())
        .build(descriptors);

    let Ok(mut transfer) = rx.read_dma_circular(dma_buffer) else {
        log_error!("circular DMA start failed");
        sink.on_transfer_event(TransferEvent::Error(ERR_DMA_START));
        return None;
    };
    log_info!("PDM clock running at {} Hz", config.pdm_clock().to_Hz());

    let mut block = [0u8; BLOCK_BYTES];
    let mut filled = 0;
    let mut half = Half::First;

    loop {
        if link.command.signaled() {
            return link.command.try_take();
        }

        let available = match transfer.available() {
            Ok(n) => n,
            Err(_) => {
                sink.on_transfer_event(TransferEvent::Error(ERR_DMA));
                return None;
            }
        };

        if available == 0 {
            match select(link.command.wait(), Timer::after(POLL_INTERVAL)).await {
                Either::First(command) => return Some(command),
                Either::Second(()) => continue,
            }
        }

        let want = (BLOCK_BYTES - filled).min(available);
        match transfer.pop(&mut block[filled..filled + want]) {
            Ok(n) => filled += n,
            Err(_) => {
                sink.on_transfer_event(TransferEvent::Error(ERR_DMA));
                return None;
            }
        }
        if filled < BLOCK_BYTES {
            continue;
        }
        filled = 0;

        // SAFETY: the pump is the only writer, and the handler only reads a
        // half after the event below, which runs to completion on this task.
        let words = unsafe { ring.half_mut(half) };
        for (word, bytes) in words.iter_mut().zip(block.chunks_exact(2)) {
            *word = u16::from_le_bytes([bytes[0], bytes[1]]);
        }

        sink.on_transfer_event(match half {
            Half::First => TransferEvent::HalfComplete,
            Half::Second => TransferEvent::FullComplete,
        });
        half = half.other();
    }
}

impl From<ProbeResources<'static>> for PinProbe<Output<'static>, Output<'static>> {
    fn from(res: ProbeResources<'static>) -> Self {
        PinProbe::new(
            Output::new(res.half, Level::Low, OutputConfig::default()),
            Output::new(res.active, Level::Low, OutputConfig::default()),
        )
    }
}

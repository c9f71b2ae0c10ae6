//! # mp45dt02
//!
//! Capture driver for the ST MP45DT02 PDM MEMS microphone.
//!
//! The microphone is clocked continuously by an audio bus whose DMA fills a
//! two-half ring of 16-bit PDM words. Each completed half is turned into one
//! PCM sample in the bus notification handler:
//! - **Sinc decimator**: weighted bit count over the first words of the half
//! - **FIR smoother**: 39-tap low-pass over the decimator output
//! - **Stream descriptor**: writes the sample into the armed destination
//!
//! When a destination fills up its completion handler is queued and run later
//! from normal-priority code, never from the handler itself.
//!
//! The core is hardware independent and runs on the host against
//! [`mock::MockBus`]. The `esp32s3` feature adds an I2S + DMA binding for the
//! ESP32-S3.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! let peripherals = mp45dt02::init();
//! let resources = mp45dt02::split_resources!(peripherals);
//!
//! let link = mp45dt02::mk_static!(PumpLink, PumpLink::new());
//! let core = mp45dt02::mk_static!(CaptureCore, CaptureCore::new());
//! let mut mic = Microphone::new(I2sPdmBus::new(link), core);
//! mic.configure(Config::new())?;
//! mic.start(buffer, Some(on_done))?;
//! ```

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod logging;

pub mod bus;
pub mod config;
pub mod deferred;
pub mod error;
pub mod fir;
pub mod microphone;
pub mod probe;
pub mod ring;
pub mod sinc;
pub mod stream;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(feature = "esp32s3")]
pub mod esp32s3;

pub use bus::{
    PdmBus,
    TransferEvent,
    TransferSink,
};
pub use config::{
    Config,
    DEFAULT_SAMPLE_RATE,
    HALF_WORDS,
    RING_WORDS,
    WINDOW_WORDS,
};
pub use deferred::{
    CompletionQueue,
    Job,
};
pub use error::{
    AcquisitionFault,
    BindError,
    CaptureError,
    ConfigError,
};
#[cfg(feature = "esp32s3")]
pub use esp32s3::{
    I2sPdmBus,
    PumpLink,
};
pub use microphone::{
    CaptureCore,
    DeviceState,
    Microphone,
};
pub use probe::{
    NoProbe,
    PinProbe,
    Probe,
};
pub use ring::{
    DmaRing,
    Half,
};
pub use stream::{
    Callback,
    Completion,
};

/// Allocate a value into a `static` exactly once.
#[macro_export]
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write($val);
        x
    }};
}

// ── ESP32-S3 pin / peripheral assignments ───────────────────────────────────

#[cfg(feature = "esp32s3")]
esp_hal::assign_resources! {
    pub Resources<'d> {
        mic: MicResources<'d> {
            ws: GPIO8,
            sd: GPIO3,
            dio: GPIO46,
            i2s: I2S0,
            dma: DMA_CH1,
        },
        probe: ProbeResources<'d> {
            half: GPIO17,
            active: GPIO18,
        },
    }
}

// ── Chip bring-up ───────────────────────────────────────────────────────────

/// PLL source and 160 MHz divider selections in `SYSTEM`.
#[cfg(feature = "esp32s3")]
const SOC_CLK_PLL: u8 = 1;
#[cfg(feature = "esp32s3")]
const CPU_PERIOD_160MHZ: u8 = 1;

/// Move the CPU onto the PLL at 160 MHz and tell the ROM delay routines.
#[cfg(feature = "esp32s3")]
fn cpu_to_pll() {
    let system = esp_hal::peripherals::SYSTEM::regs();
    let _ = system
        .sysclk_conf()
        .modify(|_, w| unsafe { w.soc_clk_sel().bits(SOC_CLK_PLL) });
    let _ = system.cpu_per_conf().modify(|_, w| unsafe {
        let _ = w.pll_freq_sel().set_bit();
        w.cpuperiod_sel().bits(CPU_PERIOD_160MHZ)
    });

    esp_hal::rom::ets_update_cpu_frequency_rom(160);
}

/// Bring the chip up for capture and return the peripherals.
///
/// Moves the CPU onto the PLL, then runs `esp_hal::init` at the maximum CPU
/// clock. Call once at the top of `main`, then
/// [`split_resources!`] the result into [`MicResources`] and
/// [`ProbeResources`].
#[cfg(feature = "esp32s3")]
#[must_use]
pub fn init() -> esp_hal::peripherals::Peripherals {
    cpu_to_pll();
    let config = esp_hal::Config::default().with_cpu_clock(esp_hal::clock::CpuClock::max());
    esp_hal::init(config)
}

/// Split into the microphone and probe groups.
#[cfg(feature = "esp32s3")]
impl From<esp_hal::peripherals::Peripherals> for Resources<'_> {
    fn from(peripherals: esp_hal::peripherals::Peripherals) -> Self {
        split_resources!(peripherals)
    }
}

//! Captures 100 ms windows from the MP45DT02 and logs the level range of each.
//!
//! GPIO17 and GPIO18 carry the timing probe for a logic analyser.

#![no_std]
#![no_main]

use defmt::{
    error,
    info,
    warn,
};
use embassy_executor::Spawner;
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    signal::Signal,
};
use embassy_time::{
    Duration,
    Timer,
    with_timeout,
};
use esp_backtrace as _;
use esp_hal::{
    dma::DmaDescriptor,
    gpio::Output,
    timer::timg::TimerGroup,
};
use esp_println as _;
use mp45dt02::{
    CaptureCore,
    Completion,
    Config,
    I2sPdmBus,
    Microphone,
    PinProbe,
    PumpLink,
    deferred::completion_task,
    esp32s3::{
        DMA_BUFFER_BYTES,
        pdm_pump_task,
    },
    mk_static,
    split_resources,
};

extern crate alloc;

esp_bootloader_esp_idf::esp_app_desc!();

/// 100 ms at 8 kHz.
const WINDOW: usize = 800;

type Probe = PinProbe<Output<'static>, Output<'static>>;

static CAPTURED: Signal<CriticalSectionRawMutex, Completion> = Signal::new();

fn on_window(done: Completion) {
    CAPTURED.signal(done);
}

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    let peripherals = mp45dt02::init();
    let resources = split_resources!(peripherals);

    esp_alloc::heap_allocator!(size: 64 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let descriptors = mk_static!([DmaDescriptor; 8], [DmaDescriptor::EMPTY; 8]);
    let dma_buffer = mk_static!([u8; DMA_BUFFER_BYTES], [0; DMA_BUFFER_BYTES]);
    let link = mk_static!(PumpLink, PumpLink::new());
    let core = mk_static!(
        CaptureCore<Probe>,
        CaptureCore::with_probe(resources.probe.into())
    );

    spawner.must_spawn(pdm_pump_task(resources.mic, descriptors, dma_buffer, link));
    spawner.must_spawn(completion_task(core.completions()));

    let mut mic = Microphone::new(I2sPdmBus::new(link), core);
    let mut window: Option<&'static mut [u16]> = Some(mk_static!([u16; WINDOW], [0; WINDOW]));

    while window.is_some() {
        if let Err(e) = mic.configure(Config::new()) {
            error!("configure failed: {}", e);
            Timer::after(Duration::from_secs(1)).await;
            continue;
        }

        // Let the filter settle before the first window.
        Timer::after(Duration::from_millis(10)).await;

        while let Some(destination) = window.take() {
            if let Err(e) = mic.start(destination, Some(on_window)) {
                error!("start failed: {}", e);
                break;
            }

            match with_timeout(Duration::from_millis(500), CAPTURED.wait()).await {
                Ok(done) => {
                    let samples = done.samples();
                    let low = samples.iter().copied().min().unwrap_or(0);
                    let high = samples.iter().copied().max().unwrap_or(0);
                    info!("window: min {} max {} span {}", low, high, high - low);
                    window = Some(done.into_samples());
                }
                Err(_) => {
                    warn!("capture timed out in state {}", mic.state());
                    if let Some(fault) = mic.fault() {
                        error!("fault: {}", fault);
                    }
                    break;
                }
            }
        }

        if let Some(abandoned) = mic.deinit() {
            window = Some(abandoned);
        }
        Timer::after(Duration::from_millis(100)).await;
    }

    error!("capture window lost, giving up");
    loop {
        Timer::after(Duration::from_secs(600)).await;
    }
}

//! Acquisition buffer: the circular DMA ring and the per-half pipeline.
//!
//! The bus fills the ring continuously and reports each half as it
//! completes. The half just reported is handed to the sinc decimator and
//! the FIR stage while the bus fills the other one.

use core::{
    cell::UnsafeCell,
    fmt,
    ops::Range,
};

use crate::{
    config::{
        HALF_WORDS,
        RING_WORDS,
    },
    error::AcquisitionFault,
    fir::{
        FirSmoother,
        to_pcm,
    },
    sinc::SincDecimator,
};

/// One half of the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Half {
    First,
    Second,
}

impl Half {
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }

    /// Word range of this half within the ring.
    pub const fn range(self) -> Range<usize> {
        match self {
            Self::First => 0..HALF_WORDS,
            Self::Second => HALF_WORDS..RING_WORDS,
        }
    }
}

impl fmt::Display for Half {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("first"),
            Self::Second => f.write_str("second"),
        }
    }
}

/// DMA target memory shared by the bus writer and the notification handler.
///
/// At any moment the bus owns one half and the handler may own the other.
/// Nothing in the type enforces that; the half/full notification scheme
/// does.
pub struct DmaRing {
    words: UnsafeCell<[u16; RING_WORDS]>,
}

// SAFETY: access is partitioned by half, see `half_mut`.
unsafe impl Sync for DmaRing {}

impl DmaRing {
    pub const fn new() -> Self {
        Self {
            words: UnsafeCell::new([0; RING_WORDS]),
        }
    }

    /// Start of the ring, for programming a DMA engine.
    pub fn as_mut_ptr(&self) -> *mut u16 {
        self.words.get().cast()
    }

    #[allow(clippy::unused_self)]
    pub const fn len(&self) -> usize {
        RING_WORDS
    }

    /// Borrow one half.
    ///
    /// # Safety
    ///
    /// The caller must have exclusive access to `half` for the lifetime of
    /// the borrow: either it is the bus filling that half, or it is the
    /// notification handler for the half that just completed.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn half_mut(&self, half: Half) -> &mut [u16] {
        let range = half.range();
        // SAFETY: the range lies within the array; exclusivity is on the caller.
        unsafe {
            core::slice::from_raw_parts_mut(self.as_mut_ptr().add(range.start), range.len())
        }
    }
}

impl Default for DmaRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Decimation pipeline over alternating ring halves.
#[derive(Debug, Clone)]
pub struct AcquisitionBuffer {
    decimator: SincDecimator,
    fir: FirSmoother,
    expected: Half,
    blocks: u32,
}

impl AcquisitionBuffer {
    pub const fn new(decimator: SincDecimator) -> Self {
        Self {
            decimator,
            fir: FirSmoother::new(),
            expected: Half::First,
            blocks: 0,
        }
    }

    /// Clear the filter history and expect the first half next.
    pub fn reset(&mut self) {
        self.fir.reset();
        self.expected = Half::First;
        self.blocks = 0;
    }

    /// Half the next notification must report.
    pub const fn expected(&self) -> Half {
        self.expected
    }

    /// Halves processed since the last reset.
    pub const fn blocks(&self) -> u32 {
        self.blocks
    }

    pub fn fir(&self) -> &FirSmoother {
        &self.fir
    }

    /// Run one completed half through both stages.
    ///
    /// Halves must arrive in strict alternation; a repeat means the bus
    /// lapped the handler and one half was lost.
    pub fn process(
        &mut self,
        half: Half,
        block: &mut [u16],
    ) -> Result<u16, AcquisitionFault> {
        if half != self.expected {
            return Err(AcquisitionFault::Overrun {
                expected: self.expected,
            });
        }

        let sum = self.decimator.decimate(block);
        #[allow(clippy::cast_precision_loss)]
        let y = self.fir.process(sum as f32);

        self.expected = half.other();
        self.blocks = self.blocks.wrapping_add(1);
        Ok(to_pcm(y))
    }
}

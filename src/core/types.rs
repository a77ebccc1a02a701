//! Core types shared across the crate: samples, host configuration, geometry.

use log::warn;

/// A single audio sample (32-bit float, range -1.0 to 1.0).
pub type Sample = f32;

/// Smallest admitted FFT size.
const MIN_FFT_SIZE: usize = 4;

/// Host audio configuration inherited by every node in a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PvConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of samples per audio callback block.
    pub block_size: usize,
}

impl PvConfig {
    /// Creates a host configuration.
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size,
        }
    }
}

impl Default for PvConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 64,
        }
    }
}

/// FFT geometry of a phase-vocoder graph segment.
///
/// Both the FFT size and the overlap count must be powers of two; anything
/// else is rounded up to the next power of two with a logged warning, never
/// rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PvGeometry {
    size: usize,
    olaps: usize,
}

impl PvGeometry {
    /// Creates a geometry, rounding both values up to powers of two.
    pub fn new(size: usize, olaps: usize) -> Self {
        Self {
            size: round_pow2(size.max(MIN_FFT_SIZE), "FFT size"),
            olaps: round_pow2(olaps.max(1), "overlap count"),
        }
    }

    /// FFT size `N`.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Overlap count `O`.
    #[inline]
    pub fn olaps(&self) -> usize {
        self.olaps
    }

    /// Half size `N / 2`: the number of spectral bins carried per frame.
    #[inline]
    pub fn hsize(&self) -> usize {
        self.size / 2
    }

    /// Hop size `N / O`: samples between consecutive analysis frames.
    #[inline]
    pub fn hopsize(&self) -> usize {
        self.size / self.olaps
    }

    /// Input latency `N - N/O`: ring samples retained between hops.
    #[inline]
    pub fn input_latency(&self) -> usize {
        self.size - self.hopsize()
    }

    /// Returns a copy with a new FFT size (rounded).
    pub fn with_size(self, size: usize) -> Self {
        Self::new(size, self.olaps)
    }

    /// Returns a copy with a new overlap count (rounded).
    pub fn with_olaps(self, olaps: usize) -> Self {
        Self::new(self.size, olaps)
    }
}

impl Default for PvGeometry {
    fn default() -> Self {
        Self {
            size: 1024,
            olaps: 4,
        }
    }
}

/// Rounds `n` up to the next power of two, warning when a substitution
/// actually happens.
fn round_pow2(n: usize, what: &str) -> usize {
    let rounded = n.next_power_of_two();
    if rounded != n {
        warn!(
            "{} must be a power of two, using the next power of two greater than {}: {}",
            what, n, rounded
        );
    }
    rounded
}

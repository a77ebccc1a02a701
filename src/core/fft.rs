//! Real-input FFT wrapper with the split half-spectrum layout used by the
//! phase-vocoder nodes.
//!
//! The forward transform of an `N`-sample real frame yields `real[0..H)` /
//! `imag[0..H)` with the DC component in slot 0 (imaginary part forced to
//! zero) and the Nyquist bin discarded; the inverse rebuilds the Hermitian
//! spectrum from the same layout, and `inverse(forward(x)) == x` for
//! band-limited input. This layout is a hard compatibility requirement
//! between the analyzer's unpack and the synthesizer's pack code.
//!
//! The forward output is scaled by `2/N` so a full-scale sine reads as a
//! magnitude near 1.0 rather than `N/2`; decibel thresholds downstream
//! (e.g. the spectral gate) then reference full scale.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Zero-valued complex number, used for FFT buffer initialization.
pub const COMPLEX_ZERO: Complex<f32> = Complex::new(0.0, 0.0);

/// Cached forward/inverse FFT plans plus reusable buffers for one size.
///
/// Plans are created once at construction (i.e. at node reallocation time);
/// the transform methods never allocate.
pub struct RealFft {
    size: usize,
    hsize: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    forward_norm: f32,
    inverse_norm: f32,
}

impl RealFft {
    /// Plans transforms for `size`-sample frames. `size` must be even.
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        Self {
            size,
            hsize: size / 2,
            forward,
            inverse,
            buffer: vec![COMPLEX_ZERO; size],
            scratch: vec![COMPLEX_ZERO; scratch_len],
            forward_norm: 2.0 / size as f32,
            inverse_norm: 0.5,
        }
    }

    /// Frame size `N` this instance is planned for.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Forward transform of a real frame into the split half-spectrum.
    ///
    /// `real` and `imag` must each hold `N / 2` values.
    pub fn forward(&mut self, frame: &[f32], real: &mut [f32], imag: &mut [f32]) {
        debug_assert_eq!(frame.len(), self.size);
        debug_assert_eq!(real.len(), self.hsize);
        debug_assert_eq!(imag.len(), self.hsize);

        for (slot, &sample) in self.buffer.iter_mut().zip(frame.iter()) {
            *slot = Complex::new(sample, 0.0);
        }
        self.forward
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        real[0] = self.buffer[0].re * self.forward_norm;
        imag[0] = 0.0;
        for k in 1..self.hsize {
            real[k] = self.buffer[k].re * self.forward_norm;
            imag[k] = self.buffer[k].im * self.forward_norm;
        }
    }

    /// Inverse transform of a split half-spectrum back into a real frame.
    ///
    /// The Nyquist bin is taken as zero, mirroring the forward unpack.
    pub fn inverse(&mut self, real: &[f32], imag: &[f32], frame: &mut [f32]) {
        debug_assert_eq!(real.len(), self.hsize);
        debug_assert_eq!(imag.len(), self.hsize);
        debug_assert_eq!(frame.len(), self.size);

        self.buffer[0] = Complex::new(real[0], 0.0);
        self.buffer[self.hsize] = COMPLEX_ZERO;
        for k in 1..self.hsize {
            let bin = Complex::new(real[k], imag[k]);
            self.buffer[k] = bin;
            self.buffer[self.size - k] = bin.conj();
        }
        self.inverse
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        for (sample, slot) in frame.iter_mut().zip(self.buffer.iter()) {
            *sample = slot.re * self.inverse_norm;
        }
    }
}

impl std::fmt::Debug for RealFft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealFft").field("size", &self.size).finish()
    }
}

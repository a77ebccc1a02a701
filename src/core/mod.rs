//! Core DSP primitives: FFT wrapper, window tables, shared types.

pub mod fft;
pub mod types;
pub mod window;

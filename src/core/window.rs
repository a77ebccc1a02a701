//! Window functions for spectral analysis and resynthesis.
//!
//! The window kinds and their integer indices match the enumeration the host
//! passes through opaquely: hosts address windows by index, library code by
//! [`WindowType`].

use std::f64::consts::PI;

use log::warn;

/// Blackman 3-term ("exact Blackman") coefficients.
const BLACKMAN_A0: f64 = 0.42323;
const BLACKMAN_A1: f64 = 0.49755;
const BLACKMAN_A2: f64 = 0.07922;

/// Blackman-Harris 4-term coefficients.
const BH4_A0: f64 = 0.35875;
const BH4_A1: f64 = 0.48829;
const BH4_A2: f64 = 0.14128;
const BH4_A3: f64 = 0.01168;

/// Blackman-Harris 7-term coefficients.
const BH7: [f64; 7] = [
    0.2712203606,
    0.4334446123,
    0.21800412,
    0.0657853433,
    0.0107618673,
    0.0007700127,
    0.00001368088,
];

/// Taper fraction of the Tukey window.
const TUKEY_ALPHA: f64 = 0.66;

/// Window function types.
///
/// The discriminants are the opaque integer indices used on the host side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    Rectangular,
    Hamming,
    Hanning,
    Bartlett,
    Blackman,
    BlackmanHarris4,
    BlackmanHarris7,
    Tukey,
    Sine,
}

impl WindowType {
    /// Resolves a host-side window index.
    ///
    /// Unknown indices fall back to Hanning with a logged warning rather
    /// than failing: window selection is never a hard error.
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => WindowType::Rectangular,
            1 => WindowType::Hamming,
            2 => WindowType::Hanning,
            3 => WindowType::Bartlett,
            4 => WindowType::Blackman,
            5 => WindowType::BlackmanHarris4,
            6 => WindowType::BlackmanHarris7,
            7 => WindowType::Tukey,
            8 => WindowType::Sine,
            other => {
                warn!("unknown window index {}, falling back to Hanning", other);
                WindowType::Hanning
            }
        }
    }

    /// The host-side integer index of this window kind.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            WindowType::Rectangular => 0,
            WindowType::Hamming => 1,
            WindowType::Hanning => 2,
            WindowType::Bartlett => 3,
            WindowType::Blackman => 4,
            WindowType::BlackmanHarris4 => 5,
            WindowType::BlackmanHarris7 => 6,
            WindowType::Tukey => 7,
            WindowType::Sine => 8,
        }
    }
}

impl Default for WindowType {
    fn default() -> Self {
        WindowType::Hanning
    }
}

/// Generates a window table of the specified kind and size.
pub fn generate_window(window_type: WindowType, size: usize) -> Vec<f32> {
    if let Some(w) = trivial_window(size) {
        return w;
    }
    match window_type {
        WindowType::Rectangular => vec![1.0; size],
        WindowType::Hamming => raised_cosine(size, 0.54, 0.46),
        WindowType::Hanning => raised_cosine(size, 0.5, 0.5),
        WindowType::Bartlett => bartlett_window(size),
        WindowType::Blackman => blackman_window(size),
        WindowType::BlackmanHarris4 => blackman_harris4_window(size),
        WindowType::BlackmanHarris7 => blackman_harris7_window(size),
        WindowType::Tukey => tukey_window(size, TUKEY_ALPHA),
        WindowType::Sine => sine_window(size),
    }
}

/// Returns `Some(trivial_window)` for degenerate sizes (0 or 1), or `None`
/// to indicate the caller should compute the full window.
#[inline]
fn trivial_window(size: usize) -> Option<Vec<f32>> {
    match size {
        0 => Some(vec![]),
        1 => Some(vec![1.0]),
        _ => None,
    }
}

/// Two-term raised cosine family (Hamming, Hanning).
#[inline]
fn raised_cosine(size: usize, a0: f64, a1: f64) -> Vec<f32> {
    let n = size as f64;
    (0..size)
        .map(|i| {
            let x = (2.0 * PI * i as f64) / (n - 1.0);
            (a0 - a1 * x.cos()) as f32
        })
        .collect()
}

/// Triangular window.
#[inline]
fn bartlett_window(size: usize) -> Vec<f32> {
    let n = size as f64;
    (0..size)
        .map(|i| {
            let x = 2.0 * i as f64 / (n - 1.0) - 1.0;
            (1.0 - x.abs()) as f32
        })
        .collect()
}

/// Exact Blackman 3-term window.
#[inline]
fn blackman_window(size: usize) -> Vec<f32> {
    let n = size as f64;
    (0..size)
        .map(|i| {
            let x = i as f64 / (n - 1.0);
            let w = BLACKMAN_A0 - BLACKMAN_A1 * (2.0 * PI * x).cos()
                + BLACKMAN_A2 * (4.0 * PI * x).cos();
            w as f32
        })
        .collect()
}

/// Blackman-Harris 4-term window.
#[inline]
fn blackman_harris4_window(size: usize) -> Vec<f32> {
    let n = size as f64;
    (0..size)
        .map(|i| {
            let x = i as f64 / (n - 1.0);
            let w = BH4_A0 - BH4_A1 * (2.0 * PI * x).cos() + BH4_A2 * (4.0 * PI * x).cos()
                - BH4_A3 * (6.0 * PI * x).cos();
            w as f32
        })
        .collect()
}

/// Blackman-Harris 7-term window.
#[inline]
fn blackman_harris7_window(size: usize) -> Vec<f32> {
    let n = size as f64;
    (0..size)
        .map(|i| {
            let x = i as f64 / (n - 1.0);
            let mut w = BH7[0];
            for (term, &a) in BH7.iter().enumerate().skip(1) {
                let sign = if term % 2 == 1 { -1.0 } else { 1.0 };
                w += sign * a * (2.0 * PI * term as f64 * x).cos();
            }
            w as f32
        })
        .collect()
}

/// Tukey (tapered cosine) window.
#[inline]
fn tukey_window(size: usize, alpha: f64) -> Vec<f32> {
    let n = size as f64 - 1.0;
    let taper = alpha * n / 2.0;
    (0..size)
        .map(|i| {
            let i = i as f64;
            let w = if i < taper {
                0.5 * (1.0 + (PI * (i / taper - 1.0)).cos())
            } else if i > n - taper {
                0.5 * (1.0 + (PI * ((i - n + taper) / taper)).cos())
            } else {
                1.0
            };
            w as f32
        })
        .collect()
}

/// Half-sine window.
#[inline]
fn sine_window(size: usize) -> Vec<f32> {
    let n = size as f64;
    (0..size)
        .map(|i| (PI * i as f64 / (n - 1.0)).sin() as f32)
        .collect()
}

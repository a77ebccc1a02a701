//! Phase-vocoder analysis node: time domain to spectral stream.

use std::f64::consts::PI;
use std::rc::Rc;

use log::debug;

use crate::core::fft::RealFft;
use crate::core::types::{PvConfig, PvGeometry};
use crate::core::window::{generate_window, WindowType};
use crate::nodes::{PvNode, PvSource};
use crate::stream::{PvStream, SharedPvStream, SharedSignal};

const TWO_PI: f64 = 2.0 * PI;

/// Streaming phase-vocoder analyzer.
///
/// Consumes one time-domain block per tick and publishes overlapping
/// spectral frames (magnitude + true frequency per bin) into its output
/// [`PvStream`]. A new frame is produced every `N / O` input samples; the
/// per-sample schedule of those hops is published through the stream's
/// `count` array so downstream nodes can follow without sharing indices.
///
/// The first `N - N/O` ring samples are zero-padded silence, so analysis
/// ramps up from silence over the first `O` frames.
pub struct PvAnalyzer {
    input: SharedSignal,
    pv_stream: SharedPvStream,
    sample_rate: f64,
    block_size: usize,
    size: usize,
    olaps: usize,
    hsize: usize,
    hopsize: usize,
    input_latency: usize,
    wintype: WindowType,
    incount: usize,
    overcount: usize,
    /// Hz per radian-per-hop: `sr / (P * 2pi)`.
    factor: f64,
    /// Expected phase advance per hop for bin 1: `2pi * P / N`.
    scale: f64,
    input_buffer: Vec<f32>,
    inframe: Vec<f32>,
    real: Vec<f32>,
    imag: Vec<f32>,
    last_phase: Vec<f64>,
    fft: RealFft,
    window: Vec<f32>,
    playing: bool,
}

impl PvAnalyzer {
    /// Creates an analyzer reading `input` with default geometry
    /// (N = 1024, O = 4, Hanning window).
    pub fn new(input: SharedSignal, config: PvConfig) -> Self {
        let geometry = PvGeometry::default();
        let block_size = input.borrow().len();
        let pv_stream = PvStream::new_shared(block_size);

        let mut analyzer = Self {
            input,
            pv_stream,
            sample_rate: config.sample_rate as f64,
            block_size,
            size: geometry.size(),
            olaps: geometry.olaps(),
            hsize: 0,
            hopsize: 0,
            input_latency: 0,
            wintype: WindowType::default(),
            incount: 0,
            overcount: 0,
            factor: 0.0,
            scale: 0.0,
            input_buffer: Vec::new(),
            inframe: Vec::new(),
            real: Vec::new(),
            imag: Vec::new(),
            last_phase: Vec::new(),
            fft: RealFft::new(geometry.size()),
            window: Vec::new(),
            playing: true,
        };
        analyzer.realloc_memories();
        analyzer
    }

    /// Sets the FFT size before first use (rounded up to a power of two).
    pub fn with_size(mut self, size: usize) -> Self {
        self.set_size(size);
        self
    }

    /// Sets the overlap count before first use (rounded up to a power of two).
    pub fn with_olaps(mut self, olaps: usize) -> Self {
        self.set_olaps(olaps);
        self
    }

    /// Sets the analysis window before first use.
    pub fn with_wintype(mut self, wintype: WindowType) -> Self {
        self.set_wintype(wintype);
        self
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

    /// Current analysis window kind.
    #[inline]
    pub fn wintype(&self) -> WindowType {
        self.wintype
    }

    /// Changes the FFT size and reallocates all geometry-dependent state.
    ///
    /// Phase history is discarded; the transient reset is accepted.
    pub fn set_size(&mut self, size: usize) {
        self.size = PvGeometry::new(size, self.olaps).size();
        self.realloc_memories();
    }

    /// Changes the overlap count and reallocates all geometry-dependent state.
    pub fn set_olaps(&mut self, olaps: usize) {
        self.olaps = PvGeometry::new(self.size, olaps).olaps();
        self.realloc_memories();
    }

    /// Regenerates the window table in place; phase history is untouched.
    pub fn set_wintype(&mut self, wintype: WindowType) {
        self.wintype = wintype;
        self.window = generate_window(self.wintype, self.size);
    }

    /// Rebinds the time-domain input.
    pub fn set_input(&mut self, input: SharedSignal) {
        self.input = input;
    }

    fn realloc_memories(&mut self) {
        self.hsize = self.size / 2;
        self.hopsize = self.size / self.olaps;
        self.input_latency = self.size - self.hopsize;
        self.incount = self.input_latency;
        self.overcount = 0;
        self.factor = self.sample_rate / (self.hopsize as f64 * TWO_PI);
        self.scale = TWO_PI * self.hopsize as f64 / self.size as f64;

        self.input_buffer = vec![0.0; self.size];
        self.inframe = vec![0.0; self.size];
        self.real = vec![0.0; self.hsize];
        self.imag = vec![0.0; self.hsize];
        self.last_phase = vec![0.0; self.hsize];
        self.fft = RealFft::new(self.size);
        self.window = generate_window(self.wintype, self.size);

        self.pv_stream
            .borrow_mut()
            .reset(self.size, self.olaps, self.input_latency);
        debug!(
            "analyzer reallocated: size={} olaps={} hop={}",
            self.size, self.olaps, self.hopsize
        );
    }

    fn process_block(&mut self) {
        let input = Rc::clone(&self.input);
        let input = input.borrow();
        let stream = Rc::clone(&self.pv_stream);
        let mut stream = stream.borrow_mut();

        for i in 0..self.block_size {
            self.input_buffer[self.incount] = input[i];
            stream.set_count(i, self.incount);
            self.incount += 1;
            if self.incount >= self.size {
                self.analyze_hop(&mut stream);
            }
        }
    }

    /// Hop boundary: window + rotate the full ring, transform, publish one
    /// magnitude/true-frequency row, then slide the ring by one hop.
    fn analyze_hop(&mut self, stream: &mut PvStream) {
        self.incount = self.input_latency;

        // Rotation by the accumulated hop offset keeps all O frames on a
        // common phase reference.
        let rotation = self.hopsize * self.overcount;
        for k in 0..self.size {
            self.inframe[(k + rotation) % self.size] = self.input_buffer[k] * self.window[k];
        }
        self.fft.forward(&self.inframe, &mut self.real, &mut self.imag);

        let (magn, freq) = stream.rows_mut(self.overcount);
        for k in 0..self.hsize {
            let re = self.real[k] as f64;
            let im = self.imag[k] as f64;
            let mag = (re * re + im * im).sqrt();
            let phase = im.atan2(re);

            let mut delta = phase - self.last_phase[k];
            self.last_phase[k] = phase;
            while delta > PI {
                delta -= TWO_PI;
            }
            while delta < -PI {
                delta += TWO_PI;
            }

            magn[k] = mag as f32;
            // An empty bin has no measurable frequency.
            freq[k] = if mag == 0.0 {
                0.0
            } else {
                ((delta + k as f64 * self.scale) * self.factor) as f32
            };
        }

        // Slide the ring: keep the last L samples as context for the next hop.
        self.input_buffer.copy_within(self.hopsize.., 0);

        self.overcount += 1;
        if self.overcount >= self.olaps {
            self.overcount = 0;
        }
    }
}

impl PvNode for PvAnalyzer {
    fn compute_next_data_frame(&mut self) {
        self.process_block();
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }
}

impl PvSource for PvAnalyzer {
    fn pv_stream(&self) -> SharedPvStream {
        Rc::clone(&self.pv_stream)
    }
}

impl std::fmt::Debug for PvAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PvAnalyzer")
            .field("size", &self.size)
            .field("olaps", &self.olaps)
            .field("wintype", &self.wintype)
            .field("incount", &self.incount)
            .field("overcount", &self.overcount)
            .finish()
    }
}

//! Phase-vocoder synthesis node: spectral stream back to time domain.

use std::f64::consts::PI;
use std::rc::Rc;

use log::debug;

use crate::core::fft::RealFft;
use crate::core::types::PvConfig;
use crate::core::window::{generate_window, WindowType};
use crate::nodes::{PvNode, PvSource};
use crate::stream::{shared_signal, Param, SharedPvStream, SharedSignal};

const TWO_PI: f64 = 2.0 * PI;

/// Minimum overlap gain (as a fraction of the table maximum) admitted by the
/// emit normalization, preventing amplification where the window pair leaves
/// near-zero overlap energy.
const OVERLAP_GAIN_FLOOR_RATIO: f32 = 0.1;
/// Absolute floor for the overlap gain to prevent division by zero.
const OVERLAP_GAIN_EPSILON: f32 = 1e-6;

/// Streaming phase-vocoder synthesizer.
///
/// Consumes a spectral stream and emits one audio sample per input sample:
/// per-bin phase accumulation from the true-frequency grid, Hermitian pack,
/// inverse FFT and windowed overlap-add. A multiply/add post-stage is applied
/// samplewise to the emitted block, and the result can additionally be mixed
/// into a host bus via [`out`].
///
/// At every block start the node compares the upstream stream's geometry with
/// its own and silently reallocates when they differ, so an upstream
/// `set_size`/`set_olaps` takes effect one block later with no host
/// intervention.
///
/// [`out`]: PvSynth::out
pub struct PvSynth {
    input: SharedPvStream,
    output: SharedSignal,
    sample_rate: f64,
    block_size: usize,
    size: usize,
    olaps: usize,
    hsize: usize,
    hopsize: usize,
    input_latency: usize,
    wintype: WindowType,
    overcount: usize,
    /// Radians-per-hop per Hz: `P * 2pi / sr`.
    factor: f64,
    /// Bin-center frequency step in Hz: `sr / N`.
    scale: f64,
    /// Overlap-add amplitude compensation, `1 / sqrt(O)`.
    ampscl: f32,
    output_buffer: Vec<f32>,
    output_accum: Vec<f32>,
    outframe: Vec<f32>,
    real: Vec<f32>,
    imag: Vec<f32>,
    sum_phase: Vec<f64>,
    fft: RealFft,
    window: Vec<f32>,
    /// Reciprocal steady-state overlap gain per emit slot, period `P`.
    inv_norm: Vec<f32>,
    mul: Param,
    add: Param,
    bus: Option<SharedSignal>,
    playing: bool,
}

impl PvSynth {
    /// Creates a synthesizer consuming `source`'s spectral stream, adopting
    /// its geometry. Default Hanning window, `mul = 1`, `add = 0`.
    pub fn new(source: &dyn PvSource, config: PvConfig) -> Self {
        let input = source.pv_stream();
        let (size, olaps, _) = crate::nodes::upstream_shape(&input);

        let mut synth = Self {
            input,
            output: shared_signal(config.block_size),
            sample_rate: config.sample_rate as f64,
            block_size: config.block_size,
            size,
            olaps,
            hsize: 0,
            hopsize: 0,
            input_latency: 0,
            wintype: WindowType::default(),
            overcount: 0,
            factor: 0.0,
            scale: 0.0,
            ampscl: 0.0,
            output_buffer: Vec::new(),
            output_accum: Vec::new(),
            outframe: Vec::new(),
            real: Vec::new(),
            imag: Vec::new(),
            sum_phase: Vec::new(),
            fft: RealFft::new(size),
            window: Vec::new(),
            inv_norm: Vec::new(),
            mul: Param::Const(1.0),
            add: Param::Const(0.0),
            bus: None,
            playing: true,
        };
        synth.realloc_memories();
        synth
    }

    /// Sets the synthesis window before first use.
    pub fn with_wintype(mut self, wintype: WindowType) -> Self {
        self.set_wintype(wintype);
        self
    }

    /// Sets the post-stage multiplier before first use.
    pub fn with_mul(mut self, mul: impl Into<Param>) -> Self {
        self.mul = mul.into();
        self
    }

    /// Sets the post-stage offset before first use.
    pub fn with_add(mut self, add: impl Into<Param>) -> Self {
        self.add = add.into();
        self
    }

    /// The synthesized audio block, rewritten every tick.
    pub fn output(&self) -> SharedSignal {
        Rc::clone(&self.output)
    }

    /// Current synthesis window kind.
    #[inline]
    pub fn wintype(&self) -> WindowType {
        self.wintype
    }

    /// Regenerates the window table and its overlap-gain normalization;
    /// phase state is untouched.
    pub fn set_wintype(&mut self, wintype: WindowType) {
        self.wintype = wintype;
        self.window = generate_window(self.wintype, self.size);
        self.compute_overlap_gain();
    }

    /// Rebinds the spectral input; geometry re-syncs on the next block.
    pub fn set_input(&mut self, source: &dyn PvSource) {
        self.input = source.pv_stream();
    }

    /// Sets the samplewise post-stage multiplier.
    pub fn set_mul(&mut self, mul: impl Into<Param>) {
        self.mul = mul.into();
    }

    /// Sets the samplewise post-stage offset.
    pub fn set_add(&mut self, add: impl Into<Param>) {
        self.add = add.into();
    }

    /// Starts the node and additionally mixes its post-processed output into
    /// the given host bus every block.
    pub fn out(&mut self, bus: SharedSignal) {
        self.bus = Some(bus);
        self.playing = true;
    }

    fn realloc_memories(&mut self) {
        self.hsize = self.size / 2;
        self.hopsize = self.size / self.olaps;
        self.input_latency = self.size - self.hopsize;
        self.overcount = 0;
        self.factor = self.hopsize as f64 * TWO_PI / self.sample_rate;
        self.scale = self.sample_rate / self.size as f64;
        self.ampscl = 1.0 / (self.olaps as f32).sqrt();

        self.output_buffer = vec![0.0; self.hopsize];
        self.output_accum = vec![0.0; self.size + self.hopsize];
        self.outframe = vec![0.0; self.size];
        self.real = vec![0.0; self.hsize];
        self.imag = vec![0.0; self.hsize];
        self.sum_phase = vec![0.0; self.hsize];
        self.fft = RealFft::new(self.size);
        self.window = generate_window(self.wintype, self.size);
        self.compute_overlap_gain();
        debug!(
            "synth reallocated: size={} olaps={} hop={}",
            self.size, self.olaps, self.hopsize
        );
    }

    /// Precomputes the reciprocal steady-state overlap gain for each of the
    /// `P` emit slots: `ampscl * sum_h window[j + h*P]^2`, floored against
    /// near-zero overlap energy. Assumes the analysis stage used the same
    /// window kind; with all `O` hops contributing, dividing the emitted
    /// slice by this gain makes the analyzer-to-synth chain unity-gain.
    fn compute_overlap_gain(&mut self) {
        let mut gain = vec![0.0f32; self.hopsize];
        for (j, slot) in gain.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for h in 0..self.olaps {
                let w = self.window[j + h * self.hopsize];
                acc += w * w;
            }
            *slot = acc * self.ampscl;
        }
        let max_gain = gain.iter().copied().fold(0.0f32, f32::max);
        let floor = (max_gain * OVERLAP_GAIN_FLOOR_RATIO).max(OVERLAP_GAIN_EPSILON);
        self.inv_norm = gain.iter().map(|&g| 1.0 / g.max(floor)).collect();
    }

    fn process_block(&mut self) {
        // Absorb upstream geometry drift before touching any buffer.
        let (up_size, up_olaps) = {
            let stream = self.input.borrow();
            (stream.fft_size(), stream.olaps())
        };
        if up_size != 0 && (up_size != self.size || up_olaps != self.olaps) {
            self.size = up_size;
            self.olaps = up_olaps;
            self.realloc_memories();
        }

        let input = Rc::clone(&self.input);
        let stream = input.borrow();
        let output = Rc::clone(&self.output);
        let mut data = output.borrow_mut();

        for i in 0..self.block_size {
            let count = stream.count(i);
            data[i] = self.output_buffer[count.saturating_sub(self.input_latency)];
            if count >= self.size - 1 {
                self.synthesize_hop(&stream);
            }
        }

        for i in 0..self.block_size {
            data[i] = data[i] * self.mul.at(i) + self.add.at(i);
        }
        if let Some(bus) = &self.bus {
            let mut bus = bus.borrow_mut();
            for i in 0..self.block_size {
                bus[i] += data[i];
            }
        }
    }

    /// Hop boundary: accumulate per-bin phase from the true-frequency grid,
    /// inverse-transform, overlap-add the rotated windowed frame, and emit
    /// the next `P` fully-mixed samples.
    fn synthesize_hop(&mut self, stream: &crate::stream::PvStream) {
        let magn = stream.magn_row(self.overcount);
        let freq = stream.freq_row(self.overcount);
        for k in 0..self.hsize {
            let delta = (freq[k] as f64 - k as f64 * self.scale) * self.factor;
            self.sum_phase[k] += delta;
            let phase = self.sum_phase[k];
            let mag = magn[k] as f64;
            self.real[k] = (mag * phase.cos()) as f32;
            self.imag[k] = (mag * phase.sin()) as f32;
        }
        self.fft.inverse(&self.real, &self.imag, &mut self.outframe);

        // Undo the analysis-side rotation while accumulating.
        let rotation = self.hopsize * self.overcount;
        for k in 0..self.size {
            self.output_accum[k] +=
                self.outframe[(k + rotation) % self.size] * self.window[k] * self.ampscl;
        }

        for k in 0..self.hopsize {
            self.output_buffer[k] = self.output_accum[k] * self.inv_norm[k];
        }

        // Slide the accumulator; the tail beyond N stays zero, so the top
        // hop positions are injected as zeros.
        self.output_accum.copy_within(self.hopsize.., 0);
        let len = self.output_accum.len();
        self.output_accum[len - self.hopsize..].fill(0.0);

        self.overcount += 1;
        if self.overcount >= self.olaps {
            self.overcount = 0;
        }
    }
}

impl PvNode for PvSynth {
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

impl std::fmt::Debug for PvSynth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PvSynth")
            .field("size", &self.size)
            .field("olaps", &self.olaps)
            .field("wintype", &self.wintype)
            .field("overcount", &self.overcount)
            .finish()
    }
}

//! Spectral gate transformer.

use std::rc::Rc;

use log::debug;

use crate::error::PvError;
use crate::nodes::{PvNode, PvSource};
use crate::stream::{Param, PvStream, SharedPvStream};

/// Attenuates spectral bins whose magnitude falls below a threshold.
///
/// The threshold is given in decibels and converted to linear magnitude at
/// each hop; bins below it are scaled by `damp` (0 mutes them, 1 makes the
/// gate transparent), bins at or above it pass unchanged. Frequencies are
/// never touched.
pub struct PvGate {
    input: SharedPvStream,
    pv_stream: SharedPvStream,
    block_size: usize,
    size: usize,
    olaps: usize,
    hsize: usize,
    hopsize: usize,
    overcount: usize,
    thresh: Param,
    damp: Param,
    playing: bool,
}

impl PvGate {
    /// Creates a spectral gate on `source`'s stream. `thresh` is in dB.
    pub fn new(
        source: &dyn PvSource,
        thresh: impl Into<Param>,
        damp: impl Into<Param>,
    ) -> Self {
        let input = source.pv_stream();
        let (size, olaps, block_size) = crate::nodes::upstream_shape(&input);

        let mut node = Self {
            input,
            pv_stream: PvStream::new_shared(block_size),
            block_size,
            size,
            olaps,
            hsize: 0,
            hopsize: 0,
            overcount: 0,
            thresh: thresh.into(),
            damp: damp.into(),
            playing: true,
        };
        node.realloc_memories();
        node
    }

    /// Sets the threshold in dB (scalar or audio-rate).
    pub fn set_thresh(&mut self, thresh: impl Into<Param>) {
        self.thresh = thresh.into();
    }

    /// Sets the attenuation applied below the threshold.
    pub fn set_damp(&mut self, damp: impl Into<Param>) {
        self.damp = damp.into();
    }

    /// Rebinds the spectral input.
    pub fn set_input(&mut self, source: &dyn PvSource) -> Result<(), PvError> {
        let stream = source.pv_stream();
        if Rc::ptr_eq(&stream, &self.pv_stream) {
            return Err(PvError::SelfInput);
        }
        self.input = stream;
        Ok(())
    }

    fn realloc_memories(&mut self) {
        self.hsize = self.size / 2;
        self.hopsize = self.size / self.olaps;
        self.overcount = 0;
        let input_latency = self.size - self.hopsize;
        self.pv_stream
            .borrow_mut()
            .reset(self.size, self.olaps, input_latency);
        debug!("gate reallocated: size={} olaps={}", self.size, self.olaps);
    }

    fn process_block(&mut self) {
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
        let upstream = input.borrow();
        let output = Rc::clone(&self.pv_stream);
        let mut own = output.borrow_mut();

        for i in 0..self.block_size {
            let count = upstream.count(i);
            own.set_count(i, count);
            if count >= self.size - 1 {
                let thresh = 10.0f32.powf(self.thresh.at(i) * 0.05);
                let damp = self.damp.at(i);

                let magn_in = upstream.magn_row(self.overcount);
                let freq_in = upstream.freq_row(self.overcount);
                let (magn_out, freq_out) = own.rows_mut(self.overcount);
                for k in 0..self.hsize {
                    let mag = magn_in[k];
                    magn_out[k] = if mag < thresh { mag * damp } else { mag };
                    freq_out[k] = freq_in[k];
                }

                self.overcount += 1;
                if self.overcount >= self.olaps {
                    self.overcount = 0;
                }
            }
        }
    }
}

impl PvNode for PvGate {
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

impl PvSource for PvGate {
    fn pv_stream(&self) -> SharedPvStream {
        Rc::clone(&self.pv_stream)
    }
}

impl std::fmt::Debug for PvGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PvGate")
            .field("size", &self.size)
            .field("olaps", &self.olaps)
            .field("thresh", &self.thresh)
            .field("damp", &self.damp)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PvConfig;
    use crate::nodes::PvAnalyzer;
    use crate::stream::shared_signal;

    fn fixture(thresh_db: f32, damp: f32) -> (PvAnalyzer, PvGate) {
        let config = PvConfig::default();
        let input = shared_signal(config.block_size);
        let analyzer = PvAnalyzer::new(input, config);
        let gate = PvGate::new(&analyzer, thresh_db, damp);
        (analyzer, gate)
    }

    fn feed_hop(analyzer: &PvAnalyzer, gate: &mut PvGate, magnitudes: &[f32]) {
        let stream = analyzer.pv_stream();
        {
            let mut stream = stream.borrow_mut();
            let n = stream.fft_size();
            let b = stream.counts().len();
            {
                let (magn, _) = stream.rows_mut(0);
                magn[..magnitudes.len()].copy_from_slice(magnitudes);
            }
            for i in 0..b {
                stream.set_count(i, if i == 0 { n - 1 } else { 0 });
            }
        }
        gate.compute_next_data_frame();
    }

    #[test]
    fn test_threshold_splits_bins() {
        // -20 dB threshold = 0.1 linear; damp = 0 mutes quiet bins.
        let (analyzer, mut gate) = fixture(-20.0, 0.0);
        feed_hop(&analyzer, &mut gate, &[0.5, 0.09, 0.11, 0.0999, 0.3]);

        let out = gate.pv_stream();
        let out = out.borrow();
        let magn = out.magn_row(0);
        assert_eq!(magn[0], 0.5);
        assert_eq!(magn[1], 0.0);
        assert_eq!(magn[2], 0.11f32);
        assert_eq!(magn[3], 0.0);
        assert_eq!(magn[4], 0.3);
    }

    #[test]
    fn test_damp_scales_quiet_bins() {
        let (analyzer, mut gate) = fixture(-20.0, 0.5);
        feed_hop(&analyzer, &mut gate, &[0.04, 0.4]);

        let out = gate.pv_stream();
        let out = out.borrow();
        assert!((out.magn_row(0)[0] - 0.02).abs() < 1e-7);
        assert_eq!(out.magn_row(0)[1], 0.4);
    }

    #[test]
    fn test_very_low_threshold_is_transparent() {
        let (analyzer, mut gate) = fixture(-120.0, 0.0);
        let magnitudes: Vec<f32> = (0..16).map(|k| 0.01 + k as f32 * 0.05).collect();
        feed_hop(&analyzer, &mut gate, &magnitudes);

        let out = gate.pv_stream();
        let out = out.borrow();
        assert_eq!(&out.magn_row(0)[..16], magnitudes.as_slice());
    }
}

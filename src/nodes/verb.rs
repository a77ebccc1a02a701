//! Spectral reverberation transformer.

use std::rc::Rc;

use log::debug;

use crate::error::PvError;
use crate::nodes::{PvNode, PvSource};
use crate::stream::{Param, PvStream, SharedPvStream};

/// Smears a spectral stream in time by letting bin magnitudes decay.
///
/// Rising magnitudes are followed instantly (attack); falling magnitudes are
/// released exponentially toward the input, with the decay slowed by
/// `revtime` and shortened toward high bins by `damp`. Frequencies pass
/// through untouched, so the reverb tail keeps the pitch content of the dry
/// signal.
///
/// `revtime` maps `[0, 1]` onto a per-hop decay of `0.75..=1.0`; `damp` maps
/// `[0, 1]` onto a per-bin damping walk of `0.997..=1.0`.
pub struct PvVerb {
    input: SharedPvStream,
    pv_stream: SharedPvStream,
    block_size: usize,
    size: usize,
    olaps: usize,
    hsize: usize,
    hopsize: usize,
    overcount: usize,
    revtime: Param,
    damp: Param,
    last_magn: Vec<f32>,
    playing: bool,
}

impl PvVerb {
    /// Creates a spectral reverb on `source`'s stream.
    pub fn new(
        source: &dyn PvSource,
        revtime: impl Into<Param>,
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
            revtime: revtime.into(),
            damp: damp.into(),
            last_magn: Vec::new(),
            playing: true,
        };
        node.realloc_memories();
        node
    }

    /// Sets the reverberation factor (scalar or audio-rate, clamped to 0..1).
    pub fn set_revtime(&mut self, revtime: impl Into<Param>) {
        self.revtime = revtime.into();
    }

    /// Sets the high-frequency damping factor (scalar or audio-rate,
    /// clamped to 0..1).
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
        self.last_magn = vec![0.0; self.hsize];
        let input_latency = self.size - self.hopsize;
        self.pv_stream
            .borrow_mut()
            .reset(self.size, self.olaps, input_latency);
        debug!("verb reallocated: size={} olaps={}", self.size, self.olaps);
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
                let revtime = self.revtime.at(i).clamp(0.0, 1.0) * 0.25 + 0.75;
                let damp = self.damp.at(i).clamp(0.0, 1.0) * 0.003 + 0.997;
                self.verb_hop(&upstream, &mut own, revtime, damp);
            }
        }
    }

    /// Hop boundary: envelope-follow each bin with instant attack and
    /// exponential release, higher bins releasing faster when `damp < 1`.
    fn verb_hop(&mut self, upstream: &PvStream, own: &mut PvStream, revtime: f32, damp: f32) {
        let magn_in = upstream.magn_row(self.overcount);
        let freq_in = upstream.freq_row(self.overcount);
        let (magn_out, freq_out) = own.rows_mut(self.overcount);

        let mut amp = 1.0f32;
        for k in 0..self.hsize {
            let mag = magn_in[k];
            let out = if mag > self.last_magn[k] {
                mag
            } else {
                mag + (self.last_magn[k] - mag) * revtime * amp
            };
            self.last_magn[k] = out;
            magn_out[k] = out;
            freq_out[k] = freq_in[k];
            amp *= damp;
        }

        self.overcount += 1;
        if self.overcount >= self.olaps {
            self.overcount = 0;
        }
    }
}

impl PvNode for PvVerb {
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

impl PvSource for PvVerb {
    fn pv_stream(&self) -> SharedPvStream {
        Rc::clone(&self.pv_stream)
    }
}

impl std::fmt::Debug for PvVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PvVerb")
            .field("size", &self.size)
            .field("olaps", &self.olaps)
            .field("revtime", &self.revtime)
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

    fn fixture(revtime: f32, damp: f32) -> (PvAnalyzer, PvVerb) {
        let config = PvConfig::default();
        let input = shared_signal(config.block_size);
        let analyzer = PvAnalyzer::new(input, config);
        let verb = PvVerb::new(&analyzer, revtime, damp);
        (analyzer, verb)
    }

    /// Writes `mag` into every bin of upstream row `row` and fires one hop.
    fn feed_hop(analyzer: &PvAnalyzer, verb: &mut PvVerb, row: usize, mag: f32) {
        let stream = analyzer.pv_stream();
        {
            let mut stream = stream.borrow_mut();
            let n = stream.fft_size();
            let b = stream.counts().len();
            {
                let (magn, _) = stream.rows_mut(row);
                magn.fill(mag);
            }
            for i in 0..b {
                stream.set_count(i, if i == 0 { n - 1 } else { 0 });
            }
        }
        verb.compute_next_data_frame();
    }

    #[test]
    fn test_attack_is_instantaneous() {
        let (analyzer, mut verb) = fixture(1.0, 0.0);
        // Non-decreasing magnitudes: the envelope equals the input exactly.
        for (hop, mag) in [0.1f32, 0.2, 0.5, 0.5, 0.9].into_iter().enumerate() {
            feed_hop(&analyzer, &mut verb, hop % 4, mag);
            let out = verb.pv_stream();
            let out = out.borrow();
            assert!(
                out.magn_row(hop % 4).iter().all(|&m| (m - mag).abs() < 1e-7),
                "attack lagged at hop {}",
                hop
            );
        }
    }

    #[test]
    fn test_release_decays_by_revtime() {
        // revtime = 0 maps to a decay factor of 0.75; damp = 1 maps to a
        // per-bin walk of 1.0 (no extra damping).
        let (analyzer, mut verb) = fixture(0.0, 1.0);
        feed_hop(&analyzer, &mut verb, 0, 1.0);
        // Silence afterwards: the envelope decays by 0.75 per hop.
        let mut expected = 1.0f32;
        for hop in 1..5 {
            feed_hop(&analyzer, &mut verb, hop % 4, 0.0);
            expected *= 0.75;
            let out = verb.pv_stream();
            let out = out.borrow();
            let got = out.magn_row(hop % 4)[10];
            assert!(
                (got - expected).abs() < 1e-5,
                "hop {}: expected {}, got {}",
                hop,
                expected,
                got
            );
        }
    }

    #[test]
    fn test_damp_shortens_high_bins() {
        // damp = 0 maps to 0.997: bin k decays by an extra 0.997^k.
        let (analyzer, mut verb) = fixture(0.0, 0.0);
        feed_hop(&analyzer, &mut verb, 0, 1.0);
        feed_hop(&analyzer, &mut verb, 1, 0.0);

        let out = verb.pv_stream();
        let out = out.borrow();
        let magn = out.magn_row(1);
        let k = 100;
        let expected = 0.75 * 0.997f32.powi(k as i32);
        assert!((magn[k] - expected).abs() < 1e-4);
        // Monotone: higher bins release strictly faster.
        assert!(magn[400] < magn[100]);
        assert!(magn[100] < magn[1]);
    }

    #[test]
    fn test_frequencies_pass_through() {
        let (analyzer, mut verb) = fixture(0.5, 0.5);
        {
            let stream = analyzer.pv_stream();
            let mut stream = stream.borrow_mut();
            let (_, freq) = stream.rows_mut(0);
            for (k, slot) in freq.iter_mut().enumerate() {
                *slot = k as f32 * 43.0;
            }
        }
        feed_hop(&analyzer, &mut verb, 0, 0.3);

        let out = verb.pv_stream();
        let out = out.borrow();
        // feed_hop rewrote magnitudes but kept the frequency row.
        for (k, &f) in out.freq_row(0).iter().enumerate() {
            assert_eq!(f, k as f32 * 43.0);
        }
    }
}

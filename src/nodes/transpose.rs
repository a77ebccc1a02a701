//! Spectral transposition transformer.

use std::rc::Rc;

use log::debug;

use crate::error::PvError;
use crate::nodes::{PvNode, PvSource};
use crate::stream::{Param, PvStream, SharedPvStream};

/// Transposes a spectral stream by a factor without time stretching.
///
/// On each fresh hop every source bin `k` is mapped to `floor(k * t)`:
/// magnitudes of colliding bins accumulate, the frequency slot keeps the
/// last writer (nearby source bins carry nearly identical frequencies), and
/// bins mapped past the Nyquist half are dropped. The upstream schedule is
/// mirrored so downstream nodes see the analyzer's timing unchanged.
pub struct PvTranspose {
    input: SharedPvStream,
    pv_stream: SharedPvStream,
    block_size: usize,
    size: usize,
    olaps: usize,
    hsize: usize,
    hopsize: usize,
    overcount: usize,
    transpo: Param,
    playing: bool,
}

impl PvTranspose {
    /// Creates a transposition node on `source`'s stream.
    pub fn new(source: &dyn PvSource, transpo: impl Into<Param>) -> Self {
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
            transpo: transpo.into(),
            playing: true,
        };
        node.realloc_memories();
        node
    }

    /// Current transposition parameter.
    pub fn transpo(&self) -> &Param {
        &self.transpo
    }

    /// Sets the transposition factor (scalar or audio-rate).
    pub fn set_transpo(&mut self, transpo: impl Into<Param>) {
        self.transpo = transpo.into();
    }

    /// Rebinds the spectral input.
    ///
    /// Fails if the new source is this node itself; spectral chains are
    /// acyclic by contract.
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
        debug!("transpose reallocated: size={} olaps={}", self.size, self.olaps);
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
                let transpo = self.transpo.at(i);
                let magn_in = upstream.magn_row(self.overcount);
                let freq_in = upstream.freq_row(self.overcount);
                let (magn_out, freq_out) = own.rows_mut(self.overcount);
                magn_out.fill(0.0);
                freq_out.fill(0.0);
                for k in 0..self.hsize {
                    let index = (k as f32 * transpo) as usize;
                    if index < self.hsize {
                        magn_out[index] += magn_in[k];
                        freq_out[index] = freq_in[k] * transpo;
                    }
                }
                self.overcount += 1;
                if self.overcount >= self.olaps {
                    self.overcount = 0;
                }
            }
        }
    }
}

impl PvNode for PvTranspose {
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

impl PvSource for PvTranspose {
    fn pv_stream(&self) -> SharedPvStream {
        Rc::clone(&self.pv_stream)
    }
}

impl std::fmt::Debug for PvTranspose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PvTranspose")
            .field("size", &self.size)
            .field("olaps", &self.olaps)
            .field("transpo", &self.transpo)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PvConfig;
    use crate::nodes::PvAnalyzer;
    use crate::stream::shared_signal;

    /// Drives an analyzer until at least one hop has been published, then
    /// overwrites one row to a single-bin spectrum for inspection.
    fn single_bin_fixture(bin: usize, mag: f32, freq: f32) -> (PvAnalyzer, PvTranspose) {
        let config = PvConfig::default();
        let input = shared_signal(config.block_size);
        let analyzer = PvAnalyzer::new(input, config);
        let transpose = PvTranspose::new(&analyzer, 1.0f32);
        {
            let stream = analyzer.pv_stream();
            let mut stream = stream.borrow_mut();
            let (magn, freqs) = stream.rows_mut(0);
            magn[bin] = mag;
            freqs[bin] = freq;
        }
        (analyzer, transpose)
    }

    /// Forces one hop of the transformer against row 0 of the upstream.
    fn run_one_hop(node: &mut PvTranspose) {
        let input = Rc::clone(&node.input);
        {
            let mut stream = input.borrow_mut();
            let n = stream.fft_size();
            let b = stream.counts().len();
            for i in 0..b {
                stream.set_count(i, if i == 0 { n - 1 } else { 0 });
            }
        }
        node.compute_next_data_frame();
    }

    #[test]
    fn test_single_bin_moves_and_scales() {
        let (_analyzer, mut transpose) = single_bin_fixture(50, 0.8, 2153.3);
        transpose.set_transpo(2.0f32);
        run_one_hop(&mut transpose);

        let out = transpose.pv_stream();
        let out = out.borrow();
        let magn = out.magn_row(0);
        let freq = out.freq_row(0);
        for k in 0..out.hsize() {
            if k == 100 {
                assert!((magn[k] - 0.8).abs() < 1e-6);
                assert!((freq[k] - 4306.6).abs() < 1e-2);
            } else {
                assert_eq!(magn[k], 0.0, "unexpected magnitude at bin {}", k);
            }
        }
    }

    #[test]
    fn test_bins_past_nyquist_drop() {
        let (_analyzer, mut transpose) = single_bin_fixture(400, 1.0, 17226.0);
        transpose.set_transpo(2.0f32);
        run_one_hop(&mut transpose);

        let out = transpose.pv_stream();
        let out = out.borrow();
        assert!(out.magn_row(0).iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_colliding_bins_accumulate_magnitude() {
        let (analyzer, mut transpose) = single_bin_fixture(50, 0.5, 2153.3);
        {
            let stream = analyzer.pv_stream();
            let mut stream = stream.borrow_mut();
            let (magn, freqs) = stream.rows_mut(0);
            magn[51] = 0.25;
            freqs[51] = 2196.4;
        }
        transpose.set_transpo(0.5f32);
        run_one_hop(&mut transpose);

        // Bins 50 and 51 both land on bin 25; magnitudes sum, the frequency
        // slot keeps the last writer.
        let out = transpose.pv_stream();
        let out = out.borrow();
        assert!((out.magn_row(0)[25] - 0.75).abs() < 1e-6);
        assert!((out.freq_row(0)[25] - 2196.4 * 0.5).abs() < 1e-2);
    }

    #[test]
    fn test_schedule_is_mirrored() {
        let config = PvConfig::default();
        let input = shared_signal(config.block_size);
        let mut analyzer = PvAnalyzer::new(input, config);
        let mut transpose = PvTranspose::new(&analyzer, 1.0f32);

        analyzer.compute_next_data_frame();
        transpose.compute_next_data_frame();

        let up = analyzer.pv_stream();
        let down = transpose.pv_stream();
        assert_eq!(up.borrow().counts(), down.borrow().counts());
    }

    #[test]
    fn test_set_input_rejects_self() {
        let config = PvConfig::default();
        let input = shared_signal(config.block_size);
        let analyzer = PvAnalyzer::new(input, config);
        let mut transpose = PvTranspose::new(&analyzer, 1.0f32);

        struct Loopback(SharedPvStream);
        impl PvSource for Loopback {
            fn pv_stream(&self) -> SharedPvStream {
                Rc::clone(&self.0)
            }
        }

        let own = transpose.pv_stream();
        assert_eq!(
            transpose.set_input(&Loopback(own)),
            Err(PvError::SelfInput)
        );
        assert!(transpose.set_input(&analyzer).is_ok());
    }
}

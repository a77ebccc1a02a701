#![forbid(unsafe_code)]
//! Real-time streaming phase-vocoder pipeline.
//!
//! `pvgraph` analyzes a block-driven audio stream into overlapping spectral
//! frames (magnitude + true frequency per bin), transforms those frames in
//! the spectral domain, and resynthesizes audio, all inside a fixed-size
//! host audio callback with no allocation on the audio path outside of
//! explicit parameter changes.
//!
//! Four node kinds compose into chains:
//!
//! - [`PvAnalyzer`]: time domain → spectral stream (windowed FFT, phase
//!   unwrapping, true-frequency estimation at each hop);
//! - transformers [`PvTranspose`], [`PvVerb`], [`PvGate`]: spectral stream →
//!   spectral stream of the same geometry;
//! - [`PvSynth`]: spectral stream → time domain (phase accumulation,
//!   inverse FFT, windowed overlap-add).
//!
//! Nodes communicate through shared frame buffers ([`PvStream`]) rather than
//! copies: the producer of a stream is its only writer, and the host drives
//! the graph in wiring order once per block, so consumers always read
//! frames published earlier in the same block. Downstream nodes recover the
//! hop timing by watching the stream's per-sample `count` schedule instead
//! of sharing ring indices.
//!
//! # Quick Start
//!
//! ```
//! use pvgraph::{shared_signal, Graph, PvAnalyzer, PvConfig, PvSynth, PvTranspose};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let config = PvConfig::new(44100, 64);
//! let input = shared_signal(config.block_size);
//!
//! // audio in -> analyzer -> transpose up an octave -> synth -> audio out
//! let analyzer = PvAnalyzer::new(Rc::clone(&input), config)
//!     .with_size(1024)
//!     .with_olaps(4);
//! let transpose = PvTranspose::new(&analyzer, 2.0f32);
//! let synth = PvSynth::new(&transpose, config);
//! let output = synth.output();
//!
//! let mut graph = Graph::new();
//! graph.add(Rc::new(RefCell::new(analyzer)));
//! graph.add(Rc::new(RefCell::new(transpose)));
//! graph.add(Rc::new(RefCell::new(synth)));
//!
//! // Host audio callback: fill the input block, tick, read the output.
//! for block in 0..8usize {
//!     {
//!         let mut data = input.borrow_mut();
//!         for (i, sample) in data.iter_mut().enumerate() {
//!             let t = (block * 64 + i) as f32 / 44100.0;
//!             *sample = (2.0 * std::f32::consts::PI * 440.0 * t).sin();
//!         }
//!     }
//!     graph.tick();
//!     assert_eq!(output.borrow().len(), 64);
//! }
//! ```

pub mod core;
pub mod error;
pub mod nodes;
pub mod stream;

pub use crate::core::types::{PvConfig, PvGeometry, Sample};
pub use crate::core::window::{generate_window, WindowType};
pub use crate::error::PvError;
pub use crate::nodes::{
    Graph, PvAnalyzer, PvGate, PvNode, PvSource, PvSynth, PvTranspose, PvVerb,
};
pub use crate::stream::{shared_signal, Param, PvStream, SharedPvStream, SharedSignal};

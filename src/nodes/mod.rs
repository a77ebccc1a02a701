//! Processing nodes and the block driver that runs them.
//!
//! Nodes compose into directed acyclic chains:
//! `audio in -> PvAnalyzer -> [transformer]* -> PvSynth -> audio out`.
//! The host ticks a [`Graph`] once per audio block; the graph calls each
//! playing node's `compute_next_data_frame` in wiring order, which is the
//! topological order required by the shared-stream protocol.

use std::cell::RefCell;
use std::rc::Rc;

use crate::stream::SharedPvStream;

pub mod analyzer;
pub mod gate;
pub mod synth;
pub mod transpose;
pub mod verb;

pub use analyzer::PvAnalyzer;
pub use gate::PvGate;
pub use synth::PvSynth;
pub use transpose::PvTranspose;
pub use verb::PvVerb;

/// Per-block processing entry point plus play/stop gating.
///
/// `compute_next_data_frame` must complete all writes to the node's output
/// channels before returning; the graph guarantees downstream nodes run
/// after it within the same block.
pub trait PvNode {
    /// Processes one audio block.
    fn compute_next_data_frame(&mut self);

    /// True when the node participates in graph ticks.
    fn is_playing(&self) -> bool;

    /// Enables or disables the node.
    fn set_playing(&mut self, playing: bool);

    /// Starts computing.
    fn play(&mut self) {
        self.set_playing(true);
    }

    /// Stops computing; output channels keep their last written block.
    fn stop(&mut self) {
        self.set_playing(false);
    }
}

/// Geometry and block size advertised by an upstream stream, falling back to
/// the default geometry when the producer has not configured it yet.
pub(crate) fn upstream_shape(stream: &SharedPvStream) -> (usize, usize, usize) {
    let stream = stream.borrow();
    let block_size = stream.counts().len();
    if stream.fft_size() == 0 {
        let geometry = crate::core::types::PvGeometry::default();
        (geometry.size(), geometry.olaps(), block_size)
    } else {
        (stream.fft_size(), stream.olaps(), block_size)
    }
}

/// A node that produces a spectral stream.
///
/// Holding a `SharedPvStream` handle is the capability a spectral consumer
/// needs; constructors take `&dyn PvSource`, so wiring a non-spectral node
/// into a transformer or synthesizer is a compile-time error rather than the
/// runtime type check a dynamic host would perform.
pub trait PvSource {
    /// The spectral stream this node writes.
    fn pv_stream(&self) -> SharedPvStream;
}

/// Ordered collection of nodes driven once per audio block.
///
/// Insertion order is execution order; callers add nodes in wiring order
/// (producers before consumers). Adding the same node twice is a no-op.
#[derive(Default)]
pub struct Graph {
    nodes: Vec<Rc<RefCell<dyn PvNode>>>,
}

impl Graph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Registers a node. Nodes already present are not added again.
    pub fn add(&mut self, node: Rc<RefCell<dyn PvNode>>) {
        if !self.nodes.iter().any(|n| Rc::ptr_eq(n, &node)) {
            self.nodes.push(node);
        }
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no nodes are registered.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Runs one audio block: every playing node, in insertion order.
    pub fn tick(&mut self) {
        for node in &self.nodes {
            let mut node = node.borrow_mut();
            if node.is_playing() {
                node.compute_next_data_frame();
            }
        }
    }
}

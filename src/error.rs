//! Error types for the pvgraph crate.

use std::fmt;

/// Errors surfaced on the host-facing control surface.
///
/// The audio path itself is infallible: geometry violations are rounded up
/// with a logged warning, upstream geometry drift is absorbed at block
/// boundaries, and allocation failure aborts the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PvError {
    /// A node was asked to read its own output stream as input.
    SelfInput,
}

impl fmt::Display for PvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PvError::SelfInput => {
                write!(f, "a spectral node cannot consume its own output stream")
            }
        }
    }
}

impl std::error::Error for PvError {}

//! Error types for the merge crate.

use rmosaic_geom::GeomError;
use thiserror::Error;

/// Errors that can occur while building an output grid or compositing inputs.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Transform, bounds or window geometry was invalid.
    #[error(transparent)]
    Geometry(#[from] GeomError),

    /// Inputs disagree on band count or reference system.
    #[error("Incompatible inputs: {0}")]
    IncompatibleInputs(String),

    /// An input could not be opened or read.
    #[error("Failed to read input {input}: {reason}")]
    InputReadFailure {
        /// Path or name of the input.
        input: String,
        /// Underlying failure.
        reason: String,
    },

    /// The writer rejected the merged raster.
    #[error("Failed to write output: {0}")]
    OutputWriteFailure(String),

    /// Merge was called without inputs.
    #[error("No input datasets to merge")]
    NoInputs,

    /// A resolution was zero, negative or not finite.
    #[error("Invalid resolution {0} (must be positive and finite)")]
    InvalidResolution(f64),

    /// A configuration option was rejected.
    #[error("Invalid option {key}: {reason}")]
    InvalidOption {
        /// Option name.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A band index was outside `1..=count`.
    #[error("Band {band} out of range (dataset has {count} bands)")]
    InvalidBand {
        /// Requested 1-based band index.
        band: usize,
        /// Number of bands available.
        count: usize,
    },

    /// Array data did not match the declared shape.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Expected `(bands, height, width)` or element count.
        expected: (usize, usize, usize),
        /// Actual shape.
        actual: (usize, usize, usize),
    },
}

impl MergeError {
    /// Wrap any failure while touching an input as [`MergeError::InputReadFailure`].
    pub(crate) fn read_failure(input: &str, err: MergeError) -> MergeError {
        match err {
            MergeError::InputReadFailure { .. } => err,
            other => MergeError::InputReadFailure {
                input: input.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

//! Resampling policies for placing input pixels on the output lattice.

use crate::{Env, MergeError, RasterArray, Result};
use std::fmt::Debug;

/// Chooses the value an output pixel takes from a block of input pixels.
pub trait Resampling: Debug + Send + Sync {
    /// Policy name as used by the `MERGE_RESAMPLING` option.
    fn name(&self) -> &'static str;

    /// Sample zero-based `band` of `source` at fractional `(row, col)`.
    ///
    /// `row` and `col` are measured from the top-left corner of `source`,
    /// so `(0.5, 0.5)` is the centre of its first pixel. Returns `None`
    /// when the point falls outside `source`.
    fn sample(&self, source: &RasterArray, band: usize, row: f64, col: f64) -> Option<f64>;
}

/// Takes the input pixel containing the sample point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Nearest;

impl Resampling for Nearest {
    fn name(&self) -> &'static str {
        "nearest"
    }

    fn sample(&self, source: &RasterArray, band: usize, row: f64, col: f64) -> Option<f64> {
        if !(row >= 0.0 && col >= 0.0) {
            return None;
        }
        source.get(band, row.floor() as usize, col.floor() as usize)
    }
}

/// Resolve a policy by name.
pub fn resampling_by_name(name: &str) -> Result<Box<dyn Resampling>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "nearest" => Ok(Box::new(Nearest)),
        other => Err(MergeError::InvalidOption {
            key: crate::env::MERGE_RESAMPLING.to_string(),
            reason: format!("unsupported resampling policy {other:?}"),
        }),
    }
}

/// The policy selected by `env`.
pub fn resampling_from_env(env: &Env) -> Result<Box<dyn Resampling>> {
    resampling_by_name(&env.resampling_name())
}

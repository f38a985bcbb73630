//! # rmosaic-merge
//!
//! Compositing of georeferenced rasters onto a single output grid.
//!
//! The crate is format-agnostic: inputs are anything implementing
//! [`Dataset`], and finished mosaics are handed to a [`DatasetWriter`].
//!
//! - [`GridBuilder`] - picks the output extent and pixel size
//! - [`MergeCompositor`] - paints inputs onto the grid, first-listed on top
//! - [`Env`] - explicit, scoped configuration passed into every operation
//! - [`RasterSource`] - resolves arrays and dataset bands for display
//!
//! ## Example
//!
//! ```
//! use rmosaic_geom::transform::from_origin;
//! use rmosaic_merge::{merge_datasets, DType, Dataset, Env, MemDataset, MergeOptions};
//!
//! let west = MemDataset::constant("west", from_origin(0.0, 10.0, 1.0, 1.0)?, 10, 10, DType::U8, None, 1.0);
//! let east = MemDataset::constant("east", from_origin(5.0, 10.0, 1.0, 1.0)?, 10, 10, DType::U8, None, 2.0);
//!
//! let merged = merge_datasets(&[&west, &east], &MergeOptions::default(), &Env::new())?;
//! assert_eq!((merged.grid.width, merged.grid.height), (15, 10));
//! // West is listed first, so it wins where the inputs overlap.
//! assert_eq!(merged.read_all()?.get(0, 0, 7), Some(1.0));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod compositor;
pub mod dataset;
pub mod env;
mod error;
mod grid;
pub mod resample;
pub mod source;

pub use compositor::{
    merge, merge_datasets, InputOutcome, MergeCompositor, MergeOptions, MergeReport, MergeState,
    MergedRaster, OutputBuffer,
};
pub use dataset::{
    ColorInterp, CreationOptions, Crs, DType, Dataset, DatasetInfo, DatasetMut, DatasetOpener,
    DatasetWriter, MemDataset, RasterArray,
};
pub use env::{ConfigValue, Env, EnvScope};
pub use error::MergeError;
pub use grid::{check_compatible, GridBuilder, Resolution};
pub use resample::{Nearest, Resampling};
pub use source::{histogram, Histogram, RasterSource, ResolvedSource};

/// Result type for merge operations.
pub type Result<T> = std::result::Result<T, MergeError>;

//! # rmosaic-tiff
//!
//! GeoTIFF reader and writer for rmosaic.
//!
//! This crate connects the format-agnostic merge core to files on disk:
//! - [`GeoTiffDataset`] / [`GeoTiffOpener`] - decode a GeoTIFF into a [`Dataset`](rmosaic_merge::Dataset)
//! - [`GeoTiffWriter`] - write a merged raster with its georeferencing
//!
//! Georeferencing is read from and written to the standard GeoTIFF tags
//! (ModelPixelScale, ModelTiepoint, ModelTransformation, GeoKeyDirectory)
//! plus GDAL's nodata tag.
//!
//! ## Example
//!
//! ```no_run
//! use rmosaic_merge::{merge, CreationOptions, Env, MergeOptions};
//! use rmosaic_tiff::{GeoTiffOpener, GeoTiffWriter};
//! use std::path::{Path, PathBuf};
//!
//! let inputs = vec![PathBuf::from("nw.tif"), PathBuf::from("se.tif")];
//! let report = merge(
//!     &inputs,
//!     Path::new("mosaic.tif"),
//!     &GeoTiffOpener,
//!     &GeoTiffWriter,
//!     &MergeOptions::default(),
//!     &CreationOptions::new(),
//!     &Env::new(),
//! )?;
//! println!("{} valid pixels", report.valid_pixels);
//! # Ok::<(), rmosaic_merge::MergeError>(())
//! ```

mod error;
pub mod geokeys;
mod reader;
mod writer;

pub use error::TiffIoError;
pub use reader::{GeoTiffDataset, GeoTiffOpener};
pub use writer::{storage_dtype, Compress, GeoTiffWriter, WriteOptions, COMPRESS};

/// Driver name of this format.
pub const DRIVER: &str = "GTiff";

/// Result type for GeoTIFF operations.
pub type Result<T> = std::result::Result<T, TiffIoError>;

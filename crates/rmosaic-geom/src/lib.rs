//! # rmosaic-geom
//!
//! Pixel/world geometry for georeferenced rasters.
//!
//! This crate provides the value types every other rmosaic crate builds on:
//! - [`AffineTransform`] - invertible six-coefficient map between pixel and world coordinates
//! - [`BoundingBox`] - world-coordinate extent `(left, bottom, right, top)`
//! - [`Window`] - fractional, possibly out-of-raster row/column region
//! - [`RasterGrid`] - a transform plus the width and height it addresses
//!
//! and the pure functions converting between them ([`from_bounds`],
//! [`window_transform`], [`window_bounds`]).
//!
//! ## Example
//!
//! ```
//! use rmosaic_geom::{guard_transform, from_bounds, window_bounds};
//!
//! // (a, b, c, d, e, f): 0.2 degree pixels, upper-left corner at (-114, 46)
//! let transform = guard_transform(&[0.2, 0.0, -114.0, 0.0, -0.2, 46.0])?;
//!
//! let window = from_bounds(-114.0, 45.6, -113.6, 46.0, &transform, 10, 10, false)?;
//! assert_eq!(window.height().round(), 2.0);
//!
//! let bounds = window_bounds(&window, &transform)?;
//! assert!((bounds.left + 114.0).abs() < 1e-9);
//! # Ok::<(), rmosaic_geom::GeomError>(())
//! ```

mod bounds;
mod error;
mod geometry;
pub mod transform;
pub mod window;

pub use bounds::BoundingBox;
pub use error::GeomError;
pub use geometry::{array_bounds, from_bounds, index, window_bounds, window_transform, RasterGrid, Rounding};
pub use transform::{guard_transform, AffineTransform};
pub use window::{get_data_window, is_nodata, Window, WindowSpec};

/// Result type for geometry operations.
pub type Result<T> = std::result::Result<T, GeomError>;

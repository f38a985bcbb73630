//! Output grid selection for a merge.

use crate::{DatasetInfo, MergeError, Result};
use rmosaic_geom::transform::from_origin;
use rmosaic_geom::{BoundingBox, RasterGrid};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tolerance for treating a fractional pixel count as whole.
const SIZE_EPSILON: f64 = 1e-6;

/// Output pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Resolution {
    /// Square pixels.
    Square(f64),
    /// Independent `(xres, yres)`.
    Rect(f64, f64),
}

impl Resolution {
    /// Build from one value (square) or two values (x then y).
    pub fn from_values(values: &[f64]) -> Result<Self> {
        let res = match values {
            [r] => Resolution::Square(*r),
            [x, y] => Resolution::Rect(*x, *y),
            _ => {
                return Err(MergeError::InvalidOption {
                    key: "res".to_string(),
                    reason: format!("expected 1 or 2 values, got {}", values.len()),
                })
            }
        };
        res.validate()
    }

    /// Reject zero, negative and non-finite pixel sizes.
    pub fn validate(self) -> Result<Self> {
        let (x, y) = self.xy();
        for v in [x, y] {
            if !(v.is_finite() && v > 0.0) {
                return Err(MergeError::InvalidResolution(v));
            }
        }
        Ok(self)
    }

    pub fn xy(self) -> (f64, f64) {
        match self {
            Resolution::Square(r) => (r, r),
            Resolution::Rect(x, y) => (x, y),
        }
    }
}

/// Number of pixels needed to cover `extent` at `res`, rounding up.
///
/// Counts within [`SIZE_EPSILON`] of a whole number are not rounded up, so
/// `3.0 / 0.2` yields 15 pixels rather than 16.
fn pixel_count(extent: f64, res: f64) -> usize {
    let n = extent / res;
    let nearest = n.round();
    if (n - nearest).abs() < SIZE_EPSILON {
        nearest.max(0.0) as usize
    } else {
        n.ceil().max(0.0) as usize
    }
}

/// Number of `f64` samples in a `(bands, height, width)` buffer.
///
/// Fails when the buffer could not be addressed on this platform.
pub fn buffer_len(bands: usize, height: usize, width: usize) -> Result<usize> {
    bands
        .checked_mul(height)
        .and_then(|n| n.checked_mul(width))
        .filter(|n| {
            n.checked_mul(std::mem::size_of::<f64>())
                .is_some_and(|bytes| bytes <= isize::MAX as usize)
        })
        .ok_or_else(|| {
            MergeError::Geometry(rmosaic_geom::GeomError::InvalidBounds(format!(
                "output of {bands} bands x {height} rows x {width} columns is too large"
            )))
        })
}

/// Fail unless every input has the same band count and reference system.
///
/// An input without a reference system is compatible with any other.
pub fn check_compatible(inputs: &[DatasetInfo]) -> Result<()> {
    let first = inputs.first().ok_or(MergeError::NoInputs)?;
    let mut crs = first.crs;
    for info in &inputs[1..] {
        if info.count != first.count {
            return Err(MergeError::IncompatibleInputs(format!(
                "{} has {} bands but {} has {}",
                info.name, info.count, first.name, first.count
            )));
        }
        match (crs, info.crs) {
            (Some(a), Some(b)) if a != b => {
                return Err(MergeError::IncompatibleInputs(format!(
                    "{} is in {b} but earlier inputs are in {a}",
                    info.name
                )));
            }
            (None, Some(b)) => crs = Some(b),
            _ => {}
        }
    }
    Ok(())
}

/// Derives the output grid every input is composited onto.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GridBuilder {
    bounds: Option<BoundingBox>,
    resolution: Option<Resolution>,
}

impl GridBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `bounds` instead of the union of input bounds.
    pub fn bounds(mut self, bounds: Option<BoundingBox>) -> Self {
        self.bounds = bounds;
        self
    }

    /// Use `resolution` instead of the finest input resolution.
    pub fn resolution(mut self, resolution: Option<Resolution>) -> Self {
        self.resolution = resolution;
        self
    }

    /// Compute the output grid for `inputs`.
    ///
    /// Without overrides the grid covers the union of input bounds at the
    /// finest pixel size found on each axis. Pixel `(0, 0)` has its upper
    /// left corner at `(left, top)` and rows run southwards.
    pub fn build(&self, inputs: &[DatasetInfo]) -> Result<RasterGrid> {
        check_compatible(inputs)?;

        let (xres, yres) = match self.resolution {
            Some(res) => res.validate()?.xy(),
            None => inputs.iter().fold((f64::INFINITY, f64::INFINITY), |acc, info| {
                (acc.0.min(info.res.0), acc.1.min(info.res.1))
            }),
        };
        Resolution::Rect(xres, yres).validate()?;

        let bounds = match self.bounds {
            Some(bounds) => {
                bounds.validate()?;
                bounds
            }
            None => inputs[1..]
                .iter()
                .fold(inputs[0].bounds, |acc, info| acc.union(&info.bounds)),
        };

        let width = pixel_count(bounds.width(), xres);
        let height = pixel_count(bounds.height(), yres);
        if width == 0 || height == 0 {
            return Err(MergeError::Geometry(rmosaic_geom::GeomError::InvalidBounds(
                format!(
                    "output bounds {:?} cover no pixels at resolution ({xres}, {yres})",
                    bounds.extent()
                ),
            )));
        }
        buffer_len(inputs[0].count, height, width)?;

        let transform = from_origin(bounds.left, bounds.top, xres, yres)?;
        debug!(
            width,
            height,
            xres,
            yres,
            left = bounds.left,
            top = bounds.top,
            "Built output grid"
        );
        Ok(RasterGrid::new(transform, width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DType, Dataset, MemDataset};
    use crate::Crs;
    use approx::assert_abs_diff_eq;

    fn info(left: f64, top: f64, res: f64, size: usize) -> DatasetInfo {
        let t = from_origin(left, top, res, res).unwrap();
        MemDataset::constant("in", t, size, size, DType::U8, None, 1.0)
            .info()
            .unwrap()
    }

    #[test]
    fn test_resolution_from_values() {
        assert_eq!(Resolution::from_values(&[0.5]).unwrap().xy(), (0.5, 0.5));
        assert_eq!(
            Resolution::from_values(&[0.5, 2.0]).unwrap(),
            Resolution::Rect(0.5, 2.0)
        );
        assert!(matches!(
            Resolution::from_values(&[0.0]),
            Err(MergeError::InvalidResolution(_))
        ));
        assert!(Resolution::from_values(&[f64::NAN, 1.0]).is_err());
        assert!(Resolution::from_values(&[]).is_err());
        assert!(Resolution::from_values(&[1.0, 1.0, 1.0]).is_err());
    }

    #[test]
    fn test_pixel_count_snaps() {
        assert_eq!(pixel_count(3.0, 0.2), 15);
        assert_eq!(pixel_count(10.0, 3.0), 4);
        assert_eq!(pixel_count(0.0, 1.0), 0);
    }

    #[test]
    fn test_finest_resolution_and_union_extent() {
        let a = info(0.0, 10.0, 1.0, 10);
        let b = info(5.0, 15.0, 0.5, 20);
        let grid = GridBuilder::new().build(&[a, b]).unwrap();
        assert_eq!(grid.res(), (0.5, 0.5));
        let bounds = grid.bounds().unwrap();
        assert_abs_diff_eq!(bounds.left, 0.0);
        assert_abs_diff_eq!(bounds.bottom, 0.0);
        assert_abs_diff_eq!(bounds.right, 15.0);
        assert_abs_diff_eq!(bounds.top, 15.0);
        assert_eq!((grid.width, grid.height), (30, 30));
    }

    #[test]
    fn test_overrides() {
        let a = info(0.0, 10.0, 1.0, 10);
        let grid = GridBuilder::new()
            .bounds(Some(BoundingBox::new(2.0, 2.0, 6.0, 4.0).unwrap()))
            .resolution(Some(Resolution::Rect(2.0, 1.0)))
            .build(&[a])
            .unwrap();
        assert_eq!((grid.width, grid.height), (2, 2));
        assert_eq!(grid.transform.c(), 2.0);
        assert_eq!(grid.transform.f(), 4.0);
        assert_eq!(grid.transform.e(), -1.0);
    }

    #[test]
    fn test_incompatible_band_count() {
        let a = info(0.0, 10.0, 1.0, 10);
        let t = from_origin(0.0, 10.0, 1.0, 1.0).unwrap();
        let b = MemDataset::new(
            "rgb",
            t,
            DType::U8,
            None,
            crate::RasterArray::filled(3, 10, 10, 0.0),
        )
        .info()
        .unwrap();
        assert!(matches!(
            GridBuilder::new().build(&[a, b]),
            Err(MergeError::IncompatibleInputs(_))
        ));
    }

    #[test]
    fn test_crs_compatibility() {
        let t = from_origin(0.0, 10.0, 1.0, 1.0).unwrap();
        let ds = |crs: Option<Crs>| {
            let d = MemDataset::constant("c", t, 10, 10, DType::U8, None, 0.0);
            match crs {
                Some(c) => d.with_crs(c).info().unwrap(),
                None => d.info().unwrap(),
            }
        };
        assert!(check_compatible(&[ds(Some(Crs(4326))), ds(None)]).is_ok());
        assert!(check_compatible(&[ds(None), ds(Some(Crs(4326))), ds(Some(Crs(3857)))]).is_err());
        assert!(matches!(check_compatible(&[]), Err(MergeError::NoInputs)));
    }

    #[test]
    fn test_oversized_grid_rejected() {
        let a = info(0.0, 10.0, 1.0, 10);
        let result = GridBuilder::new()
            .resolution(Some(Resolution::Square(1e-9)))
            .build(&[a]);
        assert!(matches!(result, Err(MergeError::Geometry(_))));

        assert_eq!(buffer_len(3, 4, 5).unwrap(), 60);
        assert!(buffer_len(2, usize::MAX, 2).is_err());
        assert!(buffer_len(1, 1 << 40, 1 << 40).is_err());
    }

    #[test]
    fn test_zero_area_bounds_rejected() {
        let a = info(0.0, 10.0, 1.0, 10);
        let result = GridBuilder::new()
            .bounds(Some(BoundingBox::new(1.0, 1.0, 1.0, 5.0).unwrap()))
            .build(&[a]);
        assert!(matches!(result, Err(MergeError::Geometry(_))));
    }
}

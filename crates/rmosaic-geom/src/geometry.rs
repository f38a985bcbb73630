//! Conversions between world bounding boxes and pixel windows.

use crate::{AffineTransform, BoundingBox, GeomError, Result, Window};

/// Rounding applied when turning a world point into a pixel index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Floor,
    Ceil,
}

impl Rounding {
    fn apply(self, value: f64) -> f64 {
        match self {
            Rounding::Floor => value.floor(),
            Rounding::Ceil => value.ceil(),
        }
    }
}

/// Pixel indices are computed with a 1e-6 nudge away from the rounding
/// direction so points sitting on a pixel edge land consistently.
const INDEX_EPSILON: f64 = 1e-6;

/// The window of a `height` x `width` grid covered by a world bounding box.
///
/// All four corners of the box are mapped through the inverse transform, so
/// the result is correct for any axis orientation. With `boundless` unset
/// the window is clipped to the grid; a box entirely outside the grid gives
/// an empty window rather than an error.
#[allow(clippy::too_many_arguments)]
pub fn from_bounds(
    left: f64,
    bottom: f64,
    right: f64,
    top: f64,
    transform: &AffineTransform,
    height: usize,
    width: usize,
    boundless: bool,
) -> Result<Window> {
    let bounds = BoundingBox {
        left,
        bottom,
        right,
        top,
    };
    bounds.validate()?;

    let inverse = transform.invert()?;
    let mut rows = [0.0; 4];
    let mut cols = [0.0; 4];
    for (i, (x, y)) in bounds.corners().into_iter().enumerate() {
        let (col, row) = inverse.forward(x, y);
        cols[i] = col;
        rows[i] = row;
    }

    let window = Window::new(
        rows.iter().copied().fold(f64::INFINITY, f64::min),
        rows.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        cols.iter().copied().fold(f64::INFINITY, f64::min),
        cols.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    )
    .map_err(|e| GeomError::InvalidBounds(e.to_string()))?;

    if boundless {
        Ok(window)
    } else {
        Ok(window.crop(height, width))
    }
}

/// Transform of the sub-grid addressed by `window`.
///
/// Pixel `(0, 0)` of data read under `window` maps to the same world point
/// as pixel `(row_start, col_start)` of the parent grid.
pub fn window_transform(window: &Window, transform: &AffineTransform) -> AffineTransform {
    transform.compose(window.col_start(), window.row_start())
}

/// World bounding box of `window`.
pub fn window_bounds(window: &Window, transform: &AffineTransform) -> Result<BoundingBox> {
    BoundingBox::from_points([
        transform.forward(window.col_start(), window.row_start()),
        transform.forward(window.col_stop(), window.row_start()),
        transform.forward(window.col_start(), window.row_stop()),
        transform.forward(window.col_stop(), window.row_stop()),
    ])
}

/// World bounding box of a whole `height` x `width` array.
pub fn array_bounds(height: usize, width: usize, transform: &AffineTransform) -> Result<BoundingBox> {
    window_bounds(&Window::full(height, width), transform)
}

/// `(row, col)` of the pixel containing the world point `(x, y)`.
pub fn index(transform: &AffineTransform, x: f64, y: f64, op: Rounding) -> Result<(i64, i64)> {
    if !x.is_finite() || !y.is_finite() {
        return Err(GeomError::InvalidBounds(format!(
            "non-finite point ({x}, {y})"
        )));
    }
    let eps = match op {
        Rounding::Floor => INDEX_EPSILON,
        Rounding::Ceil => -INDEX_EPSILON,
    };
    let (col, row) = transform.inverse(x + eps, y - eps)?;
    Ok((op.apply(row) as i64, op.apply(col) as i64))
}

/// A transform plus the pixel dimensions it addresses.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RasterGrid {
    pub transform: AffineTransform,
    pub width: usize,
    pub height: usize,
}

impl RasterGrid {
    pub fn new(transform: AffineTransform, width: usize, height: usize) -> Self {
        Self {
            transform,
            width,
            height,
        }
    }

    /// World bounds of the whole grid.
    pub fn bounds(&self) -> Result<BoundingBox> {
        array_bounds(self.height, self.width, &self.transform)
    }

    /// Pixel size `(xres, yres)`.
    pub fn res(&self) -> (f64, f64) {
        self.transform.res()
    }

    /// Window of this grid covered by `bounds`.
    pub fn window(&self, bounds: &BoundingBox, boundless: bool) -> Result<Window> {
        from_bounds(
            bounds.left,
            bounds.bottom,
            bounds.right,
            bounds.top,
            &self.transform,
            self.height,
            self.width,
            boundless,
        )
    }

    /// Number of pixels in one band.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

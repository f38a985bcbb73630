//! Affine transforms between pixel and world coordinates.
//!
//! A transform holds the six coefficients `(a, b, c, d, e, f)` of
//!
//! ```text
//! | x |   | a  b  c | | col |
//! | y | = | d  e  f | | row |
//! | 1 |   | 0  0  1 | |  1  |
//! ```
//!
//! where `(c, f)` is the world position of the upper-left corner of pixel
//! `(0, 0)`. A north-up raster has `b == d == 0` and `e < 0`.

use crate::{GeomError, Result};
use std::ops::Mul;

/// Immutable, invertible 2D affine transform.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AffineTransform {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

/// True when the linear part is singular to within floating point precision.
fn is_degenerate(a: f64, b: f64, d: f64, e: f64) -> bool {
    let det = a * e - b * d;
    let scale = (a * e).abs() + (b * d).abs();
    !det.is_finite() || det == 0.0 || det.abs() <= f64::EPSILON * scale
}

/// Return true if `seq` matches the GDAL geotransform pattern
/// `(c, a, b, f, d, e)` of a north-up raster.
fn tastes_like_gdal(seq: &[f64]) -> bool {
    seq[2] == 0.0 && seq[4] == 0.0 && seq[1] > 0.0 && seq[5] < 0.0
}

/// Validate a transform-like coefficient sequence.
///
/// The sequence must hold exactly six finite coefficients in
/// `(a, b, c, d, e, f)` order. GDAL-ordered geotransforms are rejected
/// rather than reordered; use [`AffineTransform::from_gdal`] to convert
/// them explicitly.
pub fn guard_transform(coefficients: &[f64]) -> Result<AffineTransform> {
    if coefficients.len() != 6 {
        return Err(GeomError::InvalidTransform(format!(
            "expected 6 coefficients, got {}",
            coefficients.len()
        )));
    }
    if coefficients.iter().any(|v| !v.is_finite()) {
        return Err(GeomError::InvalidTransform(format!(
            "non-finite coefficient in {:?}",
            coefficients
        )));
    }
    if tastes_like_gdal(coefficients) {
        return Err(GeomError::InvalidTransform(format!(
            "{:?} looks like a GDAL geotransform (c, a, b, f, d, e); \
             pass coefficients in (a, b, c, d, e, f) order",
            coefficients
        )));
    }
    AffineTransform::new(
        coefficients[0],
        coefficients[1],
        coefficients[2],
        coefficients[3],
        coefficients[4],
        coefficients[5],
    )
}

impl AffineTransform {
    /// Create a transform from coefficients in `(a, b, c, d, e, f)` order.
    ///
    /// Fails with [`GeomError::SingularTransform`] if the linear part has
    /// no inverse.
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Result<Self> {
        if ![a, b, c, d, e, f].iter().all(|v| v.is_finite()) {
            return Err(GeomError::InvalidTransform(format!(
                "non-finite coefficient in ({a}, {b}, {c}, {d}, {e}, {f})"
            )));
        }
        if is_degenerate(a, b, d, e) {
            return Err(GeomError::SingularTransform {
                determinant: a * e - b * d,
            });
        }
        Ok(Self { a, b, c, d, e, f })
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 0.0,
            e: 1.0,
            f: 0.0,
        }
    }

    /// A pure translation.
    pub fn translation(x: f64, y: f64) -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: x,
            d: 0.0,
            e: 1.0,
            f: y,
        }
    }

    /// A pure scale. Zero factors are rejected.
    pub fn scale(sx: f64, sy: f64) -> Result<Self> {
        Self::new(sx, 0.0, 0.0, 0.0, sy, 0.0)
    }

    /// Build a transform from a GDAL geotransform `(c, a, b, f, d, e)`.
    pub fn from_gdal(c: f64, a: f64, b: f64, f: f64, d: f64, e: f64) -> Result<Self> {
        Self::new(a, b, c, d, e, f)
    }

    /// Coefficients in GDAL geotransform order `(c, a, b, f, d, e)`.
    pub fn to_gdal(&self) -> [f64; 6] {
        [self.c, self.a, self.b, self.f, self.d, self.e]
    }

    /// Coefficients in `(a, b, c, d, e, f)` order.
    pub fn to_array(&self) -> [f64; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }

    pub fn a(&self) -> f64 {
        self.a
    }

    pub fn b(&self) -> f64 {
        self.b
    }

    /// World x of the grid origin.
    pub fn c(&self) -> f64 {
        self.c
    }

    pub fn d(&self) -> f64 {
        self.d
    }

    pub fn e(&self) -> f64 {
        self.e
    }

    /// World y of the grid origin.
    pub fn f(&self) -> f64 {
        self.f
    }

    /// Determinant of the linear part.
    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    /// True when rows and columns are aligned with the world axes.
    pub fn is_rectilinear(&self) -> bool {
        self.b == 0.0 && self.d == 0.0
    }

    /// Pixel size `(xres, yres)` as positive world distances.
    pub fn res(&self) -> (f64, f64) {
        (self.a.hypot(self.d), self.b.hypot(self.e))
    }

    /// Map pixel coordinates to world coordinates.
    pub fn forward(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    /// Map world coordinates to fractional pixel coordinates `(col, row)`.
    pub fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let inv = self.invert()?;
        Ok(inv.forward(x, y))
    }

    /// The inverse transform, mapping world to pixel coordinates.
    pub fn invert(&self) -> Result<Self> {
        if is_degenerate(self.a, self.b, self.d, self.e) {
            return Err(GeomError::SingularTransform {
                determinant: self.determinant(),
            });
        }
        let det = self.determinant();
        let ia = self.e / det;
        let ib = -self.b / det;
        let id = -self.d / det;
        let ie = self.a / det;
        Ok(Self {
            a: ia,
            b: ib,
            c: -self.c * ia - self.f * ib,
            d: id,
            e: ie,
            f: -self.c * id - self.f * ie,
        })
    }

    /// Transform of a sub-grid whose origin sits at pixel
    /// `(translate_col, translate_row)` of this grid.
    pub fn compose(&self, translate_col: f64, translate_row: f64) -> Self {
        *self * Self::translation(translate_col, translate_row)
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl TryFrom<&[f64]> for AffineTransform {
    type Error = GeomError;

    fn try_from(value: &[f64]) -> Result<Self> {
        guard_transform(value)
    }
}

impl TryFrom<[f64; 6]> for AffineTransform {
    type Error = GeomError;

    fn try_from(value: [f64; 6]) -> Result<Self> {
        guard_transform(&value)
    }
}

/// `lhs * rhs` applies `rhs` first, then `lhs`.
impl Mul for AffineTransform {
    type Output = AffineTransform;

    fn mul(self, rhs: AffineTransform) -> AffineTransform {
        AffineTransform {
            a: self.a * rhs.a + self.b * rhs.d,
            b: self.a * rhs.b + self.b * rhs.e,
            c: self.a * rhs.c + self.b * rhs.f + self.c,
            d: self.d * rhs.a + self.e * rhs.d,
            e: self.d * rhs.b + self.e * rhs.e,
            f: self.d * rhs.c + self.e * rhs.f + self.f,
        }
    }
}

/// North-up transform from the upper-left corner and pixel sizes.
pub fn from_origin(west: f64, north: f64, xsize: f64, ysize: f64) -> Result<AffineTransform> {
    Ok(AffineTransform::translation(west, north) * AffineTransform::scale(xsize, -ysize)?)
}

/// Transform that fits the box `(west, south, east, north)` onto a
/// `width` x `height` pixel grid.
pub fn from_bounds(
    west: f64,
    south: f64,
    east: f64,
    north: f64,
    width: usize,
    height: usize,
) -> Result<AffineTransform> {
    if width == 0 || height == 0 {
        return Err(GeomError::InvalidTransform(format!(
            "cannot fit bounds onto a {width}x{height} grid"
        )));
    }
    Ok(AffineTransform::translation(west, north)
        * AffineTransform::scale(
            (east - west) / width as f64,
            (south - north) / height as f64,
        )?)
}

//! Row/column windows.
//!
//! A window is the half-open region `[row_start, row_stop) x [col_start, col_stop)`
//! of a pixel grid. Bounds stay real-valued until explicitly rounded, and a
//! window may lie partly or wholly outside the grid it is defined against.

use crate::{GeomError, Result};
use std::ops::Range;

/// Tolerance used when snapping nearly-integral window edges.
const SNAP_EPSILON: f64 = 1e-6;

/// Slice-style window specification: `((row_start, row_stop), (col_start, col_stop))`.
///
/// `None` means "from the beginning" for starts and "to the end" for stops;
/// negative values count back from the end.
pub type WindowSpec = ((Option<i64>, Option<i64>), (Option<i64>, Option<i64>));

/// Rectangular region of a pixel grid.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Window {
    row_start: f64,
    row_stop: f64,
    col_start: f64,
    col_stop: f64,
}

impl Window {
    /// Create a window, rejecting non-finite or inverted ranges.
    pub fn new(row_start: f64, row_stop: f64, col_start: f64, col_stop: f64) -> Result<Self> {
        if ![row_start, row_stop, col_start, col_stop]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(GeomError::InvalidWindow(format!(
                "non-finite bound in (({row_start}, {row_stop}), ({col_start}, {col_stop}))"
            )));
        }
        if row_stop < row_start || col_stop < col_start {
            return Err(GeomError::InvalidWindow(format!(
                "inverted range in (({row_start}, {row_stop}), ({col_start}, {col_stop}))"
            )));
        }
        Ok(Self {
            row_start,
            row_stop,
            col_start,
            col_stop,
        })
    }

    /// Window covering a whole `height` x `width` grid.
    pub fn full(height: usize, width: usize) -> Self {
        Self {
            row_start: 0.0,
            row_stop: height as f64,
            col_start: 0.0,
            col_stop: width as f64,
        }
    }

    /// Build from the `((row_start, row_stop), (col_start, col_stop))` encoding.
    pub fn from_slices(slices: ((f64, f64), (f64, f64))) -> Result<Self> {
        let ((row_start, row_stop), (col_start, col_stop)) = slices;
        Self::new(row_start, row_stop, col_start, col_stop)
    }

    /// The `((row_start, row_stop), (col_start, col_stop))` encoding.
    pub fn to_slices(&self) -> ((f64, f64), (f64, f64)) {
        (
            (self.row_start, self.row_stop),
            (self.col_start, self.col_stop),
        )
    }

    pub fn row_start(&self) -> f64 {
        self.row_start
    }

    pub fn row_stop(&self) -> f64 {
        self.row_stop
    }

    pub fn col_start(&self) -> f64 {
        self.col_start
    }

    pub fn col_stop(&self) -> f64 {
        self.col_stop
    }

    pub fn height(&self) -> f64 {
        self.row_stop - self.row_start
    }

    pub fn width(&self) -> f64 {
        self.col_stop - self.col_start
    }

    /// True when the window covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.height() <= 0.0 || self.width() <= 0.0
    }

    /// True when the window lies within a `height` x `width` grid.
    pub fn is_within(&self, height: usize, width: usize) -> bool {
        self.row_start >= 0.0
            && self.col_start >= 0.0
            && self.row_stop <= height as f64
            && self.col_stop <= width as f64
    }

    /// Shift the window by whole or fractional pixels.
    pub fn translate(&self, drow: f64, dcol: f64) -> Self {
        Self {
            row_start: self.row_start + drow,
            row_stop: self.row_stop + drow,
            col_start: self.col_start + dcol,
            col_stop: self.col_stop + dcol,
        }
    }

    /// Clip the window to `[0, height] x [0, width]`.
    ///
    /// A window wholly outside the grid becomes an empty window on the
    /// nearest edge.
    pub fn crop(&self, height: usize, width: usize) -> Self {
        let h = height as f64;
        let w = width as f64;
        Self {
            row_start: self.row_start.max(0.0).min(h),
            row_stop: self.row_stop.min(h).max(0.0),
            col_start: self.col_start.max(0.0).min(w),
            col_stop: self.col_stop.min(w).max(0.0),
        }
    }

    /// Smallest pixel-aligned window containing this one.
    ///
    /// Edges within [`SNAP_EPSILON`] of an integer snap to it first so that
    /// floating point noise does not add a sliver row or column.
    pub fn round_outward(&self) -> Self {
        Self {
            row_start: snap(self.row_start).floor(),
            row_stop: snap(self.row_stop).ceil(),
            col_start: snap(self.col_start).floor(),
            col_stop: snap(self.col_stop).ceil(),
        }
    }

    /// Round every edge to the nearest integer.
    pub fn round_nearest(&self) -> Self {
        Self {
            row_start: self.row_start.round(),
            row_stop: self.row_stop.round(),
            col_start: self.col_start.round(),
            col_stop: self.col_stop.round(),
        }
    }

    /// Integer row and column ranges for indexing into an array.
    ///
    /// The window is rounded to the nearest integer edges; negative edges
    /// are rejected.
    pub fn to_pixel_ranges(&self) -> Result<(Range<usize>, Range<usize>)> {
        let rounded = self.round_nearest();
        if rounded.row_start < 0.0 || rounded.col_start < 0.0 {
            return Err(GeomError::InvalidWindow(format!(
                "negative offset in {:?}",
                self.to_slices()
            )));
        }
        Ok((
            rounded.row_start as usize..rounded.row_stop as usize,
            rounded.col_start as usize..rounded.col_stop as usize,
        ))
    }
}

fn snap(value: f64) -> f64 {
    let nearest = value.round();
    if (value - nearest).abs() < SNAP_EPSILON {
        nearest
    } else {
        value
    }
}

/// Outermost extent covered by `windows`.
pub fn union(windows: &[Window]) -> Result<Window> {
    let (first, rest) = windows
        .split_first()
        .ok_or_else(|| GeomError::InvalidWindow("union of zero windows".to_string()))?;
    Ok(rest.iter().fold(*first, |acc, w| Window {
        row_start: acc.row_start.min(w.row_start),
        row_stop: acc.row_stop.max(w.row_stop),
        col_start: acc.col_start.min(w.col_start),
        col_stop: acc.col_stop.max(w.col_stop),
    }))
}

/// Innermost extent shared by all `windows`.
///
/// Fails with [`GeomError::DisjointWindows`] when they share no area.
pub fn intersection(windows: &[Window]) -> Result<Window> {
    let (first, rest) = windows
        .split_first()
        .ok_or_else(|| GeomError::InvalidWindow("intersection of zero windows".to_string()))?;
    let shared = rest.iter().fold(*first, |acc, w| Window {
        row_start: acc.row_start.max(w.row_start),
        row_stop: acc.row_stop.min(w.row_stop),
        col_start: acc.col_start.max(w.col_start),
        col_stop: acc.col_stop.min(w.col_stop),
    });
    if shared.row_start < shared.row_stop && shared.col_start < shared.col_stop {
        Ok(shared)
    } else {
        Err(GeomError::DisjointWindows)
    }
}

/// True if all `windows` share some area.
pub fn intersect(windows: &[Window]) -> bool {
    intersection(windows).is_ok()
}

fn eval_axis(start: Option<i64>, stop: Option<i64>, len: i64, axis: &str) -> Result<(i64, i64)> {
    let resolve = |index: i64| -> Result<i64> {
        if index < 0 {
            if len < 0 {
                return Err(GeomError::InvalidWindow(format!("invalid {axis} size: {len}")));
            }
            Ok(index + len)
        } else {
            Ok(index)
        }
    };
    let start = resolve(start.unwrap_or(0))?;
    let stop = match stop {
        Some(stop) => resolve(stop)?,
        None if len >= 0 => len,
        None => return Err(GeomError::InvalidWindow(format!("invalid {axis} size: {len}"))),
    };
    if stop < start {
        return Err(GeomError::InvalidWindow(format!(
            "{axis} range ({start}, {stop}) is inverted"
        )));
    }
    Ok((start, stop))
}

/// Resolve a slice-style window specification against a grid size.
///
/// Pass a negative `height`/`width` when the size is unknown; the spec
/// must then not depend on it.
pub fn eval_window(spec: WindowSpec, height: i64, width: i64) -> Result<Window> {
    let ((row_start, row_stop), (col_start, col_stop)) = spec;
    let (r0, r1) = eval_axis(row_start, row_stop, height, "row")?;
    let (c0, c1) = eval_axis(col_start, col_stop, width, "col")?;
    Window::new(r0 as f64, r1 as f64, c0 as f64, c1 as f64)
}

/// `(rows, cols)` shape of a slice-style window specification.
pub fn window_shape(spec: WindowSpec, height: i64, width: i64) -> Result<(usize, usize)> {
    let window = eval_window(spec, height, width)?;
    Ok((window.height() as usize, window.width() as usize))
}

/// True if `value` is the nodata sentinel (NaN matches NaN).
pub fn is_nodata(value: f64, nodata: f64) -> bool {
    value == nodata || (value.is_nan() && nodata.is_nan())
}

/// Smallest window enclosing every valid pixel of a `(bands, height, width)` array.
///
/// Returns the full window when `nodata` is `None`, and an empty window at
/// the origin when every pixel is nodata.
pub fn get_data_window(
    data: &[f64],
    shape: (usize, usize, usize),
    nodata: Option<f64>,
) -> Result<Window> {
    let (bands, height, width) = shape;
    if data.len() != bands * height * width {
        return Err(GeomError::InvalidWindow(format!(
            "array of {} values does not have shape {:?}",
            data.len(),
            shape
        )));
    }
    let Some(nodata) = nodata else {
        return Ok(Window::full(height, width));
    };

    let mut rows: Option<(usize, usize)> = None;
    let mut cols: Option<(usize, usize)> = None;
    for row in 0..height {
        for col in 0..width {
            let valid = (0..bands)
                .any(|b| !is_nodata(data[(b * height + row) * width + col], nodata));
            if valid {
                rows = Some(rows.map_or((row, row), |(lo, hi)| (lo.min(row), hi.max(row))));
                cols = Some(cols.map_or((col, col), |(lo, hi)| (lo.min(col), hi.max(col))));
            }
        }
    }

    match (rows, cols) {
        (Some((r0, r1)), Some((c0, c1))) => {
            Window::new(r0 as f64, (r1 + 1) as f64, c0 as f64, (c1 + 1) as f64)
        }
        _ => Ok(Window::full(0, 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(r0: f64, r1: f64, c0: f64, c1: f64) -> Window {
        Window::new(r0, r1, c0, c1).unwrap()
    }

    #[test]
    fn test_new_rejects_inverted() {
        assert!(matches!(
            Window::new(5.0, 1.0, 0.0, 1.0),
            Err(GeomError::InvalidWindow(_))
        ));
        assert!(Window::new(1.0, 1.0, 0.0, 0.0).unwrap().is_empty());
        assert!(Window::new(f64::NAN, 1.0, 0.0, 1.0).is_err());
        assert!(Window::new(0.0, f64::INFINITY, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_accessors() {
        let window = w(1.5, 4.0, -2.0, 3.0);
        assert_eq!(
            (window.row_start(), window.row_stop(), window.col_start(), window.col_stop()),
            (1.5, 4.0, -2.0, 3.0)
        );
        assert_eq!(window.to_slices(), ((1.5, 4.0), (-2.0, 3.0)));
    }

    #[test]
    fn test_union() {
        let u = union(&[w(0.0, 2.0, 0.0, 2.0), w(5.0, 8.0, -1.0, 1.0)]).unwrap();
        assert_eq!(u, w(0.0, 8.0, -1.0, 2.0));
        assert!(union(&[]).is_err());
    }

    #[test]
    fn test_intersection() {
        let i = intersection(&[w(0.0, 5.0, 0.0, 5.0), w(2.0, 8.0, 3.0, 9.0)]).unwrap();
        assert_eq!(i, w(2.0, 5.0, 3.0, 5.0));

        let disjoint = [w(0.0, 2.0, 0.0, 2.0), w(2.0, 4.0, 0.0, 2.0)];
        assert_eq!(intersection(&disjoint), Err(GeomError::DisjointWindows));
        assert!(!intersect(&disjoint));
        assert!(intersect(&[w(0.0, 2.0, 0.0, 2.0), w(1.0, 3.0, 1.0, 3.0)]));
    }

    #[test]
    fn test_crop() {
        assert_eq!(w(-2.0, 5.0, 3.0, 20.0).crop(10, 10), w(0.0, 5.0, 3.0, 10.0));
        // Wholly outside collapses to an empty window.
        let outside = w(15.0, 20.0, 0.0, 5.0).crop(10, 10);
        assert!(outside.is_empty());
        assert_eq!(outside.row_start, 10.0);
        assert_eq!(outside.row_stop, 10.0);
    }

    #[test]
    fn test_round_outward_snaps_noise() {
        let r = w(0.9999999999, 2.2, -0.5, 3.0000000001).round_outward();
        assert_eq!(r, w(1.0, 3.0, -1.0, 3.0));
    }

    #[test]
    fn test_to_pixel_ranges() {
        let (rows, cols) = w(1.0, 4.0, 2.0, 3.0).to_pixel_ranges().unwrap();
        assert_eq!(rows, 1..4);
        assert_eq!(cols, 2..3);
        assert!(w(-1.0, 4.0, 2.0, 3.0).to_pixel_ranges().is_err());
    }

    #[test]
    fn test_eval_window() {
        assert_eq!(
            eval_window(((Some(2), Some(4)), (Some(2), Some(4))), 10, 10).unwrap(),
            w(2.0, 4.0, 2.0, 4.0)
        );
        assert_eq!(
            eval_window(((Some(-10), None), (Some(-10), None)), 100, 90).unwrap(),
            w(90.0, 100.0, 80.0, 90.0)
        );
        assert_eq!(
            eval_window(((None, Some(-10)), (None, Some(-10))), 100, 90).unwrap(),
            w(0.0, 90.0, 0.0, 80.0)
        );
    }

    #[test]
    fn test_eval_window_invalid() {
        assert!(eval_window(((Some(-1), Some(10)), (Some(0), Some(10))), -1, 10).is_err());
        assert!(eval_window(((Some(0), Some(10)), (Some(1), Some(-1))), 10, -1).is_err());
        assert!(eval_window(((Some(10), Some(5)), (Some(0), Some(5))), 10, 10).is_err());
    }

    #[test]
    fn test_window_shape() {
        assert_eq!(
            window_shape(((None, Some(4)), (None, Some(102))), -1, -1).unwrap(),
            (4, 102)
        );
        assert_eq!(
            window_shape(((Some(10), None), (Some(10), None)), 100, 90).unwrap(),
            (90, 80)
        );
        assert!(window_shape(((Some(10), Some(20)), (Some(10), None)), -1, -1).is_err());
    }

    #[test]
    fn test_get_data_window() {
        #[rustfmt::skip]
        let data = vec![
            0.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 2.0, 0.0,
        ];
        let window = get_data_window(&data, (1, 3, 4), Some(0.0)).unwrap();
        assert_eq!(window, w(1.0, 3.0, 1.0, 3.0));

        let full = get_data_window(&data, (1, 3, 4), None).unwrap();
        assert_eq!(full, Window::full(3, 4));

        let empty = get_data_window(&[0.0; 4], (1, 2, 2), Some(0.0)).unwrap();
        assert!(empty.is_empty());

        assert!(get_data_window(&data, (2, 3, 4), Some(0.0)).is_err());
    }

    #[test]
    fn test_is_nodata_nan() {
        assert!(is_nodata(f64::NAN, f64::NAN));
        assert!(is_nodata(0.0, 0.0));
        assert!(!is_nodata(1.0, f64::NAN));
    }
}

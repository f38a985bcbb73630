//! Display sources: arrays and dataset bands resolved to pixels plus extent.

use crate::{ColorInterp, Dataset, MergeError, RasterArray, Result};
use rmosaic_geom::is_nodata;
use serde::Serialize;
use tracing::debug;

/// Something that can be shown or summarised as pixels.
#[derive(Clone, Copy)]
pub enum RasterSource<'a> {
    /// A bare array with no georeferencing.
    RawArray(&'a RasterArray),
    /// One 1-based band of a dataset.
    DatasetBandIndex(&'a dyn Dataset, usize),
    /// A whole dataset: its single band, or its red/green/blue bands.
    SingleBandDataset(&'a dyn Dataset),
}

/// Pixels selected from a [`RasterSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    /// Selected bands, raster order.
    pub array: RasterArray,
    /// 1-based band numbers making up `array`, or empty for raw arrays.
    pub bands: Vec<usize>,
    /// Nodata of the originating dataset.
    pub nodata: Option<f64>,
    /// `(left, right, bottom, top)` for datasets.
    pub extent: Option<(f64, f64, f64, f64)>,
}

impl<'a> RasterSource<'a> {
    /// Read the pixels this source refers to.
    pub fn resolve(&self) -> Result<ResolvedSource> {
        match *self {
            RasterSource::RawArray(array) => Ok(ResolvedSource {
                array: array.clone(),
                bands: Vec::new(),
                nodata: None,
                extent: None,
            }),
            RasterSource::DatasetBandIndex(dataset, band) => {
                resolve_bands(dataset, vec![band])
            }
            RasterSource::SingleBandDataset(dataset) => {
                let bands = if dataset.count() == 1 {
                    vec![1]
                } else {
                    // Without a full red/green/blue interpretation only
                    // the first band is shown.
                    match rgb_bands(dataset) {
                        Some(rgb) => rgb.to_vec(),
                        None => {
                            debug!(
                                dataset = dataset.name(),
                                "No RGB colour interpretation, using band 1"
                            );
                            vec![1]
                        }
                    }
                };
                resolve_bands(dataset, bands)
            }
        }
    }
}

fn resolve_bands(dataset: &dyn Dataset, bands: Vec<usize>) -> Result<ResolvedSource> {
    let array = dataset.read_all()?.select(&bands)?;
    Ok(ResolvedSource {
        array,
        bands,
        nodata: dataset.nodata(),
        extent: Some(plotting_extent(dataset)?),
    })
}

/// 1-based band numbers interpreted as red, green and blue, if all three exist.
pub fn rgb_bands(dataset: &dyn Dataset) -> Option<[usize; 3]> {
    let find = |interp: ColorInterp| {
        (1..=dataset.count()).find(|&band| dataset.colorinterp(band) == Some(interp))
    };
    Some([
        find(ColorInterp::Red)?,
        find(ColorInterp::Green)?,
        find(ColorInterp::Blue)?,
    ])
}

/// Dataset bounds as `(left, right, bottom, top)`.
pub fn plotting_extent(dataset: &dyn Dataset) -> Result<(f64, f64, f64, f64)> {
    Ok(dataset.bounds()?.extent())
}

/// Reorder `(bands, rows, cols)` samples to `(rows, cols, bands)`.
pub fn reshape_as_image(array: &RasterArray) -> Vec<f64> {
    let (bands, height, width) = array.shape();
    let data = array.data();
    let mut out = Vec::with_capacity(data.len());
    for row in 0..height {
        for col in 0..width {
            for band in 0..bands {
                out.push(data[(band * height + row) * width + col]);
            }
        }
    }
    out
}

/// Reorder `(rows, cols, bands)` samples to a `(bands, rows, cols)` array.
pub fn reshape_as_raster(
    image: &[f64],
    height: usize,
    width: usize,
    bands: usize,
) -> Result<RasterArray> {
    if image.len() != height * width * bands {
        return Err(MergeError::ShapeMismatch {
            expected: (height, width, bands),
            actual: (1, 1, image.len()),
        });
    }
    let mut data = vec![0.0; image.len()];
    for (i, &value) in image.iter().enumerate() {
        let band = i % bands;
        let pixel = i / bands;
        data[band * height * width + pixel] = value;
    }
    RasterArray::new(bands, height, width, data)
}

// ============================================================================
// Histogram
// ============================================================================

/// Per-band histogram over a shared value range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// `(min, max)` of valid values across all bands.
    pub range: (f64, f64),
    /// Bin edges; one more than the number of bins.
    pub edges: Vec<f64>,
    /// Counts per band, in band order.
    pub counts: Vec<Vec<u64>>,
}

/// Histogram of every band of `array` with `bins` equal-width bins.
///
/// NaN and values equal to `nodata` are not counted. All bands share the
/// range of valid values so their counts are comparable. A range with
/// `min == max` is widened by 0.5 on each side; an array without valid
/// values uses `(0, 1)`. The last bin includes its upper edge.
pub fn histogram(array: &RasterArray, bins: usize, nodata: Option<f64>) -> Result<Histogram> {
    if bins == 0 {
        return Err(MergeError::InvalidOption {
            key: "bins".to_string(),
            reason: "histogram needs at least one bin".to_string(),
        });
    }
    let valid = |v: &f64| !v.is_nan() && !nodata.is_some_and(|nd| is_nodata(*v, nd));

    let (mut lo, mut hi) = array
        .data()
        .iter()
        .filter(|v| valid(*v))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if lo > hi {
        (lo, hi) = (0.0, 1.0);
    } else if lo == hi {
        (lo, hi) = (lo - 0.5, hi + 0.5);
    }

    let step = (hi - lo) / bins as f64;
    let edges = (0..=bins).map(|i| lo + step * i as f64).collect();

    let (bands, height, width) = array.shape();
    let len = height * width;
    let counts = (0..bands)
        .map(|band| {
            let mut counts = vec![0u64; bins];
            for v in array.data()[band * len..(band + 1) * len]
                .iter()
                .filter(|v| valid(*v))
            {
                let bin = (((v - lo) / step) as usize).min(bins - 1);
                counts[bin] += 1;
            }
            counts
        })
        .collect();

    Ok(Histogram {
        range: (lo, hi),
        edges,
        counts,
    })
}

//! The dataset contract consumed by grid building and compositing.
//!
//! The core never decodes a file format. It talks to datasets through the
//! [`Dataset`] trait, opens them through a [`DatasetOpener`] and hands the
//! finished mosaic to a [`DatasetWriter`].

use crate::{Env, MergeError, MergedRaster, Result};
use rmosaic_geom::{AffineTransform, BoundingBox, RasterGrid, Window};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Format-specific creation options, e.g. `COMPRESS=LZW`.
pub type CreationOptions = BTreeMap<String, String>;

// ============================================================================
// Data Types
// ============================================================================

/// Pixel sample type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    #[serde(rename = "uint8")]
    U8,
    #[serde(rename = "int8")]
    I8,
    #[serde(rename = "uint16")]
    U16,
    #[serde(rename = "int16")]
    I16,
    #[serde(rename = "uint32")]
    U32,
    #[serde(rename = "int32")]
    I32,
    #[serde(rename = "uint64")]
    U64,
    #[serde(rename = "int64")]
    I64,
    #[serde(rename = "float32")]
    F32,
    #[serde(rename = "float64")]
    F64,
}

impl DType {
    /// All supported types, narrowest first.
    pub const ALL: [DType; 10] = [
        DType::U8,
        DType::I8,
        DType::U16,
        DType::I16,
        DType::U32,
        DType::I32,
        DType::U64,
        DType::I64,
        DType::F32,
        DType::F64,
    ];

    /// Conventional lowercase name (`uint8`, `float32`, ...).
    pub fn name(self) -> &'static str {
        match self {
            DType::U8 => "uint8",
            DType::I8 => "int8",
            DType::U16 => "uint16",
            DType::I16 => "int16",
            DType::U32 => "uint32",
            DType::I32 => "int32",
            DType::U64 => "uint64",
            DType::I64 => "int64",
            DType::F32 => "float32",
            DType::F64 => "float64",
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            DType::I8 | DType::I16 | DType::I32 | DType::I64 | DType::F32 | DType::F64
        )
    }

    /// Size of one sample in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            DType::U8 | DType::I8 => 1,
            DType::U16 | DType::I16 => 2,
            DType::U32 | DType::I32 | DType::F32 => 4,
            DType::U64 | DType::I64 | DType::F64 => 8,
        }
    }

    /// Smallest and largest representable values.
    pub fn range(self) -> (f64, f64) {
        match self {
            DType::U8 => (u8::MIN as f64, u8::MAX as f64),
            DType::I8 => (i8::MIN as f64, i8::MAX as f64),
            DType::U16 => (u16::MIN as f64, u16::MAX as f64),
            DType::I16 => (i16::MIN as f64, i16::MAX as f64),
            DType::U32 => (u32::MIN as f64, u32::MAX as f64),
            DType::I32 => (i32::MIN as f64, i32::MAX as f64),
            DType::U64 => (u64::MIN as f64, u64::MAX as f64),
            DType::I64 => (i64::MIN as f64, i64::MAX as f64),
            DType::F32 => (f32::MIN as f64, f32::MAX as f64),
            DType::F64 => (f64::MIN, f64::MAX),
        }
    }

    /// Nodata used when neither an override nor an input declares one.
    pub fn default_nodata(self) -> f64 {
        0.0
    }

    /// True if `value` can be stored without clamping.
    ///
    /// NaN and infinities are representable only by float types.
    pub fn contains(self, value: f64) -> bool {
        if value.is_nan() || value.is_infinite() {
            return self.is_float();
        }
        let (lo, hi) = self.range();
        value >= lo && value <= hi
    }

    /// Convert `value` to the nearest value this type can hold.
    ///
    /// Integers round half away from zero and saturate at the range limits;
    /// NaN becomes 0.
    pub fn cast(self, value: f64) -> f64 {
        match self {
            DType::F64 => value,
            DType::F32 => value as f32 as f64,
            _ if value.is_nan() => 0.0,
            _ => {
                let (lo, hi) = self.range();
                value.round().clamp(lo, hi)
            }
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self> {
        DType::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| MergeError::InvalidOption {
                key: "dtype".to_string(),
                reason: format!("unknown data type {s:?}"),
            })
    }
}

/// Coordinate reference system, identified by EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs(pub u32);

impl Crs {
    pub fn epsg(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

impl FromStr for Crs {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self> {
        let code = s
            .trim()
            .strip_prefix("EPSG:")
            .or_else(|| s.trim().strip_prefix("epsg:"))
            .unwrap_or(s.trim());
        code.parse().map(Crs).map_err(|_| MergeError::InvalidOption {
            key: "crs".to_string(),
            reason: format!("expected an EPSG code, got {s:?}"),
        })
    }
}

/// Colour interpretation of a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorInterp {
    Gray,
    Red,
    Green,
    Blue,
    Alpha,
    Undefined,
}

// ============================================================================
// Pixel Arrays
// ============================================================================

/// Dense pixel array of shape `(bands, height, width)`, band-major.
///
/// Samples are held as `f64` regardless of the source [`DType`], which
/// represents every supported type except the extremes of 64-bit integers.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterArray {
    bands: usize,
    height: usize,
    width: usize,
    data: Vec<f64>,
}

impl RasterArray {
    /// Wrap `data`, which must hold exactly `bands * height * width` samples.
    pub fn new(bands: usize, height: usize, width: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != bands * height * width {
            return Err(MergeError::ShapeMismatch {
                expected: (bands, height, width),
                actual: (1, 1, data.len()),
            });
        }
        Ok(Self {
            bands,
            height,
            width,
            data,
        })
    }

    /// Array with every sample set to `value`.
    pub fn filled(bands: usize, height: usize, width: usize, value: f64) -> Self {
        Self {
            bands,
            height,
            width,
            data: vec![value; bands * height * width],
        }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.bands, self.height, self.width)
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    fn offset(&self, band: usize, row: usize, col: usize) -> Option<usize> {
        if band < self.bands && row < self.height && col < self.width {
            Some((band * self.height + row) * self.width + col)
        } else {
            None
        }
    }

    /// Sample at zero-based `(band, row, col)`.
    pub fn get(&self, band: usize, row: usize, col: usize) -> Option<f64> {
        self.offset(band, row, col).map(|i| self.data[i])
    }

    /// Mutable sample at zero-based `(band, row, col)`.
    pub fn get_mut(&mut self, band: usize, row: usize, col: usize) -> Option<&mut f64> {
        let i = self.offset(band, row, col)?;
        Some(&mut self.data[i])
    }

    /// Copy of the 1-based `band` as a single-band array.
    pub fn band(&self, band: usize) -> Result<RasterArray> {
        self.select(&[band])
    }

    /// Copy of the 1-based `bands`, in the order given.
    pub fn select(&self, bands: &[usize]) -> Result<RasterArray> {
        let len = self.height * self.width;
        let mut data = Vec::with_capacity(bands.len() * len);
        for &band in bands {
            if band == 0 || band > self.bands {
                return Err(MergeError::InvalidBand {
                    band,
                    count: self.bands,
                });
            }
            let start = (band - 1) * len;
            data.extend_from_slice(&self.data[start..start + len]);
        }
        Ok(RasterArray {
            bands: bands.len(),
            height: self.height,
            width: self.width,
            data,
        })
    }

    /// Read `window` with boundless semantics.
    ///
    /// The window is rounded to whole pixels. Cells that fall outside this
    /// array are set to `fill`.
    pub fn read_window(&self, window: &Window, fill: f64) -> Result<RasterArray> {
        let w = window.round_nearest();
        let out_h = w.height().max(0.0) as usize;
        let out_w = w.width().max(0.0) as usize;
        let row0 = w.row_start() as i64;
        let col0 = w.col_start() as i64;

        let mut out = RasterArray::filled(self.bands, out_h, out_w, fill);
        for band in 0..self.bands {
            for r in 0..out_h {
                let src_row = row0 + r as i64;
                if src_row < 0 || src_row >= self.height as i64 {
                    continue;
                }
                for c in 0..out_w {
                    let src_col = col0 + c as i64;
                    if src_col < 0 || src_col >= self.width as i64 {
                        continue;
                    }
                    let value = self.data
                        [(band * self.height + src_row as usize) * self.width + src_col as usize];
                    out.data[(band * out_h + r) * out_w + c] = value;
                }
            }
        }
        Ok(out)
    }

    /// Write `values` into `window`, discarding cells that fall outside.
    pub fn write_window(&mut self, window: &Window, values: &RasterArray) -> Result<()> {
        let w = window.round_nearest();
        let expected = (self.bands, w.height() as usize, w.width() as usize);
        if values.shape() != expected {
            return Err(MergeError::ShapeMismatch {
                expected,
                actual: values.shape(),
            });
        }
        let row0 = w.row_start() as i64;
        let col0 = w.col_start() as i64;
        for band in 0..values.bands {
            for r in 0..values.height {
                let dst_row = row0 + r as i64;
                if dst_row < 0 || dst_row >= self.height as i64 {
                    continue;
                }
                for c in 0..values.width {
                    let dst_col = col0 + c as i64;
                    if dst_col < 0 || dst_col >= self.width as i64 {
                        continue;
                    }
                    let i = (band * self.height + dst_row as usize) * self.width + dst_col as usize;
                    self.data[i] = values.data[(band * values.height + r) * values.width + c];
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Dataset Traits
// ============================================================================

/// A georeferenced raster the core can read from.
pub trait Dataset {
    /// Path or label used in log messages and errors.
    fn name(&self) -> &str;

    /// Short name of the format backing this dataset.
    fn driver(&self) -> &str {
        "MEM"
    }

    fn transform(&self) -> AffineTransform;

    fn width(&self) -> usize;

    fn height(&self) -> usize;

    /// Number of bands.
    fn count(&self) -> usize;

    fn dtype(&self) -> DType;

    fn nodata(&self) -> Option<f64>;

    fn crs(&self) -> Option<Crs> {
        None
    }

    /// Colour interpretation of the 1-based `band`, if known.
    fn colorinterp(&self, _band: usize) -> Option<ColorInterp> {
        None
    }

    /// Read all bands under `window`.
    ///
    /// Reads are boundless: cells outside the raster are filled with the
    /// dataset's nodata, or 0 when it has none.
    fn read(&self, window: &Window) -> Result<RasterArray>;

    fn grid(&self) -> RasterGrid {
        RasterGrid::new(self.transform(), self.width(), self.height())
    }

    fn bounds(&self) -> Result<BoundingBox> {
        Ok(self.grid().bounds()?)
    }

    /// Read the whole raster.
    fn read_all(&self) -> Result<RasterArray> {
        self.read(&Window::full(self.height(), self.width()))
    }

    /// Snapshot of the dataset's metadata.
    fn info(&self) -> Result<DatasetInfo> {
        Ok(DatasetInfo {
            name: self.name().to_string(),
            driver: self.driver().to_string(),
            width: self.width(),
            height: self.height(),
            count: self.count(),
            dtype: self.dtype(),
            nodata: self.nodata(),
            crs: self.crs(),
            transform: self.transform(),
            bounds: self.bounds()?,
            res: self.transform().res(),
        })
    }
}

/// A dataset that can also be written to.
pub trait DatasetMut: Dataset {
    /// Write `values` (shape `(count, window height, window width)`) under `window`.
    fn write(&mut self, window: &Window, values: &RasterArray) -> Result<()>;
}

/// Opens datasets by path.
///
/// Each returned dataset is owned by the caller and released when dropped;
/// the compositor holds at most one open at a time.
pub trait DatasetOpener {
    fn open(&self, path: &Path, env: &Env) -> Result<Box<dyn Dataset>>;
}

/// Persists a finished mosaic.
pub trait DatasetWriter {
    /// Format driver name, e.g. `GTiff`.
    fn driver(&self) -> &str;

    fn write(
        &self,
        path: &Path,
        raster: &MergedRaster,
        options: &CreationOptions,
        env: &Env,
    ) -> Result<()>;
}

/// Metadata snapshot of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub name: String,
    pub driver: String,
    pub width: usize,
    pub height: usize,
    pub count: usize,
    pub dtype: DType,
    pub nodata: Option<f64>,
    pub crs: Option<Crs>,
    pub transform: AffineTransform,
    pub bounds: BoundingBox,
    pub res: (f64, f64),
}

// ============================================================================
// In-memory Dataset
// ============================================================================

/// A dataset held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemDataset {
    name: String,
    transform: AffineTransform,
    dtype: DType,
    nodata: Option<f64>,
    crs: Option<Crs>,
    colorinterp: Vec<ColorInterp>,
    data: RasterArray,
}

impl MemDataset {
    pub fn new(
        name: impl Into<String>,
        transform: AffineTransform,
        dtype: DType,
        nodata: Option<f64>,
        data: RasterArray,
    ) -> Self {
        Self {
            name: name.into(),
            transform,
            dtype,
            nodata,
            crs: None,
            colorinterp: Vec::new(),
            data,
        }
    }

    /// Single-band dataset with every pixel set to `value`.
    pub fn constant(
        name: impl Into<String>,
        transform: AffineTransform,
        height: usize,
        width: usize,
        dtype: DType,
        nodata: Option<f64>,
        value: f64,
    ) -> Self {
        Self::new(
            name,
            transform,
            dtype,
            nodata,
            RasterArray::filled(1, height, width, value),
        )
    }

    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = Some(crs);
        self
    }

    /// Set per-band colour interpretation, band 1 first.
    pub fn with_colorinterp(mut self, interp: Vec<ColorInterp>) -> Self {
        self.colorinterp = interp;
        self
    }

    pub fn data(&self) -> &RasterArray {
        &self.data
    }
}

impl Dataset for MemDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self) -> AffineTransform {
        self.transform
    }

    fn width(&self) -> usize {
        self.data.width()
    }

    fn height(&self) -> usize {
        self.data.height()
    }

    fn count(&self) -> usize {
        self.data.bands()
    }

    fn dtype(&self) -> DType {
        self.dtype
    }

    fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    fn crs(&self) -> Option<Crs> {
        self.crs
    }

    fn colorinterp(&self, band: usize) -> Option<ColorInterp> {
        band.checked_sub(1)
            .and_then(|i| self.colorinterp.get(i))
            .copied()
    }

    fn read(&self, window: &Window) -> Result<RasterArray> {
        self.data
            .read_window(window, self.nodata.unwrap_or(self.dtype.default_nodata()))
    }
}

impl DatasetMut for MemDataset {
    fn write(&mut self, window: &Window, values: &RasterArray) -> Result<()> {
        let dtype = self.dtype;
        let cast = RasterArray {
            data: values.data.iter().map(|&v| dtype.cast(v)).collect(),
            ..values.clone()
        };
        self.data.write_window(window, &cast)
    }
}

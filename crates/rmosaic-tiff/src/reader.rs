//! GeoTIFF datasets loaded into memory.

use crate::geokeys::{self, GDAL_NODATA, GEO_KEY_DIRECTORY, MODEL_PIXEL_SCALE, MODEL_TIEPOINT, MODEL_TRANSFORMATION};
use crate::{Result, TiffIoError};
use rmosaic_geom::{AffineTransform, Window};
use rmosaic_merge::source::reshape_as_raster;
use rmosaic_merge::{ColorInterp, Crs, DType, Dataset, DatasetOpener, Env, RasterArray};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::{debug, warn};

const PLANAR_SEPARATE: u32 = 2;
const PHOTOMETRIC_RGB: u32 = 2;

/// A GeoTIFF file decoded into memory.
///
/// The file handle is only held while decoding; dropping the dataset
/// releases the pixels.
#[derive(Debug, Clone)]
pub struct GeoTiffDataset {
    name: String,
    transform: AffineTransform,
    dtype: DType,
    nodata: Option<f64>,
    crs: Option<Crs>,
    colorinterp: Vec<ColorInterp>,
    /// Pixels in `(band, row, col)` order.
    data: RasterArray,
}

impl GeoTiffDataset {
    /// Open and decode the first image of a GeoTIFF file.
    ///
    /// The decoder's buffer limits come from `TIFF_DECODE_LIMIT` in `env`.
    pub fn open<P: AsRef<Path>>(path: P, env: &Env) -> Result<Self> {
        let path = path.as_ref();
        let file = BufReader::new(File::open(path)?);
        let mut decoder = Decoder::new(file)?;

        let limit = usize::try_from(env.decode_limit()?).unwrap_or(usize::MAX);
        let mut limits = Limits::default();
        limits.decoding_buffer_size = limit;
        limits.intermediate_buffer_size = limit;
        limits.ifd_value_size = limit;
        decoder = decoder.with_limits(limits);

        let (width, height) = decoder.dimensions()?;
        let bands = decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1) as usize;
        if decoder.get_tag_u32(Tag::PlanarConfiguration).ok() == Some(PLANAR_SEPARATE) {
            return Err(TiffIoError::UnsupportedLayout(
                "band-separate planar configuration".to_string(),
            ));
        }

        let transform = Self::read_transform(&mut decoder, path)?;
        let crs = Self::read_crs(&mut decoder);
        let nodata = Self::read_nodata_value(&mut decoder);
        let colorinterp = Self::read_colorinterp(&mut decoder, bands);

        let (samples, dtype) = Self::decode_samples(&mut decoder)?;
        let data = reshape_as_raster(&samples, height as usize, width as usize, bands)?;

        debug!(
            path = %path.display(),
            width,
            height,
            bands,
            dtype = %dtype,
            "Opened GeoTIFF"
        );

        Ok(Self {
            name: path.display().to_string(),
            transform,
            dtype,
            nodata,
            crs,
            colorinterp,
            data,
        })
    }

    /// Read the geotransform from GeoTIFF tags.
    ///
    /// Files without georeferencing get the identity transform.
    fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>, path: &Path) -> Result<AffineTransform> {
        let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT));
        let pixel_scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE));
        if let (Ok(tiepoint), Ok(scale)) = (tiepoint, pixel_scale) {
            return geokeys::transform_from_tiepoint(&tiepoint, &scale);
        }

        if let Ok(matrix) = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TRANSFORMATION)) {
            return geokeys::transform_from_matrix(&matrix);
        }

        warn!(
            path = %path.display(),
            "Dataset has no geotransform; the identity transform will be used"
        );
        Ok(AffineTransform::identity())
    }

    fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<Crs> {
        let directory = decoder.get_tag_u32_vec(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY)).ok()?;
        geokeys::crs_from_geokeys(&directory)
    }

    /// Try to read the no-data value from the GDAL_NODATA tag.
    fn read_nodata_value<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
        let raw = decoder.get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA)).ok()?;
        geokeys::parse_nodata(&raw)
    }

    fn read_colorinterp<R: Read + Seek>(decoder: &mut Decoder<R>, bands: usize) -> Vec<ColorInterp> {
        let photometric = decoder.get_tag_u32(Tag::PhotometricInterpretation).ok();
        (1..=bands)
            .map(|band| match (photometric, band) {
                (Some(PHOTOMETRIC_RGB), 1) => ColorInterp::Red,
                (Some(PHOTOMETRIC_RGB), 2) => ColorInterp::Green,
                (Some(PHOTOMETRIC_RGB), 3) => ColorInterp::Blue,
                (Some(PHOTOMETRIC_RGB), 4) => ColorInterp::Alpha,
                (Some(PHOTOMETRIC_RGB), _) => ColorInterp::Undefined,
                (_, 1) => ColorInterp::Gray,
                _ => ColorInterp::Undefined,
            })
            .collect()
    }

    /// Decode every sample as `f64`, remembering the stored type.
    fn decode_samples<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<(Vec<f64>, DType)> {
        let result = decoder.read_image()?;

        let decoded = match result {
            DecodingResult::U8(data) => (data.into_iter().map(f64::from).collect(), DType::U8),
            DecodingResult::I8(data) => (data.into_iter().map(f64::from).collect(), DType::I8),
            DecodingResult::U16(data) => (data.into_iter().map(f64::from).collect(), DType::U16),
            DecodingResult::I16(data) => (data.into_iter().map(f64::from).collect(), DType::I16),
            DecodingResult::U32(data) => (data.into_iter().map(f64::from).collect(), DType::U32),
            DecodingResult::I32(data) => (data.into_iter().map(f64::from).collect(), DType::I32),
            DecodingResult::U64(data) => (data.into_iter().map(|v| v as f64).collect(), DType::U64),
            DecodingResult::I64(data) => (data.into_iter().map(|v| v as f64).collect(), DType::I64),
            DecodingResult::F32(data) => (data.into_iter().map(f64::from).collect(), DType::F32),
            DecodingResult::F64(data) => (data, DType::F64),
        };
        Ok(decoded)
    }

    /// Decoded pixels, `(band, row, col)` order.
    pub fn data(&self) -> &RasterArray {
        &self.data
    }
}

impl Dataset for GeoTiffDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn driver(&self) -> &str {
        crate::DRIVER
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

    fn read(&self, window: &Window) -> rmosaic_merge::Result<RasterArray> {
        self.data.read_window(window, self.nodata.unwrap_or(0.0))
    }
}

/// Opens GeoTIFF files for the merge.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffOpener;

impl DatasetOpener for GeoTiffOpener {
    fn open(&self, path: &Path, env: &Env) -> rmosaic_merge::Result<Box<dyn Dataset>> {
        let dataset = GeoTiffDataset::open(path, env)
            .map_err(|e| e.into_read_failure(&path.display().to_string()))?;
        Ok(Box::new(dataset))
    }
}

//! GeoTIFF output.
//!
//! Pixels are written chunky (band-interleaved) in a single image, with the
//! georeferencing of the source dataset. The file is assembled in a sibling
//! temporary file and renamed into place once complete.

use crate::geokeys::{
    self, GDAL_NODATA, GEO_KEY_DIRECTORY, MODEL_PIXEL_SCALE, MODEL_TIEPOINT, MODEL_TRANSFORMATION,
};
use crate::{Result, TiffIoError};
use rmosaic_merge::source::reshape_as_image;
use rmosaic_merge::{CreationOptions, DType, Dataset, DatasetWriter, Env, MergedRaster};
use std::fmt;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use std::str::FromStr;
use tempfile::NamedTempFile;
use tiff::encoder::colortype::{
    ColorType, Gray16, Gray32, Gray32Float, Gray64, Gray64Float, Gray8, GrayI16, GrayI32,
    GrayI64, GrayI8, RGB16, RGB32, RGB32Float, RGB64, RGB64Float, RGB8, RGBA16, RGBA32,
    RGBA32Float, RGBA64, RGBA64Float, RGBA8,
};
use tiff::encoder::compression::{Compression, Deflate, Lzw, Packbits, Uncompressed};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind, TiffValue};
use tiff::tags::Tag;
use tracing::{debug, info, warn};

/// Creation option selecting the compression scheme.
pub const COMPRESS: &str = "COMPRESS";

/// Compression schemes accepted by `COMPRESS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compress {
    #[default]
    None,
    Lzw,
    Deflate,
    Packbits,
}

impl FromStr for Compress {
    type Err = TiffIoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(Compress::None),
            "LZW" => Ok(Compress::Lzw),
            "DEFLATE" => Ok(Compress::Deflate),
            "PACKBITS" => Ok(Compress::Packbits),
            _ => Err(TiffIoError::UnsupportedCreationOption {
                key: COMPRESS.to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Compress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Compress::None => "NONE",
            Compress::Lzw => "LZW",
            Compress::Deflate => "DEFLATE",
            Compress::Packbits => "PACKBITS",
        };
        f.write_str(name)
    }
}

/// Validated creation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOptions {
    pub compress: Compress,
}

impl WriteOptions {
    /// Parse creation options; option names are case-insensitive.
    pub fn from_creation_options(options: &CreationOptions) -> Result<Self> {
        let mut parsed = WriteOptions::default();
        for (key, value) in options {
            match key.to_ascii_uppercase().as_str() {
                COMPRESS => parsed.compress = value.parse()?,
                _ => {
                    return Err(TiffIoError::UnsupportedCreationOption {
                        key: key.clone(),
                        value: value.clone(),
                    })
                }
            }
        }
        Ok(parsed)
    }
}

/// Data type actually stored for `bands` bands of `dtype`.
///
/// Single-band rasters keep their type. RGB and RGBA have no signed integer
/// layouts, so signed bands are stored as floats wide enough to hold every
/// value exactly.
pub fn storage_dtype(dtype: DType, bands: usize) -> DType {
    match (bands, dtype) {
        (1, dtype) => dtype,
        (_, DType::I8 | DType::I16) => DType::F32,
        (_, DType::I32 | DType::I64) => DType::F64,
        (_, other) => other,
    }
}

/// Georeferencing written alongside the pixels.
struct GeoTags {
    placement: Placement,
    geokeys: Option<Vec<u16>>,
    nodata: Option<String>,
}

enum Placement {
    Tiepoint { scale: [f64; 3], tiepoint: [f64; 6] },
    Matrix([f64; 16]),
}

impl GeoTags {
    /// Tags for `dataset` stored as `dtype`.
    ///
    /// Nodata is cast the same way as the pixels so gaps still match it
    /// when the file is read back.
    fn for_dataset(dataset: &dyn Dataset, dtype: DType) -> Self {
        let transform = dataset.transform();
        let placement = if geokeys::is_north_up(&transform) {
            let (scale, tiepoint) = geokeys::tiepoint_tags(&transform);
            Placement::Tiepoint { scale, tiepoint }
        } else {
            Placement::Matrix(geokeys::matrix_tag(&transform))
        };

        let directory = dataset.crs().and_then(|crs| {
            let directory = geokeys::geokey_directory(crs);
            if directory.is_none() {
                warn!(crs = %crs, "EPSG code does not fit a GeoKey; CRS not written");
            }
            directory
        });

        Self {
            placement,
            geokeys: directory,
            nodata: dataset.nodata().map(|nodata| {
                let stored = dtype.cast(nodata);
                if !dtype.contains(nodata) {
                    warn!(
                        nodata,
                        stored,
                        dtype = %dtype,
                        "Nodata does not fit the stored data type"
                    );
                }
                geokeys::format_nodata(stored)
            }),
        }
    }

    fn write<W: Write + Seek, K: TiffKind>(&self, dir: &mut DirectoryEncoder<W, K>) -> Result<()> {
        match &self.placement {
            Placement::Tiepoint { scale, tiepoint } => {
                dir.write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &scale[..])?;
                dir.write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])?;
            }
            Placement::Matrix(matrix) => {
                dir.write_tag(Tag::Unknown(MODEL_TRANSFORMATION), &matrix[..])?;
            }
        }
        if let Some(directory) = &self.geokeys {
            dir.write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), directory.as_slice())?;
        }
        if let Some(nodata) = &self.nodata {
            dir.write_tag(Tag::Unknown(GDAL_NODATA), nodata.as_str())?;
        }
        Ok(())
    }
}

/// Writes datasets as GeoTIFF files.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffWriter;

impl GeoTiffWriter {
    /// Write every band of `dataset` to `path`.
    ///
    /// Nothing is left at `path` if writing fails.
    pub fn write_dataset(
        &self,
        path: &Path,
        dataset: &dyn Dataset,
        options: &CreationOptions,
    ) -> Result<()> {
        let options = WriteOptions::from_creation_options(options)?;
        let bands = dataset.count();
        if !matches!(bands, 1 | 3 | 4) {
            return Err(TiffIoError::UnsupportedLayout(format!(
                "{bands} bands; only 1, 3 or 4 can be written"
            )));
        }
        let width = u32::try_from(dataset.width())
            .map_err(|_| TiffIoError::UnsupportedLayout("width exceeds u32".to_string()))?;
        let height = u32::try_from(dataset.height())
            .map_err(|_| TiffIoError::UnsupportedLayout("height exceeds u32".to_string()))?;
        if width == 0 || height == 0 {
            return Err(TiffIoError::UnsupportedLayout(
                "raster has zero dimensions".to_string(),
            ));
        }

        let dtype = storage_dtype(dataset.dtype(), bands);
        if dtype != dataset.dtype() {
            warn!(
                from = %dataset.dtype(),
                to = %dtype,
                "Data type cannot be stored directly; promoting"
            );
        }

        let samples = reshape_as_image(&dataset.read_all()?);
        let tags = GeoTags::for_dataset(dataset, dtype);

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            let mut encoder = TiffEncoder::new(&mut writer)?;
            let image = ImageSpec {
                width,
                height,
                compress: options.compress,
                tags: &tags,
            };
            encode_samples(&mut encoder, &image, bands, dtype, &samples)?;
            drop(encoder);
            writer.flush()?;
        }
        tmp.persist(path).map_err(|e| e.error)?;

        info!(
            path = %path.display(),
            width,
            height,
            bands,
            dtype = %dtype,
            compress = %options.compress,
            "Wrote GeoTIFF"
        );
        Ok(())
    }
}

impl DatasetWriter for GeoTiffWriter {
    fn driver(&self) -> &str {
        crate::DRIVER
    }

    fn write(
        &self,
        path: &Path,
        raster: &MergedRaster,
        options: &CreationOptions,
        _env: &Env,
    ) -> rmosaic_merge::Result<()> {
        self.write_dataset(path, raster, options)
            .map_err(TiffIoError::into_write_failure)
    }
}

// ============================================================================
// Encoding
// ============================================================================

struct ImageSpec<'a> {
    width: u32,
    height: u32,
    compress: Compress,
    tags: &'a GeoTags,
}

/// Convert interleaved samples to `$inner` and encode them as `$color`.
macro_rules! encode_as {
    ($encoder:expr, $image:expr, $samples:expr, $color:ty, $inner:ty) => {{
        let converted: Vec<$inner> = $samples.iter().map(|&v| v as $inner).collect();
        encode_with_compression::<_, $color>($encoder, $image, &converted)
    }};
}

fn encode_samples<W: Write + Seek>(
    encoder: &mut TiffEncoder<W>,
    image: &ImageSpec,
    bands: usize,
    dtype: DType,
    samples: &[f64],
) -> Result<()> {
    debug!(bands, dtype = %dtype, compress = %image.compress, "Encoding image");
    match (bands, dtype) {
        (1, DType::U8) => encode_as!(encoder, image, samples, Gray8, u8),
        (1, DType::I8) => encode_as!(encoder, image, samples, GrayI8, i8),
        (1, DType::U16) => encode_as!(encoder, image, samples, Gray16, u16),
        (1, DType::I16) => encode_as!(encoder, image, samples, GrayI16, i16),
        (1, DType::U32) => encode_as!(encoder, image, samples, Gray32, u32),
        (1, DType::I32) => encode_as!(encoder, image, samples, GrayI32, i32),
        (1, DType::U64) => encode_as!(encoder, image, samples, Gray64, u64),
        (1, DType::I64) => encode_as!(encoder, image, samples, GrayI64, i64),
        (1, DType::F32) => encode_as!(encoder, image, samples, Gray32Float, f32),
        (1, DType::F64) => encode_with_compression::<_, Gray64Float>(encoder, image, samples),
        (3, DType::U8) => encode_as!(encoder, image, samples, RGB8, u8),
        (3, DType::U16) => encode_as!(encoder, image, samples, RGB16, u16),
        (3, DType::U32) => encode_as!(encoder, image, samples, RGB32, u32),
        (3, DType::U64) => encode_as!(encoder, image, samples, RGB64, u64),
        (3, DType::F32) => encode_as!(encoder, image, samples, RGB32Float, f32),
        (3, DType::F64) => encode_with_compression::<_, RGB64Float>(encoder, image, samples),
        (4, DType::U8) => encode_as!(encoder, image, samples, RGBA8, u8),
        (4, DType::U16) => encode_as!(encoder, image, samples, RGBA16, u16),
        (4, DType::U32) => encode_as!(encoder, image, samples, RGBA32, u32),
        (4, DType::U64) => encode_as!(encoder, image, samples, RGBA64, u64),
        (4, DType::F32) => encode_as!(encoder, image, samples, RGBA32Float, f32),
        (4, DType::F64) => encode_with_compression::<_, RGBA64Float>(encoder, image, samples),
        _ => Err(TiffIoError::UnsupportedLayout(format!(
            "{bands} bands of {dtype}"
        ))),
    }
}

fn encode_with_compression<W, C>(
    encoder: &mut TiffEncoder<W>,
    image: &ImageSpec,
    samples: &[C::Inner],
) -> Result<()>
where
    W: Write + Seek,
    C: ColorType,
    [C::Inner]: TiffValue,
{
    match image.compress {
        Compress::None => encode_image::<W, C, _>(encoder, image, samples, Uncompressed::default()),
        Compress::Lzw => encode_image::<W, C, _>(encoder, image, samples, Lzw::default()),
        Compress::Deflate => encode_image::<W, C, _>(encoder, image, samples, Deflate::default()),
        Compress::Packbits => encode_image::<W, C, _>(encoder, image, samples, Packbits::default()),
    }
}

fn encode_image<W, C, D>(
    encoder: &mut TiffEncoder<W>,
    image: &ImageSpec,
    samples: &[C::Inner],
    compression: D,
) -> Result<()>
where
    W: Write + Seek,
    C: ColorType,
    D: Compression,
    [C::Inner]: TiffValue,
{
    let mut encoded =
        encoder.new_image_with_compression::<C, D>(image.width, image.height, compression)?;
    image.tags.write(encoded.encoder())?;
    encoded.write_data(samples)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pairs: &[(&str, &str)]) -> CreationOptions {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_compress_option_parsing() {
        let parsed = WriteOptions::from_creation_options(&options(&[("compress", "lzw")])).unwrap();
        assert_eq!(parsed.compress, Compress::Lzw);
        assert_eq!(
            WriteOptions::from_creation_options(&CreationOptions::new()).unwrap(),
            WriteOptions::default()
        );
    }

    #[test]
    fn test_unknown_options_rejected() {
        let err = WriteOptions::from_creation_options(&options(&[("COMPRESS", "JPEG")])).unwrap_err();
        assert!(matches!(
            err,
            TiffIoError::UnsupportedCreationOption { ref key, ref value } if key == "COMPRESS" && value == "JPEG"
        ));
        assert!(WriteOptions::from_creation_options(&options(&[("TILED", "YES")])).is_err());
    }

    #[test]
    fn test_storage_dtype() {
        for dtype in [DType::U8, DType::I8, DType::I16, DType::I32, DType::I64, DType::U64, DType::F64] {
            assert_eq!(storage_dtype(dtype, 1), dtype);
        }
        assert_eq!(storage_dtype(DType::U16, 3), DType::U16);
        assert_eq!(storage_dtype(DType::U64, 4), DType::U64);
        assert_eq!(storage_dtype(DType::I16, 3), DType::F32);
        assert_eq!(storage_dtype(DType::I32, 4), DType::F64);
    }
}

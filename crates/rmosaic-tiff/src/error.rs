//! Error types for the GeoTIFF crate.

use rmosaic_geom::GeomError;
use rmosaic_merge::MergeError;
use thiserror::Error;

/// Errors that can occur when reading or writing GeoTIFF files.
#[derive(Debug, Error)]
pub enum TiffIoError {
    /// I/O error reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF encoding or decoding error.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// Georeferencing tags are malformed.
    #[error("Invalid GeoTIFF: {0}")]
    InvalidGeoTiff(String),

    /// Band count, sample layout or data type the codec cannot handle.
    #[error("Unsupported layout: {0}")]
    UnsupportedLayout(String),

    /// Creation option the writer does not understand.
    #[error("Unsupported creation option {key}={value}")]
    UnsupportedCreationOption {
        /// Option name.
        key: String,
        /// Option value.
        value: String,
    },

    /// The georeferencing describes an invalid transform or extent.
    #[error(transparent)]
    Geometry(#[from] GeomError),

    /// Pixel data handed over by the merge core was rejected.
    #[error(transparent)]
    Merge(#[from] MergeError),
}

impl TiffIoError {
    /// Convert into the merge core's error for a failed read of `input`.
    pub fn into_read_failure(self, input: &str) -> MergeError {
        MergeError::InputReadFailure {
            input: input.to_string(),
            reason: self.to_string(),
        }
    }

    /// Convert into the merge core's error for a failed write.
    pub fn into_write_failure(self) -> MergeError {
        MergeError::OutputWriteFailure(self.to_string())
    }
}

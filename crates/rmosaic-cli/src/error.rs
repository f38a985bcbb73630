//! Error types for the command-line interface.

use rmosaic_geom::GeomError;
use rmosaic_merge::MergeError;
use rmosaic_tiff::TiffIoError;
use thiserror::Error;

/// Errors reported by `rmosaic` subcommands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Tiff(#[from] TiffIoError),

    #[error(transparent)]
    Geometry(#[from] GeomError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The `--config` file could not be parsed.
    #[error("Invalid config file {path}: {source}")]
    Config {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A flag value clap accepted but the command cannot use.
    #[error("Invalid argument {arg}: {reason}")]
    InvalidArgument { arg: String, reason: String },
}

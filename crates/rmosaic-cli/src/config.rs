//! YAML configuration file and option layering.
//!
//! ```yaml
//! env:
//!   TIFF_DECODE_LIMIT: 268435456
//! creation_options:
//!   COMPRESS: LZW
//! ```
//!
//! Values given on the command line override the file.

use crate::error::CliError;
use rmosaic_merge::env::CPL_DEBUG;
use rmosaic_merge::{ConfigValue, CreationOptions, Env};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Contents of a `--config` file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Env options.
    pub env: BTreeMap<String, ConfigValue>,
    /// Writer creation options; non-string scalars are accepted.
    pub creation_options: BTreeMap<String, ConfigValue>,
}

impl ConfigFile {
    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text).map_err(|source| CliError::Config {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Load `path` if given, otherwise an empty config.
    pub fn load_optional(path: Option<&Path>) -> Result<Self, CliError> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Build the Env: file options, then `CPL_DEBUG` when requested, then
    /// command-line `KEY=VALUE` pairs.
    pub fn env(&self, cpl_debug: bool, overrides: &[(String, String)]) -> Result<Env, CliError> {
        let mut options: Vec<(String, ConfigValue)> = self
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if cpl_debug {
            options.push((CPL_DEBUG.to_string(), ConfigValue::Bool(true)));
        }
        options.extend(
            overrides
                .iter()
                .map(|(k, v)| (k.clone(), ConfigValue::parse(v))),
        );
        Ok(Env::with_options(options)?)
    }

    /// Creation options from the file with command-line `KEY=VALUE` pairs
    /// layered on top.
    pub fn creation_options(&self, overrides: &[(String, String)]) -> CreationOptions {
        let mut options: CreationOptions = self
            .creation_options
            .iter()
            .map(|(k, v)| (k.to_ascii_uppercase(), v.to_string()))
            .collect();
        for (k, v) in overrides {
            options.insert(k.to_ascii_uppercase(), v.clone());
        }
        options
    }
}

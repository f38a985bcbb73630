//! Explicit configuration context.
//!
//! An [`Env`] carries the options that influence opening and compositing
//! rasters. It is passed by reference to every operation that reads it;
//! there is no process-wide default. Options are layered in scopes: entering
//! a scope with [`Env::scope`] pushes a set of overrides, and dropping the
//! returned [`EnvScope`] restores the previous values.
//!
//! ```
//! use rmosaic_merge::{ConfigValue, Env};
//!
//! let mut env = Env::new();
//! assert!(!env.cpl_debug());
//! {
//!     let scope = env.scope([("CPL_DEBUG", ConfigValue::Bool(true))])?;
//!     assert!(scope.cpl_debug());
//! }
//! assert!(!env.cpl_debug());
//! # Ok::<(), rmosaic_merge::MergeError>(())
//! ```

use crate::{MergeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};

// ============================================================================
// Option Names
// ============================================================================

/// Log per-input window details while compositing.
pub const CPL_DEBUG: &str = "CPL_DEBUG";
/// Upper bound in bytes for decoder buffers when opening inputs.
pub const TIFF_DECODE_LIMIT: &str = "TIFF_DECODE_LIMIT";
/// Resampling policy used when input and output pixels differ.
pub const MERGE_RESAMPLING: &str = "MERGE_RESAMPLING";

/// Default decoder buffer limit (1 GiB).
pub const DEFAULT_DECODE_LIMIT: u64 = 1024 * 1024 * 1024;

/// Keys that must never be set through the environment.
const CREDENTIAL_KEYS: &[&str] = &["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY", "AWS_SESSION_TOKEN"];

// ============================================================================
// Config Value
// ============================================================================

/// Value of a configuration option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer value (i64).
    Integer(i64),
    /// Floating point value (f64).
    Float(f64),
    /// String value.
    String(String),
}

impl ConfigValue {
    /// Parse a command-line value: booleans, then integers, then floats,
    /// otherwise the raw string.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => return ConfigValue::Bool(true),
            "false" | "no" | "off" => return ConfigValue::Bool(false),
            _ => {}
        }
        if let Ok(v) = raw.parse::<i64>() {
            return ConfigValue::Integer(v);
        }
        if let Ok(v) = raw.parse::<f64>() {
            return ConfigValue::Float(v);
        }
        ConfigValue::String(raw.to_string())
    }

    /// Convert to bool if possible.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            ConfigValue::Integer(v) => Some(*v != 0),
            ConfigValue::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" => Some(true),
                "false" | "no" | "off" => Some(false),
                _ => None,
            },
            ConfigValue::Float(_) => None,
        }
    }

    /// Convert to u64 if possible.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ConfigValue::Integer(v) if *v >= 0 => Some(*v as u64),
            ConfigValue::Float(v) if *v >= 0.0 && v.is_finite() => Some(*v as u64),
            ConfigValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Convert to f64 if possible.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Integer(v) => Some(*v as f64),
            ConfigValue::Float(v) => Some(*v),
            ConfigValue::String(s) => s.parse().ok(),
            ConfigValue::Bool(_) => None,
        }
    }

    /// Borrow as str if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(v) => write!(f, "{v}"),
            ConfigValue::Integer(v) => write!(f, "{v}"),
            ConfigValue::Float(v) => write!(f, "{v}"),
            ConfigValue::String(v) => f.write_str(v),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Integer(v)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::String(v.to_string())
    }
}

// ============================================================================
// Env
// ============================================================================

type Scope = BTreeMap<String, ConfigValue>;

/// Layered configuration options.
#[derive(Debug, Clone)]
pub struct Env {
    /// Option scopes, innermost last. The first scope holds the defaults.
    scopes: Vec<Scope>,
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

impl Env {
    /// Create an environment holding only the default options.
    pub fn new() -> Self {
        Self {
            scopes: vec![Self::default_options()],
        }
    }

    /// Create an environment with `options` layered over the defaults.
    pub fn with_options<I, K, V>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ConfigValue>,
    {
        let mut env = Self::new();
        for (key, value) in options {
            env.set(key.as_ref(), value)?;
        }
        Ok(env)
    }

    /// The options every environment starts with.
    pub fn default_options() -> BTreeMap<String, ConfigValue> {
        let mut options = BTreeMap::new();
        options.insert(CPL_DEBUG.to_string(), ConfigValue::Bool(false));
        options.insert(
            TIFF_DECODE_LIMIT.to_string(),
            ConfigValue::Integer(DEFAULT_DECODE_LIMIT as i64),
        );
        options.insert(
            MERGE_RESAMPLING.to_string(),
            ConfigValue::String("nearest".to_string()),
        );
        options
    }

    fn check_key(key: &str) -> Result<String> {
        let key = key.trim().to_ascii_uppercase();
        if key.is_empty() {
            return Err(MergeError::InvalidOption {
                key,
                reason: "empty option name".to_string(),
            });
        }
        if CREDENTIAL_KEYS.contains(&key.as_str()) {
            return Err(MergeError::InvalidOption {
                key,
                reason: "credentials are not configured through the environment".to_string(),
            });
        }
        Ok(key)
    }

    /// Look up an option, innermost scope first.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        let key = key.to_ascii_uppercase();
        self.scopes.iter().rev().find_map(|scope| scope.get(&key))
    }

    /// Set an option in the innermost scope.
    pub fn set(&mut self, key: &str, value: impl Into<ConfigValue>) -> Result<()> {
        let key = Self::check_key(key)?;
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(key, value.into());
        }
        Ok(())
    }

    /// Remove an option from the innermost scope, exposing any outer value.
    pub fn remove(&mut self, key: &str) -> Option<ConfigValue> {
        let key = key.to_ascii_uppercase();
        self.scopes.last_mut().and_then(|scope| scope.remove(&key))
    }

    /// Enter a nested scope holding `options`.
    ///
    /// The scope is exited when the returned guard is dropped, restoring
    /// every option to its previous value.
    pub fn scope<I, K, V>(&mut self, options: I) -> Result<EnvScope<'_>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ConfigValue>,
    {
        let mut scope = Scope::new();
        for (key, value) in options {
            scope.insert(Self::check_key(key.as_ref())?, value.into());
        }
        self.scopes.push(scope);
        Ok(EnvScope { env: self })
    }

    /// Number of scopes entered above the defaults.
    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    /// Effective options after applying every scope.
    pub fn options(&self) -> BTreeMap<String, ConfigValue> {
        let mut merged = BTreeMap::new();
        for scope in &self.scopes {
            for (key, value) in scope {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    // ========================================================================
    // Typed accessors for known options
    // ========================================================================

    /// Whether per-input debug logging is enabled.
    pub fn cpl_debug(&self) -> bool {
        self.get(CPL_DEBUG)
            .and_then(ConfigValue::as_bool)
            .unwrap_or(false)
    }

    /// Decoder buffer limit in bytes.
    pub fn decode_limit(&self) -> Result<u64> {
        match self.get(TIFF_DECODE_LIMIT) {
            None => Ok(DEFAULT_DECODE_LIMIT),
            Some(value) => value.as_u64().ok_or_else(|| MergeError::InvalidOption {
                key: TIFF_DECODE_LIMIT.to_string(),
                reason: format!("expected a byte count, got {value}"),
            }),
        }
    }

    /// Name of the configured resampling policy.
    pub fn resampling_name(&self) -> String {
        self.get(MERGE_RESAMPLING)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "nearest".to_string())
    }
}

/// Guard for a nested [`Env`] scope. Dereferences to the environment.
#[derive(Debug)]
pub struct EnvScope<'a> {
    env: &'a mut Env,
}

impl Deref for EnvScope<'_> {
    type Target = Env;

    fn deref(&self) -> &Env {
        self.env
    }
}

impl DerefMut for EnvScope<'_> {
    fn deref_mut(&mut self) -> &mut Env {
        self.env
    }
}

impl Drop for EnvScope<'_> {
    fn drop(&mut self) {
        self.env.scopes.pop();
    }
}

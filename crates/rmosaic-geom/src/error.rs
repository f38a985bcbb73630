//! Error types for the geometry crate.

use thiserror::Error;

/// Errors that can occur when building transforms or computing windows.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeomError {
    /// The coefficients do not describe a usable `(a, b, c, d, e, f)` transform.
    #[error("Invalid transform: {0}")]
    InvalidTransform(String),

    /// The transform cannot be inverted.
    #[error("Transform is not invertible (determinant {determinant})")]
    SingularTransform {
        /// Determinant `a*e - b*d` of the linear part.
        determinant: f64,
    },

    /// A bounding box contained non-finite or inverted coordinates.
    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),

    /// A window specification could not be evaluated.
    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    /// The windows passed to an intersection share no area.
    #[error("Windows do not intersect")]
    DisjointWindows,
}

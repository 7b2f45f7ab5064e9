//! Error types for configuration loading and access.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or reading configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// A required (non-optional) configuration source does not exist.
    #[error("Configuration source '{}' does not exist", .0.display())]
    MissingSource(PathBuf),

    /// A configuration source exists but could not be read.
    #[error("Failed to read configuration source '{}'", path.display())]
    Io {
        /// Path of the source
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A configuration source could not be parsed in its declared format.
    #[error("Failed to parse {format} configuration '{}': {reason}", path.display())]
    Parse {
        /// Path of the source
        path: PathBuf,
        /// Format the source was parsed as
        format: &'static str,
        /// Parser message
        reason: String,
    },

    /// A configuration value is present but has the wrong shape.
    #[error("Invalid configuration at '{pointer}': {reason}")]
    InvalidValue {
        /// JSON pointer of the offending value
        pointer: String,
        /// What was wrong with it
        reason: String,
    },
}

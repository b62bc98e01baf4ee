//! Settings loading errors.

use std::path::PathBuf;

/// Errors raised while reading or parsing the settings file.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("failed to read settings file {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The settings file is not valid JSON or does not match the schema.
    #[error("invalid settings in {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// An environment override could not be parsed.
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value found.
        value: String,
    },
}

/// Convenience alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

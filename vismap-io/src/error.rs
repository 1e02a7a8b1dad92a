//! I/O error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// A backing store, or the table expected inside it, is unavailable.
    #[error("resource unavailable: {}: {reason}", path.display())]
    MissingResource { path: PathBuf, reason: String },

    /// Entry index past the end of a store.
    #[error("entry {index} out of range for {} ({len} entries)", path.display())]
    EntryOutOfRange {
        path: PathBuf,
        index: usize,
        len: usize,
    },

    /// A required input cannot be used; the run cannot continue.
    #[error("fatal input error: {}: {reason}", path.display())]
    FatalInput { path: PathBuf, reason: String },

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] vismap_core::Error),

    /// HDF5 library error.
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}

impl Error {
    pub(crate) fn missing(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::MissingResource {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn fatal(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::FatalInput {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

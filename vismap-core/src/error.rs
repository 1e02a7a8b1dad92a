//! Error types for vismap-core.

use crate::channel::{Level, Region};
use thiserror::Error;

/// Result type alias for vismap operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for vismap operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A hierarchical channel coordinate exceeds its region's cardinality.
    #[error("{level} index {index} out of range for {region} region (limit {limit})")]
    IndexOutOfRange {
        region: Region,
        level: Level,
        index: i64,
        limit: u32,
    },

    /// Detector-side anode identifier with no region assignment.
    #[error("unknown anode identifier: {0}")]
    UnknownAnode(i32),

    /// Process class outside the closed enumeration.
    #[error("invalid process class: {0}")]
    InvalidProcessClass(u8),

    /// The open emission point was already finalized.
    #[error("emission point finalized twice")]
    DoubleFinalize,

    /// Flat record buffer with the wrong number of values.
    #[error("record length mismatch: expected {expected} values, found {found}")]
    RecordLength { expected: usize, found: usize },

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

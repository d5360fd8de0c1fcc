//! Errors in the library.
use thiserror::Error;

/// Errors raised while building windows and batches.
#[derive(Error, Debug, PartialEq)]
pub enum DtError {
    /// Two fields that must be aligned have different lengths or widths.
    #[error("Shape mismatch in {field}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Name of the offending field.
        field: String,
        /// Expected length or width.
        expected: usize,
        /// Observed length or width.
        actual: usize,
    },

    /// A window start index lies outside the episode.
    #[error("Start index {index} is out of range for an episode of length {len}")]
    StartIndexOutOfRange {
        /// Requested start index.
        index: usize,
        /// Episode length.
        len: usize,
    },

    /// Collation was requested for an empty list of episodes.
    #[error("Cannot build a batch from zero episodes")]
    EmptyBatch,

    /// A configuration value is out of its valid range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A key is missing in a [`Record`](crate::record::Record).
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// A value in a [`Record`](crate::record::Record) has an unexpected type.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),

    /// The return computation produced NaN or infinity.
    #[error("Non-finite return-to-go at timestep {0}")]
    NonFiniteReturn(usize),
}

impl DtError {
    /// Shorthand for [`DtError::ShapeMismatch`].
    pub fn shape(field: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            field: field.into(),
            expected,
            actual,
        }
    }
}

//! Error types for the vector crate.

use std::time::Duration;

use kestreldb_core::CoreError;
use thiserror::Error;

/// Errors that can occur in vector storage, index builds and search.
///
/// The error is `Clone` so that the outcome of a build can be handed to every
/// waiter of the same [`BuildHandle`](crate::builder::BuildHandle).
#[derive(Debug, Clone, Error)]
pub enum VectorError {
    /// Dimension mismatch between a vector and its field.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The expected dimension.
        expected: usize,
        /// The actual dimension.
        actual: usize,
    },

    /// Invalid dimension (e.g., zero, or a binary dimension not divisible by 8).
    #[error("invalid dimension {actual}: {reason}")]
    InvalidDimension {
        /// The rejected dimension.
        actual: usize,
        /// Why the dimension was rejected.
        reason: &'static str,
    },

    /// Invalid value in a vector (NaN, Infinity).
    #[error("invalid value at index {index}: {value} - {reason}")]
    InvalidValue {
        /// The index of the invalid value.
        index: usize,
        /// The invalid value.
        value: f32,
        /// The reason the value is invalid.
        reason: &'static str,
    },

    /// A vector of the wrong kind (float given for a binary field, or the reverse).
    #[error("field '{field}' expects {expected} vectors")]
    WrongVectorKind {
        /// The field name.
        field: String,
        /// The kind the field stores.
        expected: &'static str,
    },

    /// A name failed validation.
    #[error(transparent)]
    InvalidName(#[from] CoreError),

    /// A build or search parameter is malformed or out of range.
    #[error("invalid parameter '{param}': {reason}")]
    InvalidParameter {
        /// The offending parameter.
        param: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The index type cannot be built on the field type.
    #[error("index type {index_type} is not supported on {field_type} fields")]
    UnsupportedIndex {
        /// The requested index type.
        index_type: String,
        /// The field type it was requested on.
        field_type: String,
    },

    /// Attempted to append to a sealed segment.
    #[error("segment {0} is sealed")]
    SegmentSealed(u64),

    /// The build did not finish before its deadline.
    #[error("index build timed out after {0:?}")]
    BuildTimeout(Duration),

    /// The build was cancelled before it finished.
    #[error("index build cancelled")]
    BuildCancelled,

    /// The build failed for an internal reason.
    #[error("index build failed: {0}")]
    BuildFailed(String),

    /// Lock poisoned - indicates concurrent panic corrupted the data structure.
    #[error("index corrupted: lock poisoned due to prior panic in another thread")]
    LockPoisoned,
}

impl VectorError {
    /// Shorthand for [`VectorError::InvalidParameter`].
    pub(crate) fn invalid_param(param: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter { param: param.into(), reason: reason.into() }
    }
}

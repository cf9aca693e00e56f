//! Error types for the main database crate.

use std::time::Duration;

use kestreldb_core::CoreError;
use kestreldb_vector::VectorError;
use thiserror::Error;

/// Errors returned by [`Database`](crate::Database) and [`Session`](crate::Session).
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The session is not connected.
    #[error("not connected to a database")]
    Connection,

    /// The collection does not exist.
    #[error("collection '{0}' not found")]
    CollectionNotFound(String),

    /// The partition does not exist.
    #[error("partition '{tag}' not found in collection '{collection}'")]
    PartitionNotFound {
        /// Collection name.
        collection: String,
        /// Partition tag.
        tag: String,
    },

    /// The field does not exist.
    #[error("field '{field}' not found in collection '{collection}'")]
    FieldNotFound {
        /// Collection name.
        collection: String,
        /// Field name.
        field: String,
    },

    /// A name, index parameter or search parameter is invalid.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The index type cannot be built on the field type.
    #[error("index type {index_type} is not supported on {field_type} fields")]
    UnsupportedIndex {
        /// Requested index type.
        index_type: String,
        /// Type of the target field.
        field_type: String,
    },

    /// An index build ran past its deadline.
    #[error("index build timed out after {0:?}")]
    BuildTimeout(Duration),

    /// An index build was cancelled.
    #[error("index build cancelled")]
    BuildCancelled,

    /// An index build failed.
    #[error("index build failed: {0}")]
    BuildFailed(String),

    /// A vector does not have the field's dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Declared dimension.
        expected: usize,
        /// Provided dimension.
        actual: usize,
    },

    /// A vector value is malformed.
    #[error("invalid vector: {0}")]
    InvalidVector(String),

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Discriminant of [`Error`], for matching without fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::Connection`].
    Connection,
    /// See [`Error::CollectionNotFound`].
    CollectionNotFound,
    /// See [`Error::PartitionNotFound`].
    PartitionNotFound,
    /// See [`Error::FieldNotFound`].
    FieldNotFound,
    /// See [`Error::InvalidParameter`].
    InvalidParameter,
    /// See [`Error::UnsupportedIndex`].
    UnsupportedIndex,
    /// See [`Error::BuildTimeout`].
    BuildTimeout,
    /// See [`Error::BuildCancelled`].
    BuildCancelled,
    /// See [`Error::BuildFailed`].
    BuildFailed,
    /// See [`Error::DimensionMismatch`].
    DimensionMismatch,
    /// See [`Error::InvalidVector`].
    InvalidVector,
    /// See [`Error::Internal`].
    Internal,
}

impl Error {
    /// The error's kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection => ErrorKind::Connection,
            Self::CollectionNotFound(_) => ErrorKind::CollectionNotFound,
            Self::PartitionNotFound { .. } => ErrorKind::PartitionNotFound,
            Self::FieldNotFound { .. } => ErrorKind::FieldNotFound,
            Self::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Self::UnsupportedIndex { .. } => ErrorKind::UnsupportedIndex,
            Self::BuildTimeout(_) => ErrorKind::BuildTimeout,
            Self::BuildCancelled => ErrorKind::BuildCancelled,
            Self::BuildFailed(_) => ErrorKind::BuildFailed,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::InvalidVector(_) => ErrorKind::InvalidVector,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }
}

impl From<CoreError> for Error {
    fn from(e: CoreError) -> Self {
        Self::InvalidParameter(e.to_string())
    }
}

impl From<VectorError> for Error {
    fn from(e: VectorError) -> Self {
        match e {
            VectorError::DimensionMismatch { expected, actual } => Self::DimensionMismatch { expected, actual },
            VectorError::InvalidDimension { .. }
            | VectorError::InvalidValue { .. }
            | VectorError::WrongVectorKind { .. } => Self::InvalidVector(e.to_string()),
            VectorError::InvalidName(e) => e.into(),
            VectorError::InvalidParameter { .. } => Self::InvalidParameter(e.to_string()),
            VectorError::UnsupportedIndex { index_type, field_type } => {
                Self::UnsupportedIndex { index_type, field_type }
            }
            VectorError::BuildTimeout(timeout) => Self::BuildTimeout(timeout),
            VectorError::BuildCancelled => Self::BuildCancelled,
            VectorError::BuildFailed(reason) => Self::BuildFailed(reason),
            VectorError::SegmentSealed(_) | VectorError::LockPoisoned => Self::Internal(e.to_string()),
        }
    }
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, Error>;

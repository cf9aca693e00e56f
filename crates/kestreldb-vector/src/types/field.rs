//! Vector field schemas.

use std::fmt;

use kestreldb_core::FieldName;
use serde::{Deserialize, Serialize};

use crate::distance::Metric;
use crate::error::VectorError;

/// Maximum supported vector dimension.
pub const MAX_DIMENSION: usize = 32_768;

/// The kind of vectors a field stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Dense `f32` vectors.
    FloatVector,
    /// Bit vectors, supplied as `dimension / 8` bytes.
    BinaryVector,
}

impl FieldType {
    /// The metric a field of this type uses unless told otherwise.
    #[must_use]
    pub const fn default_metric(self) -> Metric {
        match self {
            Self::FloatVector => Metric::L2,
            Self::BinaryVector => Metric::Jaccard,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FloatVector => f.write_str("float vector"),
            Self::BinaryVector => f.write_str("binary vector"),
        }
    }
}

/// Schema of one vector field of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Field name.
    pub name: FieldName,
    /// Vector kind.
    pub field_type: FieldType,
    /// Number of components (float) or bits (binary).
    pub dimension: usize,
    /// Metric used for search when a request does not override it.
    pub metric: Metric,
}

impl FieldSchema {
    /// Create a field schema with the default metric for its type.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::InvalidDimension`] if the dimension is zero,
    /// exceeds [`MAX_DIMENSION`], or is not a multiple of 8 for binary fields.
    pub fn new(
        name: FieldName,
        field_type: FieldType,
        dimension: usize,
    ) -> Result<Self, VectorError> {
        if dimension == 0 {
            return Err(VectorError::InvalidDimension {
                actual: dimension,
                reason: "dimension must be positive",
            });
        }
        if dimension > MAX_DIMENSION {
            return Err(VectorError::InvalidDimension {
                actual: dimension,
                reason: "dimension exceeds 32768",
            });
        }
        if field_type == FieldType::BinaryVector && dimension % 8 != 0 {
            return Err(VectorError::InvalidDimension {
                actual: dimension,
                reason: "binary dimension must be a multiple of 8",
            });
        }
        Ok(Self { name, field_type, dimension, metric: field_type.default_metric() })
    }

    /// Replace the field's default metric.
    ///
    /// # Errors
    ///
    /// Returns an error if the metric does not apply to this field type.
    pub fn with_metric(mut self, metric: Metric) -> Result<Self, VectorError> {
        metric.check_field(self.field_type)?;
        self.metric = metric;
        Ok(self)
    }

    /// Encoded size of one value of this field in bytes.
    #[must_use]
    pub const fn row_bytes(&self) -> usize {
        match self.field_type {
            FieldType::FloatVector => self.dimension * std::mem::size_of::<f32>(),
            FieldType::BinaryVector => self.dimension / 8,
        }
    }

    /// Number of `u64` words one binary value occupies once packed.
    #[must_use]
    pub const fn words_per_row(&self) -> usize {
        self.dimension.div_ceil(64)
    }
}

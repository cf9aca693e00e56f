//! Vector values as supplied by callers.

use serde::{Deserialize, Serialize};

use crate::error::VectorError;
use crate::types::{FieldSchema, FieldType};

/// One vector value for one field of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VectorData {
    /// Dense floating-point vector.
    Float(Vec<f32>),
    /// Bit vector, `dimension / 8` bytes, least significant bit first.
    Binary(Vec<u8>),
}

impl VectorData {
    /// The dimension of the vector (number of bits for binary vectors).
    #[must_use]
    pub fn dimension(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Binary(v) => v.len() * 8,
        }
    }

    /// Check that this value fits the field: right kind, right dimension,
    /// and only finite components.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::WrongVectorKind`], [`VectorError::DimensionMismatch`]
    /// or [`VectorError::InvalidValue`].
    pub fn validate_for(&self, field: &FieldSchema) -> Result<(), VectorError> {
        match (self, field.field_type) {
            (Self::Float(values), FieldType::FloatVector) => {
                if values.len() != field.dimension {
                    return Err(VectorError::DimensionMismatch {
                        expected: field.dimension,
                        actual: values.len(),
                    });
                }
                if let Some((index, &value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
                    return Err(VectorError::InvalidValue {
                        index,
                        value,
                        reason: if value.is_nan() {
                            "NaN values are not allowed"
                        } else {
                            "Infinite values are not allowed"
                        },
                    });
                }
                Ok(())
            }
            (Self::Binary(bytes), FieldType::BinaryVector) => {
                if bytes.len() != field.row_bytes() {
                    return Err(VectorError::DimensionMismatch {
                        expected: field.dimension,
                        actual: bytes.len() * 8,
                    });
                }
                Ok(())
            }
            (Self::Float(_), FieldType::BinaryVector) => Err(VectorError::WrongVectorKind {
                field: field.name.to_string(),
                expected: "binary",
            }),
            (Self::Binary(_), FieldType::FloatVector) => Err(VectorError::WrongVectorKind {
                field: field.name.to_string(),
                expected: "float",
            }),
        }
    }
}

/// Pack bytes into little-endian `u64` words for popcount kernels.
#[must_use]
pub fn pack_binary(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks(8)
        .map(|chunk| {
            chunk.iter().enumerate().fold(0u64, |word, (i, &b)| word | (u64::from(b) << (i * 8)))
        })
        .collect()
}

/// A borrowed query vector in the layout artifacts search over.
#[derive(Debug, Clone, Copy)]
pub enum QueryRef<'a> {
    /// Float query.
    Float(&'a [f32]),
    /// Packed binary query.
    Binary(&'a [u64]),
}

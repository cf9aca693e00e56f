//! Column storage for one vector field.

use std::ops::Range;

use crate::error::VectorError;
use crate::types::{pack_binary, FieldSchema, FieldType, QueryRef, VectorData};

/// Contiguous vectors of one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Row-major `f32` values.
    Float {
        /// Components per row.
        dimension: usize,
        /// `rows * dimension` values.
        values: Vec<f32>,
    },
    /// Row-major packed bits.
    Binary {
        /// `u64` words per row.
        words_per_row: usize,
        /// `rows * words_per_row` words.
        words: Vec<u64>,
    },
}

impl Column {
    /// An empty column for the field.
    #[must_use]
    pub fn empty(field: &FieldSchema) -> Self {
        match field.field_type {
            FieldType::FloatVector => Self::Float { dimension: field.dimension, values: Vec::new() },
            FieldType::BinaryVector => {
                Self::Binary { words_per_row: field.words_per_row(), words: Vec::new() }
            }
        }
    }

    /// Validate every value against the field and pack them into a column.
    ///
    /// # Errors
    ///
    /// Returns the first validation error; no partial column is produced.
    pub fn from_values(field: &FieldSchema, values: &[VectorData]) -> Result<Self, VectorError> {
        let mut column = Self::empty(field);
        for value in values {
            value.validate_for(field)?;
        }
        match &mut column {
            Self::Float { values: out, dimension } => {
                out.reserve(values.len() * *dimension);
                for value in values {
                    if let VectorData::Float(v) = value {
                        out.extend_from_slice(v);
                    }
                }
            }
            Self::Binary { words, words_per_row } => {
                words.reserve(values.len() * *words_per_row);
                for value in values {
                    if let VectorData::Binary(bytes) = value {
                        words.extend(pack_binary(bytes));
                    }
                }
            }
        }
        Ok(column)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Float { dimension, values } => values.len() / (*dimension).max(1),
            Self::Binary { words_per_row, words } => words.len() / (*words_per_row).max(1),
        }
    }

    /// Whether the column has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes held by the column.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Float { values, .. } => values.len() * std::mem::size_of::<f32>(),
            Self::Binary { words, .. } => words.len() * std::mem::size_of::<u64>(),
        }
    }

    /// Borrow one row as a query-shaped reference.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<QueryRef<'_>> {
        match self {
            Self::Float { dimension, values } => {
                let start = index.checked_mul(*dimension)?;
                values.get(start..start + dimension).map(QueryRef::Float)
            }
            Self::Binary { words_per_row, words } => {
                let start = index.checked_mul(*words_per_row)?;
                words.get(start..start + words_per_row).map(QueryRef::Binary)
            }
        }
    }

    /// Append rows of another column of the same kind.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::DimensionMismatch`] if the columns disagree in
    /// kind or width.
    pub fn extend_from(&mut self, other: &Self, rows: Range<usize>) -> Result<(), VectorError> {
        match (self, other) {
            (
                Self::Float { dimension, values },
                Self::Float { dimension: other_dim, values: other_values },
            ) if dimension == other_dim => {
                values.extend_from_slice(&other_values[rows.start * *dimension..rows.end * *dimension]);
                Ok(())
            }
            (
                Self::Binary { words_per_row, words },
                Self::Binary { words_per_row: other_width, words: other_words },
            ) if words_per_row == other_width => {
                words.extend_from_slice(
                    &other_words[rows.start * *words_per_row..rows.end * *words_per_row],
                );
                Ok(())
            }
            (this, other) => Err(VectorError::DimensionMismatch {
                expected: this.width(),
                actual: other.width(),
            }),
        }
    }

    fn width(&self) -> usize {
        match self {
            Self::Float { dimension, .. } => *dimension,
            Self::Binary { words_per_row, .. } => words_per_row * 64,
        }
    }
}

//! Exact K-Nearest Neighbors operator.
//!
//! Performs brute force k-NN search by computing the distance to every row.
//! Used for growing segments, segments without an index, and FLAT indexes.

use kestreldb_core::EntityId;

use super::{Neighbor, TopK};
use crate::distance::Metric;
use crate::error::VectorError;
use crate::segment::Column;
use crate::types::QueryRef;

/// Exact k-NN search over a column.
///
/// # Complexity
///
/// O(n * d) where n is the number of rows and d is the dimension.
#[derive(Debug, Clone, Copy)]
pub struct ExactKnn {
    metric: Metric,
    k: usize,
}

impl ExactKnn {
    /// Create a k-nearest search with the given metric.
    #[must_use]
    pub const fn new(metric: Metric, k: usize) -> Self {
        Self { metric, k }
    }

    /// Scan every row of `column`; `ids[i]` identifies row `i`.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::DimensionMismatch`] if the query does not match
    /// the column's kind or width.
    pub fn search(
        &self,
        ids: &[EntityId],
        column: &Column,
        query: QueryRef<'_>,
    ) -> Result<Vec<Neighbor>, VectorError> {
        let mut top = TopK::new(self.k);
        match (column, query) {
            (Column::Float { dimension, values }, QueryRef::Float(q)) => {
                if q.len() != *dimension {
                    return Err(VectorError::DimensionMismatch { expected: *dimension, actual: q.len() });
                }
                for (&id, row) in ids.iter().zip(values.chunks_exact(*dimension)) {
                    top.push(id, self.metric.score_float(q, row));
                }
            }
            (Column::Binary { words_per_row, words }, QueryRef::Binary(q)) => {
                if q.len() != *words_per_row {
                    return Err(VectorError::DimensionMismatch {
                        expected: words_per_row * 64,
                        actual: q.len() * 64,
                    });
                }
                for (&id, row) in ids.iter().zip(words.chunks_exact(*words_per_row)) {
                    top.push(id, self.metric.score_binary(q, row));
                }
            }
            (Column::Float { dimension, .. }, QueryRef::Binary(q)) => {
                return Err(VectorError::DimensionMismatch { expected: *dimension, actual: q.len() * 64 });
            }
            (Column::Binary { words_per_row, .. }, QueryRef::Float(q)) => {
                return Err(VectorError::DimensionMismatch {
                    expected: words_per_row * 64,
                    actual: q.len(),
                });
            }
        }
        Ok(top.into_sorted_vec())
    }
}

//! Column-oriented insert batches.

use std::collections::BTreeMap;

use kestreldb_core::EntityId;
use kestreldb_vector::VectorData;

/// Rows to insert: one value per vector field per row, and optionally
/// caller-assigned ids.
///
/// # Example
///
/// ```
/// use kestreldb::Entities;
///
/// let entities = Entities::new()
///     .float_vectors("embedding", vec![vec![0.1, 0.2], vec![0.3, 0.4]])
///     .with_ids(vec![10, 11]);
/// assert_eq!(entities.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Entities {
    pub(crate) ids: Option<Vec<EntityId>>,
    pub(crate) fields: BTreeMap<String, Vec<VectorData>>,
}

impl Entities {
    /// Create an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign ids instead of letting the database generate them.
    #[must_use]
    pub fn with_ids(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.ids = Some(ids.into_iter().map(EntityId::new).collect());
        self
    }

    /// Set the values of one field.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, values: Vec<VectorData>) -> Self {
        self.fields.insert(field.into(), values);
        self
    }

    /// Set the values of a float vector field.
    #[must_use]
    pub fn float_vectors(self, field: impl Into<String>, vectors: Vec<Vec<f32>>) -> Self {
        self.with_field(field, vectors.into_iter().map(VectorData::Float).collect())
    }

    /// Set the values of a binary vector field, packed 8 dimensions per byte.
    #[must_use]
    pub fn binary_vectors(self, field: impl Into<String>, vectors: Vec<Vec<u8>>) -> Self {
        self.with_field(field, vectors.into_iter().map(VectorData::Binary).collect())
    }

    /// Number of rows, taken from the longest field.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.values().map(Vec::len).max().unwrap_or(0)
    }

    /// Whether the batch holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

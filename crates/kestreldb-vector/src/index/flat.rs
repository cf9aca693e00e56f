//! FLAT artifact: an immutable copy of the segment searched exactly.

use kestreldb_core::EntityId;

use super::{IndexType, SearchParams, SegmentIndex};
use crate::distance::Metric;
use crate::error::VectorError;
use crate::ops::{ExactKnn, Neighbor};
use crate::segment::Column;
use crate::types::QueryRef;

/// Exact-search artifact.
#[derive(Debug)]
pub struct FlatIndex {
    ids: Vec<EntityId>,
    column: Column,
    metric: Metric,
}

impl FlatIndex {
    /// Copy a segment column into a flat artifact.
    #[must_use]
    pub fn build(ids: &[EntityId], column: &Column, metric: Metric) -> Self {
        Self { ids: ids.to_vec(), column: column.clone(), metric }
    }
}

impl SegmentIndex for FlatIndex {
    fn index_type(&self) -> IndexType {
        IndexType::Flat
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn search(
        &self,
        query: QueryRef<'_>,
        k: usize,
        _params: &SearchParams,
    ) -> Result<Vec<Neighbor>, VectorError> {
        ExactKnn::new(self.metric, k).search(&self.ids, &self.column, query)
    }
}

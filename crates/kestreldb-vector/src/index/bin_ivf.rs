//! BIN_IVF_FLAT artifact: inverted lists over packed bit vectors.

use kestreldb_core::EntityId;
use tracing::debug;

use super::{IndexSpec, IndexType, SearchParams, SegmentIndex};
use crate::builder::BuildContext;
use crate::distance::Metric;
use crate::error::VectorError;
use crate::ops::{Neighbor, TopK};
use crate::quantization::{BinaryKMeans, KMeansConfig};
use crate::types::QueryRef;

#[derive(Debug, Default)]
struct BinaryList {
    ids: Vec<EntityId>,
    words: Vec<u64>,
}

/// Inverted-file artifact over a binary field.
#[derive(Debug)]
pub struct BinaryIvfIndex {
    metric: Metric,
    words_per_row: usize,
    coarse: Option<BinaryKMeans>,
    lists: Vec<BinaryList>,
    len: usize,
}

impl BinaryIvfIndex {
    /// Build over row-major packed `words`.
    ///
    /// # Errors
    ///
    /// Returns an error if training fails, or if the build is cancelled or
    /// times out.
    pub fn build(
        spec: &IndexSpec,
        metric: Metric,
        words_per_row: usize,
        ids: &[EntityId],
        words: &[u64],
        kmeans: &KMeansConfig,
        ctx: &BuildContext,
    ) -> Result<Self, VectorError> {
        if ids.is_empty() {
            return Ok(Self { metric, words_per_row, coarse: None, lists: Vec::new(), len: 0 });
        }

        let config = KMeansConfig { k: spec.nlist(), ..kmeans.clone() };
        let coarse = BinaryKMeans::train(words, words_per_row, &config, metric, ctx)?;
        let mut lists: Vec<BinaryList> = (0..coarse.len()).map(|_| BinaryList::default()).collect();

        for (row, (&id, vector)) in ids.iter().zip(words.chunks_exact(words_per_row)).enumerate() {
            if row % 1024 == 0 {
                ctx.checkpoint()?;
            }
            let list = &mut lists[coarse.nearest(vector)];
            list.ids.push(id);
            list.words.extend_from_slice(vector);
        }

        debug!(rows = ids.len(), nlist = lists.len(), metric = %metric, "built binary IVF artifact");
        Ok(Self { metric, words_per_row, coarse: Some(coarse), lists, len: ids.len() })
    }
}

impl SegmentIndex for BinaryIvfIndex {
    fn index_type(&self) -> IndexType {
        IndexType::BinIvfFlat
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn len(&self) -> usize {
        self.len
    }

    fn search(
        &self,
        query: QueryRef<'_>,
        k: usize,
        params: &SearchParams,
    ) -> Result<Vec<Neighbor>, VectorError> {
        let QueryRef::Binary(query) = query else {
            return Err(VectorError::WrongVectorKind { field: "BIN_IVF_FLAT".to_string(), expected: "binary" });
        };
        if query.len() != self.words_per_row {
            return Err(VectorError::DimensionMismatch {
                expected: self.words_per_row * 64,
                actual: query.len() * 64,
            });
        }
        let Some(coarse) = &self.coarse else {
            return Ok(Vec::new());
        };

        let mut top = TopK::new(k);
        let nprobe = params.nprobe_for(self.lists.len());
        let wanted = k.min(self.len);
        for (probed, cluster) in coarse.nearest_n(query, self.lists.len()).into_iter().enumerate() {
            // Lists past nprobe are scanned only while the result is short
            if probed >= nprobe && top.len() >= wanted {
                break;
            }
            let list = &self.lists[cluster];
            for (&id, v) in list.ids.iter().zip(list.words.chunks_exact(self.words_per_row)) {
                top.push(id, self.metric.score_binary(query, v));
            }
        }
        Ok(top.into_sorted_vec())
    }
}

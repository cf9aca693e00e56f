//! IVF artifacts for float fields: IVF_FLAT, IVF_SQ8 and IVF_PQ.
//!
//! A coarse k-means quantizer partitions the segment into `nlist` inverted
//! lists. A search scores the query against every centroid, scans the
//! `nprobe` best lists and keeps the top `k` rows. When those lists hold
//! fewer than `k` rows, the next-nearest lists are scanned until `k` rows
//! (or every row) have been seen.

use kestreldb_core::EntityId;
use tracing::debug;

use super::{IndexSpec, IndexType, SearchParams, SegmentIndex};
use crate::builder::BuildContext;
use crate::distance::Metric;
use crate::error::VectorError;
use crate::ops::{Neighbor, TopK};
use crate::quantization::{KMeans, KMeansConfig, ProductQuantizer, ScalarQuantizer};
use crate::types::QueryRef;

/// How rows are stored inside inverted lists.
#[derive(Debug, Clone)]
pub enum IvfEncoding {
    /// Raw `f32` vectors.
    Flat,
    /// 8-bit scalar codes.
    Sq8(ScalarQuantizer),
    /// Product-quantized codes.
    Pq(ProductQuantizer),
}

impl IvfEncoding {
    fn code_size(&self, dimension: usize) -> usize {
        match self {
            Self::Flat => dimension,
            Self::Sq8(_) => dimension,
            Self::Pq(pq) => pq.code_size(),
        }
    }
}

#[derive(Debug, Default)]
struct InvertedList {
    ids: Vec<EntityId>,
    /// Raw vectors, used by [`IvfEncoding::Flat`].
    vectors: Vec<f32>,
    /// Codes, used by the quantized encodings.
    codes: Vec<u8>,
}

/// Inverted-file artifact over a float field.
#[derive(Debug)]
pub struct IvfIndex {
    index_type: IndexType,
    metric: Metric,
    dimension: usize,
    coarse: Option<KMeans>,
    encoding: IvfEncoding,
    lists: Vec<InvertedList>,
    len: usize,
}

impl IvfIndex {
    /// Build an IVF artifact over row-major `vectors`.
    ///
    /// An empty segment yields an empty artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if training fails, or if the build is cancelled or
    /// times out.
    pub fn build(
        spec: &IndexSpec,
        metric: Metric,
        dimension: usize,
        ids: &[EntityId],
        vectors: &[f32],
        kmeans: &KMeansConfig,
        ctx: &BuildContext,
    ) -> Result<Self, VectorError> {
        let index_type = spec.index_type;
        if ids.is_empty() {
            return Ok(Self {
                index_type,
                metric,
                dimension,
                coarse: None,
                encoding: IvfEncoding::Flat,
                lists: Vec::new(),
                len: 0,
            });
        }

        let config = KMeansConfig { k: spec.nlist(), ..kmeans.clone() };
        let coarse = KMeans::train(vectors, dimension, &config, metric, ctx)?;

        let encoding = match index_type {
            IndexType::IvfSq8 => IvfEncoding::Sq8(ScalarQuantizer::train(vectors, dimension)?),
            IndexType::IvfPq => IvfEncoding::Pq(ProductQuantizer::train(
                vectors,
                dimension,
                spec.pq_m(),
                spec.nbits(),
                kmeans,
                metric,
                ctx,
            )?),
            _ => IvfEncoding::Flat,
        };

        let mut lists: Vec<InvertedList> = (0..coarse.len()).map(|_| InvertedList::default()).collect();
        for (row, (&id, vector)) in ids.iter().zip(vectors.chunks_exact(dimension)).enumerate() {
            if row % 1024 == 0 {
                ctx.checkpoint()?;
            }
            let list = &mut lists[coarse.nearest(vector)];
            list.ids.push(id);
            match &encoding {
                IvfEncoding::Flat => list.vectors.extend_from_slice(vector),
                IvfEncoding::Sq8(sq) => sq.encode_into(vector, &mut list.codes),
                IvfEncoding::Pq(pq) => pq.encode_into(vector, &mut list.codes),
            }
        }

        debug!(
            index_type = %index_type,
            rows = ids.len(),
            nlist = coarse.len(),
            iterations = coarse.iterations(),
            "built IVF artifact"
        );

        Ok(Self { index_type, metric, dimension, coarse: Some(coarse), encoding, lists, len: ids.len() })
    }

    /// Number of inverted lists.
    #[must_use]
    pub fn nlist(&self) -> usize {
        self.lists.len()
    }
}

impl SegmentIndex for IvfIndex {
    fn index_type(&self) -> IndexType {
        self.index_type
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
        let QueryRef::Float(query) = query else {
            return Err(VectorError::WrongVectorKind { field: self.index_type.to_string(), expected: "float" });
        };
        if query.len() != self.dimension {
            return Err(VectorError::DimensionMismatch { expected: self.dimension, actual: query.len() });
        }
        let Some(coarse) = &self.coarse else {
            return Ok(Vec::new());
        };

        let mut top = TopK::new(k);
        let nprobe = params.nprobe_for(self.lists.len());
        let wanted = k.min(self.len);
        let code_size = self.encoding.code_size(self.dimension);
        let table = match &self.encoding {
            IvfEncoding::Pq(pq) => pq.distance_table(query),
            _ => Vec::new(),
        };
        let mut scratch = vec![0.0f32; self.dimension];

        for (probed, cluster) in coarse.nearest_n(query, self.lists.len()).into_iter().enumerate() {
            // Lists past nprobe are scanned only while the result is short
            if probed >= nprobe && top.len() >= wanted {
                break;
            }
            let list = &self.lists[cluster];
            match &self.encoding {
                IvfEncoding::Flat => {
                    for (&id, v) in list.ids.iter().zip(list.vectors.chunks_exact(self.dimension)) {
                        top.push(id, self.metric.score_float(query, v));
                    }
                }
                IvfEncoding::Sq8(sq) => {
                    for (&id, code) in list.ids.iter().zip(list.codes.chunks_exact(code_size)) {
                        top.push(id, sq.score(self.metric, query, code, &mut scratch));
                    }
                }
                IvfEncoding::Pq(pq) => {
                    for (&id, code) in list.ids.iter().zip(list.codes.chunks_exact(code_size)) {
                        top.push(id, pq.score_with_table(&table, code));
                    }
                }
            }
        }

        Ok(top.into_sorted_vec())
    }
}

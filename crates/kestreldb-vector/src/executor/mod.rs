//! Query executor: fans a search out over segments and merges the results.
//!
//! For each segment the executor picks the fastest path that yields results
//! in the requested metric: the segment's active artifact when one exists
//! and was built for that metric, otherwise an exact scan. Per-segment
//! candidates are merged through one bounded heap per query.

use std::sync::Arc;
use std::thread;

use kestreldb_core::{CollectionName, EntityId, PartitionTag};
use serde::Serialize;
use tracing::debug;

use crate::distance::Metric;
use crate::error::VectorError;
use crate::index::{ArtifactHandle, FieldKey, IndexRegistry, SearchParams, MAX_TOP_K};
use crate::ops::{ExactKnn, Neighbor, TopK};
use crate::segment::{SegmentSnapshot, SegmentState};
use crate::types::{pack_binary, FieldSchema, QueryRef, VectorData};

/// Queries per batch at which the executor splits work across threads.
const PARALLEL_QUERY_THRESHOLD: usize = 64;

/// Supplies the segments a search runs over.
pub trait SegmentCatalog {
    /// Snapshots of every segment in `partitions`, or in all partitions
    /// when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the segments cannot be read.
    fn segments(&self, partitions: Option<&[PartitionTag]>) -> Result<Vec<SegmentSnapshot>, VectorError>;
}

/// A batch of queries against one vector field.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Queries, all of the field's kind and dimension.
    pub queries: Vec<VectorData>,
    /// Neighbors per query.
    pub top_k: usize,
    /// Restrict the search to these partitions.
    pub partition_tags: Option<Vec<PartitionTag>>,
    /// Search-time parameters.
    pub params: SearchParams,
}

impl SearchRequest {
    /// Search all partitions with default parameters.
    #[must_use]
    pub fn new(queries: Vec<VectorData>, top_k: usize) -> Self {
        Self { queries, top_k, partition_tags: None, params: SearchParams::new() }
    }

    /// Restrict the search to `tags`.
    #[must_use]
    pub fn with_partitions(mut self, tags: Vec<PartitionTag>) -> Self {
        self.partition_tags = Some(tags);
        self
    }

    /// Set search parameters.
    #[must_use]
    pub const fn with_params(mut self, params: SearchParams) -> Self {
        self.params = params;
        self
    }
}

/// One result row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchHit {
    /// Matching entity.
    pub id: EntityId,
    /// Distance in the search metric. For `IP` this is the inner product.
    pub distance: f32,
}

enum PreparedQuery<'a> {
    Float(&'a [f32]),
    Binary(Vec<u64>),
}

impl PreparedQuery<'_> {
    fn as_ref(&self) -> QueryRef<'_> {
        match self {
            Self::Float(v) => QueryRef::Float(v),
            Self::Binary(words) => QueryRef::Binary(words),
        }
    }
}

struct SegmentPlan {
    snapshot: SegmentSnapshot,
    artifact: Option<ArtifactHandle>,
}

/// Executes searches against the segments of one collection.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    registry: Arc<IndexRegistry>,
}

impl QueryExecutor {
    /// Create an executor reading active artifacts from `registry`.
    #[must_use]
    pub const fn new(registry: Arc<IndexRegistry>) -> Self {
        Self { registry }
    }

    /// Run `request` against `field` of `collection`.
    ///
    /// Returns one list per query, each holding up to `top_k` hits ordered
    /// best first.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::InvalidParameter`] for an out-of-range `top_k`
    /// or search parameter, or a metric the field does not support, and a
    /// dimension or kind error for a malformed query.
    pub fn execute(
        &self,
        collection: &CollectionName,
        field: &FieldSchema,
        catalog: &dyn SegmentCatalog,
        request: &SearchRequest,
    ) -> Result<Vec<Vec<SearchHit>>, VectorError> {
        if request.top_k == 0 || request.top_k > MAX_TOP_K {
            return Err(VectorError::invalid_param(
                "top_k",
                format!("{} is outside 1..={MAX_TOP_K}", request.top_k),
            ));
        }
        request.params.validate(request.top_k)?;

        let key = FieldKey::new(collection.clone(), field.name.clone());
        let metric = match request.params.metric {
            Some(metric) => metric,
            None => self.registry.descriptor(&key)?.map_or(field.metric, |d| d.spec.metric_for(field)),
        };
        metric.check_field(field.field_type)?;

        let queries = request
            .queries
            .iter()
            .map(|q| {
                q.validate_for(field)?;
                Ok(match q {
                    VectorData::Float(v) => PreparedQuery::Float(v),
                    VectorData::Binary(bytes) => PreparedQuery::Binary(pack_binary(bytes)),
                })
            })
            .collect::<Result<Vec<_>, VectorError>>()?;

        let mut plans = Vec::new();
        for snapshot in catalog.segments(request.partition_tags.as_deref())? {
            if snapshot.data.row_count() == 0 {
                continue;
            }
            let artifact = if snapshot.state == SegmentState::Sealed {
                self.registry.get_active(&key, &snapshot.key)?.filter(|a| a.metric() == metric)
            } else {
                None
            };
            plans.push(SegmentPlan { snapshot, artifact });
        }

        debug!(
            collection = %collection,
            field = %field.name,
            nq = queries.len(),
            top_k = request.top_k,
            segments = plans.len(),
            indexed = plans.iter().filter(|p| p.artifact.is_some()).count(),
            %metric,
            "executing search"
        );

        let search_one = |query: &PreparedQuery<'_>| {
            search_segments(field, metric, &plans, query.as_ref(), request.top_k, &request.params)
        };

        let workers = thread::available_parallelism().map_or(1, usize::from);
        if queries.len() < PARALLEL_QUERY_THRESHOLD || workers == 1 {
            return queries.iter().map(search_one).collect();
        }

        let chunk = queries.len().div_ceil(workers);
        thread::scope(|scope| {
            let tasks: Vec<_> = queries
                .chunks(chunk)
                .map(|part| scope.spawn(move || part.iter().map(search_one).collect::<Result<Vec<_>, _>>()))
                .collect();
            let mut results = Vec::with_capacity(queries.len());
            for task in tasks {
                let part = task
                    .join()
                    .map_err(|_| VectorError::BuildFailed("search worker panicked".to_string()))??;
                results.extend(part);
            }
            Ok(results)
        })
    }
}

fn search_segments(
    field: &FieldSchema,
    metric: Metric,
    plans: &[SegmentPlan],
    query: QueryRef<'_>,
    top_k: usize,
    params: &SearchParams,
) -> Result<Vec<SearchHit>, VectorError> {
    let mut merged = TopK::new(top_k);
    for plan in plans {
        let neighbors: Vec<Neighbor> = match &plan.artifact {
            Some(artifact) => artifact.search(query, top_k, params)?,
            None => {
                let column = plan.snapshot.data.column(&field.name).ok_or_else(|| {
                    VectorError::invalid_param(field.name.as_str(), "segment has no such field")
                })?;
                ExactKnn::new(metric, top_k).search(plan.snapshot.data.ids(), column, query)?
            }
        };
        merged.extend(neighbors);
    }
    Ok(merged
        .into_sorted_vec()
        .into_iter()
        .map(|n| SearchHit { id: n.id, distance: metric.to_distance(n.score) })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{build_artifact, BuildContext, CancellationToken};
    use crate::index::{CommitMode, IndexDescriptor, IndexSpec, IndexType};
    use crate::quantization::KMeansConfig;
    use crate::segment::{Column, ColumnBatch, Segment, SegmentKey};
    use crate::types::FieldType;
    use kestreldb_core::{FieldName, SegmentId};

    struct Segments(Vec<Segment>);

    impl SegmentCatalog for Segments {
        fn segments(&self, partitions: Option<&[PartitionTag]>) -> Result<Vec<SegmentSnapshot>, VectorError> {
            self.0
                .iter()
                .filter(|s| partitions.map_or(true, |tags| tags.contains(&s.key().partition)))
                .map(Segment::snapshot)
                .collect()
        }
    }

    fn collection() -> CollectionName {
        CollectionName::new("points").unwrap()
    }

    fn float_field() -> FieldSchema {
        FieldSchema::new(FieldName::new("v").unwrap(), FieldType::FloatVector, 2).unwrap()
    }

    fn segment(field: &FieldSchema, partition: &str, id: u64, rows: &[VectorData], sealed: bool) -> Segment {
        let key = SegmentKey::new(PartitionTag::new(partition).unwrap(), SegmentId::new(id));
        let segment = Segment::new(key, &[field.clone()], 1024);
        let ids: Vec<EntityId> = (0..rows.len() as u64).map(|i| EntityId::new(id * 100 + i)).collect();
        let mut batch = ColumnBatch::new();
        batch.insert(field.name.clone(), Column::from_values(field, rows).unwrap());
        segment.append(&ids, &batch, 0..rows.len()).unwrap();
        if sealed {
            segment.seal().unwrap();
        }
        segment
    }

    fn points(offset: f32) -> Vec<VectorData> {
        (0..10).map(|i| VectorData::Float(vec![offset + i as f32, 0.0])).collect()
    }

    #[test]
    fn test_merges_across_segments() {
        let field = float_field();
        let catalog = Segments(vec![
            segment(&field, "_default", 1, &points(0.0), true),
            segment(&field, "_default", 2, &points(0.5), false),
        ]);
        let executor = QueryExecutor::new(Arc::new(IndexRegistry::new()));
        let request = SearchRequest::new(vec![VectorData::Float(vec![3.0, 0.0])], 3);
        let results = executor.execute(&collection(), &field, &catalog, &request).unwrap();

        assert_eq!(results.len(), 1);
        let ids: Vec<u64> = results[0].iter().map(|h| h.id.as_u64()).collect();
        assert_eq!(ids[0], 103);
        assert!(ids.contains(&202) || ids.contains(&203));
        assert!(results[0].windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_uses_matching_artifact_only() {
        let field = float_field();
        let sealed = segment(&field, "_default", 1, &points(0.0), true);
        let snapshot = sealed.snapshot().unwrap();
        let catalog = Segments(vec![sealed]);
        let registry = Arc::new(IndexRegistry::new());
        let key = FieldKey::new(collection(), field.name.clone());

        let spec = IndexSpec::new(IndexType::IvfFlat).with_nlist(2);
        let artifact =
            build_artifact(&spec, &field, &snapshot.data, &KMeansConfig::new(2).with_seed(Some(1)), &BuildContext::unbounded())
                .unwrap()
                .unwrap();
        let ticket = registry.begin_build(&key, CancellationToken::new(), CommitMode::Replace).unwrap();
        registry
            .commit(&key, &ticket, &IndexDescriptor::unnamed(spec).unwrap(), vec![(snapshot.key.clone(), artifact)], CommitMode::Replace)
            .unwrap();

        let executor = QueryExecutor::new(registry);
        let params = SearchParams::new().with_nprobe(2);
        let request = SearchRequest::new(vec![VectorData::Float(vec![4.2, 0.0])], 1).with_params(params);
        let hits = executor.execute(&collection(), &field, &catalog, &request).unwrap();
        assert_eq!(hits[0][0].id, EntityId::new(104));

        // an IP override cannot use the L2 artifact and scans instead
        let ip = SearchRequest::new(vec![VectorData::Float(vec![1.0, 0.0])], 1)
            .with_params(SearchParams::new().with_metric(Metric::IP));
        let hits = executor.execute(&collection(), &field, &catalog, &ip).unwrap();
        assert_eq!(hits[0][0].id, EntityId::new(109));
        assert!((hits[0][0].distance - 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_partition_filter() {
        let field = float_field();
        let catalog = Segments(vec![
            segment(&field, "_default", 1, &points(0.0), true),
            segment(&field, "2024", 2, &points(100.0), true),
        ]);
        let executor = QueryExecutor::new(Arc::new(IndexRegistry::new()));
        let request = SearchRequest::new(vec![VectorData::Float(vec![0.0, 0.0])], 5)
            .with_partitions(vec![PartitionTag::new("2024").unwrap()]);
        let hits = executor.execute(&collection(), &field, &catalog, &request).unwrap();
        assert!(hits[0].iter().all(|h| h.id.as_u64() >= 200));
    }

    #[test]
    fn test_returns_one_list_per_query() {
        let field = float_field();
        let catalog = Segments(vec![segment(&field, "_default", 1, &points(0.0), true)]);
        let executor = QueryExecutor::new(Arc::new(IndexRegistry::new()));
        for nq in [1, 10, 200] {
            let queries = (0..nq).map(|i| VectorData::Float(vec![i as f32 * 0.1, 1.0])).collect();
            let hits = executor.execute(&collection(), &field, &catalog, &SearchRequest::new(queries, 20)).unwrap();
            assert_eq!(hits.len(), nq);
            assert!(hits.iter().all(|h| h.len() == 10));
        }
    }

    #[test]
    fn test_rejects_bad_requests() {
        let field = float_field();
        let catalog = Segments(vec![]);
        let executor = QueryExecutor::new(Arc::new(IndexRegistry::new()));
        let query = || vec![VectorData::Float(vec![0.0, 0.0])];

        let zero = SearchRequest::new(query(), 0);
        assert!(executor.execute(&collection(), &field, &catalog, &zero).is_err());
        let huge = SearchRequest::new(query(), MAX_TOP_K + 1);
        assert!(executor.execute(&collection(), &field, &catalog, &huge).is_err());
        let wrong_dim = SearchRequest::new(vec![VectorData::Float(vec![0.0; 3])], 1);
        assert!(matches!(
            executor.execute(&collection(), &field, &catalog, &wrong_dim),
            Err(VectorError::DimensionMismatch { .. })
        ));
        let binary_metric =
            SearchRequest::new(query(), 1).with_params(SearchParams::new().with_metric(Metric::Jaccard));
        assert!(executor.execute(&collection(), &field, &catalog, &binary_metric).is_err());
    }

    #[test]
    fn test_binary_jaccard_search() {
        let field = FieldSchema::new(FieldName::new("b").unwrap(), FieldType::BinaryVector, 8).unwrap();
        let rows = vec![VectorData::Binary(vec![0b1111_0000]), VectorData::Binary(vec![0b0000_1111])];
        let catalog = Segments(vec![segment(&field, "_default", 1, &rows, true)]);
        let executor = QueryExecutor::new(Arc::new(IndexRegistry::new()));
        let request = SearchRequest::new(vec![VectorData::Binary(vec![0b1110_0000])], 2);
        let hits = executor.execute(&collection(), &field, &catalog, &request).unwrap();
        assert_eq!(hits[0][0].id, EntityId::new(100));
        assert!((hits[0][0].distance - 0.25).abs() < 1e-6);
        assert!((hits[0][1].distance - 1.0).abs() < 1e-6);
    }
}

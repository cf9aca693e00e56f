//! `KestrelDB` Vector
//!
//! This crate provides the indexing and search engine of `KestrelDB`: storage
//! segments, index artifacts, the asynchronous index builder, the index
//! registry and the query executor.
//!
//! # Overview
//!
//! - **Segments**: bounded append-only batches of rows that are sealed once
//!   full or flushed
//! - **Index artifacts**: FLAT, IVF_FLAT, IVF_SQ8, IVF_PQ, HNSW and
//!   BIN_IVF_FLAT structures built over one sealed segment
//! - **Builder**: runs builds on a worker pool and commits them atomically
//! - **Registry**: tracks the active descriptor and artifacts per field
//! - **Executor**: searches each segment by its artifact or by exact scan and
//!   merges the results
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use kestreldb_core::{CollectionName, EntityId, FieldName, PartitionTag, SegmentId};
//! use kestreldb_vector::executor::{QueryExecutor, SearchRequest, SegmentCatalog};
//! use kestreldb_vector::segment::{Column, ColumnBatch, Segment, SegmentKey, SegmentSnapshot};
//! use kestreldb_vector::types::{FieldSchema, FieldType, VectorData};
//! use kestreldb_vector::{IndexRegistry, VectorError};
//!
//! struct One(Segment);
//!
//! impl SegmentCatalog for One {
//!     fn segments(&self, _: Option<&[PartitionTag]>) -> Result<Vec<SegmentSnapshot>, VectorError> {
//!         Ok(vec![self.0.snapshot()?])
//!     }
//! }
//!
//! let field = FieldSchema::new(FieldName::new("embedding")?, FieldType::FloatVector, 2)?;
//! let segment = Segment::new(SegmentKey::new(PartitionTag::default(), SegmentId::new(1)), &[field.clone()], 16);
//!
//! let rows = vec![VectorData::Float(vec![0.0, 0.0]), VectorData::Float(vec![1.0, 1.0])];
//! let mut batch = ColumnBatch::new();
//! batch.insert(field.name.clone(), Column::from_values(&field, &rows)?);
//! segment.append(&[EntityId::new(1), EntityId::new(2)], &batch, 0..2)?;
//!
//! let executor = QueryExecutor::new(Arc::new(IndexRegistry::new()));
//! let request = SearchRequest::new(vec![VectorData::Float(vec![0.9, 0.9])], 1);
//! let hits = executor.execute(&CollectionName::new("docs")?, &field, &One(segment), &request)?;
//! assert_eq!(hits[0][0].id.as_u64(), 2);
//! # Ok::<(), VectorError>(())
//! ```
//!
//! # Modules
//!
//! - [`segment`] - Storage segments and columns
//! - [`index`] - Index types, artifacts and the registry
//! - [`builder`] - Asynchronous index builds
//! - [`executor`] - Search fan-out and merging
//! - [`quantization`] - k-means, scalar and product quantizers
//! - [`distance`] - Float and binary metrics
//! - [`ops`] - Exact k-NN and top-k selection
//! - [`types`] - Field schemas and vector values
//! - [`error`] - Error types

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]

pub mod builder;
pub mod distance;
pub mod error;
pub mod executor;
pub mod index;
pub mod ops;
pub mod quantization;
pub mod segment;
pub mod types;

// Re-export commonly used types
pub use builder::{
    BuildCallback, BuildConfig, BuildHandle, BuildOutcome, BuildRequest, BuildResult, CancellationToken,
    IndexBuilder,
};
pub use distance::Metric;
pub use error::VectorError;
pub use executor::{QueryExecutor, SearchHit, SearchRequest, SegmentCatalog};
pub use index::{
    ArtifactHandle, CommitMode, DeferredBuild, FieldKey, IndexDescriptor, IndexRegistry, IndexSpec, IndexType,
    SealedRoute, SearchParams, SegmentIndex,
};
pub use segment::{Segment, SegmentKey, SegmentSnapshot, SegmentState};
pub use types::{FieldSchema, FieldType, VectorData};

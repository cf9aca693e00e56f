//! `KestrelDB`
//!
//! An embedded vector database: collections of vector fields split into
//! partitions and bounded segments, indexed asynchronously and searched by
//! nearest-neighbor queries.
//!
//! # Features
//!
//! - **Index types**: FLAT, IVF_FLAT, IVF_SQ8, IVF_PQ and HNSW on float
//!   fields; BIN_FLAT and BIN_IVF_FLAT on binary fields
//! - **Asynchronous builds**: indexes build on a worker pool; callers block,
//!   poll a [`BuildHandle`] or register a callback
//! - **Partitioned search**: results are merged across segments and
//!   optionally restricted to a set of partitions
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use kestreldb::{CollectionSchema, Config, CreateIndex, Database, Entities, SearchQuery, Session};
//! use serde_json::json;
//!
//! let session = Session::connect(Arc::new(Database::new(Config::default())?));
//! session.create_collection(CollectionSchema::new("songs")?.float_field("embedding", 3)?)?;
//!
//! let vectors = vec![vec![0.1, 0.2, 0.3], vec![0.9, 0.8, 0.7], vec![0.5, 0.5, 0.5]];
//! session.insert("songs", Entities::new().float_vectors("embedding", vectors), None)?;
//!
//! let handle = session.create_index_async(
//!     "songs",
//!     "embedding",
//!     CreateIndex::new(json!({"index_type": "HNSW", "params": {"M": 8, "efConstruction": 64}})),
//!     None,
//! )?;
//! handle.wait()?;
//!
//! let stats = session.get_collection_stats("songs")?;
//! assert_eq!(stats.row_count, 3);
//!
//! let hits = session.search("songs", &SearchQuery::float("embedding", vec![vec![1.0, 0.8, 0.7]], 2))?;
//! assert_eq!(hits[0].len(), 2);
//! # Ok::<(), kestreldb::Error>(())
//! ```

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]

mod collection;
pub mod config;
pub mod database;
mod entities;
pub mod error;
pub mod session;
pub mod stats;

pub use collection::CollectionSchema;
pub use config::Config;
pub use database::{CreateIndex, Database, SearchQuery};
pub use entities::Entities;
pub use error::{Error, ErrorKind, Result};
pub use session::Session;
pub use stats::{CollectionStats, PartitionStats, SegmentStats};

// Re-export the types callers need to build requests and read results
pub use kestreldb_core::{CollectionName, EntityId, FieldName, IndexName, PartitionTag, SegmentId};
pub use kestreldb_vector::{
    BuildCallback, BuildHandle, BuildOutcome, BuildResult, FieldSchema, FieldType, IndexDescriptor, IndexSpec,
    IndexType, Metric, SearchHit, SearchParams, SegmentState, VectorData, VectorError,
};

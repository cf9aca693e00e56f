//! Main database interface.
//!
//! [`Database`] is the collection/partition coordinator. It owns the
//! collections, the index registry, the build worker pool and the query
//! executor, and exposes the operations clients call.
//!
//! # Examples
//!
//! ```
//! use kestreldb::{CollectionSchema, Config, CreateIndex, Database, Entities, SearchQuery};
//! use serde_json::json;
//!
//! let db = Database::new(Config::default().build_workers(1))?;
//! db.create_collection(CollectionSchema::new("docs")?.float_field("embedding", 2)?)?;
//!
//! let rows = Entities::new().float_vectors("embedding", vec![vec![0.0, 0.0], vec![1.0, 1.0]]);
//! db.insert("docs", rows, None)?;
//! db.flush(&["docs"])?;
//!
//! db.create_index("docs", "embedding", CreateIndex::new(json!({"index_type": "IVF_FLAT", "nlist": 2})))?;
//!
//! let hits = db.search("docs", &SearchQuery::float("embedding", vec![vec![0.9, 0.9]], 1))?;
//! assert_eq!(hits[0][0].id.as_u64(), 2);
//! # Ok::<(), kestreldb::Error>(())
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use kestreldb_core::{CollectionName, EntityId, FieldName, IndexName, PartitionTag};
use kestreldb_vector::{
    BuildCallback, BuildHandle, BuildOutcome, BuildRequest, CommitMode, FieldKey, IndexBuilder,
    IndexDescriptor, IndexRegistry, IndexSpec, QueryExecutor, SealedRoute, SearchHit, SearchParams,
    SearchRequest, SegmentSnapshot, VectorData, VectorError,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::collection::{Collection, CollectionSchema};
use crate::config::Config;
use crate::entities::Entities;
use crate::error::{Error, Result};
use crate::stats::{CollectionStats, PartitionStats, SegmentStats};

/// Parameters of a `create_index` call.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndex {
    /// Index name; defaults to the index type name.
    pub index_name: Option<String>,
    /// `{"index_type": .., <build params>}`, flat or with a nested `params` object.
    pub params: Value,
}

impl CreateIndex {
    /// An index named after its type.
    #[must_use]
    pub const fn new(params: Value) -> Self {
        Self { index_name: None, params }
    }

    /// A named index.
    #[must_use]
    pub fn named(index_name: impl Into<String>, params: Value) -> Self {
        Self { index_name: Some(index_name.into()), params }
    }
}

/// A search against one vector field.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Field to search.
    pub field: String,
    /// Query vectors.
    pub query_vectors: Vec<VectorData>,
    /// Neighbors per query, `1..=16384`.
    pub top_k: usize,
    /// Restrict the search to these partitions.
    pub partition_tags: Option<Vec<String>>,
    /// Search-time parameters.
    pub params: SearchParams,
}

impl SearchQuery {
    /// Search `field` with the given query vectors.
    #[must_use]
    pub fn new(field: impl Into<String>, query_vectors: Vec<VectorData>, top_k: usize) -> Self {
        Self { field: field.into(), query_vectors, top_k, partition_tags: None, params: SearchParams::new() }
    }

    /// Search a float field.
    #[must_use]
    pub fn float(field: impl Into<String>, queries: Vec<Vec<f32>>, top_k: usize) -> Self {
        Self::new(field, queries.into_iter().map(VectorData::Float).collect(), top_k)
    }

    /// Search a binary field.
    #[must_use]
    pub fn binary(field: impl Into<String>, queries: Vec<Vec<u8>>, top_k: usize) -> Self {
        Self::new(field, queries.into_iter().map(VectorData::Binary).collect(), top_k)
    }

    /// Restrict the search to `tags`.
    #[must_use]
    pub fn with_partitions<S: Into<String>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.partition_tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Set search parameters.
    #[must_use]
    pub const fn with_params(mut self, params: SearchParams) -> Self {
        self.params = params;
        self
    }

    /// Parse search parameters from `{"nprobe": .., "ef": .., "metric_type": ..}`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for malformed values.
    pub fn with_params_json(mut self, params: &Value) -> Result<Self> {
        self.params = SearchParams::from_json(params)?;
        Ok(self)
    }
}

/// A build validated and ready to submit.
struct PreparedBuild {
    collection: Arc<Collection>,
    request: BuildRequest,
}

/// The `KestrelDB` database handle.
///
/// `Database` is `Send + Sync`; share it across threads with an [`Arc`].
/// Inserts, searches and any number of index builds run concurrently.
#[derive(Debug)]
pub struct Database {
    config: Config,
    collections: RwLock<HashMap<CollectionName, Arc<Collection>>>,
    registry: Arc<IndexRegistry>,
    builder: IndexBuilder,
    executor: QueryExecutor,
}

impl Database {
    /// Create an empty in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BuildFailed`] if the build worker pool cannot start.
    pub fn new(config: Config) -> Result<Self> {
        let registry = Arc::new(IndexRegistry::new());
        let builder = IndexBuilder::new(Arc::clone(&registry), config.build_config())?;
        let executor = QueryExecutor::new(Arc::clone(&registry));
        info!(build_workers = builder.workers(), "opened database");
        Ok(Self { config, collections: RwLock::new(HashMap::new()), registry, builder, executor })
    }

    /// The configuration this database was created with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        let name = CollectionName::new(name)?;
        let collections = self.collections.read().map_err(|_| VectorError::LockPoisoned)?;
        collections.get(&name).cloned().ok_or_else(|| Error::CollectionNotFound(name.to_string()))
    }

    // ========================================================================
    // Collections
    // ========================================================================

    /// Create a collection with a `_default` partition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if the schema is invalid or the
    /// collection already exists.
    pub fn create_collection(&self, schema: CollectionSchema) -> Result<()> {
        schema.validate()?;
        let mut collections = self.collections.write().map_err(|_| VectorError::LockPoisoned)?;
        if collections.contains_key(schema.name()) {
            return Err(Error::invalid(format!("collection '{}' already exists", schema.name())));
        }
        let collection = Collection::new(schema, self.config.default_index_file_size_mb);
        info!(
            collection = %collection.name(),
            fields = collection.schema().fields().len(),
            segment_capacity = collection.segment_capacity(),
            "created collection"
        );
        collections.insert(collection.name().clone(), Arc::new(collection));
        Ok(())
    }

    /// Drop a collection, its data and its indexes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollectionNotFound`] if it does not exist.
    pub fn drop_collection(&self, name: &str) -> Result<()> {
        let name = CollectionName::new(name)?;
        let removed = self.collections.write().map_err(|_| VectorError::LockPoisoned)?.remove(&name);
        if removed.is_none() {
            return Err(Error::CollectionNotFound(name.to_string()));
        }
        self.registry.remove_collection(&name)?;
        info!(collection = %name, "dropped collection");
        Ok(())
    }

    /// Whether a collection exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for an invalid name.
    pub fn has_collection(&self, name: &str) -> Result<bool> {
        let name = CollectionName::new(name)?;
        Ok(self.collections.read().map_err(|_| VectorError::LockPoisoned)?.contains_key(&name))
    }

    /// Names of all collections, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if a lock is poisoned.
    pub fn list_collections(&self) -> Result<Vec<String>> {
        let collections = self.collections.read().map_err(|_| VectorError::LockPoisoned)?;
        let mut names: Vec<String> = collections.keys().map(ToString::to_string).collect();
        names.sort();
        Ok(names)
    }

    /// The schema of a collection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollectionNotFound`] if it does not exist.
    pub fn describe_collection(&self, name: &str) -> Result<CollectionSchema> {
        Ok(self.collection(name)?.schema().clone())
    }

    // ========================================================================
    // Partitions
    // ========================================================================

    /// Create a partition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for an invalid or existing tag.
    pub fn create_partition(&self, collection: &str, tag: &str) -> Result<()> {
        let collection = self.collection(collection)?;
        collection.create_partition(PartitionTag::new(tag)?)?;
        info!(collection = %collection.name(), partition = tag, "created partition");
        Ok(())
    }

    /// Drop a partition with its segments and their artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PartitionNotFound`] if it does not exist, or
    /// [`Error::InvalidParameter`] for the default partition.
    pub fn drop_partition(&self, collection: &str, tag: &str) -> Result<()> {
        let collection = self.collection(collection)?;
        let tag = PartitionTag::new(tag)?;
        collection.drop_partition(&tag)?;
        self.registry.remove_partition(collection.name(), &tag)?;
        info!(collection = %collection.name(), partition = %tag, "dropped partition");
        Ok(())
    }

    /// Whether a partition exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollectionNotFound`] if the collection does not exist.
    pub fn has_partition(&self, collection: &str, tag: &str) -> Result<bool> {
        self.collection(collection)?.has_partition(&PartitionTag::new(tag)?)
    }

    /// Tags of every partition, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollectionNotFound`] if the collection does not exist.
    pub fn list_partitions(&self, collection: &str) -> Result<Vec<String>> {
        let tags = self.collection(collection)?.partition_tags()?;
        Ok(tags.iter().map(ToString::to_string).collect())
    }

    // ========================================================================
    // Data
    // ========================================================================

    /// Insert rows into a partition (the default one when `partition_tag`
    /// is `None`). Returns the ids of the inserted rows.
    ///
    /// The whole batch is validated before any row is stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] or [`Error::InvalidVector`] for a
    /// malformed vector, and [`Error::FieldNotFound`] or
    /// [`Error::InvalidParameter`] for a malformed batch.
    pub fn insert(&self, collection: &str, entities: Entities, partition_tag: Option<&str>) -> Result<Vec<EntityId>> {
        let collection = self.collection(collection)?;
        let tag = partition_tag.map_or_else(|| Ok(PartitionTag::default()), PartitionTag::new)?;
        let _gate = collection.index_gate()?;
        let (ids, sealed) = collection.insert(entities, &tag)?;
        debug!(collection = %collection.name(), partition = %tag, rows = ids.len(), "inserted rows");
        self.schedule_auto_index(&collection, sealed)?;
        Ok(ids)
    }

    /// Seal the growing segments of the named collections, or of every
    /// collection when `collections` is empty.
    ///
    /// Newly sealed segments of indexed fields are built in the background
    /// when `auto_index_on_flush` is on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollectionNotFound`] for an unknown collection.
    pub fn flush(&self, collections: &[&str]) -> Result<()> {
        let targets: Vec<Arc<Collection>> = if collections.is_empty() {
            self.collections.read().map_err(|_| VectorError::LockPoisoned)?.values().cloned().collect()
        } else {
            collections.iter().map(|name| self.collection(name)).collect::<Result<_>>()?
        };
        for collection in targets {
            let _gate = collection.index_gate()?;
            let sealed = collection.seal_growing()?;
            if !sealed.is_empty() {
                info!(collection = %collection.name(), segments = sealed.len(), "sealed growing segments");
            }
            self.schedule_auto_index(&collection, sealed)?;
        }
        Ok(())
    }

    /// Total rows across all partitions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollectionNotFound`] if the collection does not exist.
    pub fn count_entities(&self, collection: &str) -> Result<u64> {
        self.collection(collection)?.row_count()
    }

    fn schedule_auto_index(&self, collection: &Collection, sealed: Vec<SegmentSnapshot>) -> Result<()> {
        if !self.config.auto_index_on_flush || sealed.is_empty() {
            return Ok(());
        }
        for field in collection.schema().fields() {
            let key = FieldKey::new(collection.name().clone(), field.name.clone());
            let descriptor = match self.registry.route_sealed(&key, &sealed)? {
                SealedRoute::Extend(descriptor) => descriptor,
                SealedRoute::Deferred => {
                    debug!(
                        collection = %collection.name(),
                        field = %field.name,
                        segments = sealed.len(),
                        "index rebuild in flight, deferring sealed segments"
                    );
                    continue;
                }
                SealedRoute::Unindexed => continue,
            };
            debug!(
                collection = %collection.name(),
                field = %field.name,
                index_name = %descriptor.index_name,
                segments = sealed.len(),
                "scheduling background index build"
            );
            let request = BuildRequest {
                key,
                descriptor,
                field: field.clone(),
                segments: sealed.clone(),
                mode: CommitMode::Extend,
            };
            self.builder.submit(request, None)?;
        }
        Ok(())
    }

    // ========================================================================
    // Indexes
    // ========================================================================

    /// Seal growing segments and snapshot a replacing build. Callers hold the
    /// collection's index gate until the build is submitted.
    fn prepare_build(&self, collection: Arc<Collection>, field: &str, index: &CreateIndex) -> Result<PreparedBuild> {
        let field = collection.field(field)?.clone();
        let spec = IndexSpec::from_json(&index.params)?;
        let index_name = match &index.index_name {
            Some(name) => IndexName::new(name.as_str())?,
            None => IndexName::new(spec.index_type.as_str())?,
        };
        spec.validate_for(&field)?;

        let sealed = collection.seal_growing()?;
        if !sealed.is_empty() {
            info!(collection = %collection.name(), segments = sealed.len(), "sealed growing segments");
        }
        let request = BuildRequest {
            key: FieldKey::new(collection.name().clone(), field.name.clone()),
            descriptor: IndexDescriptor::new(index_name, spec),
            field,
            segments: collection.sealed_segments()?,
            mode: CommitMode::Replace,
        };
        Ok(PreparedBuild { collection, request })
    }

    /// Build an index and block until it is active or the build timeout
    /// elapses.
    ///
    /// Growing segments are sealed first so every inserted row is indexed.
    /// Rebuilding an index that is already active over every sealed segment
    /// with identical parameters returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] or [`Error::UnsupportedIndex`] for
    /// an invalid request, [`Error::BuildTimeout`] if the build does not
    /// finish in time, or the build's own error.
    pub fn create_index(&self, collection: &str, field: &str, index: CreateIndex) -> Result<BuildOutcome> {
        let target = self.collection(collection)?;
        let handle = {
            let _gate = target.index_gate()?;
            let PreparedBuild { collection, request } = self.prepare_build(Arc::clone(&target), field, &index)?;
            let segment_keys: Vec<_> = request.segments.iter().map(|s| s.key.clone()).collect();
            if self.registry.is_current(&request.key, &request.descriptor, &segment_keys)? {
                debug!(
                    collection = %collection.name(),
                    field = %request.key.field,
                    index_name = %request.descriptor.index_name,
                    "index already active"
                );
                return Ok(BuildOutcome {
                    collection: request.key.collection,
                    field: request.key.field,
                    index_name: request.descriptor.index_name,
                    index_type: request.descriptor.spec.index_type,
                    segments_built: 0,
                    committed: true,
                    elapsed: std::time::Duration::ZERO,
                });
            }
            self.builder.submit(request, None)?
        };
        Ok(handle.wait_timeout(self.builder.config().timeout)?)
    }

    /// Validate and schedule an index build, returning immediately.
    ///
    /// Invalid requests fail here and never produce a handle. The callback,
    /// if any, runs on a build worker once the build resolves and before
    /// waiters of the handle wake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] or [`Error::UnsupportedIndex`] for
    /// an invalid request.
    pub fn create_index_async(
        &self,
        collection: &str,
        field: &str,
        index: CreateIndex,
        callback: Option<BuildCallback>,
    ) -> Result<BuildHandle> {
        let collection = self.collection(collection)?;
        let _gate = collection.index_gate()?;
        let PreparedBuild { request, .. } = self.prepare_build(Arc::clone(&collection), field, &index)?;
        Ok(self.builder.submit(request, callback)?)
    }

    /// Drop the index of a field and cancel its in-flight builds.
    ///
    /// Dropping an index that does not exist, on a field that does not
    /// exist, or under another name succeeds without effect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollectionNotFound`] if the collection does not exist.
    pub fn drop_index(&self, collection: &str, field: &str, index_name: Option<&str>) -> Result<()> {
        let collection = self.collection(collection)?;
        let Ok(field) = FieldName::new(field) else {
            return Ok(());
        };
        let key = FieldKey::new(collection.name().clone(), field);
        if let Some(name) = index_name {
            let active = self.registry.descriptor(&key)?;
            if active.is_some_and(|d| d.index_name.as_str() != name) {
                return Ok(());
            }
        }
        let removed = self.registry.remove(&key)?;
        info!(collection = %key.collection, field = %key.field, removed, "dropped index");
        Ok(())
    }

    /// The active index of a field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollectionNotFound`] or [`Error::FieldNotFound`].
    pub fn describe_index(&self, collection: &str, field: &str) -> Result<Option<IndexDescriptor>> {
        let collection = self.collection(collection)?;
        let field = collection.field(field)?;
        Ok(self.registry.descriptor(&FieldKey::new(collection.name().clone(), field.name.clone()))?)
    }

    /// Per-partition, per-segment statistics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollectionNotFound`] if the collection does not exist.
    pub fn get_collection_stats(&self, collection: &str) -> Result<CollectionStats> {
        let collection = self.collection(collection)?;
        let keys: Vec<FieldKey> = collection
            .schema()
            .fields()
            .iter()
            .map(|f| FieldKey::new(collection.name().clone(), f.name.clone()))
            .collect();

        let mut partitions = Vec::new();
        for tag in collection.partition_tags()? {
            let mut segments = Vec::new();
            for snapshot in collection.partition_segments(&tag)? {
                let row_count = snapshot.data.row_count() as u64;
                if row_count == 0 {
                    continue;
                }
                let mut index_name = None;
                for key in &keys {
                    if let Some(name) = self.registry.active_index_name(key, &snapshot.key)? {
                        index_name = Some(name.to_string());
                        break;
                    }
                }
                segments.push(SegmentStats {
                    id: snapshot.key.segment,
                    state: snapshot.state,
                    row_count,
                    data_size: snapshot.data.data_size() as u64,
                    index_name,
                });
            }
            let row_count = segments.iter().map(|s| s.row_count).sum();
            partitions.push(PartitionStats { tag: tag.to_string(), row_count, segments });
        }
        let row_count = partitions.iter().map(|p| p.row_count).sum();
        Ok(CollectionStats { partitions, row_count })
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Search one vector field. Returns one list per query vector, each
    /// holding up to `top_k` hits best first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldNotFound`], [`Error::PartitionNotFound`],
    /// [`Error::InvalidParameter`] or a vector error for an invalid query.
    pub fn search(&self, collection: &str, query: &SearchQuery) -> Result<Vec<Vec<SearchHit>>> {
        let collection = self.collection(collection)?;
        let field = collection.field(&query.field)?;
        let partition_tags = collection.resolve_tags(query.partition_tags.as_deref())?;
        let request = SearchRequest {
            queries: query.query_vectors.clone(),
            top_k: query.top_k,
            partition_tags,
            params: query.params,
        };
        Ok(self.executor.execute(collection.name(), field, &*collection, &request)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn db() -> Database {
        Database::new(Config::default().build_workers(2)).unwrap()
    }

    fn with_rows(db: &Database, name: &str, rows: usize) {
        db.create_collection(CollectionSchema::new(name).unwrap().float_field("v", 4).unwrap()).unwrap();
        let vectors = (0..rows).map(|i| vec![i as f32, (i % 3) as f32, 1.0, 0.5]).collect();
        db.insert(name, Entities::new().float_vectors("v", vectors), None).unwrap();
    }

    #[test]
    fn test_collection_lifecycle() {
        let db = db();
        with_rows(&db, "a", 1);
        assert!(db.has_collection("a").unwrap());
        assert_eq!(db.list_collections().unwrap(), vec!["a".to_string()]);
        assert_eq!(
            db.create_collection(CollectionSchema::new("a").unwrap().float_field("v", 4).unwrap())
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidParameter
        );
        db.drop_collection("a").unwrap();
        assert!(!db.has_collection("a").unwrap());
        assert_eq!(db.drop_collection("a").unwrap_err().kind(), ErrorKind::CollectionNotFound);
    }

    #[test]
    fn test_create_index_seals_and_indexes_everything() {
        let db = db();
        with_rows(&db, "c", 40);
        let outcome = db.create_index("c", "v", CreateIndex::new(json!({"index_type": "IVF_SQ8", "nlist": 4}))).unwrap();
        assert_eq!(outcome.segments_built, 1);

        let stats = db.get_collection_stats("c").unwrap();
        assert_eq!(stats.row_count, 40);
        assert!(stats.segments().all(|s| s.index_name.as_deref() == Some("IVF_SQ8")));

        // identical parameters over the same segments are a no-op
        let again = db.create_index("c", "v", CreateIndex::new(json!({"index_type": "IVF_SQ8", "nlist": 4}))).unwrap();
        assert_eq!(again.segments_built, 0);
    }

    #[test]
    fn test_drop_index_clears_stats() {
        let db = db();
        with_rows(&db, "d", 10);
        db.drop_index("d", "v", None).unwrap();
        db.create_index("d", "v", CreateIndex::new(json!({"index_type": "FLAT"}))).unwrap();
        db.drop_index("d", "v", Some("other")).unwrap();
        assert!(db.describe_index("d", "v").unwrap().is_some());

        db.drop_index("d", "v", None).unwrap();
        db.drop_index("d", "v", None).unwrap();
        db.drop_index("d", "missing", None).unwrap();
        assert!(db.get_collection_stats("d").unwrap().segments().all(|s| s.index_name.is_none()));
        assert!(db.describe_index("d", "v").unwrap().is_none());
        assert_eq!(db.drop_index("nope", "v", None).unwrap_err().kind(), ErrorKind::CollectionNotFound);
    }

    #[test]
    fn test_search_unknown_partition() {
        let db = db();
        with_rows(&db, "s", 5);
        let query = SearchQuery::float("v", vec![vec![0.0; 4]], 2).with_partitions(["2024"]);
        assert_eq!(db.search("s", &query).unwrap_err().kind(), ErrorKind::PartitionNotFound);
        let query = SearchQuery::float("w", vec![vec![0.0; 4]], 2);
        assert_eq!(db.search("s", &query).unwrap_err().kind(), ErrorKind::FieldNotFound);
    }
}

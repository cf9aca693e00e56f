//! Collections, partitions and their segments.
//!
//! A collection owns a fixed set of vector fields and one or more
//! partitions. Each partition owns a list of segments; at most one of them
//! is growing at a time and all earlier ones are sealed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use kestreldb_core::{CollectionName, EntityId, FieldName, PartitionTag, SegmentId};
use kestreldb_vector::segment::{Column, ColumnBatch};
use kestreldb_vector::{
    FieldSchema, FieldType, Metric, Segment, SegmentCatalog, SegmentKey, SegmentSnapshot, SegmentState,
    VectorError,
};
use tracing::debug;

use crate::entities::Entities;
use crate::error::{Error, Result};

const MIB: u64 = 1024 * 1024;

/// Definition of a collection.
///
/// # Example
///
/// ```
/// use kestreldb::CollectionSchema;
///
/// let schema = CollectionSchema::new("documents")?
///     .float_field("embedding", 128)?
///     .with_index_file_size(10);
/// assert_eq!(schema.fields().len(), 1);
/// # Ok::<(), kestreldb::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSchema {
    name: CollectionName,
    fields: Vec<FieldSchema>,
    index_file_size_mb: Option<u64>,
}

impl CollectionSchema {
    /// Start a schema with no fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for an invalid collection name.
    pub fn new(name: &str) -> Result<Self> {
        Ok(Self { name: CollectionName::new(name)?, fields: Vec::new(), index_file_size_mb: None })
    }

    /// Add a field.
    #[must_use]
    pub fn with_field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a float vector field using the `L2` metric.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for an invalid name or dimension.
    pub fn float_field(self, name: &str, dimension: usize) -> Result<Self> {
        let field = FieldSchema::new(FieldName::new(name)?, FieldType::FloatVector, dimension)?;
        Ok(self.with_field(field))
    }

    /// Add a binary vector field with the given metric.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for an invalid name, dimension or
    /// metric.
    pub fn binary_field(self, name: &str, dimension: usize, metric: Metric) -> Result<Self> {
        let field = FieldSchema::new(FieldName::new(name)?, FieldType::BinaryVector, dimension)?.with_metric(metric)?;
        Ok(self.with_field(field))
    }

    /// Bound segments to `mb` MiB of vector data.
    #[must_use]
    pub const fn with_index_file_size(mut self, mb: u64) -> Self {
        self.index_file_size_mb = Some(mb);
        self
    }

    /// The collection name.
    #[must_use]
    pub fn name(&self) -> &CollectionName {
        &self.name
    }

    /// The vector fields.
    #[must_use]
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// The segment size bound, if set.
    #[must_use]
    pub const fn index_file_size_mb(&self) -> Option<u64> {
        self.index_file_size_mb
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(Error::invalid(format!("collection '{}' has no vector fields", self.name)));
        }
        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(Error::invalid(format!("duplicate field '{}'", field.name)));
            }
        }
        if self.index_file_size_mb == Some(0) {
            return Err(Error::invalid("index_file_size must be positive"));
        }
        Ok(())
    }
}

/// Rows each segment holds: `index_file_size` MiB divided by the encoded
/// width of one row across all fields.
fn segment_capacity(fields: &[FieldSchema], index_file_size_mb: u64) -> usize {
    let row_bytes: u64 = fields.iter().map(|f| f.row_bytes() as u64).sum();
    let rows = index_file_size_mb.saturating_mul(MIB) / row_bytes.max(1);
    usize::try_from(rows).unwrap_or(usize::MAX).max(1)
}

#[derive(Debug)]
pub(crate) struct Partition {
    segments: Mutex<Vec<Arc<Segment>>>,
}

impl Partition {
    fn new() -> Self {
        Self { segments: Mutex::new(Vec::new()) }
    }

    fn segments(&self) -> std::result::Result<Vec<Arc<Segment>>, VectorError> {
        Ok(self.segments.lock().map_err(|_| VectorError::LockPoisoned)?.clone())
    }
}

#[derive(Debug)]
pub(crate) struct Collection {
    schema: CollectionSchema,
    capacity: usize,
    partitions: RwLock<BTreeMap<PartitionTag, Arc<Partition>>>,
    next_entity: AtomicU64,
    next_segment: AtomicU64,
    index_gate: Mutex<()>,
}

impl Collection {
    pub(crate) fn new(schema: CollectionSchema, default_index_file_size_mb: u64) -> Self {
        let size = schema.index_file_size_mb.unwrap_or(default_index_file_size_mb);
        let capacity = segment_capacity(&schema.fields, size);
        let mut partitions = BTreeMap::new();
        partitions.insert(PartitionTag::default(), Arc::new(Partition::new()));
        Self {
            schema,
            capacity,
            partitions: RwLock::new(partitions),
            next_entity: AtomicU64::new(1),
            next_segment: AtomicU64::new(1),
            index_gate: Mutex::new(()),
        }
    }

    pub(crate) fn name(&self) -> &CollectionName {
        &self.schema.name
    }

    pub(crate) fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    pub(crate) const fn segment_capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn field(&self, name: &str) -> Result<&FieldSchema> {
        self.schema.fields.iter().find(|f| f.name.as_str() == name).ok_or_else(|| Error::FieldNotFound {
            collection: self.schema.name.to_string(),
            field: name.to_string(),
        })
    }

    // ========================================================================
    // Partitions
    // ========================================================================

    fn partition_not_found(&self, tag: &str) -> Error {
        Error::PartitionNotFound { collection: self.schema.name.to_string(), tag: tag.to_string() }
    }

    pub(crate) fn create_partition(&self, tag: PartitionTag) -> Result<()> {
        let mut partitions = self.partitions.write().map_err(|_| VectorError::LockPoisoned)?;
        if partitions.contains_key(&tag) {
            return Err(Error::invalid(format!("partition '{tag}' already exists in '{}'", self.name())));
        }
        partitions.insert(tag, Arc::new(Partition::new()));
        Ok(())
    }

    pub(crate) fn drop_partition(&self, tag: &PartitionTag) -> Result<()> {
        if tag.is_default() {
            return Err(Error::invalid("the default partition cannot be dropped"));
        }
        let mut partitions = self.partitions.write().map_err(|_| VectorError::LockPoisoned)?;
        partitions.remove(tag).map(|_| ()).ok_or_else(|| self.partition_not_found(tag.as_str()))
    }

    pub(crate) fn has_partition(&self, tag: &PartitionTag) -> Result<bool> {
        Ok(self.partitions.read().map_err(|_| VectorError::LockPoisoned)?.contains_key(tag))
    }

    pub(crate) fn partition_tags(&self) -> Result<Vec<PartitionTag>> {
        Ok(self.partitions.read().map_err(|_| VectorError::LockPoisoned)?.keys().cloned().collect())
    }

    fn partition(&self, tag: &PartitionTag) -> Result<Arc<Partition>> {
        let partitions = self.partitions.read().map_err(|_| VectorError::LockPoisoned)?;
        partitions.get(tag).cloned().ok_or_else(|| self.partition_not_found(tag.as_str()))
    }

    /// Resolve optional tags, failing on any unknown tag.
    pub(crate) fn resolve_tags(&self, tags: Option<&[String]>) -> Result<Option<Vec<PartitionTag>>> {
        let Some(tags) = tags else {
            return Ok(None);
        };
        let partitions = self.partitions.read().map_err(|_| VectorError::LockPoisoned)?;
        tags.iter()
            .map(|t| {
                let tag = PartitionTag::new(t.as_str())?;
                if partitions.contains_key(&tag) {
                    Ok(tag)
                } else {
                    Err(self.partition_not_found(t))
                }
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    // ========================================================================
    // Data
    // ========================================================================

    /// Validate and append a batch. Returns the assigned ids and the
    /// snapshots of segments sealed because they filled up.
    pub(crate) fn insert(
        &self,
        entities: Entities,
        tag: &PartitionTag,
    ) -> Result<(Vec<EntityId>, Vec<SegmentSnapshot>)> {
        let partition = self.partition(tag)?;
        let rows = entities.len();

        for name in entities.fields.keys() {
            self.field(name)?;
        }
        let mut batch = ColumnBatch::new();
        for field in &self.schema.fields {
            let values = entities.fields.get(field.name.as_str()).ok_or_else(|| {
                Error::invalid(format!("missing values for field '{}'", field.name))
            })?;
            if values.len() != rows {
                return Err(Error::invalid(format!(
                    "field '{}' has {} values, expected {rows}",
                    field.name,
                    values.len()
                )));
            }
            batch.insert(field.name.clone(), Column::from_values(field, values)?);
        }
        if rows == 0 {
            return Ok((Vec::new(), Vec::new()));
        }

        let ids = match entities.ids {
            Some(ids) if ids.len() != rows => {
                return Err(Error::invalid(format!("{} ids supplied for {rows} rows", ids.len())))
            }
            Some(ids) => ids,
            None => {
                let start = self.next_entity.fetch_add(rows as u64, Ordering::SeqCst);
                (start..start + rows as u64).map(EntityId::new).collect()
            }
        };

        let mut sealed = Vec::new();
        let mut segments = partition.segments.lock().map_err(|_| VectorError::LockPoisoned)?;
        let mut offset = 0;
        while offset < rows {
            let segment = match segments.last() {
                Some(s) if s.state()? == SegmentState::Growing => Arc::clone(s),
                _ => {
                    let id = SegmentId::new(self.next_segment.fetch_add(1, Ordering::SeqCst));
                    let segment =
                        Arc::new(Segment::new(SegmentKey::new(tag.clone(), id), &self.schema.fields, self.capacity));
                    segments.push(Arc::clone(&segment));
                    segment
                }
            };
            offset += segment.append(&ids, &batch, offset..rows)?;
            if segment.is_full()? && segment.seal()? {
                debug!(collection = %self.name(), segment = %segment.key(), "sealed full segment");
                sealed.push(segment.snapshot()?);
            }
        }
        Ok((ids, sealed))
    }

    /// Seal every non-empty growing segment. Returns snapshots of the
    /// segments sealed by this call.
    pub(crate) fn seal_growing(&self) -> Result<Vec<SegmentSnapshot>> {
        let partitions: Vec<Arc<Partition>> =
            self.partitions.read().map_err(|_| VectorError::LockPoisoned)?.values().cloned().collect();
        let mut sealed = Vec::new();
        for partition in partitions {
            let segments = partition.segments.lock().map_err(|_| VectorError::LockPoisoned)?;
            for segment in segments.iter() {
                if segment.row_count()? > 0 && segment.seal()? {
                    sealed.push(segment.snapshot()?);
                }
            }
        }
        Ok(sealed)
    }

    /// Held while segments are sealed and routed to the index builder, and
    /// while a rebuild snapshots segments and registers itself. A segment is
    /// then either in the rebuild's snapshot or routed after it registered.
    pub(crate) fn index_gate(&self) -> Result<MutexGuard<'_, ()>> {
        Ok(self.index_gate.lock().map_err(|_| VectorError::LockPoisoned)?)
    }

    /// Snapshots of every sealed segment.
    pub(crate) fn sealed_segments(&self) -> Result<Vec<SegmentSnapshot>> {
        Ok(self.snapshots(None)?.into_iter().filter(|s| s.state == SegmentState::Sealed).collect())
    }

    pub(crate) fn row_count(&self) -> Result<u64> {
        Ok(self.snapshots(None)?.iter().map(|s| s.data.row_count() as u64).sum())
    }

    /// Segments of one partition, in creation order.
    pub(crate) fn partition_segments(&self, tag: &PartitionTag) -> Result<Vec<SegmentSnapshot>> {
        self.partition(tag)?.segments()?.iter().map(|s| s.snapshot().map_err(Error::from)).collect()
    }

    fn snapshots(
        &self,
        tags: Option<&[PartitionTag]>,
    ) -> std::result::Result<Vec<SegmentSnapshot>, VectorError> {
        let partitions: Vec<Arc<Partition>> = {
            let partitions = self.partitions.read().map_err(|_| VectorError::LockPoisoned)?;
            partitions
                .iter()
                .filter(|(tag, _)| tags.map_or(true, |tags| tags.contains(tag)))
                .map(|(_, p)| Arc::clone(p))
                .collect()
        };
        let mut out = Vec::new();
        for partition in partitions {
            for segment in partition.segments()? {
                out.push(segment.snapshot()?);
            }
        }
        Ok(out)
    }
}

impl SegmentCatalog for Collection {
    fn segments(&self, partitions: Option<&[PartitionTag]>) -> std::result::Result<Vec<SegmentSnapshot>, VectorError> {
        self.snapshots(partitions)
    }
}

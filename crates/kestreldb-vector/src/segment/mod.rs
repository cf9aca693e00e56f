//! Storage segments.
//!
//! A segment is a bounded, append-only batch of rows belonging to one
//! partition. It starts out [`SegmentState::Growing`] and accepts appends
//! until it is full or explicitly sealed; a [`SegmentState::Sealed`] segment
//! never changes again and is eligible for indexing.
//!
//! Row data lives behind an `Arc` so readers take cheap snapshots. Appends
//! copy the data only while a snapshot of the growing segment is still alive.

mod column;

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::{Arc, RwLock};

use kestreldb_core::{EntityId, FieldName, PartitionTag, SegmentId};
use serde::{Deserialize, Serialize};

pub use column::Column;

use crate::error::VectorError;
use crate::types::FieldSchema;

/// Validated, column-oriented rows waiting to be appended.
pub type ColumnBatch = BTreeMap<FieldName, Column>;

/// Lifecycle state of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentState {
    /// Accepts appends; always searched by exact scan.
    Growing,
    /// Immutable and indexable.
    Sealed,
}

impl fmt::Display for SegmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Growing => f.write_str("growing"),
            Self::Sealed => f.write_str("sealed"),
        }
    }
}

/// Location of a segment within its collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentKey {
    /// Partition that owns the segment.
    pub partition: PartitionTag,
    /// Segment id, unique within the collection.
    pub segment: SegmentId,
}

impl SegmentKey {
    /// Create a segment key.
    #[must_use]
    pub const fn new(partition: PartitionTag, segment: SegmentId) -> Self {
        Self { partition, segment }
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition, self.segment)
    }
}

/// The rows of a segment.
#[derive(Debug, Clone, Default)]
pub struct SegmentData {
    pub(crate) ids: Vec<EntityId>,
    pub(crate) columns: BTreeMap<FieldName, Column>,
}

impl SegmentData {
    /// Entity ids, in row order.
    #[must_use]
    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }

    /// The column of one field.
    #[must_use]
    pub fn column(&self, field: &FieldName) -> Option<&Column> {
        self.columns.get(field)
    }

    /// Number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.ids.len()
    }

    /// Encoded size of ids and vectors in bytes.
    #[must_use]
    pub fn data_size(&self) -> usize {
        self.ids.len() * std::mem::size_of::<u64>()
            + self.columns.values().map(Column::byte_size).sum::<usize>()
    }
}

/// An immutable view of a segment at one point in time.
#[derive(Debug, Clone)]
pub struct SegmentSnapshot {
    /// Where the segment lives.
    pub key: SegmentKey,
    /// State when the snapshot was taken.
    pub state: SegmentState,
    /// The rows.
    pub data: Arc<SegmentData>,
}

#[derive(Debug)]
struct SegmentInner {
    state: SegmentState,
    data: Arc<SegmentData>,
}

/// A bounded, append-only batch of rows.
#[derive(Debug)]
pub struct Segment {
    key: SegmentKey,
    capacity: usize,
    inner: RwLock<SegmentInner>,
}

impl Segment {
    /// Create an empty growing segment holding up to `capacity` rows.
    #[must_use]
    pub fn new(key: SegmentKey, fields: &[FieldSchema], capacity: usize) -> Self {
        let columns = fields.iter().map(|f| (f.name.clone(), Column::empty(f))).collect();
        Self {
            key,
            capacity: capacity.max(1),
            inner: RwLock::new(SegmentInner {
                state: SegmentState::Growing,
                data: Arc::new(SegmentData { ids: Vec::new(), columns }),
            }),
        }
    }

    /// Where the segment lives.
    #[must_use]
    pub fn key(&self) -> &SegmentKey {
        &self.key
    }

    /// The segment id.
    #[must_use]
    pub fn id(&self) -> SegmentId {
        self.key.segment
    }

    /// Maximum number of rows.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append rows `range` of the batch, up to the remaining capacity.
    ///
    /// Returns the number of rows appended.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::SegmentSealed`] if the segment is sealed, or
    /// [`VectorError::InvalidParameter`] if the batch lacks one of the
    /// segment's fields.
    pub fn append(
        &self,
        ids: &[EntityId],
        batch: &ColumnBatch,
        range: Range<usize>,
    ) -> Result<usize, VectorError> {
        let mut inner = self.inner.write().map_err(|_| VectorError::LockPoisoned)?;
        if inner.state == SegmentState::Sealed {
            return Err(VectorError::SegmentSealed(self.key.segment.as_u64()));
        }

        let room = self.capacity.saturating_sub(inner.data.row_count());
        let take = range.len().min(room);
        if take == 0 {
            return Ok(0);
        }
        let rows = range.start..range.start + take;

        for field in inner.data.columns.keys() {
            if !batch.contains_key(field) {
                return Err(VectorError::invalid_param(
                    field.as_str(),
                    "missing vector values for field",
                ));
            }
        }

        let data = Arc::make_mut(&mut inner.data);
        data.ids.extend_from_slice(&ids[rows.clone()]);
        for (field, column) in &mut data.columns {
            if let Some(source) = batch.get(field) {
                column.extend_from(source, rows.clone())?;
            }
        }
        Ok(take)
    }

    /// Seal the segment. Returns `true` if this call changed its state.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::LockPoisoned`] if the lock is poisoned.
    pub fn seal(&self) -> Result<bool, VectorError> {
        let mut inner = self.inner.write().map_err(|_| VectorError::LockPoisoned)?;
        if inner.state == SegmentState::Sealed {
            return Ok(false);
        }
        inner.state = SegmentState::Sealed;
        Ok(true)
    }

    /// Current state.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::LockPoisoned`] if the lock is poisoned.
    pub fn state(&self) -> Result<SegmentState, VectorError> {
        Ok(self.inner.read().map_err(|_| VectorError::LockPoisoned)?.state)
    }

    /// Whether the segment holds `capacity` rows.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::LockPoisoned`] if the lock is poisoned.
    pub fn is_full(&self) -> Result<bool, VectorError> {
        let inner = self.inner.read().map_err(|_| VectorError::LockPoisoned)?;
        Ok(inner.data.row_count() >= self.capacity)
    }

    /// Number of rows.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::LockPoisoned`] if the lock is poisoned.
    pub fn row_count(&self) -> Result<usize, VectorError> {
        Ok(self.inner.read().map_err(|_| VectorError::LockPoisoned)?.data.row_count())
    }

    /// Take a snapshot of the current rows.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::LockPoisoned`] if the lock is poisoned.
    pub fn snapshot(&self) -> Result<SegmentSnapshot, VectorError> {
        let inner = self.inner.read().map_err(|_| VectorError::LockPoisoned)?;
        Ok(SegmentSnapshot {
            key: self.key.clone(),
            state: inner.state,
            data: Arc::clone(&inner.data),
        })
    }
}

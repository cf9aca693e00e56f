//! Registry of active index descriptors and per-segment artifacts.
//!
//! The registry is the single mutation point for active-index state. Each
//! `(collection, field)` pair owns its own slot behind its own mutex, so
//! builds and drops on unrelated fields never contend.
//!
//! ## Generations
//!
//! Every slot carries two counters:
//! - `generation` is bumped whenever the descriptor is replaced or removed.
//!   Incremental builds ([`CommitMode::Extend`]) only commit while the
//!   generation they started from is still current.
//! - `drop_epoch` is bumped only by [`IndexRegistry::remove`]. A replacing
//!   build that started before a drop is discarded when it completes.
//!
//! ## Deferred segments
//!
//! Segments sealed while a replacing build is in flight are parked on the
//! slot instead of being built under a descriptor that is about to change.
//! When the last replacing build of the field finishes, [`IndexRegistry::finish`]
//! hands them back as a [`DeferredBuild`] under whichever descriptor ended up
//! active.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use kestreldb_core::{CollectionName, FieldName, IndexName, PartitionTag};
use tracing::{debug, warn};

use super::{ArtifactHandle, IndexDescriptor};
use crate::builder::CancellationToken;
use crate::error::VectorError;
use crate::segment::{SegmentKey, SegmentSnapshot};

/// Identifies one vector field of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    /// The collection.
    pub collection: CollectionName,
    /// The vector field.
    pub field: FieldName,
}

impl FieldKey {
    /// Create a key.
    #[must_use]
    pub const fn new(collection: CollectionName, field: FieldName) -> Self {
        Self { collection, field }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.collection, self.field)
    }
}

/// How a finished build is merged into the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Install the descriptor and replace every artifact of the field.
    /// The last build to complete wins.
    Replace,
    /// Add artifacts for newly sealed segments under the current descriptor.
    Extend,
}

/// Registration of an in-flight build, taken when the build is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildTicket {
    job: u64,
    generation: u64,
    drop_epoch: u64,
}

impl BuildTicket {
    /// Job id, unique within the registry.
    #[must_use]
    pub const fn job(&self) -> u64 {
        self.job
    }

    /// Descriptor generation observed when the build was scheduled.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

/// Where newly sealed segments of a field should go.
#[derive(Debug, Clone)]
pub enum SealedRoute {
    /// The field has no index with per-segment artifacts.
    Unindexed,
    /// A replacing build is in flight. The segments were parked and come back
    /// from [`IndexRegistry::finish`].
    Deferred,
    /// Build the segments under this descriptor and commit with
    /// [`CommitMode::Extend`].
    Extend(IndexDescriptor),
}

/// Segments parked during replacing builds, due for an incremental build.
#[derive(Debug, Clone)]
pub struct DeferredBuild {
    /// The descriptor active once the replacing builds finished.
    pub descriptor: IndexDescriptor,
    /// Parked segments that still have no artifact.
    pub segments: Vec<SegmentSnapshot>,
}

#[derive(Debug, Default)]
struct FieldSlot {
    descriptor: Option<IndexDescriptor>,
    generation: u64,
    drop_epoch: u64,
    artifacts: HashMap<SegmentKey, ArtifactHandle>,
    in_flight: HashMap<u64, (CancellationToken, CommitMode)>,
    deferred: Vec<SegmentSnapshot>,
}

impl FieldSlot {
    fn cancel_in_flight(&mut self) -> usize {
        let count = self.in_flight.len();
        for (token, _) in self.in_flight.values() {
            token.cancel();
        }
        count
    }

    fn replacing(&self) -> bool {
        self.in_flight.values().any(|(_, mode)| *mode == CommitMode::Replace)
    }
}

type SharedSlot = Arc<Mutex<FieldSlot>>;

/// Tracks the active descriptor and artifacts of every indexed field.
#[derive(Debug, Default)]
pub struct IndexRegistry {
    slots: RwLock<HashMap<FieldKey, SharedSlot>>,
    next_job: AtomicU64,
}

impl IndexRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn existing(&self, key: &FieldKey) -> Result<Option<SharedSlot>, VectorError> {
        let slots = self.slots.read().map_err(|_| VectorError::LockPoisoned)?;
        Ok(slots.get(key).cloned())
    }

    fn get_or_create(&self, key: &FieldKey) -> Result<SharedSlot, VectorError> {
        if let Some(slot) = self.existing(key)? {
            return Ok(slot);
        }
        let mut slots = self.slots.write().map_err(|_| VectorError::LockPoisoned)?;
        Ok(Arc::clone(slots.entry(key.clone()).or_default()))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// The artifact searched for `segment`, if one is attached.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::LockPoisoned`] if a lock is poisoned.
    pub fn get_active(
        &self,
        key: &FieldKey,
        segment: &SegmentKey,
    ) -> Result<Option<ArtifactHandle>, VectorError> {
        let Some(slot) = self.existing(key)? else {
            return Ok(None);
        };
        let slot = slot.lock().map_err(|_| VectorError::LockPoisoned)?;
        Ok(slot.artifacts.get(segment).cloned())
    }

    /// Name of the index whose artifact is attached to `segment`.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::LockPoisoned`] if a lock is poisoned.
    pub fn active_index_name(
        &self,
        key: &FieldKey,
        segment: &SegmentKey,
    ) -> Result<Option<IndexName>, VectorError> {
        let Some(slot) = self.existing(key)? else {
            return Ok(None);
        };
        let slot = slot.lock().map_err(|_| VectorError::LockPoisoned)?;
        if !slot.artifacts.contains_key(segment) {
            return Ok(None);
        }
        Ok(slot.descriptor.as_ref().map(|d| d.index_name.clone()))
    }

    /// The active descriptor of a field.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::LockPoisoned`] if a lock is poisoned.
    pub fn descriptor(&self, key: &FieldKey) -> Result<Option<IndexDescriptor>, VectorError> {
        let Some(slot) = self.existing(key)? else {
            return Ok(None);
        };
        let slot = slot.lock().map_err(|_| VectorError::LockPoisoned)?;
        Ok(slot.descriptor.clone())
    }

    /// Whether `descriptor` is active and already covers every segment in
    /// `segments`. Types without artifacts only need the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::LockPoisoned`] if a lock is poisoned.
    pub fn is_current(
        &self,
        key: &FieldKey,
        descriptor: &IndexDescriptor,
        segments: &[SegmentKey],
    ) -> Result<bool, VectorError> {
        let Some(slot) = self.existing(key)? else {
            return Ok(false);
        };
        let slot = slot.lock().map_err(|_| VectorError::LockPoisoned)?;
        if slot.descriptor.as_ref() != Some(descriptor) {
            return Ok(false);
        }
        if !descriptor.spec.index_type.has_artifact() {
            return Ok(true);
        }
        Ok(segments.iter().all(|s| slot.artifacts.contains_key(s)))
    }

    /// Number of builds currently registered for a field.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::LockPoisoned`] if a lock is poisoned.
    pub fn in_flight(&self, key: &FieldKey) -> Result<usize, VectorError> {
        let Some(slot) = self.existing(key)? else {
            return Ok(0);
        };
        let slot = slot.lock().map_err(|_| VectorError::LockPoisoned)?;
        Ok(slot.in_flight.len())
    }

    // ========================================================================
    // Build lifecycle
    // ========================================================================

    /// Register a build about to be scheduled. A later [`remove`] cancels
    /// `token`. While a [`CommitMode::Replace`] build is registered, newly
    /// sealed segments are deferred by [`route_sealed`].
    ///
    /// [`remove`]: Self::remove
    /// [`route_sealed`]: Self::route_sealed
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::LockPoisoned`] if a lock is poisoned.
    pub fn begin_build(
        &self,
        key: &FieldKey,
        token: CancellationToken,
        mode: CommitMode,
    ) -> Result<BuildTicket, VectorError> {
        let slot = self.get_or_create(key)?;
        let mut slot = slot.lock().map_err(|_| VectorError::LockPoisoned)?;
        let job = self.next_job.fetch_add(1, Ordering::Relaxed);
        slot.in_flight.insert(job, (token, mode));
        Ok(BuildTicket { job, generation: slot.generation, drop_epoch: slot.drop_epoch })
    }

    /// Merge a finished build. Returns `false` if the build is stale and was
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::LockPoisoned`] if a lock is poisoned.
    pub fn commit(
        &self,
        key: &FieldKey,
        ticket: &BuildTicket,
        descriptor: &IndexDescriptor,
        artifacts: Vec<(SegmentKey, ArtifactHandle)>,
        mode: CommitMode,
    ) -> Result<bool, VectorError> {
        let slot = self.get_or_create(key)?;
        let mut slot = slot.lock().map_err(|_| VectorError::LockPoisoned)?;

        let stale = match mode {
            CommitMode::Replace => slot.drop_epoch != ticket.drop_epoch,
            CommitMode::Extend => {
                slot.drop_epoch != ticket.drop_epoch
                    || slot.generation != ticket.generation
                    || slot.descriptor.as_ref() != Some(descriptor)
            }
        };
        if stale {
            warn!(
                field = %key,
                index_name = %descriptor.index_name,
                job = ticket.job,
                "discarding stale index build"
            );
            return Ok(false);
        }

        match mode {
            CommitMode::Replace => {
                slot.descriptor = Some(descriptor.clone());
                slot.generation += 1;
                slot.artifacts = artifacts.into_iter().collect();
            }
            CommitMode::Extend => slot.artifacts.extend(artifacts),
        }
        debug!(
            field = %key,
            index_name = %descriptor.index_name,
            generation = slot.generation,
            segments = slot.artifacts.len(),
            "committed index build"
        );
        Ok(true)
    }

    /// Decide what to do with segments that were just sealed.
    ///
    /// While a replacing build is in flight the segments are parked on the
    /// field and [`SealedRoute::Deferred`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::LockPoisoned`] if a lock is poisoned.
    pub fn route_sealed(
        &self,
        key: &FieldKey,
        segments: &[SegmentSnapshot],
    ) -> Result<SealedRoute, VectorError> {
        let Some(slot) = self.existing(key)? else {
            return Ok(SealedRoute::Unindexed);
        };
        let mut slot = slot.lock().map_err(|_| VectorError::LockPoisoned)?;
        if slot.replacing() {
            slot.deferred.extend(segments.iter().cloned());
            debug!(field = %key, segments = segments.len(), "deferred sealed segments");
            return Ok(SealedRoute::Deferred);
        }
        Ok(match &slot.descriptor {
            Some(descriptor) if descriptor.spec.index_type.has_artifact() => {
                SealedRoute::Extend(descriptor.clone())
            }
            _ => SealedRoute::Unindexed,
        })
    }

    /// Unregister a build once it has committed or failed.
    ///
    /// `built` lists the segments an incremental build committed, or tried to
    /// commit before a replacing build made it stale. They are checked again
    /// against the index that ends up active, so a replacing build that
    /// overtook them cannot leave them unindexed.
    ///
    /// When no replacing build of the field remains, returns the deferred
    /// segments the active index does not cover yet. The caller builds them
    /// with [`CommitMode::Extend`].
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::LockPoisoned`] if a lock is poisoned.
    pub fn finish(
        &self,
        key: &FieldKey,
        ticket: &BuildTicket,
        built: &[SegmentSnapshot],
    ) -> Result<Option<DeferredBuild>, VectorError> {
        let Some(slot) = self.existing(key)? else {
            return Ok(None);
        };
        let mut slot = slot.lock().map_err(|_| VectorError::LockPoisoned)?;
        let Some((_, mode)) = slot.in_flight.remove(&ticket.job) else {
            return Ok(None);
        };
        if mode == CommitMode::Extend && slot.drop_epoch == ticket.drop_epoch {
            slot.deferred.extend(built.iter().cloned());
        }
        if slot.replacing() || slot.deferred.is_empty() {
            return Ok(None);
        }

        let parked = std::mem::take(&mut slot.deferred);
        let Some(descriptor) = slot.descriptor.clone().filter(|d| d.spec.index_type.has_artifact()) else {
            return Ok(None);
        };
        let segments: Vec<SegmentSnapshot> =
            parked.into_iter().filter(|s| !slot.artifacts.contains_key(&s.key)).collect();
        if segments.is_empty() {
            return Ok(None);
        }
        debug!(
            field = %key,
            index_name = %descriptor.index_name,
            segments = segments.len(),
            "releasing deferred segments"
        );
        Ok(Some(DeferredBuild { descriptor, segments }))
    }

    // ========================================================================
    // Direct mutation
    // ========================================================================

    /// Attach an artifact to `segment` under the field's active descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::InvalidParameter`] if the field has no active
    /// descriptor, or if the artifact was built by another index type.
    pub fn put(
        &self,
        key: &FieldKey,
        segment: SegmentKey,
        artifact: ArtifactHandle,
    ) -> Result<(), VectorError> {
        let slot = self.get_or_create(key)?;
        let mut slot = slot.lock().map_err(|_| VectorError::LockPoisoned)?;
        let Some(descriptor) = &slot.descriptor else {
            return Err(VectorError::invalid_param(key.field.as_str(), "field has no index"));
        };
        if descriptor.spec.index_type != artifact.index_type() {
            return Err(VectorError::invalid_param(
                "index_type",
                format!(
                    "artifact is {} but the active index is {}",
                    artifact.index_type(),
                    descriptor.spec.index_type
                ),
            ));
        }
        slot.artifacts.insert(segment, artifact);
        Ok(())
    }

    /// Remove a field's descriptor and artifacts and cancel its in-flight
    /// builds. Removing an absent index is a no-op.
    ///
    /// Returns `true` if a descriptor was removed.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::LockPoisoned`] if a lock is poisoned.
    pub fn remove(&self, key: &FieldKey) -> Result<bool, VectorError> {
        let Some(slot) = self.existing(key)? else {
            return Ok(false);
        };
        let mut slot = slot.lock().map_err(|_| VectorError::LockPoisoned)?;
        let cancelled = slot.cancel_in_flight();
        let removed = slot.descriptor.take().is_some();
        slot.artifacts.clear();
        slot.deferred.clear();
        slot.generation += 1;
        slot.drop_epoch += 1;
        debug!(field = %key, removed, cancelled, "removed index");
        Ok(removed)
    }

    /// Forget every field of a dropped collection, cancelling its builds.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::LockPoisoned`] if a lock is poisoned.
    pub fn remove_collection(&self, collection: &CollectionName) -> Result<(), VectorError> {
        let removed: Vec<SharedSlot> = {
            let mut slots = self.slots.write().map_err(|_| VectorError::LockPoisoned)?;
            let keys: Vec<FieldKey> =
                slots.keys().filter(|k| &k.collection == collection).cloned().collect();
            keys.iter().filter_map(|k| slots.remove(k)).collect()
        };
        for slot in removed {
            let mut slot = slot.lock().map_err(|_| VectorError::LockPoisoned)?;
            slot.cancel_in_flight();
            slot.drop_epoch += 1;
        }
        Ok(())
    }

    /// Release the artifacts of every segment in a dropped partition.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::LockPoisoned`] if a lock is poisoned.
    pub fn remove_partition(
        &self,
        collection: &CollectionName,
        partition: &PartitionTag,
    ) -> Result<(), VectorError> {
        let slots: Vec<SharedSlot> = {
            let slots = self.slots.read().map_err(|_| VectorError::LockPoisoned)?;
            slots.iter().filter(|(k, _)| &k.collection == collection).map(|(_, s)| Arc::clone(s)).collect()
        };
        for slot in slots {
            let mut slot = slot.lock().map_err(|_| VectorError::LockPoisoned)?;
            slot.artifacts.retain(|segment, _| &segment.partition != partition);
            slot.deferred.retain(|s| &s.key.partition != partition);
        }
        Ok(())
    }

    /// Cancel every in-flight build.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::LockPoisoned`] if a lock is poisoned.
    pub fn cancel_all(&self) -> Result<(), VectorError> {
        let slots = self.slots.read().map_err(|_| VectorError::LockPoisoned)?;
        for slot in slots.values() {
            slot.lock().map_err(|_| VectorError::LockPoisoned)?.cancel_in_flight();
        }
        Ok(())
    }
}

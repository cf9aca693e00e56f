//! Asynchronous index builder.
//!
//! [`IndexBuilder::submit`] validates a build synchronously, registers it
//! with the [`IndexRegistry`] and queues it on a dedicated worker pool. The
//! caller gets a [`BuildHandle`] to wait on, and may attach a callback that
//! runs on the worker once the build resolves.
//!
//! A build either commits every artifact it produced or none of them. A
//! build that fails, is cancelled, or times out leaves the registry exactly
//! as it was. Segments sealed while a replacing build was queued or running
//! are built right after it, before its handle resolves.

mod context;
mod handle;
mod pool;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

pub use context::{BuildContext, CancellationToken};
pub use handle::{BuildCallback, BuildHandle, BuildOutcome, BuildResult};

use self::pool::WorkerPool;
use crate::error::VectorError;
use crate::index::{
    ArtifactHandle, BinaryIvfIndex, CommitMode, DeferredBuild, FieldKey, FlatIndex, HnswConfig, HnswIndex,
    IndexDescriptor, IndexRegistry, IndexSpec, IndexType, IvfIndex,
};
use crate::quantization::KMeansConfig;
use crate::segment::{Column, SegmentData, SegmentKey, SegmentSnapshot, SegmentState};
use crate::types::FieldSchema;

/// Builder settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Worker threads.
    pub workers: usize,
    /// Ceiling for a single build job.
    pub timeout: Duration,
    /// Lloyd iterations for coarse quantizers and PQ codebooks.
    pub kmeans_iterations: usize,
    /// Training seed; `None` seeds from entropy.
    pub kmeans_seed: Option<u64>,
    /// Training sample cap per centroid.
    pub max_points_per_centroid: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(1, usize::from),
            timeout: Duration::from_secs(300),
            kmeans_iterations: 10,
            kmeans_seed: Some(0x5EED),
            max_points_per_centroid: 256,
        }
    }
}

impl BuildConfig {
    /// Set the number of worker threads.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the build timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the k-means iteration count.
    #[must_use]
    pub const fn with_kmeans_iterations(mut self, iterations: usize) -> Self {
        self.kmeans_iterations = iterations;
        self
    }

    /// Set the training seed.
    #[must_use]
    pub const fn with_kmeans_seed(mut self, seed: Option<u64>) -> Self {
        self.kmeans_seed = seed;
        self
    }

    /// Set the training sample cap per centroid.
    #[must_use]
    pub const fn with_max_points_per_centroid(mut self, points: usize) -> Self {
        self.max_points_per_centroid = points;
        self
    }

    fn kmeans(&self) -> KMeansConfig {
        KMeansConfig::new(1)
            .with_max_iterations(self.kmeans_iterations)
            .with_seed(self.kmeans_seed)
            .with_max_points_per_centroid(self.max_points_per_centroid)
    }
}

/// Build one artifact over one segment.
///
/// Returns `None` for index types that attach no artifact (`BIN_FLAT`).
///
/// # Errors
///
/// Returns [`VectorError::UnsupportedIndex`] if the index type does not match
/// the field type, [`VectorError::InvalidParameter`] if the segment has no
/// column for the field, or a training/cancellation error.
pub fn build_artifact(
    spec: &IndexSpec,
    field: &FieldSchema,
    data: &SegmentData,
    kmeans: &KMeansConfig,
    ctx: &BuildContext,
) -> Result<Option<ArtifactHandle>, VectorError> {
    let column = data
        .column(&field.name)
        .ok_or_else(|| VectorError::invalid_param(field.name.as_str(), "segment has no such field"))?;
    let metric = spec.metric_for(field);
    let ids = data.ids();

    let artifact: ArtifactHandle = match (spec.index_type, column) {
        (IndexType::Flat, Column::Float { .. }) => Arc::new(FlatIndex::build(ids, column, metric)),
        (IndexType::IvfFlat | IndexType::IvfSq8 | IndexType::IvfPq, Column::Float { dimension, values }) => {
            Arc::new(IvfIndex::build(spec, metric, *dimension, ids, values, kmeans, ctx)?)
        }
        (IndexType::Hnsw, Column::Float { dimension, values }) => {
            let config = HnswConfig::new(spec.hnsw_m())
                .with_ef_construction(spec.ef_construction())
                .with_seed(kmeans.seed.unwrap_or(0x5EED));
            Arc::new(HnswIndex::build(config, metric, *dimension, ids, values, ctx)?)
        }
        (IndexType::BinFlat, Column::Binary { .. }) => return Ok(None),
        (IndexType::BinIvfFlat, Column::Binary { words_per_row, words }) => {
            Arc::new(BinaryIvfIndex::build(spec, metric, *words_per_row, ids, words, kmeans, ctx)?)
        }
        (index_type, _) => {
            return Err(VectorError::UnsupportedIndex {
                index_type: index_type.to_string(),
                field_type: field.field_type.to_string(),
            })
        }
    };
    Ok(Some(artifact))
}

/// A build job: one descriptor over a set of sealed segments.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// The indexed field.
    pub key: FieldKey,
    /// What to build.
    pub descriptor: IndexDescriptor,
    /// Schema of the indexed field.
    pub field: FieldSchema,
    /// Sealed segments to build over.
    pub segments: Vec<SegmentSnapshot>,
    /// How the result is merged into the registry.
    pub mode: CommitMode,
}

/// Runs index builds on a worker pool and commits them to a registry.
#[derive(Debug)]
pub struct IndexBuilder {
    pool: WorkerPool,
    registry: Arc<IndexRegistry>,
    config: BuildConfig,
}

impl IndexBuilder {
    /// Start a builder with `config.workers` threads.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::BuildFailed`] if a worker thread cannot be spawned.
    pub fn new(registry: Arc<IndexRegistry>, config: BuildConfig) -> Result<Self, VectorError> {
        let pool = WorkerPool::new(config.workers)?;
        Ok(Self { pool, registry, config })
    }

    /// The registry builds commit to.
    #[must_use]
    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    /// Builder settings.
    #[must_use]
    pub const fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Number of worker threads.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.pool.size()
    }

    /// Builds waiting for a free worker.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.pool.queued()
    }

    /// Validate and schedule a build.
    ///
    /// Parameter errors are returned here, before anything is scheduled. The
    /// callback, if any, runs on the worker before waiters of the handle are
    /// woken.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::UnsupportedIndex`] or
    /// [`VectorError::InvalidParameter`] for an invalid request.
    pub fn submit(
        &self,
        request: BuildRequest,
        callback: Option<BuildCallback>,
    ) -> Result<BuildHandle, VectorError> {
        request.descriptor.spec.validate_for(&request.field)?;
        if let Some(growing) = request.segments.iter().find(|s| s.state != SegmentState::Sealed) {
            return Err(VectorError::invalid_param(
                "segment",
                format!("segment {} is still growing", growing.key),
            ));
        }

        let submitted = Instant::now();
        let token = CancellationToken::new();
        let ticket = self.registry.begin_build(&request.key, token.clone(), request.mode)?;
        let handle = BuildHandle::new(token.clone());

        info!(
            collection = %request.key.collection,
            field = %request.key.field,
            index_name = %request.descriptor.index_name,
            index_type = %request.descriptor.spec.index_type,
            segments = request.segments.len(),
            job = ticket.job(),
            "submitted index build"
        );

        let registry = Arc::clone(&self.registry);
        let kmeans = self.config.kmeans();
        let timeout = self.config.timeout;
        let job_handle = handle.clone();
        let key = request.key.clone();

        let job = Box::new(move || {
            // queue time counts against the deadline
            let ctx = BuildContext::since(token, submitted, timeout);
            let built = panic::catch_unwind(AssertUnwindSafe(|| build_segments(&request, &kmeans, &ctx)))
                .unwrap_or_else(|_| Err(VectorError::BuildFailed("build worker panicked".to_string())));

            let result = built.and_then(|artifacts| {
                let segments_built = artifacts.len();
                let committed =
                    registry.commit(&request.key, &ticket, &request.descriptor, artifacts, request.mode)?;
                Ok(BuildOutcome {
                    collection: request.key.collection.clone(),
                    field: request.key.field.clone(),
                    index_name: request.descriptor.index_name.clone(),
                    index_type: request.descriptor.spec.index_type,
                    segments_built,
                    committed,
                    elapsed: submitted.elapsed(),
                })
            });
            let built: &[SegmentSnapshot] = if result.is_ok() { &request.segments } else { &[] };
            match registry.finish(&request.key, &ticket, built) {
                Ok(deferred) => build_deferred(&registry, &request, deferred, &kmeans, timeout),
                Err(e) => warn!(error = %e, "failed to unregister index build"),
            }
            log_result(&request, &result);

            if let Some(callback) = callback {
                if panic::catch_unwind(AssertUnwindSafe(|| callback(&result))).is_err() {
                    warn!(field = %request.key, "index build callback panicked");
                }
            }
            job_handle.resolve(result);
        });

        if let Err(e) = self.pool.execute(job) {
            self.registry.finish(&key, &ticket, &[])?;
            return Err(e);
        }
        Ok(handle)
    }

    /// Submit a build and block until it resolves or the configured timeout
    /// elapses.
    ///
    /// # Errors
    ///
    /// Returns validation errors, [`VectorError::BuildTimeout`], or the
    /// build's own error.
    pub fn build_blocking(&self, request: BuildRequest) -> BuildResult {
        self.submit(request, None)?.wait_timeout(self.config.timeout)
    }
}

impl Drop for IndexBuilder {
    fn drop(&mut self) {
        if let Err(e) = self.registry.cancel_all() {
            warn!(error = %e, "failed to cancel in-flight builds");
        }
    }
}

fn build_segments(
    request: &BuildRequest,
    kmeans: &KMeansConfig,
    ctx: &BuildContext,
) -> Result<Vec<(SegmentKey, ArtifactHandle)>, VectorError> {
    let mut artifacts = Vec::with_capacity(request.segments.len());
    for snapshot in &request.segments {
        ctx.checkpoint()?;
        let started = Instant::now();
        let artifact = build_artifact(&request.descriptor.spec, &request.field, &snapshot.data, kmeans, ctx)?;
        debug!(
            segment = %snapshot.key,
            rows = snapshot.data.row_count(),
            index_type = %request.descriptor.spec.index_type,
            elapsed_ms = started.elapsed().as_millis(),
            "built segment artifact"
        );
        if let Some(artifact) = artifact {
            artifacts.push((snapshot.key.clone(), artifact));
        }
    }
    ctx.checkpoint()?;
    Ok(artifacts)
}

/// Build segments that were sealed while replacing builds were in flight and
/// attach them under the descriptor that ended up active. Runs until the
/// registry has nothing left to hand back.
fn build_deferred(
    registry: &IndexRegistry,
    parent: &BuildRequest,
    mut next: Option<DeferredBuild>,
    kmeans: &KMeansConfig,
    timeout: Duration,
) {
    while let Some(deferred) = next.take() {
        let request = BuildRequest {
            key: parent.key.clone(),
            descriptor: deferred.descriptor,
            field: parent.field.clone(),
            segments: deferred.segments,
            mode: CommitMode::Extend,
        };
        let token = CancellationToken::new();
        let ticket = match registry.begin_build(&request.key, token.clone(), CommitMode::Extend) {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(field = %request.key, error = %e, "failed to register deferred build");
                return;
            }
        };

        let ctx = BuildContext::new(token, timeout);
        let committed = panic::catch_unwind(AssertUnwindSafe(|| build_segments(&request, kmeans, &ctx)))
            .unwrap_or_else(|_| Err(VectorError::BuildFailed("build worker panicked".to_string())))
            .and_then(|artifacts| {
                registry.commit(&request.key, &ticket, &request.descriptor, artifacts, CommitMode::Extend)
            });
        let built: &[SegmentSnapshot] = if committed.is_ok() { &request.segments } else { &[] };
        match &committed {
            Ok(committed) => debug!(
                field = %request.key,
                index_name = %request.descriptor.index_name,
                segments = request.segments.len(),
                committed = *committed,
                "built deferred segments"
            ),
            Err(e) => warn!(field = %request.key, error = %e, "deferred segment build failed"),
        }

        next = registry.finish(&request.key, &ticket, built).unwrap_or_else(|e| {
            warn!(field = %request.key, error = %e, "failed to unregister deferred build");
            None
        });
    }
}

fn log_result(request: &BuildRequest, result: &BuildResult) {
    let key = &request.key;
    match result {
        Ok(outcome) => info!(
            collection = %key.collection,
            field = %key.field,
            index_name = %outcome.index_name,
            index_type = %outcome.index_type,
            segments = outcome.segments_built,
            committed = outcome.committed,
            elapsed_ms = outcome.elapsed.as_millis(),
            "index build completed"
        ),
        Err(VectorError::BuildCancelled) => {
            warn!(collection = %key.collection, field = %key.field, "index build cancelled");
        }
        Err(VectorError::BuildTimeout(timeout)) => {
            warn!(collection = %key.collection, field = %key.field, ?timeout, "index build timed out");
        }
        Err(e) => warn!(collection = %key.collection, field = %key.field, error = %e, "index build failed"),
    }
}

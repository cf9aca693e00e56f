//! Database configuration.

use std::time::Duration;

use kestreldb_vector::BuildConfig;

/// Configuration options for a [`Database`](crate::Database).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Threads in the index build worker pool.
    pub build_workers: usize,
    /// Ceiling for any index build, synchronous or asynchronous.
    pub build_timeout: Duration,
    /// Segment size bound, in MiB, for collections that do not set one.
    pub default_index_file_size_mb: u64,
    /// Lloyd iterations when training IVF coarse quantizers and PQ codebooks.
    pub kmeans_iterations: usize,
    /// Seed for reproducible training; `None` seeds from entropy.
    pub kmeans_seed: Option<u64>,
    /// Training uses at most `nlist * max_training_points_per_centroid` points.
    pub max_training_points_per_centroid: usize,
    /// Build newly sealed segments of indexed fields in the background.
    pub auto_index_on_flush: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            build_workers: std::thread::available_parallelism().map_or(1, usize::from),
            build_timeout: Duration::from_secs(300),
            default_index_file_size_mb: 1024,
            kmeans_iterations: 10,
            kmeans_seed: Some(0x5EED),
            max_training_points_per_centroid: 256,
            auto_index_on_flush: true,
        }
    }
}

impl Config {
    /// Create a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of build workers.
    #[must_use]
    pub const fn build_workers(mut self, workers: usize) -> Self {
        self.build_workers = workers;
        self
    }

    /// Set the build timeout.
    #[must_use]
    pub const fn build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = timeout;
        self
    }

    /// Set the default segment size bound in MiB.
    #[must_use]
    pub const fn default_index_file_size_mb(mut self, mb: u64) -> Self {
        self.default_index_file_size_mb = mb;
        self
    }

    /// Set the number of k-means iterations.
    #[must_use]
    pub const fn kmeans_iterations(mut self, iterations: usize) -> Self {
        self.kmeans_iterations = iterations;
        self
    }

    /// Set the training seed.
    #[must_use]
    pub const fn kmeans_seed(mut self, seed: Option<u64>) -> Self {
        self.kmeans_seed = seed;
        self
    }

    /// Set the training sample cap per centroid.
    #[must_use]
    pub const fn max_training_points_per_centroid(mut self, points: usize) -> Self {
        self.max_training_points_per_centroid = points;
        self
    }

    /// Enable or disable background builds on flush.
    #[must_use]
    pub const fn auto_index_on_flush(mut self, enabled: bool) -> Self {
        self.auto_index_on_flush = enabled;
        self
    }

    pub(crate) fn build_config(&self) -> BuildConfig {
        BuildConfig::default()
            .with_workers(self.build_workers)
            .with_timeout(self.build_timeout)
            .with_kmeans_iterations(self.kmeans_iterations)
            .with_kmeans_seed(self.kmeans_seed)
            .with_max_points_per_centroid(self.max_training_points_per_centroid)
    }
}

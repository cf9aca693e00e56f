//! K-means clustering for coarse quantizers and PQ codebooks.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

use crate::builder::BuildContext;
use crate::distance::Metric;
use crate::error::VectorError;

/// Configuration for k-means clustering.
#[derive(Debug, Clone)]
pub struct KMeansConfig {
    /// Number of clusters (centroids).
    pub k: usize,
    /// Maximum number of Lloyd iterations.
    pub max_iterations: usize,
    /// Stop once no centroid moves more than this (squared L2).
    pub convergence_threshold: f32,
    /// Random seed for reproducibility; `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Training uses at most `k * max_points_per_centroid` sampled points.
    pub max_points_per_centroid: usize,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            k: 256,
            max_iterations: 10,
            convergence_threshold: 1e-6,
            seed: None,
            max_points_per_centroid: 256,
        }
    }
}

impl KMeansConfig {
    /// Create a new k-means configuration.
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self { k, ..Default::default() }
    }

    /// Set the maximum number of iterations.
    #[must_use]
    pub const fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Set the random seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Set the training sample cap per centroid.
    #[must_use]
    pub const fn with_max_points_per_centroid(mut self, points: usize) -> Self {
        self.max_points_per_centroid = points;
        self
    }

    fn rng(&self) -> StdRng {
        self.seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64)
    }
}

/// Pick the rows used for training: all of them, or a uniform sample when
/// there are more than `k * max_points_per_centroid`.
fn training_rows(rng: &mut StdRng, rows: usize, k: usize, per_centroid: usize) -> Vec<usize> {
    let cap = k.saturating_mul(per_centroid.max(1));
    if rows <= cap {
        (0..rows).collect()
    } else {
        let mut sample = index::sample(rng, rows, cap).into_vec();
        sample.sort_unstable();
        sample
    }
}

/// Float k-means result.
#[derive(Debug, Clone)]
pub struct KMeans {
    centroids: Vec<f32>,
    dimension: usize,
    metric: Metric,
    iterations: usize,
}

impl KMeans {
    /// Train k-means on row-major `data`.
    ///
    /// `k` is capped at the number of rows. Initial centroids are distinct
    /// rows drawn at random.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is empty or not a whole number of rows, or
    /// if the build is cancelled or times out between iterations.
    pub fn train(
        data: &[f32],
        dimension: usize,
        config: &KMeansConfig,
        metric: Metric,
        ctx: &BuildContext,
    ) -> Result<Self, VectorError> {
        if dimension == 0 {
            return Err(VectorError::InvalidDimension { actual: 0, reason: "dimension must be positive" });
        }
        if data.is_empty() || data.len() % dimension != 0 {
            return Err(VectorError::BuildFailed(format!(
                "cannot train k-means on {} values of dimension {dimension}",
                data.len()
            )));
        }
        let rows = data.len() / dimension;
        let k = config.k.min(rows).max(1);
        let mut rng = config.rng();

        let train = training_rows(&mut rng, rows, k, config.max_points_per_centroid);
        let row = |i: usize| &data[i * dimension..(i + 1) * dimension];

        let mut centroids = Vec::with_capacity(k * dimension);
        for i in index::sample(&mut rng, train.len(), k).into_iter() {
            centroids.extend_from_slice(row(train[i]));
        }

        let mut this = Self { centroids, dimension, metric, iterations: 0 };
        let mut assignments = vec![0usize; train.len()];

        for _ in 0..config.max_iterations {
            ctx.checkpoint()?;
            this.iterations += 1;

            for (slot, &r) in assignments.iter_mut().zip(&train) {
                *slot = this.nearest(row(r));
            }

            let mut sums = vec![0.0f32; k * dimension];
            let mut counts = vec![0usize; k];
            for (&cluster, &r) in assignments.iter().zip(&train) {
                counts[cluster] += 1;
                for (acc, &v) in sums[cluster * dimension..(cluster + 1) * dimension].iter_mut().zip(row(r)) {
                    *acc += v;
                }
            }

            let mut max_movement = 0.0f32;
            for cluster in 0..k {
                let range = cluster * dimension..(cluster + 1) * dimension;
                if counts[cluster] == 0 {
                    // Reseed empty clusters from a random training row
                    let r = train[rng.gen_range(0..train.len())];
                    sums[range.clone()].copy_from_slice(row(r));
                } else {
                    let n = counts[cluster] as f32;
                    sums[range.clone()].iter_mut().for_each(|v| *v /= n);
                }
                let moved = Metric::L2.score_float(&sums[range.clone()], &this.centroids[range]);
                max_movement = max_movement.max(moved);
            }
            this.centroids = sums;

            if max_movement < config.convergence_threshold {
                break;
            }
        }

        Ok(this)
    }

    /// Number of centroids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.centroids.len() / self.dimension
    }

    /// Whether there are no centroids.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    /// Iterations actually run.
    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.iterations
    }

    /// Row-major centroids.
    #[must_use]
    pub fn centroids(&self) -> &[f32] {
        &self.centroids
    }

    /// One centroid.
    #[must_use]
    pub fn centroid(&self, cluster: usize) -> &[f32] {
        &self.centroids[cluster * self.dimension..(cluster + 1) * self.dimension]
    }

    /// Index of the best-scoring centroid for `vector`.
    #[must_use]
    pub fn nearest(&self, vector: &[f32]) -> usize {
        let mut best = (0usize, f32::INFINITY);
        for (i, c) in self.centroids.chunks_exact(self.dimension).enumerate() {
            let score = self.metric.score_float(vector, c);
            if score < best.1 {
                best = (i, score);
            }
        }
        best.0
    }

    /// Indexes of the `n` best-scoring centroids, best first.
    #[must_use]
    pub fn nearest_n(&self, vector: &[f32], n: usize) -> Vec<usize> {
        let mut scored: Vec<(usize, f32)> = self
            .centroids
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(i, c)| (i, self.metric.score_float(vector, c)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(n);
        scored.into_iter().map(|(i, _)| i).collect()
    }
}

/// Binary k-means: popcount assignment, majority-bit centroid update.
#[derive(Debug, Clone)]
pub struct BinaryKMeans {
    centroids: Vec<u64>,
    words_per_row: usize,
    metric: Metric,
}

impl BinaryKMeans {
    /// Train on row-major packed bit vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is empty, or if the build is cancelled or
    /// times out between iterations.
    pub fn train(
        data: &[u64],
        words_per_row: usize,
        config: &KMeansConfig,
        metric: Metric,
        ctx: &BuildContext,
    ) -> Result<Self, VectorError> {
        if words_per_row == 0 || data.is_empty() || data.len() % words_per_row != 0 {
            return Err(VectorError::BuildFailed(format!(
                "cannot train binary k-means on {} words of width {words_per_row}",
                data.len()
            )));
        }
        let rows = data.len() / words_per_row;
        let k = config.k.min(rows).max(1);
        let mut rng = config.rng();

        let train = training_rows(&mut rng, rows, k, config.max_points_per_centroid);
        let row = |i: usize| &data[i * words_per_row..(i + 1) * words_per_row];

        let mut centroids = Vec::with_capacity(k * words_per_row);
        for i in index::sample(&mut rng, train.len(), k).into_iter() {
            centroids.extend_from_slice(row(train[i]));
        }
        let mut this = Self { centroids, words_per_row, metric };
        let bits = words_per_row * 64;

        for _ in 0..config.max_iterations {
            ctx.checkpoint()?;

            let mut ones = vec![0u32; k * bits];
            let mut counts = vec![0u32; k];
            for &r in &train {
                let vector = row(r);
                let cluster = this.nearest(vector);
                counts[cluster] += 1;
                let tally = &mut ones[cluster * bits..(cluster + 1) * bits];
                for (w, &word) in vector.iter().enumerate() {
                    let mut rest = word;
                    while rest != 0 {
                        let bit = rest.trailing_zeros() as usize;
                        tally[w * 64 + bit] += 1;
                        rest &= rest - 1;
                    }
                }
            }

            let mut next = vec![0u64; k * words_per_row];
            for cluster in 0..k {
                let out = &mut next[cluster * words_per_row..(cluster + 1) * words_per_row];
                if counts[cluster] == 0 {
                    out.copy_from_slice(row(train[rng.gen_range(0..train.len())]));
                    continue;
                }
                let tally = &ones[cluster * bits..(cluster + 1) * bits];
                for (bit, &count) in tally.iter().enumerate() {
                    if count * 2 > counts[cluster] {
                        out[bit / 64] |= 1u64 << (bit % 64);
                    }
                }
            }

            let converged = next == this.centroids;
            this.centroids = next;
            if converged {
                break;
            }
        }

        Ok(this)
    }

    /// Number of centroids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.centroids.len() / self.words_per_row
    }

    /// Whether there are no centroids.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    /// Index of the best-scoring centroid.
    #[must_use]
    pub fn nearest(&self, vector: &[u64]) -> usize {
        let mut best = (0usize, f32::INFINITY);
        for (i, c) in self.centroids.chunks_exact(self.words_per_row).enumerate() {
            let score = self.metric.score_binary(vector, c);
            if score < best.1 {
                best = (i, score);
            }
        }
        best.0
    }

    /// Indexes of the `n` best-scoring centroids, best first.
    #[must_use]
    pub fn nearest_n(&self, vector: &[u64], n: usize) -> Vec<usize> {
        let mut scored: Vec<(usize, f32)> = self
            .centroids
            .chunks_exact(self.words_per_row)
            .enumerate()
            .map(|(i, c)| (i, self.metric.score_binary(vector, c)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(n);
        scored.into_iter().map(|(i, _)| i).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_clusters() -> Vec<f32> {
        vec![0.0, 0.0, 0.1, 0.1, 0.2, 0.0, 10.0, 10.0, 10.1, 10.1, 10.2, 10.0]
    }

    #[test]
    fn test_kmeans_simple() {
        let data = two_clusters();
        let config = KMeansConfig::new(2).with_seed(Some(42));
        let result = KMeans::train(&data, 2, &config, Metric::L2, &BuildContext::unbounded()).unwrap();

        assert_eq!(result.len(), 2);
        let near = result.nearest(&[0.05, 0.05]);
        let far = result.nearest(&[10.05, 10.05]);
        assert_ne!(near, far);
        assert!(result.centroid(near)[0] < 1.0);
        assert!(result.centroid(far)[0] > 9.0);
    }

    #[test]
    fn test_kmeans_k_larger_than_data() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        let config = KMeansConfig::new(10).with_seed(Some(42));
        let result = KMeans::train(&data, 2, &config, Metric::L2, &BuildContext::unbounded()).unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_kmeans_empty_data() {
        let config = KMeansConfig::new(2);
        assert!(KMeans::train(&[], 2, &config, Metric::L2, &BuildContext::unbounded()).is_err());
    }

    #[test]
    fn test_kmeans_is_reproducible_with_seed() {
        let data: Vec<f32> = (0..200).map(|i| ((i * 37) % 101) as f32).collect();
        let config = KMeansConfig::new(5).with_seed(Some(7));
        let a = KMeans::train(&data, 4, &config, Metric::L2, &BuildContext::unbounded()).unwrap();
        let b = KMeans::train(&data, 4, &config, Metric::L2, &BuildContext::unbounded()).unwrap();
        assert_eq!(a.centroids(), b.centroids());
    }

    #[test]
    fn test_kmeans_stops_when_cancelled() {
        let ctx = BuildContext::unbounded();
        ctx.token().cancel();
        let result = KMeans::train(&two_clusters(), 2, &KMeansConfig::new(2), Metric::L2, &ctx);
        assert!(matches!(result, Err(VectorError::BuildCancelled)));
    }

    #[test]
    fn test_nearest_n_orders_by_score() {
        let data = vec![0.0, 5.0, 10.0];
        let config = KMeansConfig::new(3).with_seed(Some(1)).with_max_iterations(1);
        let result = KMeans::train(&data, 1, &config, Metric::L2, &BuildContext::unbounded()).unwrap();
        let order = result.nearest_n(&[9.0], 3);
        assert_eq!(result.centroid(order[0]), &[10.0]);
        assert_eq!(result.centroid(order[1]), &[5.0]);
    }

    #[test]
    fn test_binary_kmeans_separates_bit_patterns() {
        let data = vec![0b1111, 0b0111, 0b1111_0000_0000, 0b0111_0000_0000];
        let config = KMeansConfig::new(2).with_seed(Some(3));
        let result =
            BinaryKMeans::train(&data, 1, &config, Metric::Hamming, &BuildContext::unbounded()).unwrap();
        assert_eq!(result.len(), 2);
        assert_ne!(result.nearest(&[0b1111]), result.nearest(&[0b1111_0000_0000]));
    }
}

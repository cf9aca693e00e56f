//! Product Quantization.
//!
//! Vectors are split into `m` equal subspaces, each quantized independently
//! against its own codebook of `2^nbits` centroids. Search uses asymmetric
//! distance computation (ADC): a per-query lookup table holds the score of
//! every query subvector against every centroid, and the score of a code is
//! the sum of its table entries.

use crate::builder::BuildContext;
use crate::distance::Metric;
use crate::error::VectorError;

use super::kmeans::{KMeans, KMeansConfig};

/// Product quantizer with one byte per subspace code.
#[derive(Debug, Clone)]
pub struct ProductQuantizer {
    dimension: usize,
    num_subspaces: usize,
    num_centroids: usize,
    metric: Metric,
    /// `codebooks[s]` is row-major `num_centroids * subspace_dim`.
    codebooks: Vec<Vec<f32>>,
}

impl ProductQuantizer {
    /// Train codebooks on row-major `data`.
    ///
    /// Each subspace trains its own k-means with a seed derived from the base
    /// seed so codebooks are reproducible yet not identical.
    ///
    /// # Errors
    ///
    /// Returns an error if `num_subspaces` does not divide `dimension`, if
    /// `nbits` is outside `1..=8`, if `data` is empty, or if the build is
    /// cancelled or times out.
    pub fn train(
        data: &[f32],
        dimension: usize,
        num_subspaces: usize,
        nbits: u8,
        kmeans: &KMeansConfig,
        metric: Metric,
        ctx: &BuildContext,
    ) -> Result<Self, VectorError> {
        if num_subspaces == 0 || dimension % num_subspaces != 0 {
            return Err(VectorError::invalid_param(
                "m",
                format!("{num_subspaces} does not divide dimension {dimension}"),
            ));
        }
        if !(1..=8).contains(&nbits) {
            return Err(VectorError::invalid_param("nbits", "must be between 1 and 8"));
        }
        if data.is_empty() || data.len() % dimension != 0 {
            return Err(VectorError::BuildFailed("cannot train PQ on empty data".to_string()));
        }

        let rows = data.len() / dimension;
        let sub_dim = dimension / num_subspaces;
        let num_centroids = 1usize << nbits;
        let mut codebooks = Vec::with_capacity(num_subspaces);

        for s in 0..num_subspaces {
            ctx.checkpoint()?;
            let mut sub = Vec::with_capacity(rows * sub_dim);
            for row in data.chunks_exact(dimension) {
                sub.extend_from_slice(&row[s * sub_dim..(s + 1) * sub_dim]);
            }
            let config = KMeansConfig {
                k: num_centroids,
                seed: kmeans.seed.map(|seed| seed.wrapping_add(s as u64)),
                ..kmeans.clone()
            };
            let trained = KMeans::train(&sub, sub_dim, &config, Metric::L2, ctx)?;
            // Pad small codebooks so every code byte is a valid index
            let mut book = trained.centroids().to_vec();
            while book.len() < num_centroids * sub_dim {
                let last = book[book.len() - sub_dim..].to_vec();
                book.extend_from_slice(&last);
            }
            codebooks.push(book);
        }

        Ok(Self { dimension, num_subspaces, num_centroids, metric, codebooks })
    }

    /// Number of subspaces (bytes per code).
    #[must_use]
    pub const fn code_size(&self) -> usize {
        self.num_subspaces
    }

    fn sub_dim(&self) -> usize {
        self.dimension / self.num_subspaces
    }

    /// Append the code of one vector to `out`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode_into(&self, vector: &[f32], out: &mut Vec<u8>) {
        debug_assert_eq!(vector.len(), self.dimension);
        let sub_dim = self.sub_dim();
        for (s, book) in self.codebooks.iter().enumerate() {
            let sub = &vector[s * sub_dim..(s + 1) * sub_dim];
            let mut best = (0usize, f32::INFINITY);
            for (c, centroid) in book.chunks_exact(sub_dim).enumerate() {
                let d = Metric::L2.score_float(sub, centroid);
                if d < best.1 {
                    best = (c, d);
                }
            }
            out.push(best.0 as u8);
        }
    }

    /// Reconstruct an approximate vector from a code.
    #[must_use]
    pub fn decode(&self, code: &[u8]) -> Vec<f32> {
        let sub_dim = self.sub_dim();
        let mut vector = Vec::with_capacity(self.dimension);
        for (book, &c) in self.codebooks.iter().zip(code) {
            let c = usize::from(c);
            vector.extend_from_slice(&book[c * sub_dim..(c + 1) * sub_dim]);
        }
        vector
    }

    /// Build the ADC lookup table for a query.
    ///
    /// Shape: `table[s * num_centroids + c]` = score of subvector `s` against centroid `c`.
    #[must_use]
    pub fn distance_table(&self, query: &[f32]) -> Vec<f32> {
        let sub_dim = self.sub_dim();
        let mut table = Vec::with_capacity(self.num_subspaces * self.num_centroids);
        for (s, book) in self.codebooks.iter().enumerate() {
            let sub = &query[s * sub_dim..(s + 1) * sub_dim];
            table.extend(book.chunks_exact(sub_dim).map(|c| self.metric.score_float(sub, c)));
        }
        table
    }

    /// Score one code using a table from [`Self::distance_table`].
    #[inline]
    #[must_use]
    pub fn score_with_table(&self, table: &[f32], code: &[u8]) -> f32 {
        code.iter()
            .enumerate()
            .map(|(s, &c)| table[s * self.num_centroids + usize::from(c)])
            .sum()
    }
}

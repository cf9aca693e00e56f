//! HNSW index configuration.

/// Configuration parameters for an HNSW artifact.
///
/// # Parameters
///
/// * `m` - Maximum number of connections per node in each upper layer.
///   Higher values give better recall but use more memory.
///
/// * `m_max0` - Maximum number of connections in layer 0 (the densest layer).
///   Typically set to `2 * m`.
///
/// * `ef_construction` - Beam width during construction.
///
/// * `ef_search` - Default beam width during search, raised to `k` when smaller.
///
/// * `ml` - Level multiplier, `1 / ln(m)`. Affects the distribution of nodes
///   across layers.
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Maximum number of connections per node (M parameter).
    pub m: usize,
    /// Maximum connections in layer 0 (typically 2 * M).
    pub m_max0: usize,
    /// Beam width for construction.
    pub ef_construction: usize,
    /// Default beam width for search.
    pub ef_search: usize,
    /// Level multiplier (1 / ln(M)).
    pub ml: f64,
    /// Seed for the level generator.
    pub seed: u64,
}

impl HnswConfig {
    /// Create a new HNSW configuration with the specified M parameter.
    ///
    /// Other parameters are set to defaults:
    /// - `m_max0` = 2 * m
    /// - `ef_construction` = 200
    /// - `ef_search` = 64
    /// - `ml` = 1 / ln(m)
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // m is small (4-64), so no precision loss
    pub fn new(m: usize) -> Self {
        let m = m.max(2);
        Self {
            m,
            m_max0: m * 2,
            ef_construction: 200,
            ef_search: 64,
            ml: 1.0 / (m as f64).ln(),
            seed: 0x5EED,
        }
    }

    /// Set the beam width for construction.
    #[must_use]
    pub const fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef;
        self
    }

    /// Set the default beam width for search.
    #[must_use]
    pub const fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    /// Set the level generator seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl Default for HnswConfig {
    /// Uses M=16, a good balance between recall and speed.
    fn default() -> Self {
        Self::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HnswConfig::default();
        assert_eq!(config.m, 16);
        assert_eq!(config.m_max0, 32);
        assert!((config.ml - 1.0 / 16f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_m_is_at_least_two() {
        assert_eq!(HnswConfig::new(0).m, 2);
    }
}

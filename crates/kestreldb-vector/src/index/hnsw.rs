//! HNSW (Hierarchical Navigable Small World) artifact.
//!
//! The graph is built once over a sealed segment and never mutated
//! afterwards, so searches need no locking.

use kestreldb_core::EntityId;
use tracing::debug;

use super::config::HnswConfig;
use super::graph::{search_layer, select_neighbors_heuristic, Candidate, HnswGraph, HnswNode};
use super::{IndexType, SearchParams, SegmentIndex};
use crate::builder::BuildContext;
use crate::distance::Metric;
use crate::error::VectorError;
use crate::ops::Neighbor;
use crate::types::QueryRef;

/// Random level generator for HNSW.
///
/// Generates node levels using an exponential distribution.
struct LevelGenerator {
    ml: f64,
    rng_state: u64,
}

impl LevelGenerator {
    fn new(ml: f64, seed: u64) -> Self {
        // xorshift never leaves the zero state
        Self { ml, rng_state: seed.max(1) }
    }

    #[allow(clippy::cast_precision_loss)] // Intentional: precision loss is acceptable for RNG
    #[allow(clippy::cast_possible_truncation)] // Intentional: level is bounded by min(16)
    #[allow(clippy::cast_sign_loss)] // Level is always non-negative after floor
    fn generate_level(&mut self) -> usize {
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;

        let uniform = (x as f64) / (u64::MAX as f64);
        let level = (-uniform.ln() * self.ml).floor() as usize;

        // Cap at reasonable maximum to prevent pathological cases
        level.min(16)
    }
}

/// Graph-based approximate nearest neighbor artifact.
#[derive(Debug)]
pub struct HnswIndex {
    ids: Vec<EntityId>,
    graph: HnswGraph,
    config: HnswConfig,
}

impl HnswIndex {
    /// Build a graph over row-major `vectors`.
    ///
    /// # Errors
    ///
    /// Returns an error if the build is cancelled or times out.
    pub fn build(
        config: HnswConfig,
        metric: Metric,
        dimension: usize,
        ids: &[EntityId],
        vectors: &[f32],
        ctx: &BuildContext,
    ) -> Result<Self, VectorError> {
        let mut graph = HnswGraph::new(dimension, metric, vectors.to_vec());
        let mut levels = LevelGenerator::new(config.ml, config.seed);

        for row in 0..ids.len() {
            if row % 256 == 0 {
                ctx.checkpoint()?;
            }
            let node = u32::try_from(row)
                .map_err(|_| VectorError::BuildFailed("segment too large for HNSW".to_string()))?;
            Self::insert(&mut graph, &config, node, levels.generate_level());
        }

        debug!(rows = ids.len(), max_layer = graph.max_layer, m = config.m, "built HNSW artifact");
        Ok(Self { ids: ids.to_vec(), graph, config })
    }

    /// Insert row `node` with the given level, connecting it to the graph.
    fn insert(graph: &mut HnswGraph, config: &HnswConfig, node: u32, node_level: usize) {
        graph.nodes.push(HnswNode::new(node_level));
        let query = graph.vector(node).to_vec();

        let Some(entry_point) = graph.entry_point else {
            graph.entry_point = Some(node);
            graph.max_layer = node_level;
            return;
        };
        let current_max_layer = graph.max_layer;

        // Descend greedily to the insertion level
        let mut current_ep = vec![entry_point];
        for layer in (node_level + 1..=current_max_layer).rev() {
            let nearest: Vec<u32> =
                search_layer(graph, &query, &current_ep, 1, layer).into_iter().map(|c| c.node).collect();
            if !nearest.is_empty() {
                current_ep = nearest;
            }
        }

        for layer in (0..=node_level.min(current_max_layer)).rev() {
            let candidates = search_layer(graph, &query, &current_ep, config.ef_construction, layer);
            let max_conn = if layer == 0 { config.m_max0 } else { config.m };
            let neighbors = select_neighbors_heuristic(graph, &candidates, config.m);

            if let Some(n) = graph.node_mut(node) {
                n.set_connections(layer, neighbors.clone());
            }

            // Add reverse edges, pruning neighbors that overflow
            for &neighbor in &neighbors {
                let overflow = match graph.node_mut(neighbor) {
                    Some(n) => {
                        n.add_connection(layer, node);
                        n.connections_at(layer).len() > max_conn
                    }
                    None => false,
                };
                if overflow {
                    let base = graph.vector(neighbor).to_vec();
                    let conns: Vec<Candidate> = graph
                        .node(neighbor)
                        .map(|n| n.connections_at(layer).to_vec())
                        .unwrap_or_default()
                        .into_iter()
                        .map(|c| Candidate::new(c, graph.distance_to_node(&base, c)))
                        .collect();
                    let pruned = select_neighbors_heuristic(graph, &conns, max_conn);
                    if let Some(n) = graph.node_mut(neighbor) {
                        n.set_connections(layer, pruned);
                    }
                }
            }

            if !candidates.is_empty() {
                current_ep = candidates.into_iter().map(|c| c.node).collect();
            }
        }

        if node_level > current_max_layer {
            graph.entry_point = Some(node);
            graph.max_layer = node_level;
        }
    }

    /// The configuration used to build this artifact.
    #[must_use]
    pub fn config(&self) -> &HnswConfig {
        &self.config
    }
}

impl SegmentIndex for HnswIndex {
    fn index_type(&self) -> IndexType {
        IndexType::Hnsw
    }

    fn metric(&self) -> Metric {
        self.graph.metric
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn search(
        &self,
        query: QueryRef<'_>,
        k: usize,
        params: &SearchParams,
    ) -> Result<Vec<Neighbor>, VectorError> {
        let QueryRef::Float(query) = query else {
            return Err(VectorError::WrongVectorKind { field: "HNSW".to_string(), expected: "float" });
        };
        if query.len() != self.graph.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.graph.dimension,
                actual: query.len(),
            });
        }
        let Some(entry_point) = self.graph.entry_point else {
            return Ok(Vec::new());
        };

        let mut current_ep = vec![entry_point];
        for layer in (1..=self.graph.max_layer).rev() {
            let nearest: Vec<u32> = search_layer(&self.graph, query, &current_ep, 1, layer)
                .into_iter()
                .map(|c| c.node)
                .collect();
            if !nearest.is_empty() {
                current_ep = nearest;
            }
        }

        let ef = params.ef.unwrap_or(self.config.ef_search).max(k);
        let found = search_layer(&self.graph, query, &current_ep, ef, 0);
        Ok(found
            .into_iter()
            .take(k)
            .map(|c| Neighbor::new(self.ids[c.node as usize], c.distance))
            .collect())
    }
}

//! HNSW graph data structure.
//!
//! Nodes are addressed by their row number in the segment. Vectors live in
//! one row-major buffer next to the adjacency lists.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::distance::Metric;

/// A node in the HNSW graph.
#[derive(Debug, Clone)]
pub(crate) struct HnswNode {
    /// The maximum layer this node appears in.
    pub max_layer: usize,
    /// `connections[layer]` = neighbor rows at that layer.
    pub connections: Vec<Vec<u32>>,
}

impl HnswNode {
    pub fn new(max_layer: usize) -> Self {
        Self { max_layer, connections: vec![Vec::new(); max_layer + 1] }
    }

    #[inline]
    pub fn connections_at(&self, layer: usize) -> &[u32] {
        self.connections.get(layer).map_or(&[], Vec::as_slice)
    }

    #[inline]
    pub fn add_connection(&mut self, layer: usize, neighbor: u32) {
        if layer < self.connections.len() && !self.connections[layer].contains(&neighbor) {
            self.connections[layer].push(neighbor);
        }
    }

    #[inline]
    pub fn set_connections(&mut self, layer: usize, neighbors: Vec<u32>) {
        if layer < self.connections.len() {
            self.connections[layer] = neighbors;
        }
    }
}

/// The HNSW graph structure.
#[derive(Debug)]
pub(crate) struct HnswGraph {
    pub nodes: Vec<HnswNode>,
    pub vectors: Vec<f32>,
    pub dimension: usize,
    pub metric: Metric,
    pub entry_point: Option<u32>,
    pub max_layer: usize,
}

impl HnswGraph {
    pub fn new(dimension: usize, metric: Metric, vectors: Vec<f32>) -> Self {
        Self { nodes: Vec::new(), vectors, dimension, metric, entry_point: None, max_layer: 0 }
    }

    #[inline]
    pub fn vector(&self, node: u32) -> &[f32] {
        let start = node as usize * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    #[inline]
    pub fn node(&self, node: u32) -> Option<&HnswNode> {
        self.nodes.get(node as usize)
    }

    #[inline]
    pub fn node_mut(&mut self, node: u32) -> Option<&mut HnswNode> {
        self.nodes.get_mut(node as usize)
    }

    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        self.metric.score_float(a, b)
    }

    #[inline]
    pub fn distance_to_node(&self, query: &[f32], node: u32) -> f32 {
        self.distance(query, self.vector(node))
    }
}

/// A candidate during HNSW search, ordered as a min-heap on distance.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub node: u32,
    pub distance: f32,
}

impl Candidate {
    #[inline]
    pub const fn new(node: u32, distance: f32) -> Self {
        Self { node, distance }
    }
}

impl PartialEq for Candidate {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (smallest distance first)
        other.distance.total_cmp(&self.distance).then_with(|| other.node.cmp(&self.node))
    }
}

/// A max-heap candidate for tracking the worst element in the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MaxCandidate(pub Candidate);

impl PartialOrd for MaxCandidate {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MaxCandidate {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cmp(&self.0)
    }
}

/// Greedy search of one layer, returning up to `ef` candidates sorted by distance.
pub(crate) fn search_layer(
    graph: &HnswGraph,
    query: &[f32],
    entry_points: &[u32],
    ef: usize,
    layer: usize,
) -> Vec<Candidate> {
    if entry_points.is_empty() {
        return Vec::new();
    }

    let mut candidates: BinaryHeap<Candidate> = BinaryHeap::new();
    let mut results: BinaryHeap<MaxCandidate> = BinaryHeap::new();
    let mut visited: HashSet<u32> = HashSet::new();

    for &ep in entry_points {
        if visited.insert(ep) {
            let candidate = Candidate::new(ep, graph.distance_to_node(query, ep));
            candidates.push(candidate);
            results.push(MaxCandidate(candidate));
        }
    }
    while results.len() > ef {
        results.pop();
    }

    while let Some(current) = candidates.pop() {
        let furthest = results.peek().map_or(f32::INFINITY, |c| c.0.distance);
        if current.distance > furthest {
            break;
        }

        let Some(node) = graph.node(current.node) else {
            continue;
        };
        for &neighbor in node.connections_at(layer) {
            if !visited.insert(neighbor) {
                continue;
            }
            let distance = graph.distance_to_node(query, neighbor);
            let furthest = results.peek().map_or(f32::INFINITY, |c| c.0.distance);
            if results.len() < ef || distance < furthest {
                let candidate = Candidate::new(neighbor, distance);
                candidates.push(candidate);
                results.push(MaxCandidate(candidate));
                if results.len() > ef {
                    results.pop();
                }
            }
        }
    }

    let mut out: Vec<Candidate> = results.into_iter().map(|c| c.0).collect();
    out.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    out
}

/// Select neighbors preferring diversity: a candidate is skipped when it is
/// closer to an already selected neighbor than to the base node. Gaps are
/// filled with the closest skipped candidates.
pub(crate) fn select_neighbors_heuristic(
    graph: &HnswGraph,
    candidates: &[Candidate],
    m: usize,
) -> Vec<u32> {
    if candidates.len() <= m {
        return candidates.iter().map(|c| c.node).collect();
    }

    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    let mut selected: Vec<u32> = Vec::with_capacity(m);
    for candidate in &sorted {
        if selected.len() >= m {
            break;
        }
        let v = graph.vector(candidate.node);
        let diverse = selected
            .iter()
            .all(|&s| graph.distance(v, graph.vector(s)) >= candidate.distance);
        if diverse || selected.is_empty() {
            selected.push(candidate.node);
        }
    }

    for candidate in &sorted {
        if selected.len() >= m {
            break;
        }
        if !selected.contains(&candidate.node) {
            selected.push(candidate.node);
        }
    }
    selected
}

//! Bounded top-k selection.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use kestreldb_core::EntityId;

use super::Neighbor;

/// Max-heap entry: the worst candidate sits on top so it can be evicted.
#[derive(Debug)]
struct MaxHeapEntry(Neighbor);

impl PartialEq for MaxHeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MaxHeapEntry {}

impl PartialOrd for MaxHeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MaxHeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Ties broken by id so merged results are deterministic
        self.0.score.total_cmp(&other.0.score).then_with(|| self.0.id.cmp(&other.0.id))
    }
}

/// Keeps the `k` lowest-scoring candidates.
#[derive(Debug)]
pub struct TopK {
    k: usize,
    heap: BinaryHeap<MaxHeapEntry>,
}

impl TopK {
    /// Create a collector for `k` results.
    #[must_use]
    pub fn new(k: usize) -> Self {
        // Use saturating_add to avoid overflow when k is usize::MAX
        Self { k, heap: BinaryHeap::with_capacity(k.saturating_add(1).min(1024)) }
    }

    /// Offer a candidate.
    #[inline]
    pub fn push(&mut self, id: EntityId, score: f32) {
        if self.k == 0 {
            return;
        }
        let entry = MaxHeapEntry(Neighbor::new(id, score));
        if self.heap.len() < self.k {
            self.heap.push(entry);
        } else if let Some(worst) = self.heap.peek() {
            if entry < *worst {
                self.heap.pop();
                self.heap.push(entry);
            }
        }
    }

    /// Offer every candidate of an iterator.
    pub fn extend(&mut self, neighbors: impl IntoIterator<Item = Neighbor>) {
        for n in neighbors {
            self.push(n.id, n.score);
        }
    }

    /// Score of the current worst kept candidate, once `k` are held.
    #[must_use]
    pub fn threshold(&self) -> Option<f32> {
        if self.heap.len() < self.k {
            None
        } else {
            self.heap.peek().map(|e| e.0.score)
        }
    }

    /// Number of candidates held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether nothing has been kept.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// The kept candidates, best first.
    #[must_use]
    pub fn into_sorted_vec(self) -> Vec<Neighbor> {
        self.heap.into_sorted_vec().into_iter().map(|e| e.0).collect()
    }
}

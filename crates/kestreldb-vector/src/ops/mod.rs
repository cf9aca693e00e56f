//! Search operators shared by artifacts and the query executor.
//!
//! - [`TopK`] keeps the `k` best candidates seen so far in a bounded max-heap
//! - [`ExactKnn`] scans a column by brute force

mod exact_knn;
mod top_k;

pub use exact_knn::ExactKnn;
pub use top_k::TopK;

use kestreldb_core::EntityId;

/// A candidate produced by a search.
///
/// `score` is smaller-is-better; see [`Metric::to_distance`](crate::distance::Metric::to_distance).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// The entity id.
    pub id: EntityId,
    /// Internal score, smaller is better.
    pub score: f32,
}

impl Neighbor {
    /// Create a new neighbor.
    #[must_use]
    pub const fn new(id: EntityId, score: f32) -> Self {
        Self { id, score }
    }
}

//! Vector quantization and clustering.
//!
//! - [`KMeans`] / [`BinaryKMeans`]: coarse quantizers for the IVF family
//! - [`ScalarQuantizer`]: per-dimension 8-bit codes (IVF_SQ8)
//! - [`ProductQuantizer`]: subspace codebooks with asymmetric distance (IVF_PQ)

mod kmeans;
mod pq;
mod sq8;

pub use kmeans::{BinaryKMeans, KMeans, KMeansConfig};
pub use pq::ProductQuantizer;
pub use sq8::ScalarQuantizer;

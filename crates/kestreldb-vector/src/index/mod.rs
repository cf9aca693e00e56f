//! Index types, per-segment index artifacts and the index registry.
//!
//! An [`IndexDescriptor`] binds a field to an index algorithm and its build
//! parameters. Building a descriptor over a sealed segment produces an
//! immutable artifact implementing [`SegmentIndex`]; the [`IndexRegistry`]
//! tracks which artifact is active for each segment.
//!
//! # Supported index types
//!
//! | Type | Field | Artifact |
//! |---|---|---|
//! | `FLAT` | float | [`FlatIndex`] |
//! | `IVF_FLAT`, `IVF_SQ8`, `IVF_PQ` | float | [`IvfIndex`] |
//! | `HNSW` | float | [`HnswIndex`] |
//! | `BIN_FLAT` | binary | none, segments use exact scan |
//! | `BIN_IVF_FLAT` | binary | [`BinaryIvfIndex`] |

mod bin_ivf;
mod config;
mod flat;
mod graph;
mod hnsw;
mod ivf;
mod params;
mod registry;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use bin_ivf::BinaryIvfIndex;
pub use config::HnswConfig;
pub use flat::FlatIndex;
pub use hnsw::HnswIndex;
pub use ivf::{IvfEncoding, IvfIndex};
pub use params::{
    IndexDescriptor, IndexParams, IndexSpec, SearchParams, DEFAULT_NPROBE, MAX_EF, MAX_NLIST, MAX_TOP_K,
};
pub use registry::{BuildTicket, CommitMode, DeferredBuild, FieldKey, IndexRegistry, SealedRoute};

use crate::distance::Metric;
use crate::error::VectorError;
use crate::ops::Neighbor;
use crate::types::{FieldType, QueryRef};

/// Supported index algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    /// Exact search over a copy of the segment.
    #[serde(rename = "FLAT")]
    Flat,
    /// Inverted lists of raw vectors.
    #[serde(rename = "IVF_FLAT")]
    IvfFlat,
    /// Inverted lists of 8-bit scalar codes.
    #[serde(rename = "IVF_SQ8")]
    IvfSq8,
    /// Inverted lists of product-quantized codes.
    #[serde(rename = "IVF_PQ")]
    IvfPq,
    /// Hierarchical navigable small world graph.
    #[serde(rename = "HNSW")]
    Hnsw,
    /// Exact binary search; attaches no artifact.
    #[serde(rename = "BIN_FLAT")]
    BinFlat,
    /// Inverted lists of binary vectors.
    #[serde(rename = "BIN_IVF_FLAT")]
    BinIvfFlat,
}

impl IndexType {
    /// Every index type.
    pub const ALL: [Self; 7] = [
        Self::Flat,
        Self::IvfFlat,
        Self::IvfSq8,
        Self::IvfPq,
        Self::Hnsw,
        Self::BinFlat,
        Self::BinIvfFlat,
    ];

    /// The canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "FLAT",
            Self::IvfFlat => "IVF_FLAT",
            Self::IvfSq8 => "IVF_SQ8",
            Self::IvfPq => "IVF_PQ",
            Self::Hnsw => "HNSW",
            Self::BinFlat => "BIN_FLAT",
            Self::BinIvfFlat => "BIN_IVF_FLAT",
        }
    }

    /// The field type this index can be built on.
    #[must_use]
    pub const fn field_type(self) -> FieldType {
        match self {
            Self::BinFlat | Self::BinIvfFlat => FieldType::BinaryVector,
            _ => FieldType::FloatVector,
        }
    }

    /// Whether the type partitions vectors into `nlist` clusters.
    #[must_use]
    pub const fn is_ivf(self) -> bool {
        matches!(self, Self::IvfFlat | Self::IvfSq8 | Self::IvfPq | Self::BinIvfFlat)
    }

    /// Whether building this type attaches an artifact to segments.
    #[must_use]
    pub const fn has_artifact(self) -> bool {
        !matches!(self, Self::BinFlat)
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexType {
    type Err = VectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| VectorError::invalid_param("index_type", format!("unknown index type '{s}'")))
    }
}

/// An immutable index built over one sealed segment.
pub trait SegmentIndex: Send + Sync + fmt::Debug {
    /// The algorithm that built this artifact.
    fn index_type(&self) -> IndexType;

    /// The metric the artifact was built for.
    fn metric(&self) -> Metric;

    /// Number of indexed rows.
    fn len(&self) -> usize;

    /// Whether the artifact indexes no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return up to `k` neighbors of `query`, best first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query does not match the indexed field.
    fn search(
        &self,
        query: QueryRef<'_>,
        k: usize,
        params: &SearchParams,
    ) -> Result<Vec<Neighbor>, VectorError>;
}

/// Shared handle to a built artifact.
pub type ArtifactHandle = Arc<dyn SegmentIndex>;

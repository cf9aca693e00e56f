//! Distance functions for vector similarity.
//!
//! Float vectors use SIMD kernels built on the `wide` crate; binary vectors
//! use popcount kernels over `u64` words.
//!
//! # Scores and distances
//!
//! Internally every search orders candidates by a *score* where smaller is
//! better. For most metrics the score is the reported distance. For inner
//! product the score is the negated dot product, and [`Metric::to_distance`]
//! turns it back into the positive similarity callers see.

pub mod binary;
mod simd;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use simd::{dot_product, euclidean_distance_squared};

use crate::error::VectorError;
use crate::types::FieldType;

/// Distance metric used to compare vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Metric {
    /// Squared Euclidean distance (float fields).
    L2,
    /// Inner product, larger is more similar (float fields).
    IP,
    /// Jaccard distance (binary fields).
    Jaccard,
    /// Hamming distance, the count of differing bits (binary fields).
    Hamming,
    /// Tanimoto distance, `-log2(jaccard similarity)` (binary fields).
    Tanimoto,
}

impl Metric {
    /// Whether this metric compares binary vectors.
    #[must_use]
    pub const fn is_binary(self) -> bool {
        matches!(self, Self::Jaccard | Self::Hamming | Self::Tanimoto)
    }

    /// Whether larger reported values mean more similar.
    #[must_use]
    pub const fn higher_is_better(self) -> bool {
        matches!(self, Self::IP)
    }

    /// Whether this metric can be used on a field of the given type.
    #[must_use]
    pub const fn supports(self, field_type: FieldType) -> bool {
        match field_type {
            FieldType::FloatVector => !self.is_binary(),
            FieldType::BinaryVector => self.is_binary(),
        }
    }

    /// Ensure this metric can be used on a field of the given type.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::InvalidParameter`] for a float metric on a
    /// binary field or the reverse.
    pub fn check_field(self, field_type: FieldType) -> Result<(), VectorError> {
        if self.supports(field_type) {
            Ok(())
        } else {
            Err(VectorError::invalid_param(
                "metric_type",
                format!("{self} cannot be used on {field_type} fields"),
            ))
        }
    }

    /// Score two float vectors (smaller is better).
    #[inline]
    #[must_use]
    pub fn score_float(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::L2 => euclidean_distance_squared(a, b),
            Self::IP => -dot_product(a, b),
            Self::Jaccard | Self::Hamming | Self::Tanimoto => {
                debug_assert!(false, "binary metric {self} used on float vectors");
                f32::INFINITY
            }
        }
    }

    /// Score two bit-packed binary vectors (smaller is better).
    #[inline]
    #[must_use]
    pub fn score_binary(self, a: &[u64], b: &[u64]) -> f32 {
        match self {
            Self::Hamming => binary::hamming_distance(a, b) as f32,
            Self::Jaccard => binary::jaccard_distance(a, b),
            Self::Tanimoto => binary::tanimoto_distance(a, b),
            Self::L2 | Self::IP => {
                debug_assert!(false, "float metric {self} used on binary vectors");
                f32::INFINITY
            }
        }
    }

    /// Convert an internal score into the distance reported to callers.
    #[inline]
    #[must_use]
    pub fn to_distance(self, score: f32) -> f32 {
        if self.higher_is_better() {
            -score
        } else {
            score
        }
    }

    /// The metric name as used in index and search parameters.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::L2 => "L2",
            Self::IP => "IP",
            Self::Jaccard => "JACCARD",
            Self::Hamming => "HAMMING",
            Self::Tanimoto => "TANIMOTO",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = VectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "L2" => Ok(Self::L2),
            "IP" => Ok(Self::IP),
            "JACCARD" => Ok(Self::Jaccard),
            "HAMMING" => Ok(Self::Hamming),
            "TANIMOTO" => Ok(Self::Tanimoto),
            _ => Err(VectorError::invalid_param("metric_type", format!("unknown metric '{s}'"))),
        }
    }
}

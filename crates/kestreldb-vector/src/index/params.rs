//! Index descriptors, build parameters and search parameters.
//!
//! Build parameters arrive as JSON, either flat
//! (`{"index_type": "IVF_FLAT", "nlist": 1024}`) or with a nested
//! `params` object (`{"index_type": "IVF_FLAT", "params": {"nlist": 1024}}`).
//! Keys that do not apply to the index type are ignored.

use kestreldb_core::IndexName;
use serde::Serialize;
use serde_json::{Map, Value};

use super::IndexType;
use crate::distance::Metric;
use crate::error::VectorError;
use crate::types::FieldSchema;

/// Largest accepted `nlist`.
pub const MAX_NLIST: usize = 65_536;
/// Largest accepted `top_k`.
pub const MAX_TOP_K: usize = 16_384;
/// Largest accepted HNSW search `ef`.
pub const MAX_EF: usize = 32_768;
/// `nprobe` used when a search does not set one.
pub const DEFAULT_NPROBE: usize = 16;
/// Default PQ code width.
pub const DEFAULT_NBITS: u8 = 8;
/// Default HNSW `M`.
pub const DEFAULT_HNSW_M: usize = 16;
/// Default HNSW `efConstruction`.
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Type-specific build parameters. Only the fields the index type uses are set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexParams {
    /// Number of IVF clusters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nlist: Option<usize>,
    /// Number of PQ subspaces.
    #[serde(rename = "m", skip_serializing_if = "Option::is_none")]
    pub pq_m: Option<usize>,
    /// Bits per PQ code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbits: Option<u8>,
    /// HNSW maximum connections per node.
    #[serde(rename = "M", skip_serializing_if = "Option::is_none")]
    pub hnsw_m: Option<usize>,
    /// HNSW construction beam width.
    #[serde(rename = "efConstruction", skip_serializing_if = "Option::is_none")]
    pub ef_construction: Option<usize>,
}

impl IndexParams {
    /// No parameters set.
    pub const NONE: Self =
        Self { nlist: None, pq_m: None, nbits: None, hnsw_m: None, ef_construction: None };
}

/// An index algorithm plus its build parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexSpec {
    /// The algorithm.
    pub index_type: IndexType,
    /// Metric override; the field's metric is used when absent.
    #[serde(rename = "metric_type", skip_serializing_if = "Option::is_none")]
    pub metric: Option<Metric>,
    /// Build parameters.
    pub params: IndexParams,
}

fn read_usize(obj: &Map<String, Value>, key: &str) -> Result<Option<usize>, VectorError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| {
                VectorError::invalid_param(key, format!("expected a non-negative integer, got {value}"))
            }),
    }
}

fn check_range(key: &str, value: usize, min: usize, max: usize) -> Result<(), VectorError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(VectorError::invalid_param(key, format!("{value} is outside {min}..={max}")))
    }
}

impl IndexSpec {
    /// A spec with no parameters set.
    #[must_use]
    pub const fn new(index_type: IndexType) -> Self {
        Self { index_type, metric: None, params: IndexParams::NONE }
    }

    /// Set `nlist`.
    #[must_use]
    pub const fn with_nlist(mut self, nlist: usize) -> Self {
        self.params.nlist = Some(nlist);
        self
    }

    /// Set the PQ subspace count and code width.
    #[must_use]
    pub const fn with_pq(mut self, m: usize, nbits: u8) -> Self {
        self.params.pq_m = Some(m);
        self.params.nbits = Some(nbits);
        self
    }

    /// Set HNSW `M` and `efConstruction`.
    #[must_use]
    pub const fn with_hnsw(mut self, m: usize, ef_construction: usize) -> Self {
        self.params.hnsw_m = Some(m);
        self.params.ef_construction = Some(ef_construction);
        self
    }

    /// Override the field's metric.
    #[must_use]
    pub const fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = Some(metric);
        self
    }

    /// Parse a spec from JSON and range-check its parameters.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::InvalidParameter`] for a missing or unknown
    /// `index_type`, a malformed value, or an out-of-range parameter.
    pub fn from_json(value: &Value) -> Result<Self, VectorError> {
        let obj = value
            .as_object()
            .ok_or_else(|| VectorError::invalid_param("params", "expected a JSON object"))?;

        let index_type = match obj.get("index_type") {
            Some(Value::String(s)) => s.parse::<IndexType>()?,
            Some(other) => {
                return Err(VectorError::invalid_param("index_type", format!("expected a string, got {other}")))
            }
            None => return Err(VectorError::invalid_param("index_type", "missing")),
        };

        let metric = match obj.get("metric_type") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.parse::<Metric>()?),
            Some(other) => {
                return Err(VectorError::invalid_param("metric_type", format!("expected a string, got {other}")))
            }
        };

        let params_obj = match obj.get("params") {
            Some(Value::Object(nested)) => nested,
            Some(other) => {
                return Err(VectorError::invalid_param("params", format!("expected an object, got {other}")))
            }
            None => obj,
        };

        let mut params = IndexParams::default();
        if index_type.is_ivf() {
            params.nlist = read_usize(params_obj, "nlist")?;
        }
        match index_type {
            IndexType::IvfPq => {
                params.pq_m = read_usize(params_obj, "m")?;
                let nbits = read_usize(params_obj, "nbits")?.unwrap_or(usize::from(DEFAULT_NBITS));
                check_range("nbits", nbits, 1, 8)?;
                params.nbits = u8::try_from(nbits).ok();
            }
            IndexType::Hnsw => {
                params.hnsw_m = Some(read_usize(params_obj, "M")?.unwrap_or(DEFAULT_HNSW_M));
                params.ef_construction =
                    Some(read_usize(params_obj, "efConstruction")?.unwrap_or(DEFAULT_EF_CONSTRUCTION));
            }
            _ => {}
        }

        let spec = Self { index_type, metric, params };
        spec.check_ranges()?;
        Ok(spec)
    }

    /// Render the spec as JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    fn check_ranges(&self) -> Result<(), VectorError> {
        if self.index_type.is_ivf() {
            let nlist = self.params.nlist.ok_or_else(|| {
                VectorError::invalid_param("nlist", format!("required for {}", self.index_type))
            })?;
            check_range("nlist", nlist, 1, MAX_NLIST)?;
        }
        match self.index_type {
            IndexType::IvfPq => {
                let m = self
                    .params
                    .pq_m
                    .ok_or_else(|| VectorError::invalid_param("m", "required for IVF_PQ"))?;
                if m == 0 {
                    return Err(VectorError::invalid_param("m", "must be positive"));
                }
                check_range("nbits", usize::from(self.nbits()), 1, 8)?;
            }
            IndexType::Hnsw => {
                check_range("M", self.hnsw_m(), 4, 64)?;
                check_range("efConstruction", self.ef_construction(), 8, 512)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Full validation against the field the index will be built on.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::UnsupportedIndex`] if the index type does not
    /// apply to the field type, or [`VectorError::InvalidParameter`] for a
    /// bad parameter or incompatible metric.
    pub fn validate_for(&self, field: &FieldSchema) -> Result<(), VectorError> {
        if self.index_type.field_type() != field.field_type {
            return Err(VectorError::UnsupportedIndex {
                index_type: self.index_type.to_string(),
                field_type: field.field_type.to_string(),
            });
        }
        self.check_ranges()?;
        self.metric_for(field).check_field(field.field_type)?;
        if self.index_type == IndexType::IvfPq {
            let m = self.pq_m();
            if m > field.dimension || field.dimension % m != 0 {
                return Err(VectorError::invalid_param(
                    "m",
                    format!("{m} does not divide dimension {}", field.dimension),
                ));
            }
        }
        Ok(())
    }

    /// The metric artifacts of this spec use on `field`.
    #[must_use]
    pub fn metric_for(&self, field: &FieldSchema) -> Metric {
        self.metric.unwrap_or(field.metric)
    }

    /// `nlist`, or 1 for non-IVF types.
    #[must_use]
    pub fn nlist(&self) -> usize {
        self.params.nlist.unwrap_or(1)
    }

    /// PQ subspace count.
    #[must_use]
    pub fn pq_m(&self) -> usize {
        self.params.pq_m.unwrap_or(1)
    }

    /// PQ code width.
    #[must_use]
    pub fn nbits(&self) -> u8 {
        self.params.nbits.unwrap_or(DEFAULT_NBITS)
    }

    /// HNSW `M`.
    #[must_use]
    pub fn hnsw_m(&self) -> usize {
        self.params.hnsw_m.unwrap_or(DEFAULT_HNSW_M)
    }

    /// HNSW `efConstruction`.
    #[must_use]
    pub fn ef_construction(&self) -> usize {
        self.params.ef_construction.unwrap_or(DEFAULT_EF_CONSTRUCTION)
    }
}

/// A named index on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDescriptor {
    /// Index name; defaults to the index type name.
    pub index_name: IndexName,
    /// Algorithm and parameters.
    #[serde(flatten)]
    pub spec: IndexSpec,
}

impl IndexDescriptor {
    /// Create a descriptor.
    #[must_use]
    pub const fn new(index_name: IndexName, spec: IndexSpec) -> Self {
        Self { index_name, spec }
    }

    /// Create a descriptor named after its index type.
    ///
    /// # Errors
    ///
    /// Never fails for the built-in type names; the `Result` mirrors
    /// [`IndexName::new`].
    pub fn unnamed(spec: IndexSpec) -> Result<Self, VectorError> {
        Ok(Self { index_name: IndexName::new(spec.index_type.as_str())?, spec })
    }
}

/// Search-time parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchParams {
    /// IVF clusters to scan; clamped to the artifact's `nlist`.
    pub nprobe: Option<usize>,
    /// HNSW beam width; at least `top_k`.
    pub ef: Option<usize>,
    /// Metric override. Segments whose artifact uses another metric are
    /// searched by exact scan.
    pub metric: Option<Metric>,
}

impl SearchParams {
    /// Default parameters.
    #[must_use]
    pub const fn new() -> Self {
        Self { nprobe: None, ef: None, metric: None }
    }

    /// Set `nprobe`.
    #[must_use]
    pub const fn with_nprobe(mut self, nprobe: usize) -> Self {
        self.nprobe = Some(nprobe);
        self
    }

    /// Set `ef`.
    #[must_use]
    pub const fn with_ef(mut self, ef: usize) -> Self {
        self.ef = Some(ef);
        self
    }

    /// Override the metric.
    #[must_use]
    pub const fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = Some(metric);
        self
    }

    /// Parse `{"nprobe": 16, "ef": 64, "metric_type": "IP"}`. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::InvalidParameter`] for malformed values.
    pub fn from_json(value: &Value) -> Result<Self, VectorError> {
        let obj = value
            .as_object()
            .ok_or_else(|| VectorError::invalid_param("params", "expected a JSON object"))?;
        let metric = match obj.get("metric_type") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.parse::<Metric>()?),
            Some(other) => {
                return Err(VectorError::invalid_param("metric_type", format!("expected a string, got {other}")))
            }
        };
        Ok(Self { nprobe: read_usize(obj, "nprobe")?, ef: read_usize(obj, "ef")?, metric })
    }

    /// Check parameters against the requested `top_k`.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::InvalidParameter`] for `nprobe == 0`, an
    /// `nprobe` above [`MAX_NLIST`], or an `ef` outside `top_k..=MAX_EF`.
    pub fn validate(&self, top_k: usize) -> Result<(), VectorError> {
        if let Some(nprobe) = self.nprobe {
            check_range("nprobe", nprobe, 1, MAX_NLIST)?;
        }
        if let Some(ef) = self.ef {
            check_range("ef", ef, top_k, MAX_EF)?;
        }
        Ok(())
    }

    /// Effective `nprobe` for an artifact with `nlist` clusters.
    #[must_use]
    pub fn nprobe_for(&self, nlist: usize) -> usize {
        self.nprobe.unwrap_or(DEFAULT_NPROBE).clamp(1, nlist.max(1))
    }
}

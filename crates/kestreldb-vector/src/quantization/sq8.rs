//! 8-bit scalar quantization.
//!
//! Each dimension is mapped linearly from its trained `[min, max]` range onto
//! `0..=255`.

use crate::distance::Metric;
use crate::error::VectorError;

/// Per-dimension 8-bit scalar quantizer.
#[derive(Debug, Clone)]
pub struct ScalarQuantizer {
    min: Vec<f32>,
    scale: Vec<f32>,
}

impl ScalarQuantizer {
    /// Learn per-dimension ranges from row-major `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is empty or not a whole number of rows.
    pub fn train(data: &[f32], dimension: usize) -> Result<Self, VectorError> {
        if dimension == 0 || data.is_empty() || data.len() % dimension != 0 {
            return Err(VectorError::BuildFailed(format!(
                "cannot train SQ8 on {} values of dimension {dimension}",
                data.len()
            )));
        }
        let mut min = vec![f32::INFINITY; dimension];
        let mut max = vec![f32::NEG_INFINITY; dimension];
        for row in data.chunks_exact(dimension) {
            for (d, &v) in row.iter().enumerate() {
                min[d] = min[d].min(v);
                max[d] = max[d].max(v);
            }
        }
        let scale = min.iter().zip(&max).map(|(lo, hi)| (hi - lo) / 255.0).collect();
        Ok(Self { min, scale })
    }

    /// Dimension this quantizer was trained for.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.min.len()
    }

    /// Append the code of one vector to `out`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn encode_into(&self, vector: &[f32], out: &mut Vec<u8>) {
        debug_assert_eq!(vector.len(), self.dimension());
        out.extend(vector.iter().zip(self.min.iter().zip(&self.scale)).map(|(&v, (&lo, &s))| {
            if s > 0.0 {
                ((v - lo) / s).round().clamp(0.0, 255.0) as u8
            } else {
                0
            }
        }));
    }

    /// Reconstruct an approximate vector into `out`.
    pub fn decode_into(&self, code: &[u8], out: &mut [f32]) {
        for (((o, &c), &lo), &s) in out.iter_mut().zip(code).zip(&self.min).zip(&self.scale) {
            *o = lo + f32::from(c) * s;
        }
    }

    /// Score a query against one code. `scratch` must hold `dimension` floats.
    #[inline]
    pub fn score(&self, metric: Metric, query: &[f32], code: &[u8], scratch: &mut [f32]) -> f32 {
        self.decode_into(code, scratch);
        metric.score_float(query, scratch)
    }
}

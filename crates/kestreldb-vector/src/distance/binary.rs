//! Distance functions for bit-packed binary vectors.
//!
//! Every function works on `u64` words; `u64::count_ones()` lowers to the
//! hardware popcount instruction where available.

/// Number of differing bits: popcount(a XOR b).
///
/// # Panics
///
/// Debug-panics if slices have different lengths.
#[inline]
#[must_use]
pub fn hamming_distance(a: &[u64], b: &[u64]) -> u32 {
    debug_assert_eq!(a.len(), b.len(), "bit vectors must have same length");

    a.iter().zip(b.iter()).map(|(&x, &y)| (x ^ y).count_ones()).sum()
}

/// Jaccard similarity: popcount(a AND b) / popcount(a OR b).
///
/// Returns 1.0 if both vectors are all zeros.
#[inline]
#[must_use]
pub fn jaccard_similarity(a: &[u64], b: &[u64]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "bit vectors must have same length");

    let mut intersection: u32 = 0;
    let mut union: u32 = 0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        intersection += (x & y).count_ones();
        union += (x | y).count_ones();
    }

    if union == 0 {
        1.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Jaccard distance: 1 - Jaccard similarity, in [0, 1].
#[inline]
#[must_use]
pub fn jaccard_distance(a: &[u64], b: &[u64]) -> f32 {
    1.0 - jaccard_similarity(a, b)
}

/// Tanimoto distance: -log2 of the Tanimoto coefficient.
///
/// For bit vectors the coefficient equals the Jaccard similarity. Disjoint
/// vectors are infinitely far apart.
#[inline]
#[must_use]
pub fn tanimoto_distance(a: &[u64], b: &[u64]) -> f32 {
    let similarity = jaccard_similarity(a, b);
    if similarity <= 0.0 {
        f32::INFINITY
    } else {
        -similarity.log2()
    }
}

//! Distance functions for vector similarity.
//!
//! Every index ranks candidates by **squared** Euclidean distance, which keeps
//! the square root off the hot path. The configured [`DistanceFunction`] only
//! decides how a distance is *reported* back to the caller.
//!
//! All loops are written to be auto-vectorized by the compiler when using
//! release builds with appropriate target features.

use serde::{Deserialize, Serialize};

/// Distance function enumeration.
///
/// Both variants produce the same neighbor ordering; they differ only in the
/// value stored in [`crate::VectorMatch::distance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceFunction {
    /// Euclidean (L2) distance: sqrt(sum((a[i] - b[i])^2))
    #[default]
    Euclidean,
    /// Squared Euclidean distance: sum((a[i] - b[i])^2)
    SquaredEuclidean,
}

impl DistanceFunction {
    /// Compute the reported distance between two vectors.
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        self.report(euclidean_distance_squared(a, b))
    }

    /// Convert a squared Euclidean distance into the reported unit.
    #[inline]
    pub fn report(&self, squared: f32) -> f32 {
        match self {
            Self::Euclidean => squared.sqrt(),
            Self::SquaredEuclidean => squared,
        }
    }

    /// Convert a radius given in the reported unit into a squared radius.
    #[inline]
    pub fn squared_radius(&self, radius: f32) -> f32 {
        match self {
            Self::Euclidean => radius * radius,
            Self::SquaredEuclidean => radius,
        }
    }
}

/// Compute Euclidean (L2) distance between two vectors.
///
/// This is the "straight-line" distance in n-dimensional space.
/// Returns sqrt(sum((a[i] - b[i])^2)).
///
/// # Example
///
/// ```
/// use pforest_vector::euclidean_distance;
///
/// let a = [1.0, 2.0, 3.0];
/// let b = [4.0, 5.0, 6.0];
/// let dist = euclidean_distance(&a, &b);
/// assert!((dist - 5.196).abs() < 0.01); // sqrt(27)
/// ```
#[inline]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    euclidean_distance_squared(a, b).sqrt()
}

/// Compute squared Euclidean distance (avoids sqrt for comparisons).
///
/// For k-NN search only the relative ordering matters, so the squared
/// distance is sufficient and cheaper.
#[inline]
pub fn euclidean_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    // Process in chunks of 4 for better auto-vectorization
    let mut sum = 0.0f32;
    let chunks = a.len() / 4;

    for i in 0..chunks {
        let base = i * 4;
        let d0 = a[base] - b[base];
        let d1 = a[base + 1] - b[base + 1];
        let d2 = a[base + 2] - b[base + 2];
        let d3 = a[base + 3] - b[base + 3];
        sum += d0 * d0 + d1 * d1 + d2 * d2 + d3 * d3;
    }

    // Handle remaining elements
    for i in (chunks * 4)..a.len() {
        let d = a[i] - b[i];
        sum += d * d;
    }

    sum
}

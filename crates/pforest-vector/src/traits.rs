//! Core traits for vector indices.
//!
//! The `NeighborSearch` trait defines the read-only interface implemented by
//! every index type (brute force and the partition forest).

use crate::Result;

/// A match returned from vector search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorMatch {
    /// Row index of the matched vector in the dataset.
    pub index: usize,
    /// Distance in the index's reporting unit (lower = more similar).
    pub distance: f32,
}

impl VectorMatch {
    /// Create a new vector match.
    pub fn new(index: usize, distance: f32) -> Self {
        Self { index, distance }
    }
}

impl Eq for VectorMatch {}

impl PartialOrd for VectorMatch {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VectorMatch {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Lower distance first; equal distances fall back to the row index so
        // that ordering is total and reproducible.
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.index.cmp(&other.index))
    }
}

/// Common read-only interface for nearest-neighbor indices.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. Indices are immutable once built, so
/// any number of threads may search the same index concurrently.
pub trait NeighborSearch: Send + Sync {
    /// Search for the k nearest neighbors to the query vector.
    ///
    /// Returns up to `k` matches, sorted by distance (ascending).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The query dimension doesn't match the index dimension
    /// - The query contains invalid values (NaN, Inf)
    /// - `k` is zero
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorMatch>>;

    /// Find every vector within `radius` of the query (in the index's
    /// reporting unit), sorted by distance.
    fn search_within(&self, query: &[f32], radius: f32) -> Result<Vec<VectorMatch>>;

    /// Get the number of vectors in the index.
    fn len(&self) -> usize;

    /// Check if the index is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the dimension of vectors in this index.
    fn dimensions(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_match_ordering() {
        let a = VectorMatch::new(7, 1.0);
        let b = VectorMatch::new(3, 2.0);
        let c = VectorMatch::new(9, 0.5);

        let mut matches = vec![a, b, c];
        matches.sort();

        assert_eq!(matches[0].index, 9);
        assert_eq!(matches[1].index, 7);
        assert_eq!(matches[2].index, 3);
    }

    #[test]
    fn test_ties_break_by_index() {
        let mut matches = vec![
            VectorMatch::new(5, 1.0),
            VectorMatch::new(2, 1.0),
            VectorMatch::new(4, 1.0),
        ];
        matches.sort();

        let order: Vec<_> = matches.iter().map(|m| m.index).collect();
        assert_eq!(order, vec![2, 4, 5]);
    }
}

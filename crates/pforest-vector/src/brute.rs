//! Brute force vector index.
//!
//! Linear scan search - O(n) but exact. Serves as the ground truth for recall
//! measurements and as the fallback when a query asks for the whole dataset.

use crate::dataset::VectorDataset;
use crate::distance::DistanceFunction;
use crate::traits::{NeighborSearch, VectorMatch};
use crate::{Result, VectorError};

/// Brute force vector index.
///
/// Holds a borrowed dataset and scans every row for each query.
///
/// # Performance
///
/// - Build: O(1)
/// - Search: O(n * d) where n = vectors, d = dimensions
pub struct BruteForceIndex<'a> {
    dataset: VectorDataset<'a>,
    distance: DistanceFunction,
}

impl<'a> BruteForceIndex<'a> {
    /// Create a new brute force index over `dataset`.
    pub fn new(dataset: VectorDataset<'a>, distance: DistanceFunction) -> Self {
        Self { dataset, distance }
    }

    /// Get the distance function used by this index.
    pub fn distance_function(&self) -> DistanceFunction {
        self.distance
    }

    /// The indexed dataset.
    pub fn dataset(&self) -> &VectorDataset<'a> {
        &self.dataset
    }
}

/// Rank `(index, squared distance)` pairs and keep the `k` closest.
///
/// Ties are broken by index. Distances are converted to the reporting unit
/// only after ranking.
pub fn rank_top_k(
    mut scored: Vec<(usize, f32)>,
    k: usize,
    distance: DistanceFunction,
) -> Vec<VectorMatch> {
    let by_distance =
        |a: &(usize, f32), b: &(usize, f32)| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0));

    if k < scored.len() {
        scored.select_nth_unstable_by(k, by_distance);
        scored.truncate(k);
    }
    scored.sort_unstable_by(by_distance);

    scored
        .into_iter()
        .map(|(index, squared)| VectorMatch::new(index, distance.report(squared)))
        .collect()
}

impl NeighborSearch for BruteForceIndex<'_> {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorMatch>> {
        self.dataset.check_query(query)?;

        if k == 0 {
            return Err(VectorError::InvalidArgument(
                "k must be at least 1".to_string(),
            ));
        }

        let scored: Vec<(usize, f32)> = (0..self.dataset.rows())
            .map(|i| (i, self.dataset.distance_sq_to(i, query)))
            .collect();

        Ok(rank_top_k(scored, k, self.distance))
    }

    fn search_within(&self, query: &[f32], radius: f32) -> Result<Vec<VectorMatch>> {
        self.dataset.check_query(query)?;

        if radius.is_nan() || radius < 0.0 {
            return Err(VectorError::InvalidArgument(format!(
                "radius must be non-negative, got {}",
                radius
            )));
        }

        let limit = self.distance.squared_radius(radius);
        let scored: Vec<(usize, f32)> = (0..self.dataset.rows())
            .map(|i| (i, self.dataset.distance_sq_to(i, query)))
            .filter(|&(_, d)| d <= limit)
            .collect();

        let len = scored.len();
        Ok(rank_top_k(scored, len, self.distance))
    }

    fn len(&self) -> usize {
        self.dataset.rows()
    }

    fn dimensions(&self) -> usize {
        self.dataset.cols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: [f32; 9] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];

    fn create_test_index(data: &[f32], rows: usize, cols: usize) -> BruteForceIndex<'_> {
        let dataset = VectorDataset::new(data, rows, cols).unwrap();
        BruteForceIndex::new(dataset, DistanceFunction::Euclidean)
    }

    #[test]
    fn test_search_euclidean() {
        let index = create_test_index(&DATA, 3, 3);

        let results = index.search(&[0.0, 0.0, 0.0], 2).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].index, 0);
        assert!((results[0].distance - 14.0f32.sqrt()).abs() < 1e-5);
        assert_eq!(results[1].index, 1);
        assert!((results[1].distance - 77.0f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn test_search_top_k() {
        let data: Vec<f32> = (0..10).flat_map(|i| [i as f32, 0.0, 0.0]).collect();
        let index = create_test_index(&data, 10, 3);

        let results = index.search(&[0.0, 0.0, 0.0], 3).unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.index).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_k_larger_than_dataset() {
        let index = create_test_index(&DATA, 3, 3);

        let results = index.search(&[0.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_search_k_zero() {
        let index = create_test_index(&DATA, 3, 3);

        let result = index.search(&[1.0, 2.0, 3.0], 0);
        assert!(matches!(result, Err(VectorError::InvalidArgument(_))));
    }

    #[test]
    fn test_dimension_mismatch() {
        let index = create_test_index(&DATA, 3, 3);

        let result = index.search(&[1.0, 2.0], 1);
        assert!(matches!(result, Err(VectorError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_search_within() {
        let data: Vec<f32> = (0..10).flat_map(|i| [i as f32, 0.0]).collect();
        let index = create_test_index(&data, 10, 2);

        let results = index.search_within(&[4.0, 0.0], 2.0).unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.index).collect();
        // Equal distances (3 and 5, 2 and 6) are ordered by index
        assert_eq!(ids, vec![4, 3, 5, 2, 6]);

        assert!(index.search_within(&[4.0, 0.0], -1.0).is_err());
    }

    #[test]
    fn test_concurrent_search() {
        use std::thread;

        let data: Vec<f32> = (0..100).flat_map(|i| [i as f32, (i % 7) as f32]).collect();
        let index = create_test_index(&data, 100, 2);

        thread::scope(|scope| {
            for t in 0..8 {
                let index = &index;
                scope.spawn(move || {
                    let results = index.search(&[t as f32 * 10.0, 0.0], 5).unwrap();
                    assert_eq!(results.len(), 5);
                });
            }
        });
    }
}

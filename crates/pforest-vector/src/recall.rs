//! Accuracy measures for approximate results.
//!
//! Both functions take the approximate result and an exact baseline (for
//! example from [`crate::BruteForceIndex`]), each sorted nearest first.

use crate::traits::VectorMatch;
use std::collections::HashSet;

/// Fraction of the exact neighborhood matched by the approximate distances.
///
/// Walks the exact list in order and advances through the approximate list
/// whenever its next distance is no worse than the current exact one. Unlike
/// [`recall_at_k`] this counts a different row at an equal distance as a
/// hit, which is the right measure when the data has ties.
///
/// Returns `None` when `exact` is empty or shorter than `approx`.
pub fn result_accuracy(approx: &[VectorMatch], exact: &[VectorMatch]) -> Option<f32> {
    if exact.is_empty() || exact.len() < approx.len() {
        return None;
    }

    let mut loc = 0;
    for e in exact {
        if loc < approx.len() && approx[loc].distance <= e.distance {
            loc += 1;
        }
    }

    Some(loc as f32 / exact.len() as f32)
}

/// Fraction of exact neighbor indices present in the approximate result.
///
/// Returns `1.0` for an empty baseline.
pub fn recall_at_k(approx: &[VectorMatch], exact: &[VectorMatch]) -> f32 {
    if exact.is_empty() {
        return 1.0;
    }

    let found: HashSet<usize> = approx.iter().map(|m| m.index).collect();
    let hits = exact.iter().filter(|m| found.contains(&m.index)).count();

    hits as f32 / exact.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pairs: &[(usize, f32)]) -> Vec<VectorMatch> {
        pairs.iter().map(|&(i, d)| VectorMatch::new(i, d)).collect()
    }

    #[test]
    fn test_perfect_result() {
        let exact = matches(&[(0, 1.0), (1, 2.0), (2, 3.0)]);
        assert_eq!(result_accuracy(&exact, &exact), Some(1.0));
        assert_eq!(recall_at_k(&exact, &exact), 1.0);
    }

    #[test]
    fn test_partial_result() {
        let exact = matches(&[(0, 1.0), (1, 2.0), (2, 3.0), (3, 4.0)]);
        let approx = matches(&[(0, 1.0), (2, 3.0), (3, 4.0), (9, 5.0)]);

        // 1.0 <= 1.0, 3.0 > 2.0, 3.0 <= 3.0, 4.0 <= 4.0
        assert_eq!(result_accuracy(&approx, &exact), Some(0.75));
        assert_eq!(recall_at_k(&approx, &exact), 0.75);
    }

    #[test]
    fn test_ties_count_as_hits() {
        let exact = matches(&[(0, 1.0), (1, 1.0)]);
        let approx = matches(&[(0, 1.0), (5, 1.0)]);

        assert_eq!(result_accuracy(&approx, &exact), Some(1.0));
        assert_eq!(recall_at_k(&approx, &exact), 0.5);
    }

    #[test]
    fn test_short_baseline_rejected() {
        let exact = matches(&[(0, 1.0)]);
        let approx = matches(&[(0, 1.0), (1, 2.0)]);

        assert_eq!(result_accuracy(&approx, &exact), None);
        assert_eq!(result_accuracy(&approx, &[]), None);
    }
}

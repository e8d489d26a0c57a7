//! Split rules for partition tree nodes.
//!
//! A rule sends every point to exactly one side. Build and query use the
//! same [`SplitRule::route`] call, so a query that equals a dataset row
//! always lands in the row's leaf.

use pforest_vector::VectorDataset;

/// Which child a point is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Outcome of routing one point through a rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Routing {
    pub side: Side,
    /// Lower bound on the Euclidean distance from the point to the
    /// decision boundary. Any point on the other side is at least this far
    /// away.
    pub margin: f32,
}

/// A single partitioning decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitRule {
    /// Nearest of two pivot rows: the boundary is their perpendicular
    /// bisector. Equal distances route left.
    Pivots {
        left: u32,
        right: u32,
        /// Euclidean distance between the pivots (always > 0).
        gap: f32,
    },
    /// Single-coordinate threshold: `x[dim] <= threshold` routes left.
    Axis { dim: u32, threshold: f32 },
}

impl SplitRule {
    /// Build a pivot rule, or `None` when the two rows coincide.
    pub fn pivots(dataset: &VectorDataset<'_>, left: u32, right: u32) -> Option<Self> {
        let gap = dataset
            .distance_sq_between(left as usize, right as usize)
            .sqrt();
        if gap > 0.0 && gap.is_finite() {
            Some(SplitRule::Pivots { left, right, gap })
        } else {
            None
        }
    }

    /// Route `point` to a side.
    #[inline]
    pub fn route(&self, dataset: &VectorDataset<'_>, point: &[f32]) -> Routing {
        match *self {
            SplitRule::Pivots { left, right, gap } => {
                let to_left = dataset.distance_sq_to(left as usize, point);
                let to_right = dataset.distance_sq_to(right as usize, point);
                let side = if to_left <= to_right {
                    Side::Left
                } else {
                    Side::Right
                };
                // |d_r^2 - d_l^2| / (2 * |l - r|) is the distance to the bisector,
                // shrunk by the rounding error of the two sums so it stays a
                // lower bound
                let rounding = (to_left + to_right) * (point.len() as f32 + 2.0) * f32::EPSILON;
                let margin = ((to_right - to_left).abs() - rounding).max(0.0) / (2.0 * gap);
                Routing { side, margin }
            }
            SplitRule::Axis { dim, threshold } => {
                let value = point[dim as usize];
                let side = if value <= threshold {
                    Side::Left
                } else {
                    Side::Right
                };
                Routing {
                    side,
                    margin: (value - threshold).abs(),
                }
            }
        }
    }

    /// Route dataset row `row`.
    #[inline]
    pub fn route_row(&self, dataset: &VectorDataset<'_>, row: u32) -> Side {
        self.route(dataset, dataset.row(row as usize)).side
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: [f32; 8] = [
        0.0, 0.0, // 0
        4.0, 0.0, // 1
        2.0, 5.0, // 2 (equidistant from 0 and 1)
        1.0, 1.0, // 3
    ];

    fn dataset() -> VectorDataset<'static> {
        VectorDataset::new(&DATA, 4, 2).unwrap()
    }

    #[test]
    fn test_pivot_routing_and_margin() {
        let ds = dataset();
        let rule = SplitRule::pivots(&ds, 0, 1).unwrap();

        let routing = rule.route(&ds, &[1.0, 3.0]);
        assert_eq!(routing.side, Side::Left);
        // Bisector is x = 2
        assert!((routing.margin - 1.0).abs() < 1e-5);

        let routing = rule.route(&ds, &[3.5, -2.0]);
        assert_eq!(routing.side, Side::Right);
        assert!((routing.margin - 1.5).abs() < 1e-5);
    }

    #[test]
    fn test_ties_route_left() {
        let ds = dataset();
        let rule = SplitRule::pivots(&ds, 0, 1).unwrap();

        assert_eq!(rule.route_row(&ds, 2), Side::Left);
        assert_eq!(rule.route(&ds, &[2.0, 5.0]).margin, 0.0);
    }

    #[test]
    fn test_identical_pivots_rejected() {
        let data = [1.0, 1.0, 1.0, 1.0];
        let ds = VectorDataset::new(&data, 2, 2).unwrap();
        assert!(SplitRule::pivots(&ds, 0, 1).is_none());
    }

    #[test]
    fn test_axis_routing() {
        let ds = dataset();
        let rule = SplitRule::Axis {
            dim: 1,
            threshold: 1.0,
        };

        assert_eq!(rule.route_row(&ds, 3), Side::Left);
        assert_eq!(rule.route_row(&ds, 2), Side::Right);
        assert_eq!(rule.route(&ds, &[0.0, 3.5]).margin, 2.5);
        assert_eq!(Side::Left.other(), Side::Right);
    }
}

//! A single randomized partition tree.
//!
//! Nodes live in one arena vector and refer to their children by index. The
//! tree is built iteratively from an explicit work stack, so skewed data
//! cannot overflow the call stack no matter how deep the tree gets.
//!
//! # Splitting
//!
//! An internal node draws `split_candidates` random pivot pairs from its
//! rows. With more than one candidate, each pair is scored on a small random
//! probe and the most balanced one wins. A split that leaves one side empty
//! (duplicate rows, a pivot that captures everything) is redrawn up to
//! `max_split_attempts` times. After that the node falls back to a median
//! threshold on its widest coordinate, and a node whose rows are all
//! identical becomes an oversized leaf.

use crate::config::ForestConfig;
use crate::seed::tree_rng;
use crate::split::{Side, SplitRule};
use crate::Result;
use pforest_observe::{BuildEvt, BuildKind, IndexEvent, Level, Observer};
use pforest_vector::VectorDataset;
use rand::rngs::StdRng;
use rand::Rng;

/// Index of a node in a tree's arena.
pub type NodeId = u32;

/// Rows sampled when scoring the balance of a candidate split.
const SPLIT_PROBE: usize = 64;

/// Tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Split {
        rule: SplitRule,
        left: NodeId,
        right: NodeId,
    },
    /// Row indices, sorted ascending.
    Leaf { items: Vec<u32> },
}

/// Shape summary of a built tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeStats {
    pub nodes: usize,
    pub leaves: usize,
    /// Depth of the deepest leaf (a lone root leaf has depth 0).
    pub depth: usize,
    pub max_leaf_size: usize,
    pub fallback_splits: usize,
}

/// An immutable partition of the dataset's row indices.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionTree {
    nodes: Vec<Node>,
    ordinal: usize,
    depth: usize,
    fallback_splits: usize,
}

/// Node waiting to be split.
struct Pending {
    node: NodeId,
    items: Vec<u32>,
    depth: usize,
}

struct Builder<'d, 'a> {
    dataset: &'d VectorDataset<'a>,
    observer: &'d dyn Observer,
    rng: StdRng,
    ordinal: usize,
    leaf_capacity: usize,
    split_candidates: usize,
    max_split_attempts: usize,
    fallback_splits: usize,
}

impl PartitionTree {
    /// Build tree number `ordinal` of a forest.
    ///
    /// The tree's random stream depends only on `config.seed` and `ordinal`.
    pub fn build(
        dataset: &VectorDataset<'_>,
        config: &ForestConfig,
        ordinal: usize,
        split_candidates: usize,
        observer: &dyn Observer,
    ) -> Result<Self> {
        let builder = Builder {
            dataset,
            observer,
            rng: tree_rng(config.seed, ordinal),
            ordinal,
            leaf_capacity: config.leaf_capacity.max(1),
            split_candidates: split_candidates.max(1),
            max_split_attempts: config.max_split_attempts.max(1),
            fallback_splits: 0,
        };
        builder.run()
    }

    /// Ordinal of this tree within its forest.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn root(&self) -> NodeId {
        0
    }

    /// # Panics
    ///
    /// Panics if `id` is not a node of this tree.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Descend from the root to the leaf `point` routes to.
    pub fn leaf_for(&self, dataset: &VectorDataset<'_>, point: &[f32]) -> &[u32] {
        let mut id = self.root();
        loop {
            match self.node(id) {
                Node::Split { rule, left, right } => {
                    id = match rule.route(dataset, point).side {
                        Side::Left => *left,
                        Side::Right => *right,
                    };
                }
                Node::Leaf { items } => return items,
            }
        }
    }

    /// All leaves in arena order.
    pub fn leaves(&self) -> impl Iterator<Item = &[u32]> + '_ {
        self.nodes.iter().filter_map(|node| match node {
            Node::Leaf { items } => Some(items.as_slice()),
            Node::Split { .. } => None,
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().count()
    }

    /// Nodes split by the median fallback instead of a pivot pair.
    pub fn fallback_splits(&self) -> usize {
        self.fallback_splits
    }

    pub fn stats(&self) -> TreeStats {
        TreeStats {
            nodes: self.node_count(),
            leaves: self.leaf_count(),
            depth: self.depth,
            max_leaf_size: self.leaves().map(<[u32]>::len).max().unwrap_or(0),
            fallback_splits: self.fallback_splits,
        }
    }
}

impl Builder<'_, '_> {
    fn run(mut self) -> Result<PartitionTree> {
        let rows = self.dataset.rows();

        let mut root_items = Vec::new();
        root_items.try_reserve_exact(rows)?;
        root_items.extend(0..rows as u32);

        let mut nodes: Vec<Node> = Vec::new();
        nodes.try_reserve(2 * (rows / self.leaf_capacity) + 1)?;
        nodes.push(Node::Leaf { items: Vec::new() });

        let mut max_depth = 0;
        let mut stack = vec![Pending {
            node: 0,
            items: root_items,
            depth: 0,
        }];

        while let Some(Pending { node, items, depth }) = stack.pop() {
            if items.len() <= self.leaf_capacity {
                max_depth = max_depth.max(depth);
                nodes[node as usize] = leaf(items);
                continue;
            }

            match self.choose_split(&items, depth)? {
                Some((rule, left_items, right_items)) => {
                    nodes.try_reserve(2)?;
                    let left = nodes.len() as NodeId;
                    let right = left + 1;
                    nodes.push(Node::Leaf { items: Vec::new() });
                    nodes.push(Node::Leaf { items: Vec::new() });
                    nodes[node as usize] = Node::Split { rule, left, right };

                    // Left subtree is processed first
                    stack.push(Pending {
                        node: right,
                        items: right_items,
                        depth: depth + 1,
                    });
                    stack.push(Pending {
                        node: left,
                        items: left_items,
                        depth: depth + 1,
                    });
                }
                None => {
                    // Every row is identical: nothing can separate them
                    max_depth = max_depth.max(depth);
                    nodes[node as usize] = leaf(items);
                }
            }
        }

        nodes.shrink_to_fit();
        Ok(PartitionTree {
            nodes,
            ordinal: self.ordinal,
            depth: max_depth,
            fallback_splits: self.fallback_splits,
        })
    }

    /// Pick a rule that sends at least one row to each side.
    ///
    /// Returns `None` only when all rows are identical.
    fn choose_split(
        &mut self,
        items: &[u32],
        depth: usize,
    ) -> Result<Option<(SplitRule, Vec<u32>, Vec<u32>)>> {
        for _ in 0..self.max_split_attempts {
            if let Some(rule) = self.propose_pivots(items) {
                let (left, right) = self.partition(&rule, items)?;
                if !left.is_empty() && !right.is_empty() {
                    return Ok(Some((rule, left, right)));
                }
            }
        }

        let Some(rule) = median_axis_rule(self.dataset, items) else {
            return Ok(None);
        };
        let (left, right) = self.partition(&rule, items)?;
        if left.is_empty() || right.is_empty() {
            return Ok(None);
        }

        self.fallback_splits += 1;
        if self.observer.enabled(Level::Debug) {
            self.observer.emit(IndexEvent::Build(BuildEvt {
                tree: Some(self.ordinal),
                kind: BuildKind::FallbackSplit {
                    items: items.len(),
                    depth,
                },
            }));
        }
        Ok(Some((rule, left, right)))
    }

    /// Draw pivot pairs and keep the best balanced one.
    fn propose_pivots(&mut self, items: &[u32]) -> Option<SplitRule> {
        let n = items.len();
        let mut best: Option<(SplitRule, usize)> = None;

        for _ in 0..self.split_candidates {
            let a = items[self.rng.gen_range(0..n)];
            let b = items[self.rng.gen_range(0..n)];
            if a == b {
                continue;
            }
            let Some(rule) = SplitRule::pivots(self.dataset, a, b) else {
                continue;
            };
            if self.split_candidates == 1 {
                return Some(rule);
            }

            let balance = self.probe_balance(&rule, items);
            if best.map_or(true, |(_, top)| balance > top) {
                best = Some((rule, balance));
            }
        }

        best.map(|(rule, _)| rule)
    }

    /// Size of the smaller side on a random probe of `items`.
    fn probe_balance(&mut self, rule: &SplitRule, items: &[u32]) -> usize {
        let n = items.len();
        let probe = n.min(SPLIT_PROBE);
        let mut left = 0;

        for i in 0..probe {
            let row = if n <= SPLIT_PROBE {
                items[i]
            } else {
                items[self.rng.gen_range(0..n)]
            };
            if rule.route_row(self.dataset, row) == Side::Left {
                left += 1;
            }
        }

        left.min(probe - left)
    }

    fn partition(&self, rule: &SplitRule, items: &[u32]) -> Result<(Vec<u32>, Vec<u32>)> {
        let mut left = Vec::new();
        let mut right = Vec::new();
        left.try_reserve(items.len() / 2 + 1)?;
        right.try_reserve(items.len() / 2 + 1)?;

        for &row in items {
            match rule.route_row(self.dataset, row) {
                Side::Left => {
                    left.try_reserve(1)?;
                    left.push(row);
                }
                Side::Right => {
                    right.try_reserve(1)?;
                    right.push(row);
                }
            }
        }
        Ok((left, right))
    }
}

fn leaf(mut items: Vec<u32>) -> Node {
    items.sort_unstable();
    Node::Leaf { items }
}

/// Threshold on the coordinate with the largest spread among `items`.
///
/// Returns `None` when every coordinate is constant. The threshold is the
/// lower median, moved below the maximum when the median equals it, so both
/// sides are non-empty.
fn median_axis_rule(dataset: &VectorDataset<'_>, items: &[u32]) -> Option<SplitRule> {
    let mut widest: Option<(usize, f32, f32)> = None;
    let mut best_spread = 0.0f32;

    for dim in 0..dataset.cols() {
        let (min, max) = items.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &row| {
            let v = dataset.row(row as usize)[dim];
            (lo.min(v), hi.max(v))
        });
        let spread = max - min;
        if spread > best_spread {
            best_spread = spread;
            widest = Some((dim, min, max));
        }
    }

    let (dim, min, max) = widest?;
    let mut values: Vec<f32> = items
        .iter()
        .map(|&row| dataset.row(row as usize)[dim])
        .collect();
    values.sort_unstable_by(f32::total_cmp);

    let median = values[(values.len() - 1) / 2];
    let threshold = if median < max {
        median
    } else {
        let mid = min + (max - min) * 0.5;
        if mid < max {
            mid
        } else {
            min
        }
    };

    Some(SplitRule::Axis {
        dim: dim as u32,
        threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pforest_observe::NoopObserver;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn random_data(rows: usize, cols: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..rows * cols).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    fn config(leaf_capacity: usize) -> ForestConfig {
        ForestConfig::default()
            .with_seed(11)
            .with_leaf_capacity(leaf_capacity)
    }

    fn assert_partition(tree: &PartitionTree, rows: usize) {
        let mut seen = vec![0usize; rows];
        for leaf in tree.leaves() {
            assert!(leaf.windows(2).all(|w| w[0] < w[1]), "leaf not sorted");
            for &row in leaf {
                seen[row as usize] += 1;
            }
        }
        assert!(seen.iter().all(|&count| count == 1), "rows not partitioned");
    }

    #[test]
    fn test_partition_invariant() {
        let data = random_data(500, 8, 1);
        let ds = VectorDataset::new(&data, 500, 8).unwrap();

        let tree = PartitionTree::build(&ds, &config(10), 0, 1, &NoopObserver).unwrap();

        assert_partition(&tree, 500);
        assert!(tree.leaves().all(|leaf| leaf.len() <= 10));
        assert_eq!(tree.node_count(), 2 * tree.leaf_count() - 1);
    }

    #[test]
    fn test_small_dataset_is_single_leaf() {
        let data = random_data(5, 3, 2);
        let ds = VectorDataset::new(&data, 5, 3).unwrap();

        let tree = PartitionTree::build(&ds, &config(32), 0, 1, &NoopObserver).unwrap();

        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.leaves().next().unwrap(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_rows_route_to_own_leaf() {
        let data = random_data(300, 4, 3);
        let ds = VectorDataset::new(&data, 300, 4).unwrap();

        let tree = PartitionTree::build(&ds, &config(8), 2, 4, &NoopObserver).unwrap();

        for row in 0..300 {
            let leaf = tree.leaf_for(&ds, ds.row(row));
            assert!(leaf.binary_search(&(row as u32)).is_ok());
        }
    }

    #[test]
    fn test_identical_rows_make_one_leaf() {
        let data = vec![0.5f32; 100 * 3];
        let ds = VectorDataset::new(&data, 100, 3).unwrap();

        let tree = PartitionTree::build(&ds, &config(4), 0, 1, &NoopObserver).unwrap();

        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(tree.stats().max_leaf_size, 100);
        assert_partition(&tree, 100);
    }

    #[test]
    fn test_mostly_duplicates_terminate() {
        // 95 copies of one point plus 5 distinct points
        let mut data = vec![1.0f32; 95 * 2];
        data.extend_from_slice(&[2.0, 0.0, 3.0, 0.0, 4.0, 0.0, 5.0, 0.0, 6.0, 0.0]);
        let ds = VectorDataset::new(&data, 100, 2).unwrap();

        let tree = PartitionTree::build(&ds, &config(2), 0, 1, &NoopObserver).unwrap();

        assert_partition(&tree, 100);
        // The duplicates end up together in a single oversized leaf
        assert!(tree.leaves().any(|leaf| leaf.len() >= 95));
    }

    #[test]
    fn test_fallback_split_is_reported() {
        struct CountingObserver(AtomicUsize);
        impl Observer for CountingObserver {
            fn emit(&self, evt: IndexEvent) {
                if let IndexEvent::Build(BuildEvt {
                    kind: BuildKind::FallbackSplit { .. },
                    ..
                }) = evt
                {
                    self.0.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        // Two clusters of duplicates: random pairs mostly coincide
        let mut data = vec![0.0f32; 60];
        data.extend(vec![1.0f32; 4]);
        let ds = VectorDataset::new(&data, 64, 1).unwrap();

        let observer = CountingObserver(AtomicUsize::new(0));
        let config = config(1).with_seed(5);
        let tree = PartitionTree::build(&ds, &config, 0, 1, &observer).unwrap();

        assert_partition(&tree, 64);
        assert_eq!(tree.fallback_splits(), observer.0.load(Ordering::Relaxed));
        assert_eq!(tree.leaf_count(), 2);
    }

    #[test]
    fn test_collinear_skewed_data() {
        // Exponential spacing produces very unbalanced pivot splits
        let data: Vec<f32> = (0..200).map(|i| 1.05f32.powi(i)).collect();
        let ds = VectorDataset::new(&data, 200, 1).unwrap();

        let tree = PartitionTree::build(&ds, &config(1), 0, 1, &NoopObserver).unwrap();

        assert_partition(&tree, 200);
        assert_eq!(tree.leaf_count(), 200);
    }

    #[test]
    fn test_build_is_deterministic() {
        let data = random_data(400, 6, 4);
        let ds = VectorDataset::new(&data, 400, 6).unwrap();

        let a = PartitionTree::build(&ds, &config(16), 3, 4, &NoopObserver).unwrap();
        let b = PartitionTree::build(&ds, &config(16), 3, 4, &NoopObserver).unwrap();
        let c = PartitionTree::build(&ds, &config(16), 4, 4, &NoopObserver).unwrap();

        assert_eq!(a, b);
        assert_ne!(a.nodes(), c.nodes());
    }

    #[test]
    fn test_more_candidates_improve_balance() {
        let data = random_data(2000, 4, 6);
        let ds = VectorDataset::new(&data, 2000, 4).unwrap();

        let single = PartitionTree::build(&ds, &config(8), 0, 1, &NoopObserver).unwrap();
        let many = PartitionTree::build(&ds, &config(8), 0, 16, &NoopObserver).unwrap();

        assert_partition(&many, 2000);
        assert!(many.depth() <= single.depth());
    }

    #[test]
    fn test_median_axis_rule() {
        let data = [3.0, 0.0, 1.0, 0.0, 2.0, 0.1, 1.0, 0.0];
        let ds = VectorDataset::new(&data, 4, 2).unwrap();

        let rule = median_axis_rule(&ds, &[0, 1, 2, 3]).unwrap();
        assert_eq!(
            rule,
            SplitRule::Axis {
                dim: 0,
                threshold: 1.0
            }
        );

        // Lower median equal to the max moves the threshold down
        let data = [0.0, 5.0, 5.0];
        let ds = VectorDataset::new(&data, 3, 1).unwrap();
        let rule = median_axis_rule(&ds, &[0, 1, 2]).unwrap();
        assert_eq!(
            rule,
            SplitRule::Axis {
                dim: 0,
                threshold: 2.5
            }
        );

        let data = [7.0, 7.0];
        let ds = VectorDataset::new(&data, 2, 1).unwrap();
        assert!(median_axis_rule(&ds, &[0, 1]).is_none());
    }
}

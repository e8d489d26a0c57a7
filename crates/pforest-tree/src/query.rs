//! Query engine over a built forest.
//!
//! Every tree contributes its primary leaf (the leaf the query routes to)
//! plus up to `backtrack_leaves` further leaves, visited best-first by how
//! close the query passes to the boundary that excluded them. Leaves are
//! merged into one deduplicated candidate set and ranked by exact distance.
//!
//! Each tree's walk is independent of the others, so adding trees only ever
//! adds candidates.

use crate::forest::TreeForest;
use crate::split::{Side, SplitRule};
use crate::tree::{Node, NodeId, PartitionTree};
use crate::Result;
use pforest_observe::{IndexEvent, Level, Observer, QueryEvt};
use pforest_vector::{rank_top_k, DistanceFunction, VectorDataset, VectorError, VectorMatch};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Relative slack added to the radius when pruning range searches.
const RANGE_SLACK: f32 = 1e-4;

/// Work counters for one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStats {
    pub trees: usize,
    pub leaves_visited: usize,
    /// Distinct rows ranked by exact distance.
    pub candidates: usize,
    /// Routing plus ranking distance evaluations.
    pub distance_computations: usize,
    /// The query was answered by a full scan (`n >= rows`).
    pub exhaustive: bool,
}

/// Ranked matches plus the work it took to find them.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub matches: Vec<VectorMatch>,
    pub stats: QueryStats,
}

impl QueryResult {
    /// Row indices, nearest first.
    pub fn indices(&self) -> Vec<usize> {
        self.matches.iter().map(|m| m.index).collect()
    }
}

/// Subtree skipped during descent.
#[derive(Debug, Clone, Copy)]
struct Deferred {
    /// Lower bound on the distance from the query to the subtree's region.
    bound: f32,
    node: NodeId,
}

impl PartialEq for Deferred {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Deferred {}

impl PartialOrd for Deferred {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deferred {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bound
            .total_cmp(&other.bound)
            .then_with(|| self.node.cmp(&other.node))
    }
}

/// One bit per row, packed into `u64` words.
struct VisitedSet {
    words: Vec<u64>,
}

impl VisitedSet {
    fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
        }
    }

    /// Mark `row`; returns true if it was not marked before.
    #[inline]
    fn insert(&mut self, row: u32) -> bool {
        let word = &mut self.words[row as usize / 64];
        let bit = 1u64 << (row % 64);
        let fresh = *word & bit == 0;
        *word |= bit;
        fresh
    }
}

#[derive(Default)]
struct Counters {
    leaves: usize,
    routing: usize,
}

/// Read-only search over a dataset and its forest.
///
/// Cheap to construct; holds only borrows.
#[derive(Debug, Clone, Copy)]
pub struct QueryEngine<'a> {
    dataset: VectorDataset<'a>,
    forest: &'a TreeForest,
    distance: DistanceFunction,
    backtrack_leaves: usize,
}

impl<'a> QueryEngine<'a> {
    pub fn new(
        dataset: VectorDataset<'a>,
        forest: &'a TreeForest,
        distance: DistanceFunction,
        backtrack_leaves: usize,
    ) -> Self {
        Self {
            dataset,
            forest,
            distance,
            backtrack_leaves,
        }
    }

    /// Approximate `n` nearest rows to `query`, nearest first.
    ///
    /// Returns `min(n, rows)` matches when `n >= rows`, otherwise at most `n`.
    ///
    /// # Errors
    ///
    /// - Dimension mismatch or NaN/Inf in `query`
    /// - `n == 0`
    pub fn query(&self, query: &[f32], n: usize) -> Result<QueryResult> {
        self.dataset.check_query(query)?;
        if n == 0 {
            return Err(VectorError::InvalidArgument("n must be at least 1".to_string()).into());
        }

        if n >= self.dataset.rows() {
            return Ok(self.exhaustive(query, n));
        }

        let mut visited = VisitedSet::new(self.dataset.rows());
        let mut candidates: Vec<u32> = Vec::new();
        let mut counters = Counters::default();

        for tree in self.forest.trees() {
            self.search_tree(tree, query, &mut visited, &mut candidates, &mut counters);
        }

        let scored: Vec<(usize, f32)> = candidates
            .iter()
            .map(|&row| (row as usize, self.dataset.distance_sq_to(row as usize, query)))
            .collect();
        let stats = QueryStats {
            trees: self.forest.len(),
            leaves_visited: counters.leaves,
            candidates: scored.len(),
            distance_computations: counters.routing + scored.len(),
            exhaustive: false,
        };

        Ok(QueryResult {
            matches: rank_top_k(scored, n, self.distance),
            stats,
        })
    }

    /// Every row within `radius` of `query` (in the reporting unit), nearest
    /// first.
    ///
    /// Exact: walks the first tree and prunes only subtrees the ball cannot
    /// reach.
    pub fn within(&self, query: &[f32], radius: f32) -> Result<Vec<VectorMatch>> {
        self.dataset.check_query(query)?;
        if radius.is_nan() || radius < 0.0 {
            return Err(VectorError::InvalidArgument(format!(
                "radius must be non-negative, got {}",
                radius
            ))
            .into());
        }

        let limit = self.distance.squared_radius(radius);
        let reach = limit.sqrt() * (1.0 + RANGE_SLACK) + f32::EPSILON;

        let Some(tree) = self.forest.trees().first() else {
            return Ok(Vec::new());
        };

        let mut scored = Vec::new();
        let mut stack = vec![tree.root()];
        while let Some(id) = stack.pop() {
            match tree.node(id) {
                Node::Split { rule, left, right } => {
                    let routing = rule.route(&self.dataset, query);
                    let (near, far) = children(routing.side, *left, *right);
                    stack.push(near);
                    if routing.margin <= reach {
                        stack.push(far);
                    }
                }
                Node::Leaf { items } => {
                    for &row in items {
                        let d = self.dataset.distance_sq_to(row as usize, query);
                        if d <= limit {
                            scored.push((row as usize, d));
                        }
                    }
                }
            }
        }

        let len = scored.len();
        Ok(rank_top_k(scored, len, self.distance))
    }

    /// Like [`query`](Self::query), reporting a [`QueryEvt`] to `observer`.
    pub fn query_observed(
        &self,
        query: &[f32],
        n: usize,
        observer: &dyn Observer,
    ) -> Result<QueryResult> {
        let result = self.query(query, n)?;
        if observer.enabled(Level::Debug) {
            observer.emit(IndexEvent::Query(QueryEvt {
                requested: n,
                returned: result.matches.len(),
                candidates: result.stats.candidates,
                leaves_visited: result.stats.leaves_visited,
                distance_computations: result.stats.distance_computations,
            }));
        }
        Ok(result)
    }

    fn exhaustive(&self, query: &[f32], n: usize) -> QueryResult {
        let rows = self.dataset.rows();
        let scored: Vec<(usize, f32)> = (0..rows)
            .map(|row| (row, self.dataset.distance_sq_to(row, query)))
            .collect();

        QueryResult {
            matches: rank_top_k(scored, n, self.distance),
            stats: QueryStats {
                trees: self.forest.len(),
                leaves_visited: 0,
                candidates: rows,
                distance_computations: rows,
                exhaustive: true,
            },
        }
    }

    /// Primary descent of one tree, then best-first backtracking.
    fn search_tree(
        &self,
        tree: &PartitionTree,
        query: &[f32],
        visited: &mut VisitedSet,
        candidates: &mut Vec<u32>,
        counters: &mut Counters,
    ) {
        let mut deferred: BinaryHeap<Reverse<Deferred>> = BinaryHeap::new();
        let mut next = Some((tree.root(), 0.0f32));

        for _ in 0..=self.backtrack_leaves {
            let (mut id, bound) = match next.take() {
                Some(start) => start,
                None => match deferred.pop() {
                    Some(Reverse(entry)) => (entry.node, entry.bound),
                    None => break,
                },
            };

            loop {
                match tree.node(id) {
                    Node::Split { rule, left, right } => {
                        let routing = rule.route(&self.dataset, query);
                        if let SplitRule::Pivots { .. } = rule {
                            counters.routing += 2;
                        }
                        let (near, far) = children(routing.side, *left, *right);
                        deferred.push(Reverse(Deferred {
                            bound: bound.max(routing.margin),
                            node: far,
                        }));
                        id = near;
                    }
                    Node::Leaf { items } => {
                        counters.leaves += 1;
                        for &row in items {
                            if visited.insert(row) {
                                candidates.push(row);
                            }
                        }
                        break;
                    }
                }
            }
        }
    }
}

#[inline]
fn children(side: Side, left: NodeId, right: NodeId) -> (NodeId, NodeId) {
    match side {
        Side::Left => (left, right),
        Side::Right => (right, left),
    }
}

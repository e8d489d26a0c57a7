//! Forest construction and the built index.
//!
//! Trees are independent: each one draws from its own random stream, so the
//! forest can be built on the rayon pool or sequentially with identical
//! results.

use crate::config::ForestConfig;
use crate::diagnostics::TracingObserver;
use crate::query::{QueryEngine, QueryResult};
use crate::tree::PartitionTree;
use crate::{IndexError, Result};
use pforest_observe::{obs_timed, BuildEvt, BuildKind, IndexEvent, Level, Observer};
use pforest_vector::{NeighborSearch, VectorDataset, VectorError, VectorMatch};
use rayon::prelude::*;
use std::sync::Arc;

/// Shape summary of a forest.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ForestStats {
    pub trees: usize,
    pub nodes: usize,
    pub leaves: usize,
    pub max_depth: usize,
    pub mean_leaf_size: f64,
    pub max_leaf_size: usize,
    pub fallback_splits: usize,
}

/// An ordered set of partition trees over one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeForest {
    trees: Vec<PartitionTree>,
}

impl TreeForest {
    /// Build `config.tree_count()` trees over `dataset`.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if the config does not validate
    /// - `AllocationFailure` if any tree cannot reserve memory
    pub fn build(
        dataset: &VectorDataset<'_>,
        config: &ForestConfig,
        observer: &dyn Observer,
    ) -> Result<Self> {
        let result = Self::build_trees(dataset, config, observer);
        if let Err(err) = &result {
            if observer.enabled(Level::Error) {
                observer.emit(IndexEvent::Build(BuildEvt {
                    tree: None,
                    kind: BuildKind::Failed {
                        reason: err.to_string(),
                    },
                }));
            }
        }
        result
    }

    fn build_trees(
        dataset: &VectorDataset<'_>,
        config: &ForestConfig,
        observer: &dyn Observer,
    ) -> Result<Self> {
        config.validate()?;

        let tree_count = config.tree_count();
        let split_candidates = config.split_candidates(dataset.rows());

        if observer.enabled(Level::Progress) {
            observer.emit(IndexEvent::Build(BuildEvt {
                tree: None,
                kind: BuildKind::Started {
                    rows: dataset.rows(),
                    cols: dataset.cols(),
                    trees: tree_count,
                    split_candidates,
                },
            }));
        }

        let build_one = |ordinal: usize| -> Result<PartitionTree> {
            let (tree, ms) = obs_timed!({
                PartitionTree::build(dataset, config, ordinal, split_candidates, observer)
            });
            let tree = tree?;
            if observer.enabled(Level::Progress) {
                observer.emit(IndexEvent::Build(BuildEvt {
                    tree: Some(ordinal),
                    kind: BuildKind::TreeBuilt {
                        nodes: tree.node_count(),
                        leaves: tree.leaf_count(),
                        depth: tree.depth(),
                        ms,
                    },
                }));
            }
            Ok(tree)
        };

        let (trees, ms) = obs_timed!({
            if config.parallel {
                (0..tree_count)
                    .into_par_iter()
                    .map(build_one)
                    .collect::<Result<Vec<_>>>()
            } else {
                (0..tree_count).map(build_one).collect::<Result<Vec<_>>>()
            }
        });

        let forest = Self { trees: trees? };

        if observer.enabled(Level::Progress) {
            let stats = forest.stats();
            observer.emit(IndexEvent::Build(BuildEvt {
                tree: None,
                kind: BuildKind::Finished {
                    trees: stats.trees,
                    nodes: stats.nodes,
                    leaves: stats.leaves,
                    max_depth: stats.max_depth,
                    mean_leaf_size: stats.mean_leaf_size,
                    ms,
                },
            }));
        }

        Ok(forest)
    }

    pub fn trees(&self) -> &[PartitionTree] {
        &self.trees
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    pub fn stats(&self) -> ForestStats {
        let mut stats = ForestStats {
            trees: self.trees.len(),
            ..ForestStats::default()
        };
        let mut items = 0usize;

        for tree in &self.trees {
            let tree_stats = tree.stats();
            stats.nodes += tree_stats.nodes;
            stats.leaves += tree_stats.leaves;
            stats.max_depth = stats.max_depth.max(tree_stats.depth);
            stats.max_leaf_size = stats.max_leaf_size.max(tree_stats.max_leaf_size);
            stats.fallback_splits += tree_stats.fallback_splits;
            items += tree.leaves().map(<[u32]>::len).sum::<usize>();
        }

        if stats.leaves > 0 {
            stats.mean_leaf_size = items as f64 / stats.leaves as f64;
        }
        stats
    }
}

/// A forest built over a borrowed dataset.
///
/// The dataset buffer is never copied; `'a` ties the index to it.
/// Immutable after construction, so queries may run from any number of
/// threads at once.
pub struct ForestIndex<'a> {
    dataset: VectorDataset<'a>,
    forest: TreeForest,
    config: ForestConfig,
    observer: Arc<dyn Observer>,
}

impl<'a> ForestIndex<'a> {
    /// Build an index reporting diagnostics through `tracing` at the
    /// config's verbosity.
    pub fn build(dataset: VectorDataset<'a>, config: ForestConfig) -> Result<Self> {
        let observer = Arc::new(TracingObserver::new(config.verbosity_level()));
        Self::build_with_observer(dataset, config, observer)
    }

    /// Build an index reporting diagnostics to `observer`.
    pub fn build_with_observer(
        dataset: VectorDataset<'a>,
        config: ForestConfig,
        observer: Arc<dyn Observer>,
    ) -> Result<Self> {
        let forest = TreeForest::build(&dataset, &config, observer.as_ref())?;
        Ok(Self {
            dataset,
            forest,
            config,
            observer,
        })
    }

    fn engine(&self) -> QueryEngine<'_> {
        QueryEngine::new(
            self.dataset,
            &self.forest,
            self.config.distance,
            self.config.backtrack_leaves,
        )
    }

    /// Approximate `n` nearest rows to `query`, nearest first.
    pub fn query(&self, query: &[f32], n: usize) -> Result<Vec<VectorMatch>> {
        Ok(self.query_with_stats(query, n)?.matches)
    }

    /// Like [`query`](Self::query), with the work counters.
    pub fn query_with_stats(&self, query: &[f32], n: usize) -> Result<QueryResult> {
        self.engine()
            .query_observed(query, n, self.observer.as_ref())
    }

    /// Every row within `radius` of `query`, nearest first. Exact.
    pub fn find_in_range(&self, query: &[f32], radius: f32) -> Result<Vec<VectorMatch>> {
        self.engine().within(query, radius)
    }

    pub fn stats(&self) -> ForestStats {
        self.forest.stats()
    }

    pub fn forest(&self) -> &TreeForest {
        &self.forest
    }

    pub fn dataset(&self) -> &VectorDataset<'a> {
        &self.dataset
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }
}

impl std::fmt::Debug for ForestIndex<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForestIndex")
            .field("rows", &self.dataset.rows())
            .field("cols", &self.dataset.cols())
            .field("trees", &self.forest.len())
            .field("config", &self.config)
            .finish()
    }
}

fn into_vector_error(err: IndexError) -> VectorError {
    match err {
        IndexError::Vector(inner) => inner,
        other => VectorError::InvalidArgument(other.to_string()),
    }
}

impl NeighborSearch for ForestIndex<'_> {
    fn search(&self, query: &[f32], k: usize) -> pforest_vector::Result<Vec<VectorMatch>> {
        self.query(query, k).map_err(into_vector_error)
    }

    fn search_within(&self, query: &[f32], radius: f32) -> pforest_vector::Result<Vec<VectorMatch>> {
        self.find_in_range(query, radius).map_err(into_vector_error)
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
    use pforest_observe::NoopObserver;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Mutex;

    fn random_data(rows: usize, cols: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..rows * cols).map(|_| rng.gen_range(-5.0..5.0)).collect()
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<IndexEvent>>,
    }

    impl Observer for RecordingObserver {
        fn emit(&self, evt: IndexEvent) {
            if let Ok(mut events) = self.events.lock() {
                events.push(evt);
            }
        }
    }

    #[test]
    fn test_tree_count_follows_coverage() {
        let data = random_data(200, 3, 1);
        let ds = VectorDataset::new(&data, 200, 3).unwrap();

        for (coverage, trees) in [(0.3, 1), (1.0, 1), (2.5, 3), (6.0, 6)] {
            let config = ForestConfig::default().with_coverage(coverage);
            let forest = TreeForest::build(&ds, &config, &NoopObserver).unwrap();
            assert_eq!(forest.len(), trees);
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let data = random_data(1500, 5, 2);
        let ds = VectorDataset::new(&data, 1500, 5).unwrap();
        let config = ForestConfig::default()
            .with_seed(99)
            .with_coverage(6.0)
            .with_sample_rate(2.0)
            .with_leaf_capacity(10);

        let parallel = TreeForest::build(&ds, &config.clone().with_parallel(true), &NoopObserver).unwrap();
        let sequential = TreeForest::build(&ds, &config.with_parallel(false), &NoopObserver).unwrap();

        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_forest_prefix_is_stable() {
        // Tree i depends only on (seed, i), so a larger forest extends a smaller one
        let data = random_data(300, 4, 3);
        let ds = VectorDataset::new(&data, 300, 4).unwrap();
        let config = ForestConfig::default().with_leaf_capacity(8);

        let small = TreeForest::build(&ds, &config.clone().with_coverage(2.0), &NoopObserver).unwrap();
        let large = TreeForest::build(&ds, &config.with_coverage(5.0), &NoopObserver).unwrap();

        assert_eq!(small.trees(), &large.trees()[..2]);
    }

    #[test]
    fn test_build_events() {
        let data = random_data(100, 2, 4);
        let ds = VectorDataset::new(&data, 100, 2).unwrap();
        let config = ForestConfig::default().with_coverage(3.0).with_leaf_capacity(10);
        let observer = RecordingObserver::default();

        TreeForest::build(&ds, &config, &observer).unwrap();

        let events = observer.events.lock().unwrap();
        let built = events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    IndexEvent::Build(BuildEvt {
                        kind: BuildKind::TreeBuilt { .. },
                        ..
                    })
                )
            })
            .count();
        assert_eq!(built, 3);
        assert!(matches!(
            events.first(),
            Some(IndexEvent::Build(BuildEvt {
                kind: BuildKind::Started { trees: 3, .. },
                ..
            }))
        ));
        assert!(matches!(
            events.last(),
            Some(IndexEvent::Build(BuildEvt {
                kind: BuildKind::Finished { trees: 3, .. },
                ..
            }))
        ));
    }

    #[test]
    fn test_invalid_config_reports_failure() {
        let data = random_data(10, 2, 5);
        let ds = VectorDataset::new(&data, 10, 2).unwrap();
        let config = ForestConfig::default().with_leaf_capacity(0);
        let observer = RecordingObserver::default();

        let result = TreeForest::build(&ds, &config, &observer);

        assert!(matches!(result, Err(IndexError::InvalidConfig(_))));
        let events = observer.events.lock().unwrap();
        assert!(matches!(
            events.as_slice(),
            [IndexEvent::Build(BuildEvt {
                kind: BuildKind::Failed { .. },
                ..
            })]
        ));
    }

    #[test]
    fn test_stats() {
        let data = random_data(500, 3, 6);
        let ds = VectorDataset::new(&data, 500, 3).unwrap();
        let config = ForestConfig::default().with_coverage(4.0).with_leaf_capacity(16);

        let index = ForestIndex::build(ds, config).unwrap();
        let stats = index.stats();

        assert_eq!(stats.trees, 4);
        assert!(stats.max_leaf_size <= 16);
        assert!((stats.mean_leaf_size * stats.leaves as f64 - 2000.0).abs() < 1e-6);
        assert_eq!(stats.nodes, 2 * stats.leaves - 4);
    }

    #[test]
    fn test_neighbor_search_trait() {
        let data = random_data(200, 3, 7);
        let ds = VectorDataset::new(&data, 200, 3).unwrap();
        let index = ForestIndex::build(ds, ForestConfig::default().with_coverage(4.0)).unwrap();
        let search: &dyn NeighborSearch = &index;

        assert_eq!(search.len(), 200);
        assert_eq!(search.dimensions(), 3);
        assert_eq!(search.search(ds.row(17), 1).unwrap()[0].index, 17);
        assert!(matches!(
            search.search(&[0.0, 0.0], 1),
            Err(VectorError::DimensionMismatch { .. })
        ));
    }
}

//! Randomized partition-tree forest for approximate nearest neighbor search.
//!
//! Builds an ensemble of randomized space-partitioning trees over a fixed,
//! borrowed dataset and answers approximate k-NN queries against it:
//!
//! - Each tree recursively splits the row indices with a random pivot pair
//!   (points go to the nearer pivot) until leaves hold at most
//!   `leaf_capacity` rows
//! - Trees are built independently from seeds derived from one root seed,
//!   so the forest is reproducible no matter how the build is scheduled
//! - A query descends every tree, widens the search along the closest
//!   unexplored branches, and ranks the merged candidates by exact distance
//!
//! # Architecture
//!
//! ```text
//! VectorDataset (borrowed rows x cols f32)
//!      ↓ build (rayon, one StdRng per tree)
//! TreeForest = [PartitionTree; ceil(coverage)]
//!      ↓ query
//! QueryEngine: descend + backtrack → dedup candidates → exact top-n
//! ```
//!
//! # Parameters
//!
//! - `coverage`: number of trees (`ceil(coverage)`), trades build cost for recall
//! - `sample_rate`: how many pivot pairs are proposed per split
//!   (`ceil(rows^(1/3) / sample_rate)`, clamped to 1..=16)
//! - `leaf_capacity`: max rows per leaf (default: 32)
//! - `backtrack_leaves`: extra leaves visited per tree at query time (default: 4)
//!
//! # Example
//!
//! ```
//! use pforest_tree::{ForestConfig, IndexHandle};
//!
//! let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
//!
//! let mut handle = IndexHandle::new(ForestConfig::default().with_seed(0).with_coverage(8.0));
//! handle.build(&data, 3, 3).unwrap();
//!
//! let results = handle.query(&[0.0, 0.0, 0.0], 2).unwrap();
//! let ids: Vec<_> = results.iter().map(|m| m.index).collect();
//! assert_eq!(ids, vec![0, 1]);
//!
//! handle.destroy().unwrap();
//! assert!(handle.query(&[0.0, 0.0, 0.0], 2).is_err());
//! ```

mod config;
mod diagnostics;
mod forest;
mod handle;
mod query;
mod seed;
mod split;
mod tree;

pub use config::{
    split_candidates, tree_count, ForestConfig, DEFAULT_SEED, MAX_SPLIT_CANDIDATES, MAX_TREES,
};
pub use diagnostics::TracingObserver;
pub use forest::{ForestIndex, ForestStats, TreeForest};
pub use handle::{IndexHandle, Lifecycle};
pub use query::{QueryEngine, QueryResult, QueryStats};
pub use seed::{derive_tree_seed, tree_rng};
pub use split::{Routing, Side, SplitRule};
pub use tree::{Node, NodeId, PartitionTree, TreeStats};

pub use pforest_observe::Verbosity;
pub use pforest_vector::{DistanceFunction, NeighborSearch, VectorDataset, VectorMatch};

use pforest_vector::VectorError;

/// Error type for index operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndexError {
    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),

    #[error("Allocation failure: {0}")]
    AllocationFailure(String),

    #[error("Index has been destroyed")]
    UseAfterDestroy,

    #[error("Index has not been built")]
    NotBuilt,

    #[error("Index is already built; create a new handle for another dataset")]
    AlreadyBuilt,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl IndexError {
    /// Bad rows/cols/buffer length at build time.
    pub fn is_invalid_shape(&self) -> bool {
        matches!(self, IndexError::Vector(VectorError::InvalidShape { .. }))
    }

    /// Query vector length differs from the dataset dimension.
    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(self, IndexError::Vector(VectorError::DimensionMismatch { .. }))
    }

    pub fn is_allocation_failure(&self) -> bool {
        matches!(self, IndexError::AllocationFailure(_))
    }

    pub fn is_use_after_destroy(&self) -> bool {
        matches!(self, IndexError::UseAfterDestroy)
    }
}

impl From<std::collections::TryReserveError> for IndexError {
    fn from(err: std::collections::TryReserveError) -> Self {
        IndexError::AllocationFailure(err.to_string())
    }
}

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

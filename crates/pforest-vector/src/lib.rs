//! Dense vector primitives for the pforest ANN index.
//!
//! This crate provides the pieces every index layer shares:
//!
//! - **VectorDataset**: borrowed, immutable view over a row-major `f32` matrix
//! - **Distance functions**: squared Euclidean for ranking, Euclidean for reporting
//! - **NeighborSearch trait**: common read-only interface for k-NN and range search
//! - **BruteForceIndex**: exact linear scan (baseline for recall measurements)
//! - **Recall scoring**: compare approximate results against an exact baseline
//!
//! # Architecture
//!
//! ```text
//! caller buffer (rows * cols f32)
//!      ↓ borrowed, never copied
//! VectorDataset ──> pforest-tree::ForestIndex (approximate, partition forest)
//!              └──> BruteForceIndex           (exact, linear scan)
//! ```
//!
//! # Example
//!
//! ```
//! use pforest_vector::{BruteForceIndex, DistanceFunction, NeighborSearch, VectorDataset};
//!
//! let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
//! let dataset = VectorDataset::new(&data, 3, 3).unwrap();
//!
//! let index = BruteForceIndex::new(dataset, DistanceFunction::SquaredEuclidean);
//! let results = index.search(&[0.0, 0.0, 0.0], 2).unwrap();
//!
//! assert_eq!(results[0].index, 0);
//! assert_eq!(results[0].distance, 14.0);
//! assert_eq!(results[1].index, 1);
//! ```

mod brute;
mod dataset;
mod distance;
pub mod recall;
mod traits;

pub use brute::{rank_top_k, BruteForceIndex};
pub use dataset::VectorDataset;
pub use distance::{euclidean_distance, euclidean_distance_squared, DistanceFunction};
pub use traits::{NeighborSearch, VectorMatch};

/// Error type for vector operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VectorError {
    #[error("Invalid shape: {rows} rows x {cols} cols does not describe a buffer of {len} floats")]
    InvalidShape { rows: usize, cols: usize, len: usize },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for vector operations.
pub type Result<T> = std::result::Result<T, VectorError>;

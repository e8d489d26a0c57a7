//! Forest configuration.
//!
//! All tunables of a build live in [`ForestConfig`]. The config can be
//! constructed in code with the builder-style setters or deserialized from
//! any serde format; missing fields take their defaults.
//!
//! ```
//! use pforest_tree::ForestConfig;
//!
//! let config = ForestConfig::default()
//!     .with_seed(7)
//!     .with_coverage(8.0)
//!     .with_leaf_capacity(16);
//! assert_eq!(config.tree_count(), 8);
//! ```

use crate::{IndexError, Result};
use pforest_observe::Verbosity;
use pforest_vector::DistanceFunction;
use serde::{Deserialize, Serialize};

/// Seed used when the caller does not pick one.
pub const DEFAULT_SEED: u64 = 3_141_569;

/// Upper bound on the number of trees in one forest.
pub const MAX_TREES: usize = 4096;

/// Upper bound on pivot pairs proposed per split.
pub const MAX_SPLIT_CANDIDATES: usize = 16;

/// Forest configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Root seed; every tree derives its own stream from it.
    /// Default: 3141569
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of independent trees, as `ceil(coverage)`.
    /// Higher = better recall, linear build time and memory.
    /// Default: 1.0
    #[serde(default = "default_coverage")]
    pub coverage: f32,

    /// Split sampling rate. `None` derives `rows^(1/3)` at build time,
    /// which proposes a single pivot pair per split.
    /// Default: None
    #[serde(default)]
    pub sample_rate: Option<f32>,

    /// Maximum number of rows in a leaf.
    /// Default: 32
    #[serde(default = "default_leaf_capacity")]
    pub leaf_capacity: usize,

    /// Random pivot draws tried before falling back to a median split.
    /// Default: 8
    #[serde(default = "default_max_split_attempts")]
    pub max_split_attempts: usize,

    /// Extra leaves visited per tree at query time (0 = primary leaf only).
    /// Default: 4
    #[serde(default = "default_backtrack_leaves")]
    pub backtrack_leaves: usize,

    /// Build trees on the rayon thread pool.
    /// Default: true
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    /// Unit of reported distances. Ranking always uses squared distance.
    /// Default: euclidean
    #[serde(default)]
    pub distance: DistanceFunction,

    /// Diagnostic verbosity: <= 0 silent, 1 errors, 2 progress, >= 3 debug.
    /// Never affects the built structure.
    /// Default: 0
    #[serde(default)]
    pub verbosity: i32,
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_coverage() -> f32 {
    1.0
}

fn default_leaf_capacity() -> usize {
    32
}

fn default_max_split_attempts() -> usize {
    8
}

fn default_backtrack_leaves() -> usize {
    4
}

fn default_parallel() -> bool {
    true
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            coverage: default_coverage(),
            sample_rate: None,
            leaf_capacity: default_leaf_capacity(),
            max_split_attempts: default_max_split_attempts(),
            backtrack_leaves: default_backtrack_leaves(),
            parallel: default_parallel(),
            distance: DistanceFunction::default(),
            verbosity: 0,
        }
    }
}

impl ForestConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_coverage(mut self, coverage: f32) -> Self {
        self.coverage = coverage;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: f32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_leaf_capacity(mut self, leaf_capacity: usize) -> Self {
        self.leaf_capacity = leaf_capacity;
        self
    }

    pub fn with_backtrack_leaves(mut self, backtrack_leaves: usize) -> Self {
        self.backtrack_leaves = backtrack_leaves;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_distance(mut self, distance: DistanceFunction) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_verbosity(mut self, verbosity: i32) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Check every field for a usable value.
    pub fn validate(&self) -> Result<()> {
        if !self.coverage.is_finite() || self.coverage <= 0.0 {
            return Err(IndexError::InvalidConfig(format!(
                "coverage must be finite and positive, got {}",
                self.coverage
            )));
        }
        if self.coverage.ceil() > MAX_TREES as f32 {
            return Err(IndexError::InvalidConfig(format!(
                "coverage {} exceeds the maximum of {} trees",
                self.coverage, MAX_TREES
            )));
        }
        if let Some(rate) = self.sample_rate {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(IndexError::InvalidConfig(format!(
                    "sample_rate must be finite and positive, got {}",
                    rate
                )));
            }
        }
        if self.leaf_capacity == 0 {
            return Err(IndexError::InvalidConfig(
                "leaf_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_split_attempts == 0 {
            return Err(IndexError::InvalidConfig(
                "max_split_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of trees this config builds.
    pub fn tree_count(&self) -> usize {
        tree_count(self.coverage)
    }

    /// Pivot pairs proposed per split for a dataset of `rows` rows.
    pub fn split_candidates(&self, rows: usize) -> usize {
        match self.sample_rate {
            Some(rate) => split_candidates(rows, rate),
            None => 1,
        }
    }

    pub fn verbosity_level(&self) -> Verbosity {
        Verbosity::from_raw(self.verbosity)
    }
}

/// Map coverage to a tree count: `ceil(coverage)`, clamped to `1..=MAX_TREES`.
///
/// Monotone non-decreasing in `coverage`.
pub fn tree_count(coverage: f32) -> usize {
    if !coverage.is_finite() || coverage <= 1.0 {
        return 1;
    }
    (coverage.ceil() as usize).clamp(1, MAX_TREES)
}

/// Map the sample rate to pivot pairs per split:
/// `ceil(rows^(1/3) / sample_rate)`, clamped to `1..=MAX_SPLIT_CANDIDATES`.
///
/// A sample rate of `rows^(1/3)` (the binding's default) yields one pair;
/// smaller rates examine more pairs and build better balanced trees.
pub fn split_candidates(rows: usize, sample_rate: f32) -> usize {
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        return 1;
    }
    let ratio = (rows as f64).cbrt() / sample_rate as f64;
    // Absorb rounding when the caller computed rows^(1/3) in f32
    let width = (ratio - 1e-4).ceil();
    if width < 1.0 {
        1
    } else {
        (width as usize).min(MAX_SPLIT_CANDIDATES)
    }
}

//! Single-owner index handle with an explicit lifecycle.
//!
//! ```text
//! Unbuilt --build--> Built --destroy--> Destroyed
//!    |                                      ^
//!    +-------------------destroy------------+
//! ```
//!
//! A handle indexes exactly one dataset: building twice is an error, and
//! every operation after `destroy` fails with `UseAfterDestroy`. Dropping
//! the handle releases the index in any state.

use crate::config::ForestConfig;
use crate::forest::{ForestIndex, ForestStats};
use crate::query::QueryResult;
use crate::{IndexError, Result};
use pforest_observe::Observer;
use pforest_vector::{VectorDataset, VectorMatch};
use std::sync::Arc;

/// Observable lifecycle state of an [`IndexHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unbuilt,
    Built,
    Destroyed,
}

enum State<'a> {
    Unbuilt,
    Built(ForestIndex<'a>),
    Destroyed,
}

/// Owner of at most one built index.
pub struct IndexHandle<'a> {
    config: ForestConfig,
    observer: Option<Arc<dyn Observer>>,
    state: State<'a>,
}

impl<'a> IndexHandle<'a> {
    /// A handle that reports diagnostics through `tracing` at the config's
    /// verbosity.
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            observer: None,
            state: State::Unbuilt,
        }
    }

    /// A handle that reports diagnostics to `observer`.
    pub fn with_observer(config: ForestConfig, observer: Arc<dyn Observer>) -> Self {
        Self {
            config,
            observer: Some(observer),
            state: State::Unbuilt,
        }
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn state(&self) -> Lifecycle {
        match self.state {
            State::Unbuilt => Lifecycle::Unbuilt,
            State::Built(_) => Lifecycle::Built,
            State::Destroyed => Lifecycle::Destroyed,
        }
    }

    /// Build the index over `rows * cols` row-major floats.
    ///
    /// The buffer is borrowed, not copied. A failed build leaves the handle
    /// `Unbuilt`.
    ///
    /// # Errors
    ///
    /// - `AlreadyBuilt` / `UseAfterDestroy` outside the `Unbuilt` state
    /// - `InvalidShape` or `InvalidVector` for a bad buffer
    /// - `InvalidConfig`, `AllocationFailure` from the forest build
    pub fn build(&mut self, data: &'a [f32], rows: usize, cols: usize) -> Result<()> {
        match self.state {
            State::Unbuilt => {}
            State::Built(_) => return Err(IndexError::AlreadyBuilt),
            State::Destroyed => return Err(IndexError::UseAfterDestroy),
        }

        let dataset = VectorDataset::new(data, rows, cols)?;
        let config = self.config.clone();
        let index = match &self.observer {
            Some(observer) => ForestIndex::build_with_observer(dataset, config, Arc::clone(observer))?,
            None => ForestIndex::build(dataset, config)?,
        };

        self.state = State::Built(index);
        Ok(())
    }

    /// The built index.
    pub fn index(&self) -> Result<&ForestIndex<'a>> {
        match &self.state {
            State::Built(index) => Ok(index),
            State::Unbuilt => Err(IndexError::NotBuilt),
            State::Destroyed => Err(IndexError::UseAfterDestroy),
        }
    }

    /// Approximate `n` nearest rows to `query`, nearest first.
    pub fn query(&self, query: &[f32], n: usize) -> Result<Vec<VectorMatch>> {
        self.index()?.query(query, n)
    }

    pub fn query_with_stats(&self, query: &[f32], n: usize) -> Result<QueryResult> {
        self.index()?.query_with_stats(query, n)
    }

    /// Every row within `radius` of `query`, nearest first.
    pub fn find_in_range(&self, query: &[f32], radius: f32) -> Result<Vec<VectorMatch>> {
        self.index()?.find_in_range(query, radius)
    }

    pub fn stats(&self) -> Result<ForestStats> {
        Ok(self.index()?.stats())
    }

    /// Release the index. Valid once, from `Unbuilt` or `Built`.
    pub fn destroy(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Destroyed) {
            State::Destroyed => Err(IndexError::UseAfterDestroy),
            State::Unbuilt | State::Built(_) => Ok(()),
        }
    }
}

impl std::fmt::Debug for IndexHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pforest_observe::NoopObserver;

    const DATA: [f32; 9] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];

    #[test]
    fn test_lifecycle() {
        let mut handle = IndexHandle::new(ForestConfig::default());
        assert_eq!(handle.state(), Lifecycle::Unbuilt);
        assert_eq!(handle.query(&[0.0, 0.0, 0.0], 1), Err(IndexError::NotBuilt));

        handle.build(&DATA, 3, 3).unwrap();
        assert_eq!(handle.state(), Lifecycle::Built);
        assert_eq!(handle.build(&DATA, 3, 3), Err(IndexError::AlreadyBuilt));

        handle.destroy().unwrap();
        assert_eq!(handle.state(), Lifecycle::Destroyed);
        assert_eq!(
            handle.query(&[0.0, 0.0, 0.0], 1),
            Err(IndexError::UseAfterDestroy)
        );
        assert_eq!(handle.build(&DATA, 3, 3), Err(IndexError::UseAfterDestroy));
        assert_eq!(handle.destroy(), Err(IndexError::UseAfterDestroy));
    }

    #[test]
    fn test_failed_build_stays_unbuilt() {
        let mut handle = IndexHandle::with_observer(ForestConfig::default(), Arc::new(NoopObserver));

        let err = handle.build(&DATA, 2, 3).unwrap_err();
        assert!(err.is_invalid_shape());
        assert_eq!(handle.state(), Lifecycle::Unbuilt);

        handle.build(&DATA, 3, 3).unwrap();
        assert_eq!(handle.state(), Lifecycle::Built);
    }

    #[test]
    fn test_destroy_unbuilt() {
        let mut handle = IndexHandle::new(ForestConfig::default());
        handle.destroy().unwrap();
        assert!(handle.stats().unwrap_err().is_use_after_destroy());
    }

    #[test]
    fn test_query_scenario() {
        let mut handle = IndexHandle::new(ForestConfig::default().with_coverage(3.0));
        handle.build(&DATA, 3, 3).unwrap();

        let results = handle.query(&[0.0, 0.0, 0.0], 2).unwrap();
        let ids: Vec<_> = results.iter().map(|m| m.index).collect();
        assert_eq!(ids, vec![0, 1]);
        assert!((results[0].distance - 14.0f32.sqrt()).abs() < 1e-5);

        let err = handle.query(&[0.0, 0.0], 2).unwrap_err();
        assert!(err.is_dimension_mismatch());
    }
}

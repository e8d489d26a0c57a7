//! `tracing` backend for index diagnostics.

use pforest_observe::{BuildKind, IndexEvent, Level, Observer, Verbosity};

/// Forwards [`IndexEvent`]s that pass a [`Verbosity`] filter to `tracing`.
///
/// Errors go to `error!`, build progress to `info!`, fallback splits and
/// per-query stats to `debug!`. Installing a subscriber is up to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver {
    verbosity: Verbosity,
}

impl TracingObserver {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }
}

impl Observer for TracingObserver {
    fn enabled(&self, level: Level) -> bool {
        self.verbosity.allows(level)
    }

    fn emit(&self, evt: IndexEvent) {
        if !self.enabled(evt.level()) {
            return;
        }

        match evt {
            IndexEvent::Build(build) => {
                let tree = build.tree;
                match build.kind {
                    BuildKind::Started {
                        rows,
                        cols,
                        trees,
                        split_candidates,
                    } => {
                        tracing::info!(
                            "Building forest: rows={}, cols={}, trees={}, split_candidates={}",
                            rows,
                            cols,
                            trees,
                            split_candidates
                        );
                    }
                    BuildKind::TreeBuilt {
                        nodes,
                        leaves,
                        depth,
                        ms,
                    } => {
                        tracing::info!(
                            "Tree {:?} built: nodes={}, leaves={}, depth={}, took {:.2}ms",
                            tree,
                            nodes,
                            leaves,
                            depth,
                            ms
                        );
                    }
                    BuildKind::FallbackSplit { items, depth } => {
                        tracing::debug!(
                            "Tree {:?}: median fallback split of {} items at depth {}",
                            tree,
                            items,
                            depth
                        );
                    }
                    BuildKind::Finished {
                        trees,
                        nodes,
                        leaves,
                        max_depth,
                        mean_leaf_size,
                        ms,
                    } => {
                        tracing::info!(
                            "Forest built: trees={}, nodes={}, leaves={}, max_depth={}, mean_leaf_size={:.2}, took {:.2}ms",
                            trees,
                            nodes,
                            leaves,
                            max_depth,
                            mean_leaf_size,
                            ms
                        );
                    }
                    BuildKind::Failed { reason } => {
                        tracing::error!("Forest build failed: {}", reason);
                    }
                }
            }
            IndexEvent::Query(query) => {
                tracing::debug!(
                    "Query: requested={}, returned={}, candidates={}, leaves_visited={}, distance_computations={}",
                    query.requested,
                    query.returned,
                    query.candidates,
                    query.leaves_visited,
                    query.distance_computations
                );
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pforest_observe::{BuildEvt, QueryEvt};

    #[test]
    fn test_enabled_follows_verbosity() {
        let silent = TracingObserver::default();
        assert!(!silent.enabled(Level::Error));

        let progress = TracingObserver::new(Verbosity::from_raw(2));
        assert!(progress.enabled(Level::Error));
        assert!(progress.enabled(Level::Progress));
        assert!(!progress.enabled(Level::Debug));
    }

    #[test]
    fn test_emit_without_subscriber() {
        let observer = TracingObserver::new(Verbosity::Debug);

        observer.emit(IndexEvent::Build(BuildEvt {
            tree: Some(1),
            kind: BuildKind::FallbackSplit { items: 40, depth: 7 },
        }));
        observer.emit(IndexEvent::Query(QueryEvt {
            requested: 10,
            returned: 10,
            candidates: 120,
            leaves_visited: 5,
            distance_computations: 120,
        }));
    }
}

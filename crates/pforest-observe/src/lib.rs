//! pforest-observe: vendor-neutral diagnostic sink ABI.
//!
//! Index crates depend only on these traits and event types. Backends (for
//! example the `tracing` forwarder in pforest-tree) live elsewhere.

/// Severity of a diagnostic event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Error,
    Progress,
    Debug,
}

/// How much diagnostic output a caller wants.
///
/// Mirrors the integer verbosity of the C ABI: `<= 0` silent, `1` errors,
/// `2` errors and progress, `>= 3` everything.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verbosity {
    #[default]
    Silent,
    Errors,
    Progress,
    Debug,
}

impl Verbosity {
    /// Clamp a raw integer verbosity into a level.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            i32::MIN..=0 => Self::Silent,
            1 => Self::Errors,
            2 => Self::Progress,
            _ => Self::Debug,
        }
    }

    /// Whether events of `level` pass this verbosity.
    pub fn allows(self, level: Level) -> bool {
        match self {
            Self::Silent => false,
            Self::Errors => level == Level::Error,
            Self::Progress => level <= Level::Progress,
            Self::Debug => true,
        }
    }
}

pub trait Observer: Send + Sync + 'static {
    /// Cheap pre-check so callers can skip building events nobody wants.
    fn enabled(&self, _level: Level) -> bool {
        true
    }
    fn emit(&self, evt: IndexEvent);
}

/// A do-nothing observer for tests and users who don't care about diagnostics.
#[derive(Clone, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn enabled(&self, _level: Level) -> bool {
        false
    }
    fn emit(&self, _e: IndexEvent) {}
}

/// Typed diagnostic events (vector contents are never included).
#[non_exhaustive]
#[derive(Clone, Debug)]
pub enum IndexEvent {
    Build(BuildEvt),
    Query(QueryEvt),
}

impl IndexEvent {
    /// The severity this event is reported at.
    pub fn level(&self) -> Level {
        match self {
            IndexEvent::Build(evt) => match evt.kind {
                BuildKind::Failed { .. } => Level::Error,
                BuildKind::FallbackSplit { .. } => Level::Debug,
                _ => Level::Progress,
            },
            IndexEvent::Query(_) => Level::Debug,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BuildEvt {
    /// Ordinal of the tree the event refers to, if any.
    pub tree: Option<usize>,
    pub kind: BuildKind,
}

#[derive(Clone, Debug)]
pub enum BuildKind {
    Started {
        rows: usize,
        cols: usize,
        trees: usize,
        split_candidates: usize,
    },
    /// A node fell back to a median split after repeated degenerate draws.
    FallbackSplit { items: usize, depth: usize },
    TreeBuilt {
        nodes: usize,
        leaves: usize,
        depth: usize,
        ms: f64,
    },
    Finished {
        trees: usize,
        nodes: usize,
        leaves: usize,
        max_depth: usize,
        mean_leaf_size: f64,
        ms: f64,
    },
    Failed { reason: String },
}

#[derive(Clone, Debug)]
pub struct QueryEvt {
    pub requested: usize,
    pub returned: usize,
    pub candidates: usize,
    pub leaves_visited: usize,
    pub distance_computations: usize,
}

/// Time a block, returning `(value, elapsed_ms)`.
#[macro_export]
macro_rules! obs_timed {
    ($body:block) => {{
        let __t = std::time::Instant::now();
        let __ret = { $body };
        let __ms = __t.elapsed().as_secs_f64() * 1000.0;
        (__ret, __ms)
    }};
}

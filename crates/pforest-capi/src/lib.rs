//! C ABI for the partition forest index.
//!
//! ```c
//! typedef struct RctHandle RctHandle;
//!
//! RctHandle *rct_build(unsigned long seed, int verbosity, float coverage,
//!                      float sample_rate, const float *data, int rows, int cols);
//! void rct_destroy(RctHandle *handle);
//! int rct_find_near(const RctHandle *handle, const float *query, int n, int *out);
//! int rct_find_near_dists(const RctHandle *handle, const float *query, int n,
//!                         int *out_idx, float *out_dist);
//! const char *rct_last_error(void);
//! ```
//!
//! # Safety contract
//!
//! - `data` must point to `rows * cols` aligned floats that stay alive and
//!   unmodified until `rct_destroy` returns. The index borrows the buffer.
//! - `query` must point to `cols` floats; `out`, `out_idx` and `out_dist`
//!   must have room for `n` values.
//! - `rct_destroy` must happen-after every query on the handle and must be
//!   called at most once per handle.
//!
//! Failures never unwind across the boundary. `rct_build` returns null and
//! the query functions return a negative status; `rct_last_error` describes
//! the most recent failure on the calling thread.

use libc::{c_char, c_int, c_ulong};
use pforest_tree::{ForestConfig, ForestIndex, IndexError, VectorDataset, VectorMatch, Verbosity};
use std::cell::RefCell;
use std::ffi::CString;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::slice;

/// A null handle or pointer argument.
pub const RCT_ERR_NULL: c_int = -1;
/// A bad argument (`n <= 0`, NaN in the query, ...).
pub const RCT_ERR_INVALID: c_int = -2;
/// Internal failure, including a caught panic.
pub const RCT_ERR_INTERNAL: c_int = -3;

/// Opaque index handle.
pub struct RctHandle {
    index: ForestIndex<'static>,
}

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_error(msg: impl Into<String>) {
    let msg = CString::new(msg.into().replace('\0', "")).unwrap_or_default();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(msg));
}

fn clear_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

fn status_for(err: &IndexError) -> c_int {
    match err {
        IndexError::Vector(_) | IndexError::InvalidConfig(_) => RCT_ERR_INVALID,
        IndexError::UseAfterDestroy | IndexError::NotBuilt => RCT_ERR_NULL,
        _ => RCT_ERR_INTERNAL,
    }
}

/// Install a stderr `tracing` subscriber for the given verbosity.
///
/// `RUST_LOG` overrides the level. An already installed subscriber wins.
fn init_logging(verbosity: Verbosity) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = match verbosity {
        Verbosity::Silent => return,
        Verbosity::Errors => tracing::Level::ERROR,
        Verbosity::Progress => tracing::Level::INFO,
        Verbosity::Debug => tracing::Level::DEBUG,
    };

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .try_init();
}

/// Build an index over `rows * cols` row-major floats.
///
/// `sample_rate <= 0` (or NaN) derives the rate from the row count.
/// Returns null on failure.
///
/// # Safety
///
/// `data` must satisfy the crate-level safety contract.
#[no_mangle]
pub unsafe extern "C" fn rct_build(
    seed: c_ulong,
    verbosity: c_int,
    coverage: f32,
    sample_rate: f32,
    data: *const f32,
    rows: c_int,
    cols: c_int,
) -> *mut RctHandle {
    clear_error();

    if data.is_null() {
        set_error("data pointer is null");
        return ptr::null_mut();
    }
    if rows <= 0 || cols <= 0 {
        set_error(format!("invalid shape: rows={}, cols={}", rows, cols));
        return ptr::null_mut();
    }
    let (rows, cols) = (rows as usize, cols as usize);
    let len = match rows.checked_mul(cols) {
        Some(len) if len <= isize::MAX as usize / std::mem::size_of::<f32>() => len,
        _ => {
            set_error(format!("shape overflows: rows={}, cols={}", rows, cols));
            return ptr::null_mut();
        }
    };

    let mut config = ForestConfig::default()
        .with_seed(u64::from(seed))
        .with_coverage(coverage)
        .with_verbosity(verbosity);
    if sample_rate > 0.0 {
        config = config.with_sample_rate(sample_rate);
    }
    init_logging(config.verbosity_level());

    // SAFETY: the caller guarantees `len` readable floats at `data` that
    // outlive the returned handle.
    let data: &'static [f32] = unsafe { slice::from_raw_parts(data, len) };

    let built = panic::catch_unwind(move || {
        let dataset = VectorDataset::new(data, rows, cols)?;
        ForestIndex::build(dataset, config)
    });

    match built {
        Ok(Ok(index)) => Box::into_raw(Box::new(RctHandle { index })),
        Ok(Err(err)) => {
            set_error(err.to_string());
            ptr::null_mut()
        }
        Err(_) => {
            set_error("panic while building index");
            ptr::null_mut()
        }
    }
}

/// Release a handle. Null is a no-op.
///
/// # Safety
///
/// `handle` must come from `rct_build` and must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn rct_destroy(handle: *mut RctHandle) {
    if handle.is_null() {
        return;
    }
    // SAFETY: non-null handles are only produced by `Box::into_raw` in `rct_build`.
    let handle = unsafe { Box::from_raw(handle) };
    if panic::catch_unwind(AssertUnwindSafe(move || drop(handle))).is_err() {
        set_error("panic while destroying index");
    }
}

/// Validate arguments and run a query.
///
/// # Safety
///
/// Same as [`rct_find_near`].
unsafe fn run_query(
    handle: *const RctHandle,
    query: *const f32,
    n: c_int,
) -> Result<Vec<VectorMatch>, c_int> {
    clear_error();

    // SAFETY: non-null handles are only produced by `rct_build`.
    let Some(handle) = (unsafe { handle.as_ref() }) else {
        set_error("handle is null");
        return Err(RCT_ERR_NULL);
    };
    if query.is_null() {
        set_error("query pointer is null");
        return Err(RCT_ERR_NULL);
    }
    if n <= 0 {
        set_error(format!("n must be positive, got {}", n));
        return Err(RCT_ERR_INVALID);
    }

    // SAFETY: the caller guarantees `cols` readable floats at `query`.
    let query = unsafe { slice::from_raw_parts(query, handle.index.dataset().cols()) };

    match panic::catch_unwind(AssertUnwindSafe(|| handle.index.query(query, n as usize))) {
        Ok(Ok(matches)) => Ok(matches),
        Ok(Err(err)) => {
            set_error(err.to_string());
            Err(status_for(&err))
        }
        Err(_) => {
            set_error("panic while querying index");
            Err(RCT_ERR_INTERNAL)
        }
    }
}

/// Write the row indices of up to `n` approximate nearest neighbors of
/// `query` to `out`, nearest first.
///
/// Returns the number written (fewer than `n` when the dataset is smaller)
/// or a negative status.
///
/// # Safety
///
/// `handle` must be live; `query` must hold `cols` floats and `out` room
/// for `n` ints.
#[no_mangle]
pub unsafe extern "C" fn rct_find_near(
    handle: *const RctHandle,
    query: *const f32,
    n: c_int,
    out: *mut c_int,
) -> c_int {
    if out.is_null() {
        set_error("output pointer is null");
        return RCT_ERR_NULL;
    }
    let matches = match unsafe { run_query(handle, query, n) } {
        Ok(matches) => matches,
        Err(status) => return status,
    };

    // SAFETY: `out` has room for `n` values and `matches.len() <= n`.
    let out = unsafe { slice::from_raw_parts_mut(out, matches.len()) };
    for (slot, m) in out.iter_mut().zip(&matches) {
        *slot = m.index as c_int;
    }
    matches.len() as c_int
}

/// Like [`rct_find_near`], also writing each neighbor's Euclidean distance
/// to `out_dist`.
///
/// # Safety
///
/// As for [`rct_find_near`]; `out_dist` must have room for `n` floats.
#[no_mangle]
pub unsafe extern "C" fn rct_find_near_dists(
    handle: *const RctHandle,
    query: *const f32,
    n: c_int,
    out_idx: *mut c_int,
    out_dist: *mut f32,
) -> c_int {
    if out_idx.is_null() || out_dist.is_null() {
        set_error("output pointer is null");
        return RCT_ERR_NULL;
    }
    let matches = match unsafe { run_query(handle, query, n) } {
        Ok(matches) => matches,
        Err(status) => return status,
    };

    // SAFETY: both buffers have room for `n` values and `matches.len() <= n`.
    let (idx, dist) = unsafe {
        (
            slice::from_raw_parts_mut(out_idx, matches.len()),
            slice::from_raw_parts_mut(out_dist, matches.len()),
        )
    };
    for ((slot_idx, slot_dist), m) in idx.iter_mut().zip(dist.iter_mut()).zip(&matches) {
        *slot_idx = m.index as c_int;
        *slot_dist = m.distance;
    }
    matches.len() as c_int
}

/// Message of the last failure on this thread, or null.
///
/// The pointer stays valid until the next `rct_*` call on the same thread.
#[no_mangle]
pub extern "C" fn rct_last_error() -> *const c_char {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map_or(ptr::null(), |msg| msg.as_ptr()))
}

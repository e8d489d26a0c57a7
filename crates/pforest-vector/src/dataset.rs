//! Borrowed view over a row-major `f32` matrix.

use crate::distance::euclidean_distance_squared;
use crate::{Result, VectorError};

/// Immutable, borrowed view over `rows * cols` row-major floats.
///
/// The view never copies the caller's buffer. Whoever builds an index on top
/// of a dataset must keep the buffer alive (and unmodified) for as long as
/// the index exists; the lifetime `'a` enforces this for Rust callers.
#[derive(Debug, Clone, Copy)]
pub struct VectorDataset<'a> {
    data: &'a [f32],
    rows: usize,
    cols: usize,
}

impl<'a> VectorDataset<'a> {
    /// Wrap a row-major buffer with the given shape.
    ///
    /// # Errors
    ///
    /// - [`VectorError::InvalidShape`] if `rows` or `cols` is zero, if
    ///   `rows * cols` overflows, if there are more rows than a `u32` row
    ///   index can address, or if `data.len() != rows * cols`.
    /// - [`VectorError::InvalidVector`] if the buffer contains NaN or
    ///   infinite values.
    pub fn new(data: &'a [f32], rows: usize, cols: usize) -> Result<Self> {
        let shape_error = || VectorError::InvalidShape {
            rows,
            cols,
            len: data.len(),
        };

        if rows == 0 || cols == 0 || rows > u32::MAX as usize {
            return Err(shape_error());
        }
        match rows.checked_mul(cols) {
            Some(expected) if expected == data.len() => {}
            _ => return Err(shape_error()),
        }

        if let Some(pos) = data.iter().position(|v| !v.is_finite()) {
            return Err(VectorError::InvalidVector(format!(
                "non-finite value at row {}, column {}",
                pos / cols,
                pos % cols
            )));
        }

        Ok(Self { data, rows, cols })
    }

    /// Number of vectors.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Dimension of every vector.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of vectors (alias for [`rows`](Self::rows)).
    #[inline]
    pub fn len(&self) -> usize {
        self.rows
    }

    /// Always `false`: a dataset holds at least one row.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// The underlying row-major buffer.
    #[inline]
    pub fn as_slice(&self) -> &'a [f32] {
        self.data
    }

    /// Row `i` as a slice of `cols` floats.
    ///
    /// # Panics
    ///
    /// Panics if `i >= rows`.
    #[inline]
    pub fn row(&self, i: usize) -> &'a [f32] {
        let data: &'a [f32] = self.data;
        let start = i * self.cols;
        &data[start..start + self.cols]
    }

    /// Iterate over all rows in index order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &'a [f32]> + 'a {
        let data: &'a [f32] = self.data;
        data.chunks_exact(self.cols)
    }

    /// Squared Euclidean distance from row `i` to `query`.
    #[inline]
    pub fn distance_sq_to(&self, i: usize, query: &[f32]) -> f32 {
        euclidean_distance_squared(self.row(i), query)
    }

    /// Squared Euclidean distance between rows `i` and `j`.
    #[inline]
    pub fn distance_sq_between(&self, i: usize, j: usize) -> f32 {
        euclidean_distance_squared(self.row(i), self.row(j))
    }

    /// Validate a query vector against this dataset.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The query dimension doesn't match `cols`
    /// - The query contains invalid values (NaN, Inf)
    pub fn check_query(&self, query: &[f32]) -> Result<()> {
        if query.len() != self.cols {
            return Err(VectorError::DimensionMismatch {
                expected: self.cols,
                actual: query.len(),
            });
        }

        for (i, &v) in query.iter().enumerate() {
            if v.is_nan() {
                return Err(VectorError::InvalidVector(format!("NaN value at index {}", i)));
            }
            if v.is_infinite() {
                return Err(VectorError::InvalidVector(format!(
                    "Infinite value at index {}",
                    i
                )));
            }
        }

        Ok(())
    }
}

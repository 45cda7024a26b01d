//! Dense matrix container
//!
//! This module provides [`DenseMatrix`], the row-major 2-D container consumed
//! by the sparse codec and the reference compute engine. Construction
//! validates that the element count matches the declared shape, so downstream
//! passes can index without re-checking.

use std::fmt;

use num_traits::Num;
use serde::{Deserialize, Serialize};

use crate::error::{EsparsoError, Result};

/// Row-major 2-D matrix with shape-validated construction
///
/// # Examples
///
/// ```
/// use esparso::DenseMatrix;
///
/// let m = DenseMatrix::from_vec(2, 3, vec![
///     1.0, 0.0, 2.0,
///     0.0, 3.0, 0.0,
/// ]).unwrap();
///
/// assert_eq!(m.rows(), 2);
/// assert_eq!(m.cols(), 3);
/// assert_eq!(m.get(1, 1), 3.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseMatrix<T: Num> {
    /// Flattened elements in row-major order
    data: Vec<T>,
    /// Number of rows
    rows: usize,
    /// Number of columns
    cols: usize,
}

impl<T: Num + Copy> DenseMatrix<T> {
    /// Create a matrix from a flat row-major vector
    ///
    /// # Arguments
    ///
    /// * `rows` - Number of rows (must be > 0)
    /// * `cols` - Number of columns (must be > 0)
    /// * `data` - Flattened elements, `rows * cols` of them
    ///
    /// # Errors
    ///
    /// Returns `Err` if either dimension is zero or `data.len()` doesn't
    /// equal `rows * cols`.
    ///
    /// # Examples
    ///
    /// ```
    /// use esparso::DenseMatrix;
    ///
    /// let m = DenseMatrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    /// assert_eq!(m.rows(), 2);
    ///
    /// assert!(DenseMatrix::from_vec(2, 2, vec![1.0]).is_err());
    /// ```
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(EsparsoError::InvalidShape {
                reason: "Matrix dimensions cannot be zero".to_string(),
            });
        }

        let expected = rows * cols;
        if data.len() != expected {
            return Err(EsparsoError::DataShapeMismatch {
                data_size: data.len(),
                shape: vec![rows, cols],
                expected,
            });
        }

        Ok(Self { data, rows, cols })
    }

    /// Create a zero-filled matrix
    ///
    /// # Errors
    ///
    /// Returns `Err` if either dimension is zero.
    pub fn zeros(rows: usize, cols: usize) -> Result<Self> {
        Self::from_vec(rows, cols, vec![T::zero(); rows * cols])
    }

    /// Number of rows
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of elements
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Flat row-major element slice
    #[must_use]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Mutable flat row-major element slice
    #[must_use]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Element at `(row, col)`
    ///
    /// # Panics
    ///
    /// Panics if `row` or `col` is out of bounds.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> T {
        assert!(row < self.rows && col < self.cols, "index out of bounds");
        self.data[row * self.cols + col]
    }

    /// Row `r` as a slice
    ///
    /// # Panics
    ///
    /// Panics if `r` is out of bounds.
    #[must_use]
    pub fn row(&self, r: usize) -> &[T] {
        assert!(r < self.rows, "row index out of bounds");
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Count of elements not equal to zero
    #[must_use]
    pub fn count_nonzeros(&self) -> usize {
        self.data.iter().filter(|v| **v != T::zero()).count()
    }
}

impl<T: Num + Copy + fmt::Display> fmt::Display for DenseMatrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.rows {
            for c in 0..self.cols {
                if c > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{}", self.get(r, c))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_valid() {
        let m = DenseMatrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(m.rows(), 2);
        assert_eq!(m.cols(), 3);
        assert_eq!(m.size(), 6);
        assert_eq!(m.get(0, 2), 3.0);
        assert_eq!(m.get(1, 0), 4.0);
    }

    #[test]
    fn test_from_vec_size_mismatch() {
        let result = DenseMatrix::from_vec(2, 3, vec![1.0, 2.0]);
        assert!(matches!(
            result,
            Err(EsparsoError::DataShapeMismatch {
                data_size: 2,
                expected: 6,
                ..
            })
        ));
    }

    #[test]
    fn test_from_vec_zero_dim() {
        let result = DenseMatrix::<f32>::from_vec(0, 3, vec![]);
        assert!(matches!(result, Err(EsparsoError::InvalidShape { .. })));
    }

    #[test]
    fn test_zeros() {
        let m = DenseMatrix::<f32>::zeros(3, 4).unwrap();
        assert_eq!(m.size(), 12);
        assert_eq!(m.count_nonzeros(), 0);
    }

    #[test]
    fn test_count_nonzeros() {
        let m = DenseMatrix::from_vec(2, 2, vec![0.0, 1.5, 0.0, -2.0]).unwrap();
        assert_eq!(m.count_nonzeros(), 2);
    }

    #[test]
    fn test_row_slice() {
        let m = DenseMatrix::from_vec(2, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(m.row(1), &[4, 5, 6]);
    }
}

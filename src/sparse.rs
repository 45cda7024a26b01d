//! Structured-sparse weight compaction codec
//!
//! Packs a dense row-major weight matrix into the layout consumed by the
//! accelerated sparse kernel:
//!
//! - **Value buffer**: per row, the nonzero values in column order, zero-filled
//!   to a multiple of [`LANE_WIDTH`] (empty rows stay empty, with no forced padding)
//! - **Row counts**: the *actual* nonzero count per row; the padded storage
//!   length is carried separately and never re-derived by consumers
//! - **Index deltas**: per nonzero, the signed byte stride from its input
//!   position to the next nonzero's input position, scaled by the element size
//!   and the activation row length; padding slots hold a zero (no-op) stride
//! - **First column**: the column of the first nonzero encountered, from which
//!   the consumer computes its initial input-pointer offset
//!
//! The stride from the last nonzero back to the first sits in the last real
//! nonzero's delta slot, so a consumer walking value and delta slots in
//! lockstep ends its pass back at the starting input position.
//!
//! Buffers are produced once, ahead of any compute call, and are read-only
//! thereafter. The slice-level entry points ([`analyze`], [`encode_into`])
//! write into caller-owned pre-sized buffers; [`SparseWeights::encode`] is the
//! owning convenience wrapper.

use std::mem;

use num_traits::Num;
use serde::{Deserialize, Serialize};

use crate::error::{EsparsoError, Result};
use crate::tensor::DenseMatrix;

/// Vector-lane width the per-row storage is padded to
pub const LANE_WIDTH: usize = 4;

/// Round a nonzero count up to a multiple of [`LANE_WIDTH`]
///
/// Zero stays zero: an empty row gets no forced padding.
///
/// # Examples
///
/// ```
/// use esparso::sparse::pad_to_lanes;
///
/// assert_eq!(pad_to_lanes(0), 0);
/// assert_eq!(pad_to_lanes(1), 4);
/// assert_eq!(pad_to_lanes(4), 4);
/// assert_eq!(pad_to_lanes(5), 8);
/// ```
#[must_use]
pub fn pad_to_lanes(count: usize) -> usize {
    if count % LANE_WIDTH == 0 {
        count
    } else {
        count + (LANE_WIDTH - count % LANE_WIDTH)
    }
}

/// Per-row storage budget: actual nonzeros and lane-padded slot count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowBudget {
    /// Actual nonzero count in the row
    pub nonzeros: u32,
    /// Padded slot count (`nonzeros` rounded up to a lane multiple)
    pub padded: u32,
}

/// Result of scanning a dense matrix for its sparsity structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparsityBudget {
    /// Per-row budgets, in row order
    pub rows: Vec<RowBudget>,
    /// Total padded storage length (sum of per-row padded counts)
    pub padded_len: usize,
    /// Total actual nonzero count
    pub nonzeros: usize,
}

impl SparsityBudget {
    /// True if the source matrix had no nonzero entries
    ///
    /// Callers must special-case all-zero matrices before invoking an
    /// accelerated kernel; there is nothing to compute.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nonzeros == 0
    }
}

/// Scan a dense matrix and compute its sparsity budget
///
/// Counts the nonzero elements of each row and the lane-padded storage each
/// row needs, and aggregates the totals.
///
/// # Arguments
///
/// * `data` - Flat row-major elements, `height * width` of them
/// * `height` - Number of rows
/// * `width` - Number of columns
///
/// # Errors
///
/// Returns `Err` if `data.len() != height * width`. This is a fatal
/// precondition; it is checked once here and nowhere downstream.
///
/// # Examples
///
/// ```
/// use esparso::sparse::analyze;
///
/// let budget = analyze(&[1.0f32, 0.0, 0.0, 2.0, 3.0, 0.0], 2, 3).unwrap();
/// assert_eq!(budget.nonzeros, 3);
/// // 1 nonzero in row 0 pads to 4, 2 in row 1 pad to 4
/// assert_eq!(budget.padded_len, 8);
/// ```
pub fn analyze<T: Num + Copy>(data: &[T], height: usize, width: usize) -> Result<SparsityBudget> {
    let expected = height * width;
    if data.len() != expected {
        return Err(EsparsoError::DataShapeMismatch {
            data_size: data.len(),
            shape: vec![height, width],
            expected,
        });
    }

    if width == 0 {
        return Ok(SparsityBudget {
            rows: vec![
                RowBudget {
                    nonzeros: 0,
                    padded: 0
                };
                height
            ],
            padded_len: 0,
            nonzeros: 0,
        });
    }

    let mut rows = Vec::with_capacity(height);
    let mut padded_len = 0usize;
    let mut nonzeros = 0usize;
    for row in data.chunks_exact(width) {
        let count = row.iter().filter(|v| **v != T::zero()).count();
        let padded = pad_to_lanes(count);
        #[allow(clippy::cast_possible_truncation)]
        rows.push(RowBudget {
            nonzeros: count as u32,
            padded: padded as u32,
        });
        padded_len += padded;
        nonzeros += count;
    }

    Ok(SparsityBudget {
        rows,
        padded_len,
        nonzeros,
    })
}

/// Encode a dense matrix into caller-owned compact buffers
///
/// Scans rows in order and columns in order within each row. Each nonzero
/// appends its value to `values`; the first nonzero overall records its
/// column as the returned offset and emits no delta, every later nonzero
/// emits `(col - prev_col) * size_of::<T>() * im_size` as the stride from the
/// previous nonzero's input position. After the scan one wraparound stride
/// from the last nonzero column back to the first is emitted. Rows whose
/// count is not a lane multiple are zero-padded in both buffers;
/// `row_counts` always holds the true (unpadded) counts.
///
/// # Arguments
///
/// * `data` - Flat row-major weights, `m * k` of them
/// * `m` - Weight rows (output channels)
/// * `k` - Weight columns (input channels)
/// * `im_size` - Row length of the activation tensor the strides address
/// * `budget` - Budget previously computed by [`analyze`] over the same data
/// * `values` - Output value buffer, length `budget.padded_len`
/// * `row_counts` - Output per-row actual counts, length `m`
/// * `diffs` - Output stride buffer, length `budget.padded_len`
///
/// # Returns
///
/// The column index of the first nonzero value encountered.
///
/// # Errors
///
/// Returns `Err` if the data length or any output buffer length doesn't
/// match, or if a stride overflows the 32-bit wire format.
#[allow(clippy::too_many_arguments)]
pub fn encode_into<T: Num + Copy>(
    data: &[T],
    m: usize,
    k: usize,
    im_size: usize,
    budget: &SparsityBudget,
    values: &mut [T],
    row_counts: &mut [u32],
    diffs: &mut [i32],
) -> Result<usize> {
    let expected = m * k;
    if data.len() != expected {
        return Err(EsparsoError::DataShapeMismatch {
            data_size: data.len(),
            shape: vec![m, k],
            expected,
        });
    }
    if budget.rows.len() != m || row_counts.len() != m {
        return Err(EsparsoError::InvalidShape {
            reason: format!(
                "Row buffers hold {} and {} rows, matrix has {}",
                budget.rows.len(),
                row_counts.len(),
                m
            ),
        });
    }
    if values.len() != budget.padded_len || diffs.len() != budget.padded_len {
        return Err(EsparsoError::InvalidShape {
            reason: format!(
                "Output buffers hold {} and {} slots, budget needs {}",
                values.len(),
                diffs.len(),
                budget.padded_len
            ),
        });
    }

    if k == 0 {
        row_counts.fill(0);
        return Ok(0);
    }

    let elem_bytes = mem::size_of::<T>() as i64;
    let scale = elem_bytes * im_size as i64;
    let stride = |from: usize, to: usize| -> Result<i32> {
        let raw = (to as i64 - from as i64) * scale;
        i32::try_from(raw).map_err(|_| EsparsoError::InvalidShape {
            reason: format!("Index stride {raw} overflows the 32-bit format"),
        })
    };

    // Unpadded strides, one per nonzero: slot j holds the stride from
    // nonzero j to nonzero j+1, the last slot wraps back to the first.
    let mut flat_strides = vec![0i32; budget.nonzeros];
    let mut first_col = 0usize;
    let mut last_col = 0usize;
    let mut first_nonzero = true;
    let mut value_idx = 0usize;
    let mut stride_idx = 0usize;

    for (r, row) in data.chunks_exact(k).enumerate() {
        let mut count = 0u32;
        for (c, &w) in row.iter().enumerate() {
            if w != T::zero() {
                values[value_idx] = w;
                value_idx += 1;
                if first_nonzero {
                    first_col = c;
                } else {
                    flat_strides[stride_idx] = stride(last_col, c)?;
                    stride_idx += 1;
                }
                first_nonzero = false;
                last_col = c;
                count += 1;
            }
        }
        row_counts[r] = count;
        let padded = budget.rows[r].padded as usize;
        for _ in count as usize..padded {
            values[value_idx] = T::zero();
            value_idx += 1;
        }
    }

    if !first_nonzero {
        flat_strides[stride_idx] = stride(last_col, first_col)?;
    }

    // Redistribute into the padded stride buffer, zero-filling each row's
    // padding slots.
    let mut left = 0usize;
    let mut right = 0usize;
    for row in &budget.rows {
        for _ in 0..row.nonzeros {
            diffs[right] = flat_strides[left];
            right += 1;
            left += 1;
        }
        for _ in row.nonzeros..row.padded {
            diffs[right] = 0;
            right += 1;
        }
    }

    Ok(first_col)
}

/// Compacted sparse weights: the full layout the accelerated kernel consumes
///
/// Produced once per weight matrix ahead of any inference call and immutable
/// afterwards. The actual and padded per-row counts are both stored
/// explicitly; consumers never reconstruct one from the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseWeights<T: Num> {
    /// Nonzero values, per row in column order, zero-padded per row
    pub values: Vec<T>,
    /// Actual (unpadded) nonzero count per row
    pub row_counts: Vec<u32>,
    /// Padded slot count per row
    pub row_padded: Vec<u32>,
    /// Signed byte strides, parallel to `values`
    pub diffs: Vec<i32>,
    /// Column of the first nonzero value encountered
    pub first_col: usize,
}

impl<T: Num + Copy> SparseWeights<T> {
    /// Analyze and encode a dense weight matrix
    ///
    /// `im_size` is the activation row length the index strides address
    /// (the `N` of the downstream multiply).
    ///
    /// An all-zero matrix encodes to empty buffers; check [`Self::is_empty`]
    /// before handing the result to a kernel.
    ///
    /// # Errors
    ///
    /// Returns `Err` if a stride overflows the 32-bit wire format.
    ///
    /// # Examples
    ///
    /// ```
    /// use esparso::{DenseMatrix, SparseWeights};
    ///
    /// let w = DenseMatrix::from_vec(2, 4, vec![
    ///     1.0, 0.0, 2.0, 0.0,
    ///     0.0, 3.0, 0.0, 0.0,
    /// ]).unwrap();
    /// let sw = SparseWeights::encode(&w, 1).unwrap();
    ///
    /// assert_eq!(sw.row_counts, vec![2, 1]);
    /// assert_eq!(sw.row_padded, vec![4, 4]);
    /// assert_eq!(sw.values, vec![1.0, 2.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0]);
    /// assert_eq!(sw.first_col, 0);
    /// ```
    pub fn encode(matrix: &DenseMatrix<T>, im_size: usize) -> Result<Self> {
        let budget = analyze(matrix.data(), matrix.rows(), matrix.cols())?;

        let mut values = vec![T::zero(); budget.padded_len];
        let mut row_counts = vec![0u32; matrix.rows()];
        let mut diffs = vec![0i32; budget.padded_len];
        let first_col = encode_into(
            matrix.data(),
            matrix.rows(),
            matrix.cols(),
            im_size,
            &budget,
            &mut values,
            &mut row_counts,
            &mut diffs,
        )?;

        Ok(Self {
            values,
            row_counts,
            row_padded: budget.rows.iter().map(|r| r.padded).collect(),
            diffs,
            first_col,
        })
    }

    /// Total padded storage length
    #[must_use]
    pub fn padded_len(&self) -> usize {
        self.values.len()
    }

    /// True if the source matrix had no nonzero entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reconstruct the dense matrix this encoding was produced from
    ///
    /// Walks the value and stride buffers exactly as the consuming kernel
    /// does and writes each nonzero back at its decoded column. Padding slots
    /// are excluded. `im_size` must match the value passed to
    /// [`Self::encode`].
    ///
    /// # Errors
    ///
    /// Returns `Err` if the stored buffers are inconsistent with the
    /// requested shape, or if a decoded column falls outside `0..cols`
    /// (corrupt stride data).
    pub fn decode(&self, rows: usize, cols: usize, im_size: usize) -> Result<DenseMatrix<T>> {
        if self.row_counts.len() != rows || self.row_padded.len() != rows {
            return Err(EsparsoError::InvalidShape {
                reason: format!(
                    "Encoding holds {} rows, requested {}",
                    self.row_counts.len(),
                    rows
                ),
            });
        }

        let scale = (mem::size_of::<T>() * im_size) as i64;
        if scale == 0 {
            return Err(EsparsoError::InvalidShape {
                reason: "im_size cannot be zero".to_string(),
            });
        }

        let mut out = DenseMatrix::zeros(rows, cols)?;
        let mut col = self.first_col as i64;
        let mut row_start = 0usize;
        for (r, (&count, &padded)) in self.row_counts.iter().zip(&self.row_padded).enumerate() {
            for j in 0..count as usize {
                let slot = row_start + j;
                let c = usize::try_from(col).ok().filter(|c| *c < cols).ok_or_else(|| {
                    EsparsoError::InvalidShape {
                        reason: format!("Decoded column {col} out of range for width {cols}"),
                    }
                })?;
                out.data_mut()[r * cols + c] = self.values[slot];
                col += i64::from(self.diffs[slot]) / scale;
            }
            row_start += padded as usize;
        }

        Ok(out)
    }
}

//! Dense reference compute engine
//!
//! A plain triple-loop GEMM used purely as the ground-truth oracle when
//! verifying accelerated sparse kernels. Correctness and bit-reproducibility
//! matter here; speed does not. Supports independent transpose flags for both
//! operands and leading dimensions distinct from the logical widths, so
//! padded or offset storage can be emulated.

use crate::error::{EsparsoError, Result};

/// Dense GEMM with bias and optional rectified-linear clamp
///
/// Computes `C = alpha * op(A) * op(B) + beta * C_in [+ bias] [then relu]`,
/// where `op` is transpose when the corresponding flag is set.
///
/// Operand layout (row-major storage with explicit leading dimensions):
/// - `A` is `m x k` with stride `lda` (or `k x m` when `trans_a`)
/// - `B` is `k x n` with stride `ldb` (or `n x k` when `trans_b`)
/// - `C` is `m x n` with stride `ldc`
///
/// The bias, when present, holds one value per output row and is added after
/// the `alpha`/`beta` combination; the relu clamp is applied last.
///
/// # Errors
///
/// Returns `Err` if a leading dimension is smaller than the logical width it
/// strides over, or an operand slice is shorter than its layout requires.
///
/// # Examples
///
/// ```
/// use esparso::reference::basic_gemm;
///
/// // [1 2] * [1 0]   [1 2]
/// // [3 4]   [0 1] = [3 4]
/// let a = [1.0, 2.0, 3.0, 4.0];
/// let b = [1.0, 0.0, 0.0, 1.0];
/// let mut c = [0.0; 4];
/// basic_gemm(
///     false, false, 2, 2, 2, 1.0, &a, 2, &b, 2, 0.0, &mut c, 2, None, false,
/// )
/// .unwrap();
/// assert_eq!(c, [1.0, 2.0, 3.0, 4.0]);
/// ```
#[allow(clippy::too_many_arguments)]
pub fn basic_gemm(
    trans_a: bool,
    trans_b: bool,
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: &[f32],
    lda: usize,
    b: &[f32],
    ldb: usize,
    beta: f32,
    c: &mut [f32],
    ldc: usize,
    bias: Option<&[f32]>,
    relu: bool,
) -> Result<()> {
    let a_rows = if trans_a { k } else { m };
    let a_width = if trans_a { m } else { k };
    let b_rows = if trans_b { n } else { k };
    let b_width = if trans_b { k } else { n };

    if lda < a_width || ldb < b_width || ldc < n {
        return Err(EsparsoError::InvalidShape {
            reason: format!(
                "Leading dimensions (lda {lda}, ldb {ldb}, ldc {ldc}) smaller than logical widths"
            ),
        });
    }
    if a.len() < a_rows * lda || b.len() < b_rows * ldb || c.len() < m * ldc {
        return Err(EsparsoError::InvalidShape {
            reason: format!(
                "Operand sizes (a {}, b {}, c {}) too small for m={m} n={n} k={k}",
                a.len(),
                b.len(),
                c.len()
            ),
        });
    }
    if let Some(bias) = bias {
        if bias.len() < m {
            return Err(EsparsoError::InvalidShape {
                reason: format!("Bias holds {} values, need {m}", bias.len()),
            });
        }
    }

    for i in 0..m {
        let bias_val = bias.map_or(0.0, |bv| bv[i]);
        for j in 0..n {
            let mut sum = 0.0f32;
            for l in 0..k {
                let av = if trans_a { a[l * lda + i] } else { a[i * lda + l] };
                let bv = if trans_b { b[j * ldb + l] } else { b[l * ldb + j] };
                sum += av * bv;
            }
            let tmp = alpha * sum + beta * c[i * ldc + j] + bias_val;
            c[i * ldc + j] = if relu && tmp < 0.0 { 0.0 } else { tmp };
        }
    }

    Ok(())
}

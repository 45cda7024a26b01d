//! Injected sparse-kernel capability
//!
//! The accelerated sparse kernel is consumed as a capability, not
//! reimplemented: the harness hands it the compacted layout through
//! [`KernelArgs`] and an opaque [`ExecContext`], and anything implementing
//! [`SparseKernel`] (including a plain closure, for mocks) can stand in for
//! the real backend.
//!
//! [`PipelinedKernel`] is the portable implementation used in reference-only
//! mode. It consumes exactly the encoded layout: walking value and delta
//! slots in lockstep and advancing a signed input cursor by each byte
//! stride, so it doubles as an executable check of the layout contract.

use std::fmt;
use std::mem;

use serde::{Deserialize, Serialize};

use crate::error::{EsparsoError, Result};
use crate::sparse::{pad_to_lanes, SparseWeights};

/// Scheduling/power-affinity mode for kernel execution
///
/// Opaque pass-through configuration: the harness carries it to the kernel
/// unchanged. Numeric codes follow the convention of the original backend
/// (0 high, 1 low, 2 full, 3 unbound).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PowerMode {
    /// Bind worker threads to high-performance cores
    High,
    /// Bind worker threads to low-power cores
    Low,
    /// Use all cores
    Full,
    /// No thread binding
    #[default]
    NoBind,
}

impl PowerMode {
    /// Decode a numeric mode code
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::High),
            1 => Some(Self::Low),
            2 => Some(Self::Full),
            3 => Some(Self::NoBind),
            _ => None,
        }
    }

    /// Numeric mode code
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Low => 1,
            Self::Full => 2,
            Self::NoBind => 3,
        }
    }

    /// Short lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Low => "low",
            Self::Full => "full",
            Self::NoBind => "no_bind",
        }
    }
}

impl fmt::Display for PowerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque execution context handed through to the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecContext {
    /// Scheduling/power-affinity mode
    pub power_mode: PowerMode,
    /// Worker-thread count
    pub threads: usize,
}

impl Default for ExecContext {
    fn default() -> Self {
        Self {
            power_mode: PowerMode::NoBind,
            threads: 1,
        }
    }
}

/// Argument record for a sparse kernel invocation
///
/// Field order and the padding convention mirror the kernel ABI exactly;
/// both are a strict contract with the accelerated backend. `input_offset`
/// is the pre-computed initial offset `first_col * im_size` into `input`;
/// the kernel's cursor starts there, and the index deltas are relative to it.
#[derive(Debug)]
pub struct KernelArgs<'a> {
    /// Compacted nonzero values (lane-padded per row)
    pub nonzero_weights: &'a [f32],
    /// Dense activation input, full `ic x im_size` extent
    pub input: &'a [f32],
    /// Initial element offset into `input` (`first_col * im_size`)
    pub input_offset: usize,
    /// Signed byte strides, parallel to `nonzero_weights`
    pub diffs: &'a [i32],
    /// Actual (unpadded) nonzero count per output channel
    pub oc_nonzeros: &'a [u32],
    /// Optional per-output-channel bias
    pub bias: Option<&'a [f32]>,
    /// Output buffer, `oc x im_size`
    pub output: &'a mut [f32],
    /// Output channel count (weight rows)
    pub oc: usize,
    /// Input channel count (weight columns)
    pub ic: usize,
    /// Spatial size (activation row length)
    pub im_size: usize,
    /// Apply a rectified-linear clamp to the output
    pub relu: bool,
}

impl<'a> KernelArgs<'a> {
    /// Assemble an argument record from an encoded weight set
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        weights: &'a SparseWeights<f32>,
        input: &'a [f32],
        bias: Option<&'a [f32]>,
        output: &'a mut [f32],
        oc: usize,
        ic: usize,
        im_size: usize,
        relu: bool,
    ) -> Self {
        Self {
            nonzero_weights: &weights.values,
            input,
            input_offset: weights.first_col * im_size,
            diffs: &weights.diffs,
            oc_nonzeros: &weights.row_counts,
            bias,
            output,
            oc,
            ic,
            im_size,
            relu,
        }
    }
}

/// A sparse compute kernel consuming the compacted weight layout
///
/// Implemented by the real accelerated backend, by [`PipelinedKernel`] for
/// portable reference-only runs, and by plain closures for unit-test mocks.
pub trait SparseKernel {
    /// Execute one sparse multiply into `args.output`
    ///
    /// # Errors
    ///
    /// Returns `Err` if the argument record is inconsistent or the backend
    /// fails.
    fn run(&self, args: KernelArgs<'_>, ctx: &ExecContext) -> Result<()>;
}

impl<F> SparseKernel for F
where
    F: Fn(KernelArgs<'_>, &ExecContext) -> Result<()>,
{
    fn run(&self, args: KernelArgs<'_>, ctx: &ExecContext) -> Result<()> {
        self(args, ctx)
    }
}

/// Portable delta-walking sparse kernel
///
/// Computes `C = W_sparse * B [+ bias] [then relu]` by advancing a signed
/// element cursor through the activation input according to the encoded byte
/// strides. Padding slots carry a zero value and a zero stride, so they fall
/// through the walk as no-ops; the wraparound stride in the last real slot
/// returns the cursor to its starting offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelinedKernel;

impl SparseKernel for PipelinedKernel {
    fn run(&self, args: KernelArgs<'_>, _ctx: &ExecContext) -> Result<()> {
        let KernelArgs {
            nonzero_weights,
            input,
            input_offset,
            diffs,
            oc_nonzeros,
            bias,
            output,
            oc,
            ic,
            im_size,
            relu,
        } = args;

        let padded_len: usize = oc_nonzeros
            .iter()
            .map(|&c| pad_to_lanes(c as usize))
            .sum();
        if oc_nonzeros.len() != oc
            || nonzero_weights.len() != padded_len
            || diffs.len() != padded_len
        {
            return Err(EsparsoError::InvalidShape {
                reason: format!(
                    "Kernel buffers ({} values, {} strides, {} rows) don't match {oc} channels with {padded_len} padded slots",
                    nonzero_weights.len(),
                    diffs.len(),
                    oc_nonzeros.len()
                ),
            });
        }
        if output.len() < oc * im_size || input.len() < ic * im_size {
            return Err(EsparsoError::InvalidShape {
                reason: format!(
                    "Kernel operands (input {}, output {}) too small for oc={oc} ic={ic} im_size={im_size}",
                    input.len(),
                    output.len()
                ),
            });
        }
        if let Some(bv) = bias {
            if bv.len() < oc {
                return Err(EsparsoError::InvalidShape {
                    reason: format!("Bias holds {} values, need {oc}", bv.len()),
                });
            }
        }

        let elem_bytes = mem::size_of::<f32>() as i64;
        let mut cursor = input_offset as i64;
        let mut slot = 0usize;
        for ocb in 0..oc {
            let count = oc_nonzeros[ocb] as usize;
            let row_start = ocb * im_size;
            let bias_val = bias.map_or(0.0, |bv| bv[ocb]);
            for x in &mut output[row_start..row_start + im_size] {
                *x = bias_val;
            }
            for _ in 0..pad_to_lanes(count) {
                let w = nonzero_weights[slot];
                if w != 0.0 {
                    let base =
                        usize::try_from(cursor).map_err(|_| EsparsoError::KernelError {
                            operation: "sparse_gemm_pipelined".to_string(),
                            reason: format!("Input cursor {cursor} moved below the buffer"),
                        })?;
                    if base + im_size > input.len() {
                        return Err(EsparsoError::KernelError {
                            operation: "sparse_gemm_pipelined".to_string(),
                            reason: format!(
                                "Input cursor {base} past the buffer end {}",
                                input.len()
                            ),
                        });
                    }
                    let in_row = &input[base..base + im_size];
                    for (o, &x) in output[row_start..row_start + im_size]
                        .iter_mut()
                        .zip(in_row)
                    {
                        *o += w * x;
                    }
                }
                cursor += i64::from(diffs[slot]) / elem_bytes;
                slot += 1;
            }
            if relu {
                for x in &mut output[row_start..row_start + im_size] {
                    if *x < 0.0 {
                        *x = 0.0;
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::basic_gemm;
    use crate::tensor::DenseMatrix;

    fn run_both(weights: Vec<f32>, m: usize, k: usize, n: usize, bias: Option<Vec<f32>>, relu: bool) -> (Vec<f32>, Vec<f32>) {
        let matrix = DenseMatrix::from_vec(m, k, weights).unwrap();
        let sparse = SparseWeights::encode(&matrix, n).unwrap();
        let input: Vec<f32> = (0..k * n).map(|i| (i as f32) * 0.1 - 0.7).collect();

        let mut reference = vec![0.0f32; m * n];
        basic_gemm(
            false,
            false,
            m,
            n,
            k,
            1.0,
            matrix.data(),
            k,
            &input,
            n,
            0.0,
            &mut reference,
            n,
            bias.as_deref(),
            relu,
        )
        .unwrap();

        let mut actual = vec![0.0f32; m * n];
        let args = KernelArgs::new(
            &sparse,
            &input,
            bias.as_deref(),
            &mut actual,
            m,
            k,
            n,
            relu,
        );
        PipelinedKernel.run(args, &ExecContext::default()).unwrap();

        (reference, actual)
    }

    fn assert_close(reference: &[f32], actual: &[f32]) {
        for (r, a) in reference.iter().zip(actual) {
            assert!((r - a).abs() < 1e-5, "expected {r}, got {a}");
        }
    }

    #[test]
    fn test_matches_reference_plain() {
        let weights = vec![
            1.0, 0.0, 2.0, 0.0, //
            0.0, 3.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, -1.5,
        ];
        let (reference, actual) = run_both(weights, 3, 4, 5, None, false);
        assert_close(&reference, &actual);
    }

    #[test]
    fn test_matches_reference_with_bias_and_relu() {
        let weights = vec![
            0.0, -2.0, 0.0, 1.0, //
            0.5, 0.0, 0.0, 0.0,
        ];
        let bias = vec![0.25, -0.25];
        let (reference, actual) = run_both(weights, 2, 4, 3, Some(bias), true);
        assert_close(&reference, &actual);
    }

    #[test]
    fn test_zero_row_in_the_middle() {
        let weights = vec![
            1.0, 1.0, //
            0.0, 0.0, //
            2.0, 0.0,
        ];
        let (reference, actual) = run_both(weights, 3, 2, 4, None, false);
        assert_close(&reference, &actual);
    }

    #[test]
    fn test_later_row_starting_before_first_col() {
        // First nonzero overall sits at column 2; row 1 starts at column 0,
        // which drives the cursor below the pre-offset base.
        let weights = vec![
            0.0, 0.0, 1.0, 0.0, //
            2.0, 0.0, 0.0, 0.0,
        ];
        let (reference, actual) = run_both(weights, 2, 4, 3, None, false);
        assert_close(&reference, &actual);
    }

    #[test]
    fn test_closure_kernel_injection() {
        let mock = |args: KernelArgs<'_>, _ctx: &ExecContext| -> Result<()> {
            args.output.fill(42.0);
            Ok(())
        };
        let matrix = DenseMatrix::from_vec(1, 4, vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        let sparse = SparseWeights::encode(&matrix, 2).unwrap();
        let input = vec![0.0f32; 8];
        let mut out = vec![0.0f32; 2];
        let args = KernelArgs::new(&sparse, &input, None, &mut out, 1, 4, 2, false);
        mock.run(args, &ExecContext::default()).unwrap();
        assert_eq!(out, vec![42.0, 42.0]);
    }

    #[test]
    fn test_rejects_mismatched_buffers() {
        let matrix = DenseMatrix::from_vec(1, 4, vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        let sparse = SparseWeights::encode(&matrix, 2).unwrap();
        let input = vec![0.0f32; 8];
        let mut out = vec![0.0f32; 1]; // too small for 1 x 2
        let args = KernelArgs::new(&sparse, &input, None, &mut out, 1, 4, 2, false);
        let result = PipelinedKernel.run(args, &ExecContext::default());
        assert!(matches!(result, Err(EsparsoError::InvalidShape { .. })));
    }

    #[test]
    fn test_power_mode_codes_roundtrip() {
        for code in 0..4u8 {
            let mode = PowerMode::from_code(code).unwrap();
            assert_eq!(mode.code(), code);
        }
        assert!(PowerMode::from_code(7).is_none());
        assert_eq!(PowerMode::default(), PowerMode::NoBind);
        assert_eq!(PowerMode::NoBind.as_str(), "no_bind");
    }
}

//! Output verification against the dense reference
//!
//! Compares an accelerated kernel's output elementwise with the reference
//! engine's output and reports the maximum absolute difference and the
//! maximum relative ratio (difference over reference magnitude, measured only
//! where the reference is nonzero).
//!
//! The pass rule is deliberately **conjunctive**: a result fails only when
//! *both* maxima exceed their thresholds. A large relative ratio on a
//! near-zero reference value is tolerated as long as the absolute difference
//! stays small, and vice versa. Most harnesses use the disjunctive rule;
//! this one must not be "fixed" to match them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EsparsoError, Result};

/// Relative-ratio threshold of the conjunctive pass rule
pub const MAX_RATIO_TOLERANCE: f64 = 1e-4;

/// Absolute-difference threshold of the conjunctive pass rule
pub const MAX_DIFF_TOLERANCE: f64 = 5e-5;

/// Elementwise comparison maxima and verdict
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Maximum elementwise absolute difference
    pub max_abs_diff: f64,
    /// Maximum elementwise ratio of difference to reference magnitude
    pub max_rel_ratio: f64,
}

impl Comparison {
    /// Apply the conjunctive tolerance rule
    ///
    /// Fails only when the relative ratio exceeds [`MAX_RATIO_TOLERANCE`]
    /// **and** the absolute difference exceeds [`MAX_DIFF_TOLERANCE`] at the
    /// same time.
    ///
    /// # Examples
    ///
    /// ```
    /// use esparso::verify::Comparison;
    ///
    /// // Ratio over threshold but diff tiny: still a pass.
    /// let c = Comparison { max_abs_diff: 1e-6, max_rel_ratio: 2e-4 };
    /// assert!(c.passed());
    ///
    /// let c = Comparison { max_abs_diff: 1e-3, max_rel_ratio: 1e-3 };
    /// assert!(!c.passed());
    /// ```
    #[must_use]
    pub fn passed(&self) -> bool {
        !(self.max_rel_ratio.abs() > MAX_RATIO_TOLERANCE
            && self.max_abs_diff.abs() > MAX_DIFF_TOLERANCE)
    }
}

/// Compare an actual output against the reference output
///
/// # Errors
///
/// Returns `Err` if the slices differ in length.
///
/// # Examples
///
/// ```
/// use esparso::verify::compare;
///
/// let reference = [1.0, 2.0, 0.0];
/// let actual = [1.0, 2.00001, 0.0];
/// let cmp = compare(&reference, &actual).unwrap();
/// assert!(cmp.passed());
/// ```
pub fn compare(reference: &[f32], actual: &[f32]) -> Result<Comparison> {
    if reference.len() != actual.len() {
        return Err(EsparsoError::InvalidShape {
            reason: format!(
                "Reference holds {} elements, actual {}",
                reference.len(),
                actual.len()
            ),
        });
    }

    let mut max_abs_diff = 0.0f64;
    let mut max_rel_ratio = 0.0f64;
    for (&r, &a) in reference.iter().zip(actual) {
        let diff = f64::from(a - r).abs();
        if diff > max_abs_diff {
            max_abs_diff = diff;
        }
        if r != 0.0 {
            let ratio = diff / f64::from(r).abs();
            if ratio > max_rel_ratio {
                max_rel_ratio = ratio;
            }
        }
    }

    Ok(Comparison {
        max_abs_diff,
        max_rel_ratio,
    })
}

/// Elementwise difference `actual - reference`
#[must_use]
pub fn elementwise_diff(reference: &[f32], actual: &[f32]) -> Vec<f32> {
    reference
        .iter()
        .zip(actual)
        .map(|(&r, &a)| a - r)
        .collect()
}

/// Full elementwise dump of a failed verification, for offline debugging
///
/// Renders the operands, the output buffer as it was before the kernel call,
/// both outputs, and their elementwise difference.
#[derive(Debug, Clone, Copy)]
pub struct FailureDump<'a> {
    /// Weight operand A
    pub a: &'a [f32],
    /// Activation operand B
    pub b: &'a [f32],
    /// Output buffer contents before the measured kernel call
    pub out_before: &'a [f32],
    /// Reference engine output
    pub reference: &'a [f32],
    /// Accelerated kernel output
    pub actual: &'a [f32],
}

/// Values per line in dump output
const DUMP_WIDTH: usize = 8;

fn write_slice(f: &mut fmt::Formatter<'_>, label: &str, data: &[f32]) -> fmt::Result {
    writeln!(f, "{label}:")?;
    for chunk in data.chunks(DUMP_WIDTH) {
        let line: Vec<String> = chunk.iter().map(|v| format!("{v:>12.6}")).collect();
        writeln!(f, "  {}", line.join(" "))?;
    }
    Ok(())
}

impl fmt::Display for FailureDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_slice(f, "a", self.a)?;
        write_slice(f, "b", self.b)?;
        write_slice(f, "c (before call)", self.out_before)?;
        write_slice(f, "reference result", self.reference)?;
        write_slice(f, "actual result", self.actual)?;
        let diff = elementwise_diff(self.reference, self.actual);
        write_slice(f, "diff result", &diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_outputs_pass() {
        let data = [1.0, -2.0, 0.0, 3.5];
        let cmp = compare(&data, &data).unwrap();
        assert_eq!(cmp.max_abs_diff, 0.0);
        assert_eq!(cmp.max_rel_ratio, 0.0);
        assert!(cmp.passed());
    }

    #[test]
    fn test_length_mismatch_is_error() {
        assert!(compare(&[1.0, 2.0], &[1.0]).is_err());
    }

    #[test]
    fn test_maxima_are_tracked() {
        let reference = [1.0, 10.0, -4.0];
        let actual = [1.5, 10.0, -4.2];
        let cmp = compare(&reference, &actual).unwrap();
        assert!((cmp.max_abs_diff - 0.5).abs() < 1e-9);
        assert!((cmp.max_rel_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_reference_skips_ratio() {
        // Reference all zero: only the absolute difference registers.
        let reference = [0.0, 0.0];
        let actual = [1e-6, -2e-6];
        let cmp = compare(&reference, &actual).unwrap();
        assert_eq!(cmp.max_rel_ratio, 0.0);
        assert!(cmp.max_abs_diff > 0.0);
        assert!(cmp.passed());
    }

    #[test]
    fn test_conjunctive_rule_ratio_alone_passes() {
        // Tiny reference magnifies the ratio, but the diff threshold holds,
        // which distinguishes this rule from a disjunctive one.
        let cmp = Comparison {
            max_abs_diff: 1e-6,
            max_rel_ratio: 2e-4,
        };
        assert!(cmp.passed());
    }

    #[test]
    fn test_conjunctive_rule_diff_alone_passes() {
        let cmp = Comparison {
            max_abs_diff: 1e-3,
            max_rel_ratio: 5e-5,
        };
        assert!(cmp.passed());
    }

    #[test]
    fn test_conjunctive_rule_both_exceeded_fails() {
        let cmp = Comparison {
            max_abs_diff: 1e-3,
            max_rel_ratio: 1e-3,
        };
        assert!(!cmp.passed());
    }

    #[test]
    fn test_failure_dump_renders_all_sections() {
        let a = [1.0, 2.0];
        let b = [3.0];
        let before = [0.5];
        let reference = [7.0];
        let actual = [9.0];
        let dump = FailureDump {
            a: &a,
            b: &b,
            out_before: &before,
            reference: &reference,
            actual: &actual,
        };
        let text = dump.to_string();
        assert!(text.contains("a:"));
        assert!(text.contains("b:"));
        assert!(text.contains("before call"));
        assert!(text.contains("reference result"));
        assert!(text.contains("actual result"));
        assert!(text.contains("diff result"));
        assert!(text.contains("2.000000"));
    }
}

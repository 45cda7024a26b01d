//! Sweep harness driving codec, kernel, and verifier
//!
//! Two modes:
//!
//! - [`run_sweep`]: enumerate the cross product of problem sizes and flags,
//!   running the full pipeline (generate -> sparsify -> encode -> kernel ->
//!   verify) for each combination and aborting on the first failure
//! - [`run_case`]: run exactly one externally supplied configuration and
//!   report pass/fail plus timing
//!
//! Timing brackets the kernel invocation only; encode and verify overhead is
//! excluded. Warmup iterations are discarded, and the output buffer is
//! restored from a pristine backup immediately before the final measured
//! repeat so the verified output is deterministic regardless of prior
//! in-place runs.

use std::fmt;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{EsparsoError, Result};
use crate::kernel::{ExecContext, KernelArgs, PowerMode, SparseKernel};
use crate::reference::basic_gemm;
use crate::sparse::SparseWeights;
use crate::tensor::DenseMatrix;
use crate::verify::{compare, Comparison, FailureDump};

/// Sweep grid: output-channel dimension
pub const SWEEP_M: &[usize] = &[1, 16, 64, 128];
/// Sweep grid: spatial dimension
pub const SWEEP_N: &[usize] = &[1, 32, 128, 256];
/// Sweep grid: input-channel dimension
pub const SWEEP_K: &[usize] = &[1, 109, 512];
/// Sweep grid: worker-thread counts
pub const SWEEP_THREADS: &[usize] = &[1, 2, 4];
/// Sweep grid: target sparsity ratios
pub const SWEEP_SPARSITY: &[f32] = &[0.5, 0.7, 0.8];

/// One sparse-multiply configuration
///
/// An explicit by-value record: every knob a run needs travels in here, so
/// there is no process-wide state to configure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpmmConfig {
    /// Output channels (weight rows)
    pub m: usize,
    /// Spatial size (activation row length)
    pub n: usize,
    /// Input channels (weight columns)
    pub k: usize,
    /// Transpose the weight operand
    pub trans_a: bool,
    /// Transpose the activation operand
    pub trans_b: bool,
    /// Extra leading-dimension padding for A
    pub offset_a: usize,
    /// Extra leading-dimension padding for B
    pub offset_b: usize,
    /// Extra leading-dimension padding for C
    pub offset_c: usize,
    /// GEMM alpha scalar
    pub alpha: f32,
    /// GEMM beta scalar
    pub beta: f32,
    /// Add a per-output-channel bias
    pub has_bias: bool,
    /// Apply a rectified-linear clamp
    pub has_relu: bool,
    /// Kernel scheduling/power mode (pass-through)
    pub power_mode: PowerMode,
    /// Kernel worker-thread count (pass-through)
    pub threads: usize,
    /// Target sparsity ratio in `[0, 1]`
    pub sparsity: f32,
    /// Warmup kernel calls, discarded
    pub warmup: usize,
    /// Measured kernel calls
    pub repeats: usize,
    /// RNG seed for operand generation
    pub seed: u64,
}

impl Default for SpmmConfig {
    fn default() -> Self {
        Self {
            m: 512,
            n: 512,
            k: 512,
            trans_a: false,
            trans_b: false,
            offset_a: 0,
            offset_b: 0,
            offset_c: 0,
            alpha: 1.0,
            beta: 0.0,
            has_bias: false,
            has_relu: false,
            power_mode: PowerMode::NoBind,
            threads: 1,
            sparsity: 0.8,
            warmup: 0,
            repeats: 1,
            seed: 42,
        }
    }
}

impl SpmmConfig {
    /// Create a configuration with the given problem sizes
    #[must_use]
    pub fn new(m: usize, n: usize, k: usize) -> Self {
        Self {
            m,
            n,
            k,
            ..Default::default()
        }
    }

    /// Set the bias flag
    #[must_use]
    pub fn with_bias(mut self, has_bias: bool) -> Self {
        self.has_bias = has_bias;
        self
    }

    /// Set the relu flag
    #[must_use]
    pub fn with_relu(mut self, has_relu: bool) -> Self {
        self.has_relu = has_relu;
        self
    }

    /// Set the kernel thread count
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the target sparsity ratio
    #[must_use]
    pub fn with_sparsity(mut self, sparsity: f32) -> Self {
        self.sparsity = sparsity;
        self
    }

    /// Set the power mode
    #[must_use]
    pub fn with_power_mode(mut self, power_mode: PowerMode) -> Self {
        self.power_mode = power_mode;
        self
    }

    /// Set warmup and measured repeat counts
    #[must_use]
    pub fn with_iterations(mut self, warmup: usize, repeats: usize) -> Self {
        self.warmup = warmup;
        self.repeats = repeats;
        self
    }

    /// Set the RNG seed
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Leading dimension of A
    #[must_use]
    pub fn lda(&self) -> usize {
        if self.trans_a {
            self.m + self.offset_a
        } else {
            self.k + self.offset_a
        }
    }

    /// Leading dimension of B
    #[must_use]
    pub fn ldb(&self) -> usize {
        if self.trans_b {
            self.k + self.offset_b
        } else {
            self.n + self.offset_b
        }
    }

    /// Leading dimension of C
    #[must_use]
    pub fn ldc(&self) -> usize {
        self.n + self.offset_c
    }

    /// Total multiply-accumulate operation count, `2 * m * n * k`
    #[must_use]
    pub fn ops(&self) -> f64 {
        2.0 * self.m as f64 * self.n as f64 * self.k as f64
    }

    fn validate(&self) -> Result<()> {
        if self.m == 0 || self.n == 0 || self.k == 0 {
            return Err(EsparsoError::InvalidConfiguration(format!(
                "Dimensions must be positive (m={}, n={}, k={})",
                self.m, self.n, self.k
            )));
        }
        if self.threads == 0 {
            return Err(EsparsoError::InvalidConfiguration(
                "Thread count must be at least 1".to_string(),
            ));
        }
        if self.repeats == 0 {
            return Err(EsparsoError::InvalidConfiguration(
                "Repeat count must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.sparsity) {
            return Err(EsparsoError::InvalidConfiguration(format!(
                "Sparsity ratio {} outside [0, 1]",
                self.sparsity
            )));
        }
        Ok(())
    }
}

impl fmt::Display for SpmmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "m={} n={} k={} bias={} relu={} threads={} sparsity={:.2} power={} seed={}",
            self.m,
            self.n,
            self.k,
            self.has_bias,
            self.has_relu,
            self.threads,
            self.sparsity,
            self.power_mode,
            self.seed
        )
    }
}

/// Lap timer bracketing individual kernel invocations
#[derive(Debug, Clone, Default)]
pub struct LapTimer {
    laps: Vec<Duration>,
    current: Option<Instant>,
}

impl LapTimer {
    /// Create an empty timer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a lap
    pub fn start(&mut self) {
        self.current = Some(Instant::now());
    }

    /// End the current lap and record it
    pub fn stop(&mut self) {
        if let Some(start) = self.current.take() {
            self.laps.push(start.elapsed());
        }
    }

    /// Number of recorded laps
    #[must_use]
    pub fn lap_count(&self) -> usize {
        self.laps.len()
    }

    /// Minimum lap time in milliseconds
    #[must_use]
    pub fn min_ms(&self) -> f64 {
        if self.laps.is_empty() {
            return 0.0;
        }
        self.laps
            .iter()
            .map(|d| d.as_secs_f64() * 1e3)
            .fold(f64::INFINITY, f64::min)
    }

    /// Average lap time in milliseconds
    #[must_use]
    pub fn avg_ms(&self) -> f64 {
        if self.laps.is_empty() {
            return 0.0;
        }
        let total: f64 = self.laps.iter().map(|d| d.as_secs_f64() * 1e3).sum();
        total / self.laps.len() as f64
    }
}

/// Result of one sparse-multiply configuration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    /// The configuration that was run
    pub config: SpmmConfig,
    /// Verification verdict (always true for trivial cases)
    pub pass: bool,
    /// True when sparsification left no nonzero weights (nothing to compute)
    pub trivial: bool,
    /// Comparison maxima; absent for trivial cases
    pub comparison: Option<Comparison>,
    /// Total operation count, `2 * m * n * k`
    pub ops: f64,
    /// Minimum measured kernel latency (ms)
    pub min_ms: f64,
    /// Average measured kernel latency (ms)
    pub avg_ms: f64,
    /// Throughput from the average latency (GOP/s)
    pub mean_gops: f64,
    /// Throughput from the minimum latency (GOP/s)
    pub max_gops: f64,
}

impl CaseReport {
    fn trivial(config: &SpmmConfig) -> Self {
        Self {
            config: config.clone(),
            pass: true,
            trivial: true,
            comparison: None,
            ops: config.ops(),
            min_ms: 0.0,
            avg_ms: 0.0,
            mean_gops: 0.0,
            max_gops: 0.0,
        }
    }

    fn measured(config: &SpmmConfig, comparison: Comparison, timer: &LapTimer) -> Self {
        let ops = config.ops();
        let min_ms = timer.min_ms();
        let avg_ms = timer.avg_ms();
        let gops = |ms: f64| if ms > 0.0 { ops * 1e-6 / ms } else { 0.0 };
        Self {
            config: config.clone(),
            pass: comparison.passed(),
            trivial: false,
            comparison: Some(comparison),
            ops,
            min_ms,
            avg_ms,
            mean_gops: gops(avg_ms),
            max_gops: gops(min_ms),
        }
    }
}

impl fmt::Display for CaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.trivial {
            return write!(f, "{} -> trivial pass (no nonzero weights)", self.config);
        }
        write!(
            f,
            "{} -> {}, avg {:.4} ms, min {:.4} ms, mean {:.2} GOPs, max {:.2} GOPs",
            self.config,
            if self.pass { "pass" } else { "FAIL" },
            self.avg_ms,
            self.min_ms,
            self.mean_gops,
            self.max_gops
        )
    }
}

fn fill_random(rng: &mut StdRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}

/// Run a single sparse-multiply configuration
///
/// Generates seeded random operands, zeroes weight entries whose normalized
/// value falls below the target sparsity ratio, encodes the surviving
/// weights, drives the injected kernel through the warmup and measured
/// phases, and verifies the final output against the dense reference.
///
/// A configuration whose sparsified weights hold no nonzeros is trivially
/// passing: there is nothing to compute, and the kernel is never invoked.
///
/// On verification failure the full elementwise dump is written to stderr
/// and the report carries `pass == false`; the failure is not an error in
/// this mode.
///
/// # Errors
///
/// Returns `Err` on precondition violations (invalid configuration, shape
/// mismatches) or when the injected kernel itself fails.
pub fn run_case<K: SparseKernel + ?Sized>(kernel: &K, config: &SpmmConfig) -> Result<CaseReport> {
    config.validate()?;

    let (m, n, k) = (config.m, config.n, config.k);
    let (lda, ldb, ldc) = (config.lda(), config.ldb(), config.ldc());
    let size_a = if config.trans_a { k * lda } else { m * lda };
    let size_b = if config.trans_b { n * ldb } else { k * ldb };

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut a = fill_random(&mut rng, size_a);
    let b = fill_random(&mut rng, size_b);
    let bias = fill_random(&mut rng, m);
    let mut c = fill_random(&mut rng, m * ldc);

    // Apply target sparsity: zero entries whose normalized value falls
    // below the ratio.
    for v in &mut a {
        if (*v + 1.0) / 2.0 < config.sparsity {
            *v = 0.0;
        }
    }

    let c_backup = c.clone();
    let mut c_basic = c.clone();
    let bias_opt = config.has_bias.then_some(&bias[..]);

    basic_gemm(
        config.trans_a,
        config.trans_b,
        m,
        n,
        k,
        config.alpha,
        &a,
        lda,
        &b,
        ldb,
        config.beta,
        &mut c_basic,
        ldc,
        bias_opt,
        config.has_relu,
    )?;

    let weights = DenseMatrix::from_vec(m, k, a.clone())?;
    let sparse = SparseWeights::encode(&weights, n)?;
    if sparse.is_empty() {
        return Ok(CaseReport::trivial(config));
    }

    let ctx = ExecContext {
        power_mode: config.power_mode,
        threads: config.threads,
    };

    for _ in 0..config.warmup {
        let args = KernelArgs::new(&sparse, &b, bias_opt, &mut c, m, k, n, config.has_relu);
        kernel.run(args, &ctx)?;
    }

    let mut timer = LapTimer::new();
    for i in 0..config.repeats {
        if i == config.repeats - 1 {
            c.copy_from_slice(&c_backup);
        }
        let args = KernelArgs::new(&sparse, &b, bias_opt, &mut c, m, k, n, config.has_relu);
        timer.start();
        kernel.run(args, &ctx)?;
        timer.stop();
    }

    let comparison = compare(&c_basic, &c)?;
    if !comparison.passed() {
        eprintln!(
            "verification failed for {}:\n{}",
            config,
            FailureDump {
                a: &a,
                b: &b,
                out_before: &c_backup,
                reference: &c_basic,
                actual: &c,
            }
        );
    }

    Ok(CaseReport::measured(config, comparison, &timer))
}

/// Options shared by every configuration of an exhaustive sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepOptions {
    /// Kernel scheduling/power mode
    pub power_mode: PowerMode,
    /// Warmup kernel calls per configuration
    pub warmup: usize,
    /// Measured kernel calls per configuration
    pub repeats: usize,
    /// Base RNG seed; each configuration offsets it by its index
    pub base_seed: u64,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            power_mode: PowerMode::NoBind,
            warmup: 0,
            repeats: 1,
            base_seed: 42,
        }
    }
}

/// Run the exhaustive sweep across the full configuration grid
///
/// Enumerates the cross product of [`SWEEP_M`] x [`SWEEP_N`] x [`SWEEP_K`]
/// x bias x relu x [`SWEEP_THREADS`] x [`SWEEP_SPARSITY`] and runs each
/// combination through [`run_case`].
///
/// The first failing configuration aborts the entire sweep with
/// [`EsparsoError::VerifyFailed`]; remaining combinations are not run. This
/// is a deliberate fail-fast regression-detection policy.
///
/// # Errors
///
/// Returns `Err` on the first verification failure, or on any precondition
/// or kernel error.
pub fn run_sweep<K: SparseKernel + ?Sized>(
    kernel: &K,
    opts: &SweepOptions,
) -> Result<Vec<CaseReport>> {
    let mut reports = Vec::new();
    let mut case_index = 0u64;
    for &m in SWEEP_M {
        for &n in SWEEP_N {
            for &k in SWEEP_K {
                for has_bias in [false, true] {
                    for has_relu in [false, true] {
                        for &threads in SWEEP_THREADS {
                            for &sparsity in SWEEP_SPARSITY {
                                let config = SpmmConfig {
                                    m,
                                    n,
                                    k,
                                    has_bias,
                                    has_relu,
                                    threads,
                                    sparsity,
                                    power_mode: opts.power_mode,
                                    warmup: opts.warmup,
                                    repeats: opts.repeats,
                                    seed: opts.base_seed.wrapping_add(case_index),
                                    ..Default::default()
                                };
                                case_index += 1;

                                let report = run_case(kernel, &config)?;
                                if !report.pass {
                                    let cmp = report.comparison.unwrap_or(Comparison {
                                        max_abs_diff: 0.0,
                                        max_rel_ratio: 0.0,
                                    });
                                    return Err(EsparsoError::VerifyFailed {
                                        config: config.to_string(),
                                        max_diff: cmp.max_abs_diff,
                                        max_ratio: cmp.max_rel_ratio,
                                    });
                                }
                                reports.push(report);
                            }
                        }
                    }
                }
            }
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::PipelinedKernel;

    #[test]
    fn test_config_builders() {
        let config = SpmmConfig::new(16, 32, 109)
            .with_bias(true)
            .with_relu(true)
            .with_threads(2)
            .with_sparsity(0.7)
            .with_iterations(1, 3)
            .with_seed(7);
        assert_eq!(config.m, 16);
        assert_eq!(config.ldb(), 32);
        assert_eq!(config.lda(), 109);
        assert!(config.has_bias && config.has_relu);
        assert_eq!(config.repeats, 3);
    }

    #[test]
    fn test_config_ops() {
        let config = SpmmConfig::new(2, 3, 4);
        assert!((config.ops() - 48.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_config_validation() {
        assert!(SpmmConfig::new(0, 1, 1).validate().is_err());
        assert!(SpmmConfig::new(1, 1, 1).with_sparsity(1.5).validate().is_err());
        assert!(SpmmConfig::new(1, 1, 1).with_threads(0).validate().is_err());
        assert!(SpmmConfig::new(1, 1, 1).validate().is_ok());
    }

    #[test]
    fn test_lap_timer_records_laps() {
        let mut timer = LapTimer::new();
        for _ in 0..3 {
            timer.start();
            timer.stop();
        }
        assert_eq!(timer.lap_count(), 3);
        assert!(timer.min_ms() <= timer.avg_ms());
    }

    #[test]
    fn test_lap_timer_stop_without_start_is_noop() {
        let mut timer = LapTimer::new();
        timer.stop();
        assert_eq!(timer.lap_count(), 0);
        assert_eq!(timer.avg_ms(), 0.0);
    }

    #[test]
    fn test_run_case_passes_with_pipelined_kernel() {
        let config = SpmmConfig::new(8, 16, 24)
            .with_sparsity(0.6)
            .with_bias(true)
            .with_iterations(1, 2);
        let report = run_case(&PipelinedKernel, &config).unwrap();
        assert!(report.pass);
        assert!(!report.trivial);
        assert_eq!(report.config.m, 8);
        assert!(report.comparison.is_some());
    }

    #[test]
    fn test_run_case_full_sparsity_is_trivial() {
        // Sparsity 1.0 zeroes every weight: nothing to compute.
        let config = SpmmConfig::new(4, 4, 4).with_sparsity(1.0);
        let report = run_case(&PipelinedKernel, &config).unwrap();
        assert!(report.pass);
        assert!(report.trivial);
        assert!(report.comparison.is_none());
    }

    #[test]
    fn test_run_case_is_seed_reproducible() {
        let config = SpmmConfig::new(4, 8, 12).with_sparsity(0.5).with_seed(99);
        let r1 = run_case(&PipelinedKernel, &config).unwrap();
        let r2 = run_case(&PipelinedKernel, &config).unwrap();
        assert_eq!(r1.comparison, r2.comparison);
    }

    #[test]
    fn test_report_display_mentions_verdict() {
        let config = SpmmConfig::new(4, 4, 4).with_sparsity(0.5);
        let report = run_case(&PipelinedKernel, &config).unwrap();
        let line = report.to_string();
        assert!(line.contains("pass") || line.contains("trivial"));
    }
}

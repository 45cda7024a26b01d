//! Esparso CLI - sparse codec verification harness
//!
//! # Commands
//!
//! - `sweep` - Run the exhaustive configuration sweep (fail-fast)
//! - `single` - Run one configuration from explicit parameters

use clap::{Parser, Subcommand};
use esparso::error::{EsparsoError, Result};
use esparso::kernel::{PipelinedKernel, PowerMode};
use esparso::sweep::{run_case, run_sweep, SpmmConfig, SweepOptions};

/// Esparso - structured-sparse codec and verification harness
#[derive(Parser)]
#[command(name = "esparso")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the exhaustive sweep across the built-in configuration grid
    ///
    /// Aborts at the first failing configuration.
    Sweep {
        /// Power mode code (0 high, 1 low, 2 full, 3 no binding)
        #[arg(long, default_value_t = 3)]
        power_mode: u8,
        /// Warmup iterations per configuration (discarded)
        #[arg(long, default_value_t = 0)]
        warmup: usize,
        /// Measured iterations per configuration
        #[arg(long, default_value_t = 1)]
        repeats: usize,
        /// Base RNG seed
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Emit reports as JSON instead of per-case lines
        #[arg(long)]
        json: bool,
    },
    /// Run a single configuration
    Single {
        /// Output channels (weight rows)
        #[arg(short = 'm', long, default_value_t = 512)]
        m: usize,
        /// Spatial size (activation row length)
        #[arg(short = 'n', long, default_value_t = 512)]
        n: usize,
        /// Input channels (weight columns)
        #[arg(short = 'k', long, default_value_t = 512)]
        k: usize,
        /// Transpose the weight operand
        #[arg(long)]
        trans_a: bool,
        /// Transpose the activation operand
        #[arg(long)]
        trans_b: bool,
        /// Extra leading-dimension padding for A
        #[arg(long, default_value_t = 0)]
        offset_a: usize,
        /// Extra leading-dimension padding for B
        #[arg(long, default_value_t = 0)]
        offset_b: usize,
        /// Extra leading-dimension padding for C
        #[arg(long, default_value_t = 0)]
        offset_c: usize,
        /// GEMM alpha scalar
        #[arg(long, default_value_t = 1.0)]
        alpha: f32,
        /// GEMM beta scalar
        #[arg(long, default_value_t = 0.0)]
        beta: f32,
        /// Add a per-output-channel bias
        #[arg(long)]
        bias: bool,
        /// Apply a rectified-linear clamp
        #[arg(long)]
        relu: bool,
        /// Power mode code (0 high, 1 low, 2 full, 3 no binding)
        #[arg(long, default_value_t = 3)]
        power_mode: u8,
        /// Kernel worker-thread count
        #[arg(long, default_value_t = 1)]
        threads: usize,
        /// Target sparsity ratio in [0, 1]
        #[arg(long, default_value_t = 0.8)]
        sparsity: f32,
        /// Warmup iterations (discarded)
        #[arg(long, default_value_t = 0)]
        warmup: usize,
        /// Measured iterations
        #[arg(long, default_value_t = 1)]
        repeats: usize,
        /// RNG seed
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_power_mode(code: u8) -> Result<PowerMode> {
    PowerMode::from_code(code).ok_or_else(|| {
        EsparsoError::InvalidConfiguration(format!("Unknown power mode code {code} (expected 0-3)"))
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| EsparsoError::InvalidConfiguration(format!("JSON encoding failed: {e}")))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Sweep {
            power_mode,
            warmup,
            repeats,
            seed,
            json,
        } => {
            let opts = SweepOptions {
                power_mode: parse_power_mode(power_mode)?,
                warmup,
                repeats,
                base_seed: seed,
            };
            let reports = run_sweep(&PipelinedKernel, &opts)?;
            if json {
                println!("{}", to_json(&reports)?);
            } else {
                for report in &reports {
                    println!("{report}");
                }
                println!("sweep passed: {} configurations", reports.len());
            }
        }
        Commands::Single {
            m,
            n,
            k,
            trans_a,
            trans_b,
            offset_a,
            offset_b,
            offset_c,
            alpha,
            beta,
            bias,
            relu,
            power_mode,
            threads,
            sparsity,
            warmup,
            repeats,
            seed,
            json,
        } => {
            let config = SpmmConfig {
                m,
                n,
                k,
                trans_a,
                trans_b,
                offset_a,
                offset_b,
                offset_c,
                alpha,
                beta,
                has_bias: bias,
                has_relu: relu,
                power_mode: parse_power_mode(power_mode)?,
                threads,
                sparsity,
                warmup,
                repeats,
                seed,
            };
            let report = run_case(&PipelinedKernel, &config)?;
            if json {
                println!("{}", to_json(&report)?);
            } else {
                println!("{report}");
            }
        }
    }

    Ok(())
}

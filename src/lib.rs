//! # Esparso
//!
//! Structured-sparse weight compaction codec with a dense-reference
//! verification harness.
//!
//! Esparso (Spanish: "sparse") packs a dense weight matrix into the compact
//! layout an accelerated sparse matmul/conv kernel consumes (lane-padded
//! nonzero values, per-row counts, and delta-encoded column positions) and
//! verifies any kernel implementing that contract against a dense reference
//! computation.
//!
//! ## Pipeline
//!
//! ```text
//! dense weights -> analyze -> budget -> encode -> compact buffers
//!                                                      |
//!             activation input ->  injected sparse kernel -> output
//!                                                              |
//!                  dense reference GEMM  ->  verifier  ->  pass/fail
//! ```
//!
//! ## Example
//!
//! ```
//! use esparso::{DenseMatrix, SparseWeights};
//!
//! let weights = DenseMatrix::from_vec(2, 4, vec![
//!     1.0, 0.0, 2.0, 0.0,
//!     0.0, 3.0, 0.0, 0.0,
//! ]).unwrap();
//!
//! // Encode for an activation tensor with rows of length 8.
//! let sparse = SparseWeights::encode(&weights, 8).unwrap();
//! assert_eq!(sparse.row_counts, vec![2, 1]);
//! assert_eq!(sparse.padded_len(), 8);
//!
//! // The encoding reconstructs the source exactly (padding excluded).
//! assert_eq!(sparse.decode(2, 4, 8).unwrap(), weights);
//! ```
//!
//! ## Verification policy
//!
//! The verifier's tolerance rule is **conjunctive**: a kernel output fails
//! only when the maximum relative ratio *and* the maximum absolute
//! difference both exceed their thresholds. See [`verify`] for details.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
// Clippy allows (MUST come after deny/warn to override them)
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)] // usize -> f64 for metrics is acceptable
#![allow(clippy::must_use_candidate)] // Not all methods need #[must_use]
#![allow(clippy::missing_panics_doc)] // Allow missing Panics doc sections
#![allow(clippy::uninlined_format_args)] // Prefer explicit format args
#![allow(clippy::float_cmp)] // Allow float comparisons in tests

pub mod error;
/// Injected sparse-kernel capability and the portable pipelined kernel
pub mod kernel;
/// Dense GEMM reference oracle
pub mod reference;
pub mod sparse;
/// Sweep harness: exhaustive and single-configuration modes
pub mod sweep;
pub mod tensor;
/// Output verification with the conjunctive tolerance rule
pub mod verify;

// Re-exports for convenience
pub use error::{EsparsoError, Result};
pub use sparse::{SparseWeights, SparsityBudget};
pub use tensor::DenseMatrix;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

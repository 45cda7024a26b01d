//! Error types for esparso
//!
//! All fallible operations return [`Result`], which wraps [`EsparsoError`].
//! Shape and precondition violations are checked once, up front, and are
//! fatal to the current operation. Verification outcomes are *not* errors in
//! single-configuration mode (they are reported as data); only the sweep
//! promotes the first failing configuration to [`EsparsoError::VerifyFailed`].

use thiserror::Error;

/// Convenience result type for esparso operations
pub type Result<T> = std::result::Result<T, EsparsoError>;

/// Errors that can occur in the sparse codec and verification harness
#[derive(Debug, Clone, Error)]
pub enum EsparsoError {
    /// Invalid matrix or buffer shape
    #[error("Invalid shape: {reason}")]
    InvalidShape {
        /// Explanation of what was invalid
        reason: String,
    },

    /// Data size doesn't match the declared shape
    #[error("Data size {data_size} doesn't match shape {shape:?} (expected {expected})")]
    DataShapeMismatch {
        /// Actual number of elements provided
        data_size: usize,
        /// Declared shape
        shape: Vec<usize>,
        /// Expected number of elements for that shape
        expected: usize,
    },

    /// Invalid harness configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Injected kernel reported a failure
    #[error("Kernel error in {operation}: {reason}")]
    KernelError {
        /// Operation the kernel was performing
        operation: String,
        /// Failure description from the kernel
        reason: String,
    },

    /// A sweep configuration failed verification (fail-fast abort)
    #[error("Verification failed for {config}: max diff {max_diff}, max ratio {max_ratio}")]
    VerifyFailed {
        /// Summary of the failing configuration
        config: String,
        /// Maximum elementwise absolute difference observed
        max_diff: f64,
        /// Maximum elementwise relative ratio observed
        max_ratio: f64,
    },
}

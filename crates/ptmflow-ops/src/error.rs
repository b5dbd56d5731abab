//! Error types for the operations crate.

use ptmflow_basis::BasisError;
use thiserror::Error;

/// Errors produced while constructing, composing or applying operations.
///
/// All of these indicate malformed input rather than transient failures;
/// none are retried internally.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OpError {
    /// Tensor or basis dimensions are inconsistent.
    #[error("Shape mismatch in {what}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// What was being checked.
        what: &'static str,
        /// Expected shape or size.
        expected: Vec<usize>,
        /// Actual shape or size.
        got: Vec<usize>,
    },

    /// A qubit or basis index is out of bounds.
    #[error("Index {index} out of range for {what} of size {len}")]
    IndexOutOfRange {
        /// What was being indexed.
        what: &'static str,
        /// The offending index.
        index: usize,
        /// Size of the indexed collection.
        len: usize,
    },

    /// Missing required alternative or inconsistent operand types/counts.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Structural invariant of a chain violated.
    #[error("Invalid chain: {0}")]
    InvalidChain(String),

    /// The construction produced a map that is not a real-valued PTM.
    #[error("Non-physical result: {0}")]
    NonPhysical(String),

    /// Error raised by the basis layer.
    #[error("Basis error: {0}")]
    Basis(#[from] BasisError),

    /// Tensor reshape failed.
    #[error("Tensor reshape error: {0}")]
    Tensor(#[from] ndarray::ShapeError),
}

/// Result type for operation construction and application.
pub type OpResult<T> = Result<T, OpError>;

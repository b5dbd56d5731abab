//! Error types for the basis crate.

use thiserror::Error;

/// Errors that can occur while constructing or querying a Pauli basis.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BasisError {
    /// Basis elements are not square matrices.
    #[error("Pauli basis vectors must be square matrices, got shape {rows}x{cols}")]
    NotSquare {
        /// Number of rows of each basis element.
        rows: usize,
        /// Number of columns of each basis element.
        cols: usize,
    },

    /// Number of labels differs from the number of basis elements.
    #[error("Basis has {expected} elements, but {got} labels were provided")]
    LabelCount {
        /// Number of basis elements.
        expected: usize,
        /// Number of labels provided.
        got: usize,
    },

    /// A requested basis element does not exist.
    #[error("Found index {index} in indices, but this basis has only {dim_pauli} elements")]
    IndexOutOfRange {
        /// The offending index.
        index: usize,
        /// Number of elements in the basis.
        dim_pauli: usize,
    },

    /// An operator does not match the Hilbert dimension of the basis.
    #[error("Expected a {expected}x{expected} operator, got {rows}x{cols}")]
    OperatorShape {
        /// Hilbert dimension of the basis.
        expected: usize,
        /// Rows of the operator provided.
        rows: usize,
        /// Columns of the operator provided.
        cols: usize,
    },

    /// A Pauli vector does not match the dimension of the basis.
    #[error("Expected a Pauli vector with {expected} components, got {got}")]
    VectorLength {
        /// Number of basis elements.
        expected: usize,
        /// Length of the vector provided.
        got: usize,
    },

    /// Two bases live in Hilbert spaces of different dimension.
    #[error("Hilbert dimensions of bases differ: {left} vs {right}")]
    DimensionMismatch {
        /// Hilbert dimension of the first basis.
        left: usize,
        /// Hilbert dimension of the second basis.
        right: usize,
    },

    /// Standard bases need at least a two-level system.
    #[error("Hilbert dimension must be at least 2, got {0}")]
    InvalidDimension(usize),
}

/// Result type for basis operations.
pub type BasisResult<T> = Result<T, BasisError>;

//! `ptmflow-ops`: quantum channels as Pauli transfer matrices.
//!
//! Operations act on qudits whose density matrices are expressed in
//! per-qubit [`PauliBasis`](ptmflow_basis::PauliBasis) coordinates:
//!
//! - **Algebra**: Kraus operators, Hamiltonians and Lindblad jump operators
//!   to PTMs, and PTM re-expression in other bases.
//! - **Operations**: leaf PTMs and flat chains of indexed operations, with
//!   in-place application to any [`PauliVector`] state.
//! - **Compiler**: fuses a chain into the fewest dense blocks, narrowing
//!   intermediate bases to what is actually carried.
//!
//! # Quick start
//!
//! ```rust
//! use ndarray::array;
//! use num_complex::Complex64;
//! use ptmflow_basis::bases;
//! use ptmflow_ops::{DensePauliVector, Operation};
//!
//! let qubit = bases::gell_mann(2).unwrap();
//! let (o, l) = (Complex64::new(0.0, 0.0), Complex64::new(1.0, 0.0));
//! let flip = Operation::from_kraus(&[array![[o, l], [l, o]]], &[qubit.clone()], None).unwrap();
//!
//! // Flip twice on each of two qubits, compiled once.
//! let circuit = Operation::from_sequence([
//!     flip.at(&[0]).unwrap(),
//!     flip.at(&[1]).unwrap(),
//!     flip.at(&[1]).unwrap(),
//! ])
//! .unwrap()
//! .compile(None, None)
//! .unwrap();
//!
//! let mut state = DensePauliVector::from_basis_indices(&[0, 0], vec![qubit.clone(), qubit]).unwrap();
//! circuit.apply(&mut state, &[0, 1]).unwrap();
//! let populations = state.diagonal().unwrap();
//! assert!((populations[2] - 1.0).abs() < 1e-12); // |10⟩
//! ```

pub mod algebra;
pub mod cache;
pub mod compiler;
pub mod error;
pub mod operation;
pub mod options;
pub mod state;
mod tensor;

pub use algebra::{
    generator_from_hamiltonian, generator_from_lindblad_ops, kraus_to_ptm, matrix_exp,
    ptm_convert_basis, ptm_from_generator,
};
pub use cache::{CacheStats, OperationCache, ParamKey};
pub use compiler::Compiler;
pub use error::{OpError, OpResult};
pub use operation::{Chain, IndexedOperation, Operation, PtmOperation, SequenceItem};
pub use options::CompileOptions;
pub use state::{DensePauliVector, PauliVector};

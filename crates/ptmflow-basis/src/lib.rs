//! `ptmflow-basis`: orthonormal operator bases for qudits.
//!
//! A [`PauliBasis`] describes the coordinate system in which density
//! matrices and Pauli transfer matrices are expressed. Besides the basis
//! elements it caches which element represents the normalised trace and
//! which elements isolate single computational states, so that consumers can
//! extract populations or trace out subsystems without touching the full
//! matrices.
//!
//! # Example
//!
//! ```rust
//! use ptmflow_basis::bases;
//!
//! let full = bases::general(3).unwrap();
//! let populations = full.computational_subbasis();
//! assert_eq!(populations.dim_pauli(), 3);
//! assert_eq!(populations.superbasis(), full);
//! assert!(full.is_orthonormal());
//! ```

pub mod bases;
pub mod basis;
pub mod error;

pub use basis::{PauliBasis, ORTHONORMALITY_TOLERANCE, trace_of_product};
pub use error::{BasisError, BasisResult};

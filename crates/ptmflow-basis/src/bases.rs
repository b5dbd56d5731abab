//! Standard Pauli bases.
//!
//! - [`general`]: computational projectors followed by real and imaginary
//!   coherences. Every computational state is isolated by one element, which
//!   makes it the natural basis for leakage-aware qudit simulation.
//! - [`gell_mann`]: normalised generalised Gell-Mann matrices. For `d = 2`
//!   this is the standard qubit Pauli basis `{I, X, Y, Z} / √2`.

use std::f64::consts::FRAC_1_SQRT_2;

use ndarray::Array3;
use num_complex::Complex64;

use crate::basis::PauliBasis;
use crate::error::{BasisError, BasisResult};

/// The "computational + coherences" basis of a `d`-level system.
///
/// Elements, in order:
/// - `|i⟩⟨i|` for every `i` (label `"i"`)
/// - for every pair `i < j`: `(|i⟩⟨j| + |j⟩⟨i|) / √2` (label `"X{i}{j}"`)
///   followed by `-i(|i⟩⟨j| - |j⟩⟨i|) / √2` (label `"Y{i}{j}"`)
pub fn general(dim_hilbert: usize) -> BasisResult<PauliBasis> {
    let d = dim_hilbert;
    if d < 2 {
        return Err(BasisError::InvalidDimension(d));
    }
    let mut vectors = Array3::<Complex64>::zeros((d * d, d, d));
    let mut labels = Vec::with_capacity(d * d);

    for i in 0..d {
        vectors[[i, i, i]] = Complex64::new(1.0, 0.0);
        labels.push(i.to_string());
    }

    let mut x = d;
    for i in 0..d {
        for j in (i + 1)..d {
            vectors[[x, i, j]] = Complex64::new(FRAC_1_SQRT_2, 0.0);
            vectors[[x, j, i]] = Complex64::new(FRAC_1_SQRT_2, 0.0);
            labels.push(format!("X{i}{j}"));
            x += 1;

            vectors[[x, i, j]] = Complex64::new(0.0, -FRAC_1_SQRT_2);
            vectors[[x, j, i]] = Complex64::new(0.0, FRAC_1_SQRT_2);
            labels.push(format!("Y{i}{j}"));
            x += 1;
        }
    }

    let basis = PauliBasis::new(vectors, labels)?;
    debug_assert!(basis.is_orthonormal());
    Ok(basis)
}

/// The normalised generalised Gell-Mann basis of a `d`-level system.
///
/// Elements, in order: `I / √d`, then symmetric and antisymmetric
/// off-diagonal pairs, then the `d - 1` traceless diagonal elements.
/// Qubit labels are `I, X, Y, Z`.
pub fn gell_mann(dim_hilbert: usize) -> BasisResult<PauliBasis> {
    let d = dim_hilbert;
    if d < 2 {
        return Err(BasisError::InvalidDimension(d));
    }
    let mut vectors = Array3::<Complex64>::zeros((d * d, d, d));
    let mut labels = Vec::with_capacity(d * d);

    let id = 1.0 / (d as f64).sqrt();
    for i in 0..d {
        vectors[[0, i, i]] = Complex64::new(id, 0.0);
    }
    labels.push("I".to_string());

    let mut x = 1;
    for j in 0..d {
        for k in (j + 1)..d {
            vectors[[x, j, k]] = Complex64::new(FRAC_1_SQRT_2, 0.0);
            vectors[[x, k, j]] = Complex64::new(FRAC_1_SQRT_2, 0.0);
            labels.push(if d == 2 { "X".to_string() } else { format!("X{j}{k}") });
            x += 1;

            vectors[[x, j, k]] = Complex64::new(0.0, -FRAC_1_SQRT_2);
            vectors[[x, k, j]] = Complex64::new(0.0, FRAC_1_SQRT_2);
            labels.push(if d == 2 { "Y".to_string() } else { format!("Y{j}{k}") });
            x += 1;
        }
    }

    for l in 1..d {
        let norm = 1.0 / ((l * (l + 1)) as f64).sqrt();
        for k in 0..l {
            vectors[[x, k, k]] = Complex64::new(norm, 0.0);
        }
        vectors[[x, l, l]] = Complex64::new(-(l as f64) * norm, 0.0);
        labels.push(if d == 2 { "Z".to_string() } else { format!("Z{l}") });
        x += 1;
    }

    let basis = PauliBasis::new(vectors, labels)?;
    debug_assert!(basis.is_orthonormal());
    Ok(basis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_dimension() {
        assert!(matches!(general(1), Err(BasisError::InvalidDimension(1))));
        assert!(matches!(gell_mann(0), Err(BasisError::InvalidDimension(0))));
    }

    #[test]
    fn test_general_metadata() {
        let b = general(3).unwrap();
        assert_eq!(b.dim_hilbert(), 3);
        assert_eq!(b.dim_pauli(), 9);
        assert_eq!(
            b.labels(),
            &["0", "1", "2", "X01", "Y01", "X02", "Y02", "X12", "Y12"]
        );
        for state in 0..3 {
            assert_eq!(b.computational_basis_index(state), Some(state));
        }
        assert_eq!(b.computational_basis_index(3), None);
        assert_eq!(b.trace_index(), None);
    }

    #[test]
    fn test_gell_mann_metadata() {
        let b = gell_mann(2).unwrap();
        assert_eq!(b.dim_pauli(), 4);
        assert_eq!(b.labels(), &["I", "X", "Y", "Z"]);
        assert_eq!(b.trace_index(), Some(0));
        assert_eq!(b.computational_basis_index(0), None);
        assert_eq!(b.computational_subbasis().dim_pauli(), 0);
    }

    #[test]
    fn test_computational_subbasis_of_general() {
        let b = general(3).unwrap();
        let sub = b.computational_subbasis();
        assert_eq!(sub.labels(), &["0", "1", "2"]);
        assert_eq!(sub.superbasis(), b);
    }

    #[test]
    fn test_orthonormal() {
        for d in 2..=4 {
            assert!(general(d).unwrap().is_orthonormal());
            assert!(gell_mann(d).unwrap().is_orthonormal());
        }
    }
}

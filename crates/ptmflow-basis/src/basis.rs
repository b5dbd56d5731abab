//! The [`PauliBasis`] type.
//!
//! A Pauli basis is an orthonormal basis, with respect to the
//! Hilbert-Schmidt inner product `⟨A, B⟩ = Tr(A · B†)`, of (a subspace of)
//! the operators acting on a `d`-level system. It is stored as a tensor of
//! shape `(dim_pauli, d, d)`, read as a list of `d × d` matrices `B_x` with
//!
//!   Tr(B_x · B_y†) = δ_xy
//!
//! A density matrix is represented by the vector of its overlaps
//! `v_x = Tr(B_x · ρ)`. Bases are immutable and cheap to clone: clones share
//! the same underlying storage.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2};
use num_complex::Complex64;

use crate::error::{BasisError, BasisResult};

/// Tolerance of the orthonormality check.
pub const ORTHONORMALITY_TOLERANCE: f64 = 1e-8;

/// Scale applied before rounding when searching for unit vectors (8 decimals).
const UNIT_VECTOR_SCALE: f64 = 1e8;

#[derive(Debug)]
struct BasisData {
    vectors: Array3<Complex64>,
    labels: Vec<String>,
    superbasis: Option<PauliBasis>,
    /// Diagonal of every element, shape `(dim_hilbert, dim_pauli)`.
    computational_basis_vectors: Array2<f64>,
    computational_basis_indices: Vec<Option<usize>>,
    trace_index: Option<usize>,
}

/// An immutable orthonormal operator basis for a single qudit.
#[derive(Debug, Clone)]
pub struct PauliBasis {
    inner: Arc<BasisData>,
}

impl PauliBasis {
    /// Create a basis from its elements and their labels.
    ///
    /// `vectors` must have shape `(dim_pauli, d, d)` and there must be one
    /// label per element. Orthonormality is not checked here, use
    /// [`PauliBasis::is_orthonormal`] for that.
    pub fn new(vectors: Array3<Complex64>, labels: Vec<String>) -> BasisResult<Self> {
        let (dim_pauli, rows, cols) = vectors.dim();
        if rows != cols {
            return Err(BasisError::NotSquare { rows, cols });
        }
        if labels.len() != dim_pauli {
            return Err(BasisError::LabelCount {
                expected: dim_pauli,
                got: labels.len(),
            });
        }
        Ok(Self::from_parts(vectors, labels, None))
    }

    fn from_parts(
        vectors: Array3<Complex64>,
        labels: Vec<String>,
        superbasis: Option<PauliBasis>,
    ) -> Self {
        let (dim_pauli, rows, _) = vectors.dim();

        // Elements are Hermitian, so their diagonals are real.
        let computational_basis_vectors =
            Array2::from_shape_fn((rows, dim_pauli), |(i, x)| vectors[[x, i, i]].re);

        let computational_basis_indices = computational_basis_vectors
            .rows()
            .into_iter()
            .map(to_unit_vector)
            .collect();

        let norm = (rows as f64).sqrt();
        let traces: Array1<f64> = (0..dim_pauli)
            .map(|x| (0..rows).map(|i| vectors[[x, i, i]].re).sum::<f64>() / norm)
            .collect();
        let trace_index = to_unit_vector(traces.view());

        Self {
            inner: Arc::new(BasisData {
                vectors,
                labels,
                superbasis,
                computational_basis_vectors,
                computational_basis_indices,
                trace_index,
            }),
        }
    }

    /// Dimension of the Hilbert space the basis elements act on.
    pub fn dim_hilbert(&self) -> usize {
        self.inner.vectors.dim().1
    }

    /// Number of basis elements.
    pub fn dim_pauli(&self) -> usize {
        self.inner.vectors.dim().0
    }

    /// Basis elements, shape `(dim_pauli, dim_hilbert, dim_hilbert)`.
    pub fn vectors(&self) -> &Array3<Complex64> {
        &self.inner.vectors
    }

    /// Human-readable labels of the basis elements.
    pub fn labels(&self) -> &[String] {
        &self.inner.labels
    }

    /// Diagonals of all basis elements, shape `(dim_hilbert, dim_pauli)`.
    ///
    /// Row `i` gives the contribution of every element to the population
    /// of computational state `|i⟩`.
    pub fn computational_basis_vectors(&self) -> &Array2<f64> {
        &self.inner.computational_basis_vectors
    }

    /// Index of the element that isolates computational state `state`, if
    /// there is one.
    pub fn computational_basis_index(&self, state: usize) -> Option<usize> {
        self.inner
            .computational_basis_indices
            .get(state)
            .copied()
            .flatten()
    }

    /// Index of the element proportional to the identity, if there is one.
    pub fn trace_index(&self) -> Option<usize> {
        self.inner.trace_index
    }

    /// The full basis this one was reduced from, or `self` if it has no
    /// parent.
    pub fn superbasis(&self) -> PauliBasis {
        self.inner
            .superbasis
            .clone()
            .unwrap_or_else(|| self.clone())
    }

    /// Whether this basis was derived from another one.
    pub fn has_superbasis(&self) -> bool {
        self.inner.superbasis.is_some()
    }

    /// Return a subbasis made of the elements at `indices`, in that order.
    ///
    /// The superbasis of the result is the superbasis of `self`.
    pub fn subbasis(&self, indices: &[usize]) -> BasisResult<Self> {
        let dim_pauli = self.dim_pauli();
        if let Some(&index) = indices.iter().find(|&&i| i >= dim_pauli) {
            return Err(BasisError::IndexOutOfRange { index, dim_pauli });
        }
        Ok(self.select(indices))
    }

    /// Return the subbasis of elements that isolate single computational
    /// states. Empty if there are none.
    pub fn computational_subbasis(&self) -> Self {
        let indices: Vec<usize> = self
            .inner
            .computational_basis_indices
            .iter()
            .filter_map(|idx| *idx)
            .collect();
        self.select(&indices)
    }

    fn select(&self, indices: &[usize]) -> Self {
        let d = self.dim_hilbert();
        let vectors = Array3::from_shape_fn((indices.len(), d, d), |(k, a, b)| {
            self.inner.vectors[[indices[k], a, b]]
        });
        let labels = indices
            .iter()
            .map(|&i| self.inner.labels[i].clone())
            .collect();
        Self::from_parts(vectors, labels, Some(self.superbasis()))
    }

    /// Overlaps `Tr(B_x · operator)` of an operator with every element.
    pub fn project_to_pauli_vector(
        &self,
        operator: ArrayView2<'_, Complex64>,
    ) -> BasisResult<Array1<Complex64>> {
        let d = self.dim_hilbert();
        let (rows, cols) = operator.dim();
        if rows != d || cols != d {
            return Err(BasisError::OperatorShape {
                expected: d,
                rows,
                cols,
            });
        }
        Ok(self
            .inner
            .vectors
            .outer_iter()
            .map(|b| trace_of_product(b, operator))
            .collect())
    }

    /// Reconstruct the operator `Σ_x v_x · B_x†` from its Pauli vector.
    pub fn pauli_vector_to_hilbert(
        &self,
        vector: ArrayView1<'_, f64>,
    ) -> BasisResult<Array2<Complex64>> {
        if vector.len() != self.dim_pauli() {
            return Err(BasisError::VectorLength {
                expected: self.dim_pauli(),
                got: vector.len(),
            });
        }
        let d = self.dim_hilbert();
        let mut out = Array2::zeros((d, d));
        for (b, &v) in self.inner.vectors.outer_iter().zip(vector.iter()) {
            out.scaled_add(Complex64::new(v, 0.0), &b.t().mapv(|z| z.conj()));
        }
        Ok(out)
    }

    /// Real overlap matrix `O[i, j] = Re Tr(A_i · B_j)` with another basis.
    ///
    /// For Hermitian bases this is the change-of-basis matrix between the two
    /// coordinate systems.
    pub fn overlap(&self, other: &PauliBasis) -> BasisResult<Array2<f64>> {
        if self.dim_hilbert() != other.dim_hilbert() {
            return Err(BasisError::DimensionMismatch {
                left: self.dim_hilbert(),
                right: other.dim_hilbert(),
            });
        }
        let mut out = Array2::zeros((self.dim_pauli(), other.dim_pauli()));
        for (i, a) in self.inner.vectors.outer_iter().enumerate() {
            for (j, b) in other.inner.vectors.outer_iter().enumerate() {
                out[[i, j]] = trace_of_product(a.view(), b.view()).re;
            }
        }
        Ok(out)
    }

    /// Check `Tr(B_x · B_y†) = δ_xy` within [`ORTHONORMALITY_TOLERANCE`].
    pub fn is_orthonormal(&self) -> bool {
        let vectors = &self.inner.vectors;
        for (x, bx) in vectors.outer_iter().enumerate() {
            for (y, by) in vectors.outer_iter().enumerate() {
                let ip: Complex64 = bx
                    .iter()
                    .zip(by.iter())
                    .map(|(a, b)| a * b.conj())
                    .sum();
                let expected = if x == y { 1.0 } else { 0.0 };
                if (ip - expected).norm() > ORTHONORMALITY_TOLERANCE {
                    return false;
                }
            }
        }
        true
    }
}

impl PartialEq for PauliBasis {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.labels == other.inner.labels
                && self.inner.vectors == other.inner.vectors)
    }
}

impl fmt::Display for PauliBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<PauliBasis d_hilbert={}, d_pauli={}, {}>",
            self.dim_hilbert(),
            self.dim_pauli(),
            self.inner.labels.join(" ")
        )
    }
}

/// `Tr(a · b)` for two square matrices of equal size.
pub fn trace_of_product(a: ArrayView2<'_, Complex64>, b: ArrayView2<'_, Complex64>) -> Complex64 {
    let mut acc = Complex64::new(0.0, 0.0);
    for ((i, j), &x) in a.indexed_iter() {
        acc += x * b[[j, i]];
    }
    acc
}

/// Index of the only non-zero entry of `v` if `v` sums to one.
fn to_unit_vector(v: ArrayView1<'_, f64>) -> Option<usize> {
    let sum: f64 = v.sum();
    if (sum - 1.0).abs() > 1e-8 + 1e-5 {
        return None;
    }
    let mut nonzero = v
        .iter()
        .enumerate()
        .filter(|(_, x)| (*x * UNIT_VECTOR_SCALE).round() != 0.0)
        .map(|(i, _)| i);
    match (nonzero.next(), nonzero.next()) {
        (Some(i), None) => Some(i),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bases;

    #[test]
    fn test_rejects_non_square_elements() {
        let vectors = Array3::<Complex64>::zeros((1, 2, 3));
        let err = PauliBasis::new(vectors, vec!["a".into()]).unwrap_err();
        assert!(matches!(err, BasisError::NotSquare { rows: 2, cols: 3 }));
    }

    #[test]
    fn test_rejects_wrong_label_count() {
        let vectors = Array3::<Complex64>::zeros((2, 2, 2));
        let err = PauliBasis::new(vectors, vec!["a".into()]).unwrap_err();
        assert!(matches!(
            err,
            BasisError::LabelCount {
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn test_unit_vector_detection() {
        let v = Array1::from(vec![0.0, 1.0, 0.0]);
        assert_eq!(to_unit_vector(v.view()), Some(1));
        let v = Array1::from(vec![0.5, 0.5]);
        assert_eq!(to_unit_vector(v.view()), None);
        let v = Array1::from(vec![0.0, 2.0]);
        assert_eq!(to_unit_vector(v.view()), None);
        let v = Array1::from(vec![1.0, 1e-10]);
        assert_eq!(to_unit_vector(v.view()), Some(0));
    }

    #[test]
    fn test_subbasis_index_out_of_range() {
        let b = bases::general(2).unwrap();
        let err = b.subbasis(&[0, 4]).unwrap_err();
        assert!(matches!(
            err,
            BasisError::IndexOutOfRange {
                index: 4,
                dim_pauli: 4
            }
        ));
    }

    #[test]
    fn test_subbasis_of_subbasis_keeps_root() {
        let full = bases::general(3).unwrap();
        let sub = full.subbasis(&[0, 1, 2, 3]).unwrap();
        let subsub = sub.subbasis(&[3, 0]).unwrap();
        assert_eq!(subsub.superbasis(), full);
        assert_eq!(subsub.labels(), &[full.labels()[3].clone(), "0".to_string()]);
        assert!(!full.has_superbasis());
        assert!(subsub.has_superbasis());
    }

    #[test]
    fn test_overlap_with_self_is_identity() {
        let b = bases::gell_mann(3).unwrap();
        let o = b.overlap(&b).unwrap();
        for i in 0..b.dim_pauli() {
            for j in 0..b.dim_pauli() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((o[[i, j]] - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_overlap_dimension_mismatch() {
        let a = bases::general(2).unwrap();
        let b = bases::general(3).unwrap();
        assert!(matches!(
            a.overlap(&b),
            Err(BasisError::DimensionMismatch { left: 2, right: 3 })
        ));
    }

    #[test]
    fn test_projection_round_trip() {
        let b = bases::gell_mann(2).unwrap();
        let rho = ndarray::array![
            [Complex64::new(0.75, 0.0), Complex64::new(0.1, -0.2)],
            [Complex64::new(0.1, 0.2), Complex64::new(0.25, 0.0)],
        ];
        let v = b.project_to_pauli_vector(rho.view()).unwrap();
        assert!(v.iter().all(|z| z.im.abs() < 1e-12));
        let re = v.mapv(|z| z.re);
        let back = b.pauli_vector_to_hilbert(re.view()).unwrap();
        for (x, y) in back.iter().zip(rho.iter()) {
            assert!((x - y).norm() < 1e-12);
        }
    }

    #[test]
    fn test_projection_rejects_wrong_shape() {
        let b = bases::general(3).unwrap();
        let op = Array2::<Complex64>::zeros((2, 2));
        assert!(matches!(
            b.project_to_pauli_vector(op.view()),
            Err(BasisError::OperatorShape {
                expected: 3,
                rows: 2,
                cols: 2
            })
        ));
    }

    #[test]
    fn test_equality_by_content() {
        let a = bases::general(2).unwrap();
        let b = bases::general(2).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, bases::gell_mann(2).unwrap());
        assert_ne!(a, a.computational_subbasis());
    }

    #[test]
    fn test_display() {
        let b = bases::gell_mann(2).unwrap();
        assert_eq!(b.to_string(), "<PauliBasis d_hilbert=2, d_pauli=4, I X Y Z>");
    }
}

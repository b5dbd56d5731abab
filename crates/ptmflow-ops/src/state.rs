//! State containers that operations act on.
//!
//! Operations only need a small surface from a state: the per-qubit bases,
//! a way to replace them, and a way to contract a PTM into the state. The
//! [`PauliVector`] trait captures that surface; [`DensePauliVector`] is the
//! dense reference implementation.

use ndarray::{Array1, Array2, ArrayD, ArrayView2, ArrayViewD, Axis, linalg::kron};
use num_complex::Complex64;
use ptmflow_basis::{PauliBasis, trace_of_product};

use crate::error::{OpError, OpResult};
use crate::tensor::{apply_on_axes, product_basis, reshape};

/// A density matrix expressed in per-qubit Pauli bases.
pub trait PauliVector {
    /// Value produced when a PTM is applied, e.g. a measurement record.
    type Outcome;

    /// Current basis of every qubit.
    fn bases(&self) -> &[PauliBasis];

    /// Replace the basis of one qubit after an operation changed it.
    fn set_basis(&mut self, qubit: usize, basis: PauliBasis);

    /// Contract `ptm` into the state on `qubits`.
    ///
    /// The PTM's input axes are already expressed in the state's current
    /// bases on those qubits.
    fn apply_ptm(
        &mut self,
        ptm: ArrayViewD<'_, f64>,
        qubits: &[usize],
    ) -> OpResult<Option<Self::Outcome>>;
}

/// Dense Pauli vector with one axis per qubit.
#[derive(Debug, Clone)]
pub struct DensePauliVector {
    data: ArrayD<f64>,
    bases: Vec<PauliBasis>,
}

impl DensePauliVector {
    /// Express a density matrix in `bases`: `v_x = Re Tr(B_x · ρ)`.
    pub fn from_dm(dm: ArrayView2<'_, Complex64>, bases: Vec<PauliBasis>) -> OpResult<Self> {
        if bases.is_empty() {
            return Err(OpError::InvalidArgument(
                "a state needs at least one qubit".into(),
            ));
        }
        let dim: usize = bases.iter().map(PauliBasis::dim_hilbert).product();
        if dm.dim() != (dim, dim) {
            return Err(OpError::ShapeMismatch {
                what: "density matrix",
                expected: vec![dim, dim],
                got: dm.shape().to_vec(),
            });
        }
        let vecs = product_basis(&bases);
        let flat: Array1<f64> = vecs
            .outer_iter()
            .map(|b| trace_of_product(b, dm).re)
            .collect();
        let dims: Vec<usize> = bases.iter().map(PauliBasis::dim_pauli).collect();
        let data = reshape(flat.into_dyn(), &dims)?;
        Ok(Self { data, bases })
    }

    /// Product of computational basis states `|i_0 i_1 ...⟩`.
    pub fn from_basis_indices(indices: &[usize], bases: Vec<PauliBasis>) -> OpResult<Self> {
        if indices.len() != bases.len() {
            return Err(OpError::ShapeMismatch {
                what: "basis state indices",
                expected: vec![bases.len()],
                got: vec![indices.len()],
            });
        }
        let mut dm = Array2::from_elem((1, 1), Complex64::new(1.0, 0.0));
        for (&i, basis) in indices.iter().zip(&bases) {
            let d = basis.dim_hilbert();
            if i >= d {
                return Err(OpError::IndexOutOfRange {
                    what: "computational basis",
                    index: i,
                    len: d,
                });
            }
            let mut proj = Array2::zeros((d, d));
            proj[[i, i]] = Complex64::new(1.0, 0.0);
            dm = kron(&dm, &proj);
        }
        Self::from_dm(dm.view(), bases)
    }

    /// Raw components, one axis per qubit.
    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    /// Number of qubits held.
    pub fn num_qubits(&self) -> usize {
        self.bases.len()
    }

    /// Populations of the computational basis states, qubit 0 most significant.
    pub fn diagonal(&self) -> OpResult<Array1<f64>> {
        let mut pops = self.data.clone();
        for (q, basis) in self.bases.iter().enumerate() {
            let to_comp = basis.computational_basis_vectors().view().into_dyn();
            pops = apply_on_axes(pops, &[q], to_comp)?;
        }
        let len = pops.len();
        Ok(reshape(pops, &[len])?.into_dimensionality()?)
    }

    /// Trace of the represented density matrix.
    pub fn trace(&self) -> OpResult<f64> {
        Ok(self.diagonal()?.sum())
    }

    /// Reconstruct the density matrix `Σ_x v_x · B_x†`.
    pub fn to_dm(&self) -> Array2<Complex64> {
        let vecs = product_basis(&self.bases);
        let (_, d, _) = vecs.dim();
        let mut dm = Array2::zeros((d, d));
        let flat = self.data.iter();
        for (b, &v) in vecs.outer_iter().zip(flat) {
            dm.scaled_add(Complex64::new(v, 0.0), &b.t().mapv(|z| z.conj()));
        }
        dm
    }

    fn check_qubits(&self, qubits: &[usize]) -> OpResult<()> {
        for (k, &q) in qubits.iter().enumerate() {
            if q >= self.num_qubits() {
                return Err(OpError::IndexOutOfRange {
                    what: "state qubits",
                    index: q,
                    len: self.num_qubits(),
                });
            }
            if qubits[..k].contains(&q) {
                return Err(OpError::InvalidArgument(format!(
                    "qubit {q} given more than once"
                )));
            }
        }
        Ok(())
    }
}

impl PauliVector for DensePauliVector {
    type Outcome = ();

    fn bases(&self) -> &[PauliBasis] {
        &self.bases
    }

    fn set_basis(&mut self, qubit: usize, basis: PauliBasis) {
        self.bases[qubit] = basis;
    }

    fn apply_ptm(&mut self, ptm: ArrayViewD<'_, f64>, qubits: &[usize]) -> OpResult<Option<()>> {
        self.check_qubits(qubits)?;
        let in_dims: Vec<usize> = qubits.iter().map(|&q| self.data.len_of(Axis(q))).collect();
        if ptm.ndim() != 2 * qubits.len() || ptm.shape()[qubits.len()..] != in_dims[..] {
            return Err(OpError::ShapeMismatch {
                what: "PTM input axes",
                expected: in_dims,
                got: ptm.shape().to_vec(),
            });
        }
        let data = std::mem::take(&mut self.data);
        self.data = apply_on_axes(data, qubits, ptm)?;
        Ok(None)
    }
}

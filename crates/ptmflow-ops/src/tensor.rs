//! Dense tensor helpers shared by the algebra, compiler and state code.
//!
//! PTM tensors have one output axis per qubit followed by one input axis per
//! qubit. Every contraction in the crate goes through [`apply_on_axes`].

use ndarray::{Array3, ArrayD, ArrayViewD, Axis, Ix2, IxDyn, linalg::kron};
use num_complex::Complex64;
use ptmflow_basis::PauliBasis;

use crate::error::{OpError, OpResult};

/// Reshape in row-major order, copying into standard layout only if needed.
pub(crate) fn reshape<A: Clone>(a: ArrayD<A>, shape: &[usize]) -> OpResult<ArrayD<A>> {
    let a = if a.is_standard_layout() {
        a
    } else {
        a.as_standard_layout().into_owned()
    };
    Ok(a.into_shape_with_order(IxDyn(shape))?)
}

pub(crate) fn inverse_permutation(perm: &[usize]) -> Vec<usize> {
    let mut inv = vec![0; perm.len()];
    for (i, &p) in perm.iter().enumerate() {
        inv[p] = i;
    }
    inv
}

/// Contract `op` into `target` along `axes`.
///
/// `op` has `axes.len()` output axes followed by the same number of input
/// axes. Input axis `p` is summed against `target` axis `axes[p]`, and the
/// result carries output axis `p` in that position. Remaining axes of
/// `target` pass through unchanged.
pub(crate) fn apply_on_axes(
    target: ArrayD<f64>,
    axes: &[usize],
    op: ArrayViewD<'_, f64>,
) -> OpResult<ArrayD<f64>> {
    let m = axes.len();
    if op.ndim() != 2 * m {
        return Err(OpError::ShapeMismatch {
            what: "operator rank",
            expected: vec![2 * m],
            got: vec![op.ndim()],
        });
    }
    let ndim = target.ndim();
    let perm: Vec<usize> = axes
        .iter()
        .copied()
        .chain((0..ndim).filter(|a| !axes.contains(a)))
        .collect();
    let moved = target.permuted_axes(perm.clone());
    let shape = moved.shape().to_vec();
    let (out_dims, in_dims) = op.shape().split_at(m);
    if in_dims != &shape[..m] {
        return Err(OpError::ShapeMismatch {
            what: "operator input axes",
            expected: shape[..m].to_vec(),
            got: in_dims.to_vec(),
        });
    }

    let in_size: usize = in_dims.iter().product();
    let out_size: usize = out_dims.iter().product();
    let rest: usize = shape[m..].iter().product();

    let rhs = reshape(moved, &[in_size, rest])?.into_dimensionality::<Ix2>()?;
    let lhs = op.to_shape((out_size, in_size))?;
    let product = lhs.dot(&rhs);

    let new_shape: Vec<usize> = out_dims.iter().chain(&shape[m..]).copied().collect();
    let result = reshape(product.into_dyn(), &new_shape)?;
    Ok(result.permuted_axes(inverse_permutation(&perm)))
}

/// Elements of the tensor-product basis, qubit 0 most significant.
///
/// Shape is `(Π dim_pauli, D, D)` with `D = Π dim_hilbert`.
pub(crate) fn product_basis(bases: &[PauliBasis]) -> Array3<Complex64> {
    let mut acc = Array3::from_elem((1, 1, 1), Complex64::new(1.0, 0.0));
    for basis in bases {
        let (n_acc, d_acc, _) = acc.dim();
        let n_b = basis.dim_pauli();
        let d = d_acc * basis.dim_hilbert();
        let mut next = Array3::zeros((n_acc * n_b, d, d));
        for (x, a) in acc.outer_iter().enumerate() {
            for (y, b) in basis.vectors().outer_iter().enumerate() {
                next.index_axis_mut(Axis(0), x * n_b + y)
                    .assign(&kron(&a, &b));
            }
        }
        acc = next;
    }
    acc
}

/// Identity map on the given per-qubit Pauli dimensions.
pub(crate) fn identity_ptm(dims: &[usize]) -> OpResult<ArrayD<f64>> {
    let size: usize = dims.iter().product();
    let shape: Vec<usize> = dims.iter().chain(dims).copied().collect();
    reshape(ndarray::Array2::<f64>::eye(size).into_dyn(), &shape)
}

/// Positions along `axis` whose slice has an entry above `tolerance`.
///
/// Never returns an empty list for a non-empty axis; the first position is
/// kept so that the tensor stays well-formed.
pub(crate) fn nonzero_indices(t: &ArrayD<f64>, axis: usize, tolerance: f64) -> Vec<usize> {
    let len = t.len_of(Axis(axis));
    let mut keep: Vec<usize> = (0..len)
        .filter(|&j| {
            t.index_axis(Axis(axis), j)
                .iter()
                .any(|x| x.abs() > tolerance)
        })
        .collect();
    if keep.is_empty() && len > 0 {
        keep.push(0);
    }
    keep
}

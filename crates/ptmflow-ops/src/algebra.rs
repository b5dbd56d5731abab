//! Conversions between channel representations.
//!
//! PTM axis convention: `ptm[o_0, ..., o_{n-1}, i_0, ..., i_{n-1}] =
//! Tr(B_out_o · Λ(B_in_i))`, where multi-qubit basis elements are Kronecker
//! products with qubit 0 most significant. All entries are real for
//! Hermitian bases.

use ndarray::{Array2, ArrayD, Axis};
use num_complex::Complex64;
use ptmflow_basis::{PauliBasis, trace_of_product};
use tracing::trace;

use crate::error::{OpError, OpResult};
use crate::tensor::{apply_on_axes, product_basis, reshape};

/// Largest imaginary part tolerated when a generator is exponentiated.
pub const IMAGINARY_TOLERANCE: f64 = 1e-8;

const TAYLOR_MAX_TERMS: usize = 40;
const SCALING_THRESHOLD: f64 = 0.5;

/// Hilbert dimension of the tensor product of `bases`.
fn product_hilbert_dim(bases: &[PauliBasis]) -> usize {
    bases.iter().map(PauliBasis::dim_hilbert).product()
}

fn pauli_dims(bases: &[PauliBasis]) -> Vec<usize> {
    bases.iter().map(PauliBasis::dim_pauli).collect()
}

fn check_square(what: &'static str, m: &Array2<Complex64>, dim: usize) -> OpResult<()> {
    if m.dim() != (dim, dim) {
        return Err(OpError::ShapeMismatch {
            what,
            expected: vec![dim, dim],
            got: m.shape().to_vec(),
        });
    }
    Ok(())
}

fn check_same_space(bases_in: &[PauliBasis], bases_out: &[PauliBasis]) -> OpResult<()> {
    if bases_in.is_empty() {
        return Err(OpError::InvalidArgument(
            "at least one qubit basis is required".into(),
        ));
    }
    if bases_in.len() != bases_out.len() {
        return Err(OpError::ShapeMismatch {
            what: "output bases",
            expected: vec![bases_in.len()],
            got: vec![bases_out.len()],
        });
    }
    for (b_in, b_out) in bases_in.iter().zip(bases_out) {
        if b_in.dim_hilbert() != b_out.dim_hilbert() {
            return Err(OpError::ShapeMismatch {
                what: "output basis Hilbert dimension",
                expected: vec![b_in.dim_hilbert()],
                got: vec![b_out.dim_hilbert()],
            });
        }
    }
    Ok(())
}

/// PTM of the channel `ρ ↦ Σ_k K_k ρ K_k†`.
pub fn kraus_to_ptm(
    kraus: &[Array2<Complex64>],
    bases_in: &[PauliBasis],
    bases_out: &[PauliBasis],
) -> OpResult<ArrayD<f64>> {
    check_same_space(bases_in, bases_out)?;
    let dim = product_hilbert_dim(bases_in);
    for k in kraus {
        check_square("Kraus operator", k, dim)?;
    }

    let vin = product_basis(bases_in);
    let vout = product_basis(bases_out);
    let n_in = vin.len_of(Axis(0));
    let n_out = vout.len_of(Axis(0));

    let mut ptm = Array2::<f64>::zeros((n_out, n_in));
    for k in kraus {
        let k_dag = k.t().mapv(|z| z.conj());
        for (i, b_in) in vin.outer_iter().enumerate() {
            let image = k.dot(&b_in).dot(&k_dag);
            for (o, b_out) in vout.outer_iter().enumerate() {
                ptm[[o, i]] += trace_of_product(b_out, image.view()).re;
            }
        }
    }

    let shape: Vec<usize> = pauli_dims(bases_out)
        .into_iter()
        .chain(pauli_dims(bases_in))
        .collect();
    reshape(ptm.into_dyn(), &shape)
}

/// Re-express a PTM given in `(bases_in, bases_out)` in new bases.
///
/// Each output axis is contracted with `overlap(new_out, old_out)` and each
/// input axis with `overlap(old_in, new_in)`. Axes whose basis is unchanged
/// are left alone. Converting to a basis that does not span the old one
/// silently drops information.
pub fn ptm_convert_basis(
    ptm: &ArrayD<f64>,
    bases_in: &[PauliBasis],
    bases_out: &[PauliBasis],
    new_bases_in: &[PauliBasis],
    new_bases_out: &[PauliBasis],
) -> OpResult<ArrayD<f64>> {
    check_same_space(bases_in, bases_out)?;
    check_same_space(bases_in, new_bases_in)?;
    check_same_space(bases_out, new_bases_out)?;
    let n = bases_in.len();
    let expected: Vec<usize> = pauli_dims(bases_out)
        .into_iter()
        .chain(pauli_dims(bases_in))
        .collect();
    if ptm.shape() != expected.as_slice() {
        return Err(OpError::ShapeMismatch {
            what: "PTM",
            expected,
            got: ptm.shape().to_vec(),
        });
    }

    let mut out = ptm.clone();
    for (p, (old, new)) in bases_out.iter().zip(new_bases_out).enumerate() {
        if old != new {
            let u = new.overlap(old)?;
            out = apply_on_axes(out, &[p], u.into_dyn().view())?;
        }
    }
    for (p, (old, new)) in bases_in.iter().zip(new_bases_in).enumerate() {
        if old != new {
            let u = old.overlap(new)?.reversed_axes();
            out = apply_on_axes(out, &[n + p], u.into_dyn().view())?;
        }
    }
    Ok(out)
}

fn commutator(a: &Array2<Complex64>, b: &Array2<Complex64>) -> Array2<Complex64> {
    a.dot(b) - b.dot(a)
}

fn anticommutator(a: &Array2<Complex64>, b: &Array2<Complex64>) -> Array2<Complex64> {
    a.dot(b) + b.dot(a)
}

/// Assemble `G[o, i] = Tr(B_o · L(B_i))` for a superoperator `L`.
fn generator_tensor<F>(bases: &[PauliBasis], superop: F) -> OpResult<ArrayD<Complex64>>
where
    F: Fn(&Array2<Complex64>) -> Array2<Complex64>,
{
    let vecs = product_basis(bases);
    let n = vecs.len_of(Axis(0));
    let mut g = Array2::<Complex64>::zeros((n, n));
    for (i, b_in) in vecs.outer_iter().enumerate() {
        let image = superop(&b_in.to_owned());
        for (o, b_out) in vecs.outer_iter().enumerate() {
            g[[o, i]] = trace_of_product(b_out, image.view());
        }
    }
    let dims = pauli_dims(bases);
    let shape: Vec<usize> = dims.iter().chain(&dims).copied().collect();
    reshape(g.into_dyn(), &shape)
}

/// Generator of the unitary evolution `ρ ↦ -i [H, ρ]` in PTM form.
pub fn generator_from_hamiltonian(
    hamiltonian: &Array2<Complex64>,
    bases: &[PauliBasis],
) -> OpResult<ArrayD<Complex64>> {
    check_same_space(bases, bases)?;
    check_square("Hamiltonian", hamiltonian, product_hilbert_dim(bases))?;
    let minus_i = Complex64::new(0.0, -1.0);
    generator_tensor(bases, |b| commutator(hamiltonian, b).mapv(|z| z * minus_i))
}

/// Generator of the dissipator `Σ_k L ρ L† - ½{L†L, ρ}` in PTM form.
pub fn generator_from_lindblad_ops(
    lindblad_ops: &[Array2<Complex64>],
    bases: &[PauliBasis],
) -> OpResult<ArrayD<Complex64>> {
    check_same_space(bases, bases)?;
    let dim = product_hilbert_dim(bases);
    let mut terms = Vec::with_capacity(lindblad_ops.len());
    for l in lindblad_ops {
        check_square("Lindblad operator", l, dim)?;
        let l_dag = l.t().mapv(|z| z.conj());
        let l_dag_l = l_dag.dot(l);
        terms.push((l, l_dag, l_dag_l));
    }
    generator_tensor(bases, |b| {
        let mut acc = Array2::<Complex64>::zeros((dim, dim));
        for (l, l_dag, l_dag_l) in &terms {
            acc = acc + l.dot(b).dot(l_dag) - anticommutator(l_dag_l, b).mapv(|z| z * 0.5);
        }
        acc
    })
}

/// Matrix exponential by scaling and squaring with a truncated Taylor series.
pub fn matrix_exp(a: &Array2<Complex64>) -> OpResult<Array2<Complex64>> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(OpError::ShapeMismatch {
            what: "matrix exponential argument",
            expected: vec![n, n],
            got: a.shape().to_vec(),
        });
    }
    if a.iter().any(|z| !z.is_finite()) {
        return Err(OpError::NonPhysical(
            "generator contains non-finite entries".into(),
        ));
    }
    let norm = a
        .rows()
        .into_iter()
        .map(|row| row.iter().map(|z| z.norm()).sum::<f64>())
        .fold(0.0, f64::max);

    let squarings = if norm > SCALING_THRESHOLD {
        (norm / SCALING_THRESHOLD).log2().ceil() as i32
    } else {
        0
    };
    let scale = 2f64.powi(-squarings);
    let scaled = a.mapv(|z| z * scale);

    let mut result = Array2::<Complex64>::eye(n);
    let mut term = Array2::<Complex64>::eye(n);
    for k in 1..=TAYLOR_MAX_TERMS {
        term = term.dot(&scaled).mapv(|z| z / k as f64);
        result += &term;
        if term.iter().all(|z| z.norm() <= f64::EPSILON) {
            break;
        }
    }
    for _ in 0..squarings {
        result = result.dot(&result);
    }
    Ok(result)
}

/// Exponentiate a PTM generator: `exp(G · t)`, reshaped to the PTM layout.
///
/// Fails with [`OpError::NonPhysical`] if the result carries an imaginary
/// part above [`IMAGINARY_TOLERANCE`].
pub fn ptm_from_generator(generator: &ArrayD<Complex64>, time: f64) -> OpResult<ArrayD<f64>> {
    let shape = generator.shape().to_vec();
    let n = shape.len() / 2;
    if shape.len() % 2 != 0 || shape[..n] != shape[n..] {
        return Err(OpError::ShapeMismatch {
            what: "generator",
            expected: shape[..n].iter().chain(&shape[..n]).copied().collect(),
            got: shape.clone(),
        });
    }
    let dim: usize = shape[..n].iter().product();
    let g = reshape(generator.mapv(|z| z * time), &[dim, dim])?.into_dimensionality()?;
    let e = matrix_exp(&g)?;

    if e.iter().any(|z| !z.is_finite()) {
        return Err(OpError::NonPhysical(
            "PTM contains non-finite entries".into(),
        ));
    }
    let max_imag = e.iter().map(|z| z.im.abs()).fold(0.0, f64::max);
    if max_imag > IMAGINARY_TOLERANCE {
        return Err(OpError::NonPhysical(format!(
            "PTM has imaginary part of magnitude {max_imag:.3e}"
        )));
    }
    trace!(dim, time, "exponentiated generator");
    reshape(e.mapv(|z| z.re).into_dyn(), &shape)
}

/// Element-wise comparison of two real tensors.
#[cfg(test)]
pub(crate) fn assert_close(a: &ArrayD<f64>, b: &ArrayD<f64>, tol: f64) {
    assert_eq!(a.shape(), b.shape(), "shape mismatch");
    for (x, y) in a.iter().zip(b.iter()) {
        assert!((x - y).abs() < tol, "{x} != {y}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::identity_ptm;
    use ndarray::{IxDyn, array};
    use ptmflow_basis::bases;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    fn pauli_x() -> Array2<Complex64> {
        array![[c(0.0, 0.0), c(1.0, 0.0)], [c(1.0, 0.0), c(0.0, 0.0)]]
    }

    fn pauli_z() -> Array2<Complex64> {
        array![[c(1.0, 0.0), c(0.0, 0.0)], [c(0.0, 0.0), c(-1.0, 0.0)]]
    }

    #[test]
    fn test_identity_kraus() {
        let b = bases::gell_mann(2).unwrap();
        let ptm = kraus_to_ptm(&[Array2::eye(2)], &[b.clone()], &[b]).unwrap();
        assert_close(&ptm, &identity_ptm(&[4]).unwrap(), 1e-12);
    }

    #[test]
    fn test_bit_flip_ptm_in_gell_mann() {
        let b = bases::gell_mann(2).unwrap();
        let ptm = kraus_to_ptm(&[pauli_x()], &[b.clone()], &[b]).unwrap();
        let expected = ArrayD::from_shape_vec(
            IxDyn(&[4, 4]),
            vec![
                1.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0, //
                0.0, 0.0, -1.0, 0.0, //
                0.0, 0.0, 0.0, -1.0,
            ],
        )
        .unwrap();
        assert_close(&ptm, &expected, 1e-12);
    }

    #[test]
    fn test_kraus_shape_mismatch() {
        let b = bases::general(3).unwrap();
        let k = Array2::<Complex64>::eye(4);
        assert!(matches!(
            kraus_to_ptm(&[k], &[b.clone()], &[b]),
            Err(OpError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_convert_basis_roundtrip() {
        let gm = bases::gell_mann(2).unwrap();
        let gen2 = bases::general(2).unwrap();
        let ptm = kraus_to_ptm(&[pauli_x()], &[gm.clone()], &[gm.clone()]).unwrap();

        let direct = kraus_to_ptm(&[pauli_x()], &[gen2.clone()], &[gm.clone()]).unwrap();
        let converted = ptm_convert_basis(
            &ptm,
            &[gm.clone()],
            &[gm.clone()],
            &[gen2.clone()],
            &[gm.clone()],
        )
        .unwrap();
        assert_close(&converted, &direct, 1e-12);

        let back =
            ptm_convert_basis(&converted, &[gen2], &[gm.clone()], &[gm.clone()], &[gm]).unwrap();
        assert_close(&back, &ptm, 1e-12);
    }

    #[test]
    fn test_convert_rejects_wrong_shape() {
        let gm = bases::gell_mann(2).unwrap();
        let ptm = ArrayD::<f64>::zeros(IxDyn(&[3, 4]));
        let result = ptm_convert_basis(&ptm, &[gm.clone()], &[gm.clone()], &[gm.clone()], &[gm]);
        assert!(matches!(result, Err(OpError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_matrix_exp_rotation() {
        // exp(-i θ/2 X) = cos(θ/2) I - i sin(θ/2) X
        let theta: f64 = 2.3;
        let a = pauli_x().mapv(|z| z * c(0.0, -theta / 2.0));
        let e = matrix_exp(&a).unwrap();
        let (s, co) = (theta / 2.0).sin_cos();
        assert!((e[[0, 0]] - c(co, 0.0)).norm() < 1e-12);
        assert!((e[[0, 1]] - c(0.0, -s)).norm() < 1e-12);
        assert!((e[[1, 1]] - c(co, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_matrix_exp_large_norm() {
        let a = array![[c(-30.0, 0.0), c(0.0, 0.0)], [c(0.0, 0.0), c(5.0, 0.0)]];
        let e = matrix_exp(&a).unwrap();
        assert!((e[[0, 0]].re - (-30f64).exp()).abs() < 1e-18);
        assert!((e[[1, 1]].re - 5f64.exp()).abs() / 5f64.exp() < 1e-12);
        assert!(e[[0, 1]].norm() < 1e-12);
    }

    #[test]
    fn test_matrix_exp_rejects_nan() {
        let a = array![[c(f64::NAN, 0.0)]];
        assert!(matches!(matrix_exp(&a), Err(OpError::NonPhysical(_))));
    }

    #[test]
    fn test_matrix_exp_rejects_nan_off_the_max_row() {
        let a = array![[c(2.0, 0.0), c(0.0, 0.0)], [c(0.0, f64::NAN), c(0.0, 0.0)]];
        assert!(matches!(matrix_exp(&a), Err(OpError::NonPhysical(_))));
        let inf = array![[c(f64::INFINITY, 0.0)]];
        assert!(matches!(matrix_exp(&inf), Err(OpError::NonPhysical(_))));
    }

    #[test]
    fn test_generator_with_nan_time_is_non_physical() {
        let b = bases::gell_mann(2).unwrap();
        let g = generator_from_hamiltonian(&pauli_z(), &[b]).unwrap();
        assert!(matches!(
            ptm_from_generator(&g, f64::NAN),
            Err(OpError::NonPhysical(_))
        ));
    }

    #[test]
    fn test_hamiltonian_generator_matches_unitary() {
        let b = bases::gell_mann(2).unwrap();
        let time = 0.7;
        let h = pauli_z().mapv(|z| z * 0.5);
        let g = generator_from_hamiltonian(&h, &[b.clone()]).unwrap();
        let from_gen = ptm_from_generator(&g, time).unwrap();

        let u = matrix_exp(&h.mapv(|z| z * c(0.0, -time))).unwrap();
        let from_kraus = kraus_to_ptm(&[u], &[b.clone()], &[b]).unwrap();
        assert_close(&from_gen, &from_kraus, 1e-10);
    }

    #[test]
    fn test_amplitude_damping_generator() {
        let b = bases::general(2).unwrap();
        let gamma: f64 = 0.3;
        let time = 2.0;
        let lowering = array![[c(0.0, 0.0), c(1.0, 0.0)], [c(0.0, 0.0), c(0.0, 0.0)]];
        let ops = [lowering.mapv(|z| z * gamma.sqrt())];
        let g = generator_from_lindblad_ops(&ops, &[b.clone()]).unwrap();
        let ptm = ptm_from_generator(&g, time).unwrap();

        // Excited population decays into the ground state.
        let p = (-gamma * time).exp();
        let i0 = b.computational_basis_index(0).unwrap();
        let i1 = b.computational_basis_index(1).unwrap();
        assert!((ptm[[i1, i1]] - p).abs() < 1e-10);
        assert!((ptm[[i0, i1]] - (1.0 - p)).abs() < 1e-10);
        assert!((ptm[[i0, i0]] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_non_hermitian_hamiltonian_is_non_physical() {
        let b = bases::gell_mann(2).unwrap();
        let h = array![[c(0.0, 0.0), c(1.0, 0.0)], [c(0.0, 0.0), c(0.0, 0.0)]];
        let g = generator_from_hamiltonian(&h, &[b]).unwrap();
        assert!(matches!(ptm_from_generator(&g, 1.0), Err(OpError::NonPhysical(_))));
    }
}

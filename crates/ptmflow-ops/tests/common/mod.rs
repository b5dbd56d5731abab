//! Shared channel builders for the integration tests.

#![allow(dead_code)]

use ndarray::{Array2, ArrayD, array, linalg::kron};
use num_complex::Complex64;
use ptmflow_ops::matrix_exp;
use rand::Rng;

pub fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

/// Rotation about X in the `|0⟩, |1⟩` subspace of a `d`-level system.
pub fn rx(theta: f64, d: usize) -> Array2<Complex64> {
    let (s, co) = (theta / 2.0).sin_cos();
    let mut u = Array2::<Complex64>::eye(d);
    u[[0, 0]] = c(co, 0.0);
    u[[1, 1]] = c(co, 0.0);
    u[[0, 1]] = c(0.0, -s);
    u[[1, 0]] = c(0.0, -s);
    u
}

/// Rotation about Z in the `|0⟩, |1⟩` subspace of a `d`-level system.
pub fn rz(theta: f64, d: usize) -> Array2<Complex64> {
    let mut u = Array2::<Complex64>::eye(d);
    u[[0, 0]] = Complex64::from_polar(1.0, -theta / 2.0);
    u[[1, 1]] = Complex64::from_polar(1.0, theta / 2.0);
    u
}

pub fn cz() -> Array2<Complex64> {
    let mut u = Array2::<Complex64>::eye(4);
    u[[3, 3]] = c(-1.0, 0.0);
    u
}

pub fn bit_flip() -> Array2<Complex64> {
    array![[c(0.0, 0.0), c(1.0, 0.0)], [c(1.0, 0.0), c(0.0, 0.0)]]
}

/// Kraus operators of full dephasing in the computational basis.
pub fn dephasing(d: usize) -> Vec<Array2<Complex64>> {
    (0..d)
        .map(|i| {
            let mut p = Array2::zeros((d, d));
            p[[i, i]] = c(1.0, 0.0);
            p
        })
        .collect()
}

/// Kraus operators of qubit amplitude damping with decay probability `gamma`.
pub fn amplitude_damping(gamma: f64) -> Vec<Array2<Complex64>> {
    vec![
        array![
            [c(1.0, 0.0), c(0.0, 0.0)],
            [c(0.0, 0.0), c((1.0 - gamma).sqrt(), 0.0)]
        ],
        array![[c(0.0, 0.0), c(gamma.sqrt(), 0.0)], [c(0.0, 0.0), c(0.0, 0.0)]],
    ]
}

/// `exp(-i H)` for a random Hermitian `H`.
pub fn random_unitary<R: Rng>(rng: &mut R, d: usize) -> Array2<Complex64> {
    let a = Array2::from_shape_fn((d, d), |_| {
        c(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
    });
    let h = &a + &a.t().mapv(|z| z.conj());
    matrix_exp(&h.mapv(|z| z * c(0.0, -1.0))).expect("finite generator")
}

/// Random density matrix `A A† / Tr(A A†)`.
pub fn random_dm<R: Rng>(rng: &mut R, d: usize) -> Array2<Complex64> {
    let a = Array2::from_shape_fn((d, d), |_| {
        c(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
    });
    let rho = a.dot(&a.t().mapv(|z| z.conj()));
    let trace: Complex64 = rho.diag().sum();
    rho.mapv(|z| z / trace)
}

pub fn kron2(a: &Array2<Complex64>, b: &Array2<Complex64>) -> Array2<Complex64> {
    kron(a, b)
}

pub fn as_matrix(t: &ArrayD<f64>) -> Array2<f64> {
    let n = (t.len() as f64).sqrt().round() as usize;
    t.to_shape((n, n)).expect("square PTM").into_owned()
}

pub fn assert_close(a: &ArrayD<f64>, b: &ArrayD<f64>, tol: f64) {
    assert_eq!(a.shape(), b.shape(), "shape mismatch");
    for (x, y) in a.iter().zip(b.iter()) {
        assert!((x - y).abs() < tol, "{x} != {y}");
    }
}

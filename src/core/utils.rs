//! Utility functions for real-valued quantum operations.
//!
//! This module contains helper functions for:
//! - Matrix operations (Kronecker product, identity, outer product).
//! - Hermiticity checks.
//! - Spectral decomposition of Hermitian operators through nalgebra.

use nalgebra::DMatrix;
use ndarray::{Array1, Array2};

/// Tolerance used when comparing matrix entries.
pub const TOLERANCE: f64 = 1e-9;

/// Computes the Kronecker (Tensor) product of two matrices.
///
/// If `A` is an $m \times n$ matrix and `B` is a $p \times q$ matrix,
/// the result is an $mp \times nq$ matrix.
pub fn kronecker_product(a: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
    let (m, n) = a.dim();
    let (p, q) = b.dim();

    Array2::from_shape_fn((m * p, n * q), |(row, col)| {
        a[[row / p, col / q]] * b[[row % p, col % q]]
    })
}

/// Identity matrix of dimension `dim`.
pub fn identity(dim: usize) -> Array2<f64> {
    Array2::eye(dim)
}

/// Computes the outer product of two vectors $|a\rangle\langle b|$.
pub fn outer_product(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i] * b[j])
}

/// Euclidean norm of a vector.
pub fn norm(vector: &Array1<f64>) -> f64 {
    vector.dot(vector).sqrt()
}

/// Checks if a real matrix is Hermitian (symmetric).
pub fn is_hermitian(mat: &Array2<f64>, tol: f64) -> bool {
    mat.iter()
        .zip(mat.t().iter())
        .all(|(a, b)| (a - b).abs() < tol)
}

/// Spectral decomposition of a real symmetric matrix.
///
/// Returns the eigenvalues and the matching eigenvectors (one per entry, unit
/// length, mutually orthogonal).
pub fn eigen_decomposition(mat: &Array2<f64>) -> (Vec<f64>, Vec<Array1<f64>>) {
    let (rows, cols) = mat.dim();

    // Convert ndarray -> nalgebra
    let na_mat = DMatrix::from_fn(rows, cols, |r, c| mat[[r, c]]);
    let eigen = na_mat.symmetric_eigen();

    let values = eigen.eigenvalues.iter().copied().collect();
    let vectors = eigen
        .eigenvectors
        .column_iter()
        .map(|col| Array1::from_iter(col.iter().copied()))
        .collect();

    (values, vectors)
}

/// Computes $V D V^{-1}$ where the columns of `V` are `vectors`.
///
/// Returns `None` when the vectors are linearly dependent.
pub fn diagonal_similarity(values: &[f64], vectors: &[Array1<f64>]) -> Option<Array2<f64>> {
    let dim = vectors.len();
    let v = DMatrix::from_fn(dim, dim, |r, c| vectors[c][r]);
    let d = DMatrix::from_diagonal(&nalgebra::DVector::from_column_slice(values));
    let v_inv = v.clone().try_inverse()?;

    let product = v * d * v_inv;

    // Reconvert nalgebra -> ndarray
    Some(Array2::from_shape_fn((dim, dim), |(r, c)| product[(r, c)]))
}

use crate::core::errors::{MeasurementError, StateError};
use crate::core::utils;
use ndarray::{Array1, Array2, array};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_1_SQRT_2;
use std::fmt;

/// Single-qubit measurement basis used by BB84-style protocols.
///
/// Each basis denotes a Hermitian operator with eigenvalues {0, 1}; the
/// eigenvector for eigenvalue `b` encodes bit `b`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Basis {
    /// Z basis (Computational) -> {|0>, |1>}.
    Standard,
    /// X basis (Hadamard) -> {|+>, |->}.
    Hadamard,
}

impl Basis {
    pub const ALL: [Basis; 2] = [Basis::Standard, Basis::Hadamard];

    /// Uniformly random basis.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.random_bool(0.5) {
            Basis::Hadamard
        } else {
            Basis::Standard
        }
    }

    /// The 2x2 Hermitian operator of this basis.
    pub fn operator(self) -> Array2<f64> {
        match self {
            Basis::Standard => array![[0.0, 0.0], [0.0, 1.0]],
            Basis::Hadamard => array![[0.5, -0.5], [-0.5, 0.5]],
        }
    }

    /// The eigenvector encoding `bit` in this basis.
    pub fn eigenvector(self, bit: u8) -> Array1<f64> {
        match (self, bit) {
            (Basis::Standard, 0) => array![1.0, 0.0],
            (Basis::Standard, _) => array![0.0, 1.0],
            (Basis::Hadamard, 0) => array![FRAC_1_SQRT_2, FRAC_1_SQRT_2],
            (Basis::Hadamard, _) => array![FRAC_1_SQRT_2, -FRAC_1_SQRT_2],
        }
    }

    /// Operator measuring qubit `position` of an `num_qubits`-qubit state.
    pub fn lifted_operator(self, num_qubits: usize, position: usize) -> Result<Array2<f64>, StateError> {
        lift_operator(&self.operator(), num_qubits, position)
    }

    /// One-letter label, `S` or `H`.
    pub fn symbol(self) -> char {
        match self {
            Basis::Standard => 'S',
            Basis::Hadamard => 'H',
        }
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Builds the operator $V D V^{-1}$ with the given eigenvalue assigned to
/// each eigenvector.
///
/// Used to construct measurement operators whose eigenspaces are chosen by
/// the caller, e.g. a basis rotated by an arbitrary angle.
pub fn operator_from_eigenbasis(
    eigenvalues: &[f64],
    eigenvectors: &[Array1<f64>],
) -> Result<Array2<f64>, MeasurementError> {
    if eigenvalues.len() != eigenvectors.len() {
        return Err(MeasurementError::CountMismatch {
            values: eigenvalues.len(),
            vectors: eigenvectors.len(),
        });
    }

    let dim = eigenvectors.len();
    if let Some(bad) = eigenvectors.iter().find(|v| v.len() != dim) {
        return Err(MeasurementError::DimensionMismatch {
            expected: dim,
            got: bad.len(),
        });
    }

    utils::diagonal_similarity(eigenvalues, eigenvectors)
        .ok_or(MeasurementError::SingularEigenbasis)
}

/// Lifts a 1-qubit operator to act on qubit `position` of an n-qubit system:
/// $I_{2^{n-1-p}} \otimes O \otimes I_{2^p}$.
pub fn lift_operator(
    operator: &Array2<f64>,
    num_qubits: usize,
    position: usize,
) -> Result<Array2<f64>, StateError> {
    if position >= num_qubits {
        return Err(StateError::IndexOutOfBounds {
            index: position,
            num_qubits,
        });
    }
    let left = utils::identity(1 << (num_qubits - 1 - position));
    let right = utils::identity(1 << position);

    Ok(utils::kronecker_product(
        &utils::kronecker_product(&left, operator),
        &right,
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementResult {
    /// Index of the selected eigenspace (ordered by eigenvalue)
    pub index: usize,
    /// Measured eigenvalue
    pub value: i64,
}

use crate::core::errors::{MeasurementError, StateError};
use crate::core::measurements::{MeasurementResult, lift_operator};
use crate::core::utils::{self, TOLERANCE, eigen_decomposition, norm};
use ndarray::{Array1, Array2};
use rand::Rng;
use std::collections::BTreeMap;

/// Probabilities below this are treated as exactly zero.
const PROBABILITY_FLOOR: f64 = 1e-12;

/// Pure state over $2^n$ basis states with real coefficients.
///
/// The coefficient vector is always L2-normalized. It only changes when it
/// is measured, at which point it is replaced by its projection.
#[derive(Clone, Debug, PartialEq)]
pub struct QuantumState {
    coefficients: Array1<f64>,
    num_qubits: usize,
}

struct Eigenspace {
    value: i64,
    probability: f64,
    projection: Array1<f64>,
}

impl QuantumState {
    /// Creates a normalized state from raw coefficients.
    pub fn new(coefficients: Array1<f64>) -> Result<Self, StateError> {
        let dim = coefficients.len();

        // Dimension must be a power of 2
        if !dim.is_power_of_two() {
            return Err(StateError::InvalidDimensions(dim));
        }

        let length = norm(&coefficients);
        if length == 0.0 || !length.is_finite() {
            return Err(StateError::ZeroVector);
        }

        Ok(Self {
            coefficients: coefficients / length,
            // log_2 as dim is power of two
            num_qubits: dim.trailing_zeros() as usize,
        })
    }

    pub fn from_vec(coefficients: Vec<f64>) -> Result<Self, StateError> {
        Self::new(Array1::from(coefficients))
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    pub fn dim(&self) -> usize {
        self.coefficients.len()
    }

    fn validate_operator(&self, operator: &Array2<f64>) -> Result<(), MeasurementError> {
        let (rows, cols) = operator.dim();
        if rows != cols {
            return Err(MeasurementError::NotSquare { rows, cols });
        }
        if rows != self.dim() {
            return Err(MeasurementError::DimensionMismatch {
                expected: self.dim(),
                got: rows,
            });
        }
        if !utils::is_hermitian(operator, TOLERANCE) {
            return Err(MeasurementError::NotHermitian);
        }
        Ok(())
    }

    /// Groups the operator's eigenvectors by rounded eigenvalue and projects
    /// the state onto each eigenspace.
    fn eigenspaces(&self, operator: &Array2<f64>) -> Vec<Eigenspace> {
        let (values, vectors) = eigen_decomposition(operator);
        let mut spaces: BTreeMap<i64, Eigenspace> = BTreeMap::new();

        for (value, vector) in values.iter().zip(vectors) {
            let value = value.round() as i64;
            let amplitude = vector.dot(&self.coefficients);

            let space = spaces.entry(value).or_insert_with(|| Eigenspace {
                value,
                probability: 0.0,
                projection: Array1::zeros(self.dim()),
            });
            space.probability += amplitude * amplitude;
            space.projection.scaled_add(amplitude, &vector);
        }

        let mut spaces: Vec<Eigenspace> = spaces.into_values().collect();
        let total: f64 = spaces.iter().map(|s| s.probability).sum();

        for space in &mut spaces {
            // Due to float, renormalization of probabilities to ensure completeness
            space.probability /= total;
            if space.probability < PROBABILITY_FLOOR {
                space.probability = 0.0;
            }

            let length = norm(&space.projection);
            if length > 0.0 {
                space.projection /= length;
            }
        }

        spaces
    }

    /// Outcome probabilities for `operator`, ordered by eigenvalue.
    pub fn probabilities(&self, operator: &Array2<f64>) -> Result<Vec<(i64, f64)>, StateError> {
        self.validate_operator(operator)?;
        Ok(self
            .eigenspaces(operator)
            .iter()
            .map(|s| (s.value, s.probability))
            .collect())
    }

    /// Randomly selects eigenspace index ponderating using `probs`
    fn pick_outcome<R: Rng + ?Sized>(probs: &[f64], rng: &mut R) -> usize {
        let roll: f64 = rng.random();

        let mut cumulative = 0.0;
        for (i, &p) in probs.iter().enumerate() {
            cumulative += p;
            if roll < cumulative {
                return i;
            }
        }
        // Float rounding left the roll past the last bucket
        probs
            .iter()
            .rposition(|&p| p > 0.0)
            .unwrap_or(probs.len().saturating_sub(1))
    }

    /// Physical measurement which collapses the state irretrievably.
    ///
    /// The state is replaced by its normalized projection onto the selected
    /// eigenspace, and that eigenspace's (rounded) eigenvalue is returned.
    pub fn measure<R: Rng + ?Sized>(
        &mut self,
        operator: &Array2<f64>,
        rng: &mut R,
    ) -> Result<MeasurementResult, StateError> {
        self.validate_operator(operator)?;

        let mut spaces = self.eigenspaces(operator);
        let probs: Vec<f64> = spaces.iter().map(|s| s.probability).collect();
        let index = Self::pick_outcome(&probs, rng);

        let selected = spaces.swap_remove(index);
        self.coefficients = selected.projection;

        Ok(MeasurementResult {
            index,
            value: selected.value,
        })
    }

    /// Measures qubit `position` of this state with a 1-qubit `operator`,
    /// lifting it to the whole system first.
    pub fn measure_qubit<R: Rng + ?Sized>(
        &mut self,
        operator: &Array2<f64>,
        position: usize,
        rng: &mut R,
    ) -> Result<MeasurementResult, StateError> {
        if position >= self.num_qubits {
            return Err(StateError::IndexOutOfBounds {
                index: position,
                num_qubits: self.num_qubits,
            });
        }
        let (rows, cols) = operator.dim();
        if rows != 2 || cols != 2 {
            return Err(MeasurementError::DimensionMismatch {
                expected: 2,
                got: rows.max(cols),
            }
            .into());
        }

        let lifted = lift_operator(operator, self.num_qubits, position)?;
        self.measure(&lifted, rng)
    }
}

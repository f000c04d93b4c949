use crate::{QuantumState, errors::StateError};
use ndarray::Array2;
use rand::Rng;
use std::collections::BTreeMap;

/// A repeated-shot sampler over a fixed quantum state.
///
/// Every shot measures a fresh copy of the state, so the sampled state is
/// never collapsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sampler {
    /// Qubit to measure; `None` measures the whole state with the operator as given.
    pub target: Option<usize>,
}

impl Sampler {
    /// Creates a new `Sampler` measuring the full state.
    pub fn new() -> Self {
        Self { target: None }
    }

    /// Measures only qubit `position`, lifting the 1-qubit operator.
    pub fn with_target(mut self, position: usize) -> Self {
        self.target = Some(position);
        self
    }

    /// Samples a `QuantumState` `num_shots` times using `operator`.
    ///
    /// # Returns
    ///
    /// A map from measured eigenvalue to the number of shots that produced it.
    pub fn run<R: Rng + ?Sized>(
        &self,
        state: &QuantumState,
        operator: &Array2<f64>,
        num_shots: usize,
        rng: &mut R,
    ) -> Result<BTreeMap<i64, usize>, StateError> {
        let mut counts = BTreeMap::new();

        for _ in 0..num_shots {
            // Clones QuantumState to not modify it
            let mut state_copy = state.clone();

            let result = match self.target {
                Some(position) => state_copy.measure_qubit(operator, position, rng)?,
                None => state_copy.measure(operator, rng)?,
            };

            *counts.entry(result.value).or_insert(0) += 1;
        }

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Basis;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn sampling_leaves_state_untouched() {
        let mut rng = StdRng::seed_from_u64(5);
        let state = QuantumState::new(Basis::Hadamard.eigenvector(0)).unwrap();
        let counts = Sampler::new()
            .run(&state, &Basis::Standard.operator(), 200, &mut rng)
            .unwrap();

        assert_eq!(counts.values().sum::<usize>(), 200);
        assert_eq!(state.coefficients(), &Basis::Hadamard.eigenvector(0));
    }

    #[test]
    fn targeted_sampling_of_product_state() {
        let mut rng = StdRng::seed_from_u64(5);
        // |10>: left qubit is 1, right qubit is 0
        let state = QuantumState::from_vec(vec![0.0, 0.0, 1.0, 0.0]).unwrap();
        let op = Basis::Standard.operator();

        let left = Sampler::new().with_target(1).run(&state, &op, 20, &mut rng).unwrap();
        let right = Sampler::new().with_target(0).run(&state, &op, 20, &mut rng).unwrap();

        assert_eq!(left.get(&1), Some(&20));
        assert_eq!(right.get(&0), Some(&20));
    }
}

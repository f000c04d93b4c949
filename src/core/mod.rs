pub mod errors;
mod measurements;
mod state;
pub mod utils;

pub use measurements::{Basis, MeasurementResult, lift_operator, operator_from_eigenbasis};
pub use state::QuantumState;

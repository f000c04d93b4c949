use crate::PartyId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeasurementError {
    #[error("Measurement operator must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("Operator dimension {got} does not match state dimension {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Measurement operator is not Hermitian")]
    NotHermitian,

    #[error("Number of eigenvalues ({values}) does not match number of eigenvectors ({vectors})")]
    CountMismatch { values: usize, vectors: usize },

    #[error("Eigenvectors do not form a basis (matrix is singular)")]
    SingularEigenbasis,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("State vector must contain at least one non-zero coefficient")]
    ZeroVector,

    #[error("State vector length {0} is not a power of two")]
    InvalidDimensions(usize),

    #[error("Qubit index out of bounds")]
    IndexOutOfBounds { index: usize, num_qubits: usize },

    #[error("Measurement error: {0}")]
    Measurement(#[from] MeasurementError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PartyError {
    #[error("Party {party} has no measurement basis armed for states from {sender}")]
    UnarmedMeasurement { party: PartyId, sender: PartyId },

    #[error("Measurement produced non-binary outcome {0}")]
    NonBinaryOutcome(i64),

    #[error("State error: {0}")]
    State(#[from] StateError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("The network must have at least one edge")]
    EmptyTopology,

    #[error("The network must have at least 2 nodes, got {0}")]
    TooFewNodes(usize),

    #[error("The network has no party that transmits to every other party")]
    NoLeader,

    #[error("The network has no unique party without predecessors")]
    NoChainHead,

    #[error("Unknown party {0}")]
    UnknownParty(PartyId),

    #[error("Edge ({0}, {1}) is not part of the network")]
    UnknownEdge(PartyId, PartyId),

    #[error("No quantum channel from {from} towards {to}")]
    NoRoute { from: PartyId, to: PartyId },

    #[error("State forwarded in a loop starting at {0}")]
    ForwardingLoop(PartyId),

    #[error("Party error: {0}")]
    Party(#[from] PartyError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid probability: {0}. Must be between 0.0 and 1.0")]
    InvalidProbability(f64),

    #[error("Invalid security level: {0}. Must be in [0.0, 1.0)")]
    InvalidSecurity(f64),

    #[error("Either a party count or an explicit edge list is required")]
    MissingTopology,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Party error: {0}")]
    Party(#[from] PartyError),

    #[error("State error: {0}")]
    State(#[from] StateError),
}

//! Quantum key distribution over simulated networks.
//!
//! Parties exchange BB84 states over quantum channels and reconcile their
//! keys over a public classical channel. Eavesdroppers can be spliced into
//! any link; they run an intercept-resend attack that check bits expose.

pub mod channels;
pub mod config;
mod core;
mod ledger;
pub mod network;
pub mod party;
pub mod protocols;
mod sampler;

pub use crate::config::{CheckBitPolicy, ProtocolConfig, ProtocolVariant};
pub use crate::core::{
    Basis, MeasurementResult, QuantumState, errors, lift_operator, operator_from_eigenbasis, utils,
};
pub use crate::ledger::TimestepLedger;
pub use crate::network::{NetworkManager, QubitCounts};
pub use crate::party::{Bit, Party, PartyId};
pub use crate::protocols::{QkdProtocol, RunReport, TimestepSnapshot, required_num_check_bits};
pub use crate::sampler::Sampler;

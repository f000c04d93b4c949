//! Immutable per-iteration history records.

use crate::PartyId;
use crate::channels::{Message, QuantumChannelSnapshot};
use crate::party::PartySnapshot;
use serde::Serialize;
use std::collections::BTreeMap;

/// Protocol-level figures at the end of an iteration.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProtocolSnapshot {
    pub iteration: usize,
    pub timestep: usize,
    pub security: f64,
    pub key_length: usize,
    pub protocol_secure: bool,
}

/// Deep copy of the whole simulation after one iteration.
///
/// Nothing here aliases live state, so a consumer can hold on to it while
/// the protocol keeps running.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimestepSnapshot {
    pub protocol: ProtocolSnapshot,
    /// Classical messages posted during the iteration, by sender.
    pub channel: BTreeMap<PartyId, Vec<Message>>,
    pub parties: BTreeMap<PartyId, PartySnapshot>,
    pub edges: Vec<QuantumChannelSnapshot>,
}

use crate::{PartyId, QuantumState};
use serde::Serialize;

/// Logical quantum wire between one transmitting and one receiving party.
///
/// The channel is a stateless conduit; it only remembers the most recently
/// transmitted state so it can be inspected afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct QuantumChannel {
    tx: PartyId,
    rx: PartyId,
    pub intercepted: bool,
    last_state: Option<QuantumState>,
    last_timestep: Option<usize>,
    total_transmitted: usize,
}

/// Read-only copy of a channel's record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuantumChannelSnapshot {
    pub tx: PartyId,
    pub rx: PartyId,
    pub intercepted: bool,
    /// Coefficients of the last transmitted state, as it left the sender.
    pub last_state: Option<Vec<f64>>,
    pub last_timestep: Option<usize>,
    pub total_transmitted: usize,
}

impl QuantumChannel {
    pub fn new(tx: PartyId, rx: PartyId) -> Self {
        Self {
            tx,
            rx,
            intercepted: false,
            last_state: None,
            last_timestep: None,
            total_transmitted: 0,
        }
    }

    /// Points the receiving end at a different party.
    pub fn reconnect_rx(&mut self, rx: PartyId) {
        self.rx = rx;
    }

    pub fn reset(&mut self) {
        self.last_state = None;
        self.last_timestep = None;
        self.total_transmitted = 0;
    }

    /// Records a state passing through the channel.
    pub fn carry(&mut self, state: &QuantumState, timestep: usize) {
        self.last_state = Some(state.clone());
        self.last_timestep = Some(timestep);
        self.total_transmitted += 1;
    }

    pub fn last_state(&self) -> Option<&QuantumState> {
        self.last_state.as_ref()
    }

    pub fn total_transmitted(&self) -> usize {
        self.total_transmitted
    }

    pub fn snapshot(&self) -> QuantumChannelSnapshot {
        QuantumChannelSnapshot {
            tx: self.tx,
            rx: self.rx,
            intercepted: self.intercepted,
            last_state: self.last_state.as_ref().map(|s| s.coefficients().to_vec()),
            last_timestep: self.last_timestep,
            total_transmitted: self.total_transmitted,
        }
    }
}

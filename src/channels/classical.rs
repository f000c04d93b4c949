use crate::{Basis, PartyId, TimestepLedger};
use serde::Serialize;
use std::collections::BTreeMap;

/// Kind tag used to address messages on the classical channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum MessageKind {
    TxBases,
    RxBases,
    CheckBits,
    FlipBitInstructions,
    KeyLength,
}

/// Message body, one variant per [`MessageKind`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Payload {
    /// Bases used to prepare states this timestep, keyed by receiver.
    TxBases(BTreeMap<PartyId, Basis>),
    /// Bases used to measure states this timestep, keyed by sender.
    RxBases(BTreeMap<PartyId, Basis>),
    /// Every check bit the sender has recorded so far.
    CheckBits(TimestepLedger<u8>),
    /// Positional flip masks, keyed by the party that must apply them.
    FlipBitInstructions(BTreeMap<PartyId, Vec<bool>>),
    KeyLength(usize),
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::TxBases(_) => MessageKind::TxBases,
            Payload::RxBases(_) => MessageKind::RxBases,
            Payload::CheckBits(_) => MessageKind::CheckBits,
            Payload::FlipBitInstructions(_) => MessageKind::FlipBitInstructions,
            Payload::KeyLength(_) => MessageKind::KeyLength,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Message {
    pub timestep: usize,
    pub payload: Payload,
}

impl Message {
    pub fn new(timestep: usize, payload: Payload) -> Self {
        Self { timestep, payload }
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }
}

/// Authenticated public channel shared by every party.
///
/// Messages are appended per sender in insertion order; nothing is ever
/// deduplicated or removed until [`ClassicalChannel::reset`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ClassicalChannel {
    messages: BTreeMap<PartyId, Vec<Message>>,
}

impl ClassicalChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.messages.clear();
    }

    pub fn post(&mut self, sender: PartyId, message: Message) {
        tracing::trace!(%sender, timestep = message.timestep, kind = ?message.kind(), "classical message posted");
        self.messages.entry(sender).or_default().push(message);
    }

    /// The message of `kind` posted by `sender` at `timestep`.
    ///
    /// If the sender posted more than one, the latest wins. Absence is not an
    /// error: it means there is nothing to reconcile yet.
    pub fn get(&self, timestep: usize, sender: PartyId, kind: MessageKind) -> Option<&Payload> {
        self.messages
            .get(&sender)?
            .iter()
            .rev()
            .find(|m| m.timestep == timestep && m.kind() == kind)
            .map(|m| &m.payload)
    }

    /// `{sender: {receiver: basis}}` for all tx-basis announcements at `timestep`.
    pub fn get_tx_bases(&self, timestep: usize) -> BTreeMap<PartyId, BTreeMap<PartyId, Basis>> {
        self.collect_bases(timestep, MessageKind::TxBases)
    }

    /// `{receiver: {sender: basis}}` for all rx-basis announcements at `timestep`.
    pub fn get_rx_bases(&self, timestep: usize) -> BTreeMap<PartyId, BTreeMap<PartyId, Basis>> {
        self.collect_bases(timestep, MessageKind::RxBases)
    }

    fn collect_bases(
        &self,
        timestep: usize,
        kind: MessageKind,
    ) -> BTreeMap<PartyId, BTreeMap<PartyId, Basis>> {
        self.messages
            .keys()
            .filter_map(|&sender| match self.get(timestep, sender, kind) {
                Some(Payload::TxBases(b) | Payload::RxBases(b)) => Some((sender, b.clone())),
                _ => None,
            })
            .collect()
    }

    /// Every message posted at `timestep`, by sender.
    pub fn messages_at(&self, timestep: usize) -> BTreeMap<PartyId, Vec<Message>> {
        self.messages
            .iter()
            .map(|(sender, msgs)| {
                let at: Vec<Message> = msgs.iter().filter(|m| m.timestep == timestep).cloned().collect();
                (*sender, at)
            })
            .filter(|(_, msgs)| !msgs.is_empty())
            .collect()
    }
}

//! Per-timestep, per-peer bookkeeping.

use crate::PartyId;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Values indexed by timestep, then by peer.
///
/// Backed by a growable array of small maps. A timestep whose map is empty
/// is indistinguishable from one that was never written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimestepLedger<V> {
    entries: Vec<BTreeMap<PartyId, V>>,
}

impl<V> Default for TimestepLedger<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> TimestepLedger<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, timestep: usize, peer: PartyId) -> Option<&V> {
        self.entries.get(timestep)?.get(&peer)
    }

    pub fn get_mut(&mut self, timestep: usize, peer: PartyId) -> Option<&mut V> {
        self.entries.get_mut(timestep)?.get_mut(&peer)
    }

    pub fn contains(&self, timestep: usize, peer: PartyId) -> bool {
        self.get(timestep, peer).is_some()
    }

    pub fn insert(&mut self, timestep: usize, peer: PartyId, value: V) -> Option<V> {
        if self.entries.len() <= timestep {
            self.entries.resize_with(timestep + 1, BTreeMap::new);
        }
        self.entries[timestep].insert(peer, value)
    }

    pub fn remove(&mut self, timestep: usize, peer: PartyId) -> Option<V> {
        let removed = self.entries.get_mut(timestep)?.remove(&peer);
        self.prune();
        removed
    }

    /// All entries of one timestep, `None` if there are none.
    pub fn at(&self, timestep: usize) -> Option<&BTreeMap<PartyId, V>> {
        self.entries.get(timestep).filter(|m| !m.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(BTreeMap::is_empty)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// `(timestep, peer, value)` in timestep order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, PartyId, &V)> {
        self.entries
            .iter()
            .enumerate()
            .flat_map(|(t, m)| m.iter().map(move |(p, v)| (t, *p, v)))
    }

    /// `(timestep, value)` pairs for one peer, in timestep order.
    pub fn for_peer(&self, peer: PartyId) -> impl Iterator<Item = (usize, &V)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(move |(t, m)| m.get(&peer).map(|v| (t, v)))
    }

    pub fn for_peer_mut(&mut self, peer: PartyId) -> impl Iterator<Item = &mut V> {
        self.entries.iter_mut().filter_map(move |m| m.get_mut(&peer))
    }

    pub fn peers(&self) -> BTreeSet<PartyId> {
        self.entries.iter().flat_map(|m| m.keys().copied()).collect()
    }

    pub fn peer_len(&self, peer: PartyId) -> usize {
        self.for_peer(peer).count()
    }

    /// Keeps only the `len` earliest entries for `peer`.
    pub fn truncate_peer(&mut self, peer: PartyId, len: usize) {
        let mut kept = 0;
        for map in &mut self.entries {
            if map.contains_key(&peer) {
                if kept < len {
                    kept += 1;
                } else {
                    map.remove(&peer);
                }
            }
        }
        self.prune();
    }

    fn prune(&mut self) {
        while self.entries.last().is_some_and(BTreeMap::is_empty) {
            self.entries.pop();
        }
    }
}

impl<V: Clone> TimestepLedger<V> {
    /// Values for one peer in timestep order.
    pub fn peer_values(&self, peer: PartyId) -> Vec<V> {
        self.for_peer(peer).map(|(_, v)| v.clone()).collect()
    }

    /// Reindexes by peer: `{peer: {timestep: value}}`.
    pub fn by_peer(&self) -> BTreeMap<PartyId, BTreeMap<usize, V>> {
        let mut out: BTreeMap<PartyId, BTreeMap<usize, V>> = BTreeMap::new();
        for (t, peer, v) in self.iter() {
            out.entry(peer).or_default().insert(t, v.clone());
        }
        out
    }
}

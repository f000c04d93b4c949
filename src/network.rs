//! Directed network of parties joined by quantum channels.

use crate::channels::{QuantumChannel, QuantumChannelSnapshot};
use crate::errors::NetworkError;
use crate::party::{Bit, Party, PartySnapshot, Transmission, party_name};
use crate::{Basis, PartyId, TimestepLedger};
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Physical quantum link between two party slots.
///
/// `link` is the legitimate (sender, receiver) pair the edge serves; an
/// eavesdropper splits one link across two edges.
#[derive(Clone, Debug)]
struct Edge {
    tx: usize,
    rx: usize,
    link: (PartyId, PartyId),
    channel: QuantumChannel,
}

/// An eavesdropper spliced into the link `tx -> rx`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Interception {
    pub eve: PartyId,
    pub tx: PartyId,
    pub rx: PartyId,
}

/// Network-wide qubit totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QubitCounts {
    pub generated: usize,
    pub transmitted: usize,
    pub received: usize,
}

/// Arena of parties plus the edge list connecting them.
///
/// Parties are never removed; inserting an eavesdropper appends one slot,
/// rewrites one edge, and appends one edge.
#[derive(Clone, Debug)]
pub struct NetworkManager {
    parties: Vec<Party>,
    slots: BTreeMap<PartyId, usize>,
    links: Vec<(PartyId, PartyId)>,
    edges: Vec<Edge>,
    interceptions: Vec<Interception>,
    timestep: usize,
}

impl NetworkManager {
    pub fn new(edges: &[(usize, usize)]) -> Result<Self, NetworkError> {
        if edges.is_empty() {
            return Err(NetworkError::EmptyTopology);
        }

        let nodes: BTreeSet<usize> = edges.iter().flat_map(|&(a, b)| [a, b]).collect();
        if nodes.len() < 2 {
            return Err(NetworkError::TooFewNodes(nodes.len()));
        }

        // Create a party for every node in the network.
        let mut parties = Vec::with_capacity(nodes.len());
        let mut slots = BTreeMap::new();
        for uid in nodes.into_iter().map(PartyId) {
            slots.insert(uid, parties.len());
            parties.push(Party::new(uid, party_name(uid)));
        }

        // Create a quantum channel for every edge in the network.
        let mut links = Vec::with_capacity(edges.len());
        let mut physical = Vec::with_capacity(edges.len());
        for &(a, b) in edges {
            let link = (PartyId(a), PartyId(b));
            if links.contains(&link) {
                continue;
            }
            links.push(link);
            physical.push(Edge {
                tx: slots[&link.0],
                rx: slots[&link.1],
                link,
                channel: QuantumChannel::new(link.0, link.1),
            });
        }

        Ok(Self {
            parties,
            slots,
            links,
            edges: physical,
            interceptions: Vec::new(),
            timestep: 0,
        })
    }

    /// Resets the network to its configuration at timestep 0.
    pub fn reset(&mut self) {
        for party in &mut self.parties {
            party.reset();
        }
        for edge in &mut self.edges {
            edge.channel.reset();
        }
        self.timestep = 0;
    }

    pub fn next_timestep(&mut self) {
        for party in &mut self.parties {
            party.next_timestep();
        }
        self.timestep += 1;
    }

    pub fn timestep(&self) -> usize {
        self.timestep
    }

    fn slot(&self, uid: PartyId) -> Result<usize, NetworkError> {
        self.slots
            .get(&uid)
            .copied()
            .ok_or(NetworkError::UnknownParty(uid))
    }

    pub fn party(&self, uid: PartyId) -> Result<&Party, NetworkError> {
        Ok(&self.parties[self.slot(uid)?])
    }

    pub fn party_mut(&mut self, uid: PartyId) -> Result<&mut Party, NetworkError> {
        let slot = self.slot(uid)?;
        Ok(&mut self.parties[slot])
    }

    /// Every party, eavesdroppers included, in insertion order.
    pub fn parties(&self) -> impl Iterator<Item = &Party> {
        self.parties.iter()
    }

    pub fn legitimate_parties(&self) -> impl Iterator<Item = &Party> {
        self.parties.iter().filter(|p| !p.is_eavesdropper())
    }

    pub fn get_legitimate_party_uids(&self) -> Vec<PartyId> {
        self.legitimate_parties().map(Party::uid).collect()
    }

    pub fn interceptions(&self) -> &[Interception] {
        &self.interceptions
    }

    /// Legitimate (sender, receiver) links.
    pub fn links(&self) -> &[(PartyId, PartyId)] {
        &self.links
    }

    pub fn get_successors(&self, uid: PartyId) -> Vec<PartyId> {
        self.links
            .iter()
            .filter(|(tx, _)| *tx == uid)
            .map(|&(_, rx)| rx)
            .collect()
    }

    pub fn get_predecessors(&self, uid: PartyId) -> Vec<PartyId> {
        self.links
            .iter()
            .filter(|(_, rx)| *rx == uid)
            .map(|&(tx, _)| tx)
            .collect()
    }

    /// The unique legitimate party with no predecessors.
    pub fn chain_head(&self) -> Result<PartyId, NetworkError> {
        let heads: Vec<PartyId> = self
            .legitimate_parties()
            .map(Party::uid)
            .filter(|&uid| self.get_predecessors(uid).is_empty())
            .collect();

        match heads.as_slice() {
            [head] => Ok(*head),
            _ => Err(NetworkError::NoChainHead),
        }
    }

    /// Parties in chain order, starting at the head and following the first
    /// successor of each party.
    pub fn chain_order(&self) -> Result<Vec<PartyId>, NetworkError> {
        let mut order = vec![self.chain_head()?];
        let mut seen: BTreeSet<PartyId> = order.iter().copied().collect();

        while let Some(next) = order
            .last()
            .and_then(|&uid| self.get_successors(uid).first().copied())
        {
            if !seen.insert(next) {
                break;
            }
            order.push(next);
        }
        Ok(order)
    }

    /// The unique legitimate party that transmits to every other one.
    pub fn leader(&self) -> Result<PartyId, NetworkError> {
        let uids = self.get_legitimate_party_uids();
        let leaders: Vec<PartyId> = uids
            .iter()
            .copied()
            .filter(|&uid| {
                let successors = self.get_successors(uid);
                uids.iter()
                    .filter(|&&other| other != uid)
                    .all(|other| successors.contains(other))
            })
            .collect();

        match leaders.as_slice() {
            [leader] => Ok(*leader),
            _ => Err(NetworkError::NoLeader),
        }
    }

    /// Splices an eavesdropping party into each of the given links.
    ///
    /// The existing channel's receiving end is moved to the eavesdropper, a
    /// fresh channel joins the eavesdropper to the original receiver, and the
    /// eavesdropper is configured to forward everything it receives.
    pub fn intercept_edges(
        &mut self,
        edges: &[(PartyId, PartyId)],
    ) -> Result<Vec<PartyId>, NetworkError> {
        let mut eves = Vec::with_capacity(edges.len());

        for &(tx, rx) in edges {
            let tx_slot = self.slot(tx)?;
            let rx_slot = self.slot(rx)?;
            let index = self
                .edges
                .iter()
                .position(|e| e.link == (tx, rx) && e.tx == tx_slot && e.rx == rx_slot)
                .ok_or(NetworkError::UnknownEdge(tx, rx))?;

            let eve_uid = self
                .slots
                .keys()
                .next_back()
                .map_or(PartyId(0), |max| PartyId(max.0 + 1));

            // Create a new eavesdropping party.
            let mut eve = Party::eavesdropper(eve_uid);
            eve.set_timestep(self.timestep);
            eve.forward(tx, rx);
            let eve_slot = self.parties.len();
            self.parties.push(eve);
            self.slots.insert(eve_uid, eve_slot);

            // Redirect the existing channel to the eavesdropper.
            let existing = &mut self.edges[index];
            existing.rx = eve_slot;
            existing.channel.reconnect_rx(eve_uid);
            existing.channel.intercepted = true;

            // Add a new channel from the eavesdropper to the original receiver.
            self.edges.push(Edge {
                tx: eve_slot,
                rx: rx_slot,
                link: (tx, rx),
                channel: QuantumChannel::new(eve_uid, rx),
            });

            tracing::info!(eve = %eve_uid, %tx, %rx, "eavesdropper inserted");
            self.interceptions.push(Interception { eve: eve_uid, tx, rx });
            eves.push(eve_uid);
        }

        Ok(eves)
    }

    /// Arms every eavesdropper with a fresh random basis for its link.
    pub fn arm_eavesdroppers<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), NetworkError> {
        for interception in self.interceptions.clone() {
            let basis = Basis::random(rng);
            self.party_mut(interception.eve)?
                .set_basis(interception.tx, basis);
        }
        Ok(())
    }

    /// Has `from` prepare `bit` in `basis` and sends it towards `target`.
    pub fn send_state<R: Rng + ?Sized>(
        &mut self,
        from: PartyId,
        bit: Bit,
        basis: Basis,
        target: PartyId,
        rng: &mut R,
    ) -> Result<(), NetworkError> {
        let transmission = self.party_mut(from)?.send_state(bit, basis, target)?;
        self.transmit(from, transmission, rng)
    }

    /// Carries a state hop by hop until a party stops forwarding it.
    ///
    /// Receivers see the legitimate sender of the link, so eavesdroppers are
    /// invisible to them.
    pub fn transmit<R: Rng + ?Sized>(
        &mut self,
        from: PartyId,
        transmission: Transmission,
        rng: &mut R,
    ) -> Result<(), NetworkError> {
        let mut sender = self.slot(from)?;
        let mut hop = transmission;

        for _ in 0..=self.edges.len() {
            let sender_uid = self.parties[sender].uid();
            let target = hop.target;
            let edge = self
                .edges
                .iter_mut()
                .find(|e| e.tx == sender && e.link.1 == target)
                .ok_or(NetworkError::NoRoute {
                    from: sender_uid,
                    to: target,
                })?;

            edge.channel.carry(&hop.state, self.timestep);
            let source = edge.link.0;
            let receiver = edge.rx;

            match self.parties[receiver].receive(hop.state, source, rng)? {
                Some(next) => {
                    sender = receiver;
                    hop = next;
                }
                None => return Ok(()),
            }
        }

        Err(NetworkError::ForwardingLoop(from))
    }

    pub fn calculate_qubit_counts(&self) -> QubitCounts {
        self.parties.iter().fold(QubitCounts::default(), |acc, p| QubitCounts {
            generated: acc.generated + p.total_qstates_generated(),
            transmitted: acc.transmitted + p.total_qstates_transmitted(),
            received: acc.received + p.total_qstates_received(),
        })
    }

    fn shortest_over(&self, ledger: impl Fn(&Party) -> &TimestepLedger<Bit>) -> usize {
        let mut shortest: Option<usize> = None;
        for party in self.legitimate_parties() {
            let entries = ledger(party);
            if entries.is_empty() {
                return 0;
            }
            for peer in entries.peers() {
                let len = entries.peer_len(peer);
                shortest = Some(shortest.map_or(len, |s| s.min(len)));
            }
        }
        shortest.unwrap_or(0)
    }

    /// Length of the shortest secret key held by any legitimate party.
    pub fn get_shortest_key_length(&self) -> usize {
        self.shortest_over(Party::secret_keys)
    }

    /// Fewest check bits accumulated on any legitimate party's leg.
    pub fn get_shortest_check_bits(&self) -> usize {
        self.shortest_over(Party::check_bits)
    }

    pub fn party_snapshots(&self) -> BTreeMap<PartyId, PartySnapshot> {
        self.parties.iter().map(|p| (p.uid(), p.snapshot())).collect()
    }

    pub fn channel_snapshots(&self) -> Vec<QuantumChannelSnapshot> {
        self.edges.iter().map(|e| e.channel.snapshot()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const A: PartyId = PartyId(0);
    const B: PartyId = PartyId(1);
    const C: PartyId = PartyId(2);

    #[test]
    fn rejects_empty_and_degenerate_topologies() {
        assert_eq!(NetworkManager::new(&[]).err(), Some(NetworkError::EmptyTopology));
        assert_eq!(
            NetworkManager::new(&[(0, 0)]).err(),
            Some(NetworkError::TooFewNodes(1))
        );
    }

    #[test]
    fn topology_queries() {
        let net = NetworkManager::new(&[(0, 1), (1, 2), (1, 3)]).unwrap();
        assert_eq!(net.get_successors(B), vec![C, PartyId(3)]);
        assert_eq!(net.get_predecessors(B), vec![A]);
        assert_eq!(net.chain_head(), Ok(A));
        assert_eq!(net.leader(), Err(NetworkError::NoLeader));
        assert_eq!(net.party(PartyId(3)).unwrap().name(), "D");
    }

    #[test]
    fn chain_order_follows_successors() {
        let net = NetworkManager::new(&[(2, 3), (0, 1), (1, 2)]).unwrap();
        assert_eq!(net.chain_order().unwrap(), vec![A, B, C, PartyId(3)]);
    }

    #[test]
    fn cycle_has_no_chain_head() {
        let net = NetworkManager::new(&[(0, 1), (1, 2), (2, 0)]).unwrap();
        assert_eq!(net.chain_head(), Err(NetworkError::NoChainHead));
    }

    #[test]
    fn star_leader_detected() {
        let net = NetworkManager::new(&[(0, 1), (0, 2), (0, 3)]).unwrap();
        assert_eq!(net.leader(), Ok(A));
    }

    #[test]
    fn intercept_splices_eavesdropper_into_edge() {
        let mut net = NetworkManager::new(&[(0, 1), (1, 2)]).unwrap();
        let eves = net.intercept_edges(&[(B, C)]).unwrap();
        assert_eq!(eves, vec![PartyId(3)]);

        let eve = net.party(PartyId(3)).unwrap();
        assert!(eve.is_eavesdropper());
        assert_eq!(eve.rx_action(B).and_then(|a| a.forward_to), Some(C));

        // Legitimate topology is untouched.
        assert_eq!(net.get_successors(B), vec![C]);
        assert_eq!(net.get_legitimate_party_uids(), vec![A, B, C]);

        let snapshots = net.channel_snapshots();
        assert_eq!(snapshots.len(), 3);
        assert!(snapshots.iter().any(|s| s.tx == B && s.rx == PartyId(3) && s.intercepted));
        assert!(snapshots.iter().any(|s| s.tx == PartyId(3) && s.rx == C && !s.intercepted));
    }

    #[test]
    fn intercepting_unknown_edge_fails() {
        let mut net = NetworkManager::new(&[(0, 1)]).unwrap();
        assert_eq!(
            net.intercept_edges(&[(B, A)]),
            Err(NetworkError::UnknownEdge(B, A))
        );
    }

    #[test]
    fn eavesdropper_is_transparent_to_receiver() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut net = NetworkManager::new(&[(0, 1)]).unwrap();
        let eve = net.intercept_edges(&[(A, B)]).unwrap()[0];

        net.party_mut(B).unwrap().set_basis(A, Basis::Standard);
        net.party_mut(eve).unwrap().set_basis(A, Basis::Standard);
        net.send_state(A, 1, Basis::Standard, B, &mut rng).unwrap();

        assert_eq!(net.party(B).unwrap().rx_bits().get(0, A), Some(&1));
        assert_eq!(net.party(eve).unwrap().rx_bits().get(0, A), Some(&1));
        assert_eq!(net.party(eve).unwrap().tx_bits().get(0, B), Some(&1));

        let counts = net.calculate_qubit_counts();
        assert_eq!(counts, QubitCounts { generated: 1, transmitted: 2, received: 2 });
    }

    #[test]
    fn chain_relays_measured_state() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut net = NetworkManager::new(&[(0, 1), (1, 2)]).unwrap();
        net.party_mut(B).unwrap().set_basis(A, Basis::Hadamard);
        net.party_mut(B).unwrap().forward(A, C);
        net.party_mut(C).unwrap().set_basis(B, Basis::Hadamard);

        net.send_state(A, 0, Basis::Hadamard, B, &mut rng).unwrap();

        assert_eq!(net.party(C).unwrap().rx_bits().get(0, B), Some(&0));
        assert_eq!(net.party(B).unwrap().tx_bits().get(0, C), Some(&0));
    }

    #[test]
    fn sending_without_route_fails() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut net = NetworkManager::new(&[(0, 1)]).unwrap();
        assert_eq!(
            net.send_state(B, 0, Basis::Standard, A, &mut rng),
            Err(NetworkError::NoRoute { from: B, to: A })
        );
    }
}

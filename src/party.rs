//! Protocol participants and their key ledgers.

use crate::channels::{ClassicalChannel, Message, MessageKind, Payload};
use crate::errors::PartyError;
use crate::{Basis, QuantumState, TimestepLedger};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Network-wide party identifier.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PartyId(pub usize);

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A classical bit value, 0 or 1.
pub type Bit = u8;

/// What a party does with the next state arriving from a given sender.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RxAction {
    /// Basis to measure with; consumed by the measurement.
    pub basis: Option<Basis>,
    /// Party to retransmit the (possibly measured) state to.
    pub forward_to: Option<PartyId>,
}

/// A state leaving a party towards `target`.
#[derive(Clone, Debug, PartialEq)]
pub struct Transmission {
    pub target: PartyId,
    pub state: QuantumState,
}

#[derive(Clone, Debug)]
pub struct Party {
    uid: PartyId,
    name: String,
    is_eavesdropper: bool,
    timestep: usize,
    rx_actions: BTreeMap<PartyId, RxAction>,

    tx_bits: TimestepLedger<Bit>,
    rx_bits: TimestepLedger<Bit>,
    tx_bases: TimestepLedger<Basis>,
    rx_bases: TimestepLedger<Basis>,
    sifted_keys: TimestepLedger<Bit>,
    check_bits: TimestepLedger<Bit>,
    secret_keys: TimestepLedger<Bit>,
    compromised_chls: BTreeSet<PartyId>,

    total_qstates_generated: usize,
    total_qstates_transmitted: usize,
    total_qstates_received: usize,
}

/// Deep copy of a party's records at one point in time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PartySnapshot {
    pub uid: PartyId,
    pub name: String,
    pub is_eavesdropper: bool,
    pub timestep: usize,
    pub tx_bits: TimestepLedger<Bit>,
    pub rx_bits: TimestepLedger<Bit>,
    pub tx_bases: TimestepLedger<Basis>,
    pub rx_bases: TimestepLedger<Basis>,
    pub sifted_keys: TimestepLedger<Bit>,
    pub check_bits: TimestepLedger<Bit>,
    pub secret_keys: TimestepLedger<Bit>,
    pub compromised_chls: BTreeSet<PartyId>,
    pub total_qstates_generated: usize,
    pub total_qstates_transmitted: usize,
    pub total_qstates_received: usize,
}

/// Names parties A, B, C, D, F, ... leaving E for eavesdroppers.
pub fn party_name(uid: PartyId) -> String {
    const NAMES: &[u8] = b"ABCDFGHIJKLMNOPQRSTUVWXYZ";
    NAMES
        .get(uid.0)
        .map(|&c| char::from(c).to_string())
        .unwrap_or_else(|| format!("P{}", uid.0))
}

impl Party {
    pub fn new(uid: PartyId, name: impl Into<String>) -> Self {
        Self {
            uid,
            name: name.into(),
            is_eavesdropper: false,
            timestep: 0,
            rx_actions: BTreeMap::new(),
            tx_bits: TimestepLedger::new(),
            rx_bits: TimestepLedger::new(),
            tx_bases: TimestepLedger::new(),
            rx_bases: TimestepLedger::new(),
            sifted_keys: TimestepLedger::new(),
            check_bits: TimestepLedger::new(),
            secret_keys: TimestepLedger::new(),
            compromised_chls: BTreeSet::new(),
            total_qstates_generated: 0,
            total_qstates_transmitted: 0,
            total_qstates_received: 0,
        }
    }

    /// An intercept-resend eavesdropper, named `E`.
    pub fn eavesdropper(uid: PartyId) -> Self {
        let mut eve = Self::new(uid, "E");
        eve.is_eavesdropper = true;
        eve
    }

    /// Restores the party to its configuration at timestep 0.
    ///
    /// Forwarding rules are part of the topology and survive a reset.
    pub fn reset(&mut self) {
        self.timestep = 0;
        for action in self.rx_actions.values_mut() {
            action.basis = None;
        }
        self.tx_bits.clear();
        self.rx_bits.clear();
        self.tx_bases.clear();
        self.rx_bases.clear();
        self.sifted_keys.clear();
        self.check_bits.clear();
        self.secret_keys.clear();
        self.compromised_chls.clear();
        self.total_qstates_generated = 0;
        self.total_qstates_transmitted = 0;
        self.total_qstates_received = 0;
    }

    pub fn uid(&self) -> PartyId {
        self.uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_eavesdropper(&self) -> bool {
        self.is_eavesdropper
    }

    pub fn timestep(&self) -> usize {
        self.timestep
    }

    pub fn set_timestep(&mut self, timestep: usize) {
        self.timestep = timestep;
    }

    pub fn next_timestep(&mut self) {
        self.timestep += 1;
    }

    pub fn tx_bits(&self) -> &TimestepLedger<Bit> {
        &self.tx_bits
    }

    pub fn rx_bits(&self) -> &TimestepLedger<Bit> {
        &self.rx_bits
    }

    pub fn tx_bases(&self) -> &TimestepLedger<Basis> {
        &self.tx_bases
    }

    pub fn rx_bases(&self) -> &TimestepLedger<Basis> {
        &self.rx_bases
    }

    pub fn sifted_keys(&self) -> &TimestepLedger<Bit> {
        &self.sifted_keys
    }

    pub fn check_bits(&self) -> &TimestepLedger<Bit> {
        &self.check_bits
    }

    pub fn secret_keys(&self) -> &TimestepLedger<Bit> {
        &self.secret_keys
    }

    /// Secret key shared with `peer`, earliest bit first.
    pub fn secret_key(&self, peer: PartyId) -> Vec<Bit> {
        self.secret_keys.peer_values(peer)
    }

    pub fn compromised_chls(&self) -> &BTreeSet<PartyId> {
        &self.compromised_chls
    }

    pub fn total_qstates_generated(&self) -> usize {
        self.total_qstates_generated
    }

    pub fn total_qstates_transmitted(&self) -> usize {
        self.total_qstates_transmitted
    }

    pub fn total_qstates_received(&self) -> usize {
        self.total_qstates_received
    }

    pub fn rx_action(&self, source: PartyId) -> Option<&RxAction> {
        self.rx_actions.get(&source)
    }

    // ------------------------------------------------------------------
    // Quantum transmission
    // ------------------------------------------------------------------

    pub fn random_bit<R: Rng + ?Sized>(rng: &mut R) -> Bit {
        Bit::from(rng.random_bool(0.5))
    }

    /// Prepares the eigenvector of `basis` for eigenvalue `bit`.
    pub fn generate_state(&mut self, bit: Bit, basis: Basis) -> Result<QuantumState, PartyError> {
        let state = QuantumState::new(basis.eigenvector(bit))?;
        self.total_qstates_generated += 1;
        Ok(state)
    }

    /// Encodes `bit` in `basis`, records the leg, and hands the state over
    /// for transmission to `target`.
    pub fn send_state(
        &mut self,
        bit: Bit,
        basis: Basis,
        target: PartyId,
    ) -> Result<Transmission, PartyError> {
        let state = self.generate_state(bit, basis)?;
        self.tx_bits.insert(self.timestep, target, bit);
        self.tx_bases.insert(self.timestep, target, basis);
        self.total_qstates_transmitted += 1;

        Ok(Transmission { target, state })
    }

    /// Measure the next state from `source` with respect to `basis`.
    pub fn set_basis(&mut self, source: PartyId, basis: Basis) {
        self.rx_actions.entry(source).or_default().basis = Some(basis);
    }

    /// Retransmit states arriving from `source` to `target`.
    pub fn forward(&mut self, source: PartyId, target: PartyId) {
        self.rx_actions.entry(source).or_default().forward_to = Some(target);
    }

    /// Handles a state arriving from `source` according to the armed action.
    ///
    /// Returns the onward transmission when the party forwards.
    pub fn receive<R: Rng + ?Sized>(
        &mut self,
        mut state: QuantumState,
        source: PartyId,
        rng: &mut R,
    ) -> Result<Option<Transmission>, PartyError> {
        let unarmed = PartyError::UnarmedMeasurement {
            party: self.uid,
            sender: source,
        };
        let action = self.rx_actions.get_mut(&source).ok_or(unarmed.clone())?;
        let basis = action.basis.take();
        let forward_to = action.forward_to;

        if basis.is_none() && forward_to.is_none() {
            return Err(unarmed);
        }

        self.total_qstates_received += 1;

        let measured = match basis {
            Some(basis) => {
                let result = state.measure(&basis.operator(), rng)?;
                let bit = Bit::try_from(result.value)
                    .ok()
                    .filter(|b| *b <= 1)
                    .ok_or(PartyError::NonBinaryOutcome(result.value))?;
                self.rx_bits.insert(self.timestep, source, bit);
                self.rx_bases.insert(self.timestep, source, basis);
                Some((bit, basis))
            }
            None => None,
        };

        let Some(target) = forward_to else {
            return Ok(None);
        };

        if let Some((bit, basis)) = measured {
            self.tx_bits.insert(self.timestep, target, bit);
            self.tx_bases.insert(self.timestep, target, basis);
        }
        self.total_qstates_transmitted += 1;

        Ok(Some(Transmission { target, state }))
    }

    // ------------------------------------------------------------------
    // Basis announcement and sifting
    // ------------------------------------------------------------------

    pub fn broadcast_tx_bases(&self, cchl: &mut ClassicalChannel) {
        let bases = self.tx_bases.at(self.timestep).cloned().unwrap_or_default();
        cchl.post(self.uid, Message::new(self.timestep, Payload::TxBases(bases)));
    }

    pub fn broadcast_rx_bases(&self, cchl: &mut ClassicalChannel) {
        let bases = self.rx_bases.at(self.timestep).cloned().unwrap_or_default();
        cchl.post(self.uid, Message::new(self.timestep, Payload::RxBases(bases)));
    }

    /// This timestep's bit on the leg with `peer`; a transmitted bit takes
    /// precedence over a received one.
    fn current_bit(&self, peer: PartyId) -> Option<Bit> {
        self.tx_bits
            .get(self.timestep, peer)
            .or_else(|| self.rx_bits.get(self.timestep, peer))
            .copied()
    }

    pub fn add_bit_to_keys(&mut self, peer: PartyId) {
        if let Some(bit) = self.current_bit(peer) {
            self.sifted_keys.insert(self.timestep, peer, bit);
        }
        self.synch_sifted_and_secret_keys();
    }

    pub fn add_all_bits_to_keys(&mut self) {
        let peers: BTreeSet<PartyId> = self
            .rx_bits
            .at(self.timestep)
            .into_iter()
            .chain(self.tx_bits.at(self.timestep))
            .flat_map(|m| m.keys().copied())
            .collect();

        for peer in peers {
            if let Some(bit) = self.current_bit(peer) {
                self.sifted_keys.insert(self.timestep, peer, bit);
            }
        }
        self.synch_sifted_and_secret_keys();
    }

    pub fn synch_sifted_and_secret_keys(&mut self) {
        self.secret_keys = self.sifted_keys.clone();
    }

    // ------------------------------------------------------------------
    // Check bits
    // ------------------------------------------------------------------

    pub fn add_check_bit(&mut self, peer: PartyId) {
        if let Some(&bit) = self.sifted_keys.get(self.timestep, peer) {
            self.check_bits.insert(self.timestep, peer, bit);
        }
    }

    pub fn remove_check_bits_from_secret_keys(&mut self) {
        let used: Vec<(usize, PartyId)> = self.check_bits.iter().map(|(t, p, _)| (t, p)).collect();
        for (t, peer) in used {
            self.secret_keys.remove(t, peer);
        }
    }

    pub fn broadcast_check_bits(&self, cchl: &mut ClassicalChannel) {
        cchl.post(
            self.uid,
            Message::new(self.timestep, Payload::CheckBits(self.check_bits.clone())),
        );
    }

    /// Compares `peer`'s published check bits with our own for that leg.
    ///
    /// Returns `true` if the channel with `peer` is compromised.
    pub fn receive_check_bits(&mut self, peer: PartyId, cchl: &ClassicalChannel) -> bool {
        let Some(Payload::CheckBits(theirs)) = cchl.get(self.timestep, peer, MessageKind::CheckBits)
        else {
            return self.compromised_chls.contains(&peer);
        };

        let theirs = theirs.by_peer().remove(&self.uid).unwrap_or_default();
        let ours = self.check_bits.by_peer().remove(&peer).unwrap_or_default();

        let mismatch = ours
            .iter()
            .any(|(t, bit)| theirs.get(t).is_some_and(|other| other != bit));

        if mismatch {
            tracing::debug!(party = %self.name, %peer, "check bit mismatch");
            self.compromised_chls.insert(peer);
        }
        self.compromised_chls.contains(&peer)
    }

    // ------------------------------------------------------------------
    // Multi-hop reconciliation
    // ------------------------------------------------------------------

    /// Positional flip masks that turn every other leg's secret key into
    /// the one shared with `comparison`.
    pub fn generate_flip_bit_instructions(&self, comparison: PartyId) -> BTreeMap<PartyId, Vec<bool>> {
        let reference = self.secret_key(comparison);

        self.secret_keys
            .peers()
            .into_iter()
            .filter(|&peer| peer != comparison)
            .map(|peer| {
                let mask = self
                    .secret_key(peer)
                    .iter()
                    .zip(&reference)
                    .map(|(a, b)| a != b)
                    .collect();
                (peer, mask)
            })
            .collect()
    }

    /// Publishes flip masks relative to the `comparison` leg and applies them
    /// to our own side of each leg.
    pub fn broadcast_flip_bit_instructions(&mut self, comparison: PartyId, cchl: &mut ClassicalChannel) {
        let instructions = self.generate_flip_bit_instructions(comparison);
        for (peer, mask) in &instructions {
            self.flip_bits_of_secret_keys(*peer, mask);
        }
        cchl.post(
            self.uid,
            Message::new(self.timestep, Payload::FlipBitInstructions(instructions)),
        );
    }

    /// Applies the mask `authority` published for us, if any.
    pub fn receive_flip_bit_instructions(&mut self, authority: PartyId, cchl: &ClassicalChannel) {
        let mask = match cchl.get(self.timestep, authority, MessageKind::FlipBitInstructions) {
            Some(Payload::FlipBitInstructions(map)) => map.get(&self.uid).cloned(),
            _ => None,
        };
        if let Some(mask) = mask {
            self.flip_bits_of_secret_keys(authority, &mask);
        }
    }

    /// XORs the secret key shared with `peer` with `mask`, position by position.
    pub fn flip_bits_of_secret_keys(&mut self, peer: PartyId, mask: &[bool]) {
        for (bit, &flip) in self.secret_keys.for_peer_mut(peer).zip(mask) {
            if flip {
                *bit ^= 1;
            }
        }
    }

    /// Length of the shortest secret key across `legs`.
    ///
    /// A leg with no secret bits yet counts as length 0.
    pub fn get_minimum_key_length(&self, legs: &[PartyId]) -> usize {
        legs.iter()
            .map(|&peer| self.secret_keys.peer_len(peer))
            .min()
            .unwrap_or(0)
    }

    /// Publishes the minimum key length over `legs` and returns it.
    pub fn broadcast_key_length(&self, legs: &[PartyId], cchl: &mut ClassicalChannel) -> usize {
        let length = self.get_minimum_key_length(legs);
        cchl.post(self.uid, Message::new(self.timestep, Payload::KeyLength(length)));
        length
    }

    /// Truncates the leg with `authority` to the length it published.
    pub fn receive_msg_key_length(&mut self, authority: PartyId, cchl: &ClassicalChannel) -> Option<usize> {
        match cchl.get(self.timestep, authority, MessageKind::KeyLength) {
            Some(&Payload::KeyLength(length)) => {
                self.truncate_secret_keys(length, Some(authority));
                Some(length)
            }
            _ => None,
        }
    }

    /// Keeps the `length` earliest bits of the key with `peer`, or of every
    /// key when `peer` is `None`.
    pub fn truncate_secret_keys(&mut self, length: usize, peer: Option<PartyId>) {
        let peers = match peer {
            Some(peer) => vec![peer],
            None => self.secret_keys.peers().into_iter().collect(),
        };
        for peer in peers {
            self.secret_keys.truncate_peer(peer, length);
        }
    }

    pub fn snapshot(&self) -> PartySnapshot {
        PartySnapshot {
            uid: self.uid,
            name: self.name.clone(),
            is_eavesdropper: self.is_eavesdropper,
            timestep: self.timestep,
            tx_bits: self.tx_bits.clone(),
            rx_bits: self.rx_bits.clone(),
            tx_bases: self.tx_bases.clone(),
            rx_bases: self.rx_bases.clone(),
            sifted_keys: self.sifted_keys.clone(),
            check_bits: self.check_bits.clone(),
            secret_keys: self.secret_keys.clone(),
            compromised_chls: self.compromised_chls.clone(),
            total_qstates_generated: self.total_qstates_generated,
            total_qstates_transmitted: self.total_qstates_transmitted,
            total_qstates_received: self.total_qstates_received,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const ALICE: PartyId = PartyId(0);
    const BOB: PartyId = PartyId(1);
    const CHARLIE: PartyId = PartyId(2);

    fn sifted(party: &mut Party, peer: PartyId, bits: &[Bit]) {
        for &bit in bits {
            party.sifted_keys.insert(party.timestep, peer, bit);
            party.next_timestep();
        }
        party.synch_sifted_and_secret_keys();
    }

    #[test]
    fn names_skip_e() {
        assert_eq!(party_name(PartyId(0)), "A");
        assert_eq!(party_name(PartyId(3)), "D");
        assert_eq!(party_name(PartyId(4)), "F");
        assert_eq!(party_name(PartyId(30)), "P30");
    }

    #[test]
    fn receiving_without_armed_basis_fails() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut bob = Party::new(BOB, "B");
        let state = QuantumState::new(Basis::Standard.eigenvector(0)).unwrap();
        assert_eq!(
            bob.receive(state, ALICE, &mut rng),
            Err(PartyError::UnarmedMeasurement {
                party: BOB,
                sender: ALICE
            })
        );
    }

    #[test]
    fn armed_basis_is_consumed() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut alice = Party::new(ALICE, "A");
        let mut bob = Party::new(BOB, "B");
        bob.set_basis(ALICE, Basis::Standard);

        let tx = alice.send_state(1, Basis::Standard, BOB).unwrap();
        assert_eq!(bob.receive(tx.state, ALICE, &mut rng), Ok(None));
        assert_eq!(bob.rx_bits().get(0, ALICE), Some(&1));
        assert_eq!(bob.rx_bases().get(0, ALICE), Some(&Basis::Standard));

        let tx = alice.send_state(1, Basis::Standard, BOB).unwrap();
        assert!(bob.receive(tx.state, ALICE, &mut rng).is_err());
    }

    #[test]
    fn measure_then_forward_records_both_legs() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut bob = Party::new(BOB, "B");
        bob.set_basis(ALICE, Basis::Hadamard);
        bob.forward(ALICE, CHARLIE);

        let state = QuantumState::new(Basis::Hadamard.eigenvector(1)).unwrap();
        let out = bob.receive(state, ALICE, &mut rng).unwrap().unwrap();

        assert_eq!(out.target, CHARLIE);
        assert_eq!(bob.rx_bits().get(0, ALICE), Some(&1));
        assert_eq!(bob.tx_bits().get(0, CHARLIE), Some(&1));
        assert_eq!(bob.tx_bases().get(0, CHARLIE), Some(&Basis::Hadamard));
        assert_eq!(bob.total_qstates_received(), 1);
        assert_eq!(bob.total_qstates_transmitted(), 1);
    }

    #[test]
    fn forward_without_measuring_records_no_bit() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut relay = Party::new(BOB, "B");
        relay.forward(ALICE, CHARLIE);

        let state = QuantumState::new(Basis::Hadamard.eigenvector(0)).unwrap();
        let out = relay.receive(state.clone(), ALICE, &mut rng).unwrap().unwrap();

        assert_eq!(out.state, state);
        assert!(relay.tx_bits().is_empty());
        assert!(relay.rx_bits().is_empty());
    }

    #[test]
    fn transmitted_bit_takes_precedence_when_sifting() {
        let mut bob = Party::new(BOB, "B");
        bob.rx_bits.insert(0, ALICE, 0);
        bob.tx_bits.insert(0, ALICE, 1);
        bob.add_all_bits_to_keys();
        assert_eq!(bob.sifted_keys().get(0, ALICE), Some(&1));
        assert_eq!(bob.secret_keys(), bob.sifted_keys());
    }

    #[test]
    fn check_bits_are_removed_from_secret_key_only() {
        let mut alice = Party::new(ALICE, "A");
        alice.tx_bits.insert(0, BOB, 1);
        alice.add_bit_to_keys(BOB);
        alice.add_check_bit(BOB);
        alice.remove_check_bits_from_secret_keys();

        assert_eq!(alice.sifted_keys().get(0, BOB), Some(&1));
        assert_eq!(alice.check_bits().get(0, BOB), Some(&1));
        assert!(alice.secret_keys().is_empty());
    }

    #[test]
    fn add_check_bit_ignores_unsifted_round() {
        let mut alice = Party::new(ALICE, "A");
        alice.add_check_bit(BOB);
        assert!(alice.check_bits().is_empty());
    }

    #[test]
    fn mismatching_check_bits_flag_channel() {
        let mut cchl = ClassicalChannel::new();
        let mut alice = Party::new(ALICE, "A");
        let mut bob = Party::new(BOB, "B");
        alice.sifted_keys.insert(0, BOB, 0);
        bob.sifted_keys.insert(0, ALICE, 1);
        alice.add_check_bit(BOB);
        bob.add_check_bit(ALICE);

        alice.broadcast_check_bits(&mut cchl);
        bob.broadcast_check_bits(&mut cchl);

        assert!(bob.receive_check_bits(ALICE, &cchl));
        assert!(alice.receive_check_bits(BOB, &cchl));
        assert!(alice.compromised_chls().contains(&BOB));
    }

    #[test]
    fn matching_check_bits_leave_channel_clean() {
        let mut cchl = ClassicalChannel::new();
        let mut alice = Party::new(ALICE, "A");
        let mut bob = Party::new(BOB, "B");
        alice.sifted_keys.insert(0, BOB, 1);
        bob.sifted_keys.insert(0, ALICE, 1);
        alice.add_check_bit(BOB);
        bob.add_check_bit(ALICE);
        alice.broadcast_check_bits(&mut cchl);

        assert!(!bob.receive_check_bits(ALICE, &cchl));
        // Nothing published by Bob yet: nothing to compare.
        assert!(!alice.receive_check_bits(BOB, &cchl));
        assert!(alice.compromised_chls().is_empty());
    }

    #[test]
    fn flip_instructions_align_keys_with_reference_leg() {
        let mut cchl = ClassicalChannel::new();
        let mut leader = Party::new(ALICE, "A");
        let mut bob = Party::new(BOB, "B");
        let mut charlie = Party::new(CHARLIE, "C");

        sifted(&mut leader, BOB, &[1, 0, 1, 1]);
        leader.timestep = 0;
        sifted(&mut leader, CHARLIE, &[0, 0, 1]);
        sifted(&mut bob, ALICE, &[1, 0, 1, 1]);
        sifted(&mut charlie, ALICE, &[0, 0, 1]);

        let masks = leader.generate_flip_bit_instructions(BOB);
        assert_eq!(masks[&CHARLIE], vec![true, false, false]);

        leader.broadcast_flip_bit_instructions(BOB, &mut cchl);
        charlie.timestep = leader.timestep;
        charlie.receive_flip_bit_instructions(ALICE, &cchl);

        assert_eq!(leader.secret_key(CHARLIE), vec![1, 0, 1]);
        assert_eq!(charlie.secret_key(ALICE), vec![1, 0, 1]);

        let length = leader.broadcast_key_length(&[BOB, CHARLIE], &mut cchl);
        assert_eq!(length, 3);
        leader.truncate_secret_keys(length, None);
        bob.timestep = leader.timestep;
        assert_eq!(bob.receive_msg_key_length(ALICE, &cchl), Some(3));

        assert_eq!(leader.secret_key(BOB), vec![1, 0, 1]);
        assert_eq!(bob.secret_key(ALICE), vec![1, 0, 1]);
    }

    #[test]
    fn leg_without_secret_bits_counts_as_empty() {
        let mut cchl = ClassicalChannel::new();
        let mut leader = Party::new(ALICE, "A");
        sifted(&mut leader, BOB, &[1, 0]);

        assert_eq!(leader.get_minimum_key_length(&[BOB]), 2);
        assert_eq!(leader.get_minimum_key_length(&[BOB, CHARLIE]), 0);
        assert_eq!(leader.broadcast_key_length(&[BOB, CHARLIE], &mut cchl), 0);
        assert_eq!(
            cchl.get(leader.timestep(), ALICE, MessageKind::KeyLength),
            Some(&Payload::KeyLength(0))
        );
    }

    #[test]
    fn truncation_never_grows_a_key() {
        let mut alice = Party::new(ALICE, "A");
        sifted(&mut alice, BOB, &[1, 1]);
        alice.truncate_secret_keys(5, Some(BOB));
        assert_eq!(alice.secret_key(BOB).len(), 2);
        alice.truncate_secret_keys(1, Some(BOB));
        assert_eq!(alice.secret_key(BOB), vec![1]);
        assert_eq!(alice.sifted_keys().peer_len(BOB), 2);
    }

    #[test]
    fn reset_keeps_forwarding_rules() {
        let mut eve = Party::eavesdropper(PartyId(9));
        eve.forward(ALICE, BOB);
        eve.set_basis(ALICE, Basis::Standard);
        eve.next_timestep();
        eve.reset();

        assert_eq!(eve.timestep(), 0);
        assert_eq!(
            eve.rx_action(ALICE),
            Some(&RxAction {
                basis: None,
                forward_to: Some(BOB)
            })
        );
        assert!(eve.is_eavesdropper());
        assert_eq!(eve.name(), "E");
    }
}

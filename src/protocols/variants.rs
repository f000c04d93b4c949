//! Per-timestep algorithms for each protocol variant.

use crate::channels::ClassicalChannel;
use crate::config::{CheckBitPolicy, ProtocolVariant};
use crate::errors::{NetworkError, ProtocolError};
use crate::network::NetworkManager;
use crate::party::Party;
use crate::{Basis, PartyId};
use rand::Rng;
use rand::rngs::StdRng;

/// Everything one iteration may touch.
pub struct RoundContext<'a> {
    pub network: &'a mut NetworkManager,
    pub cchl: &'a mut ClassicalChannel,
    pub rng: &'a mut StdRng,
    pub check_policy: CheckBitPolicy,
}

impl RoundContext<'_> {
    pub fn timestep(&self) -> usize {
        self.network.timestep()
    }

    /// Decides whether this round's sifted bits are spent as check bits.
    pub fn is_check_round(&mut self) -> bool {
        match self.check_policy {
            CheckBitPolicy::Probability(p) => self.rng.random::<f64>() < p,
            CheckBitPolicy::Target(n) => self.network.get_shortest_check_bits() < n,
        }
    }

    fn party(&mut self, uid: PartyId) -> Result<&mut Party, NetworkError> {
        self.network.party_mut(uid)
    }

    /// Arms `uid` with a random basis for the next state from `source`.
    fn arm_random_basis(&mut self, uid: PartyId, source: PartyId) -> Result<(), NetworkError> {
        let basis = Basis::random(self.rng);
        self.network.party_mut(uid)?.set_basis(source, basis);
        Ok(())
    }

    /// Announces the preparation bases of `tx` and the measurement bases of
    /// every party in `rx`.
    fn broadcast_bases(&mut self, tx: PartyId, rx: &[PartyId]) -> Result<(), NetworkError> {
        self.network.party(tx)?.broadcast_tx_bases(self.cchl);
        for &uid in rx {
            self.network.party(uid)?.broadcast_rx_bases(self.cchl);
        }
        Ok(())
    }

    /// Whether `rx` measured the state from `tx` in the basis `tx` prepared it in.
    fn bases_match(&self, tx: PartyId, rx: PartyId) -> bool {
        let t = self.timestep();
        let prepared = self.cchl.get_tx_bases(t).get(&tx).and_then(|m| m.get(&rx).copied());
        let measured = self.cchl.get_rx_bases(t).get(&rx).and_then(|m| m.get(&tx).copied());
        prepared.is_some() && prepared == measured
    }

    fn eavesdroppers_on(&self, tx: PartyId, rx: PartyId) -> Vec<PartyId> {
        self.network
            .interceptions()
            .iter()
            .filter(|i| i.tx == tx && i.rx == rx)
            .map(|i| i.eve)
            .collect()
    }

    /// Eavesdroppers on a sifted link keep the bit on both of their legs.
    fn shadow_sift(&mut self, tx: PartyId, rx: PartyId) -> Result<(), NetworkError> {
        for eve in self.eavesdroppers_on(tx, rx) {
            let eve = self.party(eve)?;
            eve.add_bit_to_keys(tx);
            eve.add_bit_to_keys(rx);
        }
        Ok(())
    }

    /// Both ends of a link spend this round's bit as a check bit.
    fn add_check_bits(&mut self, tx: PartyId, rx: PartyId) -> Result<(), NetworkError> {
        self.party(tx)?.add_check_bit(rx);
        self.party(rx)?.add_check_bit(tx);
        for eve in self.eavesdroppers_on(tx, rx) {
            let eve = self.party(eve)?;
            eve.add_check_bit(tx);
            eve.add_check_bit(rx);
        }
        Ok(())
    }

    /// `a` publishes its check bits for `b` to compare, then the other way round.
    fn cross_validate(&mut self, a: PartyId, b: PartyId) -> Result<bool, NetworkError> {
        self.network.party(a)?.broadcast_check_bits(self.cchl);
        let b_detected = self.network.party_mut(b)?.receive_check_bits(a, self.cchl);
        self.network.party(b)?.broadcast_check_bits(self.cchl);
        let a_detected = self.network.party_mut(a)?.receive_check_bits(b, self.cchl);
        Ok(a_detected || b_detected)
    }

    /// Rebuilds every secret key from its sifted key, minus check bits.
    fn rederive_secret_keys(&mut self) -> Result<(), NetworkError> {
        let uids: Vec<PartyId> = self.network.parties().map(Party::uid).collect();
        for uid in uids {
            let party = self.party(uid)?;
            party.synch_sifted_and_secret_keys();
            party.remove_check_bits_from_secret_keys();
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterationOutcome {
    Secure,
    EavesdroppingDetected,
}

pub trait ProtocolStrategy {
    /// Runs one timestep. An `Err` is a usage error; detected eavesdropping
    /// is reported through the outcome.
    fn run_iteration(&self, ctx: &mut RoundContext<'_>) -> Result<IterationOutcome, ProtocolError>;
}

/// Two-party BB84 between `alice` and `bob`.
#[derive(Clone, Debug, PartialEq)]
pub struct Bb84 {
    pub alice: PartyId,
    pub bob: PartyId,
}

impl ProtocolStrategy for Bb84 {
    fn run_iteration(&self, ctx: &mut RoundContext<'_>) -> Result<IterationOutcome, ProtocolError> {
        let (alice, bob) = (self.alice, self.bob);

        ctx.arm_random_basis(bob, alice)?;
        ctx.network.arm_eavesdroppers(ctx.rng)?;

        let bit = Party::random_bit(ctx.rng);
        let basis = Basis::random(ctx.rng);
        ctx.network.send_state(alice, bit, basis, bob, ctx.rng)?;

        ctx.broadcast_bases(alice, &[bob])?;
        let matched = ctx.bases_match(alice, bob);
        tracing::debug!(timestep = ctx.timestep(), matched, "bb84 bases compared");

        if matched {
            ctx.party(alice)?.add_all_bits_to_keys();
            ctx.party(bob)?.add_all_bits_to_keys();
            ctx.shadow_sift(alice, bob)?;

            if ctx.is_check_round() {
                ctx.add_check_bits(alice, bob)?;
                if ctx.cross_validate(alice, bob)? {
                    return Ok(IterationOutcome::EavesdroppingDetected);
                }
            }
        }

        ctx.rederive_secret_keys()?;
        Ok(IterationOutcome::Secure)
    }
}

/// BB84 relayed along a path: every party after the head measures the state
/// and forwards it to its successor.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainedBb84 {
    pub order: Vec<PartyId>,
}

impl ChainedBb84 {
    /// Aligns every leg's key with the head's and propagates the key length
    /// down the chain.
    ///
    /// Every leg of a path sifts on the same rounds, so one forward sweep is
    /// enough for all legs to agree.
    fn reconcile(&self, ctx: &mut RoundContext<'_>) -> Result<(), NetworkError> {
        for window in self.order.windows(3) {
            let [prev, mid, next] = [window[0], window[1], window[2]];
            ctx.network
                .party_mut(mid)?
                .broadcast_flip_bit_instructions(prev, ctx.cchl);
            ctx.network
                .party_mut(next)?
                .receive_flip_bit_instructions(mid, ctx.cchl);
        }

        let Some((&head, rest)) = self.order.split_first() else {
            return Ok(());
        };
        let length = ctx
            .network
            .party(head)?
            .broadcast_key_length(self.order.get(1..2).unwrap_or(&[]), ctx.cchl);
        ctx.party(head)?.truncate_secret_keys(length, None);

        let mut prev = head;
        for (i, &uid) in rest.iter().enumerate() {
            let party = ctx.network.party_mut(uid)?;
            let received = party.receive_msg_key_length(prev, ctx.cchl).unwrap_or(length);
            if let Some(&next) = rest.get(i + 1) {
                party.truncate_secret_keys(received, None);
                let own = party.broadcast_key_length(&[prev, next], ctx.cchl);
                party.truncate_secret_keys(own, None);
            }
            prev = uid;
        }
        Ok(())
    }
}

impl ProtocolStrategy for ChainedBb84 {
    fn run_iteration(&self, ctx: &mut RoundContext<'_>) -> Result<IterationOutcome, ProtocolError> {
        let [head, first, ..] = self.order[..] else {
            return Err(NetworkError::NoChainHead.into());
        };

        for (i, pair) in self.order.windows(2).enumerate() {
            let (prev, uid) = (pair[0], pair[1]);
            ctx.arm_random_basis(uid, prev)?;
            if let Some(&next) = self.order.get(i + 2) {
                ctx.party(uid)?.forward(prev, next);
            }
        }
        ctx.network.arm_eavesdroppers(ctx.rng)?;

        let bit = Party::random_bit(ctx.rng);
        let basis = Basis::random(ctx.rng);
        ctx.network.send_state(head, bit, basis, first, ctx.rng)?;

        ctx.broadcast_bases(head, &self.order[1..])?;

        // Every receiver must have used the head's basis.
        let t = ctx.timestep();
        let rx_bases = ctx.cchl.get_rx_bases(t);
        let matched = self.order.windows(2).all(|pair| {
            rx_bases
                .get(&pair[1])
                .and_then(|m| m.get(&pair[0]))
                .is_some_and(|&b| b == basis)
        });
        tracing::debug!(timestep = t, matched, "chained bases compared");

        if matched {
            for &uid in &self.order {
                ctx.party(uid)?.add_all_bits_to_keys();
            }
            for pair in self.order.windows(2) {
                ctx.shadow_sift(pair[0], pair[1])?;
            }

            if ctx.is_check_round() {
                for pair in self.order.windows(2) {
                    ctx.add_check_bits(pair[0], pair[1])?;
                }
                let mut detected = false;
                for pair in self.order.windows(2) {
                    detected |= ctx.cross_validate(pair[0], pair[1])?;
                }
                if detected {
                    return Ok(IterationOutcome::EavesdroppingDetected);
                }
            }
        }

        ctx.rederive_secret_keys()?;
        self.reconcile(ctx)?;
        Ok(IterationOutcome::Secure)
    }
}

/// How the star leader prepares states for its branches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StarMode {
    /// One bit and basis for every branch; the round sifts only if every
    /// branch matched.
    SharedState,
    /// Independent bit and basis per branch; branches sift independently.
    IndependentStates,
}

/// Star-graph protocols: the leader transmits to every other party.
#[derive(Clone, Debug, PartialEq)]
pub struct StarGraph {
    pub leader: PartyId,
    pub branches: Vec<PartyId>,
    pub mode: StarMode,
}

impl StarGraph {
    /// The leader aligns every branch key with the first branch's, then
    /// everyone truncates to the leader's shortest key. A branch that has
    /// not sifted anything yet holds everyone at length 0.
    fn reconcile(&self, ctx: &mut RoundContext<'_>) -> Result<(), NetworkError> {
        let Some(&reference) = self.branches.first() else {
            return Ok(());
        };

        ctx.network
            .party_mut(self.leader)?
            .broadcast_flip_bit_instructions(reference, ctx.cchl);
        for &uid in &self.branches {
            ctx.network
                .party_mut(uid)?
                .receive_flip_bit_instructions(self.leader, ctx.cchl);
        }

        let leader = ctx.network.party_mut(self.leader)?;
        let length = leader.broadcast_key_length(&self.branches, ctx.cchl);
        leader.truncate_secret_keys(length, None);
        for &uid in &self.branches {
            ctx.network
                .party_mut(uid)?
                .receive_msg_key_length(self.leader, ctx.cchl);
        }
        Ok(())
    }

    fn transmit(&self, ctx: &mut RoundContext<'_>) -> Result<(), NetworkError> {
        let shared = (Party::random_bit(ctx.rng), Basis::random(ctx.rng));
        for &uid in &self.branches {
            let (bit, basis) = match self.mode {
                StarMode::SharedState => shared,
                StarMode::IndependentStates => (Party::random_bit(ctx.rng), Basis::random(ctx.rng)),
            };
            ctx.network.send_state(self.leader, bit, basis, uid, ctx.rng)?;
        }
        Ok(())
    }
}

impl ProtocolStrategy for StarGraph {
    fn run_iteration(&self, ctx: &mut RoundContext<'_>) -> Result<IterationOutcome, ProtocolError> {
        let leader = self.leader;

        for &uid in &self.branches {
            ctx.arm_random_basis(uid, leader)?;
        }
        ctx.network.arm_eavesdroppers(ctx.rng)?;

        self.transmit(ctx)?;
        ctx.broadcast_bases(leader, &self.branches)?;

        let matching: Vec<PartyId> = self
            .branches
            .iter()
            .copied()
            .filter(|&uid| ctx.bases_match(leader, uid))
            .collect();
        let accepted = match self.mode {
            StarMode::SharedState if matching.len() < self.branches.len() => Vec::new(),
            _ => matching,
        };
        tracing::debug!(
            timestep = ctx.timestep(),
            accepted = accepted.len(),
            branches = self.branches.len(),
            "star bases compared"
        );

        if !accepted.is_empty() {
            for &uid in &accepted {
                ctx.party(leader)?.add_bit_to_keys(uid);
                ctx.party(uid)?.add_bit_to_keys(leader);
                ctx.shadow_sift(leader, uid)?;
            }

            if ctx.is_check_round() {
                for &uid in &accepted {
                    ctx.add_check_bits(leader, uid)?;
                }
                let mut detected = false;
                for &uid in &accepted {
                    detected |= ctx.cross_validate(leader, uid)?;
                }
                if detected {
                    return Ok(IterationOutcome::EavesdroppingDetected);
                }
            }
        }

        ctx.rederive_secret_keys()?;
        self.reconcile(ctx)?;
        Ok(IterationOutcome::Secure)
    }
}

/// Variant algorithm, resolved once against the network topology.
#[derive(Clone, Debug, PartialEq)]
pub enum Strategy {
    Bb84(Bb84),
    Chained(ChainedBb84),
    Star(StarGraph),
}

impl Strategy {
    pub fn resolve(variant: ProtocolVariant, network: &NetworkManager) -> Result<Self, NetworkError> {
        Ok(match variant {
            ProtocolVariant::Bb84 => {
                let alice = network.chain_head()?;
                let bob = network
                    .get_successors(alice)
                    .first()
                    .copied()
                    .ok_or(NetworkError::NoChainHead)?;
                Strategy::Bb84(Bb84 { alice, bob })
            }
            ProtocolVariant::ChainedBb84 => {
                let order = network.chain_order()?;
                // The path must visit every legitimate party.
                if order.len() < 2 || order.len() != network.get_legitimate_party_uids().len() {
                    return Err(NetworkError::NoChainHead);
                }
                Strategy::Chained(ChainedBb84 { order })
            }
            ProtocolVariant::StarProtocol1 | ProtocolVariant::StarProtocol2 => {
                let leader = network.leader()?;
                let mode = match variant {
                    ProtocolVariant::StarProtocol1 => StarMode::SharedState,
                    _ => StarMode::IndependentStates,
                };
                Strategy::Star(StarGraph {
                    leader,
                    branches: network.get_successors(leader),
                    mode,
                })
            }
        })
    }
}

impl ProtocolStrategy for Strategy {
    fn run_iteration(&self, ctx: &mut RoundContext<'_>) -> Result<IterationOutcome, ProtocolError> {
        match self {
            Strategy::Bb84(s) => s.run_iteration(ctx),
            Strategy::Chained(s) => s.run_iteration(ctx),
            Strategy::Star(s) => s.run_iteration(ctx),
        }
    }
}

//! QKD protocol engine.
//!
//! [`QkdProtocol`] owns the network, the classical channel and the random
//! number generator, and drives one of the variants in [`variants`]
//! iteration by iteration until the key is long enough, the requested
//! security level is reached, or eavesdropping is detected.

pub mod snapshot;
pub mod variants;

use crate::PartyId;
use crate::channels::ClassicalChannel;
use crate::config::{CheckBitPolicy, ProtocolConfig};
use crate::errors::{ConfigError, ProtocolError};
use crate::network::{NetworkManager, QubitCounts};
use crate::party::Party;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::collections::BTreeMap;

pub use snapshot::{ProtocolSnapshot, TimestepSnapshot};
pub use variants::{IterationOutcome, ProtocolStrategy, RoundContext, Strategy};

/// Tolerance of the binary search in [`supported_security`].
const SECURITY_TOLERANCE: f64 = 1e-4;

/// Chance that a single check bit exposes an intercept-resend attack is at
/// least 1/4, so Eve survives `n` check bits with probability at most 0.75^n.
const EVE_SURVIVAL_PER_CHECK_BIT: f64 = 0.75;

/// Minimum number of check bits needed to detect an intercept-resend
/// eavesdropper with confidence `security`.
///
/// Saturates at `usize::MAX` for `security >= 1`.
pub fn required_num_check_bits(security: f64) -> usize {
    if security >= 1.0 {
        return usize::MAX;
    }
    let n = ((1.0 - security).ln() / EVE_SURVIVAL_PER_CHECK_BIT.ln()).ceil();
    // Negative and NaN values saturate to 0.
    n as usize
}

/// Largest security level that `num_check_bits` check bits support, to
/// within [`SECURITY_TOLERANCE`].
pub fn supported_security(num_check_bits: usize) -> f64 {
    let mut security = 0.0;
    let mut upper_bound = 1.0;
    while upper_bound - security > SECURITY_TOLERANCE {
        let candidate = security + (upper_bound - security) / 2.0;
        if required_num_check_bits(candidate) > num_check_bits {
            upper_bound = candidate;
        } else {
            security = candidate;
        }
    }
    security
}

/// Summary returned by [`QkdProtocol::run`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RunReport {
    pub iterations: usize,
    pub protocol_secure: bool,
    pub security: f64,
    pub key_length: usize,
    pub qubits: QubitCounts,
}

pub struct QkdProtocol {
    config: ProtocolConfig,
    network: NetworkManager,
    cchl: ClassicalChannel,
    strategy: Strategy,
    rng: StdRng,
    check_policy: CheckBitPolicy,
    protocol_secure: bool,
    num_iterations: usize,
    security: f64,
    key_length: usize,
    stored_data: BTreeMap<usize, TimestepSnapshot>,
}

impl QkdProtocol {
    /// Builds the network described by `config`, splices in any configured
    /// eavesdroppers and resolves the variant against the topology.
    ///
    /// # Errors
    ///
    /// Invalid probabilities, an empty or single-node topology, or a
    /// topology without the chain head / star leader the variant needs.
    pub fn new(config: ProtocolConfig) -> Result<Self, ProtocolError> {
        config.validate()?;
        let edges = config.topology()?;
        let network = NetworkManager::new(&edges)?;
        let strategy = Strategy::resolve(config.variant, &network)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut protocol = Self {
            check_policy: config.check_bit_policy(),
            config,
            network,
            cchl: ClassicalChannel::new(),
            strategy,
            rng,
            protocol_secure: true,
            num_iterations: 0,
            security: 0.0,
            key_length: 0,
            stored_data: BTreeMap::new(),
        };

        if !protocol.config.intercepted_edges.is_empty() {
            let edges = protocol.config.intercepted_edges.clone();
            protocol.add_eavesdropping(&edges)?;
        }

        tracing::info!(
            variant = ?protocol.config.variant,
            parties = protocol.network.get_legitimate_party_uids().len(),
            links = protocol.network.links().len(),
            "qkd protocol configured"
        );
        Ok(protocol)
    }

    /// Restores the protocol to its state before the first iteration.
    ///
    /// Eavesdroppers stay in place. A seeded protocol replays the same run.
    pub fn reset(&mut self) {
        self.network.reset();
        self.cchl.reset();
        if let Some(seed) = self.config.seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.check_policy = self.config.check_bit_policy();
        self.protocol_secure = true;
        self.num_iterations = 0;
        self.security = 0.0;
        self.key_length = 0;
        self.stored_data.clear();
    }

    /// Splices an eavesdropper into each of `edges`.
    pub fn add_eavesdropping(&mut self, edges: &[(usize, usize)]) -> Result<Vec<PartyId>, ProtocolError> {
        let edges: Vec<(PartyId, PartyId)> = edges
            .iter()
            .map(|&(tx, rx)| (PartyId(tx), PartyId(rx)))
            .collect();
        let eves = self.network.intercept_edges(&edges)?;

        for &(tx, rx) in &edges {
            if !self.config.intercepted_edges.contains(&(tx.0, rx.0)) {
                self.config.intercepted_edges.push((tx.0, rx.0));
            }
        }
        Ok(eves)
    }

    /// Runs one iteration, unless eavesdropping was already detected.
    pub fn run_one_step(&mut self) -> Result<(), ProtocolError> {
        if !self.protocol_secure {
            return Ok(());
        }

        let outcome = {
            let mut ctx = RoundContext {
                network: &mut self.network,
                cchl: &mut self.cchl,
                rng: &mut self.rng,
                check_policy: self.check_policy,
            };
            self.strategy.run_iteration(&mut ctx)?
        };

        if outcome == IterationOutcome::EavesdroppingDetected {
            tracing::warn!(
                iteration = self.num_iterations,
                timestep = self.network.timestep(),
                "eavesdropping detected, aborting protocol"
            );
            self.protocol_secure = false;
        }

        self.update_security();
        self.update_key_length();
        self.store_timestep_data();

        // An aborted iteration keeps its snapshot but does not advance.
        if self.protocol_secure {
            self.network.next_timestep();
        }
        self.num_iterations += 1;

        tracing::debug!(
            iteration = self.num_iterations,
            key_length = self.key_length,
            security = self.security,
            "iteration complete"
        );
        Ok(())
    }

    /// Runs up to `n` iterations, stopping early if eavesdropping is detected.
    pub fn run_n_steps(&mut self, n: usize) -> Result<(), ProtocolError> {
        for _ in 0..n {
            if !self.protocol_secure {
                break;
            }
            self.run_one_step()?;
        }
        Ok(())
    }

    /// Runs the protocol.
    ///
    /// # Arguments
    ///
    /// * `num_iterations` - Exact number of iterations to run. With `None`
    ///   the protocol runs until every key holds `key_length` bits and every
    ///   leg has spent enough check bits to reach `security`.
    /// * `security` - Target confidence that no eavesdropper went unnoticed.
    /// * `key_length` - Target length of the shortest secret key.
    ///
    /// # Returns
    ///
    /// A [`RunReport`]; check `protocol_secure` before using the keys.
    pub fn run(
        &mut self,
        num_iterations: Option<usize>,
        security: f64,
        key_length: usize,
    ) -> Result<RunReport, ProtocolError> {
        match num_iterations {
            Some(n) => self.run_n_steps(n)?,
            None => {
                if !(0.0..1.0).contains(&security) {
                    return Err(ConfigError::InvalidSecurity(security).into());
                }
                let required = required_num_check_bits(security);

                let previous = self.check_policy;
                self.check_policy = CheckBitPolicy::Target(required);
                let result = self.run_until(required, key_length);
                self.check_policy = previous;
                result?;
            }
        }

        let report = self.report();
        tracing::info!(
            iterations = report.iterations,
            secure = report.protocol_secure,
            key_length = report.key_length,
            security = report.security,
            "qkd run finished"
        );
        Ok(report)
    }

    /// [`run`](Self::run) towards the security and key length in the config.
    pub fn run_to_target(&mut self) -> Result<RunReport, ProtocolError> {
        self.run(None, self.config.security, self.config.key_length)
    }

    fn run_until(&mut self, required_check_bits: usize, key_length: usize) -> Result<(), ProtocolError> {
        while self.protocol_secure
            && (self.get_shortest_key_length() < key_length
                || self.get_shortest_check_bits() < required_check_bits)
        {
            self.run_one_step()?;
        }
        Ok(())
    }

    pub fn update_security(&mut self) {
        self.security = supported_security(self.get_shortest_check_bits());
    }

    pub fn update_key_length(&mut self) {
        self.key_length = self.get_shortest_key_length();
    }

    pub fn get_shortest_key_length(&self) -> usize {
        self.network.get_shortest_key_length()
    }

    pub fn get_shortest_check_bits(&self) -> usize {
        self.network.get_shortest_check_bits()
    }

    pub fn calculate_qubit_counts(&self) -> QubitCounts {
        self.network.calculate_qubit_counts()
    }

    fn store_timestep_data(&mut self) {
        let timestep = self.network.timestep();
        let snapshot = TimestepSnapshot {
            protocol: ProtocolSnapshot {
                iteration: self.num_iterations,
                timestep,
                security: self.security,
                key_length: self.key_length,
                protocol_secure: self.protocol_secure,
            },
            channel: self.cchl.messages_at(timestep),
            parties: self.network.party_snapshots(),
            edges: self.network.channel_snapshots(),
        };
        self.stored_data.insert(self.num_iterations, snapshot);
    }

    /// Deep copy of everything recorded at the end of iteration `iteration`.
    pub fn get_stored_data_for_timestep(&self, iteration: usize) -> Option<TimestepSnapshot> {
        self.stored_data.get(&iteration).cloned()
    }

    pub fn stored_data(&self) -> &BTreeMap<usize, TimestepSnapshot> {
        &self.stored_data
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            iterations: self.num_iterations,
            protocol_secure: self.protocol_secure,
            security: self.security,
            key_length: self.key_length,
            qubits: self.calculate_qubit_counts(),
        }
    }

    pub fn is_secure(&self) -> bool {
        self.protocol_secure
    }

    pub fn security(&self) -> f64 {
        self.security
    }

    pub fn key_length(&self) -> usize {
        self.key_length
    }

    pub fn num_iterations(&self) -> usize {
        self.num_iterations
    }

    pub fn timestep(&self) -> usize {
        self.network.timestep()
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn network(&self) -> &NetworkManager {
        &self.network
    }

    pub fn classical_channel(&self) -> &ClassicalChannel {
        &self.cchl
    }

    pub fn party(&self, uid: usize) -> Result<&Party, ProtocolError> {
        Ok(self.network.party(PartyId(uid))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolVariant;
    use proptest::prelude::*;

    #[test]
    fn check_bit_requirements() {
        assert_eq!(required_num_check_bits(0.0), 0);
        assert_eq!(required_num_check_bits(0.95), 11);
        assert_eq!(required_num_check_bits(0.99), 17);
        assert_eq!(required_num_check_bits(1.0), usize::MAX);
    }

    #[test]
    fn supported_security_inverts_requirement() {
        assert!(supported_security(0) < SECURITY_TOLERANCE);
        let s = supported_security(11);
        assert!(required_num_check_bits(s) <= 11);
        assert!(required_num_check_bits(s + 2.0 * SECURITY_TOLERANCE) > 11);
        assert!(s > 0.95);
    }

    #[test]
    fn aborted_iteration_does_not_advance() {
        let config = ProtocolConfig::default()
            .with_eavesdropping(vec![(0, 1)])
            .with_check_bit_prob(1.0)
            .with_seed(2);
        let mut protocol = QkdProtocol::new(config).unwrap();
        protocol.run_n_steps(500).unwrap();

        assert!(!protocol.is_secure());
        let last = protocol.num_iterations() - 1;
        let snapshot = protocol.get_stored_data_for_timestep(last).unwrap();
        assert!(!snapshot.protocol.protocol_secure);
        assert_eq!(protocol.timestep(), last);

        // Further steps are no-ops.
        protocol.run_one_step().unwrap();
        assert_eq!(protocol.num_iterations(), last + 1);
    }

    #[test]
    fn reset_replays_seeded_run() {
        let config = ProtocolConfig::new(ProtocolVariant::StarProtocol2)
            .with_parties(3)
            .with_seed(17);
        let mut protocol = QkdProtocol::new(config).unwrap();
        protocol.run_n_steps(40).unwrap();
        let first = protocol.party(0).unwrap().secret_keys().clone();

        protocol.reset();
        assert_eq!(protocol.num_iterations(), 0);
        assert!(protocol.stored_data().is_empty());
        protocol.run_n_steps(40).unwrap();
        assert_eq!(protocol.party(0).unwrap().secret_keys(), &first);
    }

    #[test]
    fn run_rejects_unreachable_security() {
        let mut protocol = QkdProtocol::new(ProtocolConfig::default().with_seed(0)).unwrap();
        assert_eq!(
            protocol.run(None, 1.0, 8),
            Err(ProtocolError::Config(ConfigError::InvalidSecurity(1.0)))
        );
    }

    proptest! {
        #[test]
        fn requirement_is_monotonic(a in 0.0f64..0.999_999, b in 0.0f64..0.999_999) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(required_num_check_bits(lo) <= required_num_check_bits(hi));
        }
    }
}

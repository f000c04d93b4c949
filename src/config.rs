use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};

/// Which protocol algorithm drives each iteration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolVariant {
    /// Two-party BB84 on the single edge (0, 1).
    #[default]
    Bb84,
    /// BB84 relayed along a path; every party measures then forwards.
    ChainedBb84,
    /// Star graph, one shared state per round, all-or-nothing sifting.
    StarProtocol1,
    /// Star graph, independent state per branch, per-branch sifting.
    StarProtocol2,
}

/// How sifted rounds are promoted to check rounds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum CheckBitPolicy {
    /// Each sifted round becomes a check round with this probability.
    Probability(f64),
    /// Every sifted round is a check round until each leg holds this many.
    Target(usize),
}

/// Run configuration for a [`crate::QkdProtocol`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub variant: ProtocolVariant,
    /// Size of the default topology when no edges are given.
    pub num_parties: Option<usize>,
    /// Explicit directed edge list.
    pub edges: Option<Vec<(usize, usize)>>,
    pub check_bit_prob: f64,
    /// Target confidence that no eavesdropper went undetected.
    pub security: f64,
    pub key_length: usize,
    /// Edges to splice an eavesdropper into.
    pub intercepted_edges: Vec<(usize, usize)>,
    /// RNG seed; `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            variant: ProtocolVariant::Bb84,
            num_parties: None,
            edges: None,
            check_bit_prob: 0.2,
            security: 0.95,
            key_length: 128,
            intercepted_edges: Vec::new(),
            seed: None,
        }
    }
}

impl ProtocolConfig {
    pub fn new(variant: ProtocolVariant) -> Self {
        Self {
            variant,
            ..Self::default()
        }
    }

    pub fn with_parties(mut self, num_parties: usize) -> Self {
        self.num_parties = Some(num_parties);
        self
    }

    pub fn with_edges(mut self, edges: Vec<(usize, usize)>) -> Self {
        self.edges = Some(edges);
        self
    }

    pub fn with_check_bit_prob(mut self, check_bit_prob: f64) -> Self {
        self.check_bit_prob = check_bit_prob;
        self
    }

    pub fn with_security(mut self, security: f64) -> Self {
        self.security = security;
        self
    }

    pub fn with_key_length(mut self, key_length: usize) -> Self {
        self.key_length = key_length;
        self
    }

    pub fn with_eavesdropping(mut self, edges: Vec<(usize, usize)>) -> Self {
        self.intercepted_edges = edges;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.check_bit_prob) {
            return Err(ConfigError::InvalidProbability(self.check_bit_prob));
        }
        if !(0.0..1.0).contains(&self.security) {
            return Err(ConfigError::InvalidSecurity(self.security));
        }
        Ok(())
    }

    /// Resolves the edge list: BB84 always runs on `(0, 1)`; otherwise
    /// explicit edges win, then a path (chained) or star (star variants) over
    /// `num_parties` nodes.
    pub fn topology(&self) -> Result<Vec<(usize, usize)>, ConfigError> {
        if self.variant == ProtocolVariant::Bb84 {
            return Ok(vec![(0, 1)]);
        }
        if let Some(edges) = &self.edges {
            return Ok(edges.clone());
        }

        let k = self.num_parties.ok_or(ConfigError::MissingTopology)?;
        Ok(match self.variant {
            ProtocolVariant::ChainedBb84 => (0..k.saturating_sub(1)).map(|i| (i, i + 1)).collect(),
            _ => (1..k).map(|i| (0, i)).collect(),
        })
    }

    /// Check-bit policy for iteration-driven runs.
    pub fn check_bit_policy(&self) -> CheckBitPolicy {
        CheckBitPolicy::Probability(self.check_bit_prob)
    }
}

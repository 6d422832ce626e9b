//! Quantum Key Distribution (QKD) Protocols.
//!
//! Every protocol runs the same round structure, driven by [`QkdNode::try_generate_key`]:
//! 1. share quantum states, wait for the receiver's acknowledgement, then reveal bases;
//! 2. estimate errors on a publicly revealed test set and decide whether to abort;
//! 3. exchange an extractor seed and distill key bits from the raw key.
//!
//! Implementations:
//! - **BB84**: prepare-and-measure with two conjugate bases.
//! - **DIQKD**: entanglement based, certified by the CHSH game.

pub mod bb84;
pub mod diqkd;
pub mod extractor;

pub use bb84::Bb84Node;
pub use diqkd::DiqkdNode;
pub use extractor::extract_key;

use crate::Result;
use crate::channel::{ClassicalChannel, QState, QuantumChannel, bits_from_wire, bits_to_wire};
use crate::core::errors::QkdError;
use rand::{Rng, RngCore};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Which side of the exchange a node plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

/// Parameters shared by both parties of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionParams {
    /// Maximum tolerated error, between 0.0 and 1.0.
    pub tolerance: f64,
    /// Number of states the sender prepares per round.
    pub batch_size: usize,
    /// Extract one bit per chunk instead of a single bit per round.
    pub maximize_key_bits: bool,
}

/// Statistics observed in the most recent abort test.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ErrorStatistics {
    /// Fraction of compared test values that disagreed.
    pub matching_error: Option<f64>,
    /// Fraction of CHSH rounds won (DIQKD only).
    pub win_prob: Option<f64>,
    /// Number of disagreeing test values.
    pub mismatches: usize,
}

/// Collaborators a node uses for one round.
pub struct Link<'a> {
    pub quantum: &'a mut dyn QuantumChannel,
    pub classical: &'a mut dyn ClassicalChannel,
    pub rng: &'a mut dyn RngCore,
}

/// One party of a key distribution round.
pub trait QkdNode {
    /// Distributes and measures states, then reveals bases once measurement is confirmed.
    fn share_q_states(&mut self) -> Result<()>;

    /// Runs the statistical test(s); `true` means the round must be discarded.
    fn should_abort(&mut self) -> Result<bool>;

    /// Exchanges the extractor seed and returns the distilled key bits.
    fn generate_key(&mut self) -> Result<Vec<u8>>;

    fn statistics(&self) -> ErrorStatistics;

    /// Runs a full round. An aborted round yields an empty key.
    fn try_generate_key(&mut self) -> Result<Vec<u8>> {
        self.share_q_states()?;
        if self.should_abort()? {
            let stats = self.statistics();
            warn!(
                matching_error = ?stats.matching_error,
                win_prob = ?stats.win_prob,
                "key round aborted"
            );
            return Ok(Vec::new());
        }

        let key = self.generate_key()?;
        info!(bits = key.len(), "generated key bits");
        Ok(key)
    }
}

/// Builds the nodes of the configured protocol for each round.
pub trait NodeFactory: Send {
    fn make_sender_node<'a>(&self, link: Link<'a>) -> Box<dyn QkdNode + 'a>;

    fn make_receiver_node<'a>(&self, link: Link<'a>) -> Box<dyn QkdNode + 'a>;
}

/// Keeps the states whose basis matches the peer's basis at the same position.
pub fn sift(states: &[QState], other_bases: &[u8]) -> Vec<QState> {
    states
        .iter()
        .zip(other_bases)
        .filter(|(q, b)| q.basis == **b)
        .map(|(q, _)| *q)
        .collect()
}

/// Draws ⌊size/2⌋ distinct indices in `0..size`, returned in ascending order.
///
/// Duplicates are redrawn, which keeps the selection uniform over subsets.
pub fn sample_test_set<R: Rng + ?Sized>(size: usize, rng: &mut R) -> Vec<usize> {
    let target = size / 2;
    let mut test_set = BTreeSet::new();
    while test_set.len() < target {
        test_set.insert(rng.random_range(0..size));
    }
    test_set.into_iter().collect()
}

/// Number of positions where the two value lists disagree.
pub fn count_mismatches(lhs: &[u8], rhs: &[u8]) -> usize {
    lhs.iter().zip(rhs).filter(|(a, b)| a != b).count()
}

/// Fraction of disagreeing positions, `None` when there is nothing to compare.
pub fn matching_error(lhs: &[u8], rhs: &[u8]) -> Option<f64> {
    if lhs.is_empty() {
        return None;
    }
    Some(count_mismatches(lhs, rhs) as f64 / lhs.len() as f64)
}

fn index_to_wire(index: usize) -> Result<u32> {
    u32::try_from(index)
        .map_err(|_| QkdError::MalformedPayload(format!("index {index} does not fit the wire")))
}

/// Round state and classical-channel steps common to every protocol.
pub(crate) struct QkdSession<'a> {
    classical: &'a mut dyn ClassicalChannel,
    rng: &'a mut dyn RngCore,
    params: SessionParams,
    qstates: Vec<QState>,
    other_bases: Vec<u8>,
    test_set: Vec<usize>,
    seed: Vec<u8>,
    mismatching_states: usize,
}

impl<'a> QkdSession<'a> {
    pub(crate) fn new(
        classical: &'a mut dyn ClassicalChannel,
        rng: &'a mut dyn RngCore,
        params: SessionParams,
    ) -> Self {
        Self {
            classical,
            rng,
            params,
            qstates: Vec::new(),
            other_bases: Vec::new(),
            test_set: Vec::new(),
            seed: Vec::new(),
            mismatching_states: 0,
        }
    }

    pub(crate) fn params(&self) -> &SessionParams {
        &self.params
    }

    pub(crate) fn qstates(&self) -> &[QState] {
        &self.qstates
    }

    pub(crate) fn set_qstates(&mut self, qstates: Vec<QState>) {
        self.qstates = qstates;
    }

    pub(crate) fn other_bases(&self) -> &[u8] {
        &self.other_bases
    }

    pub(crate) fn test_set(&self) -> &[usize] {
        &self.test_set
    }

    pub(crate) fn mismatching_states(&self) -> usize {
        self.mismatching_states
    }

    /// Uniform random values in `0..=up_to`.
    pub(crate) fn random_bits(&mut self, size: usize, up_to: u8) -> Vec<u8> {
        (0..size).map(|_| self.rng.random_range(0..=up_to)).collect()
    }

    pub(crate) fn send_amount(&mut self, amount: usize) -> Result<()> {
        let wire = index_to_wire(amount)?;
        self.classical.send(&[wire])?;
        Ok(())
    }

    pub(crate) fn receive_amount(&mut self) -> Result<usize> {
        match self.classical.receive()?.as_slice() {
            [amount] => Ok(*amount as usize),
            other => Err(QkdError::MalformedPayload(format!(
                "expected a single state count, got {} values",
                other.len()
            ))),
        }
    }

    pub(crate) fn send_ack(&mut self) -> Result<()> {
        self.classical.send_ack()?;
        Ok(())
    }

    pub(crate) fn receive_ack(&mut self) -> Result<()> {
        self.classical.receive_ack()?;
        Ok(())
    }

    /// Sends own bases then receives the peer's; both lists must cover the whole round.
    pub(crate) fn share_bases(&mut self) -> Result<()> {
        let bases: Vec<u32> = self.qstates.iter().map(|q| u32::from(q.basis)).collect();
        self.classical.send(&bases)?;

        let received = self.classical.receive()?;
        if received.len() != self.qstates.len() {
            return Err(QkdError::MalformedPayload(format!(
                "expected {} bases, got {}",
                self.qstates.len(),
                received.len()
            )));
        }
        self.other_bases = received
            .into_iter()
            .map(|b| {
                u8::try_from(b)
                    .map_err(|_| QkdError::MalformedPayload(format!("basis {b} out of range")))
            })
            .collect::<Result<_>>()?;
        debug!(states = self.qstates.len(), "bases exchanged");
        Ok(())
    }

    /// Keeps only the states measured in the same basis by both parties.
    pub(crate) fn discard_states(&mut self) {
        self.qstates = sift(&self.qstates, &self.other_bases);
        debug!(sifted = self.qstates.len(), "discarded mismatching bases");
    }

    pub(crate) fn send_test_set(&mut self) -> Result<()> {
        self.test_set = sample_test_set(self.qstates.len(), &mut *self.rng);
        let wire = self
            .test_set
            .iter()
            .map(|&i| index_to_wire(i))
            .collect::<Result<Vec<_>>>()?;
        self.classical.send(&wire)?;
        debug!(size = self.test_set.len(), "sent test set");
        Ok(())
    }

    /// Receives the peer's test set: exactly ⌊len/2⌋ distinct indices inside the round.
    pub(crate) fn receive_test_set(&mut self) -> Result<()> {
        let len = self.qstates.len();
        let received = self.classical.receive()?;
        if received.len() != len / 2 {
            return Err(QkdError::MalformedPayload(format!(
                "expected {} test indices for a round of {len} states, got {}",
                len / 2,
                received.len()
            )));
        }

        let mut indices = BTreeSet::new();
        for i in received {
            let index = match usize::try_from(i) {
                Ok(index) if index < len => index,
                _ => {
                    return Err(QkdError::MalformedPayload(format!(
                        "test index {i} outside round of {len} states"
                    )));
                }
            };
            if !indices.insert(index) {
                return Err(QkdError::MalformedPayload(format!(
                    "duplicate test index {index}"
                )));
            }
        }
        self.test_set = indices.into_iter().collect();
        debug!(size = self.test_set.len(), "received test set");
        Ok(())
    }

    /// Positions of the round that are not in the test set.
    pub(crate) fn remaining_indices(&self) -> Vec<usize> {
        (0..self.qstates.len())
            .filter(|i| self.test_set.binary_search(i).is_err())
            .collect()
    }

    pub(crate) fn values_at(&self, indices: &[usize]) -> Vec<u8> {
        indices.iter().map(|&i| self.qstates[i].value).collect()
    }

    /// Sends `values` and receives the peer's values for the same positions.
    pub(crate) fn exchange_values(&mut self, values: &[u8]) -> Result<Vec<u8>> {
        self.classical.send(&bits_to_wire(values))?;
        let other = bits_from_wire(&self.classical.receive()?)?;
        if other.len() != values.len() {
            return Err(QkdError::MalformedPayload(format!(
                "expected {} test values, got {}",
                values.len(),
                other.len()
            )));
        }
        Ok(other)
    }

    /// Matching error over two aligned value lists, remembering the mismatch count.
    pub(crate) fn matching_error_of(&mut self, lhs: &[u8], rhs: &[u8]) -> Option<f64> {
        self.mismatching_states = count_mismatches(lhs, rhs);
        matching_error(lhs, rhs)
    }

    /// Generates and publishes a seed as long as the non-test part of the round.
    pub(crate) fn send_seed(&mut self) -> Result<()> {
        let m = self.qstates.len() - self.test_set.len();
        self.seed = self.random_bits(m, 1);
        self.classical.send(&bits_to_wire(&self.seed))?;
        Ok(())
    }

    pub(crate) fn receive_seed(&mut self) -> Result<()> {
        self.seed = bits_from_wire(&self.classical.receive()?)?;
        Ok(())
    }

    /// Runs the extractor over the values at `indices`.
    pub(crate) fn privacy_amplification_of(&self, indices: &[usize]) -> Result<Vec<u8>> {
        let x = self.values_at(indices);
        let k = if self.params.maximize_key_bits {
            x.len().saturating_sub(self.mismatching_states).max(1)
        } else {
            1
        };
        debug!(raw = x.len(), k, "privacy amplification");
        extract_key(&x, &self.seed, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LocalClassicalChannel;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn sifting_keeps_matching_positions_in_order() {
        let states = vec![
            QState::new(1, 0),
            QState::new(0, 0),
            QState::new(1, 1),
            QState::new(0, 1),
        ];
        let sifted = sift(&states, &[1, 0, 1, 0]);
        assert_eq!(sifted, vec![QState::new(0, 0), QState::new(1, 1)]);
    }

    #[test]
    fn test_set_has_half_the_states() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let set = sample_test_set(15, &mut rng);
        assert_eq!(set.len(), 7);
        assert!(set.windows(2).all(|w| w[0] < w[1]));
        assert!(set.iter().all(|&i| i < 15));
    }

    #[test]
    fn tiny_rounds_have_empty_test_sets() {
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        assert!(sample_test_set(0, &mut rng).is_empty());
        assert!(sample_test_set(1, &mut rng).is_empty());
    }

    fn receive_test_set_from(round: usize, payload: &[u32]) -> Result<Vec<usize>> {
        let (mut peer, mut local) = LocalClassicalChannel::pair();
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let params = SessionParams {
            tolerance: 0.0,
            batch_size: round,
            maximize_key_bits: false,
        };
        let mut session = QkdSession::new(&mut local, &mut rng, params);
        session.set_qstates(vec![QState::new(0, 0); round]);
        peer.send(payload).unwrap();
        session.receive_test_set()?;
        Ok(session.test_set().to_vec())
    }

    #[test]
    fn received_test_set_is_sorted() {
        assert_eq!(receive_test_set_from(6, &[4, 0, 2]).unwrap(), vec![0, 2, 4]);
    }

    #[test]
    fn received_test_set_rejects_duplicates() {
        assert!(matches!(
            receive_test_set_from(6, &[1, 1, 2]),
            Err(QkdError::MalformedPayload(_))
        ));
    }

    #[test]
    fn received_test_set_must_cover_half_the_round() {
        assert!(matches!(
            receive_test_set_from(6, &[1, 2]),
            Err(QkdError::MalformedPayload(_))
        ));
        assert!(matches!(
            receive_test_set_from(6, &[0, 1, 2, 3]),
            Err(QkdError::MalformedPayload(_))
        ));
    }

    #[test]
    fn received_test_set_rejects_indices_outside_round() {
        assert!(matches!(
            receive_test_set_from(6, &[0, 1, 6]),
            Err(QkdError::MalformedPayload(_))
        ));
    }

    #[test]
    fn matching_error_counts_disagreements() {
        assert_eq!(matching_error(&[1, 0, 0, 1], &[1, 0, 0, 1]), Some(0.0));
        assert_eq!(matching_error(&[1, 0, 0, 1], &[1, 1, 0, 1]), Some(0.25));
        assert_eq!(matching_error(&[], &[]), None);
    }
}

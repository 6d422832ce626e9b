//! Device-independent key distribution certified by the CHSH game.
//!
//! The sender measures its half of each entangled pair with setting 0 (Z) or
//! 1 (X); the receiver measures with setting 0, 1 (rotated CHSH settings) or
//! 2 (aligned with the sender's setting 0). Test rounds with a receiver
//! setting in {0, 1} play the CHSH game; the remaining test rounds in the
//! key-generating combination measure the matching error. Non-test rounds
//! in that combination form the raw key.

use super::{ErrorStatistics, Link, QkdNode, QkdSession, Role, SessionParams};
use crate::Result;
use crate::channel::{BasesMapping, QuantumChannel};
use std::f64::consts::FRAC_1_SQRT_2;
use tracing::debug;

/// Highest CHSH winning probability reachable with quantum correlations.
pub const TSIRELSON_WIN_PROBABILITY: f64 = 0.5 + FRAC_1_SQRT_2 / 2.0;

/// Fraction of CHSH rounds won.
///
/// A round at index `i` is won when `own_bases[i] AND other_bases[i]`
/// equals `values[j] XOR other_values[j]`, with `j` the position of `i`
/// in `chsh_test_set`. `None` when no round was played.
pub fn winning_probability(
    own_bases: &[u8],
    other_bases: &[u8],
    chsh_test_set: &[usize],
    values: &[u8],
    other_values: &[u8],
) -> Option<f64> {
    if chsh_test_set.is_empty() {
        return None;
    }
    let won = chsh_test_set
        .iter()
        .zip(values.iter().zip(other_values))
        .filter(|&(&i, (&x, &y))| own_bases[i] & other_bases[i] == x ^ y)
        .count();
    Some(won as f64 / chsh_test_set.len() as f64)
}

/// Abort condition of a DIQKD round.
pub fn is_outside_chsh_bound(win_prob: f64, matching_error: f64, tolerance: f64) -> bool {
    win_prob < TSIRELSON_WIN_PROBABILITY - tolerance || (1.0 - matching_error) < (1.0 - tolerance)
}

/// How a role classifies a round from `(own basis, other basis)`.
#[derive(Clone, Copy)]
struct SubsetPredicates {
    is_chsh_test: fn(u8, u8) -> bool,
    is_matching_basis: fn(u8, u8) -> bool,
}

impl SubsetPredicates {
    fn for_role(role: Role) -> Self {
        match role {
            Role::Sender => Self {
                is_chsh_test: |_, other| other < 2,
                is_matching_basis: |own, other| other == 2 && own == 0,
            },
            Role::Receiver => Self {
                is_chsh_test: |own, _| own < 2,
                is_matching_basis: |own, other| other == 0 && own == 2,
            },
        }
    }
}

pub struct DiqkdNode<'a> {
    session: QkdSession<'a>,
    quantum: &'a mut dyn QuantumChannel,
    role: Role,
    predicates: SubsetPredicates,
    chsh_test_set: Vec<usize>,
    match_test_set: Vec<usize>,
    raw_key_set: Vec<usize>,
    win_prob: Option<f64>,
    matching_error: Option<f64>,
}

impl<'a> DiqkdNode<'a> {
    pub fn new(link: Link<'a>, role: Role, params: SessionParams) -> Self {
        let Link {
            quantum,
            classical,
            rng,
        } = link;
        if role == Role::Receiver {
            quantum.set_bases_mapping(BasesMapping::chsh_receiver());
        }
        Self {
            session: QkdSession::new(classical, rng, params),
            quantum,
            role,
            predicates: SubsetPredicates::for_role(role),
            chsh_test_set: Vec::new(),
            match_test_set: Vec::new(),
            raw_key_set: Vec::new(),
            win_prob: None,
            matching_error: None,
        }
    }

    pub fn sender(link: Link<'a>, params: SessionParams) -> Self {
        Self::new(link, Role::Sender, params)
    }

    /// Creates the receiving node and installs the CHSH measurement settings on its channel.
    pub fn receiver(link: Link<'a>, params: SessionParams) -> Self {
        Self::new(link, Role::Receiver, params)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn send_q_states(&mut self) -> Result<()> {
        let n = self.session.params().batch_size;
        self.session.send_amount(n)?;
        let bases = self.session.random_bits(n, 1);
        let states = self.quantum.send_entangled(&bases)?;
        self.session.set_qstates(states);
        Ok(())
    }

    fn measure_q_states(&mut self) -> Result<()> {
        let amount = self.session.receive_amount()?;
        let bases = self.session.random_bits(amount, 2);
        let states = self.quantum.receive_entangled_in_bases(&bases)?;
        self.session.set_qstates(states);
        debug!(amount, "measured entangled halves");
        Ok(())
    }

    fn bases_at(&self, index: usize) -> (u8, u8) {
        (
            self.session.qstates()[index].basis,
            self.session.other_bases()[index],
        )
    }

    /// Splits the round into CHSH rounds, match rounds and raw key positions.
    fn separate_test_subsets(&mut self) {
        let SubsetPredicates {
            is_chsh_test,
            is_matching_basis,
        } = self.predicates;

        self.chsh_test_set = self
            .session
            .test_set()
            .iter()
            .copied()
            .filter(|&i| {
                let (own, other) = self.bases_at(i);
                is_chsh_test(own, other)
            })
            .collect();
        self.match_test_set = self
            .session
            .test_set()
            .iter()
            .copied()
            .filter(|&i| {
                let (own, other) = self.bases_at(i);
                is_matching_basis(own, other)
            })
            .collect();
        self.raw_key_set = self
            .session
            .remaining_indices()
            .into_iter()
            .filter(|&i| {
                let (own, other) = self.bases_at(i);
                is_matching_basis(own, other)
            })
            .collect();

        debug!(
            chsh = self.chsh_test_set.len(),
            matching = self.match_test_set.len(),
            raw = self.raw_key_set.len(),
            "separated test subsets"
        );
    }
}

impl QkdNode for DiqkdNode<'_> {
    fn share_q_states(&mut self) -> Result<()> {
        match self.role {
            Role::Sender => {
                self.send_q_states()?;
                self.session.receive_ack()?;
            }
            Role::Receiver => {
                self.measure_q_states()?;
                self.session.send_ack()?;
            }
        }
        self.session.share_bases()
    }

    fn should_abort(&mut self) -> Result<bool> {
        match self.role {
            Role::Sender => self.session.send_test_set()?,
            Role::Receiver => self.session.receive_test_set()?,
        }
        self.separate_test_subsets();

        let chsh_values = self.session.values_at(&self.chsh_test_set);
        let other_chsh_values = self.session.exchange_values(&chsh_values)?;
        let match_values = self.session.values_at(&self.match_test_set);
        let other_match_values = self.session.exchange_values(&match_values)?;

        let own_bases: Vec<u8> = self.session.qstates().iter().map(|q| q.basis).collect();
        self.win_prob = winning_probability(
            &own_bases,
            self.session.other_bases(),
            &self.chsh_test_set,
            &chsh_values,
            &other_chsh_values,
        );
        self.matching_error = self
            .session
            .matching_error_of(&match_values, &other_match_values);

        Ok(match (self.win_prob, self.matching_error) {
            (Some(win_prob), Some(error)) => {
                is_outside_chsh_bound(win_prob, error, self.session.params().tolerance)
            }
            // a round without CHSH or match statistics certifies nothing
            _ => true,
        })
    }

    fn generate_key(&mut self) -> Result<Vec<u8>> {
        match self.role {
            Role::Sender => self.session.send_seed()?,
            Role::Receiver => self.session.receive_seed()?,
        }
        self.session.privacy_amplification_of(&self.raw_key_set)
    }

    fn statistics(&self) -> ErrorStatistics {
        ErrorStatistics {
            matching_error: self.matching_error,
            win_prob: self.win_prob,
            mismatches: self.session.mismatching_states(),
        }
    }
}

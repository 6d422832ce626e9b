//! BB84 prepare-and-measure key distribution.
//!
//! The sender encodes random values in random bases {0: Z, 1: X}; the
//! receiver measures in random bases. States measured in a different basis
//! than they were prepared in are discarded, half of the survivors are
//! revealed to estimate the error, and the rest form the raw key.

use super::{ErrorStatistics, Link, QkdNode, QkdSession, Role, SessionParams};
use crate::Result;
use crate::channel::{QState, QuantumChannel};
use tracing::debug;

/// Abort condition of a BB84 round: strictly more disagreement than tolerated.
pub fn is_outside_error_bound(matching_error: f64, tolerance: f64) -> bool {
    matching_error > tolerance
}

pub struct Bb84Node<'a> {
    session: QkdSession<'a>,
    quantum: &'a mut dyn QuantumChannel,
    role: Role,
    matching_error: Option<f64>,
}

impl<'a> Bb84Node<'a> {
    pub fn new(link: Link<'a>, role: Role, params: SessionParams) -> Self {
        let Link {
            quantum,
            classical,
            rng,
        } = link;
        Self {
            session: QkdSession::new(classical, rng, params),
            quantum,
            role,
            matching_error: None,
        }
    }

    pub fn sender(link: Link<'a>, params: SessionParams) -> Self {
        Self::new(link, Role::Sender, params)
    }

    pub fn receiver(link: Link<'a>, params: SessionParams) -> Self {
        Self::new(link, Role::Receiver, params)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn send_q_states(&mut self) -> Result<()> {
        let n = self.session.params().batch_size;
        self.session.send_amount(n)?;

        let values = self.session.random_bits(n, 1);
        let bases = self.session.random_bits(n, 1);
        let states: Vec<QState> = values
            .into_iter()
            .zip(bases)
            .map(|(value, basis)| QState::new(value, basis))
            .collect();
        self.quantum.send_states(&states)?;
        self.session.set_qstates(states);
        Ok(())
    }

    fn measure_q_states(&mut self) -> Result<()> {
        let amount = self.session.receive_amount()?;
        let bases = self.session.random_bits(amount, 1);
        let states = self.quantum.receive_in_bases(&bases)?;
        self.session.set_qstates(states);
        debug!(amount, "measured incoming states");
        Ok(())
    }
}

impl QkdNode for Bb84Node<'_> {
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
        self.session.discard_states();
        match self.role {
            Role::Sender => self.session.send_test_set()?,
            Role::Receiver => self.session.receive_test_set()?,
        }

        let test_values = self.session.values_at(self.session.test_set());
        let other_test_values = self.session.exchange_values(&test_values)?;
        self.matching_error = self
            .session
            .matching_error_of(&test_values, &other_test_values);

        Ok(match self.matching_error {
            Some(error) => is_outside_error_bound(error, self.session.params().tolerance),
            // nothing survived sifting to test against
            None => true,
        })
    }

    fn generate_key(&mut self) -> Result<Vec<u8>> {
        match self.role {
            Role::Sender => self.session.send_seed()?,
            Role::Receiver => self.session.receive_seed()?,
        }
        let raw_key = self.session.remaining_indices();
        self.session.privacy_amplification_of(&raw_key)
    }

    fn statistics(&self) -> ErrorStatistics {
        ErrorStatistics {
            matching_error: self.matching_error,
            win_prob: None,
            mismatches: self.session.mismatching_states(),
        }
    }
}

use super::{BasesMapping, QState, QuantumChannel};
use crate::core::errors::{NoiseError, TransportError};
use crate::core::{Gate, Measurement, NoiseChannel, QuantumState};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::sync::mpsc::{Receiver, Sender, channel};
use tracing::debug;

/// One end of an in-memory quantum link backed by density-matrix simulation.
///
/// Qubits travel as full `QuantumState`s: a prepared single qubit, or an
/// entangled pair whose sender half has already been measured.
pub struct SimulatedQuantumChannel {
    outbound: Sender<QuantumState>,
    inbound: Receiver<QuantumState>,
    mapping: BasesMapping,
    noise: Option<NoiseChannel>,
    eavesdropper: f64,
    rng: ChaCha20Rng,
    closed: bool,
}

impl SimulatedQuantumChannel {
    /// Creates two connected endpoints whose measurement randomness derives from `seed`.
    pub fn pair(seed: u64) -> (Self, Self) {
        let (a_tx, b_rx) = channel();
        let (b_tx, a_rx) = channel();
        (
            Self::endpoint(a_tx, a_rx, seed),
            Self::endpoint(b_tx, b_rx, seed.wrapping_add(1)),
        )
    }

    fn endpoint(outbound: Sender<QuantumState>, inbound: Receiver<QuantumState>, seed: u64) -> Self {
        Self {
            outbound,
            inbound,
            mapping: BasesMapping::default(),
            noise: None,
            eavesdropper: 0.0,
            rng: ChaCha20Rng::seed_from_u64(seed),
            closed: false,
        }
    }

    /// Applies `noise` to every qubit this endpoint transmits.
    pub fn with_noise(mut self, noise: NoiseChannel) -> Self {
        self.noise = Some(noise);
        self
    }

    /// Lets an intercept-resend attacker measure a fraction `ratio` of transmitted qubits.
    pub fn with_eavesdropper(mut self, ratio: f64) -> Result<Self, NoiseError> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(NoiseError::InvalidProbability(ratio));
        }
        self.eavesdropper = ratio;
        Ok(self)
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    /// Sends `qubit` of `state` through the line: noise, optional interception, delivery.
    fn transmit(&mut self, mut state: QuantumState, qubit: usize) -> Result<(), TransportError> {
        if let Some(noise) = &self.noise {
            state.apply_noise(noise, &[qubit])?;
        }

        if self.eavesdropper > 0.0 && self.rng.random_bool(self.eavesdropper) {
            let measurement = if self.rng.random_bool(0.5) {
                Measurement::x_basis()
            } else {
                Measurement::z_basis()
            };
            state.measure(&measurement, &[qubit], &mut self.rng)?;
        }

        self.outbound
            .send(state)
            .map_err(|_| TransportError::Disconnected)
    }

    fn take(&mut self) -> Result<QuantumState, TransportError> {
        self.inbound.recv().map_err(|_| TransportError::Disconnected)
    }

    fn measure_in(
        &mut self,
        state: &mut QuantumState,
        qubit: usize,
        basis: u8,
    ) -> Result<QState, TransportError> {
        self.mapping.apply(basis, state, qubit)?;
        let outcome = state.measure(&Measurement::z_basis(), &[qubit], &mut self.rng)?;
        Ok(QState::new(u8::from(outcome.index == 1), basis))
    }
}

impl QuantumChannel for SimulatedQuantumChannel {
    fn send_states(&mut self, states: &[QState]) -> Result<(), TransportError> {
        self.ensure_open()?;
        for qs in states {
            let mut state = QuantumState::new(1);
            if qs.value == 1 {
                state.apply(&Gate::x(), &[0])?;
            }
            self.mapping.apply(qs.basis, &mut state, 0)?;
            self.transmit(state, 0)?;
        }
        debug!(count = states.len(), "prepared and sent states");
        Ok(())
    }

    fn send_entangled(&mut self, bases: &[u8]) -> Result<Vec<QState>, TransportError> {
        self.ensure_open()?;
        let mut local = Vec::with_capacity(bases.len());
        for &basis in bases {
            let mut pair = QuantumState::epr_pair()?;
            local.push(self.measure_in(&mut pair, 0, basis)?);
            self.transmit(pair, 1)?;
        }
        debug!(count = bases.len(), "distributed entangled pairs");
        Ok(local)
    }

    fn receive_in_bases(&mut self, bases: &[u8]) -> Result<Vec<QState>, TransportError> {
        self.ensure_open()?;
        bases
            .iter()
            .map(|&basis| {
                let mut state = self.take()?;
                self.measure_in(&mut state, 0, basis)
            })
            .collect()
    }

    fn receive_entangled_in_bases(
        &mut self,
        bases: &[u8],
    ) -> Result<Vec<QState>, TransportError> {
        self.ensure_open()?;
        bases
            .iter()
            .map(|&basis| {
                let mut pair = self.take()?;
                self.measure_in(&mut pair, 1, basis)
            })
            .collect()
    }

    fn set_bases_mapping(&mut self, mapping: BasesMapping) {
        self.mapping = mapping;
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(bits: &[(u8, u8)]) -> Vec<QState> {
        bits.iter().map(|&(v, b)| QState::new(v, b)).collect()
    }

    #[test]
    fn matching_bases_reproduce_prepared_values() {
        let (mut alice, mut bob) = SimulatedQuantumChannel::pair(11);
        let sent = states(&[(0, 0), (1, 0), (0, 1), (1, 1)]);
        alice.send_states(&sent).unwrap();
        let received = bob.receive_in_bases(&[0, 0, 1, 1]).unwrap();
        assert_eq!(received, sent);
    }

    #[test]
    fn key_settings_of_entangled_pairs_agree() {
        let (mut alice, mut bob) = SimulatedQuantumChannel::pair(5);
        bob.set_bases_mapping(BasesMapping::chsh_receiver());
        let local = alice.send_entangled(&[0; 16]).unwrap();
        let remote = bob.receive_entangled_in_bases(&[2; 16]).unwrap();
        for (a, b) in local.iter().zip(&remote) {
            assert_eq!(a.value, b.value);
            assert_eq!(b.basis, 2);
        }
    }

    #[test]
    fn phase_flip_noise_spares_computational_basis() {
        let (alice, mut bob) = SimulatedQuantumChannel::pair(2);
        let mut alice = alice.with_noise(NoiseChannel::phase_flip(1.0).unwrap());
        let sent = states(&[(1, 0), (0, 0), (1, 1)]);
        alice.send_states(&sent).unwrap();
        let received = bob.receive_in_bases(&[0, 0, 1]).unwrap();
        assert_eq!(received[0], sent[0]);
        assert_eq!(received[1], sent[1]);
        // Z flips |-> to |+> in the Hadamard basis
        assert_eq!(received[2], QState::new(0, 1));
    }

    #[test]
    fn invalid_eavesdropper_ratio_is_rejected() {
        let (alice, _bob) = SimulatedQuantumChannel::pair(0);
        assert!(alice.with_eavesdropper(1.2).is_err());
    }

    #[test]
    fn closed_channel_refuses_work() {
        let (mut alice, _bob) = SimulatedQuantumChannel::pair(0);
        alice.close().unwrap();
        assert!(matches!(
            alice.send_states(&states(&[(0, 0)])),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn dropped_peer_reports_disconnect() {
        let (mut alice, bob) = SimulatedQuantumChannel::pair(0);
        drop(bob);
        assert!(matches!(
            alice.receive_in_bases(&[0]),
            Err(TransportError::Disconnected)
        ));
    }
}

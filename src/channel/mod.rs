//! Channel collaborators used by the key distribution engine.
//!
//! The engine talks to the outside world through two seams:
//! - [`QuantumChannel`]: prepares, distributes and measures quantum states.
//! - [`ClassicalChannel`]: an authenticated (tamper-evident, not secret)
//!   channel carrying lists of small integers.
//!
//! In-process implementations of both are provided for simulation and tests.

mod local;
mod simulated;

pub use local::LocalClassicalChannel;
pub use simulated::SimulatedQuantumChannel;

use crate::core::errors::{QkdError, TransportError};
use crate::core::{Gate, QuantumState};
use std::f64::consts::PI;

/// Classical outcome of one prepared or measured quantum state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QState {
    pub value: u8,
    pub basis: u8,
}

impl QState {
    pub fn new(value: u8, basis: u8) -> Self {
        Self { value, basis }
    }
}

/// Gate sequence applied to a qubit to select a measurement or preparation basis.
#[derive(Clone, Debug)]
pub struct BasisTransform(Vec<Gate>);

impl BasisTransform {
    pub fn identity() -> Self {
        Self(Vec::new())
    }

    pub fn new(gates: Vec<Gate>) -> Self {
        Self(gates)
    }

    fn apply(&self, state: &mut QuantumState, qubit: usize) -> Result<(), TransportError> {
        for gate in &self.0 {
            state.apply(gate, &[qubit])?;
        }
        Ok(())
    }
}

/// Per-basis calibration table, indexed by basis number.
#[derive(Clone, Debug)]
pub struct BasesMapping(Vec<BasisTransform>);

impl BasesMapping {
    pub fn new(transforms: Vec<BasisTransform>) -> Self {
        Self(transforms)
    }

    /// Computational basis for 0, Hadamard basis for 1.
    ///
    /// Index 2 is the computational basis as well so an entanglement sender
    /// and a key-generation receiver agree on it.
    pub fn bb84() -> Self {
        Self(vec![
            BasisTransform::identity(),
            BasisTransform::new(vec![Gate::h()]),
            BasisTransform::identity(),
        ])
    }

    /// Receiver settings for the CHSH game against a sender measuring in Z (0) and X (1).
    ///
    /// Settings 0 and 1 measure along ±π/4 in the X-Z plane, which reaches
    /// the Tsirelson bound on |Φ+>. Setting 2 is the computational basis and
    /// correlates perfectly with the sender's setting 0.
    pub fn chsh_receiver() -> Self {
        Self(vec![
            BasisTransform::new(vec![Gate::ry(-PI / 4.0)]),
            BasisTransform::new(vec![Gate::ry(PI / 4.0)]),
            BasisTransform::identity(),
        ])
    }

    pub fn apply(
        &self,
        basis: u8,
        state: &mut QuantumState,
        qubit: usize,
    ) -> Result<(), TransportError> {
        self.0
            .get(usize::from(basis))
            .ok_or(TransportError::UnknownBasis(basis))?
            .apply(state, qubit)
    }
}

impl Default for BasesMapping {
    fn default() -> Self {
        Self::bb84()
    }
}

/// Quantum side of a link between two parties.
///
/// All operations block until the remote side (or device) responds.
pub trait QuantumChannel: Send {
    /// Prepares each state (value in the given basis) and transmits it.
    fn send_states(&mut self, states: &[QState]) -> Result<(), TransportError>;

    /// Creates one entangled pair per basis, transmits one half and measures
    /// the local half in that basis.
    fn send_entangled(&mut self, bases: &[u8]) -> Result<Vec<QState>, TransportError>;

    /// Measures one incoming state per basis.
    fn receive_in_bases(&mut self, bases: &[u8]) -> Result<Vec<QState>, TransportError>;

    /// Measures one incoming entangled half per basis.
    fn receive_entangled_in_bases(&mut self, bases: &[u8])
    -> Result<Vec<QState>, TransportError>;

    /// Replaces the calibration table used to select bases.
    fn set_bases_mapping(&mut self, mapping: BasesMapping);

    fn close(&mut self) -> Result<(), TransportError>;
}

/// Authenticated classical side of a link between two parties.
pub trait ClassicalChannel: Send {
    fn send(&mut self, data: &[u32]) -> Result<(), TransportError>;

    fn receive(&mut self) -> Result<Vec<u32>, TransportError>;

    fn send_ack(&mut self) -> Result<(), TransportError>;

    fn receive_ack(&mut self) -> Result<(), TransportError>;

    /// Releases channel resources once both parties are done.
    fn clear(&mut self) -> Result<(), TransportError>;

    /// Releases channel resources regardless of the peer's state.
    fn force_clear(&mut self) -> Result<(), TransportError>;

    fn close(&mut self) -> Result<(), TransportError>;
}

pub fn bits_to_wire(bits: &[u8]) -> Vec<u32> {
    bits.iter().map(|&b| u32::from(b)).collect()
}

/// Converts a received payload into bits, rejecting anything but 0 and 1.
pub fn bits_from_wire(values: &[u32]) -> crate::Result<Vec<u8>> {
    values
        .iter()
        .map(|&v| match v {
            0 => Ok(0),
            1 => Ok(1),
            other => Err(QkdError::MalformedPayload(format!(
                "expected a bit, got {other}"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_bits_reject_non_binary_values() {
        assert_eq!(bits_from_wire(&[0, 1, 1]).unwrap(), vec![0, 1, 1]);
        assert!(matches!(
            bits_from_wire(&[0, 2]),
            Err(QkdError::MalformedPayload(_))
        ));
        assert_eq!(bits_to_wire(&[1, 0]), vec![1, 0]);
    }

    #[test]
    fn unknown_basis_has_no_transform() {
        let mut state = QuantumState::new(1);
        let err = BasesMapping::bb84().apply(7, &mut state, 0).unwrap_err();
        assert!(matches!(err, TransportError::UnknownBasis(7)));
    }
}

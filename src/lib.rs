//! Simulated quantum network with key distribution and one-time-pad messaging.
//!
//! [`protocols::qkd`] implements BB84 and DIQKD rounds over the collaborator
//! traits in [`channel`]. [`messaging::SecureChannel`] repeats those rounds to
//! encrypt strings, and [`config::NetworkConfig`] selects the protocol.

mod core;
pub mod channel;
pub mod config;
pub mod messaging;
pub mod protocols;

pub use crate::channel::{ClassicalChannel, QState, QuantumChannel};
pub use crate::config::{NetworkConfig, NetworkFactory, Protocol};
pub use crate::core::{
    Gate, Measurement, MeasurementResult, NoiseChannel, QuantumState, errors, utils,
};
pub use crate::messaging::SecureChannel;

pub type Result<T> = std::result::Result<T, errors::QkdError>;

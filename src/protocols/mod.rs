//! Quantum Cryptography Protocols.
//!
//! Key distribution protocols that run over a quantum channel and an
//! authenticated classical channel.

pub mod qkd;
pub use qkd::{bb84, diqkd, extractor};

//! One-time-pad messaging over repeated key distribution rounds.
//!
//! The writer announces every round with a [`START_KEY_GENERATION_TAG`], runs
//! it, and stops with an [`END_KEY_GENERATION_TAG`] once enough key bits
//! were collected. The ciphertext follows as a flat bit list.

use crate::Result;
use crate::channel::{ClassicalChannel, QuantumChannel, bits_from_wire, bits_to_wire};
use crate::core::errors::QkdError;
use crate::protocols::qkd::{Link, NodeFactory};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::{debug, info, warn};

pub const START_KEY_GENERATION_TAG: &str = "SKey";
pub const END_KEY_GENERATION_TAG: &str = "EKey";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Writing,
    Reading,
}

/// Encodes text as 8 bits per byte, most significant bit first.
pub fn to_binary_list(data: &str) -> Vec<u8> {
    data.bytes()
        .flat_map(|byte| (0..8).rev().map(move |shift| (byte >> shift) & 1))
        .collect()
}

/// Decodes 8-bit groups produced by [`to_binary_list`].
pub fn to_string(bits: &[u8]) -> Result<String> {
    if bits.len() % 8 != 0 {
        return Err(QkdError::MalformedPayload(format!(
            "{} bits do not form whole characters",
            bits.len()
        )));
    }
    let bytes = bits
        .chunks_exact(8)
        .map(|group| group.iter().fold(0u8, |acc, bit| (acc << 1) | (bit & 1)))
        .collect();
    String::from_utf8(bytes).map_err(|err| QkdError::MalformedPayload(err.to_string()))
}

fn one_time_pad(data: &[u8], key: &[u8]) -> Vec<u8> {
    data.iter().zip(key).map(|(d, k)| d ^ k).collect()
}

/// An encrypted link between two parties.
///
/// Ending with [`SecureChannel::close`] runs the acknowledgement handshake
/// for the last operation. Dropping the channel unclosed, or an error inside
/// [`SecureChannel::run`], force-clears the classical channel instead. The
/// quantum channel is closed in every case.
pub struct SecureChannel {
    quantum: Box<dyn QuantumChannel>,
    classical: Box<dyn ClassicalChannel>,
    nodes: Box<dyn NodeFactory>,
    rng: Box<dyn RngCore + Send>,
    state: State,
    closed: bool,
}

impl SecureChannel {
    pub fn new(
        quantum: Box<dyn QuantumChannel>,
        classical: Box<dyn ClassicalChannel>,
        nodes: Box<dyn NodeFactory>,
    ) -> Self {
        Self {
            quantum,
            classical,
            nodes,
            rng: Box::new(ChaCha20Rng::from_os_rng()),
            state: State::Idle,
            closed: false,
        }
    }

    /// Replaces the generator used for bases, test sets and seeds.
    pub fn with_rng(mut self, rng: Box<dyn RngCore + Send>) -> Self {
        self.rng = rng;
        self
    }

    /// Runs `f` on the open channel and tears it down according to the outcome.
    pub fn run<T>(mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        match f(&mut self) {
            Ok(value) => {
                self.close()?;
                Ok(value)
            }
            Err(err) => {
                self.force_close();
                Err(err)
            }
        }
    }

    pub fn write(&mut self, message: &str) -> Result<()> {
        self.state = State::Writing;
        let msg = to_binary_list(message);
        let key = self.create_key(msg.len())?;
        let encrypted = one_time_pad(&msg, &key);
        self.classical.send(&bits_to_wire(&encrypted))?;
        debug!(bits = encrypted.len(), "sent encrypted message");
        Ok(())
    }

    pub fn read(&mut self) -> Result<String> {
        self.state = State::Reading;
        let key = self.get_key()?;
        let encrypted = bits_from_wire(&self.classical.receive()?)?;
        if key.len() < encrypted.len() {
            return Err(QkdError::InsufficientKeyMaterial {
                key: key.len(),
                message: encrypted.len(),
            });
        }
        to_string(&one_time_pad(&encrypted, &key))
    }

    /// Runs sender rounds until at least `len` key bits are collected.
    fn create_key(&mut self, len: usize) -> Result<Vec<u8>> {
        let start = bits_to_wire(&to_binary_list(START_KEY_GENERATION_TAG));
        let mut key = Vec::with_capacity(len);
        let mut rounds = 0;
        while key.len() < len {
            self.classical.send(&start)?;
            let mut node = self.nodes.make_sender_node(Link {
                quantum: &mut *self.quantum,
                classical: &mut *self.classical,
                rng: &mut *self.rng,
            });
            key.extend(node.try_generate_key()?);
            rounds += 1;
        }
        self.classical
            .send(&bits_to_wire(&to_binary_list(END_KEY_GENERATION_TAG)))?;
        info!(rounds, bits = key.len(), "accumulated key for message");
        Ok(key)
    }

    /// Runs receiver rounds for every start tag until the end tag arrives.
    fn get_key(&mut self) -> Result<Vec<u8>> {
        let mut key = Vec::new();
        let mut rounds = 0;
        loop {
            match self.receive_tag()?.as_str() {
                START_KEY_GENERATION_TAG => {
                    let mut node = self.nodes.make_receiver_node(Link {
                        quantum: &mut *self.quantum,
                        classical: &mut *self.classical,
                        rng: &mut *self.rng,
                    });
                    key.extend(node.try_generate_key()?);
                    rounds += 1;
                }
                END_KEY_GENERATION_TAG => break,
                other => {
                    return Err(QkdError::MalformedTag(format!(
                        "expected {END_KEY_GENERATION_TAG}, got {other:?}"
                    )));
                }
            }
        }
        info!(rounds, bits = key.len(), "received key for message");
        Ok(key)
    }

    fn receive_tag(&mut self) -> Result<String> {
        let bits = bits_from_wire(&self.classical.receive()?)?;
        to_string(&bits).map_err(|err| QkdError::MalformedTag(err.to_string()))
    }

    /// Ends the session after successful use.
    ///
    /// A writer waits for the reader's acknowledgement and clears the
    /// classical channel; a reader acknowledges and leaves clearing to the
    /// writer; an unused channel is cleared. A failed handshake falls back to
    /// a forced clear.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        let teardown = match self.state {
            State::Writing => self
                .classical
                .receive_ack()
                .and_then(|()| self.classical.clear()),
            State::Reading => self.classical.send_ack(),
            State::Idle => self.classical.clear(),
        };
        if let Err(err) = &teardown {
            warn!(%err, state = ?self.state, "teardown handshake failed, forcing clear");
            if let Err(err) = self.classical.force_clear() {
                warn!(%err, "force clear failed");
            }
        }
        let closed = self.quantum.close();
        teardown?;
        closed?;
        Ok(())
    }

    fn force_close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        warn!(state = ?self.state, "tearing down secure channel after failure");
        if let Err(err) = self.classical.force_clear() {
            warn!(%err, "force clear failed");
        }
        if let Err(err) = self.quantum.close() {
            warn!(%err, "closing quantum channel failed");
        }
    }
}

impl Drop for SecureChannel {
    fn drop(&mut self) {
        self.force_close();
    }
}

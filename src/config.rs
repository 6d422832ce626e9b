//! Network configuration and the node factory it drives.
//!
//! ```json
//! { "Protocol": "DIQKD", "Error": 0.1, "StateSize": 1500, "MaximizeKeyBits": false }
//! ```

use crate::core::errors::ConfigError;
use crate::protocols::qkd::{Bb84Node, DiqkdNode, Link, NodeFactory, QkdNode, SessionParams};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "BB84")]
    Bb84,
    #[serde(rename = "DIQKD")]
    Diqkd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(rename = "Protocol")]
    pub protocol: Protocol,
    /// Error tolerance of the abort tests.
    #[serde(rename = "Error")]
    pub error: f64,
    /// States prepared by the sender per round.
    #[serde(rename = "StateSize")]
    pub state_size: usize,
    #[serde(rename = "MaximizeKeyBits", default)]
    pub maximize_key_bits: bool,
}

impl NetworkConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.error) {
            return Err(ConfigError::InvalidTolerance(self.error));
        }
        if self.state_size == 0 {
            return Err(ConfigError::EmptyBatch);
        }
        Ok(())
    }

    pub fn params(&self) -> SessionParams {
        SessionParams {
            tolerance: self.error,
            batch_size: self.state_size,
            maximize_key_bits: self.maximize_key_bits,
        }
    }
}

/// Creates nodes of the configured protocol.
#[derive(Debug, Clone)]
pub struct NetworkFactory {
    config: NetworkConfig,
}

impl NetworkFactory {
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }

    /// Loads the configuration at `path` and builds a factory for it.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        Ok(Self::new(NetworkConfig::from_file(path)?))
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }
}

impl NodeFactory for NetworkFactory {
    fn make_sender_node<'a>(&self, link: Link<'a>) -> Box<dyn QkdNode + 'a> {
        let params = self.config.params();
        debug!(protocol = ?self.config.protocol, n = params.batch_size, "creating sender node");
        match self.config.protocol {
            Protocol::Bb84 => Box::new(Bb84Node::sender(link, params)),
            Protocol::Diqkd => Box::new(DiqkdNode::sender(link, params)),
        }
    }

    fn make_receiver_node<'a>(&self, link: Link<'a>) -> Box<dyn QkdNode + 'a> {
        let params = self.config.params();
        debug!(protocol = ?self.config.protocol, "creating receiver node");
        match self.config.protocol {
            Protocol::Bb84 => Box::new(Bb84Node::receiver(link, params)),
            Protocol::Diqkd => Box::new(DiqkdNode::receiver(link, params)),
        }
    }
}

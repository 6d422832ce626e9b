#![allow(dead_code)]

use qnetwork::channel::{LocalClassicalChannel, SimulatedQuantumChannel};
use qnetwork::protocols::qkd::{ErrorStatistics, Link, NodeFactory, QkdNode};
use qnetwork::{NetworkConfig, NetworkFactory, Protocol};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::thread;

/// What one party observed in a round.
#[derive(Debug)]
pub struct Outcome {
    pub aborted: bool,
    pub stats: ErrorStatistics,
    pub key: Vec<u8>,
}

pub fn factory(protocol: Protocol, error: f64, state_size: usize, maximize: bool) -> NetworkFactory {
    let config = NetworkConfig {
        protocol,
        error,
        state_size,
        maximize_key_bits: maximize,
    };
    config.validate().unwrap();
    NetworkFactory::new(config)
}

fn play(node: &mut dyn QkdNode) -> Outcome {
    node.share_q_states().unwrap();
    let aborted = node.should_abort().unwrap();
    let key = if aborted {
        Vec::new()
    } else {
        node.generate_key().unwrap()
    };
    Outcome {
        aborted,
        stats: node.statistics(),
        key,
    }
}

/// Runs one round with the sender on this thread and the receiver on another.
pub fn run_round(
    factory: &NetworkFactory,
    mut sender_q: SimulatedQuantumChannel,
    mut receiver_q: SimulatedQuantumChannel,
    seed: u64,
) -> (Outcome, Outcome) {
    let (mut sender_c, mut receiver_c) = LocalClassicalChannel::pair();

    let receiver_factory = factory.clone();
    let receiver = thread::spawn(move || {
        let mut rng = ChaCha20Rng::seed_from_u64(seed.wrapping_add(1));
        let mut node = receiver_factory.make_receiver_node(Link {
            quantum: &mut receiver_q,
            classical: &mut receiver_c,
            rng: &mut rng,
        });
        play(&mut *node)
    });

    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut node = factory.make_sender_node(Link {
        quantum: &mut sender_q,
        classical: &mut sender_c,
        rng: &mut rng,
    });
    let sender = play(&mut *node);
    drop(node);

    (sender, receiver.join().unwrap())
}

mod common;

use common::{factory, run_round};
use qnetwork::{NoiseChannel, Protocol};
use qnetwork::channel::SimulatedQuantumChannel;
use qnetwork::protocols::qkd::diqkd::TSIRELSON_WIN_PROBABILITY;

#[test]
fn bb84_without_noise_agrees_on_key() {
    let factory = factory(Protocol::Bb84, 0.0, 200, false);
    let (alice_q, bob_q) = SimulatedQuantumChannel::pair(100);
    let (alice, bob) = run_round(&factory, alice_q, bob_q, 1);

    assert!(!alice.aborted);
    assert!(!bob.aborted);
    assert_eq!(alice.stats.matching_error, Some(0.0));
    assert_eq!(bob.stats.matching_error, Some(0.0));
    assert_eq!(alice.key.len(), 1);
    assert_eq!(alice.key, bob.key);
}

#[test]
fn bb84_maximized_key_uses_whole_raw_key() {
    let factory = factory(Protocol::Bb84, 0.0, 200, true);
    let (alice_q, bob_q) = SimulatedQuantumChannel::pair(7);
    let (alice, bob) = run_round(&factory, alice_q, bob_q, 8);

    assert!(!alice.aborted);
    assert!(alice.key.len() > 10);
    assert_eq!(alice.key, bob.key);
}

#[test]
fn bb84_detects_intercept_resend() {
    let factory = factory(Protocol::Bb84, 0.1, 400, false);
    let (alice_q, bob_q) = SimulatedQuantumChannel::pair(3);
    let alice_q = alice_q.with_eavesdropper(1.0).unwrap();
    let (alice, bob) = run_round(&factory, alice_q, bob_q, 4);

    assert!(alice.aborted);
    assert!(bob.aborted);
    assert!(alice.stats.matching_error.unwrap() > 0.1);
    assert_eq!(alice.stats.matching_error, bob.stats.matching_error);
    assert!(alice.key.is_empty());
}

#[test]
fn diqkd_reaches_tsirelson_bound_and_agrees_on_key() {
    let factory = factory(Protocol::Diqkd, 0.15, 600, false);
    let (alice_q, bob_q) = SimulatedQuantumChannel::pair(42);
    let (alice, bob) = run_round(&factory, alice_q, bob_q, 43);

    assert!(!alice.aborted);
    assert!(!bob.aborted);
    let win = alice.stats.win_prob.unwrap();
    assert!(win > TSIRELSON_WIN_PROBABILITY - 0.15, "win probability {win}");
    assert_eq!(alice.stats.win_prob, bob.stats.win_prob);
    assert_eq!(alice.stats.matching_error, Some(0.0));
    assert_eq!(alice.key.len(), 1);
    assert_eq!(alice.key, bob.key);
}

#[test]
fn diqkd_detects_intercept_resend() {
    let factory = factory(Protocol::Diqkd, 0.1, 600, false);
    let (alice_q, bob_q) = SimulatedQuantumChannel::pair(9);
    let alice_q = alice_q.with_eavesdropper(1.0).unwrap();
    let (alice, bob) = run_round(&factory, alice_q, bob_q, 10);

    assert!(alice.aborted);
    assert!(bob.aborted);
    assert!(alice.key.is_empty());
}

fn depolarized_pair(seed: u64, p: f64) -> (SimulatedQuantumChannel, SimulatedQuantumChannel) {
    let (alice_q, bob_q) = SimulatedQuantumChannel::pair(seed);
    (alice_q.with_noise(NoiseChannel::depolarizing(p).unwrap()), bob_q)
}

#[test]
fn bb84_over_depolarizing_channel_aborts_without_tolerance() {
    let factory = factory(Protocol::Bb84, 0.0, 400, false);
    let (alice_q, bob_q) = depolarized_pair(11, 0.2);
    let (alice, bob) = run_round(&factory, alice_q, bob_q, 12);

    assert!(alice.aborted);
    assert!(bob.aborted);
    assert!(alice.stats.matching_error.unwrap() > 0.0);
    assert!(alice.stats.mismatches > 0);
    assert!(alice.key.is_empty());
}

#[test]
fn bb84_over_depolarizing_channel_passes_within_tolerance() {
    // depolarizing(0.2) flips a sifted bit with probability 0.1
    let factory = factory(Protocol::Bb84, 0.5, 400, false);
    let (alice_q, bob_q) = depolarized_pair(11, 0.2);
    let (alice, bob) = run_round(&factory, alice_q, bob_q, 12);

    let error = alice.stats.matching_error.unwrap();
    assert!(error > 0.0 && error < 0.5, "matching error {error}");
    assert!(!alice.aborted);
    assert!(!bob.aborted);
    assert_eq!(alice.key.len(), 1);
    assert_eq!(bob.key.len(), 1);
}

#[test]
fn diqkd_win_probability_drops_over_depolarizing_channel() {
    // correlations shrink by 1 - p: expected win probability 0.61, match error 0.35
    let factory = factory(Protocol::Diqkd, 0.1, 600, false);
    let (alice_q, bob_q) = depolarized_pair(21, 0.7);
    let (alice, bob) = run_round(&factory, alice_q, bob_q, 22);

    let win = alice.stats.win_prob.unwrap();
    assert!(win < TSIRELSON_WIN_PROBABILITY - 0.1, "win probability {win}");
    assert!(alice.stats.matching_error.unwrap() > 0.0);
    assert_eq!(alice.stats.win_prob, bob.stats.win_prob);
    assert!(alice.aborted);
    assert!(bob.aborted);
}

//! Pairing policy for the match engine.
//!
//! The strategy is a swappable seam: the engine only asks "turn these queue
//! entries into pairs." Alternative policies (skill-based, blocklist-aware)
//! can be substituted without touching the queue or engine contracts.

use rand::seq::SliceRandom;

use crate::call::queue::QueueEntry;

pub trait PairingStrategy: Send + Sync {
    /// Produce the pairs for one matching round. The first element of each
    /// pair is designated the initiator. Entries left unpaired stay queued.
    fn pair(&self, entries: Vec<QueueEntry>) -> Vec<(QueueEntry, QueueEntry)>;
}

/// Uniform random shuffle, then consecutive pairing. No user is favored by
/// queue order or arrival time; with an odd count the leftover entry stays
/// queued for the next round.
#[derive(Debug, Default)]
pub struct ShufflePairing;

impl PairingStrategy for ShufflePairing {
    fn pair(&self, mut entries: Vec<QueueEntry>) -> Vec<(QueueEntry, QueueEntry)> {
        entries.shuffle(&mut rand::rng());

        let mut pairs = Vec::with_capacity(entries.len() / 2);
        let mut iter = entries.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => pairs.push((a, b)),
                None => break, // odd entry stays queued
            }
        }
        pairs
    }
}

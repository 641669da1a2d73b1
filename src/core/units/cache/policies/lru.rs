//! Least Recently Used (LRU) Replacement Policy.
//!
//! Each slot carries the stamp of its last touch, taken from a counter
//! that advances on every hit or fill. The victim is the slot with the
//! oldest stamp. The same state serves cache sets and TLB sets.

use super::ReplacementPolicy;

/// Per-slot last-touch stamps.
pub struct LruPolicy {
    stamps: Vec<Vec<u64>>,
    clock: u64,
}

impl LruPolicy {
    /// Creates LRU state for `sets` sets of `ways` slots, none touched yet.
    pub fn new(sets: usize, ways: usize) -> Self {
        Self {
            stamps: vec![vec![0; ways]; sets],
            clock: 0,
        }
    }
}

impl ReplacementPolicy for LruPolicy {
    fn update(&mut self, set: usize, way: usize) {
        self.clock += 1;
        self.stamps[set][way] = self.clock;
    }

    /// Oldest stamp wins; among untouched slots, the lowest way.
    fn get_victim(&mut self, set: usize) -> usize {
        self.stamps[set]
            .iter()
            .enumerate()
            .min_by_key(|&(way, &stamp)| (stamp, way))
            .map_or(0, |(way, _)| way)
    }
}

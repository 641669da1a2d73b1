//! First In, First Out (FIFO) Replacement Policy.
//!
//! Evicts the entry that was filled earliest, regardless of how often it has
//! been hit since.

use std::collections::VecDeque;

use super::ReplacementPolicy;

/// FIFO Policy state: fill order per set, oldest at the front.
pub struct FifoPolicy {
    order: Vec<VecDeque<usize>>,
}

impl FifoPolicy {
    pub fn new(sets: usize, ways: usize) -> Self {
        let order = (0..sets).map(|_| (0..ways).collect()).collect();
        Self { order }
    }
}

impl ReplacementPolicy for FifoPolicy {
    fn update(&mut self, _set: usize, _way: usize) {}

    fn insert(&mut self, set: usize, way: usize) {
        let queue = &mut self.order[set];
        if let Some(pos) = queue.iter().position(|&x| x == way) {
            queue.remove(pos);
        }
        queue.push_back(way);
    }

    fn get_victim(&mut self, set: usize) -> usize {
        self.order[set].front().copied().unwrap_or(0)
    }
}

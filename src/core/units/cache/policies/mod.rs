//! Replacement Policies.
//!
//! Policies keep per-set recency state for a structure of `sets x ways`
//! slots. They are shared by the cache levels and the TLB; the owning
//! structure always prefers an invalid slot before asking for a victim.

use crate::config::ReplacementPolicy as PolicyKind;

/// Least Recently Used policy.
pub mod lru;

/// First In, First Out policy.
pub mod fifo;

pub use fifo::FifoPolicy;
pub use lru::LruPolicy;

/// Replacement state for a set-associative structure.
pub trait ReplacementPolicy {
    /// Records a hit on `way` of `set`.
    fn update(&mut self, set: usize, way: usize);

    /// Records that `way` of `set` was just filled with a new entry.
    fn insert(&mut self, set: usize, way: usize) {
        self.update(set, way);
    }

    /// Returns the way of `set` to evict when every way is valid.
    fn get_victim(&mut self, set: usize) -> usize;
}

/// Builds the policy state selected by the topology.
pub fn build(kind: PolicyKind, sets: usize, ways: usize) -> Box<dyn ReplacementPolicy> {
    match kind {
        PolicyKind::Lru => Box::new(LruPolicy::new(sets, ways)),
        PolicyKind::Fifo => Box::new(FifoPolicy::new(sets, ways)),
    }
}

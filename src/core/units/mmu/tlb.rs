//! Translation Lookaside Buffer.
//!
//! A set-associative array of translations. Entries live in fixed slots per
//! set; a fully associative TLB is simply one set of `entries` ways.

use crate::core::units::cache::policies::{self, ReplacementPolicy};
use crate::config::TlbConfig;

#[derive(Clone, Copy, Debug, Default)]
struct TlbEntry {
    vpn: u64,
    pfn: u64,
    valid: bool,
}

/// Set-associative TLB with a pluggable replacement policy.
pub struct Tlb {
    sets: Vec<Vec<TlbEntry>>,
    policy: Box<dyn ReplacementPolicy>,
    ways: usize,
}

impl Tlb {
    pub fn new(config: &TlbConfig) -> Self {
        let ways = config.ways();
        let num_sets = config.sets();
        Self {
            sets: vec![vec![TlbEntry::default(); ways]; num_sets],
            policy: policies::build(config.policy, num_sets, ways),
            ways,
        }
    }

    fn set_of(&self, vpn: u64) -> usize {
        (vpn as usize) & (self.sets.len() - 1)
    }

    /// Looks up `vpn`, refreshing recency on a hit.
    pub fn lookup(&mut self, vpn: u64) -> Option<u64> {
        let set = self.set_of(vpn);
        let way = self.sets[set]
            .iter()
            .position(|e| e.valid && e.vpn == vpn)?;
        self.policy.update(set, way);
        Some(self.sets[set][way].pfn)
    }

    /// Installs a translation and returns the evicted virtual page, if any.
    ///
    /// An existing entry for `vpn` is overwritten in place so a page never
    /// occupies two slots.
    pub fn insert(&mut self, vpn: u64, pfn: u64) -> Option<u64> {
        let set = self.set_of(vpn);
        let entries = &self.sets[set];

        let (way, evicted) = if let Some(way) = entries.iter().position(|e| e.valid && e.vpn == vpn) {
            (way, None)
        } else if let Some(way) = entries.iter().position(|e| !e.valid) {
            (way, None)
        } else {
            let way = self.policy.get_victim(set);
            (way, Some(self.sets[set][way].vpn))
        };

        self.sets[set][way] = TlbEntry {
            vpn,
            pfn,
            valid: true,
        };
        self.policy.insert(set, way);
        evicted
    }

    /// Returns `true` if `vpn` has a valid entry. Does not touch recency.
    pub fn contains(&self, vpn: u64) -> bool {
        let set = self.set_of(vpn);
        self.sets[set].iter().any(|e| e.valid && e.vpn == vpn)
    }

    /// Invalidates every entry.
    pub fn flush(&mut self) {
        for set in &mut self.sets {
            for entry in set.iter_mut() {
                entry.valid = false;
            }
        }
    }

    /// Total valid entries.
    pub fn valid_entries(&self) -> usize {
        self.sets.iter().flatten().filter(|e| e.valid).count()
    }

    /// Valid entries in the set `vpn` maps to.
    pub fn valid_in_set_of(&self, vpn: u64) -> usize {
        self.sets[self.set_of(vpn)].iter().filter(|e| e.valid).count()
    }

    /// Configured capacity in entries.
    pub fn capacity(&self) -> usize {
        self.sets.len() * self.ways
    }
}

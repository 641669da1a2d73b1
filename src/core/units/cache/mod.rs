//! Set-Associative Cache Level.
//!
//! A `CacheLevel` models one stage of a port's cache chain (L1, L2, ...).
//! Lines live in fixed-capacity sets indexed by slot; the replacement
//! policy only ever chooses among those slots, so a set can never hold more
//! than `ways` valid lines.
//!
//! The level does not talk to its neighbours itself. A miss is reported to
//! the scheduler, which forwards the request downward and later calls
//! [`CacheLevel::fill`] on the way back up. Dirty victims are handed back as
//! an [`Eviction`] for the scheduler to write back toward the next level.
//!
//! Write policy is write-back, write-allocate.

/// Replacement policies shared with the TLB.
pub mod policies;

use crate::common::{AccessType, Cycle, PhysAddr};
use crate::config::{CacheConfig, CacheKind};
use crate::stats::StatsCollector;
use policies::ReplacementPolicy;

#[derive(Clone, Copy, Debug, Default)]
struct CacheLine {
    tag: u64,
    valid: bool,
    dirty: bool,
    /// Cycle at which the line was installed; stands in for the data payload.
    filled_at: Cycle,
}

#[derive(Clone, Debug)]
struct CacheSet {
    lines: Vec<CacheLine>,
}

impl CacheSet {
    fn new(ways: usize) -> Self {
        Self {
            lines: vec![CacheLine::default(); ways],
        }
    }

    fn find(&self, tag: u64) -> Option<usize> {
        self.lines.iter().position(|l| l.valid && l.tag == tag)
    }

    fn free_way(&self) -> Option<usize> {
        self.lines.iter().position(|l| !l.valid)
    }
}

/// Outcome of a tag lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LookupResult {
    pub hit: bool,
    /// Way holding the line on a hit.
    pub way: Option<usize>,
    /// Cycles charged by this level for the lookup.
    pub latency: u64,
}

/// A line removed from a set to make room for a fill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Eviction {
    /// Base address of the evicted line.
    pub addr: PhysAddr,
    pub dirty: bool,
}

/// Outcome of installing a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FillResult {
    pub victim: Option<Eviction>,
    pub latency: u64,
}

/// One level of a cache hierarchy.
pub struct CacheLevel {
    pub name: String,
    pub kind: CacheKind,
    pub tag_latency: u64,
    pub data_latency: u64,
    pub fill_latency: u64,

    sets: Vec<CacheSet>,
    policy: Box<dyn ReplacementPolicy>,
    ways: usize,
    line_bytes: usize,
    offset_bits: u32,
    index_bits: u32,
    stats_id: usize,
}

impl CacheLevel {
    /// Creates an empty cache level and registers its counters.
    ///
    /// The geometry must already have passed `Topology::validate`.
    pub fn new(config: &CacheConfig, stats: &mut StatsCollector) -> Self {
        let num_sets = config.sets();
        Self {
            name: config.name.clone(),
            kind: config.kind,
            tag_latency: config.tag_latency,
            data_latency: config.data_latency,
            fill_latency: config.fill_latency(),
            sets: (0..num_sets).map(|_| CacheSet::new(config.ways)).collect(),
            policy: policies::build(config.policy, num_sets, config.ways),
            ways: config.ways,
            line_bytes: config.line_bytes,
            offset_bits: config.line_bytes.trailing_zeros(),
            index_bits: num_sets.trailing_zeros(),
            stats_id: stats.register_cache(&config.name),
        }
    }

    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    pub fn ways(&self) -> usize {
        self.ways
    }

    pub fn line_bytes(&self) -> usize {
        self.line_bytes
    }

    /// Set index an address maps to.
    pub fn set_index(&self, addr: PhysAddr) -> usize {
        self.decompose(addr).0
    }

    fn decompose(&self, addr: PhysAddr) -> (usize, u64) {
        let line = addr.val() >> self.offset_bits;
        let set = (line & ((1u64 << self.index_bits) - 1)) as usize;
        let tag = line >> self.index_bits;
        (set, tag)
    }

    fn line_addr(&self, set: usize, tag: u64) -> PhysAddr {
        PhysAddr::new(((tag << self.index_bits) | set as u64) << self.offset_bits)
    }

    /// Looks up the tag array.
    ///
    /// A hit refreshes recency and, for a store, dirties the line.
    pub fn lookup(
        &mut self,
        addr: PhysAddr,
        access: AccessType,
        stats: &mut StatsCollector,
    ) -> LookupResult {
        let (set, tag) = self.decompose(addr);
        match self.sets[set].find(tag) {
            Some(way) => {
                self.policy.update(set, way);
                if access.is_write() {
                    self.sets[set].lines[way].dirty = true;
                }
                stats.record_cache_lookup(self.stats_id, true);
                LookupResult {
                    hit: true,
                    way: Some(way),
                    latency: self.tag_latency + self.data_latency,
                }
            }
            None => {
                stats.record_cache_lookup(self.stats_id, false);
                LookupResult {
                    hit: false,
                    way: None,
                    latency: self.tag_latency,
                }
            }
        }
    }

    /// Installs the line holding `addr`.
    ///
    /// A free way is used when one exists; otherwise the policy picks a
    /// victim, which is returned so a dirty line can be written back.
    pub fn fill(
        &mut self,
        addr: PhysAddr,
        dirty: bool,
        at: Cycle,
        stats: &mut StatsCollector,
    ) -> FillResult {
        let (set, tag) = self.decompose(addr);

        if let Some(way) = self.sets[set].find(tag) {
            let line = &mut self.sets[set].lines[way];
            line.dirty |= dirty;
            self.policy.update(set, way);
            return FillResult {
                victim: None,
                latency: self.fill_latency,
            };
        }

        let way = match self.sets[set].free_way() {
            Some(way) => way,
            None => self.policy.get_victim(set),
        };

        let old = self.sets[set].lines[way];
        let victim = if old.valid {
            Some(Eviction {
                addr: self.line_addr(set, old.tag),
                dirty: old.dirty,
            })
        } else {
            None
        };

        self.sets[set].lines[way] = CacheLine {
            tag,
            valid: true,
            dirty,
            filled_at: at,
        };
        self.policy.insert(set, way);

        stats.record_cache_fill(self.stats_id);
        if victim.map_or(false, |v| v.dirty) {
            stats.record_cache_writeback(self.stats_id);
        }

        FillResult {
            victim,
            latency: self.fill_latency,
        }
    }

    /// Accepts a dirty line written back from the level above.
    ///
    /// Returns a further dirty eviction if allocating the line displaced one.
    pub fn absorb_writeback(
        &mut self,
        addr: PhysAddr,
        at: Cycle,
        stats: &mut StatsCollector,
    ) -> Option<Eviction> {
        let (set, tag) = self.decompose(addr);
        if let Some(way) = self.sets[set].find(tag) {
            self.sets[set].lines[way].dirty = true;
            return None;
        }
        self.fill(addr, true, at, stats).victim.filter(|v| v.dirty)
    }

    /// Returns `true` if the line holding `addr` is valid in this level.
    pub fn contains(&self, addr: PhysAddr) -> bool {
        let (set, tag) = self.decompose(addr);
        self.sets[set].find(tag).is_some()
    }

    /// Dirty state of the line holding `addr`, if present.
    pub fn is_dirty(&self, addr: PhysAddr) -> Option<bool> {
        let (set, tag) = self.decompose(addr);
        self.sets[set]
            .find(tag)
            .map(|way| self.sets[set].lines[way].dirty)
    }

    /// Cycle at which the line holding `addr` was installed, if present.
    pub fn filled_at(&self, addr: PhysAddr) -> Option<Cycle> {
        let (set, tag) = self.decompose(addr);
        self.sets[set]
            .find(tag)
            .map(|way| self.sets[set].lines[way].filled_at)
    }

    /// Number of valid lines in `set`.
    pub fn valid_lines(&self, set: usize) -> usize {
        self.sets[set].lines.iter().filter(|l| l.valid).count()
    }

    /// Invalidates every line and returns the dirty ones.
    pub fn invalidate_all(&mut self) -> Vec<Eviction> {
        let mut dirty = Vec::new();
        for set in 0..self.sets.len() {
            for way in 0..self.ways {
                let line = self.sets[set].lines[way];
                if line.valid && line.dirty {
                    dirty.push(Eviction {
                        addr: self.line_addr(set, line.tag),
                        dirty: true,
                    });
                }
                self.sets[set].lines[way] = CacheLine::default();
            }
        }
        dirty
    }
}

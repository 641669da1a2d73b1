//! Page-Table Backing Models.
//!
//! The translation unit never decides on its own whether a page is present.
//! It asks a [`PageTable`], which stands in for the workload's address space.
//! The table itself has no capacity limit; only the TLB does. Demand paging
//! is bounded by the physical frames behind the memory controllers.

use log::warn;
use std::collections::HashMap;

use crate::config::{PageTableConfig, PageTableKind};

/// Presence and frame lookup for virtual pages.
pub trait PageTable {
    /// Returns the frame number mapped to `vpn`, or `None` if the page is not present.
    fn lookup(&self, vpn: u64) -> Option<u64>;

    /// Gives the backing model a chance to map `vpn` after a fault was charged.
    ///
    /// Returns the frame the faulting access should use, or `None` if the
    /// page stays absent.
    fn resolve_fault(&mut self, _vpn: u64) -> Option<u64> {
        None
    }
}

/// Every page is present at a fixed frame offset.
pub struct IdentityPageTable {
    frame_base: u64,
}

impl IdentityPageTable {
    pub fn new(frame_base: u64) -> Self {
        Self { frame_base }
    }
}

impl PageTable for IdentityPageTable {
    fn lookup(&self, vpn: u64) -> Option<u64> {
        Some(vpn.wrapping_add(self.frame_base))
    }
}

/// Only explicitly mapped pages are present; faults never map anything.
#[derive(Default)]
pub struct ExplicitPageTable {
    entries: HashMap<u64, u64>,
}

impl ExplicitPageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `vpn` to `pfn`, replacing any previous mapping.
    pub fn map(&mut self, vpn: u64, pfn: u64) {
        self.entries.insert(vpn, pfn);
    }

    pub fn unmap(&mut self, vpn: u64) {
        self.entries.remove(&vpn);
    }
}

impl PageTable for ExplicitPageTable {
    fn lookup(&self, vpn: u64) -> Option<u64> {
        self.entries.get(&vpn).copied()
    }
}

/// First-touch paging: a page is absent until it faults, then it receives the
/// next free frame.
///
/// Frames are handed out from `frame_base` up to `frame_end`. A footprint
/// larger than that reuses frames round-robin from `frame_base`, so several
/// pages may alias one frame; every address handed out stays inside memory.
pub struct DemandPageTable {
    entries: HashMap<u64, u64>,
    frame_base: u64,
    frame_end: u64,
    next_frame: u64,
    wrapped: bool,
}

impl DemandPageTable {
    /// Allocates frames in `[frame_base, frame_end)`.
    pub fn new(frame_base: u64, frame_end: u64) -> Self {
        Self {
            entries: HashMap::new(),
            frame_base,
            frame_end: frame_end.max(frame_base.saturating_add(1)),
            next_frame: frame_base,
            wrapped: false,
        }
    }

    /// Number of pages mapped so far.
    pub fn mapped_pages(&self) -> usize {
        self.entries.len()
    }

    /// Whether the footprint has outgrown the frames and reuse has begun.
    pub fn is_oversubscribed(&self) -> bool {
        self.wrapped
    }

    fn allocate(&mut self) -> u64 {
        if self.next_frame >= self.frame_end {
            if !self.wrapped {
                warn!(
                    "demand paging exhausted frames {:#x}..{:#x}; reusing frames from {:#x}",
                    self.frame_base, self.frame_end, self.frame_base
                );
            }
            self.wrapped = true;
            self.next_frame = self.frame_base;
        }
        let pfn = self.next_frame;
        self.next_frame += 1;
        pfn
    }
}

impl PageTable for DemandPageTable {
    fn lookup(&self, vpn: u64) -> Option<u64> {
        self.entries.get(&vpn).copied()
    }

    fn resolve_fault(&mut self, vpn: u64) -> Option<u64> {
        if let Some(&pfn) = self.entries.get(&vpn) {
            return Some(pfn);
        }
        let pfn = self.allocate();
        self.entries.insert(vpn, pfn);
        Some(pfn)
    }
}

/// Builds the backing model selected by the topology.
///
/// `frame_end` is one past the last physical frame memory provides.
pub fn build(config: &PageTableConfig, frame_end: u64) -> Box<dyn PageTable> {
    match config.kind {
        PageTableKind::Identity => Box::new(IdentityPageTable::new(config.frame_base)),
        PageTableKind::Explicit => {
            let mut table = ExplicitPageTable::new();
            for [vpn, pfn] in &config.mappings {
                table.map(*vpn, *pfn);
            }
            Box::new(table)
        }
        PageTableKind::Demand => Box::new(DemandPageTable::new(config.frame_base, frame_end)),
    }
}

//! Address Translation Unit.
//!
//! The `Mmu` resolves virtual addresses through a TLB backed by a page-table
//! walker. Every call ends in exactly one of three outcomes:
//!
//! * **TLB hit**: charged `hit_latency`.
//! * **Walk hit**: the TLB missed, the walk found the page present, and the
//!   translation is installed. Charged `hit_latency + walk_latency`.
//! * **Page fault**: the walk found the page absent. Charged
//!   `hit_latency + walk_latency + fault_latency`; nothing is installed, so
//!   the next access to the page walks again.

/// Page-table backing models.
pub mod page_table;

/// Translation lookaside buffer.
pub mod tlb;

use log::trace;

use crate::common::{AccessType, PhysAddr, VirtAddr};
use crate::config::{GeneralConfig, TlbConfig};
use crate::stats::StatsCollector;
use page_table::PageTable;
use tlb::Tlb;

/// How a translation was resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TranslationOutcome {
    TlbHit,
    WalkHit,
    PageFault,
}

/// Result of a translation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TranslationResult {
    /// Translated address. `None` when a fault left the page unmapped.
    pub paddr: Option<PhysAddr>,
    /// Cycles spent translating.
    pub cycles: u64,
    pub outcome: TranslationOutcome,
}

impl TranslationResult {
    /// A successful translation.
    pub fn success(paddr: PhysAddr, cycles: u64, outcome: TranslationOutcome) -> Self {
        Self {
            paddr: Some(paddr),
            cycles,
            outcome,
        }
    }

    /// A page fault; `paddr` is set only if the backing model mapped the page.
    pub fn fault(paddr: Option<PhysAddr>, cycles: u64) -> Self {
        Self {
            paddr,
            cycles,
            outcome: TranslationOutcome::PageFault,
        }
    }
}

/// TLB plus page-table walker.
pub struct Mmu {
    pub tlb: Tlb,
    page_table: Box<dyn PageTable>,
    page_shift: u32,
    hit_latency: u64,
    walk_latency: u64,
    fault_latency: u64,
}

impl Mmu {
    pub fn new(general: &GeneralConfig, config: &TlbConfig, page_table: Box<dyn PageTable>) -> Self {
        Self {
            tlb: Tlb::new(config),
            page_table,
            page_shift: general.page_shift(),
            hit_latency: config.hit_latency,
            walk_latency: config.walk_latency,
            fault_latency: config.fault_latency,
        }
    }

    pub fn page_shift(&self) -> u32 {
        self.page_shift
    }

    /// Cost of a TLB hit, the cheapest possible translation.
    pub fn hit_latency(&self) -> u64 {
        self.hit_latency
    }

    /// Translates `vaddr`, updating exactly one translation counter.
    ///
    /// The access kind is accepted for symmetry with the cache interface;
    /// permissions are not modelled.
    pub fn translate(
        &mut self,
        vaddr: VirtAddr,
        access: AccessType,
        stats: &mut StatsCollector,
    ) -> TranslationResult {
        let vpn = vaddr.vpn(self.page_shift);
        let offset = vaddr.page_offset(self.page_shift);

        if let Some(pfn) = self.tlb.lookup(vpn) {
            stats.record_translation(TranslationOutcome::TlbHit);
            return TranslationResult::success(
                PhysAddr::from_frame(pfn, offset, self.page_shift),
                self.hit_latency,
                TranslationOutcome::TlbHit,
            );
        }

        let walk_cycles = self.hit_latency + self.walk_latency;
        match self.page_table.lookup(vpn) {
            Some(pfn) => {
                if let Some(evicted) = self.tlb.insert(vpn, pfn) {
                    trace!("tlb: vpn {:#x} evicted by vpn {:#x}", evicted, vpn);
                }
                stats.record_translation(TranslationOutcome::WalkHit);
                TranslationResult::success(
                    PhysAddr::from_frame(pfn, offset, self.page_shift),
                    walk_cycles,
                    TranslationOutcome::WalkHit,
                )
            }
            None => {
                stats.record_translation(TranslationOutcome::PageFault);
                trace!("tlb: page fault on {} ({})", vaddr, access);
                let paddr = self
                    .page_table
                    .resolve_fault(vpn)
                    .map(|pfn| PhysAddr::from_frame(pfn, offset, self.page_shift));
                TranslationResult::fault(paddr, walk_cycles + self.fault_latency)
            }
        }
    }

    /// Invalidates every cached translation.
    pub fn flush(&mut self) {
        self.tlb.flush();
    }
}
